// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Conversions between sample arrays and little-endian byte sequences.

use num_complex::Complex32;

/// Number of bytes for a single `f32`.
const F32_BYTES: usize = 4;

/// Number of bytes for a single interleaved complex sample.
pub const COMPLEX32_BYTES: usize = 2 * F32_BYTES;

#[inline]
fn le_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Converts interleaved little-endian `f32` pairs (real, imag) to complex
/// samples.
///
/// # Panics
///
/// This function panics when the length of `bytes` is not a multiple of
/// eight, or `dest` does not have enough elements to store the results.
pub fn le_bytes_to_complex32s(bytes: &[u8], dest: &mut [Complex32]) {
    assert!(bytes.len() % COMPLEX32_BYTES == 0);
    assert!(dest.len() >= bytes.len() / COMPLEX32_BYTES);
    for (p, chunk) in dest.iter_mut().zip(bytes.chunks_exact(COMPLEX32_BYTES)) {
        *p = Complex32::new(le_f32(&chunk[..F32_BYTES]), le_f32(&chunk[F32_BYTES..]));
    }
}

/// Appends complex samples to `dest` as interleaved little-endian `f32`s.
pub fn complex32s_to_le_bytes(samples: &[Complex32], dest: &mut Vec<u8>) {
    dest.reserve(samples.len() * COMPLEX32_BYTES);
    for x in samples {
        dest.extend_from_slice(&x.re.to_le_bytes());
        dest.extend_from_slice(&x.im.to_le_bytes());
    }
}

/// Appends `f32`s to `dest` in little-endian.
pub fn f32s_to_le_bytes(values: &[f32], dest: &mut Vec<u8>) {
    dest.reserve(values.len() * F32_BYTES);
    for x in values {
        dest.extend_from_slice(&x.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_byte_layout() {
        let samples = [Complex32::new(1.0, -2.0), Complex32::new(0.5, 0.0)];
        let mut bytes = vec![];
        complex32s_to_le_bytes(&samples, &mut bytes);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-2.0f32).to_le_bytes());

        let mut decoded = [Complex32::new(0.0, 0.0); 2];
        le_bytes_to_complex32s(&bytes, &mut decoded);
        assert_eq!(decoded, samples);
    }

    #[test]
    fn real_byte_layout() {
        let mut bytes = vec![0xFFu8];
        f32s_to_le_bytes(&[0.25, 3.0], &mut bytes);
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[1..5], &[0x00, 0x00, 0x80, 0x3E]);
    }

    #[test]
    #[should_panic]
    fn partial_sample_is_rejected() {
        let mut decoded = [Complex32::new(0.0, 0.0); 2];
        le_bytes_to_complex32s(&[0u8; 12], &mut decoded);
    }
}
