// Copyright 2022 Google LLC
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

//! Auto-correlation estimation and Toeplitz packing.

use num_complex::Complex32;

/// Returns the number of elements of a packed triangular matrix of `order`.
#[inline]
pub const fn packed_len(order: usize) -> usize {
    order * (order + 1) / 2
}

/// Computes the biased auto-correlation of `signal` for lags `0..order`.
///
/// `dest[a] = sum_t signal[t + a] * conj(signal[t])`. Lags longer than the
/// signal are set to zero. The lag-0 value is real by construction.
///
/// # Panics
///
/// Panics if `dest` is shorter than `order`.
pub fn auto_correlation(order: usize, signal: &[Complex32], dest: &mut [Complex32]) {
    assert!(dest.len() >= order);
    for (lag, p) in dest[..order].iter_mut().enumerate() {
        let mut acc = Complex32::new(0.0, 0.0);
        if lag < signal.len() {
            for (x, y) in signal[lag..].iter().zip(signal.iter()) {
                acc += x * y.conj();
            }
        }
        *p = acc;
    }
    if order > 0 {
        dest[0].im = 0.0;
    }
}

/// Expands auto-correlations in `packed[0..order]` into a Toeplitz matrix.
///
/// On input, the first `order` elements of `packed` hold lags `0..order`.
/// On output, `packed` holds the lower triangle of the Hermitian Toeplitz
/// matrix in column-major packed storage; column `j` holds lags
/// `0..order - j`.
///
/// # Panics
///
/// Panics if `packed` is shorter than `order * (order + 1) / 2`.
pub fn pack_toeplitz_lower(order: usize, packed: &mut [Complex32]) {
    assert!(packed.len() >= packed_len(order));
    let mut head = order;
    for col in 1..order {
        let len = order - col;
        packed.copy_within(0..len, head);
        head += len;
    }
}

/// Estimates auto-correlation of `signal` and stores it as a packed Toeplitz
/// matrix of the given `order`.
#[inline]
pub fn packed_auto_correlation(order: usize, signal: &[Complex32], packed: &mut [Complex32]) {
    auto_correlation(order, signal, packed);
    pack_toeplitz_lower(order, packed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;
    use crate::linalg::packed_index;
    use crate::sigen;
    use crate::sigen::Signal;

    use rstest::rstest;

    #[test]
    fn known_values() {
        let signal = [
            Complex32::new(1.0, 0.0),
            Complex32::new(0.0, 1.0),
            Complex32::new(-1.0, 0.0),
        ];
        let mut dest = [Complex32::new(0.0, 0.0); 3];
        auto_correlation(3, &signal, &mut dest);
        assert_eq!(dest[0], Complex32::new(3.0, 0.0));
        // x[1] conj(x[0]) + x[2] conj(x[1]) = i + (-1)(-i) = 2i
        assert_eq!(dest[1], Complex32::new(0.0, 2.0));
        // x[2] conj(x[0]) = -1
        assert_eq!(dest[2], Complex32::new(-1.0, 0.0));
    }

    #[rstest]
    fn lag_zero_is_real_and_non_negative(#[values(1, 7, 100)] seed: u64) {
        let mut signal = vec![Complex32::new(0.0, 0.0); 64];
        sigen::Noise::with_seed(seed, 0.8)
            .mix(sigen::Tone::new(5.3, 0.4))
            .fill_buffer(0, &mut signal);
        let mut dest = vec![Complex32::new(0.0, 0.0); 8];
        auto_correlation(8, &signal, &mut dest);
        assert_eq!(dest[0].im, 0.0);
        assert!(dest[0].re >= 0.0);
        let energy: f32 = signal.iter().map(Complex32::norm_sqr).sum();
        assert_close!(dest[0].re, energy, rtol = 1e-5, atol = 1e-5);
    }

    #[test]
    fn lags_beyond_signal_are_zero() {
        let signal = [Complex32::new(1.0, 1.0), Complex32::new(2.0, 0.0)];
        let mut dest = [Complex32::new(9.0, 9.0); 4];
        auto_correlation(4, &signal, &mut dest);
        assert_eq!(dest[2], Complex32::new(0.0, 0.0));
        assert_eq!(dest[3], Complex32::new(0.0, 0.0));
    }

    #[rstest]
    fn toeplitz_entries_depend_only_on_lag(#[values(2, 3, 8, 13)] order: usize) {
        let mut signal = vec![Complex32::new(0.0, 0.0); 40];
        sigen::Noise::with_seed(order as u64, 1.0).fill_buffer(0, &mut signal);
        let mut packed = vec![Complex32::new(0.0, 0.0); packed_len(order)];
        packed_auto_correlation(order, &signal, &mut packed);

        let mut lags = vec![Complex32::new(0.0, 0.0); order];
        auto_correlation(order, &signal, &mut lags);
        for col in 0..order {
            for row in col..order {
                assert_eq!(
                    packed[packed_index(order, row, col)],
                    lags[row - col],
                    "mismatch at ({row}, {col})"
                );
            }
        }
    }
}
