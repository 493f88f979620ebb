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

//! Module for input source handling.

use num_complex::Complex32;

use super::arrayutils::le_bytes_to_complex32s;
use super::arrayutils::COMPLEX32_BYTES;
use super::error::AllocError;
use super::error::SourceError;
use super::error::SourceErrorReason;
use super::mem::fill_zero;
use super::mem::FixedBuf;

/// Trait representing the input sample buffer for a [`Source`].
pub trait Fill {
    /// Fills the target variable with the given complex samples.
    ///
    /// # Errors
    ///
    /// This function can return `SourceError` if the destination cannot
    /// accept the samples.
    fn fill_samples(&mut self, samples: &[Complex32]) -> Result<(), SourceError>;

    /// Fills the target variable with interleaved little-endian `f32` pairs.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` with `InvalidFormat` reason when the length of
    /// `bytes` is not a multiple of eight.
    fn fill_le_bytes(&mut self, bytes: &[u8]) -> Result<(), SourceError>;
}

/// Trait representing the input stream of complex samples.
pub trait Source {
    /// Reads at most `len` samples, and feeds them to `dest`.
    ///
    /// Returns the number of samples read. Zero means the end of the stream.
    ///
    /// # Errors
    ///
    /// This function can return `SourceError` when the underlying storage
    /// failed.
    fn read_samples<F: Fill>(&mut self, len: usize, dest: &mut F) -> Result<usize, SourceError>;

    /// Returns the total number of samples if it is known in advance.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl<T: Source> Source for &mut T {
    fn read_samples<F: Fill>(&mut self, len: usize, dest: &mut F) -> Result<usize, SourceError> {
        T::read_samples(self, len, dest)
    }

    fn len_hint(&self) -> Option<usize> {
        T::len_hint(self)
    }
}

/// Source preloaded into memory.
#[derive(Clone, Debug)]
pub struct MemSource {
    samples: Vec<Complex32>,
    read_head: usize,
}

impl MemSource {
    /// Constructs `MemSource` from samples.
    pub fn from_samples(samples: &[Complex32]) -> Self {
        Self {
            samples: samples.to_owned(),
            read_head: 0,
        }
    }

    /// Constructs `MemSource` from interleaved little-endian `f32` pairs.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` when the length of `bytes` is not a multiple of
    /// eight.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, SourceError> {
        if bytes.len() % COMPLEX32_BYTES != 0 {
            return Err(SourceError::by_reason(SourceErrorReason::InvalidFormat));
        }
        let mut samples = vec![Complex32::new(0.0, 0.0); bytes.len() / COMPLEX32_BYTES];
        le_bytes_to_complex32s(bytes, &mut samples);
        Ok(Self {
            samples,
            read_head: 0,
        })
    }

    /// Returns samples as a slice.
    pub fn as_slice(&self) -> &[Complex32] {
        &self.samples
    }
}

impl Source for MemSource {
    fn read_samples<F: Fill>(&mut self, len: usize, dest: &mut F) -> Result<usize, SourceError> {
        let begin = self.read_head.min(self.samples.len());
        let end = begin.saturating_add(len).min(self.samples.len());
        dest.fill_samples(&self.samples[begin..end])?;
        self.read_head = end;
        Ok(end - begin)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.samples.len())
    }
}

/// `Fill` that writes into the tail of a window buffer.
///
/// Samples beyond the remaining capacity are dropped.
struct WindowTail<'a> {
    dest: &'a mut [Complex32],
    filled: usize,
}

impl Fill for WindowTail<'_> {
    fn fill_samples(&mut self, samples: &[Complex32]) -> Result<(), SourceError> {
        let dest = &mut self.dest[self.filled..];
        let n = dest.len().min(samples.len());
        dest[..n].copy_from_slice(&samples[..n]);
        self.filled += n;
        Ok(())
    }

    fn fill_le_bytes(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        if bytes.len() % COMPLEX32_BYTES != 0 {
            return Err(SourceError::by_reason(SourceErrorReason::InvalidFormat));
        }
        let dest = &mut self.dest[self.filled..];
        let n = dest.len().min(bytes.len() / COMPLEX32_BYTES);
        le_bytes_to_complex32s(&bytes[..n * COMPLEX32_BYTES], &mut dest[..n]);
        self.filled += n;
        Ok(())
    }
}

/// Splits a stream into overlapping windows.
///
/// The first window takes `input_len` samples from the source. Every
/// following window shifts the previous one by `stride` samples and reads
/// `stride` new samples. A short read is zero-padded, and a read of no new
/// samples ends the stream.
#[derive(Clone, Debug)]
pub struct Framer {
    buf: FixedBuf<Complex32>,
    stride: usize,
    primed: bool,
    exhausted: bool,
}

impl Framer {
    /// Constructs a framer for windows of `input_len` samples.
    ///
    /// # Errors
    ///
    /// Returns `AllocError` if the window buffer cannot be allocated.
    pub fn new(input_len: usize, stride: usize) -> Result<Self, AllocError> {
        Ok(Self {
            buf: FixedBuf::zeroed("window", input_len)?,
            stride: stride.clamp(1, input_len.max(1)),
            primed: false,
            exhausted: false,
        })
    }

    /// Returns the number of new samples read for each window after the
    /// first.
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Reads the next window from `src`.
    ///
    /// Returns `None` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Source::read_samples`].
    pub fn next_window<S: Source>(
        &mut self,
        src: &mut S,
    ) -> Result<Option<&[Complex32]>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }
        let len = self.buf.len();
        let keep = if self.primed {
            len.saturating_sub(self.stride)
        } else {
            0
        };
        if keep > 0 {
            self.buf.copy_within(self.stride.., 0);
        }

        let mut tail = WindowTail {
            dest: &mut self.buf[keep..],
            filled: 0,
        };
        let read = src.read_samples(len - keep, &mut tail)?;
        let filled = tail.filled;
        if read == 0 {
            self.exhausted = true;
            return Ok(None);
        }
        fill_zero(&mut self.buf[(keep + filled)..]);
        self.primed = true;
        Ok(Some(&self.buf))
    }
}
