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

//! Fixed-size working buffers.

#[cfg(test)]
use std::cell::Cell;

use num_traits::Zero;

use super::error::AllocError;

#[cfg(test)]
thread_local! {
    static FAILING_BUFFER: Cell<Option<&'static str>> = Cell::new(None);
}

/// Makes every later allocation of the buffer `name` in this thread fail.
#[cfg(test)]
pub fn fail_allocation_of(name: Option<&'static str>) {
    FAILING_BUFFER.with(|b| b.set(name));
}

/// Heap buffer whose length is fixed at construction.
///
/// Unlike `Vec<T>`, the storage is never grown after allocation, and the
/// allocation itself is fallible.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedBuf<T> {
    data: Box<[T]>,
}

impl<T: Zero + Clone> FixedBuf<T> {
    /// Allocates a zero-filled buffer with `size` elements.
    ///
    /// # Errors
    ///
    /// Returns `AllocError` tagged with `name` when the allocator cannot
    /// satisfy the request.
    pub fn zeroed(name: &'static str, size: usize) -> Result<Self, AllocError> {
        #[cfg(test)]
        if FAILING_BUFFER.with(|b| b.get() == Some(name)) {
            return Err(AllocError::new(name, size));
        }
        let mut v: Vec<T> = Vec::new();
        v.try_reserve_exact(size)
            .map_err(|_| AllocError::new(name, size))?;
        v.resize(size, T::zero());
        Ok(Self {
            data: v.into_boxed_slice(),
        })
    }

    /// Resets all elements to zero.
    #[inline]
    pub fn clear(&mut self) {
        fill_zero(&mut self.data);
    }
}

impl<T> FixedBuf<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl<T> std::ops::Deref for FixedBuf<T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> std::ops::DerefMut for FixedBuf<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Overwrites `dest` with zeros.
#[inline]
pub fn fill_zero<T: Zero>(dest: &mut [T]) {
    for p in dest {
        *p = T::zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    #[test]
    fn alloc_and_mutate() {
        let mut buf = FixedBuf::<Complex32>::zeroed("input", 8).expect("alloc failed");
        assert_eq!(buf.len(), 8);
        assert!(buf.iter().all(|x| x.is_zero()));

        buf[2] = Complex32::new(3.0, -1.0);
        assert_eq!(buf[2], Complex32::new(3.0, -1.0));

        buf.clear();
        assert!(buf.iter().all(|x| x.is_zero()));
    }

    #[test]
    fn oversized_request_is_reported() {
        let err = FixedBuf::<f32>::zeroed("acm", usize::MAX).unwrap_err();
        assert_eq!(err.buffer(), "acm");
        assert_eq!(err.size(), usize::MAX);
    }

    #[test]
    fn injected_failure_only_hits_the_named_buffer() {
        fail_allocation_of(Some("acm"));
        let err = FixedBuf::<f32>::zeroed("acm", 10).unwrap_err();
        let other = FixedBuf::<f32>::zeroed("input", 10);
        fail_allocation_of(None);
        assert_eq!(err.buffer(), "acm");
        assert_eq!(err.size(), 10);
        assert!(other.is_ok());
        assert!(FixedBuf::<f32>::zeroed("acm", 10).is_ok());
    }

    #[test]
    fn zero_length_is_allowed() {
        let buf = FixedBuf::<f32>::zeroed("empty", 0).expect("alloc failed");
        assert_eq!(buf.len(), 0);
    }
}
