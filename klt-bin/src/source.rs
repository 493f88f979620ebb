// Copyright 2023-2024 Google LLC
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

//! A module for signal sources for "klt-bin".

use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;

use klt::error::SourceError;
use klt::error::SourceErrorReason;
use klt::source::Fill;
use klt::source::Source;

/// Bytes per complex sample (two little-endian `f32`s).
const BYTES_PER_SAMPLE: usize = 8;

/// `klt::source::Source` reading raw interleaved little-endian `f32` pairs.
///
/// Each sample is stored as the real part followed by the imaginary part.
#[allow(clippy::module_name_repetitions)]
pub struct RawFileSource {
    reader: BufReader<File>,
    bytebuf: Vec<u8>,
    file_size: usize,
}

impl RawFileSource {
    /// Constructs `RawFileSource` from `path`.
    ///
    /// # Errors
    ///
    /// The function fails when file is not found, or when the file size is
    /// not a multiple of the sample size.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|_| SourceError::by_reason(SourceErrorReason::Open).set_path(path))?;
        let file_size = file
            .metadata()
            .map_err(|e| SourceError::from_io_error(e).set_path(path))?
            .len() as usize;
        if file_size % BYTES_PER_SAMPLE != 0 {
            return Err(SourceError::by_reason(SourceErrorReason::InvalidFormat).set_path(path));
        }
        Ok(Self {
            reader: BufReader::new(file),
            bytebuf: Vec::new(),
            file_size,
        })
    }

    pub const fn file_size(&self) -> usize {
        self.file_size
    }
}

impl Source for RawFileSource {
    fn read_samples<F: Fill>(&mut self, len: usize, dest: &mut F) -> Result<usize, SourceError> {
        self.bytebuf.resize(len * BYTES_PER_SAMPLE, 0u8);
        let mut read_bytes = 0;
        while read_bytes < self.bytebuf.len() {
            let n = self
                .reader
                .read(&mut self.bytebuf[read_bytes..])
                .map_err(SourceError::from_io_error)?;
            if n == 0 {
                break;
            }
            read_bytes += n;
        }
        if read_bytes % BYTES_PER_SAMPLE != 0 {
            return Err(SourceError::by_reason(SourceErrorReason::InvalidFormat));
        }
        dest.fill_le_bytes(&self.bytebuf[..read_bytes])?;
        Ok(read_bytes / BYTES_PER_SAMPLE)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.file_size / BYTES_PER_SAMPLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use klt::source::Framer;

    fn write_samples(values: &[(f32, f32)]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile failed");
        for (re, im) in values {
            file.write_all(&re.to_le_bytes()).expect("write failed");
            file.write_all(&im.to_le_bytes()).expect("write failed");
        }
        file.flush().expect("flush failed");
        file
    }

    #[test]
    fn reads_windows_from_file() {
        let values: Vec<(f32, f32)> = (0..7).map(|t| (t as f32, -0.5 * t as f32)).collect();
        let file = write_samples(&values);
        let mut src = RawFileSource::from_path(file.path()).expect("open failed");
        assert_eq!(src.len_hint(), Some(7));

        let mut framer = Framer::new(4, 4).expect("alloc failed");
        let first = framer
            .next_window(&mut src)
            .expect("read failed")
            .expect("no window")
            .to_vec();
        assert_eq!(first[3].re, 3.0);
        assert_eq!(first[3].im, -1.5);
        let second = framer
            .next_window(&mut src)
            .expect("read failed")
            .expect("no window")
            .to_vec();
        assert_eq!(second[2].re, 6.0);
        assert_eq!(second[3].re, 0.0);
        assert!(framer.next_window(&mut src).expect("read failed").is_none());
    }

    #[test]
    fn rejects_partial_samples() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile failed");
        file.write_all(&[0u8; 12]).expect("write failed");
        file.flush().expect("flush failed");
        assert!(RawFileSource::from_path(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = RawFileSource::from_path("/nonexistent/input.cf32")
            .err()
            .expect("open should fail");
        assert!(format!("{err}").contains("input.cf32"));
    }
}
