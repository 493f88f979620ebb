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

//! Analyzer configuration structs.

use std::num::NonZeroUsize;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::defaults;
use super::constant::MAX_OVERLAP;
use super::constant::MIN_ACM_ORDER;
use super::constant::MIN_INPUT_LEN;
use super::error::verify_range;
use super::error::verify_true;
use super::error::Verify;
use super::error::VerifyError;

pub use super::window::Window;

/// Configuration for the KLT engine.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Klt {
    /// Number of complex samples in a single input window.
    pub input_len: usize,
    /// Order of the auto-correlation matrix.
    pub acm_order: usize,
    /// Number of eigenpairs retained.
    pub num_eig: usize,
    /// Window function applied to the input before the estimation.
    pub window: Window,
    /// If set, the eigenvalues are divided by the largest one.
    pub normalize_eigenvalues: bool,
}

impl Default for Klt {
    fn default() -> Self {
        Self {
            input_len: defaults::INPUT_LEN,
            acm_order: defaults::ACM_ORDER,
            num_eig: defaults::NUM_EIG,
            window: Window::default(),
            normalize_eigenvalues: false,
        }
    }
}

impl Verify for Klt {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("input_len", self.input_len, MIN_INPUT_LEN..)?;
        verify_range!(
            "acm_order",
            self.acm_order,
            MIN_ACM_ORDER..=(self.input_len)
        )?;
        verify_range!("num_eig", self.num_eig, 1..=(self.acm_order))?;
        Ok(())
    }
}

/// Configuration for stream analysis.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Analyzer {
    /// Configuration for the per-window engine.
    pub klt: Klt,
    /// Fraction of a window shared with the next window.
    pub overlap: f32,
    /// If set, windows are analyzed by a pool of worker threads.
    pub multithread: bool,
    /// Number of worker threads. If `None`, it is taken from the environment.
    pub workers: Option<NonZeroUsize>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            klt: Klt::default(),
            overlap: 0.0,
            multithread: cfg!(feature = "par"),
            workers: None,
        }
    }
}

impl Analyzer {
    /// Returns the number of new samples consumed for each window.
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::config::Analyzer;
    /// let mut conf = Analyzer::default();
    /// conf.klt.input_len = 100;
    /// conf.overlap = 0.25;
    /// assert_eq!(conf.stride(), 75);
    /// ```
    pub fn stride(&self) -> usize {
        let stride = (self.klt.input_len as f64 * (1.0 - f64::from(self.overlap))).floor();
        (stride as usize).max(1)
    }
}

impl Verify for Analyzer {
    fn verify(&self) -> Result<(), VerifyError> {
        self.klt.verify().map_err(|e| e.within("klt"))?;
        verify_true!("overlap", self.overlap.is_finite(), "must be finite")?;
        verify_range!("overlap", self.overlap, 0.0f32..=MAX_OVERLAP)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Klt::default().verify().is_ok());
        assert!(Analyzer::default().verify().is_ok());
    }

    #[test]
    fn invalid_orders_are_rejected() {
        let mut conf = Klt {
            input_len: 8,
            acm_order: 9,
            num_eig: 2,
            ..Klt::default()
        };
        assert_eq!(conf.verify().unwrap_err().path(), "acm_order");

        conf.acm_order = 1;
        assert_eq!(conf.verify().unwrap_err().path(), "acm_order");

        conf.acm_order = 4;
        conf.num_eig = 0;
        assert_eq!(conf.verify().unwrap_err().path(), "num_eig");

        conf.num_eig = 5;
        assert_eq!(conf.verify().unwrap_err().path(), "num_eig");

        conf.num_eig = 4;
        assert!(conf.verify().is_ok());

        conf.input_len = 1;
        conf.acm_order = 1;
        conf.num_eig = 1;
        assert_eq!(conf.verify().unwrap_err().path(), "input_len");
    }

    #[test]
    fn nested_error_path() {
        let mut conf = Analyzer::default();
        conf.klt.num_eig = 0;
        assert_eq!(conf.verify().unwrap_err().path(), "klt.num_eig");

        let mut conf = Analyzer::default();
        conf.overlap = 1.0;
        assert_eq!(conf.verify().unwrap_err().path(), "overlap");
        conf.overlap = f32::NAN;
        assert_eq!(conf.verify().unwrap_err().path(), "overlap");
    }

    #[test]
    fn stride_is_at_least_one() {
        let mut conf = Analyzer::default();
        conf.klt.input_len = 4;
        conf.overlap = MAX_OVERLAP;
        assert_eq!(conf.stride(), 1);
        conf.overlap = 0.0;
        assert_eq!(conf.stride(), 4);
        conf.overlap = 0.5;
        assert_eq!(conf.stride(), 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialization() {
        let config = Analyzer::default();
        assert!(toml::to_string(&config).is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialization() {
        let src = "
overlap = 0.5

[klt]
acm_order = 7
window = { type = \"Hft90d\" }
";
        let config: Analyzer = toml::from_str(src).expect("Parse error.");
        assert_eq!(config.klt.acm_order, 7);
        assert_eq!(config.klt.window, Window::Hft90d);
        assert_eq!(config.overlap, 0.5);

        // Check the rest is default.
        assert_eq!(config.klt.input_len, defaults::INPUT_LEN);
        assert_eq!(config.klt.num_eig, defaults::NUM_EIG);
        assert!(!config.klt.normalize_eigenvalues);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn if_empty_source_yields_default_config() {
        let empty_src = "";
        let config: Analyzer = toml::from_str(empty_src).expect("Parse error.");
        let default_config: Analyzer = Analyzer::default();
        eprintln!(
            "## Current default config\n\n{}",
            toml::to_string(&config).unwrap()
        );
        assert_eq!(toml::to_string(&config), toml::to_string(&default_config));
    }
}
