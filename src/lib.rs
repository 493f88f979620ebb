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

#![doc = include_str!("../README.md")]
// Note that clippy attributes should be in sync with those declared in "main.rs"
#![warn(clippy::all, clippy::nursery, clippy::pedantic, clippy::cargo)]
// Some of clippy::pedantic rules are actually useful, so use it with a lot of
// ad-hoc exceptions.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::many_single_char_names,
    clippy::missing_const_for_fn,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate,
    clippy::similar_names,
    clippy::wildcard_dependencies
)]
// Some from restriction lint-group
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::dbg_macro,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::if_then_some_else_none,
    clippy::impl_trait_in_params,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::multiple_inherent_impl,
    clippy::print_stdout,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::separated_literal_suffix,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::try_err,
    clippy::unnecessary_self_imports,
    clippy::wildcard_enum_match_arm
)]

pub mod acorr;
pub(crate) mod arrayutils;
pub mod config;
pub mod constant;
pub mod engine;
pub mod error;
pub mod linalg;
pub(crate) mod mem;
#[cfg(feature = "par")]
pub(crate) mod par;
pub mod source;
pub mod window;

#[cfg(any(test, feature = "__export_sigen"))]
pub mod sigen;

#[cfg(test)]
pub mod test_helper;

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// import global entry points
pub use engine::analyze;
pub use engine::Klt;

#[cfg(test)]
mod test {
    // end-to-end, but transparent test.
    use super::*;
    use sigen::Signal;

    use rstest::rstest;

    const ANALYZER_CONFIGS: [&str; 5] = [
        "",
        r"
overlap = 0.5
        ",
        r"
[klt]
input_len = 64
acm_order = 12
num_eig = 3
        ",
        r"
overlap = 0.75
[klt]
window = { type = 'Hft90d' }
normalize_eigenvalues = true
        ",
        r"
multithread = false
        ",
    ];

    #[rstest]
    fn e2e_with_generated_tones(
        #[values(1000, 4321)] signal_len: usize,
        #[values(ANALYZER_CONFIGS[0],
                 ANALYZER_CONFIGS[1],
                 ANALYZER_CONFIGS[2],
                 ANALYZER_CONFIGS[3],
                 ANALYZER_CONFIGS[4])]
        config: &str,
    ) {
        let config: config::Analyzer = toml::from_str(config).expect("config parsing error");
        let signal = sigen::Tone::new(23.0, 1.0)
            .mix(sigen::Tone::new(-7.5, 0.25))
            .noise_with_seed(123, 0.05)
            .to_vec(signal_len);

        let stride = config.stride();
        let input_len = config.klt.input_len;
        let expected_windows = 1 + (signal_len.saturating_sub(input_len) + stride - 1) / stride;

        let mut outputs = vec![];
        let count = analyze(&config, source::MemSource::from_samples(&signal), |out| {
            outputs.push(out);
        })
        .expect("analysis failed");
        assert_eq!(count, expected_windows);
        assert_eq!(outputs.len(), expected_windows);

        for (i, out) in outputs.iter().enumerate() {
            assert_eq!(out.index, i);
            assert!(out.status.is_ok(), "window #{i} failed: {:?}", out.status);
            assert_eq!(out.eigenvalues.len(), config.klt.num_eig);
            assert_eq!(
                out.basis.len(),
                config.klt.num_eig * config.klt.acm_order
            );
            assert!(out.diagnostics.is_nominal());
            assert!(out.eigenvalues.windows(2).all(|w| w[0] <= w[1]));
            crate::assert_finite!(out.eigenvalues);
            if config.klt.normalize_eigenvalues {
                assert_eq!(*out.eigenvalues.last().expect("no eigenvalue"), 1.0);
            }
        }
    }
}
