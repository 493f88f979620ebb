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

//! Configuration constants

// Constants sorted in an alphabetical-order.  Top-level constants first, and
// then sub-modules. Constants that are used only in a specific sub-module or
// its caller should be placed in the corresponding submodule.

/// Minimum length of an input window.
pub const MIN_INPUT_LEN: usize = 2;

/// Minimum order of the auto-correlation matrix.
pub const MIN_ACM_ORDER: usize = 2;

/// Upper limit of the overlap factor between successive input windows.
pub const MAX_OVERLAP: f32 = 0.999_999;

/// Sub-module containing constants related to build-time information.
pub mod build_info {
    pub const CRATE_VERSION: &str = match option_env!("CARGO_PKG_VERSION") {
        Some(v) => v,
        None => "unknown",
    };
}

/// Default values used in [`config`].
///
/// [`config`]: crate::config
pub mod defaults {
    /// Default length of the input window.
    pub const INPUT_LEN: usize = 256;

    /// Default order of the auto-correlation matrix.
    pub const ACM_ORDER: usize = 16;

    /// Default number of eigenpairs retained.
    pub const NUM_EIG: usize = 4;
}

/// Constants for the tridiagonal eigensolver.
pub mod eigen {
    /// Maximum number of inverse-iteration steps for a single eigenvector.
    pub const MAX_INVERSE_ITERATIONS: usize = 5;

    /// Number of extra iterations after an iterate passes the norm check.
    pub const EXTRA_INVERSE_ITERATIONS: usize = 2;

    /// Maximum number of bisection steps for a single eigenvalue.
    pub const MAX_BISECTION_STEPS: usize = 256;

    /// Eigenvalues closer than this factor times the block norm are treated as
    /// a cluster and their eigenvectors are re-orthogonalized.
    pub const CLUSTER_TOLERANCE: f32 = 1.0e-3;

    /// Seed for the starting vectors of the inverse iteration.
    pub const STARTING_VECTOR_SEED: u64 = 1;

    /// Smallest matrix norm handled without scaling (`sqrt(SAFE_MIN / EPS)`).
    pub const SCALE_MIN: f32 = 3.140_185e-16;

    /// Largest matrix norm handled without scaling.
    ///
    /// This is `min(sqrt(EPS / SAFE_MIN), 1 / sqrt(sqrt(SAFE_MIN)))`, which
    /// keeps squared off-diagonals and pivot products finite.
    pub const SCALE_MAX: f32 = 3.037_000_4e9;
}

/// Constants related to keys for the environment variables.
pub(crate) mod envvar_key {
    /// Environment variable name for specifying the number of threads.
    #[cfg(feature = "par")]
    pub const DEFAULT_PARALLELISM: &str = "KLT_WORKERS";
}

/// Constants related to par-mode (multithreading.)
#[cfg(feature = "par")]
pub mod par {
    /// The number of window buffers for each worker thread in par-mode.
    pub const WINDOWBUF_MULTIPLICITY: usize = 2;
}

/// Coefficients of the analysis windows.
pub mod window {
    /// Cosine-sum coefficients of the HFT90D flat-top window (harmonics 0-4).
    pub const HFT90D: [f64; 5] = [1.0, -1.942_604, 1.340_318, -0.440_811, 0.043_097];
}

/// Module for internal error messages.
///
/// Use `panic!` and those messages only for env-related unrecoverable errors.
/// It's okay to use them in tests, but it's not okay to add another variable
/// only for test functions.
#[cfg(feature = "par")]
pub(crate) mod panic_msg {
    pub const WINDOWNUM_NOT_SET: &str =
        "INTERNAL ERROR: Window buffer is not properly initialized. (WindowNo. not set).";
    pub const MPMC_SEND_FAILED: &str =
        "INTERNAL ERROR: Critical error occured in multi-thread communication channel.";
    pub const MPMC_RECV_FAILED: &str =
        "INTERNAL ERROR: Critical error occured in multi-thread communication channel.";
    pub const MUTEX_LOCK_FAILED: &str = "INTERNAL ERROR: Couldn't get lock for mutex.";
    pub const RESULT_MISSING: &str =
        "INTERNAL ERROR: Some analysis results were not passed to the sink.";
    pub const THREAD_JOIN_FAILED: &str = "INTERNAL ERROR: Failed to wait thread termination.";
}
