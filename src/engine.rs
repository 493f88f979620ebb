// Copyright 2024 Google LLC
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

//! Truncated Karhunen-Loeve transform of complex windows.

use std::io;

#[cfg(feature = "log")]
use log::{debug, trace, warn};
use num_complex::Complex32;

use super::acorr;
use super::arrayutils::complex32s_to_le_bytes;
use super::arrayutils::f32s_to_le_bytes;
use super::config;
use super::error::AllocError;
use super::error::AnalysisError;
use super::error::NumericError;
use super::error::SolverStep;
use super::error::Verified;
use super::error::Verify;
use super::linalg::HermitianEigenSolver;
use super::linalg::range_scale;
use super::linalg::NativeSolver;
use super::mem::fill_zero;
use super::mem::FixedBuf;
#[cfg(feature = "par")]
use super::par;
use super::source::Framer;
use super::source::Source;

/// Non-fatal facts about the last eigenvalue search.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Diagnostics {
    /// Number of eigenvalues requested.
    pub requested: usize,
    /// Number of eigenvalues the selection actually returned.
    pub found: usize,
    /// Number of diagonal blocks the tridiagonal matrix was split into.
    pub blocks: usize,
}

impl Diagnostics {
    /// Returns `true` if all the requested eigenvalues were found in an
    /// unsplit matrix.
    pub const fn is_nominal(&self) -> bool {
        self.found == self.requested && self.blocks <= 1
    }
}

/// KLT engine for a fixed window configuration.
///
/// All the buffers are allocated on construction and reused for every call
/// of [`Klt::transform`]. The engine is not meant to be shared between
/// threads, but it can be moved to another thread.
///
/// # Examples
///
/// ```
/// use klt::config;
/// use klt::error::Verify;
/// use num_complex::Complex32;
///
/// let mut conf = config::Klt::default();
/// conf.input_len = 32;
/// conf.acm_order = 8;
/// conf.num_eig = 2;
/// let conf = conf.into_verified().expect("config should be valid");
///
/// let mut engine = klt::Klt::new(&conf).expect("allocation failed");
/// for (t, x) in engine.input_mut().iter_mut().enumerate() {
///     *x = Complex32::from_polar(1.0, 0.3 * t as f32);
/// }
/// engine.transform().expect("decomposition failed");
/// assert_eq!(engine.eigenvalues().len(), 2);
/// assert!(engine.eigenvalues()[1] >= engine.eigenvalues()[0]);
/// assert_eq!(engine.basis().len(), 16);
/// ```
#[derive(Clone, Debug)]
pub struct Klt<S = NativeSolver> {
    config: Verified<config::Klt>,
    solver: S,
    window: Option<FixedBuf<f32>>,
    input: FixedBuf<Complex32>,
    acm: FixedBuf<Complex32>,
    eigenvalues: FixedBuf<f32>,
    coefficients: FixedBuf<Complex32>,
    basis: FixedBuf<Complex32>,
    diag: FixedBuf<f32>,
    offdiag: FixedBuf<f32>,
    tau: FixedBuf<Complex32>,
    iblock: FixedBuf<usize>,
    isplit: FixedBuf<usize>,
    ifail: FixedBuf<usize>,
    diagnostics: Diagnostics,
}

#[allow(clippy::multiple_inherent_impl)]
impl Klt {
    /// Constructs an engine with the built-in eigensolver.
    ///
    /// # Errors
    ///
    /// Returns `AllocError` if one of the working buffers cannot be
    /// allocated.
    pub fn new(config: &Verified<config::Klt>) -> Result<Self, AllocError> {
        let solver = NativeSolver::with_order(config.acm_order)?;
        Self::with_solver(config, solver)
    }
}

impl<S: HermitianEigenSolver> Klt<S> {
    /// Constructs an engine that uses `solver` for the decomposition.
    ///
    /// # Errors
    ///
    /// Returns `AllocError` if one of the working buffers cannot be
    /// allocated.
    pub fn with_solver(config: &Verified<config::Klt>, solver: S) -> Result<Self, AllocError> {
        let n = config.acm_order;
        let k = config.num_eig;
        let window = if config.window.is_enabled() {
            let mut weights = FixedBuf::zeroed("window", config.input_len)?;
            config.window.fill_weights(&mut weights);
            Some(weights)
        } else {
            None
        };
        let ret = Self {
            config: config.clone(),
            solver,
            window,
            input: FixedBuf::zeroed("input", config.input_len)?,
            acm: FixedBuf::zeroed("acm", acorr::packed_len(n))?,
            eigenvalues: FixedBuf::zeroed("eigenvalues", n)?,
            coefficients: FixedBuf::zeroed("coefficients", k)?,
            basis: FixedBuf::zeroed("basis", n * k)?,
            diag: FixedBuf::zeroed("diag", n)?,
            offdiag: FixedBuf::zeroed("offdiag", n.saturating_sub(1))?,
            tau: FixedBuf::zeroed("tau", n.saturating_sub(1))?,
            iblock: FixedBuf::zeroed("iblock", n)?,
            isplit: FixedBuf::zeroed("isplit", n)?,
            ifail: FixedBuf::zeroed("ifail", k)?,
            diagnostics: Diagnostics::default(),
        };
        #[cfg(feature = "log")]
        debug!(
            "KLT engine constructed (input_len={}, acm_order={}, num_eig={}, window={:?})",
            config.input_len, n, k, config.window
        );
        Ok(ret)
    }

    /// Returns the configuration of this engine.
    pub fn config(&self) -> &Verified<config::Klt> {
        &self.config
    }

    /// Returns the input window.
    pub fn input(&self) -> &[Complex32] {
        &self.input
    }

    /// Returns the input window for writing.
    ///
    /// The window function is applied to this buffer in place when
    /// [`Klt::transform`] is called.
    pub fn input_mut(&mut self) -> &mut [Complex32] {
        &mut self.input
    }

    /// Copies `samples` to the input window.
    ///
    /// Samples beyond the window length are ignored, and a short input is
    /// zero-padded.
    pub fn load_input(&mut self, samples: &[Complex32]) {
        let n = self.input.len().min(samples.len());
        self.input[..n].copy_from_slice(&samples[..n]);
        fill_zero(&mut self.input[n..]);
    }

    /// Returns the retained eigenvalues.
    ///
    /// Eigenvalues are grouped by the diagonal blocks of the tridiagonal
    /// matrix and ascending within each block. Hence, unless the matrix is
    /// split (see [`Klt::diagnostics`]), they are in ascending order and the
    /// dominant eigenvalue is the last element.
    pub fn eigenvalues(&self) -> &[f32] {
        &self.eigenvalues[..self.config.num_eig]
    }

    /// Returns the projection of the input onto each basis function.
    pub fn coefficients(&self) -> &[Complex32] {
        &self.coefficients
    }

    /// Returns the weighted basis as a column-major `acm_order x num_eig`
    /// matrix.
    pub fn basis(&self) -> &[Complex32] {
        &self.basis
    }

    /// Returns the `i`-th weighted basis function.
    pub fn basis_function(&self, i: usize) -> Option<&[Complex32]> {
        self.basis.chunks_exact(self.config.acm_order).nth(i)
    }

    /// Returns the diagnostics of the last transform.
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Returns the eigensolver.
    pub const fn solver(&self) -> &S {
        &self.solver
    }

    /// Transforms the current input window.
    ///
    /// On success, the eigenvalues, the coefficients, and the weighted basis
    /// are updated. If fewer eigenvalues than requested are found, the
    /// missing entries are zero and the reason is recorded in
    /// [`Klt::diagnostics`].
    ///
    /// # Errors
    ///
    /// Returns `NumericError` tagged with the failed solver step. The
    /// eigenvalues, the coefficients, and the basis are zero-filled in that
    /// case, and the engine can be reused for the next window.
    pub fn transform(&mut self) -> Result<(), NumericError> {
        if let Some(window) = &self.window {
            for (x, w) in self.input.iter_mut().zip(window.iter()) {
                *x *= *w;
            }
        }
        acorr::packed_auto_correlation(self.config.acm_order, &self.input, &mut self.acm);

        if let Err(e) = self.decompose() {
            self.reset_outputs();
            #[cfg(feature = "log")]
            debug!("KLT decomposition failed: {e}");
            return Err(e);
        }
        if self.config.normalize_eigenvalues {
            normalize_eigenvalues(&mut self.eigenvalues[..self.config.num_eig]);
        }
        self.project();
        self.weight();
        #[cfg(feature = "log")]
        trace!(
            "KLT transform done (dominant eigenvalue={})",
            self.eigenvalues[self.config.num_eig - 1]
        );
        Ok(())
    }

    /// Runs the four solver steps on the packed auto-correlation matrix.
    ///
    /// The matrix is scaled into the working range of the solver first, and
    /// the eigenvalues are scaled back after the eigenvectors are computed.
    fn decompose(&mut self) -> Result<(), NumericError> {
        let n = self.config.acm_order;
        let k = self.config.num_eig;
        self.diagnostics = Diagnostics {
            requested: k,
            ..Diagnostics::default()
        };

        let norm = self.acm.iter().fold(0.0f32, |acc, a| acc.max(a.norm()));
        let scale = range_scale(norm);
        if scale != 1.0 {
            for a in self.acm.iter_mut() {
                *a *= scale;
            }
        }

        self.solver
            .reduce_to_tridiagonal(
                n,
                &mut self.acm,
                &mut self.diag,
                &mut self.offdiag,
                &mut self.tau,
            )
            .map_err(|info| NumericError::new(SolverStep::TridiagonalReduction, info))?;

        let selection = self
            .solver
            .select_eigenvalues(
                n,
                n - k + 1,
                n,
                &self.diag,
                &self.offdiag,
                &mut self.eigenvalues,
                &mut self.iblock,
                &mut self.isplit,
            )
            .map_err(|info| NumericError::new(SolverStep::EigenvalueSelection, info))?;
        let found = selection.found.min(k);
        let blocks = selection.blocks.min(n);
        self.diagnostics = Diagnostics {
            requested: k,
            found: selection.found,
            blocks: selection.blocks,
        };
        if found != k {
            #[cfg(feature = "log")]
            warn!("eigenvalue search found {} of {k} eigenvalues", selection.found);
            fill_zero(&mut self.eigenvalues[found..k]);
        }
        #[cfg(feature = "log")]
        if blocks > 1 {
            debug!("tridiagonal matrix split into {blocks} blocks");
        }

        let (vectors, missing) = self.basis.split_at_mut(n * found);
        fill_zero(missing);
        self.solver
            .inverse_iteration(
                n,
                &self.diag,
                &self.offdiag,
                &self.eigenvalues[..found],
                &self.iblock[..found],
                &self.isplit[..blocks],
                vectors,
                &mut self.ifail[..found],
            )
            .map_err(|info| NumericError::new(SolverStep::InverseIteration, info))?;
        self.solver
            .back_transform(n, &self.acm, &self.tau, vectors)
            .map_err(|info| NumericError::new(SolverStep::BackTransformation, info))?;
        if scale != 1.0 {
            for w in &mut self.eigenvalues[..found] {
                *w /= scale;
            }
        }
        Ok(())
    }

    /// Computes `coefficients[j] = v_j^H x` over the first `acm_order`
    /// samples of the (windowed) input.
    fn project(&mut self) {
        let n = self.config.acm_order;
        let x = &self.input[..n];
        for (coef, v) in self.coefficients.iter_mut().zip(self.basis.chunks_exact(n)) {
            *coef = v
                .iter()
                .zip(x)
                .fold(Complex32::new(0.0, 0.0), |acc, (vt, xt)| acc + vt.conj() * xt);
        }
    }

    /// Scales each basis function by its coefficient.
    fn weight(&mut self) {
        let n = self.config.acm_order;
        for (coef, v) in self.coefficients.iter().zip(self.basis.chunks_exact_mut(n)) {
            for p in v {
                *p *= *coef;
            }
        }
    }

    fn reset_outputs(&mut self) {
        fill_zero(&mut self.eigenvalues[..self.config.num_eig]);
        self.coefficients.clear();
        self.basis.clear();
    }

    /// Copies the current results into a [`WindowOutput`].
    pub fn output(&self, index: usize, status: Result<(), NumericError>) -> WindowOutput {
        WindowOutput {
            index,
            eigenvalues: self.eigenvalues().to_vec(),
            coefficients: self.coefficients().to_vec(),
            basis: self.basis().to_vec(),
            diagnostics: self.diagnostics,
            status,
        }
    }
}

/// Divides `values` by their maximum.
///
/// Values are left untouched when the maximum is not positive.
fn normalize_eigenvalues(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > 0.0 && max.is_finite() {
        for v in values {
            *v /= max;
        }
    } else {
        #[cfg(feature = "log")]
        warn!("eigenvalue normalization skipped (max={max})");
    }
}

/// Results of a single window in a stream.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowOutput {
    /// Zero-based window index in the stream.
    pub index: usize,
    /// Retained eigenvalues. See [`Klt::eigenvalues`] for the order.
    pub eigenvalues: Vec<f32>,
    /// Projection coefficients.
    pub coefficients: Vec<Complex32>,
    /// Weighted basis in column-major order.
    pub basis: Vec<Complex32>,
    /// Diagnostics of the eigenvalue search.
    pub diagnostics: Diagnostics,
    /// Status of the decomposition. Outputs are zero if this is an error.
    pub status: Result<(), NumericError>,
}

impl WindowOutput {
    /// Writes the eigenvalues as little-endian `f32`s.
    ///
    /// # Errors
    ///
    /// Propagates errors from `dest`.
    pub fn write_eigenvalues<W: io::Write>(&self, dest: &mut W) -> io::Result<()> {
        let mut bytes = vec![];
        f32s_to_le_bytes(&self.eigenvalues, &mut bytes);
        dest.write_all(&bytes)
    }

    /// Writes the coefficients as interleaved little-endian `f32` pairs.
    ///
    /// # Errors
    ///
    /// Propagates errors from `dest`.
    pub fn write_coefficients<W: io::Write>(&self, dest: &mut W) -> io::Result<()> {
        let mut bytes = vec![];
        complex32s_to_le_bytes(&self.coefficients, &mut bytes);
        dest.write_all(&bytes)
    }

    /// Writes the weighted basis as interleaved little-endian `f32` pairs.
    ///
    /// # Errors
    ///
    /// Propagates errors from `dest`.
    pub fn write_basis<W: io::Write>(&self, dest: &mut W) -> io::Result<()> {
        let mut bytes = vec![];
        complex32s_to_le_bytes(&self.basis, &mut bytes);
        dest.write_all(&bytes)
    }
}

/// Analyzes every window of `src` and passes the results to `sink` in the
/// stream order.
///
/// Returns the number of windows analyzed. A numeric failure in a window is
/// reported through [`WindowOutput::status`] and does not stop the analysis.
/// When `config.multithread` is set and the "par" feature is enabled, the
/// windows are distributed to worker threads.
///
/// # Errors
///
/// Returns `AnalysisError` when the configuration is invalid, a buffer cannot
/// be allocated, or `src` fails.
///
/// # Examples
///
/// ```
/// use klt::config;
/// use klt::source::MemSource;
/// use num_complex::Complex32;
///
/// let mut conf = config::Analyzer::default();
/// conf.klt.input_len = 16;
/// conf.klt.acm_order = 4;
/// conf.klt.num_eig = 1;
/// conf.overlap = 0.5;
///
/// let signal: Vec<Complex32> = (0..64)
///     .map(|t| Complex32::from_polar(1.0, 0.2 * t as f32))
///     .collect();
/// let mut dominant = vec![];
/// let count = klt::analyze(&conf, MemSource::from_samples(&signal), |out| {
///     dominant.push(out.eigenvalues[0]);
/// })
/// .expect("analysis failed");
/// assert_eq!(count, 7);
/// assert_eq!(dominant.len(), 7);
/// ```
pub fn analyze<T, F>(config: &config::Analyzer, src: T, sink: F) -> Result<usize, AnalysisError>
where
    T: Source,
    F: FnMut(WindowOutput),
{
    #[cfg(feature = "par")]
    {
        if config.multithread {
            return par::analyze(config, src, sink);
        }
    }
    analyze_sequential(config, src, sink)
}

/// Single-threaded version of [`analyze`].
///
/// # Errors
///
/// Same as [`analyze`].
pub fn analyze_sequential<T, F>(
    config: &config::Analyzer,
    src: T,
    sink: F,
) -> Result<usize, AnalysisError>
where
    T: Source,
    F: FnMut(WindowOutput),
{
    let klt_config = verified_klt_config(config)?;
    let mut engine = Klt::new(&klt_config)?;
    let mut framer = Framer::new(config.klt.input_len, config.stride())?;
    let mut src = src;
    let mut sink = sink;
    let mut index = 0usize;
    while let Some(window) = framer.next_window(&mut src)? {
        engine.load_input(window);
        let status = engine.transform();
        #[cfg(feature = "log")]
        if let Err(e) = &status {
            warn!("window #{index}: {e}");
        }
        sink(engine.output(index, status));
        index += 1;
    }
    Ok(index)
}

/// Verifies `config` and returns the verified engine configuration.
pub(crate) fn verified_klt_config(
    config: &config::Analyzer,
) -> Result<Verified<config::Klt>, AnalysisError> {
    config.verify()?;
    config
        .klt
        .clone()
        .into_verified()
        .map_err(|(_, e)| AnalysisError::from(e.within("klt")))
}
