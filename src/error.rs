// Copyright 2022-2024 Google LLC
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

//! Error and verification traits

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

/// Error object returned when config integrity verification failed.
///
/// This error maintains a path to the component that is actually erroneous
/// in the nested components.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct VerifyError {
    components: Vec<String>,
    reason: String,
}

impl VerifyError {
    /// Makes verification error for an invalid variable `component`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// let err = VerifyError::new("num_eig", "must be non-zero");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "verification error: `num_eig` is not valid. reason: must be non-zero"
    /// );
    /// ```
    pub fn new(component: &str, reason: &str) -> Self {
        Self {
            components: vec![component.to_owned()],
            reason: reason.to_owned(),
        }
    }

    /// Prepends the name of an enclosing component to the error location.
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// let err = VerifyError::new("num_eig", "must be non-zero");
    /// let err = err.within("klt");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "verification error: `klt.num_eig` is not valid. reason: must be non-zero"
    /// );
    /// ```
    #[must_use]
    pub fn within(self, component: &str) -> Self {
        let mut components = self.components;
        let reason = self.reason;
        components.push(component.to_owned());
        Self { components, reason }
    }

    /// Gets dot-separated path string for the error location.
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// let err = VerifyError::new("num_eig", "must be non-zero");
    /// let err = err.within("klt");
    /// assert_eq!(err.path(), "klt.num_eig");
    /// ```
    pub fn path(&self) -> String {
        let mut path = String::new();
        for (i, name) in self.components.iter().rev().enumerate() {
            if i != 0 {
                path.push('.');
            }
            path.push_str(name);
        }
        path
    }
}

impl Error for VerifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verification error: `{}` is not valid. reason: {}",
            self.path(),
            self.reason
        )
    }
}

/// A wrapper that ensures that the inner `T` is verified and unchanged.
///
/// `Verified<T>` can be obtained via [`Verify::into_verified`] or
/// [`Verify::assume_verified`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Verified<T>(T);

impl<T> std::ops::Deref for Verified<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

/// Trait for verifiable structs.
pub trait Verify: Sized + seal_verify::Sealed {
    /// Verifies there's no internal data inconsistency.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if there's an invalid variable.
    ///
    /// # Examples
    ///
    /// [`config::Klt`] implements `Verify`.
    ///
    /// [`config::Klt`]: crate::config::Klt
    ///
    /// ```
    /// # use klt::error::*;
    /// # use klt::config::Klt;
    /// let mut conf = Klt::default();
    /// conf.num_eig = conf.acm_order + 1;  // invalid setting
    /// assert!(conf.verify().is_err());
    ///
    /// conf.num_eig = conf.acm_order; // valid setting
    /// assert!(conf.verify().is_ok());
    /// ```
    fn verify(&self) -> Result<(), VerifyError>;

    /// Wraps into `Verified` to indicate that the data is already verified.
    ///
    /// # Errors
    ///
    /// Returns the original input and `VerifyError` if `verify` failed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// # use klt::config::Klt;
    /// let mut conf = Klt::default();
    /// conf.acm_order = conf.input_len + 1;  // invalid setting
    /// assert!(conf.clone().into_verified().is_err());
    ///
    /// conf.acm_order = conf.input_len;
    /// let verified = conf.into_verified().unwrap();
    /// assert_eq!(verified.acm_order, verified.input_len);
    /// ```
    fn into_verified(self) -> Result<Verified<Self>, (Self, VerifyError)> {
        let result = self.verify();
        if let Err(e) = result {
            Err((self, e))
        } else {
            Ok(Verified(self))
        }
    }

    /// Wraps into `Verified` without actual verification.
    ///
    /// # Safety
    ///
    /// The use of `Verified` data obtained this way may cause an unexpected
    /// behavior. It should be okay if the data are previously verified with
    /// `verify` function and have not been changed after that.
    unsafe fn assume_verified(self) -> Verified<Self> {
        Verified(self)
    }
}

/// A wrapping function to make it compatible with "?" operator.
pub(crate) fn verify_macro_impl(cond: bool, varname: &str, msg: &str) -> Result<(), VerifyError> {
    if !cond {
        return Err(VerifyError::new(varname, msg));
    }
    Ok(())
}

/// Checks if `$cond` is true and do `return Err(...)` if so.
///
/// An error object `VerifyErr` is constructed using `$varname` and
/// `$msg` that are formatted using the extra args (`$args`).
macro_rules! verify_true {
    ($varname:literal, $cond:expr, $msg:literal, $($args: expr),*) => {
        crate::error::verify_macro_impl(
            $cond,
            &format!($varname, $($args),*),
            &format!($msg, $($args),*),
        )
    };
    ($varname:literal, $cond:expr, $msg:literal) => {
        verify_true!($varname, $cond, $msg,)
    }
}
pub(crate) use verify_true;

/// Checks if `$actual` is in the range, and emits err with default msgs if not.
///
/// An error is constructed using the same way as [`verify_true`].
macro_rules! verify_range {
    ($varname: literal, $actual:expr, $lowlimit:tt ..= $highlimit:tt) => {
        verify_range!($varname, $actual, ($lowlimit)..)
            .and_then(|()| verify_range!($varname, $actual, ..=($highlimit)))
    };
    ($varname: literal, $actual:expr, $lowlimit:tt ..) => {{
        #[allow(unused_parens)]
        let limit = $lowlimit;
        verify_true!(
            $varname,
            $actual >= limit,
            "must be greater than or equal to {limit}"
        )
    }};
    ($varname: literal, $actual:expr, ..= $highlimit:tt) => {{
        #[allow(unused_parens)]
        let limit = $highlimit;
        verify_true!(
            $varname,
            $actual <= limit,
            "must be less than or equal to {limit}"
        )
    }};
}
pub(crate) use verify_range;

/// Error emitted when a working buffer of the engine cannot be allocated.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct AllocError {
    buffer: &'static str,
    size: usize,
}

impl AllocError {
    /// Makes an allocation error for `buffer` with the requested element count.
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// let err = AllocError::new("acm_buf", 136);
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "failed to allocate `acm_buf` (size 136)"
    /// );
    /// ```
    pub const fn new(buffer: &'static str, size: usize) -> Self {
        Self { buffer, size }
    }

    /// Returns the name of the buffer that could not be allocated.
    pub const fn buffer(&self) -> &'static str {
        self.buffer
    }

    /// Returns the requested number of elements.
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl Error for AllocError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to allocate `{}` (size {})", self.buffer, self.size)
    }
}

/// Sub-steps of the eigen-subspace solver.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum SolverStep {
    /// Reduction of the packed Hermitian matrix to real tridiagonal form.
    TridiagonalReduction,
    /// Bisection search for the selected eigenvalues.
    EigenvalueSelection,
    /// Inverse iteration for the tridiagonal eigenvectors.
    InverseIteration,
    /// Rotation of the eigenvectors back to the signal basis.
    BackTransformation,
}

impl fmt::Display for SolverStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TridiagonalReduction => "tridiagonal reduction",
            Self::EigenvalueSelection => "eigenvalue selection",
            Self::InverseIteration => "inverse iteration",
            Self::BackTransformation => "back-transformation",
        };
        f.write_str(name)
    }
}

/// Error returned when one of the solver steps reports a non-zero status.
///
/// The status code follows the LAPACK convention: a negative value `-i`
/// indicates that the `i`-th argument of the step was invalid, and a positive
/// value is a step-specific numeric failure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct NumericError {
    step: SolverStep,
    info: i32,
}

impl NumericError {
    /// Makes a numeric error.
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// let err = NumericError::new(SolverStep::InverseIteration, 2);
    /// assert_eq!(format!("{}", err), "inverse iteration failed, info=2");
    /// ```
    pub const fn new(step: SolverStep, info: i32) -> Self {
        Self { step, info }
    }

    /// Returns the step that failed.
    pub const fn step(&self) -> SolverStep {
        self.step
    }

    /// Returns the status code reported by the step.
    pub const fn info(&self) -> i32 {
        self.info
    }
}

impl Error for NumericError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed, info={}", self.step, self.info)
    }
}

/// Enum for possible errors in stream analysis.
///
/// Failures of individual windows are not listed here because they are not
/// fatal to a stream; see [`WindowOutput::status`].
///
/// [`WindowOutput::status`]: crate::engine::WindowOutput::status
#[non_exhaustive]
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug)]
pub enum AnalysisError {
    /// Errors due to input sources.
    Source(SourceError),
    /// Errors due to invalid configuration.
    Config(VerifyError),
    /// Errors while allocating engine buffers.
    Alloc(AllocError),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => e.fmt(f),
            Self::Config(e) => e.fmt(f),
            Self::Alloc(e) => e.fmt(f),
        }
    }
}

impl Error for AnalysisError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(e) => e.source(),
            Self::Config(e) => e.source(),
            Self::Alloc(e) => e.source(),
        }
    }
}

impl From<SourceError> for AnalysisError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

impl From<VerifyError> for AnalysisError {
    fn from(e: VerifyError) -> Self {
        Self::Config(e)
    }
}

impl From<AllocError> for AnalysisError {
    fn from(e: AllocError) -> Self {
        Self::Alloc(e)
    }
}

/// Struct that wraps errors from [`Source`].
///
/// [`Source`]: crate::source::Source
#[derive(Clone, Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct SourceError {
    source_name: Option<String>,
    reason: SourceErrorReason,
}

impl SourceError {
    /// Constructs `SourceError` by choosing a reason.
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// let err = SourceError::by_reason(SourceErrorReason::Open);
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "error occurred while reading <unknown>. reason: cannot open file."
    /// );
    /// ```
    pub const fn by_reason(reason: SourceErrorReason) -> Self {
        Self {
            source_name: None,
            reason,
        }
    }

    /// Constructs `SourceError` from an [`io::Error`].
    ///
    /// [`io::Error`]: std::io::Error
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// # use std::io;
    /// let err = SourceError::from_io_error(io::Error::new(io::ErrorKind::Other, "oh no!"));
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "error occurred while reading <unknown>. reason: I/O error: oh no!."
    /// );
    /// ```
    pub fn from_io_error<E: Error + 'static>(e: E) -> Self {
        Self {
            source_name: None,
            reason: SourceErrorReason::IO(Some(Rc::new(e))),
        }
    }

    /// Set path as the source name (informative when [`Source`] is file-based.)
    ///
    /// [`Source`]: crate::source::Source
    ///
    /// # Examples
    ///
    /// ```
    /// # use klt::error::*;
    /// let err = SourceError::by_reason(SourceErrorReason::Open);
    /// let err = err.set_path("missing.cf32");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "error occurred while reading missing.cf32. reason: cannot open file."
    /// );
    /// ```
    #[must_use]
    pub fn set_path<P: AsRef<Path>>(self, path: P) -> Self {
        Self {
            source_name: Some(path.as_ref().to_string_lossy().to_string()),
            ..self
        }
    }
}

/// Enum covering possible error reasons from [`Source`].
///
/// [`Source`]: crate::source::Source
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum SourceErrorReason {
    /// The source file cannot be opened.
    Open,
    /// The content of file is not readable.
    InvalidFormat,
    /// Other IO-related error.
    IO(Option<Rc<dyn Error + 'static>>),
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error occurred while reading {}. reason: {}.",
            self.source_name
                .as_ref()
                .map_or("<unknown>", String::as_str),
            self.reason
        )
    }
}

impl fmt::Display for SourceErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => {
                write!(f, "cannot open file")
            }
            Self::InvalidFormat => {
                write!(f, "source format is invalid")
            }
            Self::IO(Some(cause)) => {
                write!(f, "I/O error: {cause}")
            }
            Self::IO(None) => {
                write!(f, "unknown I/O error")
            }
        }
    }
}

mod seal_verify {
    pub trait Sealed {}

    impl Sealed for crate::config::Analyzer {}
    impl Sealed for crate::config::Klt {}
}
