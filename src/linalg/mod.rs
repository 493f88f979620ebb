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

//! Selective eigensolver for packed Hermitian matrices.
//!
//! The solver is split into the four primitives the KLT engine needs:
//!
//! 1. Reduction of a packed Hermitian matrix to a real symmetric tridiagonal
//!    matrix by Householder reflections.
//! 2. Selection of eigenvalues by index with Sturm-sequence bisection.
//! 3. Computation of the tridiagonal eigenvectors by inverse iteration.
//! 4. Back-transformation of those vectors by the stored reflections.
//!
//! Every primitive reports its status with an `i32` code: a negative value
//! `-i` means that the `i`-th argument was invalid, and a positive value is a
//! numeric failure specific to the primitive.

mod bisection;
mod householder;
mod inverse_iteration;

use num_complex::Complex32;

use super::constant::eigen::SCALE_MAX;
use super::constant::eigen::SCALE_MIN;
use super::error::AllocError;
use super::mem::FixedBuf;

pub use inverse_iteration::TridiagonalLu;

/// Returns the offset of element `(row, col)` (`row >= col`) in the packed
/// lower-triangular storage of a matrix of order `order`.
///
/// Columns are stored one after another, and column `col` holds rows
/// `col..order`.
///
/// # Examples
///
/// ```
/// # use klt::linalg::packed_index;
/// assert_eq!(packed_index(4, 0, 0), 0);
/// assert_eq!(packed_index(4, 3, 0), 3);
/// assert_eq!(packed_index(4, 1, 1), 4);
/// assert_eq!(packed_index(4, 3, 3), 9);
/// ```
#[inline]
pub const fn packed_index(order: usize, row: usize, col: usize) -> usize {
    row + col * (2 * order - col - 1) / 2
}

/// Returns the factor that brings a matrix with max-norm `norm` into the
/// range where the solver primitives neither overflow nor underflow.
///
/// Eigenvalues of the scaled matrix must be divided by the factor. The factor
/// is one when `norm` is already in range, zero, or not finite.
///
/// # Examples
///
/// ```
/// # use klt::linalg::range_scale;
/// assert_eq!(range_scale(1.0), 1.0);
/// assert_eq!(range_scale(0.0), 1.0);
/// assert!(range_scale(1.0e30) * 1.0e30 <= 3.1e9);
/// assert!(range_scale(1.0e-30) * 1.0e-30 >= 3.1e-16);
/// ```
pub fn range_scale(norm: f32) -> f32 {
    if !norm.is_finite() || norm == 0.0 {
        1.0
    } else if norm < SCALE_MIN {
        SCALE_MIN / norm
    } else if norm > SCALE_MAX {
        SCALE_MAX / norm
    } else {
        1.0
    }
}

/// Outcome of the eigenvalue selection.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Selection {
    /// Number of eigenvalues actually found.
    pub found: usize,
    /// Number of diagonal blocks the tridiagonal matrix was split into.
    pub blocks: usize,
}

/// Backend interface of the eigen-subspace solver.
///
/// All buffers are provided by the caller, and an implementation must fully
/// overwrite every output it reports as valid.
#[allow(clippy::too_many_arguments)]
pub trait HermitianEigenSolver {
    /// Reduces a packed lower Hermitian matrix to real tridiagonal form.
    ///
    /// On return, `d[..order]` and `e[..order - 1]` hold the diagonal and the
    /// sub-diagonal, and `ap` and `tau[..order - 1]` hold the reflectors in
    /// the form consumed by [`Self::back_transform`]. `ap` no longer holds the
    /// input matrix after this call.
    ///
    /// # Errors
    ///
    /// Returns the status code if the reduction failed.
    fn reduce_to_tridiagonal(
        &mut self,
        order: usize,
        ap: &mut [Complex32],
        d: &mut [f32],
        e: &mut [f32],
        tau: &mut [Complex32],
    ) -> Result<(), i32>;

    /// Finds the `il`-th through `iu`-th smallest eigenvalues (1-based,
    /// inclusive) of the tridiagonal matrix `(d, e)`.
    ///
    /// Found eigenvalues are stored in `w` grouped by diagonal block and in
    /// ascending order within a block. `iblock[j]` receives the block index
    /// of `w[j]`, and `isplit[b]` receives the exclusive end row of block `b`.
    ///
    /// # Errors
    ///
    /// Returns the status code if the search failed.
    fn select_eigenvalues(
        &mut self,
        order: usize,
        il: usize,
        iu: usize,
        d: &[f32],
        e: &[f32],
        w: &mut [f32],
        iblock: &mut [usize],
        isplit: &mut [usize],
    ) -> Result<Selection, i32>;

    /// Computes the tridiagonal eigenvectors for every value in `w`.
    ///
    /// `iblock` and `isplit` are those returned from
    /// [`Self::select_eigenvalues`]. The `j`-th vector is written to
    /// `z[j * order..(j + 1) * order]`. Indices of the vectors that failed
    /// to converge are written to the head of `ifail`.
    ///
    /// # Errors
    ///
    /// Returns the status code (the number of vectors that failed to
    /// converge for a numeric failure).
    fn inverse_iteration(
        &mut self,
        order: usize,
        d: &[f32],
        e: &[f32],
        w: &[f32],
        iblock: &[usize],
        isplit: &[usize],
        z: &mut [Complex32],
        ifail: &mut [usize],
    ) -> Result<(), i32>;

    /// Multiplies column vectors in `c` by the unitary matrix from the
    /// reduction.
    ///
    /// `c` is a column-major matrix with `order` rows.
    ///
    /// # Errors
    ///
    /// Returns the status code if the transformation failed.
    fn back_transform(
        &mut self,
        order: usize,
        ap: &[Complex32],
        tau: &[Complex32],
        c: &mut [Complex32],
    ) -> Result<(), i32>;
}

/// Pure-rust single-precision solver.
///
/// All the work arrays are allocated on construction and reused.
#[derive(Clone, Debug)]
pub struct NativeSolver {
    order: usize,
    reflector_work: FixedBuf<Complex32>,
    squared_offdiag: FixedBuf<f32>,
    lu: TridiagonalLu,
    iterate: FixedBuf<f32>,
}

impl NativeSolver {
    /// Constructs a solver for matrices up to the given `order`.
    ///
    /// # Errors
    ///
    /// Returns `AllocError` if the work arrays cannot be allocated.
    pub fn with_order(order: usize) -> Result<Self, AllocError> {
        Ok(Self {
            order,
            reflector_work: FixedBuf::zeroed("reflector_work", order)?,
            squared_offdiag: FixedBuf::zeroed("squared_offdiag", order)?,
            lu: TridiagonalLu::with_capacity(order)?,
            iterate: FixedBuf::zeroed("iterate", order)?,
        })
    }

    /// Returns the maximum order this solver can handle.
    pub const fn order(&self) -> usize {
        self.order
    }

    #[inline]
    const fn check_order(&self, order: usize) -> Result<(), i32> {
        if order > self.order {
            Err(-1)
        } else {
            Ok(())
        }
    }
}

impl HermitianEigenSolver for NativeSolver {
    fn reduce_to_tridiagonal(
        &mut self,
        order: usize,
        ap: &mut [Complex32],
        d: &mut [f32],
        e: &mut [f32],
        tau: &mut [Complex32],
    ) -> Result<(), i32> {
        self.check_order(order)?;
        householder::reduce(order, ap, d, e, tau, &mut self.reflector_work)
    }

    fn select_eigenvalues(
        &mut self,
        order: usize,
        il: usize,
        iu: usize,
        d: &[f32],
        e: &[f32],
        w: &mut [f32],
        iblock: &mut [usize],
        isplit: &mut [usize],
    ) -> Result<Selection, i32> {
        self.check_order(order)?;
        bisection::select(
            order,
            il,
            iu,
            d,
            e,
            w,
            iblock,
            isplit,
            &mut self.squared_offdiag,
        )
    }

    fn inverse_iteration(
        &mut self,
        order: usize,
        d: &[f32],
        e: &[f32],
        w: &[f32],
        iblock: &[usize],
        isplit: &[usize],
        z: &mut [Complex32],
        ifail: &mut [usize],
    ) -> Result<(), i32> {
        self.check_order(order)?;
        inverse_iteration::eigenvectors(
            order,
            d,
            e,
            w,
            iblock,
            isplit,
            z,
            ifail,
            &mut self.lu,
            &mut self.iterate,
        )
    }

    fn back_transform(
        &mut self,
        order: usize,
        ap: &[Complex32],
        tau: &[Complex32],
        c: &mut [Complex32],
    ) -> Result<(), i32> {
        self.check_order(order)?;
        householder::apply_reflectors(order, ap, tau, c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acorr;
    use crate::assert_close;
    use crate::sigen;
    use crate::sigen::Signal;
    use crate::test_helper;

    use rstest::rstest;

    struct Decomposition {
        packed: Vec<Complex32>,
        values: Vec<f32>,
        vectors: Vec<Complex32>,
        selection: Selection,
    }

    fn decompose(order: usize, num_eig: usize, packed: &[Complex32]) -> Decomposition {
        let mut solver = NativeSolver::with_order(order).expect("alloc failed");
        let mut ap = packed.to_vec();
        let mut d = vec![0.0f32; order];
        let mut e = vec![0.0f32; order];
        let mut tau = vec![Complex32::new(0.0, 0.0); order];
        let mut w = vec![0.0f32; order];
        let mut iblock = vec![0usize; order];
        let mut isplit = vec![0usize; order];
        let mut ifail = vec![0usize; order];

        solver
            .reduce_to_tridiagonal(order, &mut ap, &mut d, &mut e, &mut tau)
            .expect("reduction failed");
        let selection = solver
            .select_eigenvalues(
                order,
                order - num_eig + 1,
                order,
                &d,
                &e,
                &mut w,
                &mut iblock,
                &mut isplit,
            )
            .expect("selection failed");
        let found = selection.found;
        let mut z = vec![Complex32::new(0.0, 0.0); order * found];
        solver
            .inverse_iteration(
                order,
                &d,
                &e,
                &w[..found],
                &iblock[..found],
                &isplit[..selection.blocks],
                &mut z,
                &mut ifail,
            )
            .expect("inverse iteration failed");
        solver
            .back_transform(order, &ap, &tau, &mut z)
            .expect("back-transformation failed");
        Decomposition {
            packed: packed.to_vec(),
            values: w[..found].to_vec(),
            vectors: z,
            selection,
        }
    }

    fn random_packed_acm(order: usize, len: usize, seed: u64) -> Vec<Complex32> {
        let mut signal = vec![Complex32::new(0.0, 0.0); len];
        sigen::Noise::with_seed(seed, 1.0).fill_buffer(0, &mut signal);
        let mut packed = vec![Complex32::new(0.0, 0.0); acorr::packed_len(order)];
        acorr::packed_auto_correlation(order, &signal, &mut packed);
        packed
    }

    #[test]
    fn packed_index_walks_columns() {
        let order = 5;
        let mut expected = 0;
        for col in 0..order {
            for row in col..order {
                assert_eq!(packed_index(order, row, col), expected);
                expected += 1;
            }
        }
        assert_eq!(expected, acorr::packed_len(order));
    }

    #[rstest]
    #[case(4, 4, 8, 1)]
    #[case(8, 3, 64, 2)]
    #[case(16, 16, 64, 3)]
    #[case(12, 5, 40, 4)]
    #[case(2, 1, 2, 5)]
    fn matches_reference_decomposition(
        #[case] order: usize,
        #[case] num_eig: usize,
        #[case] len: usize,
        #[case] seed: u64,
    ) {
        let packed = random_packed_acm(order, len, seed);
        let result = decompose(order, num_eig, &packed);
        assert_eq!(result.selection.found, num_eig);

        let reference = test_helper::reference_eigenvalues(order, &result.packed);
        let scale = reference[order - 1].abs().max(1.0);
        for (actual, expected) in result.values.iter().zip(&reference[order - num_eig..]) {
            assert_close!(
                f64::from(*actual),
                *expected,
                rtol = 1e-4,
                atol = 1e-4 * scale
            );
        }

        for (j, lambda) in result.values.iter().enumerate() {
            let v = &result.vectors[j * order..(j + 1) * order];
            let residual = test_helper::eigen_residual(order, &result.packed, *lambda, v);
            assert!(
                residual <= 1e-3 * scale as f32,
                "residual {residual} too large for eigenvalue #{j}={lambda}"
            );
        }

        for a in 0..num_eig {
            for b in 0..num_eig {
                let ip = test_helper::inner_product(
                    &result.vectors[a * order..(a + 1) * order],
                    &result.vectors[b * order..(b + 1) * order],
                );
                let expected = if a == b { 1.0 } else { 0.0 };
                assert_close!(ip.re, expected, rtol = 0.0, atol = 5e-4);
                assert_close!(ip.im, 0.0, rtol = 0.0, atol = 5e-4);
            }
        }
    }

    #[test]
    fn zero_matrix_splits_into_blocks() {
        let order = 4;
        let packed = vec![Complex32::new(0.0, 0.0); acorr::packed_len(order)];
        let result = decompose(order, 2, &packed);
        assert_eq!(result.selection.blocks, 4);
        assert_eq!(result.selection.found, 2);
        for lambda in &result.values {
            assert!(lambda.abs() < 1e-30, "eigenvalue {lambda} of a zero matrix");
        }
        for j in 0..2 {
            let v = &result.vectors[j * order..(j + 1) * order];
            let norm: f32 = v.iter().map(Complex32::norm_sqr).sum();
            assert_close!(norm, 1.0f32);
        }
    }

    #[test]
    fn order_beyond_capacity_is_rejected() {
        let mut solver = NativeSolver::with_order(2).expect("alloc failed");
        let mut ap = vec![Complex32::new(1.0, 0.0); acorr::packed_len(3)];
        let mut d = [0.0f32; 3];
        let mut e = [0.0f32; 3];
        let mut tau = [Complex32::new(0.0, 0.0); 3];
        assert_eq!(
            solver.reduce_to_tridiagonal(3, &mut ap, &mut d, &mut e, &mut tau),
            Err(-1)
        );
    }
}
