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

#![allow(clippy::missing_panics_doc)]

use nalgebra::DMatrix;
use num_complex::Complex32;
use num_complex::Complex64;

use super::linalg::packed_index;

#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $expected:expr, rtol = $rtol:expr, atol = $atol:expr) => {{
        let actual = $actual;
        let expected = $expected;
        let err = (actual - expected).abs();
        #[allow(clippy::suboptimal_flops)]
        let tol = $rtol * (expected).abs() + $atol;
        assert!(
            err <= tol,
            "actual={:?}, expected={:?}, err={:?} > tol={:?}",
            actual,
            expected,
            err,
            tol
        );
    }};
    ($actual:expr, $expected:expr) => {{
        assert_close!($actual, $expected, rtol = 0.00001, atol = 0.00001);
    }};
}

#[macro_export]
macro_rules! assert_finite {
    ($result:expr) => {{
        for (i, &value) in $result.iter().enumerate() {
            assert!(
                value.is_normal() || value == 0.0,
                "{}-th element in a vector is not finite ({}), x={:?}.",
                i,
                value,
                $result
            );
        }
    }};
}

/// Expands a packed lower Hermitian matrix into a dense `f64` matrix.
pub fn unpack_hermitian(order: usize, packed: &[Complex32]) -> DMatrix<Complex64> {
    DMatrix::from_fn(order, order, |r, c| {
        let v = if r >= c {
            packed[packed_index(order, r, c)]
        } else {
            packed[packed_index(order, c, r)].conj()
        };
        Complex64::new(f64::from(v.re), f64::from(v.im))
    })
}

/// Computes all eigenvalues of a packed Hermitian matrix in ascending order.
///
/// This is the reference used to check the selective solver.
pub fn reference_eigenvalues(order: usize, packed: &[Complex32]) -> Vec<f64> {
    let dense = unpack_hermitian(order, packed);
    let mut evals: Vec<f64> = dense.symmetric_eigenvalues().iter().copied().collect();
    evals.sort_by(f64::total_cmp);
    evals
}

/// Computes `max_i |(A v - lambda v)_i|` for a packed Hermitian matrix `A`.
pub fn eigen_residual(order: usize, packed: &[Complex32], lambda: f32, v: &[Complex32]) -> f32 {
    let mut worst = 0.0f32;
    for r in 0..order {
        let mut acc = Complex32::new(0.0, 0.0);
        for (c, x) in v.iter().enumerate().take(order) {
            let a = if r >= c {
                packed[packed_index(order, r, c)]
            } else {
                packed[packed_index(order, c, r)].conj()
            };
            acc += a * x;
        }
        acc -= v[r] * lambda;
        worst = worst.max(acc.norm());
    }
    worst
}

/// Standard complex inner product `sum_t conj(a[t]) b[t]`.
pub fn inner_product(a: &[Complex32], b: &[Complex32]) -> Complex32 {
    a.iter()
        .zip(b.iter())
        .fold(Complex32::new(0.0, 0.0), |acc, (x, y)| acc + x.conj() * y)
}
