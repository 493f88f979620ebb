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

//! Inverse iteration for eigenvectors of symmetric tridiagonal matrices.

use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::constant::eigen::CLUSTER_TOLERANCE;
use crate::constant::eigen::EXTRA_INVERSE_ITERATIONS;
use crate::constant::eigen::MAX_INVERSE_ITERATIONS;
use crate::constant::eigen::STARTING_VECTOR_SEED;
use crate::error::AllocError;
use crate::mem::FixedBuf;

/// Relative machine precision (`b^(1-p)`).
const PRECISION: f32 = f32::EPSILON;
/// Unit roundoff (`b^(1-p) / 2`).
const ROUNDOFF: f32 = f32::EPSILON * 0.5;
/// Smallest normal number.
const SAFE_MIN: f32 = f32::MIN_POSITIVE;

/// LU factorization of `T - lambda I` with partial pivoting.
///
/// `T` is a tridiagonal matrix. The factors are stored as `U` with the
/// diagonal `a`, the first super-diagonal `b` and the second super-diagonal
/// `d`, and `L` with multipliers `c`. `pivoted[k]` is non-zero if rows `k`
/// and `k + 1` were interchanged.
#[derive(Clone, Debug)]
pub struct TridiagonalLu {
    a: FixedBuf<f32>,
    b: FixedBuf<f32>,
    c: FixedBuf<f32>,
    d: FixedBuf<f32>,
    pivoted: FixedBuf<usize>,
    len: usize,
}

impl TridiagonalLu {
    /// Allocates storage for matrices up to `capacity` rows.
    ///
    /// # Errors
    ///
    /// Returns `AllocError` if the buffers cannot be allocated.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        Ok(Self {
            a: FixedBuf::zeroed("lu_diag", capacity)?,
            b: FixedBuf::zeroed("lu_super1", capacity)?,
            c: FixedBuf::zeroed("lu_sub", capacity)?,
            d: FixedBuf::zeroed("lu_super2", capacity)?,
            pivoted: FixedBuf::zeroed("lu_pivots", capacity)?,
            len: 0,
        })
    }

    /// Factorizes `T - lambda I` where `T` has diagonal `diag` and symmetric
    /// off-diagonal `offdiag`.
    ///
    /// The last element of the pivot record receives the (1-based) index of
    /// the first pivot that is small relative to its row, or zero if none.
    fn factorize(&mut self, diag: &[f32], offdiag: &[f32], lambda: f32) {
        let n = diag.len();
        self.len = n;
        let a = &mut self.a[..n];
        let b = &mut self.b[..n];
        let c = &mut self.c[..n];
        let d = &mut self.d[..n];
        let pivoted = &mut self.pivoted[..n];

        a.copy_from_slice(diag);
        b[..(n - 1)].copy_from_slice(offdiag);
        c[..(n - 1)].copy_from_slice(offdiag);
        pivoted.iter_mut().for_each(|p| *p = 0);

        a[0] -= lambda;
        if n == 1 {
            if a[0] == 0.0 {
                pivoted[0] = 1;
            }
            return;
        }

        let tl = ROUNDOFF;
        let mut scale1 = a[0].abs() + b[0].abs();
        for k in 0..(n - 1) {
            a[k + 1] -= lambda;
            let mut scale2 = c[k].abs() + a[k + 1].abs();
            if k + 2 < n {
                scale2 += b[k + 1].abs();
            }
            let piv1 = if a[k] == 0.0 {
                0.0
            } else {
                a[k].abs() / scale1
            };
            let piv2;
            if c[k] == 0.0 {
                pivoted[k] = 0;
                piv2 = 0.0;
                scale1 = scale2;
                if k + 2 < n {
                    d[k] = 0.0;
                }
            } else {
                piv2 = c[k].abs() / scale2;
                if piv2 <= piv1 {
                    pivoted[k] = 0;
                    scale1 = scale2;
                    c[k] /= a[k];
                    a[k + 1] -= c[k] * b[k];
                    if k + 2 < n {
                        d[k] = 0.0;
                    }
                } else {
                    pivoted[k] = 1;
                    let mult = a[k] / c[k];
                    a[k] = c[k];
                    let temp = a[k + 1];
                    a[k + 1] = b[k] - mult * temp;
                    if k + 2 < n {
                        d[k] = b[k + 1];
                        b[k + 1] = -mult * d[k];
                    }
                    b[k] = temp;
                    c[k] = mult;
                }
            }
            if piv1.max(piv2) <= tl && pivoted[n - 1] == 0 {
                pivoted[n - 1] = k + 1;
            }
        }
        if a[n - 1].abs() <= scale1 * tl && pivoted[n - 1] == 0 {
            pivoted[n - 1] = n;
        }
    }

    /// Solves `(T - lambda I) x = y` in place using the factors.
    ///
    /// Small pivots are perturbed so that the solution does not overflow.
    fn solve_perturbed(&self, y: &mut [f32]) {
        let n = self.len;
        let a = &self.a[..n];
        let b = &self.b[..n];
        let c = &self.c[..n];
        let d = &self.d[..n];
        let pivoted = &self.pivoted[..n];

        let mut tol = a[0].abs();
        if n > 1 {
            tol = tol.max(a[1].abs()).max(b[0].abs());
        }
        for k in 2..n {
            tol = tol.max(a[k].abs()).max(b[k - 1].abs()).max(d[k - 2].abs());
        }
        tol *= ROUNDOFF;
        if tol == 0.0 {
            tol = ROUNDOFF;
        }
        let bignum = 1.0 / SAFE_MIN;

        for k in 1..n {
            if pivoted[k - 1] == 0 {
                y[k] -= c[k - 1] * y[k - 1];
            } else {
                let temp = y[k - 1];
                y[k - 1] = y[k];
                y[k] = temp - c[k - 1] * y[k];
            }
        }

        for k in (0..n).rev() {
            let mut temp = if k + 2 < n {
                y[k] - b[k] * y[k + 1] - d[k] * y[k + 2]
            } else if k + 1 < n {
                y[k] - b[k] * y[k + 1]
            } else {
                y[k]
            };
            let mut ak = a[k];
            let mut pert = tol.copysign(ak);
            loop {
                let absak = ak.abs();
                if absak < 1.0 {
                    if absak < SAFE_MIN {
                        if absak == 0.0 || temp.abs() * SAFE_MIN > absak {
                            ak += pert;
                            pert *= 2.0;
                            continue;
                        }
                        temp *= bignum;
                        ak *= bignum;
                    } else if temp.abs() > absak * bignum {
                        ak += pert;
                        pert *= 2.0;
                        continue;
                    }
                }
                break;
            }
            y[k] = temp / ak;
        }
    }
}

/// Returns the index of the element with the largest magnitude.
fn index_of_max_abs(v: &[f32]) -> usize {
    let mut best = 0;
    for (i, x) in v.iter().enumerate() {
        if x.abs() > v[best].abs() {
            best = i;
        }
    }
    best
}

/// Computes eigenvectors of the tridiagonal matrix `(d, e)` for the
/// eigenvalues `w`.
///
/// Vectors are written to the column-major `z` with `order` rows. The
/// imaginary parts are set to zero.
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
pub fn eigenvectors(
    order: usize,
    d: &[f32],
    e: &[f32],
    w: &[f32],
    iblock: &[usize],
    isplit: &[usize],
    z: &mut [Complex32],
    ifail: &mut [usize],
    lu: &mut TridiagonalLu,
    iterate: &mut [f32],
) -> Result<(), i32> {
    let n = order;
    let m = w.len();
    if d.len() < n {
        return Err(-2);
    }
    if e.len() + 1 < n {
        return Err(-3);
    }
    if m > n {
        return Err(-4);
    }
    if iblock.len() < m {
        return Err(-5);
    }
    let iblock = &iblock[..m];
    if iblock.windows(2).any(|p| p[0] > p[1]) {
        return Err(-5);
    }
    let blocks = isplit.len();
    if iblock.last().map_or(false, |b| *b >= blocks)
        || isplit.last().map_or(m > 0, |end| *end != n)
        || isplit.first().map_or(false, |end| *end == 0)
        || isplit.windows(2).any(|p| p[0] >= p[1])
    {
        return Err(-6);
    }
    if z.len() < n * m {
        return Err(-7);
    }
    if ifail.len() < m {
        return Err(-8);
    }
    if iterate.len() < n || lu.a.len() < n {
        return Err(-9);
    }
    if m == 0 {
        return Ok(());
    }

    let mut rng = StdRng::seed_from_u64(STARTING_VECTOR_SEED);
    let mut failures = 0usize;
    let mut j = 0usize;
    let mut block_begin = 0usize;

    for (nb, block_end) in isplit.iter().enumerate() {
        let (b1, bn) = (block_begin, *block_end);
        block_begin = bn;
        let bs = bn - b1;
        let (db, eb) = (&d[b1..bn], &e[b1..(bn - 1).max(b1)]);

        let mut onenrm = 0.0f32;
        let mut ortol = 0.0f32;
        let mut dtpcrt = 0.0f32;
        if bs > 1 {
            onenrm = (db[0].abs() + eb[0].abs()).max(db[bs - 1].abs() + eb[bs - 2].abs());
            for i in 1..(bs - 1) {
                onenrm = onenrm.max(db[i].abs() + eb[i - 1].abs() + eb[i].abs());
            }
            ortol = CLUSTER_TOLERANCE * onenrm;
            dtpcrt = (0.1 / bs as f32).sqrt();
        }

        let mut gpind = j;
        let mut jblk = 0usize;
        let mut xjm = 0.0f32;
        while j < m && iblock[j] == nb {
            jblk += 1;
            let mut xj = w[j];
            let v = &mut iterate[..bs];
            if bs == 1 {
                v[0] = 1.0;
            } else {
                if jblk > 1 {
                    let pertol = 10.0 * (PRECISION * xj).abs();
                    if xj - xjm < pertol {
                        xj = xjm + pertol;
                    }
                }
                for p in v.iter_mut() {
                    *p = rng.gen_range(-1.0f32..1.0f32);
                }
                lu.factorize(db, eb, xj);

                let mut converged = false;
                let mut nrmchk = 0usize;
                for _its in 0..MAX_INVERSE_ITERATIONS {
                    let jmax = index_of_max_abs(v);
                    let scl = bs as f32 * onenrm * PRECISION.max(lu.a[bs - 1].abs()) / v[jmax].abs();
                    v.iter_mut().for_each(|x| *x *= scl);
                    lu.solve_perturbed(v);

                    if jblk > 1 {
                        if (xj - xjm).abs() > ortol {
                            gpind = j;
                        }
                        for i in gpind..j {
                            let zi = &z[(i * n + b1)..(i * n + bn)];
                            let ztr: f32 = v.iter().zip(zi).map(|(x, y)| x * y.re).sum();
                            for (x, y) in v.iter_mut().zip(zi) {
                                *x -= ztr * y.re;
                            }
                        }
                    }

                    let nrm = v[index_of_max_abs(v)].abs();
                    if nrm < dtpcrt {
                        continue;
                    }
                    nrmchk += 1;
                    if nrmchk < EXTRA_INVERSE_ITERATIONS + 1 {
                        continue;
                    }
                    converged = true;
                    break;
                }
                if !converged {
                    ifail[failures] = j;
                    failures += 1;
                }

                let nrm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                let mut scl = 1.0 / nrm;
                if v[index_of_max_abs(v)] < 0.0 {
                    scl = -scl;
                }
                v.iter_mut().for_each(|x| *x *= scl);
            }

            let col = &mut z[(j * n)..((j + 1) * n)];
            col.iter_mut().for_each(|p| *p = Complex32::new(0.0, 0.0));
            for (p, x) in col[b1..bn].iter_mut().zip(v.iter()) {
                *p = Complex32::new(*x, 0.0);
            }
            xjm = xj;
            j += 1;
        }
    }

    if failures > 0 {
        Err(failures as i32)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    fn dense_mul(d: &[f32], e: &[f32], v: &[f32]) -> Vec<f32> {
        let n = d.len();
        (0..n)
            .map(|i| {
                let mut acc = d[i] * v[i];
                if i > 0 {
                    acc += e[i - 1] * v[i - 1];
                }
                if i + 1 < n {
                    acc += e[i] * v[i + 1];
                }
                acc
            })
            .collect()
    }

    #[test]
    fn lu_solve_matches_dense_product() {
        let diag = [4.0f32, -1.0, 3.0, 2.5, 0.5];
        let offdiag = [1.0f32, 2.0, -0.5, 1.5];
        let lambda = 0.25;
        let mut lu = TridiagonalLu::with_capacity(5).expect("alloc failed");
        lu.factorize(&diag, &offdiag, lambda);

        let x = [1.0f32, -2.0, 0.5, 3.0, -1.0];
        let shifted: Vec<f32> = diag.iter().map(|v| v - lambda).collect();
        let mut y = dense_mul(&shifted, &offdiag, &x);
        lu.solve_perturbed(&mut y);
        for (a, b) in y.iter().zip(x.iter()) {
            assert_close!(*a, *b, rtol = 1e-4, atol = 1e-4);
        }
    }

    #[test]
    fn second_difference_eigenvectors() {
        let n = 5;
        let d = vec![2.0f32; n];
        let e = vec![-1.0f32; n - 1];
        let w: Vec<f32> = (4..=5)
            .map(|k| 2.0 - 2.0 * (k as f32 * std::f32::consts::PI / (n as f32 + 1.0)).cos())
            .collect();
        let iblock = [0usize, 0];
        let isplit = [n];
        let mut z = vec![Complex32::new(0.0, 0.0); 2 * n];
        let mut ifail = [0usize; 2];
        let mut lu = TridiagonalLu::with_capacity(n).expect("alloc failed");
        let mut iterate = vec![0.0f32; n];
        eigenvectors(
            n, &d, &e, &w, &iblock, &isplit, &mut z, &mut ifail, &mut lu, &mut iterate,
        )
        .expect("inverse iteration failed");

        for (j, lambda) in w.iter().enumerate() {
            let v: Vec<f32> = z[j * n..(j + 1) * n].iter().map(|x| x.re).collect();
            assert!(z[j * n..(j + 1) * n].iter().all(|x| x.im == 0.0));
            let av = dense_mul(&d, &e, &v);
            for (a, x) in av.iter().zip(v.iter()) {
                assert_close!(*a, lambda * x, rtol = 1e-4, atol = 1e-4);
            }
            let norm: f32 = v.iter().map(|x| x * x).sum();
            assert_close!(norm, 1.0f32);
            // The largest component is positive.
            assert!(v[index_of_max_abs(&v)] > 0.0);
        }
    }

    #[test]
    fn vectors_are_confined_to_their_block() {
        let d = [1.0f32, 4.0, 2.0];
        let e = [0.0f32, 0.5];
        // Block 0 is `[1]`, block 1 is `[[4, .5], [.5, 2]]`.
        let lambda = 3.0 + 0.5f32.hypot(1.0);
        let w = [1.0f32, lambda];
        let iblock = [0usize, 1];
        let isplit = [1usize, 3];
        let mut z = vec![Complex32::new(9.0, 9.0); 6];
        let mut ifail = [0usize; 2];
        let mut lu = TridiagonalLu::with_capacity(3).expect("alloc failed");
        let mut iterate = vec![0.0f32; 3];
        eigenvectors(
            3, &d, &e, &w, &iblock, &isplit, &mut z, &mut ifail, &mut lu, &mut iterate,
        )
        .expect("inverse iteration failed");
        assert_eq!(z[0], Complex32::new(1.0, 0.0));
        assert_eq!(z[1], Complex32::new(0.0, 0.0));
        assert_eq!(z[2], Complex32::new(0.0, 0.0));
        assert_eq!(z[3], Complex32::new(0.0, 0.0));
        assert!(z[4].re > 0.0 && z[5].re > 0.0);
    }

    #[test]
    fn inconsistent_block_layout_is_rejected() {
        let d = [1.0f32, 2.0];
        let e = [0.0f32];
        let w = [1.0f32, 2.0];
        let mut z = vec![Complex32::new(0.0, 0.0); 4];
        let mut ifail = [0usize; 2];
        let mut lu = TridiagonalLu::with_capacity(2).expect("alloc failed");
        let mut iterate = vec![0.0f32; 2];
        let status = eigenvectors(
            2, &d, &e, &w, &[1, 0], &[1, 2], &mut z, &mut ifail, &mut lu, &mut iterate,
        );
        assert_eq!(status, Err(-5));
        let status = eigenvectors(
            2, &d, &e, &w, &[0, 1], &[2], &mut z, &mut ifail, &mut lu, &mut iterate,
        );
        assert_eq!(status, Err(-6));
    }
}
