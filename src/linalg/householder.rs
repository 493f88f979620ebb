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

//! Householder reduction of packed Hermitian matrices.

use num_complex::Complex32;

use super::packed_index;
use crate::acorr::packed_len;

const ONE: Complex32 = Complex32::new(1.0, 0.0);
const ZERO: Complex32 = Complex32::new(0.0, 0.0);

/// Euclidean norm computed with scaling to avoid overflow.
fn scaled_norm(x: &[Complex32]) -> f32 {
    let mut scale = 0.0f32;
    let mut ssq = 1.0f32;
    for v in x {
        for a in [v.re.abs(), v.im.abs()] {
            if a != 0.0 {
                if scale < a {
                    ssq = 1.0 + ssq * (scale / a) * (scale / a);
                    scale = a;
                } else {
                    ssq += (a / scale) * (a / scale);
                }
            }
        }
    }
    scale * ssq.sqrt()
}

/// Generates an elementary reflector `H` such that `H^H [alpha; x] = [beta; 0]`.
///
/// `head[0]` is `alpha` and `head[1..]` is `x`. On return, `head[0]` is set
/// to `beta` (real), `head[1..]` holds the tail of the reflector vector whose
/// first element is implicitly one, and `tau` is returned.
fn make_reflector(head: &mut [Complex32]) -> Complex32 {
    let Some((alpha, x)) = head.split_first_mut() else {
        return ZERO;
    };
    let xnorm = scaled_norm(x);
    let (ar, ai) = (alpha.re, alpha.im);
    if xnorm == 0.0 && ai == 0.0 {
        return ZERO;
    }
    let beta = -ar.hypot(ai).hypot(xnorm).copysign(ar);
    let tau = Complex32::new((beta - ar) / beta, -ai / beta);
    let scale = (*alpha - beta).inv();
    for v in x {
        *v *= scale;
    }
    *alpha = Complex32::new(beta, 0.0);
    tau
}

/// Computes `y = tau * B * v` for a packed lower Hermitian `B` of order `m`.
fn hermitian_matvec(
    m: usize,
    tau: Complex32,
    b: &[Complex32],
    v: &[Complex32],
    y: &mut [Complex32],
) {
    for p in y.iter_mut() {
        *p = ZERO;
    }
    for j in 0..m {
        let jj = packed_index(m, j, j);
        let t1 = tau * v[j];
        let mut t2 = ZERO;
        y[j] += t1 * b[jj].re;
        for k in (j + 1)..m {
            let a = b[jj + k - j];
            y[k] += t1 * a;
            t2 += a.conj() * v[k];
        }
        y[j] += tau * t2;
    }
}

/// Computes `B -= v w^H + w v^H` for a packed lower Hermitian `B` of order `m`.
fn hermitian_rank2_downdate(m: usize, v: &[Complex32], w: &[Complex32], b: &mut [Complex32]) {
    for j in 0..m {
        let jj = packed_index(m, j, j);
        let t1 = -w[j].conj();
        let t2 = -v[j].conj();
        let diag = b[jj].re + (v[j] * t1 + w[j] * t2).re;
        b[jj] = Complex32::new(diag, 0.0);
        for k in (j + 1)..m {
            b[jj + k - j] += v[k] * t1 + w[k] * t2;
        }
    }
}

/// Reduces the packed lower Hermitian matrix `ap` to tridiagonal form.
///
/// Reflector `i` is stored with its vector in column `i` of `ap` below the
/// sub-diagonal, and its scalar factor in `tau[i]`.
pub fn reduce(
    order: usize,
    ap: &mut [Complex32],
    d: &mut [f32],
    e: &mut [f32],
    tau: &mut [Complex32],
    work: &mut [Complex32],
) -> Result<(), i32> {
    let n = order;
    if ap.len() < packed_len(n) {
        return Err(-2);
    }
    if d.len() < n {
        return Err(-3);
    }
    if e.len() + 1 < n {
        return Err(-4);
    }
    if tau.len() + 1 < n {
        return Err(-5);
    }
    if work.len() < n {
        return Err(-6);
    }
    if n == 0 {
        return Ok(());
    }

    ap[0].im = 0.0;
    for i in 0..(n - 1) {
        let ii = packed_index(n, i, i);
        let m = n - i - 1;
        let trailing_start = ii + m + 1;

        let taui = make_reflector(&mut ap[(ii + 1)..trailing_start]);
        e[i] = ap[ii + 1].re;

        if taui != ZERO {
            ap[ii + 1] = ONE;
            let (head, trailing) = ap.split_at_mut(trailing_start);
            let v = &head[(ii + 1)..];
            let y = &mut work[..m];

            hermitian_matvec(m, taui, trailing, v, y);
            let dot = y
                .iter()
                .zip(v.iter())
                .fold(ZERO, |acc, (yk, vk)| acc + yk.conj() * vk);
            let alpha = -0.5 * taui * dot;
            for (yk, vk) in y.iter_mut().zip(v.iter()) {
                *yk += alpha * vk;
            }
            hermitian_rank2_downdate(m, v, y, trailing);
        }

        ap[ii + 1] = Complex32::new(e[i], 0.0);
        d[i] = ap[ii].re;
        tau[i] = taui;
    }
    d[n - 1] = ap[packed_index(n, n - 1, n - 1)].re;
    Ok(())
}

/// Multiplies the columns of `c` by the product of reflectors from [`reduce`].
pub fn apply_reflectors(
    order: usize,
    ap: &[Complex32],
    tau: &[Complex32],
    c: &mut [Complex32],
) -> Result<(), i32> {
    let n = order;
    if ap.len() < packed_len(n) {
        return Err(-2);
    }
    if tau.len() + 1 < n {
        return Err(-3);
    }
    if n == 0 || c.len() % n != 0 {
        return if c.is_empty() { Ok(()) } else { Err(-4) };
    }

    for i in (0..(n - 1)).rev() {
        let taui = tau[i];
        if taui == ZERO {
            continue;
        }
        let start = packed_index(n, i + 1, i);
        let len = n - 1 - i;
        let v_tail = &ap[(start + 1)..(start + len)];
        for col in c.chunks_exact_mut(n) {
            let (target_head, target_tail) = col[(i + 1)..].split_at_mut(1);
            let mut w = target_head[0].conj();
            for (cr, vr) in target_tail.iter().zip(v_tail) {
                w += cr.conj() * vr;
            }
            let f = taui * w.conj();
            target_head[0] -= f;
            for (cr, vr) in target_tail.iter_mut().zip(v_tail) {
                *cr -= f * vr;
            }
        }
    }
    Ok(())
}
