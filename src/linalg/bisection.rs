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

//! Eigenvalue selection by Sturm-sequence bisection.

use super::range_scale;
use super::Selection;
use crate::constant::eigen::MAX_BISECTION_STEPS;

/// Relative machine precision (`b^(1-p)`).
const PRECISION: f32 = f32::EPSILON;
/// Smallest normal number.
const SAFE_MIN: f32 = f32::MIN_POSITIVE;

/// Marker for candidates removed from the selection.
const DISCARDED: usize = usize::MAX;

/// Tridiagonal matrix in the form used for Sturm counting.
///
/// The diagonal is multiplied by `scale` on access, and `e2` holds the
/// squares of the scaled off-diagonal.
struct SturmSequence<'a> {
    d: &'a [f32],
    e2: &'a [f32],
    scale: f32,
    pivmin: f32,
}

impl SturmSequence<'_> {
    #[inline]
    fn diag(&self, j: usize) -> f32 {
        self.d[j] * self.scale
    }

    /// Counts eigenvalues less than or equal to `x` in rows `begin..end`.
    fn count(&self, begin: usize, end: usize, x: f32) -> usize {
        let mut q = self.diag(begin) - x;
        if q.abs() < self.pivmin {
            q = -self.pivmin;
        }
        let mut count = usize::from(q <= 0.0);
        for j in (begin + 1)..end {
            q = self.diag(j) - self.e2[j - 1] / q - x;
            if q.abs() < self.pivmin {
                q = -self.pivmin;
            }
            if q <= 0.0 {
                count += 1;
            }
        }
        count
    }

    /// Narrows `(lo, hi]` so that it contains the `k`-th eigenvalue of rows
    /// `begin..end`.
    ///
    /// Requires `count(lo) < k <= count(hi)`. Returns `None` if the interval
    /// does not converge within the step limit.
    fn bisect(&self, begin: usize, end: usize, lo: f32, hi: f32, k: usize) -> Option<(f32, f32)> {
        let (mut lo, mut hi) = (lo, hi);
        for _step in 0..MAX_BISECTION_STEPS {
            let tol = 2.0 * PRECISION * lo.abs().max(hi.abs()) + 2.0 * self.pivmin;
            if hi - lo <= tol {
                return Some((lo, hi));
            }
            let mid = 0.5 * (lo + hi);
            if self.count(begin, end, mid) >= k {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        None
    }
}

/// Removes `n` candidates with the smallest (or largest) value.
fn discard_extremes(w: &[f32], iblock: &mut [usize], n: usize, largest: bool) {
    for _ in 0..n {
        let mut target: Option<usize> = None;
        for (j, b) in iblock.iter().enumerate() {
            if *b == DISCARDED {
                continue;
            }
            let better = target.map_or(true, |t| {
                if largest {
                    w[j] >= w[t]
                } else {
                    w[j] < w[t]
                }
            });
            if better {
                target = Some(j);
            }
        }
        if let Some(t) = target {
            iblock[t] = DISCARDED;
        }
    }
}

/// Finds the `il`-th through `iu`-th smallest eigenvalues of the tridiagonal
/// matrix with diagonal `d` and sub-diagonal `e`.
#[allow(clippy::too_many_arguments)]
pub fn select(
    order: usize,
    il: usize,
    iu: usize,
    d: &[f32],
    e: &[f32],
    w: &mut [f32],
    iblock: &mut [usize],
    isplit: &mut [usize],
    e2: &mut [f32],
) -> Result<Selection, i32> {
    let n = order;
    if il < 1 || il > n.max(1) {
        return Err(-2);
    }
    if iu < n.min(il) || iu > n {
        return Err(-3);
    }
    if d.len() < n {
        return Err(-4);
    }
    if e.len() + 1 < n {
        return Err(-5);
    }
    if w.len() < n {
        return Err(-6);
    }
    if iblock.len() < n {
        return Err(-7);
    }
    if isplit.len() < n {
        return Err(-8);
    }
    if e2.len() < n {
        return Err(-9);
    }
    if n == 0 {
        return Ok(Selection::default());
    }
    let (d, e) = (&d[..n], &e[..(n - 1)]);
    if d.iter().chain(e.iter()).any(|x| !x.is_finite()) {
        return Err(4);
    }
    if n == 1 {
        w[0] = d[0];
        iblock[0] = 0;
        isplit[0] = 1;
        return Ok(Selection {
            found: 1,
            blocks: 1,
        });
    }

    // Scale into the range where squares stay finite.
    let tnorm = d
        .iter()
        .chain(e.iter())
        .fold(0.0f32, |acc, x| acc.max(x.abs()));
    let scale = range_scale(tnorm);

    // Split into unreduced blocks where the off-diagonal is negligible.
    let e2 = &mut e2[..(n - 1)];
    let mut blocks = 0;
    for j in 1..n {
        let ej = e[j - 1] * scale;
        let tmp = ej * ej;
        if (d[j] * scale * d[j - 1] * scale).abs() * PRECISION * PRECISION + SAFE_MIN > tmp {
            isplit[blocks] = j;
            blocks += 1;
            e2[j - 1] = 0.0;
        } else {
            e2[j - 1] = tmp;
        }
    }
    isplit[blocks] = n;
    blocks += 1;

    let pivmin = SAFE_MIN * e2.iter().fold(1.0f32, |acc, x| acc.max(*x));

    // Gershgorin bounds of the whole spectrum.
    let mut gl = d[0] * scale;
    let mut gu = gl;
    for i in 0..n {
        let left = if i > 0 { (e[i - 1] * scale).abs() } else { 0.0 };
        let right = if i + 1 < n { (e[i] * scale).abs() } else { 0.0 };
        gl = gl.min(d[i] * scale - left - right);
        gu = gu.max(d[i] * scale + left + right);
    }
    let tnorm = gl.abs().max(gu.abs());
    let margin = 2.1 * tnorm * PRECISION * n as f32 + 4.2 * pivmin;
    gl -= margin;
    gu += margin;

    let sturm = SturmSequence {
        d,
        e2,
        scale,
        pivmin,
    };
    let (wl, _) = sturm.bisect(0, n, gl, gu, il).ok_or(1)?;
    let (_, wu) = sturm.bisect(0, n, gl, gu, iu).ok_or(1)?;
    let count_wl = sturm.count(0, n, wl);
    let count_wu = sturm.count(0, n, wu);

    // Locate the candidates block by block.
    let mut found = 0;
    let mut begin = 0;
    for (b, end) in isplit[..blocks].iter().enumerate() {
        let end = *end;
        let lower = sturm.count(begin, end, wl);
        let upper = sturm.count(begin, end, wu);
        for k in (lower + 1)..=upper {
            if found >= n {
                break;
            }
            let (lo, hi) = sturm.bisect(begin, end, wl, wu, k).ok_or(1)?;
            w[found] = 0.5 * (lo + hi);
            iblock[found] = b;
            found += 1;
        }
        begin = end;
    }

    // Eigenvalues tied with the boundaries may be over-counted.
    let low = (il - 1).saturating_sub(count_wl);
    let high = count_wu.saturating_sub(iu);
    if low > 0 || high > 0 {
        discard_extremes(&w[..found], &mut iblock[..found], low, false);
        discard_extremes(&w[..found], &mut iblock[..found], high, true);
        let mut kept = 0;
        for j in 0..found {
            if iblock[j] != DISCARDED {
                w[kept] = w[j];
                iblock[kept] = iblock[j];
                kept += 1;
            }
        }
        found = kept;
    }
    if scale != 1.0 {
        for x in &mut w[..found] {
            *x /= scale;
        }
    }

    Ok(Selection { found, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    use rstest::rstest;

    fn run(d: &[f32], e: &[f32], il: usize, iu: usize) -> Result<(Vec<f32>, Vec<usize>, Vec<usize>), i32> {
        let n = d.len();
        let mut w = vec![0.0f32; n];
        let mut iblock = vec![0usize; n];
        let mut isplit = vec![0usize; n];
        let mut e2 = vec![0.0f32; n];
        let sel = select(n, il, iu, d, e, &mut w, &mut iblock, &mut isplit, &mut e2)?;
        Ok((
            w[..sel.found].to_vec(),
            iblock[..sel.found].to_vec(),
            isplit[..sel.blocks].to_vec(),
        ))
    }

    #[test]
    fn second_difference_matrix() {
        // Eigenvalues of tridiag(-1, 2, -1) are 2 - 2 cos(k pi / (n + 1)).
        let n = 6;
        let d = vec![2.0f32; n];
        let e = vec![-1.0f32; n - 1];
        let (w, iblock, isplit) = run(&d, &e, 4, 6).expect("selection failed");
        assert_eq!(isplit, vec![n]);
        assert_eq!(iblock, vec![0, 0, 0]);
        for (i, k) in (4..=6).enumerate() {
            let expected = 2.0 - 2.0 * (k as f32 * std::f32::consts::PI / (n as f32 + 1.0)).cos();
            assert_close!(w[i], expected, rtol = 1e-5, atol = 1e-5);
        }
    }

    #[rstest]
    fn second_difference_matrix_at_extreme_scales(#[values(1.0e-30, 1.0e25)] magnitude: f32) {
        // Squares of the off-diagonal are out of the `f32` range.
        let n = 5;
        let d = vec![2.0 * magnitude; n];
        let e = vec![-magnitude; n - 1];
        let (w, _, isplit) = run(&d, &e, 3, 5).expect("selection failed");
        assert_eq!(isplit, vec![n]);
        assert_eq!(w.len(), 3);
        for (i, k) in (3..=5).enumerate() {
            let expected =
                magnitude * (2.0 - 2.0 * (k as f32 * std::f32::consts::PI / (n as f32 + 1.0)).cos());
            assert_close!(w[i], expected, rtol = 1e-4, atol = 0.0);
        }
    }

    #[test]
    fn split_blocks_keep_block_order() {
        // diag(5, 1) and diag(3, 4) coupling with a zero in between.
        let d = [5.0f32, 1.0, 3.0];
        let e = [0.0f32, 0.0];
        let (w, iblock, isplit) = run(&d, &e, 2, 3).expect("selection failed");
        assert_eq!(isplit, vec![1, 2, 3]);
        // 5 comes from block 0, 3 from block 2.
        assert_eq!(iblock, vec![0, 2]);
        assert_close!(w[0], 5.0f32);
        assert_close!(w[1], 3.0f32);
    }

    #[test]
    fn ties_are_trimmed_to_the_requested_count() {
        let d = [0.0f32; 4];
        let e = [0.0f32; 3];
        let (w, _, isplit) = run(&d, &e, 3, 4).expect("selection failed");
        assert_eq!(isplit.len(), 4);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn non_finite_input_is_a_numeric_failure() {
        let d = [1.0f32, f32::NAN, 2.0];
        let e = [0.5f32, 0.5];
        assert_eq!(run(&d, &e, 1, 3).unwrap_err(), 4);

        let d = [1.0f32, 1.0, 2.0];
        let e = [f32::INFINITY, 0.5];
        assert_eq!(run(&d, &e, 1, 3).unwrap_err(), 4);
    }

    #[test]
    fn invalid_index_range() {
        let d = [1.0f32, 2.0];
        let e = [0.5f32];
        assert_eq!(run(&d, &e, 0, 2).unwrap_err(), -2);
        assert_eq!(run(&d, &e, 2, 1).unwrap_err(), -3);
        assert_eq!(run(&d, &e, 1, 3).unwrap_err(), -3);
    }

    #[test]
    fn single_element() {
        let (w, iblock, isplit) = run(&[7.5], &[], 1, 1).expect("selection failed");
        assert_eq!(w, vec![7.5]);
        assert_eq!(iblock, vec![0]);
        assert_eq!(isplit, vec![1]);
    }
}
