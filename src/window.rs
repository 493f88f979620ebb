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

//! Analysis windows applied before the auto-correlation estimation.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::window::HFT90D;

/// Analysis window descriptor.
///
/// This enum is `Serializable` and `Deserializable` because this will be
/// directly used in config structs.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum Window {
    /// No windowing.
    #[default]
    Rectangle,
    /// HFT90D flat-top window.
    Hft90d,
}

impl Window {
    /// Returns `false` if the window is an identity operation.
    #[inline]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Rectangle)
    }

    /// Fills `dest` with the window weights for `dest.len()` samples.
    pub fn fill_weights(&self, dest: &mut [f32]) {
        match *self {
            Self::Rectangle => {
                for p in dest {
                    *p = 1.0f32;
                }
            }
            Self::Hft90d => {
                let len = dest.len() as f64;
                for (t, p) in dest.iter_mut().enumerate() {
                    let z = 2.0 * std::f64::consts::PI * t as f64 / len;
                    let mut w = 0.0f64;
                    for (k, c) in HFT90D.iter().enumerate() {
                        w += c * (k as f64 * z).cos();
                    }
                    *p = w as f32;
                }
            }
        }
    }

    /// Returns the window weights as a `Vec`.
    #[inline]
    pub fn weights(&self, len: usize) -> Vec<f32> {
        let mut ret = vec![0.0f32; len];
        self.fill_weights(&mut ret);
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    #[test]
    fn rectangle_is_identity() {
        assert!(!Window::Rectangle.is_enabled());
        assert_eq!(Window::Rectangle.weights(5), vec![1.0f32; 5]);
    }

    #[test]
    fn hft90d_shape() {
        let len = 64;
        let w = Window::Hft90d.weights(len);
        assert!(Window::Hft90d.is_enabled());
        // The coefficients sum to zero, so the first tap vanishes.
        assert_close!(w[0], 0.0f32, rtol = 0.0, atol = 1e-5);
        // Peak is at the center, where all the harmonics add up in phase.
        let peak: f32 = HFT90D.iter().map(|c| c.abs()).sum::<f64>() as f32;
        assert_close!(w[len / 2], peak, rtol = 1e-5, atol = 1e-5);
        for (t, x) in w.iter().enumerate() {
            assert!(*x <= w[len / 2] + 1e-5, "w[{t}]={x} exceeds the peak");
        }
        // Symmetric around the center.
        for t in 1..len / 2 {
            assert_close!(w[t], w[len - t], rtol = 1e-4, atol = 1e-5);
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_tagging() {
        #[derive(Deserialize, Serialize)]
        struct Holder {
            window: Window,
        }
        let src = "[window]\ntype = \"Hft90d\"\n";
        let holder: Holder = toml::from_str(src).expect("parse error");
        assert_eq!(holder.window, Window::Hft90d);
        let dumped = toml::to_string(&holder).expect("serialization error");
        assert!(dumped.contains("Hft90d"));
    }
}
