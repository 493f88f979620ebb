// Copyright 2023-2024 Google LLC
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

//! Test signal generator module.
//!
//! This module is primarily intended to be used for tests. However, unlike
//! a module in `test_helper.rs`, this module is intended to be exposed to the
//! outside of the crate for external testing frameworks
//! (specifically for cargo-fuzz).

use std::rc::Rc;
use std::sync::Arc;

use num_complex::Complex32;
use rand::Rng;
use rand::SeedableRng;

/// Test signal generators.
pub trait Signal: std::fmt::Debug {
    /// Generates a signal from t=`sample_offset` and fills the buffer `dest`.
    fn fill_buffer(&self, sample_offset: usize, dest: &mut [Complex32]);

    /// Generates a signal and returns it as a `Vec`.
    fn to_vec(&self, len: usize) -> Vec<Complex32> {
        let mut ret = vec![Complex32::new(0.0, 0.0); len];
        self.fill_buffer(0, &mut ret);
        ret
    }

    /// Mixes noise
    fn noise(self, amplitude: f32) -> Mix<Self, Noise>
    where
        Self: Sized,
    {
        self.mix(Noise::new(amplitude))
    }

    /// Mixes noise
    fn noise_with_seed(self, seed0: u64, amplitude: f32) -> Mix<Self, Noise>
    where
        Self: Sized,
    {
        self.mix(Noise::with_seed(seed0, amplitude))
    }

    /// Mixes signal from the other generator
    fn mix<T: Signal + Sized>(self, other: T) -> Mix<Self, T>
    where
        Self: Sized,
    {
        Mix::new(1.0, self, 1.0, other)
    }

    /// Concats `other` signal after `offset_time` samples are generated.
    fn concat<T: Signal + Sized>(self, offset_time: usize, other: T) -> Switch<Self, T>
    where
        Self: Sized,
    {
        Switch::new(self, offset_time, other)
    }
}

macro_rules! impl_signal_for_pointers {
    ($pointertype:ident) => {
        impl<T: Signal + ?Sized> Signal for $pointertype<T> {
            fn fill_buffer(&self, sample_offset: usize, dest: &mut [Complex32]) {
                <$pointertype<T> as AsRef<T>>::as_ref(self).fill_buffer(sample_offset, dest);
            }
        }
    };
}

impl_signal_for_pointers!(Box);
impl_signal_for_pointers!(Rc);
impl_signal_for_pointers!(Arc);

/// Generator for constant signals.
#[derive(Clone, Debug)]
pub struct Dc {
    offset: Complex32,
}

impl Dc {
    /// Constructs new `Dc` signal.
    pub fn new(offset: Complex32) -> Self {
        Self { offset }
    }
}

impl Signal for Dc {
    fn fill_buffer(&self, _offset: usize, dest: &mut [Complex32]) {
        for p in dest {
            *p = self.offset;
        }
    }
}

/// Generator for a complex exponential `amplitude * exp(i (phase + 2 pi t / period))`.
#[derive(Clone, Debug)]
pub struct Tone {
    period: f32,
    amplitude: f32,
    initial_phase: f32,
}

impl Tone {
    /// Constructs a tone with `period` (in samples) and `amplitude`.
    ///
    /// Negative periods give negative frequencies.
    pub fn new(period: f32, amplitude: f32) -> Self {
        Self {
            period,
            amplitude,
            initial_phase: 0.0,
        }
    }

    pub fn with_initial_phase(period: f32, amplitude: f32, initial_phase: f32) -> Self {
        Self {
            period,
            amplitude,
            initial_phase,
        }
    }
}

impl Signal for Tone {
    fn fill_buffer(&self, offset: usize, dest: &mut [Complex32]) {
        // Phase is computed in f64 so that long offsets do not lose precision.
        let omega = 2.0 * std::f64::consts::PI / f64::from(self.period);
        for (t, p) in dest.iter_mut().enumerate() {
            let t = (t + offset) as f64;
            let phase = f64::from(self.initial_phase) + omega * t;
            *p = Complex32::from_polar(self.amplitude, phase.rem_euclid(std::f64::consts::TAU) as f32);
        }
    }
}

/// Generator for a uniform random complex white noise.
#[derive(Clone, Debug)]
pub struct Noise {
    seed0: u64,
    amplitude: f32,
}

impl Noise {
    /// Constructs new noise generator.
    pub fn new(amplitude: f32) -> Self {
        let seed0: u64 = rand::thread_rng().gen();
        Self { seed0, amplitude }
    }

    /// Constructs new noise generator with specifying a seed.
    pub fn with_seed(seed0: u64, amplitude: f32) -> Self {
        Self { seed0, amplitude }
    }
}

impl Signal for Noise {
    /// Fills buffer with the uniform random values.
    ///
    /// Both real and imaginary parts are drawn from
    /// `(-amplitude, amplitude)`.
    ///
    /// # Note
    ///
    /// This method doesn't ensure reproducibility if it is called in an
    /// arbitraly order, e.g.
    /// `noise.fill_buffer(0, &mut dest[..])` generate different results from
    /// `noise.fill_buffer(0, &mut dest[0..10])` and
    /// `noise.fill_buffer(10, &mut dest[10..])`.
    fn fill_buffer(&self, offset: usize, dest: &mut [Complex32]) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed0.wrapping_add(offset as u64));
        for p in dest {
            let re = 2.0 * (rng.sample::<f32, _>(rand::distributions::Open01) - 0.5);
            let im = 2.0 * (rng.sample::<f32, _>(rand::distributions::Open01) - 0.5);
            *p = Complex32::new(self.amplitude * re, self.amplitude * im);
        }
    }
}

/// Decorator that mixes outputs from the inner generators.
#[derive(Clone, Debug)]
pub struct Mix<T1: Signal + Sized, T2: Signal + Sized> {
    weight1: f32,
    weight2: f32,
    signal1: T1,
    signal2: T2,
}

impl<T1: Signal + Sized, T2: Signal + Sized> Mix<T1, T2> {
    /// Constructs new two-inputs mixer.
    pub fn new(weight1: f32, signal1: T1, weight2: f32, signal2: T2) -> Self {
        Self {
            weight1,
            weight2,
            signal1,
            signal2,
        }
    }
}

impl<T1: Signal + Sized, T2: Signal + Sized> Signal for Mix<T1, T2> {
    fn fill_buffer(&self, offset: usize, dest: &mut [Complex32]) {
        let mut buf = vec![Complex32::new(0.0, 0.0); dest.len()];
        self.signal1.fill_buffer(offset, dest);
        for p in &mut *dest {
            *p *= self.weight1;
        }
        self.signal2.fill_buffer(offset, &mut buf);
        for (p, x) in dest.iter_mut().zip(buf.iter()) {
            *p += self.weight2 * *x;
        }
    }
}

/// Decorator that switches multiple generatros depending on the timestamp.
#[derive(Clone, Debug)]
pub struct Switch<T1: Signal + Sized, T2: Signal + Sized> {
    input1: T1,
    offset: usize,
    input2: T2,
}

impl<T1: Signal + Sized, T2: Signal + Sized> Switch<T1, T2> {
    /// Cosntructs a switcher.
    pub fn new(input1: T1, offset: usize, input2: T2) -> Self {
        Self {
            input1,
            offset,
            input2,
        }
    }
}

impl<T1: Signal + Sized, T2: Signal + Sized> Signal for Switch<T1, T2> {
    fn fill_buffer(&self, offset: usize, dest: &mut [Complex32]) {
        // not very efficient, but let's keep it simple.
        self.input1.fill_buffer(offset, dest);
        if self.offset < dest.len() {
            self.input2
                .fill_buffer(offset + self.offset, &mut dest[self.offset..]);
        }
    }
}
