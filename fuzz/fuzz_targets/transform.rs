// Copyright 2023 Google LLC
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

#![no_main]

use arbitrary::Arbitrary;
use arbitrary::Unstructured;
use libfuzzer_sys::fuzz_target;
use num_complex::Complex32;

use klt::config;
use klt::error::Verify;
use klt::sigen;
use klt::sigen::Signal;
use klt::Klt;

const MAX_INPUT_LEN: usize = 512;
const MAX_ACM_ORDER: usize = 48;

fn unit_fraction(u: &mut Unstructured) -> Result<f32, arbitrary::Error> {
    Ok(u32::arbitrary(u)? as f32 / u32::MAX as f32)
}

fn arbitrary_config(u: &mut Unstructured) -> Result<config::Klt, arbitrary::Error> {
    let mut config = config::Klt::default();
    config.input_len = u.int_in_range(2..=MAX_INPUT_LEN)?;
    config.acm_order = u.int_in_range(2..=config.input_len.min(MAX_ACM_ORDER))?;
    config.num_eig = u.int_in_range(1..=config.acm_order)?;
    config.window = if bool::arbitrary(u)? {
        config::Window::Hft90d
    } else {
        config::Window::Rectangle
    };
    config.normalize_eigenvalues = bool::arbitrary(u)?;
    Ok(config)
}

fn arbitrary_signal(
    u: &mut Unstructured,
    input_len: usize,
) -> Result<Box<dyn Signal>, arbitrary::Error> {
    let signal: Box<dyn Signal> = match u.int_in_range(0..=4usize)? {
        0 => {
            // Dc
            let re = unit_fraction(u)? - 0.5;
            let im = unit_fraction(u)? - 0.5;
            Box::new(sigen::Dc::new(Complex32::new(re, im)))
        }
        1 => {
            // Noise
            let amplitude = unit_fraction(u)?;
            let seed = u64::arbitrary(u)?;
            Box::new(sigen::Noise::with_seed(seed, amplitude))
        }
        2 => {
            // Tone
            let amplitude = unit_fraction(u)?;
            let phase = unit_fraction(u)? * 2.0 * std::f32::consts::PI;
            let period = (unit_fraction(u)? - 0.5) * 2.0 * input_len as f32;
            Box::new(sigen::Tone::with_initial_phase(period, amplitude, phase))
        }
        3 => {
            // Mix
            let mix_fraction = unit_fraction(u)?;
            let signal1 = arbitrary_signal(u, input_len)?;
            let signal2 = arbitrary_signal(u, input_len)?;
            Box::new(sigen::Mix::new(
                mix_fraction,
                signal1,
                1.0 - mix_fraction,
                signal2,
            ))
        }
        4 => {
            // Switch
            let time = (input_len as f32 * unit_fraction(u)?) as usize;
            let signal1 = arbitrary_signal(u, time)?;
            let signal2 = arbitrary_signal(u, input_len - time)?;
            Box::new(sigen::Switch::new(signal1, time, signal2))
        }
        _ => {
            unreachable!();
        }
    };
    Ok(signal)
}

#[derive(Debug)]
struct Input {
    config: config::Klt,
    signal: Box<dyn Signal>,
}

impl<'a> Arbitrary<'a> for Input {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self, arbitrary::Error> {
        let config = arbitrary_config(u)?;
        let signal = arbitrary_signal(u, config.input_len)?;
        Ok(Self { config, signal })
    }
}

fuzz_target!(|input: Input| {
    let config = input.config.into_verified().unwrap();
    let samples = input.signal.to_vec(config.input_len);
    let mut engine = Klt::new(&config).unwrap();

    engine.load_input(&samples);
    let first = engine.transform();
    let eigenvalues = engine.eigenvalues().to_vec();
    match first {
        Ok(()) => {
            let diagnostics = engine.diagnostics();
            if diagnostics.is_nominal() {
                assert!(eigenvalues.windows(2).all(|w| w[0] <= w[1]));
            }
            assert!(diagnostics.found <= diagnostics.requested);
            assert!(eigenvalues.iter().all(|x| x.is_finite()));
            assert!(engine.basis().iter().all(|x| x.is_finite()));
            let max = eigenvalues.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if config.normalize_eigenvalues && max > 0.0 {
                assert_eq!(max, 1.0);
            }
        }
        Err(_) => {
            assert!(eigenvalues.iter().all(|x| *x == 0.0));
            assert!(engine.basis().iter().all(|x| *x == Complex32::new(0.0, 0.0)));
        }
    }

    // The engine state must not leak between windows.
    engine.load_input(&samples);
    let second = engine.transform();
    assert_eq!(first, second);
    assert_eq!(eigenvalues, engine.eigenvalues());
});
