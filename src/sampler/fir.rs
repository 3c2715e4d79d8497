// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Resampling filter design.
//!
//! The anti-aliasing low-pass is a sinc weighted by a Kaiser window. It is
//! stored as a bank of phases, each a copy of the impulse response shifted
//! by a fraction of a cycle, so the sampler can pick the phase closest to
//! the position of the output sample. Tables depend only on the rates
//! involved and are shared through [`crate::cache::fir_table`].

use std::f64::consts::PI;
use std::time::Instant;

use log::debug;

use super::{SamplingMethod, RING_SIZE};
use crate::ConfigError;

/// Passband edge in Hz when the output rate is high enough.
pub const DEFAULT_PASS_FREQ: u32 = 20_000;

/// Coefficient gain, leaving headroom for the sinc ripple.
const FILTER_SCALE: f64 = 0.97;

/// Coefficients are scaled by 2^FIR_SHIFT.
pub(crate) const FIR_SHIFT: i32 = 15;

// The error in interpolated lookup is bounded by 1.234/L^2, while the
// error in non-interpolated lookup is bounded by 0.7854/L + 0.4113/L^2, see
// http://www-ccrma.stanford.edu/~jos/resample/Choice_Table_Size.html
// For a resolution of 16 bits this yields L >= 285 and L >= 51473.
const PHASES_INTERPOLATED: f64 = 285.0;
const PHASES_NEAREST: f64 = 51473.0;

/// Which filter to build for a resampling setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FirKey {
    /// Neighbouring phases are blended instead of picking the nearest one.
    pub interpolated: bool,
    /// Chip clock in Hz.
    pub clock_freq: u32,
    /// Output rate in Hz.
    pub sample_freq: u32,
    /// Upper edge of the passband in Hz.
    pub pass_freq: u32,
}

impl FirKey {
    /// Filter for resampling `clock_freq` to `sample_freq` with `method`.
    ///
    /// # Errors
    /// Zero rates are rejected, as is an output rate above the clock or one
    /// so low that the impulse response would not fit the sample ring.
    pub fn new(method: SamplingMethod, clock_freq: u32, sample_freq: u32) -> Result<Self, ConfigError> {
        if clock_freq == 0 {
            return Err(ConfigError::ZeroClockFreq);
        }
        if sample_freq == 0 {
            return Err(ConfigError::ZeroSampleFreq);
        }
        let unsupported = ConfigError::UnsupportedFrequency {
            clock_freq,
            sample_freq,
        };
        if sample_freq > clock_freq {
            return Err(unsupported);
        }
        // Keep the transition band at least a tenth of the output bandwidth.
        let pass_freq = if 20 * DEFAULT_PASS_FREQ as u64 >= 9 * sample_freq as u64 {
            (sample_freq as u64 * 9 / 20) as u32
        } else {
            DEFAULT_PASS_FREQ
        };
        let key = FirKey {
            interpolated: method != SamplingMethod::ResampleFast,
            clock_freq,
            sample_freq,
            pass_freq,
        };
        if key.taps() >= RING_SIZE {
            return Err(unsupported);
        }
        Ok(key)
    }

    fn cycles_per_sample(&self) -> f64 {
        self.clock_freq as f64 / self.sample_freq as f64
    }

    /// Impulse response length in cycles. Always odd.
    pub fn taps(&self) -> usize {
        // Order from Kaiser's formula for the transition band width, rounded
        // up to an even number of zero crossings.
        let transition = (1.0 - 2.0 * self.pass_freq as f64 / self.sample_freq as f64) * PI;
        let mut order = ((stopband_attenuation() - 7.95) / (2.285 * transition) + 0.5) as usize;
        order += order & 1;
        ((order as f64 * self.cycles_per_sample()) as usize + 1) | 1
    }

    /// Number of phases, a power of two so that the 16.16 sample offset maps
    /// onto whole phases.
    pub fn phases(&self) -> usize {
        let resolution = if self.interpolated {
            PHASES_INTERPOLATED
        } else {
            PHASES_NEAREST
        };
        let bits = (resolution / self.cycles_per_sample()).log2().ceil().max(0.0);
        1 << bits as u32
    }
}

/// 16 bits, about 96dB.
fn stopband_attenuation() -> f64 {
    20.0 * f64::from(1u32 << 16).log10()
}

/// Bank of fixed point impulse responses.
#[derive(Debug)]
pub struct FirTable {
    coefficients: Vec<i16>,
    taps: usize,
    phases: usize,
}

impl FirTable {
    /// Compute the filter bank for `key`.
    pub fn design(key: &FirKey) -> Self {
        let start = Instant::now();
        let cycles_per_sample = key.cycles_per_sample();
        let taps = key.taps();
        let phases = key.phases();
        let half = (taps / 2) as i32;

        // Kaiser window beta for the stopband, see kaiserord in the MATLAB
        // Signal Processing Toolbox.
        let beta = 0.1102 * (stopband_attenuation() - 8.7);
        let window_norm = i0(beta);
        // Cutoff midway through the transition band.
        let cutoff = (2.0 * key.pass_freq as f64 / key.sample_freq as f64 + 1.0) * PI / 2.0;
        let gain = (1 << FIR_SHIFT) as f64 * FILTER_SCALE * cutoff / (PI * cycles_per_sample);

        let mut coefficients = Vec::with_capacity(taps * phases);
        for phase in 0..phases {
            let shift = phase as f64 / phases as f64;
            coefficients.extend((-half..=half).map(|j| {
                let x = j as f64 - shift;
                let w = x / half as f64;
                let window = if w.abs() <= 1.0 {
                    i0(beta * (1.0 - w * w).sqrt()) / window_norm
                } else {
                    0.0
                };
                let wt = cutoff * x / cycles_per_sample;
                let sinc = if wt.abs() >= 1e-6 { wt.sin() / wt } else { 1.0 };
                (gain * sinc * window + 0.5) as i16
            }));
        }

        debug!(
            "designed {}x{} FIR for {} Hz -> {} Hz in {:?}",
            phases,
            taps,
            key.clock_freq,
            key.sample_freq,
            start.elapsed()
        );
        FirTable {
            coefficients,
            taps,
            phases,
        }
    }

    pub fn taps(&self) -> usize {
        self.taps
    }

    pub fn phases(&self) -> usize {
        self.phases
    }

    /// Impulse response shifted by `index / phases` of a cycle.
    #[inline]
    pub fn phase(&self, index: usize) -> &[i16] {
        let start = index * self.taps;
        &self.coefficients[start..start + self.taps]
    }
}

/// Zeroth order modified Bessel function of the first kind.
pub fn i0(x: f64) -> f64 {
    const EPSILON: f64 = 1e-6;
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut n = 1.0;
    while term >= EPSILON * sum {
        let t = half / n;
        term *= t * t;
        sum += term;
        n += 1.0;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PAL: u32 = 985_248;

    #[test]
    fn bessel_i0() {
        assert_relative_eq!(i0(0.0), 1.0);
        assert_relative_eq!(i0(1.0), 1.266_065_9, epsilon = 1e-5);
    }

    #[test]
    fn pass_band_follows_output_rate() {
        let key = FirKey::new(SamplingMethod::Resample, PAL, 44_100).unwrap();
        assert_eq!(key.pass_freq, 19_845);
        let key = FirKey::new(SamplingMethod::Resample, PAL, 96_000).unwrap();
        assert_eq!(key.pass_freq, DEFAULT_PASS_FREQ);
    }

    #[test]
    fn too_long_responses_are_rejected() {
        assert_eq!(
            FirKey::new(SamplingMethod::ResampleFast, PAL, 7_000),
            Err(ConfigError::UnsupportedFrequency {
                clock_freq: PAL,
                sample_freq: 7_000
            })
        );
        assert_eq!(
            FirKey::new(SamplingMethod::Resample, 0, 44_100),
            Err(ConfigError::ZeroClockFreq)
        );
    }

    #[test]
    fn phases_are_odd_length_and_peak_centered() {
        let key = FirKey::new(SamplingMethod::Resample, PAL, 44_100).unwrap();
        let fir = FirTable::design(&key);
        assert_eq!(fir.taps() & 1, 1);
        assert_eq!(fir.phases().count_ones(), 1);
        let first = fir.phase(0);
        let peak = first
            .iter()
            .enumerate()
            .max_by_key(|(_, v)| **v)
            .map(|(i, _)| i);
        assert_eq!(peak, Some(fir.taps() / 2));
        assert_eq!(fir.phase(fir.phases() - 1).len(), fir.taps());
    }

    #[test]
    fn unit_gain_at_dc() {
        let key = FirKey::new(SamplingMethod::Resample, PAL, 44_100).unwrap();
        let fir = FirTable::design(&key);
        let sum: i32 = fir.phase(0).iter().map(|&c| c as i32).sum();
        let expected = FILTER_SCALE * (1 << FIR_SHIFT) as f64;
        assert!((sum as f64 - expected).abs() < expected * 0.1, "dc gain {sum}");
    }

    #[test]
    fn nearest_lookup_has_finer_resolution() {
        let slow = FirKey::new(SamplingMethod::Resample, PAL, 48_000).unwrap();
        let fast = FirKey::new(SamplingMethod::ResampleFast, PAL, 48_000).unwrap();
        assert!(fast.phases() > slow.phases());
        assert_eq!(fast.taps(), slow.taps());
    }
}
