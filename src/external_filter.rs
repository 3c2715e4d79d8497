// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// External filter circuit component values.
// The C64 audio output stage uses two STC networks:
//
// 1. Low-pass RC filter: R = 10kOhm, C = 1000pF
//    Cutoff = 1/(2*PI*RC) = 15.9kHz
//
// 2. High-pass (DC blocker): R = 1kOhm, C = 10uF
//    Cutoff = 1/(2*PI*RC) = 15.9Hz
//
// A BJT voltage follower (2SC1815) connects these stages but its
// effect requires MHz-level sampling to model accurately.
const R_LP: f64 = 10e3; // 10kOhm
const C_LP: f64 = 1000e-12; // 1000pF
const R_HP: f64 = 1e3; // 1kOhm
const C_HP: f64 = 10e-6; // 10uF

/// Default clock frequency (PAL C64)
const DEFAULT_CLOCK_FREQ: f64 = 985248.0;

/// Offset moving the unsigned filter output around zero, in internal
/// precision.
const INPUT_OFFSET: i32 = 1 << (11 + 15);

/// C64 audio output stage filter.
///
/// Models two STC networks: a ~16kHz low-pass followed by a ~16Hz high-pass
/// (DC blocker). Uses simplified RC model instead of full BJT (2SC1815)
/// simulation which would require MHz-level sampling.
#[derive(Clone, Copy, Debug)]
pub struct ExternalFilter {
    // Configuration
    enabled: bool,
    /// Low-pass filter coefficient (scaled by 2^7 for fixed-point math)
    lp_coeff: i32,
    /// High-pass filter coefficient (scaled by 2^17 for fixed-point math)
    hp_coeff: i32,
    // Runtime State
    /// Low-pass filter state (internal precision)
    lp_state: i32,
    /// High-pass filter state (internal precision)
    hp_state: i32,
}

/// Calculate RC time constant τ = R × C (seconds)
#[inline]
const fn time_constant(resistance: f64, capacitance: f64) -> f64 {
    resistance * capacitance
}

impl ExternalFilter {
    /// Create an external filter clocked at the PAL frequency.
    pub fn new() -> Self {
        let mut filter = Self {
            enabled: true,
            lp_coeff: 0,
            hp_coeff: 0,
            lp_state: 0,
            hp_state: 0,
        };
        filter.set_clock_frequency(DEFAULT_CLOCK_FREQ);
        filter
    }

    /// Whether the stage is filtering.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the external audio filter stage. When disabled the
    /// input only has its offset removed.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Set the clock frequency and recalculate filter coefficients.
    ///
    /// Uses first-order IIR filter: α = dt / (dt + τ)
    /// where dt = 1/frequency and τ = RC time constant.
    pub fn set_clock_frequency(&mut self, frequency: f64) {
        let dt = 1.0 / frequency;

        let lp_alpha = dt / (dt + time_constant(R_LP, C_LP));
        self.lp_coeff = (lp_alpha * (1 << 7) as f64 + 0.5) as i32;

        let hp_alpha = dt / (dt + time_constant(R_HP, C_HP));
        self.hp_coeff = (hp_alpha * (1 << 17) as f64 + 0.5) as i32;
    }

    /// Clock the filter for one cycle with the unsigned output of the chip's
    /// volume stage, returning the signed output sample.
    #[inline]
    pub fn clock(&mut self, input: u16) -> i32 {
        let vi = ((input as i32) << 11) - INPUT_OFFSET;
        if self.enabled {
            // Products exceed i32 for large steps; use i64 intermediates.
            let dvlp = ((self.lp_coeff as i64 * (vi as i64 - self.lp_state as i64)) >> 7) as i32;
            let dvhp = ((self.hp_coeff as i64 * (self.lp_state as i64 - self.hp_state as i64))
                >> 17) as i32;
            self.lp_state = self.lp_state.saturating_add(dvlp);
            self.hp_state = self.hp_state.saturating_add(dvhp);
        } else {
            self.lp_state = vi;
            self.hp_state = 0;
        }
        self.output()
    }

    /// Get the filtered output, scaled back from internal precision.
    #[inline]
    pub fn output(&self) -> i32 {
        // Output is Vlp - Vhp, scaled back by 11 bits
        ((self.lp_state as i64 - self.hp_state as i64) >> 11) as i32
    }

    /// Reset internal filter state to zero.
    pub fn reset(&mut self) {
        self.lp_state = 0;
        self.hp_state = 0;
    }
}

impl Default for ExternalFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficients_follow_clock() {
        let mut filter = ExternalFilter::new();
        let pal = (filter.lp_coeff, filter.hp_coeff);
        filter.set_clock_frequency(1_022_727.0);
        assert!(filter.lp_coeff <= pal.0);
        assert!(filter.hp_coeff <= pal.1);
        assert!(filter.hp_coeff > 0);
    }

    #[test]
    fn disabled_passes_offset_input() {
        let mut filter = ExternalFilter::new();
        filter.set_enabled(false);
        assert_eq!(filter.clock(0x8000), 0);
        assert_eq!(filter.clock(0x9000), 0x1000);
        assert_eq!(filter.clock(0x0000), -0x8000);
    }
}
