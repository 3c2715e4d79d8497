// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! DAC nonlinearity model for accurate R-2R ladder emulation.
//!
//! The SID DACs are built as R-2R ladders. The 6581 has imperfect resistor
//! matching (2R/R ~ 2.20) and missing termination at bit 0, causing
//! non-monotonic output. The 8580 has proper termination and matched
//! resistors (2R/R = 2.00), producing linear output.
//!
//! The same model drives the 12-bit waveform DAC, the 8-bit envelope DAC
//! and the 11-bit filter cutoff DAC.

use super::ChipModel;

/// Models open circuit from missing termination resistor
const R_INFINITY: f64 = 1e6;

/// Ladder parameters of one chip revision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LadderParams {
    /// Ratio between the 2R and R resistors.
    pub r2r_ratio: f64,
    /// Whether bit 0 is terminated with 2R.
    pub terminated: bool,
    /// Fraction of a bit's weight leaking through when the bit is off.
    pub leakage: f64,
}

impl LadderParams {
    /// Measured parameters for the given chip.
    pub const fn for_model(chip_model: ChipModel) -> Self {
        match chip_model {
            ChipModel::Mos6581 => LadderParams {
                r2r_ratio: 2.20,
                terminated: false,
                leakage: 0.0075,
            },
            ChipModel::Mos8580 => LadderParams {
                r2r_ratio: 2.00,
                terminated: true,
                leakage: 0.0035,
            },
        }
    }
}

/// Parallel resistance: r1 || r2
const fn parallel(r1: f64, r2: f64) -> f64 {
    (r1 * r2) / (r1 + r2)
}

/// A "kinked" R-2R ladder DAC with normalized per-bit weights.
#[derive(Clone, Debug)]
pub struct KinkedDac {
    weights: Vec<f64>,
    leakage: f64,
}

impl KinkedDac {
    /// Model a `bits` wide DAC of the given chip.
    pub fn new(bits: usize, chip_model: ChipModel) -> Self {
        Self::with_params(bits, LadderParams::for_model(chip_model))
    }

    /// Model a `bits` wide DAC with explicit ladder parameters.
    pub fn with_params(bits: usize, params: LadderParams) -> Self {
        let mut weights: Vec<f64> = (0..bits)
            .map(|bit| Self::bit_voltage(bit, bits, params.r2r_ratio, params.terminated))
            .collect();
        let v_sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= v_sum;
        }
        KinkedDac {
            weights,
            leakage: params.leakage,
        }
    }

    /// Voltage contribution of a single set bit, found by walking the ladder
    /// with Thevenin equivalents.
    fn bit_voltage(set_bit: usize, bits: usize, r2: f64, terminated: bool) -> f64 {
        let r = 1.0;
        let mut vn = 1.0;

        // Tail resistance starts at 2R (terminated) or infinity (unterminated)
        let mut rn = if terminated { r2 } else { R_INFINITY };

        for _ in 0..set_bit {
            rn = if rn == R_INFINITY {
                r + r2
            } else {
                r + parallel(r2, rn)
            };
        }

        // Source transformation at set_bit
        if rn == R_INFINITY {
            rn = r2;
        } else {
            let rn_par = parallel(r2, rn);
            vn *= rn_par / r2;
            rn = rn_par;
        }

        for _ in (set_bit + 1)..bits {
            rn += r;
            let i = vn / rn;
            rn = parallel(r2, rn);
            vn = rn * i;
        }

        vn
    }

    /// Number of input bits.
    pub fn bits(&self) -> usize {
        self.weights.len()
    }

    /// Normalized weight of one bit.
    pub fn weight(&self, bit: usize) -> f64 {
        self.weights[bit]
    }

    /// Analog output for a digital code, normalized so all-ones is 1.0.
    pub fn output(&self, code: u32) -> f64 {
        self.weights
            .iter()
            .enumerate()
            .map(|(i, &w)| if code & (1 << i) != 0 { w } else { w * self.leakage })
            .sum()
    }

    /// Output for every code.
    pub fn table(&self) -> Vec<f32> {
        (0..(1u32 << self.bits()))
            .map(|code| self.output(code) as f32)
            .collect()
    }
}

/// Builds complete DAC lookup table for all input values.
pub fn build_dac_table(bits: usize, chip_model: ChipModel) -> Vec<f32> {
    KinkedDac::new(bits, chip_model).table()
}
