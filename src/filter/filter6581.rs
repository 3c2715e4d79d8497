// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! EKV model integrator for the 6581 filter.
//!
//! This implements the physics-based MOS transistor model for the integrating
//! op-amp circuit in the 6581 filter. The circuit consists of:
//!
//! ```text
//!                    +---C---+
//!                    |       |
//!      vi --o--Rw--o-o--[A>--o-- vo
//!           |      | vx
//!           +--Rs--+
//! ```
//!
//! Where:
//! - Rw is a voltage-controlled resistor (VCR) setting the cutoff frequency
//! - Rs is a "snake" resistor for DC stability
//! - C is the integration capacitor
//! - A is an inverting op-amp modeled via measured transfer function
//!
//! The EKV (Enz-Krummenacher-Vittoz) model provides smooth transitions between
//! subthreshold, triode, and saturation modes.

use std::sync::Arc;

use super::model::{FilterModelConfig, FilterModelConfig6581};
use super::{FilterBehavior, FilterState};
use crate::cache;

/// Integrator for 6581 filter using EKV transistor model.
///
/// Holds only the integrator state; lookup tables are passed to `solve()`.
#[derive(Clone, Debug)]
pub struct Integrator6581 {
    /// Capacitor voltage (charge accumulator), scaled.
    vc: i32,
    /// Op-amp input voltage, normalized.
    vx: u16,
    /// Pre-computed (nVddt - Vw)^2 / 2 for VCR gate voltage calculation.
    n_vddt_vw_2: u32,
    n_vddt: u16,
    n_vt: u16,
    n_vmin: u16,
}

impl Integrator6581 {
    /// Creates a new integrator, caching constant values from config.
    pub fn new(config: &FilterModelConfig6581) -> Self {
        Self {
            vc: 0,
            vx: 0,
            n_vddt_vw_2: 0,
            n_vddt: config.n_vddt(),
            n_vt: config.n_vt(),
            n_vmin: config.n_vmin(),
        }
    }

    /// Sets the cutoff frequency via the W control voltage.
    #[inline]
    pub fn set_vw(&mut self, vw: u16) {
        let diff = self.n_vddt.saturating_sub(vw) as u32;
        self.n_vddt_vw_2 = (diff * diff) >> 1;
    }

    /// Clears the capacitor charge.
    pub fn reset(&mut self) {
        self.vc = 0;
        self.vx = 0;
    }

    /// Solves one step of the integrator, returning the output voltage.
    ///
    /// `n_ids_term` is the VCR current table and `n_snake` the snake current
    /// factor, both scaled by the filter range.
    #[inline]
    pub fn solve(
        &mut self,
        config: &FilterModelConfig6581,
        n_ids_term: &[u16],
        n_snake: u16,
        vi: i32,
    ) -> i32 {
        // "Snake" currents for triode mode.
        // The snake resistor has Vg = Vdd, so it's always in triode mode.
        let n_vddt = self.n_vddt as u32;
        let vx = self.vx as u32;

        // vi can be negative or > nVddt, so use wrapping subtraction
        let vgst = n_vddt.wrapping_sub(vx);
        let vgdt = n_vddt.wrapping_sub(vi as u32);

        let vgst_2 = vgst.wrapping_mul(vgst);
        let vgdt_2 = vgdt.wrapping_mul(vgdt);

        // Snake current, scaled by (1/m)*2^13*m*2^16*m*2^16*2^-15 = m*2^30
        let vgst_2_minus_vgdt_2 = vgst_2.wrapping_sub(vgdt_2) as i32;
        let n_i_snake = (n_snake as i32).wrapping_mul(vgst_2_minus_vgdt_2 >> 15);

        // VCR gate voltage.
        // Vg = Vddt - sqrt(((Vddt - Vw)^2 + Vgdt^2) / 2)
        let vg_arg = (self.n_vddt_vw_2.wrapping_add(vgdt_2 >> 1)) >> 16;
        let n_vg = config.vcr_n_vg((vg_arg as usize).min(65535)) as i32;

        // EKV model: kVgt = (Vg - Vt) for VCR
        let k_vgt = n_vg - self.n_vt as i32 - self.n_vmin as i32;

        // Offset by INT16_MIN to get positive table index.
        let k_vgt_vs = k_vgt
            .wrapping_sub(self.vx as i32)
            .wrapping_sub(i16::MIN as i32);
        let k_vgt_vd = k_vgt.wrapping_sub(vi).wrapping_sub(i16::MIN as i32);

        let k_vgt_vs = k_vgt_vs.clamp(0, 65535) as usize;
        let k_vgt_vd = k_vgt_vd.clamp(0, 65535) as usize;

        // VCR current via EKV model: I = Is * (if - ir)
        // Scaled by m*2^15*2^15 = m*2^30
        let i_f = (n_ids_term[k_vgt_vs] as u32) << 15;
        let i_r = (n_ids_term[k_vgt_vd] as u32) << 15;
        let n_i_vcr = i_f.wrapping_sub(i_r) as i32;

        self.vc = self.vc.wrapping_add(n_i_snake.wrapping_add(n_i_vcr));

        // Op-amp transfer function: vx = g(vc)
        let vc_idx = (self.vc >> 15).wrapping_sub(i16::MIN as i32);
        self.vx = config.common().opamp_rev(vc_idx.clamp(0, 65535) as usize);

        // vo = vx - vc/2
        (self.vx as i32).wrapping_sub(self.vc >> 14)
    }
}

/// 6581 filter: two EKV integrators in a state-variable topology.
#[derive(Clone)]
pub struct Filter6581 {
    config: Arc<FilterModelConfig6581>,
    state: FilterState,
    /// Cutoff DAC output for the current curve.
    f0_dac: Box<[u16]>,
    /// VCR current table for the current range.
    vcr_n_ids_term: Box<[u16]>,
    /// Snake current factor for the current range.
    n_snake: u16,
    curve: f64,
    u_cox: f64,
    hp_integrator: Integrator6581,
    bp_integrator: Integrator6581,
}

impl Filter6581 {
    /// Default position of the filter curve.
    pub const DEFAULT_CURVE: f64 = 0.5;

    /// Creates a filter using the shared 6581 model tables.
    pub fn new() -> Self {
        Self::with_config(cache::filter_model_6581())
    }

    /// Creates a filter on a given table set.
    pub fn with_config(config: Arc<FilterModelConfig6581>) -> Self {
        let u_cox = FilterModelConfig6581::DEFAULT_U_COX;
        let mut filter = Filter6581 {
            f0_dac: config.build_f0_dac(Self::DEFAULT_CURVE),
            vcr_n_ids_term: config.build_vcr_n_ids_term(u_cox),
            n_snake: config.snake_current_factor(u_cox),
            curve: Self::DEFAULT_CURVE,
            u_cox,
            hp_integrator: Integrator6581::new(&config),
            bp_integrator: Integrator6581::new(&config),
            state: FilterState::new(config.common()),
            config,
        };
        filter.update_cutoff();
        filter
    }

    /// Filter curve position in [0, 1].
    pub fn curve(&self) -> f64 {
        self.curve
    }

    /// Sets the filter curve. Higher values darken the filter.
    pub fn set_filter_curve(&mut self, curve: f64) {
        let curve = curve.clamp(0.0, 1.0);
        if curve != self.curve {
            self.curve = curve;
            self.f0_dac = self.config.build_f0_dac(curve);
            self.update_cutoff();
        }
    }

    /// Sets the filter range for tuning to match specific SID chips.
    ///
    /// 0.0 gives the lowest cutoff frequencies, 0.5 the default, 1.0 the
    /// highest.
    pub fn set_filter_range(&mut self, adjustment: f64) {
        let u_cox = FilterModelConfig6581::u_cox_for_range(adjustment);
        if (u_cox - self.u_cox).abs() > 1e-12 {
            self.u_cox = u_cox;
            self.vcr_n_ids_term = self.config.build_vcr_n_ids_term(u_cox);
            self.n_snake = self.config.snake_current_factor(u_cox);
        }
    }

    /// Cutoff control voltage for the current fc register.
    pub fn vw(&self) -> u16 {
        self.f0_dac[self.state.fc as usize]
    }
}

impl Default for Filter6581 {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBehavior for Filter6581 {
    #[inline]
    fn state(&self) -> &FilterState {
        &self.state
    }

    #[inline]
    fn state_mut(&mut self) -> &mut FilterState {
        &mut self.state
    }

    #[inline]
    fn common(&self) -> &FilterModelConfig {
        self.config.common()
    }

    fn update_cutoff(&mut self) {
        let vw = self.vw();
        self.hp_integrator.set_vw(vw);
        self.bp_integrator.set_vw(vw);
    }

    #[inline]
    fn integrate(&mut self, vhp: i32) -> (i32, i32) {
        let vbp = self
            .hp_integrator
            .solve(&self.config, &self.vcr_n_ids_term, self.n_snake, vhp);
        let vlp = self
            .bp_integrator
            .solve(&self.config, &self.vcr_n_ids_term, self.n_snake, vbp);
        (vbp, vlp)
    }

    fn reset_integrators(&mut self) {
        self.hp_integrator.reset();
        self.bp_integrator.reset();
    }
}
