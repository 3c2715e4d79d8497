// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Integrator and filter for the 8580.
//!
//! The 8580 replaces the 6581's voltage controlled resistor with a switched
//! capacitor voltage divider driving the gates of a transistor ladder, so the
//! cutoff DAC is close to linear:
//!
//! ```text
//!                    +---C---+
//!                    |       |
//!      vi -----Rfc---o--[A>--o-- vo
//!                    vx
//! ```
//!
//! Rfc is a single NMOS transistor in triode mode whose W/L ratio is set by
//! the fc register.

use std::sync::Arc;

use super::model::{FilterModelConfig, FilterModelConfig8580};
use super::{FilterBehavior, FilterState};
use crate::cache;

/// Integrator for the 8580 filter.
#[derive(Clone, Debug, Default)]
pub struct Integrator8580 {
    vc: i32,
    vx: u16,
    /// Normalized Vg - Vth.
    n_vgt: u16,
    /// Normalized current factor of the cutoff transistor.
    n_dac: u16,
}

impl Integrator8580 {
    /// Sets the gate overdrive from the control point voltage.
    ///
    /// The gate voltage is controlled by the switched capacitor voltage
    /// divider: Ua = Ue * v = 4.76v, with 1 < v < 2.
    pub fn set_v(&mut self, config: &FilterModelConfig8580, v: f64) {
        let vg = 4.76 * v;
        let vgt = vg - config.vth();
        self.n_vgt = config.common().normalized_value(vgt);
    }

    /// Sets the cutoff current factor.
    #[inline]
    pub fn set_fc(&mut self, n_dac: u16) {
        self.n_dac = n_dac;
    }

    /// Clears the capacitor charge.
    pub fn reset(&mut self) {
        self.vc = 0;
        self.vx = 0;
    }

    /// Solves one step of the integrator, returning the output voltage.
    #[inline]
    pub fn solve(&mut self, common: &FilterModelConfig, vi: i32) -> i32 {
        let n_vgt = self.n_vgt as i32;

        // Triode/saturation mode.
        let vgst = self.n_vgt.saturating_sub(self.vx) as u32;
        let vgdt = if vi < n_vgt { (n_vgt - vi) as u32 } else { 0 };

        let vgst_2 = vgst * vgst;
        let vgdt_2 = vgdt.wrapping_mul(vgdt);

        // DAC current, scaled by (1/m)*2^13*m*2^16*m*2^16*2^-15 = m*2^30
        let n_i_dac = (self.n_dac as i32).wrapping_mul((vgst_2.wrapping_sub(vgdt_2) as i32) >> 15);

        self.vc = self.vc.wrapping_add(n_i_dac);

        // vx = g(vc)
        let vc_idx = (self.vc >> 15).wrapping_sub(i16::MIN as i32);
        self.vx = common.opamp_rev(vc_idx.clamp(0, 65535) as usize);

        // Return vo.
        (self.vx as i32).wrapping_sub(self.vc >> 14)
    }
}

/// 8580 filter.
#[derive(Clone)]
pub struct Filter8580 {
    config: Arc<FilterModelConfig8580>,
    state: FilterState,
    curve: f64,
    hp_integrator: Integrator8580,
    bp_integrator: Integrator8580,
}

impl Filter8580 {
    /// Default position of the filter curve.
    pub const DEFAULT_CURVE: f64 = 0.5;

    /// Creates a filter using the shared 8580 model tables.
    pub fn new() -> Self {
        Self::with_config(cache::filter_model_8580())
    }

    /// Creates a filter on a given table set.
    pub fn with_config(config: Arc<FilterModelConfig8580>) -> Self {
        let mut filter = Filter8580 {
            state: FilterState::new(config.common()),
            curve: Self::DEFAULT_CURVE,
            hp_integrator: Integrator8580::default(),
            bp_integrator: Integrator8580::default(),
            config,
        };
        filter.apply_curve();
        filter.update_cutoff();
        filter
    }

    /// Filter curve position in [0, 1].
    pub fn curve(&self) -> f64 {
        self.curve
    }

    /// Sets the filter curve, moving the center frequency. Higher values
    /// give lower cutoff frequencies.
    pub fn set_filter_curve(&mut self, curve: f64) {
        self.curve = curve.clamp(0.0, 1.0);
        self.apply_curve();
    }

    fn apply_curve(&mut self) {
        let cp = FilterModelConfig8580::control_point(self.curve);
        self.hp_integrator.set_v(&self.config, cp);
        self.bp_integrator.set_v(&self.config, cp);
    }
}

impl Default for Filter8580 {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBehavior for Filter8580 {
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
        let n_dac = self.config.dac_current_factor(self.state.fc);
        self.hp_integrator.set_fc(n_dac);
        self.bp_integrator.set_fc(n_dac);
    }

    #[inline]
    fn integrate(&mut self, vhp: i32) -> (i32, i32) {
        let common = self.config.common();
        let vbp = self.hp_integrator.solve(common, vhp);
        let vlp = self.bp_integrator.solve(common, vbp);
        (vbp, vlp)
    }

    fn reset_integrators(&mut self) {
        self.hp_integrator.reset();
        self.bp_integrator.reset();
    }
}
