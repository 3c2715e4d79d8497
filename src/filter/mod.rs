// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! The SID filter.
//!
//! The filter is a two-integrator-loop state variable filter. The summer
//! sums the filtered inputs with the lowpass output and the resonance
//! scaled bandpass output to form the highpass voltage, which is then
//! integrated twice. The selected outputs are mixed with the unfiltered
//! inputs and passed through the volume stage.
//!
//! The two chip models differ only in their integrators and op-amp tables;
//! the register file, routing and signal flow are shared through
//! [`FilterBehavior`]. [`Filter`] selects the model once per instance.

mod filter6581;
mod filter8580;
pub mod model;
pub mod opamp;

pub use self::filter6581::{Filter6581, Integrator6581};
pub use self::filter8580::{Filter8580, Integrator8580};

use self::model::FilterModelConfig;
use crate::ChipModel;

/// Filter registers, routing and node voltages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterState {
    /// Cutoff frequency, 11 bits.
    pub fc: u16,
    /// Resonance, 4 bits.
    pub res: u8,
    /// Routing of voices 1-3 and external input through the filter.
    pub filt: u8,
    /// Output selection: bit 0 lowpass, bit 1 bandpass, bit 2 highpass.
    pub mode: u8,
    /// Master volume.
    pub vol: u8,
    /// Disconnects voice 3 from the mixer when not routed to the filter.
    pub voice3_off: bool,
    /// When disabled, every input bypasses the filter.
    pub enabled: bool,
    /// Highpass output voltage.
    pub vhp: i32,
    /// Bandpass output voltage.
    pub vbp: i32,
    /// Lowpass output voltage.
    pub vlp: i32,
    /// External input voltage.
    pub ve: i32,
    /// Number of inputs into the summer.
    n_sum: usize,
    /// Number of inputs into the mixer.
    n_mix: usize,
}

impl FilterState {
    fn new(common: &FilterModelConfig) -> Self {
        let mut state = FilterState {
            enabled: true,
            ve: common.normalized_voice(0.0),
            ..Default::default()
        };
        state.update_mixing();
        state
    }

    /// Routing actually in effect.
    #[inline]
    fn routing(&self) -> u8 {
        if self.enabled {
            self.filt
        } else {
            0
        }
    }

    /// Recompute summer and mixer input counts.
    fn update_mixing(&mut self) {
        let filt = self.routing();
        self.n_sum = filt.count_ones() as usize;
        let mut n_mix = 4 - self.n_sum;
        if self.voice3_off && filt & 0x04 == 0 {
            n_mix -= 1;
        }
        self.n_mix = n_mix + self.mode.count_ones() as usize;
    }

    /// Cutoff frequency low register.
    pub fn fc_lo(&self) -> u8 {
        (self.fc & 0x007) as u8
    }

    /// Cutoff frequency high register.
    pub fn fc_hi(&self) -> u8 {
        (self.fc >> 3) as u8
    }

    /// Resonance and routing register.
    pub fn res_filt(&self) -> u8 {
        (self.res << 4) | (self.filt & 0x0f)
    }

    /// Mode and volume register.
    pub fn mode_vol(&self) -> u8 {
        let value = if self.voice3_off { 0x80 } else { 0 };
        value | (self.mode << 4) | (self.vol & 0x0f)
    }
}

/// Capability interface of a filter model.
///
/// Implementors provide the integrators and cutoff control; register
/// handling and the per-cycle signal flow are shared.
pub trait FilterBehavior {
    /// Registers and node voltages.
    fn state(&self) -> &FilterState;
    /// Mutable registers and node voltages.
    fn state_mut(&mut self) -> &mut FilterState;
    /// Op-amp tables of this model.
    fn common(&self) -> &FilterModelConfig;
    /// Recompute integrator control from the cutoff register.
    fn update_cutoff(&mut self);
    /// Recompute resonance dependent state.
    ///
    /// Both chip models select the resonance gain table at clock time.
    fn update_resonance(&mut self) {}
    /// Run both integrators from the highpass voltage, returning the new
    /// bandpass and lowpass voltages.
    fn integrate(&mut self, vhp: i32) -> (i32, i32);
    /// Discharge the integrator capacitors.
    fn reset_integrators(&mut self);

    /// Clock the filter one cycle with the voice outputs, returning the
    /// normalized output of the volume stage.
    #[inline]
    fn clock(&mut self, voice1: f32, voice2: f32, voice3: f32) -> u16 {
        let (mut vmix, vhp) = {
            let common = self.common();
            let state = self.state();
            let filt = state.routing();
            let inputs = [
                common.normalized_voice(voice1),
                common.normalized_voice(voice2),
                common.normalized_voice(voice3),
                state.ve,
            ];
            let mut vsum = 0;
            let mut vmix = 0;
            for (i, v) in inputs.into_iter().enumerate() {
                if filt & (1 << i) != 0 {
                    vsum += v;
                } else if i != 2 || !state.voice3_off {
                    vmix += v;
                }
            }
            let feedback = common.resonance(state.res, state.vbp) + state.vlp;
            let vhp = common.summer(state.n_sum, feedback + vsum);
            (vmix, vhp)
        };

        let (vbp, vlp) = self.integrate(vhp);

        let state = self.state_mut();
        state.vhp = vhp;
        state.vbp = vbp;
        state.vlp = vlp;

        if state.mode & 0x1 != 0 {
            vmix += vlp;
        }
        if state.mode & 0x2 != 0 {
            vmix += vbp;
        }
        if state.mode & 0x4 != 0 {
            vmix += vhp;
        }

        let state = self.state();
        let common = self.common();
        common.volume(state.vol, common.mixer(state.n_mix, vmix))
    }

    /// Set the external input sample.
    fn input(&mut self, sample: i16) {
        let ve = self.common().normalized_voice(sample as f32 / 32768.0);
        self.state_mut().ve = ve;
    }

    /// Enable or disable the filter.
    fn set_enabled(&mut self, enabled: bool) {
        let state = self.state_mut();
        state.enabled = enabled;
        state.update_mixing();
    }

    /// Set cutoff frequency low bits.
    fn set_fc_lo(&mut self, value: u8) {
        let state = self.state_mut();
        state.fc = state.fc & 0x7f8 | (value as u16) & 0x007;
        self.update_cutoff();
    }

    /// Set cutoff frequency high bits.
    fn set_fc_hi(&mut self, value: u8) {
        let state = self.state_mut();
        state.fc = ((value as u16) << 3) & 0x7f8 | state.fc & 0x007;
        self.update_cutoff();
    }

    /// Set resonance and voice routing.
    fn set_res_filt(&mut self, value: u8) {
        let state = self.state_mut();
        state.res = (value >> 4) & 0x0f;
        state.filt = value & 0x0f;
        state.update_mixing();
        self.update_resonance();
    }

    /// Set output mode, voice 3 disconnect and volume.
    fn set_mode_vol(&mut self, value: u8) {
        let state = self.state_mut();
        state.voice3_off = value & 0x80 != 0;
        state.mode = (value >> 4) & 0x07;
        state.vol = value & 0x0f;
        state.update_mixing();
    }

    /// Clear registers and node voltages. The enable flag and external
    /// input are kept.
    fn reset(&mut self) {
        let state = self.state_mut();
        *state = FilterState {
            enabled: state.enabled,
            ve: state.ve,
            ..Default::default()
        };
        state.update_mixing();
        self.reset_integrators();
        self.update_cutoff();
        self.update_resonance();
    }
}

/// Filter of one chip model, resolved once per instance.
#[derive(Clone)]
pub enum Filter {
    /// MOS 6581 filter.
    Mos6581(Filter6581),
    /// CSG 8580 filter.
    Mos8580(Filter8580),
}

macro_rules! dispatch {
    ($self:ident, $f:ident => $e:expr) => {
        match $self {
            Filter::Mos6581($f) => $e,
            Filter::Mos8580($f) => $e,
        }
    };
}

impl Filter {
    /// Create a filter for the given chip model.
    pub fn new(chip_model: ChipModel) -> Self {
        match chip_model {
            ChipModel::Mos6581 => Filter::Mos6581(Filter6581::new()),
            ChipModel::Mos8580 => Filter::Mos8580(Filter8580::new()),
        }
    }

    /// Chip model of this filter.
    pub fn chip_model(&self) -> ChipModel {
        match self {
            Filter::Mos6581(_) => ChipModel::Mos6581,
            Filter::Mos8580(_) => ChipModel::Mos8580,
        }
    }

    /// Switch chip model, keeping register contents and the enable flag.
    /// Node voltages restart from zero.
    pub fn set_chip_model(&mut self, chip_model: ChipModel) {
        if chip_model == self.chip_model() {
            return;
        }
        let regs = self.state().clone();
        let mut filter = Filter::new(chip_model);
        filter.set_enabled(regs.enabled);
        filter.set_fc_lo(regs.fc_lo());
        filter.set_fc_hi(regs.fc_hi());
        filter.set_res_filt(regs.res_filt());
        filter.set_mode_vol(regs.mode_vol());
        *self = filter;
    }

    /// Registers and node voltages.
    pub fn state(&self) -> &FilterState {
        dispatch!(self, f => f.state())
    }

    /// Clock one cycle.
    #[inline]
    pub fn clock(&mut self, voice1: f32, voice2: f32, voice3: f32) -> u16 {
        dispatch!(self, f => f.clock(voice1, voice2, voice3))
    }

    /// Set the external input sample.
    pub fn input(&mut self, sample: i16) {
        dispatch!(self, f => f.input(sample))
    }

    /// Enable or disable the filter.
    pub fn set_enabled(&mut self, enabled: bool) {
        dispatch!(self, f => f.set_enabled(enabled))
    }

    /// Set cutoff frequency low bits.
    pub fn set_fc_lo(&mut self, value: u8) {
        dispatch!(self, f => f.set_fc_lo(value))
    }

    /// Set cutoff frequency high bits.
    pub fn set_fc_hi(&mut self, value: u8) {
        dispatch!(self, f => f.set_fc_hi(value))
    }

    /// Set resonance and routing.
    pub fn set_res_filt(&mut self, value: u8) {
        dispatch!(self, f => f.set_res_filt(value))
    }

    /// Set mode and volume.
    pub fn set_mode_vol(&mut self, value: u8) {
        dispatch!(self, f => f.set_mode_vol(value))
    }

    /// Reset registers and integrators.
    pub fn reset(&mut self) {
        dispatch!(self, f => f.reset())
    }

    /// Set the 6581 filter curve. Ignored by the 8580.
    pub fn set_filter_6581_curve(&mut self, curve: f64) {
        if let Filter::Mos6581(f) = self {
            f.set_filter_curve(curve);
        }
    }

    /// Set the 6581 filter range. Ignored by the 8580.
    pub fn set_filter_6581_range(&mut self, adjustment: f64) {
        if let Filter::Mos6581(f) = self {
            f.set_filter_range(adjustment);
        }
    }

    /// Set the 8580 filter curve. Ignored by the 6581.
    pub fn set_filter_8580_curve(&mut self, curve: f64) {
        if let Filter::Mos8580(f) = self {
            f.set_filter_curve(curve);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_read_back() {
        let mut filter = Filter::new(ChipModel::Mos8580);
        filter.set_fc_lo(0xff);
        filter.set_fc_hi(0xab);
        filter.set_res_filt(0xc5);
        filter.set_mode_vol(0x9f);
        let state = filter.state();
        assert_eq!(state.fc, 0x55f);
        assert_eq!(state.fc_lo(), 0x07);
        assert_eq!(state.fc_hi(), 0xab);
        assert_eq!(state.res_filt(), 0xc5);
        assert_eq!(state.mode_vol(), 0x9f);
    }

    #[test]
    fn mixing_counts() {
        let mut filter = Filter::new(ChipModel::Mos8580);
        filter.set_res_filt(0x03);
        filter.set_mode_vol(0x10);
        assert_eq!(filter.state().n_sum, 2);
        assert_eq!(filter.state().n_mix, 3);

        // Voice 3 off only matters when voice 3 is not filtered.
        filter.set_mode_vol(0x90);
        assert_eq!(filter.state().n_mix, 2);
        filter.set_res_filt(0x07);
        assert_eq!(filter.state().n_mix, 2);
    }

    #[test]
    fn disabled_filter_bypasses_routing() {
        let mut filter = Filter::new(ChipModel::Mos6581);
        filter.set_res_filt(0x0f);
        filter.set_enabled(false);
        assert_eq!(filter.state().n_sum, 0);
        assert_eq!(filter.state().n_mix, 4);
        filter.set_enabled(true);
        assert_eq!(filter.state().n_sum, 4);
    }

    #[test]
    fn voice3_off_silences_unfiltered_voice3() {
        let mut filter = Filter::new(ChipModel::Mos8580);
        filter.set_mode_vol(0x8f);
        let a = filter.clock(0.0, 0.0, 0.9);
        let b = filter.clock(0.0, 0.0, -0.9);
        assert_eq!(a, b);

        filter.set_mode_vol(0x0f);
        let a = filter.clock(0.0, 0.0, 0.9);
        let b = filter.clock(0.0, 0.0, -0.9);
        assert_ne!(a, b);
    }

    #[test]
    fn model_switch_keeps_registers() {
        let mut filter = Filter::new(ChipModel::Mos6581);
        filter.set_fc_hi(0x40);
        filter.set_res_filt(0xf1);
        filter.set_mode_vol(0x1f);
        filter.set_chip_model(ChipModel::Mos8580);
        assert_eq!(filter.chip_model(), ChipModel::Mos8580);
        assert_eq!(filter.state().fc_hi(), 0x40);
        assert_eq!(filter.state().res_filt(), 0xf1);
        assert_eq!(filter.state().mode_vol(), 0x1f);
    }

    #[test]
    fn reset_clears_voltages() {
        let mut filter = Filter::new(ChipModel::Mos8580);
        filter.set_fc_hi(0xff);
        filter.set_res_filt(0xff);
        filter.set_mode_vol(0xff);
        for _ in 0..100 {
            filter.clock(0.5, 0.5, 0.5);
        }
        filter.reset();
        let state = filter.state();
        assert_eq!((state.fc, state.res, state.filt), (0, 0, 0));
        assert_eq!((state.vhp, state.vbp, state.vlp), (0, 0, 0));
        assert!(state.enabled);
    }

    #[test]
    fn volume_zero_is_constant() {
        for model in [ChipModel::Mos6581, ChipModel::Mos8580] {
            let mut filter = Filter::new(model);
            let a = filter.clock(0.9, 0.9, 0.9);
            let b = filter.clock(-0.3, -0.3, -0.3);
            assert_eq!(a, b, "{model:?}");
        }
    }
}
