// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use super::cache;
use super::external_filter::ExternalFilter;
use super::filter::Filter;
use super::sampler::soft_clip;
use super::voice::Voice;
use super::wave::Syncable;
use super::{ChipModel, CombinedWaveforms};

/// Register offsets of one voice.
const VOICE_REGS: u8 = 7;

/// Three voices, the filter and the C64 output stage clocked in lockstep.
#[derive(Clone)]
pub struct Synth {
    // Functional Units
    /// SID voices 1-3.
    pub voices: [Voice; 3],
    /// Internal multimode filter.
    pub filter: Filter,
    /// C64 audio output stage.
    pub ext_filter: ExternalFilter,
    // Configuration
    chip_model: ChipModel,
    combined_waveforms: CombinedWaveforms,
    // Runtime State
    output: i32,
}

impl Synth {
    /// Create a synth for the given chip model with average combined
    /// waveforms.
    pub fn new(chip_model: ChipModel) -> Self {
        Synth {
            voices: [
                Voice::new(chip_model),
                Voice::new(chip_model),
                Voice::new(chip_model),
            ],
            filter: Filter::new(chip_model),
            ext_filter: ExternalFilter::new(),
            chip_model,
            combined_waveforms: CombinedWaveforms::Average,
            output: 0,
        }
    }

    /// Emulated chip model.
    pub fn chip_model(&self) -> ChipModel {
        self.chip_model
    }

    /// Swap DACs, waveform tables and filter to another chip model. Register
    /// contents are kept.
    pub fn set_chip_model(&mut self, chip_model: ChipModel) {
        self.chip_model = chip_model;
        let tables = cache::waveform_tables(chip_model, self.combined_waveforms);
        for voice in &mut self.voices {
            voice.set_chip_model(chip_model, tables.clone());
        }
        self.filter.set_chip_model(chip_model);
    }

    /// Strength of the combined waveform pulldown.
    pub fn combined_waveforms(&self) -> CombinedWaveforms {
        self.combined_waveforms
    }

    /// Select the combined waveform tables.
    pub fn set_combined_waveforms(&mut self, strength: CombinedWaveforms) {
        self.combined_waveforms = strength;
        let tables = cache::waveform_tables(self.chip_model, strength);
        for voice in &mut self.voices {
            voice.wave.set_tables(tables.clone());
        }
    }

    /// Voice `index` with the voice it syncs and the voice syncing it.
    pub fn syncable_voice_mut(&mut self, index: usize) -> Syncable<&mut Voice> {
        let [v1, v2, v3] = &mut self.voices;
        match index {
            0 => Syncable {
                main: v1,
                sync_dest: v2,
                sync_source: v3,
            },
            1 => Syncable {
                main: v2,
                sync_dest: v3,
                sync_source: v1,
            },
            _ => Syncable {
                main: v3,
                sync_dest: v1,
                sync_source: v2,
            },
        }
    }

    /// Advance one cycle.
    #[inline]
    pub fn clock(&mut self) {
        for voice in &mut self.voices {
            voice.envelope.clock();
        }
        for voice in &mut self.voices {
            voice.wave.clock();
        }
        for i in 0..3 {
            self.syncable_voice_mut(i).wave().synchronize();
        }
        // Voice N is ring modulated by voice N-1.
        let [v1, v2, v3] = &mut self.voices;
        let o1 = v1.output(Some(&v3.wave));
        let o2 = v2.output(Some(&v1.wave));
        let o3 = v3.output(Some(&v2.wave));
        let vo = self.filter.clock(o1, o2, o3);
        self.output = self.ext_filter.clock(vo);
    }

    /// Advance `delta` cycles.
    ///
    /// The filter integrators are stable only at single cycle steps, so every
    /// cycle is clocked.
    #[inline]
    pub fn clock_delta(&mut self, delta: u32) {
        for _ in 0..delta {
            self.clock();
        }
    }

    /// Current output sample.
    #[inline]
    pub fn output(&self) -> i16 {
        soft_clip(self.output)
    }

    /// Set the external audio input.
    pub fn input(&mut self, sample: i16) {
        self.filter.input(sample);
    }

    /// Read a register; write-only registers return `bus_value`.
    pub fn read(&self, reg: u8, bus_value: u8) -> u8 {
        match reg {
            // No paddles attached.
            0x19 | 0x1a => 0xff,
            0x1b => self.voices[2].wave.read_osc(),
            0x1c => self.voices[2].envelope.read_env(),
            _ => bus_value,
        }
    }

    /// Write a register.
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            0x00..=0x14 => {
                let voice = &mut self.voices[(reg / VOICE_REGS) as usize];
                match reg % VOICE_REGS {
                    0x00 => voice.wave.set_frequency_lo(value),
                    0x01 => voice.wave.set_frequency_hi(value),
                    0x02 => voice.wave.set_pulse_width_lo(value),
                    0x03 => voice.wave.set_pulse_width_hi(value),
                    0x04 => voice.set_control(value),
                    0x05 => voice.envelope.set_attack_decay(value),
                    _ => voice.envelope.set_sustain_release(value),
                }
            }
            0x15 => self.filter.set_fc_lo(value),
            0x16 => self.filter.set_fc_hi(value),
            0x17 => self.filter.set_res_filt(value),
            0x18 => self.filter.set_mode_vol(value),
            _ => {}
        }
    }

    /// Reset voices and filters.
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        self.filter.reset();
        self.ext_filter.reset();
        self.output = 0;
    }
}
