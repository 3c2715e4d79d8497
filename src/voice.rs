// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![allow(clippy::cast_lossless)]

use std::sync::Arc;

use super::cache;
use super::dac::build_dac_table;
use super::envelope::EnvelopeGenerator;
use super::wave::{Syncable, WaveformGenerator, WaveformTables};
use super::ChipModel;

/// Waveform DAC code that produces no output.
///
/// The waveform output range is 0x000 to 0xfff, so the "zero" level should
/// ideally have been 0x800. In the measured 6581 the waveform output "zero"
/// level was found to be 0x380 (i.e. $d41b = 0x38) at 5.94V. The 8580 has
/// no such offset.
const fn wave_zero(chip_model: ChipModel) -> usize {
    match chip_model {
        ChipModel::Mos6581 => 0x380,
        ChipModel::Mos8580 => 0x800,
    }
}

/// Analog levels of the waveform and envelope DACs of one chip model.
pub struct VoiceDac {
    /// 12-bit waveform DAC, offset so that the chip's zero level is 0.0.
    pub wave: Box<[f32]>,
    /// 8-bit envelope DAC, 0.0 to 1.0.
    pub envelope: Box<[f32]>,
}

impl VoiceDac {
    /// Build the DAC tables for a chip model.
    pub fn new(chip_model: ChipModel) -> Self {
        let mut wave = build_dac_table(12, chip_model);
        let offset = wave[wave_zero(chip_model)];
        for level in &mut wave {
            *level -= offset;
        }
        VoiceDac {
            wave: wave.into_boxed_slice(),
            envelope: build_dac_table(8, chip_model).into_boxed_slice(),
        }
    }
}

/// A single SID voice combining waveform and envelope generators.
#[derive(Clone)]
pub struct Voice {
    // Configuration
    dac: Arc<VoiceDac>,
    // Generators
    pub(crate) envelope: EnvelopeGenerator,
    pub(crate) wave: WaveformGenerator,
}

impl Voice {
    /// Create a voice for the given chip model.
    pub fn new(chip_model: ChipModel) -> Self {
        Voice {
            dac: cache::voice_dac(chip_model),
            envelope: EnvelopeGenerator::default(),
            wave: WaveformGenerator::new(chip_model),
        }
    }

    /// Envelope generator of this voice.
    pub fn envelope(&self) -> &EnvelopeGenerator {
        &self.envelope
    }

    /// Waveform generator of this voice.
    pub fn wave(&self) -> &WaveformGenerator {
        &self.wave
    }

    /// Switch DACs and waveform tables to another chip model.
    pub fn set_chip_model(&mut self, chip_model: ChipModel, tables: Arc<WaveformTables>) {
        self.dac = cache::voice_dac(chip_model);
        self.wave.set_chip_model(chip_model, tables);
    }

    /// Update envelope and waveform control registers.
    pub fn set_control(&mut self, value: u8) {
        self.envelope.set_control(value);
        self.wave.set_control(value);
    }

    /// Amplitude modulated waveform output.
    ///
    /// The waveform and envelope values are looked up in DAC tables to
    /// emulate R-2R ladder imperfections (6581) or linear response (8580).
    /// The product is roughly in the range -0.25 to 1.0 on the 6581 and
    /// -0.5 to 0.5 on the 8580.
    #[inline]
    pub fn output(&mut self, ring_source: Option<&WaveformGenerator>) -> f32 {
        let wav = self.wave.output(ring_source) as usize;
        let env = self.envelope.output() as usize;
        self.dac.wave[wav] * self.dac.envelope[env]
    }

    /// Reset waveform and envelope state.
    pub fn reset(&mut self) {
        self.envelope.reset();
        self.wave.reset();
    }
}

impl<'a> Syncable<&'a mut Voice> {
    /// Access waveform generators for sync relationships (mutable).
    pub fn wave(self) -> Syncable<&'a mut WaveformGenerator> {
        Syncable {
            main: &mut self.main.wave,
            sync_dest: &mut self.sync_dest.wave,
            sync_source: &mut self.sync_source.wave,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_level_is_silent() {
        for model in [ChipModel::Mos6581, ChipModel::Mos8580] {
            let dac = VoiceDac::new(model);
            assert_eq!(dac.wave[wave_zero(model)], 0.0);
            assert_eq!(dac.wave.len(), 4096);
            assert_eq!(dac.envelope.len(), 256);
        }
    }

    #[test]
    fn silent_envelope_mutes_voice() {
        let mut voice = Voice::new(ChipModel::Mos8580);
        voice.wave.set_frequency_hi(0x20);
        voice.wave.set_control(0x20);
        for _ in 0..100 {
            voice.wave.clock();
            let out = voice.output(None);
            // Envelope at zero leaves only the DAC leakage.
            assert!(out.abs() < 0.01);
        }
    }

    #[test]
    fn output_follows_envelope() {
        let mut voice = Voice::new(ChipModel::Mos6581);
        voice.envelope.set_attack_decay(0x00);
        voice.envelope.set_sustain_release(0xf0);
        voice.wave.set_frequency_hi(0x10);
        voice.set_control(0x21);
        let mut peak = 0f32;
        for _ in 0..20_000 {
            voice.envelope.clock();
            voice.wave.clock();
            peak = peak.max(voice.output(None));
        }
        assert_eq!(voice.envelope.read_env(), 0xff);
        assert!(peak > 0.6, "peak {peak}");
    }
}
