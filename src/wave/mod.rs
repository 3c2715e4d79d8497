// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![allow(clippy::cast_lossless)]

mod calculator;

use std::sync::Arc;

use bit_field::BitField;

pub use self::calculator::{
    calculate_pulldown, CombinedWaveformConfig, WaveformTables, TABLE_SIZE,
};
use super::ChipModel;
use crate::cache;
use crate::CombinedWaveforms;

/// Cycles the waveform output keeps its last value after the waveform
/// register is cleared, before the floating DAC input starts to fade.
pub const FLOATING_OUTPUT_TTL: u32 = 0xF4240;

/// Cycles between successive fade steps of the floating DAC input.
const FLOATING_OUTPUT_FADE_6581: u32 = 1400;
const FLOATING_OUTPUT_FADE_8580: u32 = 50000;

/// Cycles of held test bit after which the noise LFSR is reset.
pub const SHIFT_REGISTER_RESET: u32 = 0x8000;

const ACC_MASK: u32 = 0x00ff_ffff;
const ACC_MSB: u32 = 0x0080_0000;
const ACC_BIT19: u32 = 0x0008_0000;
const SHIFT_MASK: u32 = 0x007f_ffff;

/// Bits of the LFSR that drive the noise output.
const NOISE_TAPS: u32 = (1 << 2) | (1 << 4) | (1 << 8) | (1 << 11) | (1 << 13) | (1 << 17) | (1 << 20) | (1 << 22);

/// A voice paired with the voice it hard-syncs and the voice that syncs and
/// ring-modulates it. Voice N is synced and ring-modulated by voice N-1.
pub struct Syncable<T> {
    /// The voice being processed.
    pub main: T,
    /// Voice N+1, synced by `main`.
    pub sync_dest: T,
    /// Voice N-1, syncing and ring-modulating `main`.
    pub sync_source: T,
}

/// SID waveform generator.
///
/// A 24 bit phase accumulator is the basis for waveform generation. The
/// accumulator is incremented by the 16 bit frequency register each cycle.
/// The upper 12 bits index the waveform tables; noise comes from a 23 bit
/// LFSR clocked by accumulator bit 19 through a two cycle pipeline.
#[derive(Clone)]
pub struct WaveformGenerator {
    // Configuration
    chip_model: ChipModel,
    tables: Arc<WaveformTables>,
    // Control registers
    frequency: u16,
    pulse_width: u16,
    control: u8,
    waveform: u8,
    test: bool,
    sync: bool,
    ring_msb_mask: u32,
    // Table selection
    wave_index: usize,
    pulldown_index: Option<usize>,
    no_noise: u16,
    no_pulse: u16,
    // Runtime State
    /// Phase accumulator (24 bit).
    pub acc: u32,
    /// Noise LFSR (23 bit).
    pub shift: u32,
    msb_rising: bool,
    shift_pipeline: u8,
    shift_register_reset: u32,
    noise_output: u16,
    no_noise_or_noise_output: u16,
    pulse_output: u16,
    waveform_output: u16,
    osc3: u16,
    tri_saw_pipeline: u16,
    floating_output_ttl: u32,
}

impl WaveformGenerator {
    /// Generator using the shared average-strength tables of the given chip.
    pub fn new(chip_model: ChipModel) -> Self {
        let tables = cache::waveform_tables(chip_model, CombinedWaveforms::Average);
        Self::with_tables(chip_model, tables)
    }

    /// Generator using explicit waveform tables.
    pub fn with_tables(chip_model: ChipModel, tables: Arc<WaveformTables>) -> Self {
        let mut wave = WaveformGenerator {
            chip_model,
            tables,
            frequency: 0,
            pulse_width: 0,
            control: 0,
            waveform: 0,
            test: false,
            sync: false,
            ring_msb_mask: 0,
            wave_index: 0,
            pulldown_index: None,
            no_noise: 0xfff,
            no_pulse: 0xfff,
            acc: 0,
            shift: SHIFT_MASK,
            msb_rising: false,
            shift_pipeline: 0,
            shift_register_reset: 0,
            noise_output: 0,
            no_noise_or_noise_output: 0xfff,
            pulse_output: 0xfff,
            waveform_output: 0,
            osc3: 0,
            tri_saw_pipeline: 0x555,
            floating_output_ttl: 0,
        };
        wave.reset();
        wave
    }

    /// Switch chip model and table set, keeping register state.
    pub fn set_chip_model(&mut self, chip_model: ChipModel, tables: Arc<WaveformTables>) {
        self.chip_model = chip_model;
        self.tables = tables;
    }

    /// Swap the table set (e.g. for a different combined waveform strength).
    pub fn set_tables(&mut self, tables: Arc<WaveformTables>) {
        self.tables = tables;
    }

    // -- Getters

    /// Current accumulator value.
    pub const fn get_acc(&self) -> u32 {
        self.acc
    }

    /// Control register bits owned by the waveform generator.
    pub const fn get_control(&self) -> u8 {
        self.control & 0xfe
    }

    /// Frequency high byte.
    pub const fn get_frequency_hi(&self) -> u8 {
        (self.frequency >> 8) as u8
    }

    /// Frequency low byte.
    pub const fn get_frequency_lo(&self) -> u8 {
        (self.frequency & 0x00ff) as u8
    }

    /// Pulse width high nibble.
    pub const fn get_pulse_width_hi(&self) -> u8 {
        (self.pulse_width >> 8) as u8
    }

    /// Pulse width low byte.
    pub const fn get_pulse_width_lo(&self) -> u8 {
        (self.pulse_width & 0x00ff) as u8
    }

    /// Current noise LFSR.
    pub const fn get_shift(&self) -> u32 {
        self.shift
    }

    /// Sync bit.
    pub const fn get_sync(&self) -> bool {
        self.sync
    }

    /// Test bit.
    pub const fn get_test(&self) -> bool {
        self.test
    }

    /// Waveform select nibble.
    pub const fn get_waveform(&self) -> u8 {
        self.waveform
    }

    /// True on the cycle the accumulator MSB went from 0 to 1.
    pub const fn is_msb_rising(&self) -> bool {
        self.msb_rising
    }

    // -- Setters

    /// Set the accumulator directly.
    pub fn set_acc(&mut self, value: u32) {
        self.acc = value & ACC_MASK;
    }

    /// Set the noise shift register directly and refresh the noise output.
    pub fn set_shift(&mut self, value: u32) {
        self.shift = value & SHIFT_MASK;
        self.set_noise_output();
    }

    /// Write control register.
    pub fn set_control(&mut self, value: u8) {
        let waveform_prev = self.waveform;
        let test_prev = self.test;

        self.control = value;
        self.waveform = (value >> 4) & 0x0f;
        self.test = value.get_bit(3);
        self.sync = value.get_bit(1);

        // Substitution of accumulator MSB when sawtooth = 0, ring_mod = 1.
        let ring = value.get_bit(2) && !value.get_bit(5);
        self.ring_msb_mask = if ring { ACC_MSB } else { 0 };

        if self.waveform != waveform_prev {
            self.wave_index = (self.waveform & 0x3) as usize;
            self.pulldown_index = match self.waveform & 0x7 {
                w @ (3 | 5 | 6 | 7) => Some(w as usize),
                _ => None,
            };
            // no_noise and no_pulse are bitmasks letting noise or pulse
            // influence the output only when selected.
            self.no_noise = if self.waveform & 0x8 != 0 { 0x000 } else { 0xfff };
            self.no_noise_or_noise_output = self.no_noise | self.noise_output;
            self.no_pulse = if self.waveform & 0x4 != 0 { 0x000 } else { 0xfff };

            if self.waveform == 0 {
                // Change to floating DAC input.
                self.floating_output_ttl = FLOATING_OUTPUT_TTL;
            }
        }

        if self.test != test_prev {
            if self.test {
                self.acc = 0;
                self.shift_pipeline = 0;
                self.shift_register_reset = SHIFT_REGISTER_RESET;
            } else {
                // The falling test bit completes the second phase of the
                // shift: bit0 = (bit22 | test) ^ bit17 = ~bit17
                let bit0 = (!self.shift << 17) & (1 << 22);
                self.shift = (self.shift >> 1) | bit0;
                self.set_noise_output();
            }
        }
    }

    /// Write frequency high byte.
    pub fn set_frequency_hi(&mut self, value: u8) {
        self.frequency = ((value as u16) << 8) | (self.frequency & 0x00ff);
    }

    /// Write frequency low byte.
    pub fn set_frequency_lo(&mut self, value: u8) {
        self.frequency = (self.frequency & 0xff00) | value as u16;
    }

    /// Write pulse width high nibble.
    pub fn set_pulse_width_hi(&mut self, value: u8) {
        self.pulse_width = (((value as u16) << 8) & 0x0f00) | (self.pulse_width & 0x00ff);
    }

    /// Write pulse width low byte.
    pub fn set_pulse_width_lo(&mut self, value: u8) {
        self.pulse_width = (self.pulse_width & 0x0f00) | value as u16;
    }

    // -- Clocking

    /// Advance the oscillator by one cycle.
    #[inline]
    pub fn clock(&mut self) {
        if self.test {
            if self.shift_register_reset != 0 {
                self.shift_register_reset -= 1;
                if self.shift_register_reset == 0 {
                    self.reset_shift_register();
                }
            }
            // The test bit sets pulse high.
            self.pulse_output = 0xfff;
        } else {
            let acc_prev = self.acc;
            self.acc = (self.acc + self.frequency as u32) & ACC_MASK;
            let bits_set = !acc_prev & self.acc;
            self.msb_rising = bits_set & ACC_MSB != 0;

            // Shift noise register once for each time accumulator bit 19 is
            // set high. The shift is delayed 2 cycles.
            if bits_set & ACC_BIT19 != 0 {
                self.shift_pipeline = 2;
            } else if self.shift_pipeline != 0 {
                self.shift_pipeline -= 1;
                if self.shift_pipeline == 0 {
                    self.clock_shift_register();
                }
            }
        }
    }

    /// Hard sync `dest` if this oscillator's MSB rose this cycle.
    ///
    /// When the sync source of this oscillator also raised its MSB on the
    /// same cycle while this oscillator is synced by it, the destination is
    /// left alone.
    #[inline]
    pub fn synchronize(&self, dest: &mut WaveformGenerator, source: &WaveformGenerator) {
        if self.msb_rising && dest.sync && !(self.sync && source.msb_rising) {
            dest.acc = 0;
        }
    }

    /// Compute the 12-bit digital output for this cycle.
    ///
    /// Must be called once per cycle after `clock`: it also drives the pulse
    /// comparator, the floating DAC fade and the combined waveform feedback
    /// into the noise register.
    #[inline]
    pub fn output(&mut self, ring_source: Option<&WaveformGenerator>) -> u16 {
        if self.waveform != 0 {
            let ring_acc = ring_source.map_or(ACC_MASK, |source| source.acc);
            let ix = ((self.acc ^ (!ring_acc & self.ring_msb_mask)) >> 12) as usize;
            let raw = self.tables.wave[self.wave_index][ix];
            let mask = (self.no_pulse | self.pulse_output) & self.no_noise_or_noise_output;
            let mut value = raw & mask;
            if let Some(pulldown) = self.pulldown_index {
                value = self.tables.pulldown[pulldown][value as usize];
            }
            self.waveform_output = value;

            // Triangle/sawtooth output is delayed half a cycle on the 8580,
            // which shows up as a one cycle delay on OSC3.
            if self.waveform & 0x3 != 0 && self.chip_model == ChipModel::Mos8580 {
                let mut delayed = self.tri_saw_pipeline & mask;
                if let Some(pulldown) = self.pulldown_index {
                    delayed = self.tables.pulldown[pulldown][delayed as usize];
                }
                self.osc3 = delayed;
                self.tri_saw_pipeline = raw;
            } else {
                self.osc3 = self.waveform_output;
            }

            // In the 6581 combined waveforms with sawtooth can drive the top
            // accumulator bit low.
            if self.chip_model == ChipModel::Mos6581
                && self.waveform & 0x2 != 0
                && self.waveform & 0xd != 0
                && self.waveform_output & 0x800 == 0
            {
                self.acc &= 0x7f_ffff;
            }

            // Combined waveforms write back into the shift register.
            if self.waveform > 0x8 && !self.test && self.shift_pipeline != 1 {
                self.write_shift_register();
            }
        } else if self.floating_output_ttl != 0 {
            self.floating_output_ttl -= 1;
            if self.floating_output_ttl == 0 {
                self.wave_bitfade();
            }
        }

        // The pulse level is updated after the output is computed, giving
        // the one cycle comparator delay.
        self.pulse_output = if (self.acc >> 12) as u16 >= self.pulse_width {
            0xfff
        } else {
            0x000
        };

        self.waveform_output
    }

    /// Last computed 12-bit output.
    pub const fn last_output(&self) -> u16 {
        self.waveform_output
    }

    /// OSC3 register readback.
    pub const fn read_osc(&self) -> u8 {
        (self.osc3 >> 4) as u8
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        self.acc = 0;
        self.frequency = 0;
        self.pulse_width = 0;
        self.control = 0;
        self.msb_rising = false;
        self.waveform = 0;
        self.test = false;
        self.sync = false;
        self.wave_index = 0;
        self.pulldown_index = None;
        self.ring_msb_mask = 0;
        self.no_noise = 0xfff;
        self.no_pulse = 0xfff;
        self.pulse_output = 0xfff;
        self.reset_shift_register();
        self.shift_pipeline = 0;
        self.waveform_output = 0;
        self.osc3 = 0;
        self.tri_saw_pipeline = 0x555;
        self.floating_output_ttl = 0;
    }

    // -- Noise

    #[inline]
    fn clock_shift_register(&mut self) {
        // bit0 = (bit22 | test) ^ bit17
        let bit0 = ((self.shift << 22) ^ (self.shift << 17)) & (1 << 22);
        self.shift = (self.shift >> 1) | bit0;
        self.set_noise_output();
    }

    fn reset_shift_register(&mut self) {
        self.shift = SHIFT_MASK;
        self.shift_register_reset = 0;
        self.set_noise_output();
    }

    #[inline]
    fn set_noise_output(&mut self) {
        let sr = self.shift;
        self.noise_output = (((sr & (1 << 2)) << 9)
            | ((sr & (1 << 4)) << 6)
            | ((sr & (1 << 8)) << 1)
            | ((sr & (1 << 11)) >> 3)
            | ((sr & (1 << 13)) >> 6)
            | ((sr & (1 << 17)) >> 11)
            | ((sr & (1 << 20)) >> 15)
            | ((sr & (1 << 22)) >> 18)) as u16;
        self.no_noise_or_noise_output = self.no_noise | self.noise_output;
    }

    /// Combined waveforms pull LFSR bits low through the noise output taps.
    /// A bit once cleared stays cleared.
    #[inline]
    fn write_shift_register(&mut self) {
        let wo = self.waveform_output as u32;
        self.shift &= !NOISE_TAPS
            | ((wo & (1 << 11)) >> 9)
            | ((wo & (1 << 10)) >> 6)
            | ((wo & (1 << 9)) >> 1)
            | ((wo & (1 << 8)) << 3)
            | ((wo & (1 << 7)) << 6)
            | ((wo & (1 << 6)) << 11)
            | ((wo & (1 << 5)) << 15)
            | ((wo & (1 << 4)) << 18);
        self.noise_output &= self.waveform_output;
        self.no_noise_or_noise_output = self.no_noise | self.noise_output;
    }

    fn wave_bitfade(&mut self) {
        self.waveform_output &= self.waveform_output >> 1;
        self.osc3 = self.waveform_output;
        if self.waveform_output != 0 {
            self.floating_output_ttl = match self.chip_model {
                ChipModel::Mos6581 => FLOATING_OUTPUT_FADE_6581,
                ChipModel::Mos8580 => FLOATING_OUTPUT_FADE_8580,
            };
        }
    }
}

impl Syncable<&'_ mut WaveformGenerator> {
    /// Apply hard sync from `main` to its destination.
    #[inline]
    pub fn synchronize(&mut self) {
        self.main.synchronize(self.sync_dest, self.sync_source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(gen: &mut WaveformGenerator) -> u16 {
        gen.clock();
        gen.output(None)
    }

    #[test]
    fn noise_taps_map_to_top_byte() {
        let mut gen = WaveformGenerator::new(ChipModel::Mos8580);
        gen.shift = 1 << 22;
        gen.set_noise_output();
        assert_eq!(gen.noise_output, 1 << 4);
        gen.shift = 1 << 2;
        gen.set_noise_output();
        assert_eq!(gen.noise_output, 1 << 11);
    }

    #[test]
    fn set_shift_masks_and_refreshes_noise() {
        let mut gen = WaveformGenerator::new(ChipModel::Mos8580);
        gen.set_control(0x80);
        gen.set_shift(0xffff_ffff);
        assert_eq!(gen.shift, SHIFT_MASK);
        assert_eq!(gen.noise_output, 0xff0);
        assert_eq!(gen.no_noise_or_noise_output, 0xff0);
        gen.set_shift(0);
        assert_eq!(gen.noise_output, 0);
    }

    #[test]
    fn write_back_inverts_noise_taps() {
        let mut gen = WaveformGenerator::new(ChipModel::Mos8580);
        gen.shift = SHIFT_MASK;
        gen.set_noise_output();
        let full = gen.noise_output;
        assert_eq!(full, 0xff0);
        // Clearing one output bit clears exactly its tap.
        gen.waveform_output = full & !(1 << 9);
        gen.write_shift_register();
        assert_eq!(gen.shift, SHIFT_MASK & !(1 << 8));
        gen.set_noise_output();
        assert_eq!(gen.noise_output, full & !(1 << 9));
    }

    #[test]
    fn pulse_compare_is_delayed_one_cycle() {
        let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
        gen.set_pulse_width_hi(0x08);
        gen.set_frequency_hi(0x80);
        gen.set_control(0x40);
        // First cycle still uses the reset pulse level.
        assert_eq!(step(&mut gen), 0xfff);
        assert_eq!(step(&mut gen), 0x000);
    }

    #[test]
    fn osc3_delayed_on_8580_only() {
        let mut gen_8580 = WaveformGenerator::new(ChipModel::Mos8580);
        let mut gen_6581 = WaveformGenerator::new(ChipModel::Mos6581);
        for gen in [&mut gen_8580, &mut gen_6581] {
            gen.set_frequency_hi(0x10);
            gen.set_control(0x20);
            step(gen);
        }
        let prev_8580 = gen_8580.last_output();
        step(&mut gen_8580);
        step(&mut gen_6581);
        assert_eq!(gen_8580.read_osc(), (prev_8580 >> 4) as u8);
        assert_eq!(gen_6581.read_osc(), (gen_6581.last_output() >> 4) as u8);
    }
}
