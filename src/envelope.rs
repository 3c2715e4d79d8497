// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![allow(clippy::cast_lossless)]

use bit_field::BitField;

const LFSR_RESET: u16 = 0x7fff;

// The rate counter is a 15 bit LFSR clocked every cycle. When it reaches
// the comparison value selected by the current ADSR nibble the envelope
// counter is stepped and the LFSR is reloaded with all ones. The values
// below are the LFSR states reached after 8, 31, 62, ... shifts, giving
// rate periods of 9, 32, 63, 95, 149, 220, 267, 313, 392, 977, 1954, 3126,
// 3907, 11720, 19532 and 31251 cycles.
//
// Since the LFSR is never reset on a rate change, lowering the rate below
// the current LFSR position makes it run through its full 32767 state cycle
// before the next match. This is the ADSR delay bug.
const ADSR_TABLE: [u16; 16] = [
    0x7F00, 0x0006, 0x003C, 0x0330, 0x20C0, 0x6755, 0x3800, 0x500E, 0x1212, 0x0222, 0x1848,
    0x59B8, 0x3840, 0x77E2, 0x7625, 0x0A93,
];

/// Envelope generator state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Attack phase ramping up toward 0xff.
    Attack,
    /// Decay toward sustain, then hold.
    DecaySustain,
    /// Release toward zero after gate off.
    Release,
}

/// SID ADSR envelope generator.
///
/// A 15 bit LFSR divides the clock to the envelope counter by the currently
/// selected rate. Another counter implements exponential decay, with periods
/// 1, 2, 4, 8, 16, 30 at envelope values 255, 93, 54, 26, 14, 6
/// respectively. Decrements with a period above one are delayed a cycle
/// through a one stage pipeline.
#[derive(Clone, Copy, Debug)]
pub struct EnvelopeGenerator {
    // Configuration
    attack: u8,
    decay: u8,
    sustain: u8,
    release: u8,
    // Control
    gate: bool,
    // Runtime State
    /// Current ADSR phase.
    pub state: State,
    /// Current envelope output level (0-255).
    pub envelope_counter: u8,
    /// Exponential step counter.
    pub exponential_counter: u8,
    /// Exponential counter period.
    pub exponential_counter_period: u8,
    /// Counter frozen at zero until the next attack.
    pub hold_zero: bool,
    /// Decrement scheduled for the next cycle.
    pub envelope_pipeline: bool,
    /// Rate LFSR.
    pub lfsr: u16,
    /// LFSR comparison value of the current rate.
    pub rate: u16,
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        let mut envelope = Self {
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            gate: false,
            state: State::Release,
            envelope_counter: 0,
            exponential_counter: 0,
            exponential_counter_period: 1,
            hold_zero: true,
            envelope_pipeline: false,
            lfsr: LFSR_RESET,
            rate: 0,
        };
        envelope.reset();
        envelope
    }
}

impl EnvelopeGenerator {
    /// Packed attack/decay nibble register.
    pub const fn get_attack_decay(&self) -> u8 {
        self.attack << 4 | self.decay
    }

    /// Control register exposing gate bit.
    pub fn get_control(&self) -> u8 {
        let mut value = 0u8;
        value.set_bit(0, self.gate);
        value
    }

    /// Packed sustain/release nibble register.
    pub const fn get_sustain_release(&self) -> u8 {
        self.sustain << 4 | self.release
    }

    /// Write attack/decay register.
    pub const fn set_attack_decay(&mut self, value: u8) {
        self.attack = (value >> 4) & 0x0f;
        self.decay = value & 0x0f;
        match self.state {
            State::Attack => self.rate = ADSR_TABLE[self.attack as usize],
            State::DecaySustain => self.rate = ADSR_TABLE[self.decay as usize],
            State::Release => {}
        }
    }

    /// Write control register (gate).
    pub fn set_control(&mut self, value: u8) {
        let gate = value.get_bit(0);
        if !self.gate && gate {
            // Gate bit on: Start attack, decay, sustain.
            self.state = State::Attack;
            self.rate = ADSR_TABLE[self.attack as usize];
            // Switching to attack state unlocks the zero freeze and aborts
            // any pipelined decrement.
            self.hold_zero = false;
            self.envelope_pipeline = false;
        } else if self.gate && !gate {
            // Gate bit off: Start release.
            self.state = State::Release;
            self.rate = ADSR_TABLE[self.release as usize];
        }
        self.gate = gate;
    }

    /// Write sustain/release register.
    pub const fn set_sustain_release(&mut self, value: u8) {
        self.sustain = (value >> 4) & 0x0f;
        self.release = value & 0x0f;
        if let State::Release = self.state {
            self.rate = ADSR_TABLE[self.release as usize];
        }
    }

    /// Update exponential counter period based on envelope counter value.
    /// Period increases as counter decreases, modeling RC discharge curve.
    #[inline]
    const fn set_exponential_counter(&mut self) {
        match self.envelope_counter {
            0xff => self.exponential_counter_period = 1,
            0x5d => self.exponential_counter_period = 2,
            0x36 => self.exponential_counter_period = 4,
            0x1a => self.exponential_counter_period = 8,
            0x0e => self.exponential_counter_period = 16,
            0x06 => self.exponential_counter_period = 30,
            0x00 => {
                self.exponential_counter_period = 1;
                // Counter frozen at zero until gate cycles off→on.
                self.hold_zero = true;
            }
            _ => {}
        }
    }

    /// Decrement now, or schedule it for the next cycle when the
    /// exponential period is above one. Returns true if decremented.
    #[inline]
    const fn decrement(&mut self) -> bool {
        if self.exponential_counter_period != 1 {
            self.envelope_pipeline = true;
            return false;
        }
        self.envelope_counter = self.envelope_counter.wrapping_sub(1);
        true
    }

    #[inline]
    /// Clock the envelope generator by one SID cycle.
    pub fn clock(&mut self) {
        if self.envelope_pipeline {
            self.envelope_counter = self.envelope_counter.wrapping_sub(1);
            self.envelope_pipeline = false;
            self.set_exponential_counter();
        }

        if self.lfsr != self.rate {
            let feedback = ((self.lfsr >> 14) ^ (self.lfsr >> 13)) & 0x01;
            self.lfsr = ((self.lfsr << 1) & 0x7fff) | feedback;
            return;
        }
        self.lfsr = LFSR_RESET;

        // The first envelope step in the attack state also resets the
        // exponential counter.
        if self.state != State::Attack {
            self.exponential_counter = self.exponential_counter.wrapping_add(1);
            if self.exponential_counter != self.exponential_counter_period {
                return;
            }
        }
        self.exponential_counter = 0;

        if self.hold_zero {
            return;
        }

        let stepped = match self.state {
            State::Attack => {
                // Counter can flip 0xff→0x00 via release→attack transition,
                // freezing at zero until another release→attack cycle.
                self.envelope_counter = self.envelope_counter.wrapping_add(1);
                if self.envelope_counter == 0xff {
                    self.state = State::DecaySustain;
                    self.rate = ADSR_TABLE[self.decay as usize];
                }
                true
            }
            State::DecaySustain => {
                self.envelope_counter != (self.sustain << 4 | self.sustain) && self.decrement()
            }
            // Counter can flip 0x00→0xff via attack→release transition,
            // then continues counting down.
            State::Release => self.decrement(),
        };
        if stepped {
            self.set_exponential_counter();
        }
    }

    #[inline]
    /// Current envelope output level (0-255).
    pub const fn output(&self) -> u8 {
        self.envelope_counter
    }

    /// Alias for `output`, used by register reads.
    pub const fn read_env(&self) -> u8 {
        self.envelope_counter
    }

    /// Reset to initial state (Release, counters zeroed).
    pub const fn reset(&mut self) {
        self.attack = 0;
        self.decay = 0;
        self.sustain = 0;
        self.release = 0;
        self.gate = false;
        self.state = State::Release;
        self.envelope_counter = 0;
        self.envelope_pipeline = false;
        self.exponential_counter = 0;
        self.exponential_counter_period = 1;
        self.hold_zero = true;
        self.lfsr = LFSR_RESET;
        self.rate = ADSR_TABLE[self.release as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_envelope() -> EnvelopeGenerator {
        let mut gen = EnvelopeGenerator::default();
        gen.reset();
        gen.envelope_counter = 0;
        gen
    }

    fn clock_n(gen: &mut EnvelopeGenerator, n: u32) {
        for _ in 0..n {
            gen.clock();
        }
    }

    /// Cycles between consecutive LFSR matches for one table entry.
    fn lfsr_period(rate: u16) -> u32 {
        let mut lfsr = LFSR_RESET;
        let mut cycles = 1;
        while lfsr != rate {
            let feedback = ((lfsr >> 14) ^ (lfsr >> 13)) & 0x01;
            lfsr = ((lfsr << 1) & 0x7fff) | feedback;
            cycles += 1;
        }
        cycles
    }

    #[test]
    fn table_matches_documented_periods() {
        let periods: Vec<u32> = ADSR_TABLE.iter().map(|&r| lfsr_period(r)).collect();
        assert_eq!(
            periods,
            vec![9, 32, 63, 95, 149, 220, 267, 313, 392, 977, 1954, 3126, 3907, 11720, 19532, 31251]
        );
    }

    /// ADSR delay bug: lowering attack rate mid-envelope causes the LFSR to
    /// run through its whole cycle before the next step occurs.
    #[test]
    fn adsr_delay_bug() {
        let mut gen = new_envelope();
        gen.set_attack_decay(0x70);
        gen.set_control(0x01);
        clock_n(&mut gen, 200);

        assert_eq!(gen.read_env(), 0);

        gen.set_attack_decay(0x20);
        clock_n(&mut gen, 200);

        assert_eq!(gen.read_env(), 0, "ADSR delay bug: LFSR must wrap");
    }

    /// Counter wraps 0xff->0x00 via release->attack transition, then freezes.
    #[test]
    fn flip_ff_to_00() {
        let mut gen = new_envelope();
        gen.set_attack_decay(0x77);
        gen.set_sustain_release(0x77);
        gen.set_control(0x01);

        while gen.read_env() != 0xff {
            gen.clock();
        }

        gen.set_control(0x00);
        clock_n(&mut gen, 3);
        gen.set_control(0x01);
        clock_n(&mut gen, 315);

        assert_eq!(gen.read_env(), 0, "Counter should wrap 0xff->0x00 and freeze");
        assert!(gen.hold_zero);
    }

    /// Counter wraps 0x00->0xff via attack->release transition.
    #[test]
    fn flip_00_to_ff() {
        let mut gen = new_envelope();
        gen.hold_zero = true;
        gen.set_attack_decay(0x77);
        gen.set_sustain_release(0x77);
        gen.clock();

        assert_eq!(gen.read_env(), 0);

        gen.set_control(0x01);
        clock_n(&mut gen, 3);
        gen.set_control(0x00);
        clock_n(&mut gen, 315);

        assert_eq!(gen.read_env(), 0xff, "Counter should wrap 0x00->0xff");
    }

    #[test]
    fn decay_stops_at_sustain_level() {
        let mut gen = new_envelope();
        gen.set_attack_decay(0x00);
        gen.set_sustain_release(0xa0);
        gen.set_control(0x01);
        clock_n(&mut gen, 100_000);
        assert_eq!(gen.state, State::DecaySustain);
        assert_eq!(gen.read_env(), 0xaa);
    }

    #[test]
    fn release_decrement_is_pipelined() {
        let mut gen = new_envelope();
        gen.set_control(0x01);
        while gen.read_env() != 0xff {
            gen.clock();
        }
        gen.set_sustain_release(0x00);
        gen.set_control(0x00);
        // Release down to the first exponential period change.
        while gen.read_env() != 0x5d {
            gen.clock();
        }
        assert_eq!(gen.exponential_counter_period, 2);
        // The next decrement is delayed one cycle after the rate match.
        while !gen.envelope_pipeline {
            gen.clock();
        }
        assert_eq!(gen.read_env(), 0x5d);
        gen.clock();
        assert_eq!(gen.read_env(), 0x5c);
        assert!(!gen.envelope_pipeline);
    }

    #[test]
    fn release_ends_frozen_at_zero() {
        let mut gen = new_envelope();
        gen.set_control(0x01);
        clock_n(&mut gen, 5_000);
        gen.set_control(0x00);
        clock_n(&mut gen, 50_000);
        assert_eq!(gen.read_env(), 0);
        assert!(gen.hold_zero);
        clock_n(&mut gen, 1_000);
        assert_eq!(gen.read_env(), 0);
    }
}
