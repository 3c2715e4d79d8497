// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use log::{debug, warn};

use super::envelope::State as EnvState;
use super::sampler::{self, Sampler, SamplingMethod};
use super::synth::Synth;
use super::{clock, ChipModel, CombinedWaveforms, ConfigError};

/// Default clock frequency: PAL C64 (~985 kHz)
const DEFAULT_CLOCK_FREQ: u32 = clock::PAL;
/// Default sample rate: CD quality (44.1 kHz)
const DEFAULT_SAMPLE_FREQ: u32 = 44100;

/// Cycles a written value stays on the data bus.
const fn bus_value_ttl(chip_model: ChipModel) -> u32 {
    match chip_model {
        ChipModel::Mos6581 => 0x01d00,
        ChipModel::Mos8580 => 0xa2000,
    }
}

/// Register offsets.
#[allow(missing_docs)]
pub mod reg {
    pub const FREQLO1: u8 = 0x00;
    pub const FREQHI1: u8 = 0x01;
    pub const PWLO1: u8 = 0x02;
    pub const PWHI1: u8 = 0x03;
    pub const CR1: u8 = 0x04;
    pub const AD1: u8 = 0x05;
    pub const SR1: u8 = 0x06;
    pub const FREQLO2: u8 = 0x07;
    pub const FREQHI2: u8 = 0x08;
    pub const PWLO2: u8 = 0x09;
    pub const PWHI2: u8 = 0x0a;
    pub const CR2: u8 = 0x0b;
    pub const AD2: u8 = 0x0c;
    pub const SR2: u8 = 0x0d;
    pub const FREQLO3: u8 = 0x0e;
    pub const FREQHI3: u8 = 0x0f;
    pub const PWLO3: u8 = 0x10;
    pub const PWHI3: u8 = 0x11;
    pub const CR3: u8 = 0x12;
    pub const AD3: u8 = 0x13;
    pub const SR3: u8 = 0x14;
    pub const FCLO: u8 = 0x15;
    pub const FCHI: u8 = 0x16;
    pub const RESFILT: u8 = 0x17;
    pub const MODVOL: u8 = 0x18;
    pub const POTX: u8 = 0x19;
    pub const POTY: u8 = 0x1a;
    pub const OSC3: u8 = 0x1b;
    pub const ENV3: u8 = 0x1c;
}

/// Complete SID chip state for save/restore functionality.
///
/// Contains all register values and internal state needed to exactly
/// reproduce the SID's behavior at a given point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    /// All 32 SID registers ($D400-$D41F).
    pub sid_register: [u8; 32],
    /// Last value seen on the data bus.
    pub bus_value: u8,
    /// Cycles until the bus value decays to zero.
    pub bus_value_ttl: u32,
    /// External audio input sample.
    pub ext_in: i16,
    /// Oscillator accumulators (24-bit, one per voice).
    pub accumulator: [u32; 3],
    /// Noise LFSR shift registers (23-bit, one per voice).
    pub shift_register: [u32; 3],
    /// Envelope generator states (0=Attack, 1=DecaySustain, 2=Release).
    pub envelope_state: [u8; 3],
    /// Current envelope output levels (0-255).
    pub envelope_counter: [u8; 3],
    /// Exponential counter values for envelope curve shaping.
    pub exponential_counter: [u8; 3],
    /// Exponential counter period for current envelope level.
    pub exponential_counter_period: [u8; 3],
    /// Flags indicating envelope is held at zero.
    pub hold_zero: [u8; 3],
    /// Flags indicating a decrement is pending for the next cycle.
    pub envelope_pipeline: [u8; 3],
    /// Envelope rate LFSRs.
    pub envelope_lfsr: [u16; 3],
    /// LFSR values that end the current rate period.
    pub envelope_rate: [u16; 3],
}

/// Configuration for constructing a [`Sid`].
#[derive(Clone, Debug, PartialEq)]
pub struct SidConfig {
    /// SID chip model to emulate (default: MOS 6581).
    pub chip_model: ChipModel,
    /// Audio sampling method (default: `SamplingMethod::Fast`).
    pub sampling_method: SamplingMethod,
    /// SID clock frequency in Hz (default: PAL C64 clock).
    pub clock_freq: u32,
    /// Output sample rate in Hz (default: 44.1kHz).
    pub sample_freq: u32,
    /// Combined waveform pulldown strength (default: average).
    pub combined_waveforms: CombinedWaveforms,
    /// Internal filter enabled (default: true).
    pub filter_enabled: bool,
    /// 6581 filter curve in [0, 1] (default: 0.5).
    pub filter_6581_curve: f64,
    /// 6581 filter range in [0, 1] (default: 0.5).
    pub filter_6581_range: f64,
    /// 8580 filter curve in [0, 1] (default: 0.5).
    pub filter_8580_curve: f64,
}

impl Default for SidConfig {
    fn default() -> Self {
        SidConfig {
            chip_model: ChipModel::default(),
            sampling_method: SamplingMethod::Fast,
            clock_freq: DEFAULT_CLOCK_FREQ,
            sample_freq: DEFAULT_SAMPLE_FREQ,
            combined_waveforms: CombinedWaveforms::default(),
            filter_enabled: true,
            filter_6581_curve: 0.5,
            filter_6581_range: 0.5,
            filter_8580_curve: 0.5,
        }
    }
}

/// MOS 6581/8580 SID chip emulator.
///
/// The SID (Sound Interface Device) is the sound chip used in the
/// Commodore 64. This emulator reproduces its three voices with waveform
/// generators, envelope generators, and the analog filter.
///
/// # Example
/// ```
/// use residfp::{clock, ChipModel, SamplingMethod, Sid, SidConfig};
///
/// let config = SidConfig {
///     chip_model: ChipModel::Mos8580,
///     sampling_method: SamplingMethod::Interpolate,
///     clock_freq: clock::PAL,
///     sample_freq: 48_000,
///     ..SidConfig::default()
/// };
/// let mut sid = Sid::from_config(config).unwrap();
///
/// sid.write(0x01, 0x10); // Voice 1 frequency high
/// sid.write(0x05, 0x09); // Attack/decay
/// sid.write(0x04, 0x11); // Voice 1 control: gate + triangle
/// sid.write(0x18, 0x0f); // Volume
///
/// let mut buffer = [0i16; 1024];
/// let samples = sid.clock(20_000, &mut buffer);
/// assert!(samples > 0);
/// ```
#[derive(Clone)]
pub struct Sid {
    // Functional Units
    sampler: Sampler,
    // Configuration
    config: SidConfig,
    // Runtime State
    ext_in: i16,
    bus_value: u8,
    bus_value_ttl: u32,
}

impl Sid {
    /// Construct a SID with default PAL clock, 44.1kHz sample rate, and fast sampling.
    pub fn new(chip_model: ChipModel) -> Self {
        let config = SidConfig {
            chip_model,
            ..SidConfig::default()
        };
        let mut sampler = Sampler::new(Synth::new(chip_model));
        sampler.configure(config.sampling_method, config.clock_freq, config.sample_freq);
        sampler
            .synth
            .ext_filter
            .set_clock_frequency(config.clock_freq as f64);
        Sid {
            sampler,
            config,
            ext_in: 0,
            bus_value: 0,
            bus_value_ttl: 0,
        }
    }

    /// Construct a SID from a full configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the sampling parameters are unusable.
    pub fn from_config(config: SidConfig) -> Result<Self, ConfigError> {
        sampler::validate_parameters(config.sampling_method, config.clock_freq, config.sample_freq)?;
        let mut sid = Sid::new(config.chip_model);
        sid.set_sampling_parameters(config.sampling_method, config.clock_freq, config.sample_freq)?;
        sid.set_combined_waveforms(config.combined_waveforms);
        sid.set_filter_enabled(config.filter_enabled);
        sid.set_filter_6581_curve(config.filter_6581_curve);
        sid.set_filter_6581_range(config.filter_6581_range);
        sid.set_filter_8580_curve(config.filter_8580_curve);
        Ok(sid)
    }

    /// Active configuration.
    pub fn config(&self) -> &SidConfig {
        &self.config
    }

    /// Emulated chip model.
    pub fn chip_model(&self) -> ChipModel {
        self.config.chip_model
    }

    /// Read-only view of the synthesizer.
    pub fn synth(&self) -> &Synth {
        &self.sampler.synth
    }

    /// Switch to another chip model. Registers and tuning are kept.
    pub fn set_chip_model(&mut self, chip_model: ChipModel) {
        debug!("SID chip model set to {:?}", chip_model);
        self.config.chip_model = chip_model;
        let synth = &mut self.sampler.synth;
        synth.set_chip_model(chip_model);
        synth.filter.set_enabled(self.config.filter_enabled);
        synth.filter.set_filter_6581_curve(self.config.filter_6581_curve);
        synth.filter.set_filter_6581_range(self.config.filter_6581_range);
        synth.filter.set_filter_8580_curve(self.config.filter_8580_curve);
        synth.input(self.ext_in);
        self.bus_value_ttl = self.bus_value_ttl.min(bus_value_ttl(chip_model));
    }

    /// Set sampling parameters for audio output.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the parameters are unusable; the
    /// previous configuration stays in effect.
    pub fn set_sampling_parameters(
        &mut self,
        method: SamplingMethod,
        clock_freq: u32,
        sample_freq: u32,
    ) -> Result<(), ConfigError> {
        if let Err(err) = self.sampler.set_parameters(method, clock_freq, sample_freq) {
            warn!("Rejected sampling parameters: {}", err);
            return Err(err);
        }
        // Update external filter coefficients for the new clock frequency
        self.sampler
            .synth
            .ext_filter
            .set_clock_frequency(clock_freq as f64);
        self.config.sampling_method = method;
        self.config.clock_freq = clock_freq;
        self.config.sample_freq = sample_freq;
        Ok(())
    }

    /// Select the combined waveform pulldown strength.
    pub fn set_combined_waveforms(&mut self, strength: CombinedWaveforms) {
        self.config.combined_waveforms = strength;
        self.sampler.synth.set_combined_waveforms(strength);
    }

    /// Enable or disable the internal SID filter.
    ///
    /// Disabling routes every voice around the filter. Enabled by default.
    pub fn set_filter_enabled(&mut self, enabled: bool) {
        self.config.filter_enabled = enabled;
        self.sampler.synth.filter.set_enabled(enabled);
    }

    /// Set the 6581 filter curve in [0, 1]. Higher values darken the filter.
    pub fn set_filter_6581_curve(&mut self, curve: f64) {
        self.config.filter_6581_curve = curve.clamp(0.0, 1.0);
        self.sampler.synth.filter.set_filter_6581_curve(curve);
    }

    /// Set the 6581 filter range in [0, 1].
    pub fn set_filter_6581_range(&mut self, adjustment: f64) {
        self.config.filter_6581_range = adjustment.clamp(0.0, 1.0);
        self.sampler.synth.filter.set_filter_6581_range(adjustment);
    }

    /// Set the 8580 filter curve in [0, 1]. Higher values give lower cutoff
    /// frequencies.
    pub fn set_filter_8580_curve(&mut self, curve: f64) {
        self.config.filter_8580_curve = curve.clamp(0.0, 1.0);
        self.sampler.synth.filter.set_filter_8580_curve(curve);
    }

    /// Enable or disable the external output filter (C64 audio stage).
    ///
    /// The external filter models the C64's audio output circuitry:
    /// a low-pass filter (~16kHz) followed by a DC blocking high-pass (~16Hz).
    /// Enabled by default.
    pub fn set_external_filter_enabled(&mut self, enabled: bool) {
        self.sampler.synth.ext_filter.set_enabled(enabled);
    }

    /// Feed an external audio input sample.
    pub fn input(&mut self, sample: i16) {
        self.ext_in = sample;
        self.sampler.synth.input(sample);
    }

    #[inline]
    fn age_bus_value(&mut self, cycles: u32) {
        if cycles == 0 {
            return;
        }
        self.bus_value_ttl = self.bus_value_ttl.saturating_sub(cycles);
        if self.bus_value_ttl == 0 {
            self.bus_value = 0;
        }
    }

    /// Advance `cycles` cycles, writing one sample per output period into
    /// `buffer`. Returns the number of samples written.
    ///
    /// Cycles that no longer fit the buffer are still clocked, but their
    /// samples are dropped.
    pub fn clock(&mut self, cycles: u32, buffer: &mut [i16]) -> usize {
        self.age_bus_value(cycles);
        let (written, remaining) = self.sampler.clock(cycles, buffer, 1);
        if remaining > 0 {
            warn!(
                "Output buffer full, dropping samples of {} cycles",
                remaining
            );
            self.sampler.synth.clock_delta(remaining);
        }
        written
    }

    /// Advance `cycles` cycles without producing samples.
    pub fn clock_silent(&mut self, cycles: u32) {
        self.age_bus_value(cycles);
        self.sampler.synth.clock_delta(cycles);
    }

    /// SID clocking with audio sampling.
    /// Fixpoint arithmetics is used.
    ///
    /// Returns the number of samples written and the number of cycles left
    /// unclocked once `buffer` is full. A caller draining the buffer keeps
    /// going until no cycles are left:
    /// ```
    /// # use residfp::{ChipModel, Sid};
    /// # let mut sid = Sid::new(ChipModel::Mos6581);
    /// let mut buffer = [0i16; 64];
    /// let mut delta = 20_000;
    /// while delta > 0 {
    ///     let (samples, next_delta) = sid.sample(delta, &mut buffer, 1);
    ///     assert!(samples <= buffer.len());
    ///     delta = next_delta;
    /// }
    /// ```
    pub fn sample(&mut self, delta: u32, buffer: &mut [i16], interleave: usize) -> (usize, u32) {
        let (written, remaining) = self.sampler.clock(delta, buffer, interleave);
        self.age_bus_value(delta - remaining);
        (written, remaining)
    }

    /// Current mixed audio sample (16-bit).
    pub fn output(&self) -> i16 {
        self.sampler.synth.output()
    }

    /// Reset all internal SID state. Tuning and sampling parameters are kept.
    pub fn reset(&mut self) {
        self.sampler.reset();
        self.bus_value = 0;
        self.bus_value_ttl = 0;
    }

    // -- Device I/O

    /// Read a SID register.
    ///
    /// Readable registers are latched onto the data bus. Write-only
    /// registers return the decaying bus value, shortening its lifetime.
    pub fn read(&mut self, reg: u8) -> u8 {
        let reg = reg & 0x1f;
        match reg {
            reg::POTX..=reg::ENV3 => {
                self.bus_value = self.sampler.synth.read(reg, self.bus_value);
                self.bus_value_ttl = bus_value_ttl(self.config.chip_model);
            }
            _ => self.bus_value_ttl /= 2,
        }
        self.bus_value
    }

    /// Write a SID register.
    pub fn write(&mut self, reg: u8, value: u8) {
        self.bus_value = value;
        self.bus_value_ttl = bus_value_ttl(self.config.chip_model);
        self.sampler.synth.write(reg & 0x1f, value);
    }

    // -- State

    /// Snapshot full SID state (registers and internals).
    pub fn read_state(&self) -> State {
        let synth = &self.sampler.synth;
        let mut state = State::default();
        for (i, voice) in synth.voices.iter().enumerate() {
            let j = i * 7;
            let wave = &voice.wave;
            let envelope = &voice.envelope;
            state.sid_register[j] = wave.get_frequency_lo();
            state.sid_register[j + 1] = wave.get_frequency_hi();
            state.sid_register[j + 2] = wave.get_pulse_width_lo();
            state.sid_register[j + 3] = wave.get_pulse_width_hi();
            state.sid_register[j + 4] = wave.get_control() | envelope.get_control();
            state.sid_register[j + 5] = envelope.get_attack_decay();
            state.sid_register[j + 6] = envelope.get_sustain_release();

            state.accumulator[i] = wave.get_acc();
            state.shift_register[i] = wave.get_shift();
            state.envelope_state[i] = envelope.state as u8;
            state.envelope_counter[i] = envelope.envelope_counter;
            state.exponential_counter[i] = envelope.exponential_counter;
            state.exponential_counter_period[i] = envelope.exponential_counter_period;
            state.hold_zero[i] = envelope.hold_zero as u8;
            state.envelope_pipeline[i] = envelope.envelope_pipeline as u8;
            state.envelope_lfsr[i] = envelope.lfsr;
            state.envelope_rate[i] = envelope.rate;
        }
        let filter = synth.filter.state();
        state.sid_register[0x15] = filter.fc_lo();
        state.sid_register[0x16] = filter.fc_hi();
        state.sid_register[0x17] = filter.res_filt();
        state.sid_register[0x18] = filter.mode_vol();
        for i in reg::POTX..=reg::ENV3 {
            state.sid_register[i as usize] = synth.read(i, self.bus_value);
        }
        state.bus_value = self.bus_value;
        state.bus_value_ttl = self.bus_value_ttl;
        state.ext_in = self.ext_in;
        state
    }

    /// Restore full SID state (registers and internals).
    pub fn write_state(&mut self, state: &State) {
        for i in 0..=reg::MODVOL {
            self.write(i, state.sid_register[i as usize]);
        }
        self.bus_value = state.bus_value;
        self.bus_value_ttl = state.bus_value_ttl;
        self.input(state.ext_in);
        for (i, voice) in self.sampler.synth.voices.iter_mut().enumerate() {
            voice.wave.set_acc(state.accumulator[i]);
            voice.wave.set_shift(state.shift_register[i]);
            let envelope = &mut voice.envelope;
            envelope.state = match state.envelope_state[i] {
                0 => EnvState::Attack,
                1 => EnvState::DecaySustain,
                _ => EnvState::Release,
            };
            envelope.envelope_counter = state.envelope_counter[i];
            envelope.exponential_counter = state.exponential_counter[i];
            envelope.exponential_counter_period = state.exponential_counter_period[i];
            envelope.hold_zero = state.hold_zero[i] != 0;
            envelope.envelope_pipeline = state.envelope_pipeline[i] != 0;
            envelope.lfsr = state.envelope_lfsr[i];
            envelope.rate = state.envelope_rate[i];
        }
    }
}
