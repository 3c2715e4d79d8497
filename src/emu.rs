// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Emulation instance adapter for a host machine.
//!
//! A [`SidEmu`] is driven by the host's event scheduler: every register
//! access first renders the cycles elapsed since the previous access into a
//! staging buffer, so register effects land on the right cycle. The host
//! drains the staging buffer once per frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::warn;

use crate::sampler::SamplingMethod;
use crate::sid::{reg, Sid};
use crate::{ChipModel, CombinedWaveforms, ConfigError, EmuError};

/// Staging buffer length in milliseconds of output.
const BUFFER_MS: u32 = 20;

/// Control register bits kept when a voice is muted (test, ring, sync).
const MUTED_CONTROL_MASK: u8 = 0x0e;

/// Source of the host's PHI1 cycle count.
pub trait EventClock {
    /// Cycles elapsed since the host started.
    fn now(&self) -> u64;
}

impl EventClock for AtomicU64 {
    fn now(&self) -> u64 {
        self.load(Ordering::Acquire)
    }
}

/// Host-facing sampling mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplingMode {
    /// Decimation or linear interpolation.
    Interpolate,
    /// Band-limited sinc resampling.
    ResampleInterpolate,
}

impl SamplingMode {
    /// Sampling method for this mode; `fast` trades quality for speed.
    pub const fn method(self, fast: bool) -> SamplingMethod {
        match (self, fast) {
            (SamplingMode::Interpolate, true) => SamplingMethod::Fast,
            (SamplingMode::Interpolate, false) => SamplingMethod::Interpolate,
            (SamplingMode::ResampleInterpolate, true) => SamplingMethod::ResampleFast,
            (SamplingMode::ResampleInterpolate, false) => SamplingMethod::Resample,
        }
    }
}

impl TryFrom<u8> for SamplingMode {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SamplingMode::Interpolate),
            1 => Ok(SamplingMode::ResampleInterpolate),
            _ => Err(ConfigError::InvalidSamplingMethod(value)),
        }
    }
}

/// Staging buffer length for an output rate.
fn buffer_len(sample_freq: u32) -> usize {
    (sample_freq as usize * BUFFER_MS as usize).div_ceil(1000)
}

/// A SID owned by at most one host context at a time.
pub struct SidEmu {
    sid: Sid,
    event_clock: Option<Arc<dyn EventClock + Send + Sync>>,
    access_clk: u64,
    buffer: Vec<i16>,
    buffer_pos: usize,
    /// Voices 1-3 and the volume register.
    muted: [bool; 4],
}

impl SidEmu {
    /// Unlocked instance with default sampling parameters.
    pub fn new(chip_model: ChipModel) -> Self {
        let sid = Sid::new(chip_model);
        let buffer = vec![0; buffer_len(sid.config().sample_freq)];
        let mut emu = SidEmu {
            sid,
            event_clock: None,
            access_clk: 0,
            buffer,
            buffer_pos: 0,
            muted: [false; 4],
        };
        emu.reset(0);
        emu
    }

    /// Underlying chip.
    pub fn sid(&self) -> &Sid {
        &self.sid
    }

    /// Bind the instance to a host clock.
    ///
    /// # Errors
    /// Returns `EmuError::AlreadyLocked` if another context owns it.
    pub fn lock(&mut self, event_clock: Arc<dyn EventClock + Send + Sync>) -> Result<(), EmuError> {
        if self.event_clock.is_some() {
            return Err(EmuError::AlreadyLocked);
        }
        self.access_clk = event_clock.now();
        self.event_clock = Some(event_clock);
        Ok(())
    }

    /// Release the instance.
    ///
    /// # Errors
    /// Returns `EmuError::NotLocked` if it was not locked.
    pub fn unlock(&mut self) -> Result<(), EmuError> {
        self.event_clock.take().map(|_| ()).ok_or(EmuError::NotLocked)
    }

    /// Whether a host context owns the instance.
    pub fn is_locked(&self) -> bool {
        self.event_clock.is_some()
    }

    /// Render the cycles elapsed since the previous access.
    ///
    /// # Errors
    /// Returns `EmuError::NotLocked` without a host clock.
    pub fn clock(&mut self) -> Result<(), EmuError> {
        let now = self
            .event_clock
            .as_ref()
            .ok_or(EmuError::NotLocked)?
            .now();
        let mut cycles = now.saturating_sub(self.access_clk);
        self.access_clk = self.access_clk.max(now);
        while cycles > 0 {
            let step = cycles.min(u32::MAX as u64) as u32;
            let buffer = &mut self.buffer[self.buffer_pos..];
            self.buffer_pos += self.sid.clock(step, buffer);
            cycles -= step as u64;
        }
        Ok(())
    }

    /// Read a register at the current host cycle.
    ///
    /// # Errors
    /// Returns `EmuError::NotLocked` without a host clock.
    pub fn read(&mut self, addr: u8) -> Result<u8, EmuError> {
        self.clock()?;
        Ok(self.sid.read(addr))
    }

    /// Write a register at the current host cycle, honoring muted voices.
    ///
    /// # Errors
    /// Returns `EmuError::NotLocked` without a host clock.
    pub fn write(&mut self, addr: u8, data: u8) -> Result<(), EmuError> {
        self.clock()?;
        let data = match addr {
            reg::CR1 if self.muted[0] => data & MUTED_CONTROL_MASK,
            reg::CR2 if self.muted[1] => data & MUTED_CONTROL_MASK,
            reg::CR3 if self.muted[2] => data & MUTED_CONTROL_MASK,
            reg::MODVOL if self.muted[3] => data | 0x0f,
            _ => data,
        };
        self.sid.write(addr, data);
        Ok(())
    }

    /// Mute or unmute voice 0-2, or 3 for volume register samples. Applies
    /// from the next register write.
    pub fn voice(&mut self, voice: usize, mute: bool) {
        if let Some(flag) = self.muted.get_mut(voice) {
            *flag = mute;
        }
    }

    /// Reset the chip, rewind the access clock and set the volume register.
    pub fn reset(&mut self, volume: u8) {
        self.access_clk = 0;
        self.sid.reset();
        self.sid.write(reg::MODVOL, volume);
    }

    /// Select the chip model. Digi-boost feeds a constant input into the
    /// 8580 mixer so volume register samples become audible.
    pub fn model(&mut self, chip_model: ChipModel, digiboost: bool) {
        self.sid.set_chip_model(chip_model);
        let input = match chip_model {
            ChipModel::Mos8580 if digiboost => i16::MIN,
            _ => 0,
        };
        self.sid.input(input);
    }

    /// Set sampling parameters and resize the staging buffer to 20 ms.
    ///
    /// # Errors
    /// Returns the configuration error if the rate is unusable; the previous
    /// parameters stay in effect.
    pub fn sampling(
        &mut self,
        clock_freq: u32,
        sample_freq: u32,
        mode: SamplingMode,
        fast: bool,
    ) -> Result<(), EmuError> {
        self.sid
            .set_sampling_parameters(mode.method(fast), clock_freq, sample_freq)?;
        self.buffer = vec![0; buffer_len(sample_freq)];
        self.buffer_pos = 0;
        Ok(())
    }

    /// Enable or disable the internal filter.
    pub fn filter(&mut self, enable: bool) {
        self.sid.set_filter_enabled(enable);
    }

    /// Set the 6581 filter curve.
    pub fn filter_6581_curve(&mut self, curve: f64) {
        self.sid.set_filter_6581_curve(curve);
    }

    /// Set the 6581 filter range.
    pub fn filter_6581_range(&mut self, adjustment: f64) {
        self.sid.set_filter_6581_range(adjustment);
    }

    /// Set the 8580 filter curve.
    pub fn filter_8580_curve(&mut self, curve: f64) {
        self.sid.set_filter_8580_curve(curve);
    }

    /// Set the combined waveform strength.
    pub fn combined_waveforms(&mut self, strength: CombinedWaveforms) {
        self.sid.set_combined_waveforms(strength);
    }

    /// Samples rendered since the last [`SidEmu::reset_buffer`].
    pub fn buffer(&self) -> &[i16] {
        &self.buffer[..self.buffer_pos]
    }

    /// Number of rendered samples.
    pub fn buffer_pos(&self) -> usize {
        self.buffer_pos
    }

    /// Mark the staging buffer as drained.
    pub fn reset_buffer(&mut self) {
        if self.buffer_pos == self.buffer.len() {
            warn!("SID staging buffer was full, samples were dropped");
        }
        self.buffer_pos = 0;
    }
}
