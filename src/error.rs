// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Error types.

use thiserror::Error;

/// Rejected configuration. The instance keeps its previous settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Clock frequency must be non-zero.
    #[error("Clock frequency must be non-zero.")]
    ZeroClockFreq,
    /// Sample frequency must be non-zero.
    #[error("Sample frequency must be non-zero.")]
    ZeroSampleFreq,
    /// Output frequency cannot be produced from the given clock.
    #[error("Unsupported sampling frequency {sample_freq} Hz for clock {clock_freq} Hz.")]
    UnsupportedFrequency {
        /// Chip clock in Hz.
        clock_freq: u32,
        /// Requested output rate in Hz.
        sample_freq: u32,
    },
    /// Unknown sampling method code.
    #[error("Invalid sampling method {0}.")]
    InvalidSamplingMethod(u8),
    /// Unknown chip model code.
    #[error("Invalid chip model {0}.")]
    InvalidChipModel(u8),
    /// Unknown combined waveform strength code.
    #[error("Invalid combined waveforms strength.")]
    InvalidCombinedWaveforms(u8),
}

/// Misuse of an emulation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmuError {
    /// Instance is already owned by another context.
    #[error("SID instance is already locked")]
    AlreadyLocked,
    /// Instance was used without being locked first.
    #[error("SID instance is not locked")]
    NotLocked,
    /// Configuration call failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Instance pool failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuilderError {
    /// Every instance in the pool is locked.
    #[error("No available SIDs to lock")]
    NoAvailableInstance,
    /// Instance storage could not be reserved.
    #[error("Unable to allocate {requested} SID instances")]
    AllocationFailed {
        /// Number of instances asked for.
        requested: usize,
    },
    /// Handle does not belong to this builder.
    #[error("SID instance does not belong to this builder")]
    UnknownInstance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_descriptive() {
        assert_eq!(
            ConfigError::InvalidCombinedWaveforms(9).to_string(),
            "Invalid combined waveforms strength."
        );
        assert_eq!(
            BuilderError::NoAvailableInstance.to_string(),
            "No available SIDs to lock"
        );
        let err: EmuError = ConfigError::ZeroSampleFreq.into();
        assert_eq!(err.to_string(), "Sample frequency must be non-zero.");
    }
}
