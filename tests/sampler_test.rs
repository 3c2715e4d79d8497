// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// Output saturation and sampling parameter checks.

use residfp::clock;
use residfp::sampler::{soft_clip, validate_parameters, Sampler};
use residfp::synth::Synth;
use residfp::{ChipModel, ConfigError, SamplingMethod};

/// Soft clipping threshold - values below pass unchanged.
const THRESHOLD: i32 = 28000;

/// Peak value for testing compression region.
const PEAK: i32 = 38000;

/// Values within threshold pass unchanged (linear region).
#[test]
fn soft_clip_linear_region() {
    for i in -THRESHOLD..=THRESHOLD {
        let clipped = soft_clip(i);
        assert_eq!(
            clipped, i as i16,
            "Value {} in linear region should pass unchanged, got {}",
            i, clipped
        );
    }
}

/// Positive values above threshold are compressed but stay <= i16::MAX.
#[test]
fn soft_clip_positive_compression() {
    for i in THRESHOLD..=PEAK {
        let clipped = soft_clip(i) as i32;
        assert!(
            clipped <= i && clipped <= i16::MAX as i32,
            "Positive {} should compress: got {}",
            i,
            clipped
        );
    }
}

/// Negative values below -threshold are compressed but stay >= i16::MIN.
#[test]
fn soft_clip_negative_compression() {
    for i in (-PEAK..=-THRESHOLD).rev() {
        let clipped = soft_clip(i) as i32;
        assert!(
            clipped >= i && clipped >= i16::MIN as i32,
            "Negative {} should compress: got {}",
            i,
            clipped
        );
    }
}

/// Extreme values stay within i16 range.
#[test]
fn soft_clip_extremes() {
    let max_clipped = soft_clip(i32::MAX);
    assert!(
        max_clipped <= i16::MAX,
        "i32::MAX should clip to <= i16::MAX, got {}",
        max_clipped
    );

    let min_clipped = soft_clip(i32::MIN + 1);
    assert!(
        min_clipped >= i16::MIN,
        "i32::MIN+1 should clip to >= i16::MIN, got {}",
        min_clipped
    );
}

/// Soft clipping is monotonic (larger input -> larger or equal output).
#[test]
fn soft_clip_monotonic() {
    let mut prev = soft_clip(-100000);
    for i in -100000..=100000 {
        let curr = soft_clip(i);
        assert!(
            curr >= prev,
            "Soft clip should be monotonic: f({}) = {} < f({}) = {}",
            i - 1,
            prev,
            i,
            curr
        );
        prev = curr;
    }
}

/// Symmetry: soft_clip(-x) approximately equals -soft_clip(x).
/// Not exact due to asymmetric i16 range (-32768 vs 32767) and different max_val.
#[test]
fn soft_clip_symmetry() {
    for i in 0..=THRESHOLD {
        // Linear region should be exactly symmetric
        let pos = soft_clip(i);
        let neg = soft_clip(-i);
        assert_eq!(
            pos as i32,
            -(neg as i32),
            "Linear region should be symmetric: f({}) = {}, f({}) = {}",
            i,
            pos,
            -i,
            neg
        );
    }
    // Compression region: verify both sides compress similarly (not exact)
    for i in (THRESHOLD + 1000)..PEAK {
        let pos = soft_clip(i);
        let neg = soft_clip(-i);
        // Both should be compressed (output magnitude less than input)
        assert!(
            (pos as i32) < i,
            "Positive {} should compress to less than input, got {}",
            i,
            pos
        );
        assert!(
            (neg as i32) > -i,
            "Negative {} should compress to less than input magnitude, got {}",
            -i,
            neg
        );
    }
}

#[test]
fn zero_frequencies_are_rejected_first() {
    assert_eq!(
        validate_parameters(SamplingMethod::Resample, 0, 0),
        Err(ConfigError::ZeroClockFreq)
    );
    assert_eq!(
        validate_parameters(SamplingMethod::Fast, clock::PAL, 0),
        Err(ConfigError::ZeroSampleFreq)
    );
}

#[test]
fn output_rate_cannot_exceed_clock() {
    assert_eq!(
        validate_parameters(SamplingMethod::Interpolate, 44_100, 48_000),
        Err(ConfigError::UnsupportedFrequency {
            clock_freq: 44_100,
            sample_freq: 48_000
        })
    );
}

#[test]
fn low_rates_only_limit_resampling() {
    assert!(validate_parameters(SamplingMethod::Fast, clock::PAL, 7_000).is_ok());
    assert!(validate_parameters(SamplingMethod::Resample, clock::PAL, 8_000).is_ok());
    for method in [SamplingMethod::Resample, SamplingMethod::ResampleFast] {
        assert!(validate_parameters(method, clock::PAL, 7_000).is_err());
    }
}

#[test]
fn rejected_parameters_keep_previous() {
    let mut sampler = Sampler::new(Synth::new(ChipModel::Mos8580));
    sampler
        .set_parameters(SamplingMethod::Interpolate, clock::PAL, 48_000)
        .unwrap();
    let cycles_per_sample = sampler.cycles_per_sample();
    assert_eq!(cycles_per_sample >> 16, 20);

    assert!(sampler
        .set_parameters(SamplingMethod::Resample, clock::PAL, 1_000)
        .is_err());
    assert_eq!(sampler.sampling_method(), SamplingMethod::Interpolate);
    assert_eq!(sampler.cycles_per_sample(), cycles_per_sample);
}
