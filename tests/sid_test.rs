// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use residfp::{clock, reg, ChipModel, CombinedWaveforms, ConfigError, SamplingMethod, Sid, SidConfig};

fn play_voice3(sid: &mut Sid) {
    sid.write(reg::FREQHI3, 0x10);
    sid.write(reg::AD3, 0x00);
    sid.write(reg::SR3, 0xf0);
    sid.write(reg::CR3, 0x21);
}

#[test]
fn config_defaults_match_new() {
    let sid = Sid::from_config(SidConfig::default()).unwrap();
    let config = sid.config();
    assert_eq!(config, Sid::new(ChipModel::Mos6581).config());
    assert_eq!(config.clock_freq, clock::PAL);
    assert_eq!(config.sample_freq, 44_100);
    assert_eq!(config.sampling_method, SamplingMethod::Fast);
    assert!(config.filter_enabled);
}

#[test]
fn config_allows_custom_params() {
    let config = SidConfig {
        chip_model: ChipModel::Mos8580,
        sampling_method: SamplingMethod::ResampleFast,
        clock_freq: clock::NTSC,
        sample_freq: 48_000,
        combined_waveforms: CombinedWaveforms::Strong,
        filter_enabled: false,
        filter_6581_curve: 0.25,
        filter_6581_range: 0.75,
        filter_8580_curve: 0.1,
    };
    let sid = Sid::from_config(config.clone()).unwrap();
    assert_eq!(sid.config(), &config);
    assert_eq!(sid.chip_model(), ChipModel::Mos8580);
    assert_eq!(sid.synth().combined_waveforms(), CombinedWaveforms::Strong);
}

#[test]
fn unusable_config_is_rejected() {
    let config = SidConfig {
        sample_freq: 0,
        ..SidConfig::default()
    };
    assert!(matches!(
        Sid::from_config(config),
        Err(ConfigError::ZeroSampleFreq)
    ));
}

#[test]
fn rejected_sampling_keeps_config() {
    let mut sid = Sid::new(ChipModel::Mos8580);
    let before = sid.config().clone();
    assert!(sid
        .set_sampling_parameters(SamplingMethod::Resample, clock::PAL, 2_000)
        .is_err());
    assert_eq!(sid.config(), &before);
}

#[test]
fn write_only_registers_read_bus_value() {
    let mut sid = Sid::new(ChipModel::Mos6581);
    sid.write(reg::AD1, 0x09);
    assert_eq!(sid.read(reg::FREQLO2), 0x09);
    assert_eq!(sid.read(reg::FREQLO2), 0x09);
    assert_eq!(sid.read(reg::POTX), 0xff);
    assert_eq!(sid.read(reg::MODVOL), 0xff);
}

#[test]
fn voice3_reads_back_oscillator_and_envelope() {
    let mut sid = Sid::new(ChipModel::Mos8580);
    play_voice3(&mut sid);
    sid.clock_silent(5_000);
    assert_eq!(sid.read(reg::ENV3), 0xff);
    // 8580 OSC3 lags the oscillator by one cycle.
    assert_eq!(sid.read(reg::OSC3), 0x38);
}

#[test]
fn clock_fills_buffer_at_sample_rate() {
    let mut sid = Sid::new(ChipModel::Mos6581);
    play_voice3(&mut sid);
    sid.write(reg::MODVOL, 0x0f);
    let mut buffer = vec![0i16; 8192];
    let written = sid.clock(clock::PAL / 10, &mut buffer);
    assert!((4409..=4411).contains(&written), "wrote {written}");
    assert!(buffer[..written].iter().any(|&s| s != 0));
}

#[test]
fn state_round_trip() {
    let mut sid = Sid::new(ChipModel::Mos6581);
    play_voice3(&mut sid);
    sid.write(reg::FREQHI1, 0x22);
    sid.write(reg::PWHI1, 0x08);
    sid.write(reg::CR1, 0x41);
    sid.write(reg::FCHI, 0x40);
    sid.write(reg::RESFILT, 0xf1);
    sid.write(reg::MODVOL, 0x1f);
    sid.input(-1234);
    sid.clock_silent(12_345);
    let state = sid.read_state();
    assert_eq!(state.sid_register[reg::CR1 as usize], 0x41);
    assert_eq!(state.ext_in, -1234);

    let mut restored = Sid::new(ChipModel::Mos6581);
    restored.write_state(&state);
    let copy = restored.read_state();
    assert_eq!(copy.sid_register[..=reg::MODVOL as usize], state.sid_register[..=reg::MODVOL as usize]);
    assert_eq!(copy.sid_register[reg::ENV3 as usize], state.sid_register[reg::ENV3 as usize]);
    assert_eq!(copy.accumulator, state.accumulator);
    assert_eq!(copy.shift_register, state.shift_register);
    assert_eq!(copy.envelope_state, state.envelope_state);
    assert_eq!(copy.envelope_counter, state.envelope_counter);
    assert_eq!(copy.envelope_lfsr, state.envelope_lfsr);
    assert_eq!(copy.envelope_rate, state.envelope_rate);
    assert_eq!(copy.bus_value, state.bus_value);
    assert_eq!(copy.bus_value_ttl, state.bus_value_ttl);
    assert_eq!(copy.ext_in, state.ext_in);
}

#[test]
fn restored_noise_voice_matches_source() {
    let mut sid = Sid::new(ChipModel::Mos8580);
    sid.write(reg::FREQHI3, 0x40);
    sid.write(reg::CR3, 0x81);
    sid.clock_silent(20_000);
    let state = sid.read_state();

    let mut restored = Sid::new(ChipModel::Mos8580);
    restored.write_state(&state);
    sid.clock_silent(1);
    restored.clock_silent(1);
    assert_eq!(restored.read(reg::OSC3), sid.read(reg::OSC3));
    assert_eq!(restored.read_state().shift_register, sid.read_state().shift_register);
}

#[test]
fn reset_silences_voices() {
    let mut sid = Sid::new(ChipModel::Mos8580);
    play_voice3(&mut sid);
    sid.clock_silent(5_000);
    sid.reset();
    assert_eq!(sid.read(reg::ENV3), 0);
    let state = sid.read_state();
    assert_eq!(state.accumulator, [0; 3]);
    assert_eq!(state.sid_register[reg::CR3 as usize], 0);
}
