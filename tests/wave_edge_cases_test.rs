// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// Oscillator, noise register and sync behavior of the waveform generator.

use residfp::cache;
use residfp::wave::{WaveformGenerator, FLOATING_OUTPUT_TTL, SHIFT_REGISTER_RESET};
use residfp::{ChipModel, CombinedWaveforms};

fn step(gen: &mut WaveformGenerator) -> u16 {
    gen.clock();
    gen.output(None)
}

#[test]
fn shift_register_starts_all_ones() {
    let gen = WaveformGenerator::new(ChipModel::Mos6581);
    assert_eq!(gen.get_shift(), 0x7fffff);
}

#[test]
fn sawtooth_period() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos8580);
    gen.set_frequency_hi(0x10);
    gen.set_control(0x20);
    for n in 1..=4096u32 {
        assert_eq!(step(&mut gen), (n & 0xfff) as u16, "cycle {n}");
    }
    assert_eq!(gen.get_acc(), 0);
}

#[test]
fn sawtooth_repeats_every_period() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.set_frequency_hi(0x18);
    gen.set_control(0x20);
    // 0x1800 brings the accumulator back to zero every 8192 cycles.
    let first: Vec<u16> = (0..8192).map(|_| step(&mut gen)).collect();
    assert_eq!(gen.get_acc(), 0);
    let second: Vec<u16> = (0..8192).map(|_| step(&mut gen)).collect();
    assert_eq!(first, second);
    assert!(first.windows(2).any(|w| w[1] < w[0]), "no ramp reset");
}

#[test]
fn accumulator_wraps_at_24_bits() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.set_acc(0xfffff0);
    gen.set_frequency_lo(0x20);
    gen.clock();
    assert_eq!(gen.get_acc(), 0x000010);
    assert!(!gen.is_msb_rising());
}

#[test]
fn msb_rising_lasts_one_cycle() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.set_acc(0x7fffff);
    gen.set_frequency_lo(1);
    gen.clock();
    assert!(gen.is_msb_rising());
    gen.clock();
    assert!(!gen.is_msb_rising());
}

#[test]
fn test_bit_holds_accumulator_and_pulse() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.set_frequency_hi(0x40);
    gen.set_pulse_width_hi(0x08);
    gen.set_control(0x48);
    for _ in 0..100 {
        assert_eq!(step(&mut gen), 0xfff);
        assert_eq!(gen.get_acc(), 0);
    }
}

#[test]
fn test_bit_release_shifts_inverted_tap() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.set_control(0x08);
    gen.set_control(0x00);
    assert_eq!(gen.get_shift(), 0x3fffff);
    gen.set_control(0x08);
    gen.set_control(0x00);
    assert_eq!(gen.get_shift(), 0x1fffff);
}

#[test]
fn held_test_bit_resets_shift_register() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos8580);
    gen.shift = 0;
    gen.set_control(0x08);
    for _ in 0..SHIFT_REGISTER_RESET - 1 {
        gen.clock();
    }
    assert_eq!(gen.get_shift(), 0);
    gen.clock();
    assert_eq!(gen.get_shift(), 0x7fffff);
}

#[test]
fn noise_clock_is_delayed_two_cycles() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.set_acc(0x07ffff);
    gen.set_frequency_lo(1);
    gen.clock();
    assert_eq!(gen.get_shift(), 0x7fffff);
    gen.clock();
    assert_eq!(gen.get_shift(), 0x7fffff);
    gen.clock();
    // bit22 ^ bit17 of an all-ones register feeds back a zero.
    assert_eq!(gen.get_shift(), 0x3fffff);
}

#[test]
fn sync_resets_destination() {
    let mut main = WaveformGenerator::new(ChipModel::Mos6581);
    let mut dest = WaveformGenerator::new(ChipModel::Mos6581);
    let source = WaveformGenerator::new(ChipModel::Mos6581);
    main.set_acc(0x7fffff);
    main.set_frequency_lo(1);
    dest.set_acc(0x123456);
    dest.set_control(0x02);
    main.clock();
    main.synchronize(&mut dest, &source);
    assert_eq!(dest.get_acc(), 0);
}

#[test]
fn sync_skipped_when_source_is_synced_same_cycle() {
    let mut main = WaveformGenerator::new(ChipModel::Mos6581);
    let mut dest = WaveformGenerator::new(ChipModel::Mos6581);
    let mut source = WaveformGenerator::new(ChipModel::Mos6581);
    for gen in [&mut main, &mut source] {
        gen.set_acc(0x7fffff);
        gen.set_frequency_lo(1);
    }
    main.set_control(0x02);
    dest.set_acc(0x123456);
    dest.set_control(0x02);
    main.clock();
    source.clock();
    main.synchronize(&mut dest, &source);
    assert_eq!(dest.get_acc(), 0x123456);
}

#[test]
fn floating_output_fades() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.set_acc(0x7ff000);
    gen.set_control(0x20);
    assert_eq!(step(&mut gen), 0x7ff);

    gen.set_control(0x00);
    for _ in 0..FLOATING_OUTPUT_TTL - 1 {
        assert_eq!(step(&mut gen), 0x7ff);
    }
    assert_eq!(step(&mut gen), 0x3ff);
    for _ in 0..1400 {
        step(&mut gen);
    }
    assert_eq!(gen.last_output(), 0x1ff);
}

#[test]
fn combined_sawtooth_triangle_uses_table() {
    let tables = cache::waveform_tables(ChipModel::Mos8580, CombinedWaveforms::Average);
    let mut gen = WaveformGenerator::new(ChipModel::Mos8580);
    gen.set_acc(0x800000);
    gen.set_control(0x30);
    let out = step(&mut gen);
    assert_eq!(out, tables.pulldown[3][tables.wave[3][0x800] as usize]);
    // A plain AND of the two waveforms would leave bit 11 set.
    assert_eq!(tables.wave[1][0x800] & tables.wave[2][0x800], 0x800);
    assert_eq!(out, 0);
}

#[test]
fn combined_sawtooth_clears_msb_on_6581() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.set_acc(0x800000);
    gen.set_control(0x30);
    step(&mut gen);
    assert_eq!(gen.get_acc(), 0);

    let mut gen = WaveformGenerator::new(ChipModel::Mos8580);
    gen.set_acc(0x800000);
    gen.set_control(0x30);
    step(&mut gen);
    assert_eq!(gen.get_acc(), 0x800000);
}
