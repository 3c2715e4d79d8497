// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// ADSR timing seen through the public envelope generator.

use residfp::envelope::{EnvelopeGenerator, State};

fn gated(attack_decay: u8, sustain_release: u8) -> EnvelopeGenerator {
    let mut gen = EnvelopeGenerator::default();
    gen.set_attack_decay(attack_decay);
    gen.set_sustain_release(sustain_release);
    gen.set_control(0x01);
    gen
}

fn clock_n(gen: &mut EnvelopeGenerator, n: u32) {
    for _ in 0..n {
        gen.clock();
    }
}

#[test]
fn registers_read_back() {
    let gen = gated(0x4a, 0xc3);
    assert_eq!(gen.get_attack_decay(), 0x4a);
    assert_eq!(gen.get_sustain_release(), 0xc3);
    assert_eq!(gen.get_control(), 0x01);
}

#[test]
fn fastest_attack_steps_every_nine_cycles() {
    let mut gen = gated(0x00, 0xf0);
    clock_n(&mut gen, 8);
    assert_eq!(gen.read_env(), 0);
    gen.clock();
    assert_eq!(gen.read_env(), 1);

    clock_n(&mut gen, 9 * 253);
    assert_eq!(gen.read_env(), 0xfe);
    assert_eq!(gen.state, State::Attack);
    clock_n(&mut gen, 9);
    assert_eq!(gen.read_env(), 0xff);
    assert_eq!(gen.state, State::DecaySustain);
}

#[test]
fn full_sustain_holds_peak() {
    let mut gen = gated(0x00, 0xf0);
    clock_n(&mut gen, 50_000);
    assert_eq!(gen.read_env(), 0xff);
}

#[test]
fn lowered_attack_rate_waits_for_lfsr_wrap() {
    let mut gen = gated(0x70, 0x00);
    clock_n(&mut gen, 200);
    gen.set_attack_decay(0x20);
    // Past the 63 cycle period but not through the 32767 state cycle.
    clock_n(&mut gen, 30_000);
    assert_eq!(gen.read_env(), 0);
    clock_n(&mut gen, 3_000);
    assert!(gen.read_env() > 0);
}

#[test]
fn regate_restarts_attack_from_current_level() {
    let mut gen = gated(0x00, 0x80);
    clock_n(&mut gen, 100_000);
    assert_eq!(gen.read_env(), 0x88);

    gen.set_control(0x00);
    assert_eq!(gen.state, State::Release);
    clock_n(&mut gen, 20);
    let released = gen.read_env();
    assert!(released < 0x88);

    gen.set_control(0x01);
    assert_eq!(gen.state, State::Attack);
    clock_n(&mut gen, 9);
    assert_eq!(gen.read_env(), released + 1);
}

#[test]
fn gate_toggle_on_rate_match_steps_once() {
    let mut gen = gated(0x00, 0x00);
    // 0x80 steps of attack leave the exponential period at 2.
    clock_n(&mut gen, 9 * 0x80);
    assert_eq!(gen.read_env(), 0x80);
    clock_n(&mut gen, 8);
    assert_eq!(gen.lfsr, gen.rate);

    gen.set_control(0x00);
    gen.set_control(0x01);
    gen.set_control(0x00);
    assert_eq!(gen.state, State::Release);

    // The match only advances the exponential counter.
    gen.clock();
    assert_eq!(gen.read_env(), 0x80);
    assert_eq!(gen.exponential_counter, 1);

    // The next match schedules a single decrement for the following cycle.
    clock_n(&mut gen, 9);
    assert!(gen.envelope_pipeline);
    assert_eq!(gen.read_env(), 0x80);
    gen.clock();
    assert!(!gen.envelope_pipeline);
    assert_eq!(gen.read_env(), 0x7f);
    assert_eq!(gen.state, State::Release);
}
