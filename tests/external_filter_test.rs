// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// C64 output stage: 16kHz low-pass followed by a 16Hz DC blocker.

use residfp::external_filter::ExternalFilter;

const MIDPOINT: u16 = 0x8000;

fn settle(filter: &mut ExternalFilter, input: u16, cycles: u32) -> i32 {
    let mut out = 0;
    for _ in 0..cycles {
        out = filter.clock(input);
    }
    out
}

#[test]
fn disabled_only_removes_offset() {
    let mut filter = ExternalFilter::new();
    filter.set_enabled(false);
    assert!(!filter.enabled());
    assert_eq!(filter.clock(MIDPOINT), 0);
    assert_eq!(filter.clock(0xffff), 32767);
    assert_eq!(filter.clock(0x0000), -32768);
    assert_eq!(filter.clock(0x9234), 0x1234);
}

#[test]
fn step_is_smoothed_by_low_pass() {
    let mut filter = ExternalFilter::new();
    let first = filter.clock(0xc000);
    assert!(first > 0);
    assert!(first < 4096, "first response {first}");
    let settled = settle(&mut filter, 0xc000, 1000);
    assert!((15_500..=16_384).contains(&settled), "settled at {settled}");
}

#[test]
fn dc_is_removed() {
    let mut filter = ExternalFilter::new();
    let out = settle(&mut filter, 0xc000, 2_000_000);
    assert!(out.abs() < 100, "residual DC {out}");
}

#[test]
fn faster_clock_slows_response() {
    let mut pal = ExternalFilter::new();
    let mut fast = ExternalFilter::new();
    fast.set_clock_frequency(4.0 * 985_248.0);
    let pal_out = settle(&mut pal, 0xc000, 5);
    let fast_out = settle(&mut fast, 0xc000, 5);
    assert!(fast_out < pal_out);
}

#[test]
fn reset_clears_state() {
    let mut filter = ExternalFilter::new();
    settle(&mut filter, 0xf000, 100);
    assert_ne!(filter.output(), 0);
    filter.reset();
    assert_eq!(filter.output(), 0);
}
