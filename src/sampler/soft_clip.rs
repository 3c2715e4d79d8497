// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Saturation of the mixed output into 16 bits.

/// Magnitude below which samples pass unchanged.
const THRESHOLD: i32 = 28000;

/// Compress `magnitude` above the threshold onto a tanh knee that approaches
/// `limit` asymptotically.
#[inline]
fn compress(magnitude: i64, limit: f64) -> i32 {
    let t = THRESHOLD as f64 / limit;
    let a = 1.0 - t;
    let excess = (magnitude - THRESHOLD as i64) as f64 / limit;
    ((t + a * (excess / a).tanh()) * limit).round() as i32
}

/// Soft clip into the i16 range.
///
/// Values in `-28000..=28000` are returned unchanged; larger magnitudes are
/// bent smoothly towards the i16 limits instead of wrapping.
#[inline]
pub fn soft_clip(x: i32) -> i16 {
    let magnitude = (x as i64).abs();
    if magnitude <= THRESHOLD as i64 {
        return x as i16;
    }
    if x < 0 {
        (-compress(magnitude, 32768.0)).max(i16::MIN as i32) as i16
    } else {
        compress(magnitude, 32767.0).min(i16::MAX as i32) as i16
    }
}
