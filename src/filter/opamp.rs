// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Op-amp transfer function model.
//!
//! The measured op-amp voltage transfer curves are interpolated with a
//! Fritsch-Carlson monotone cubic spline. [`OpAmp`] then solves the steady
//! state of an inverting op-amp stage with a given input/output loading ratio
//! using Newton-Raphson iteration, falling back to bisection when a step
//! leaves the current root bracket.

/// A 2D point for spline interpolation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// Abscissa.
    pub x: f64,
    /// Ordinate.
    pub y: f64,
}

/// Cubic polynomial coefficients for one spline segment.
#[derive(Clone, Copy, Debug)]
struct SplineSegment {
    x1: f64,
    x2: f64,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

/// Monotone cubic spline interpolator using Fritsch-Carlson method.
///
/// Outside the input range the first and last segments are extrapolated.
#[derive(Clone, Debug)]
pub struct MonotoneSpline {
    segments: Vec<SplineSegment>,
}

impl MonotoneSpline {
    /// Constructs a monotone cubic spline from input points.
    ///
    /// Points must be sorted by x coordinate in ascending order.
    pub fn new(input: &[Point]) -> Self {
        assert!(input.len() > 2, "Spline requires at least 3 points");

        let n = input.len() - 1;

        // Compute consecutive differences and slopes
        let dxs: Vec<f64> = input.windows(2).map(|p| p[1].x - p[0].x).collect();
        let ms: Vec<f64> = input
            .windows(2)
            .zip(&dxs)
            .map(|(p, dx)| (p[1].y - p[0].y) / dx)
            .collect();

        // Compute degree-1 coefficients (tangents at each point)
        let mut cs = Vec::with_capacity(n + 1);
        cs.push(ms[0]);
        for i in 1..n {
            let m = ms[i - 1];
            let m_next = ms[i];
            if m * m_next <= 0.0 {
                cs.push(0.0);
            } else {
                // Weighted harmonic mean of slopes
                let dx = dxs[i - 1];
                let dx_next = dxs[i];
                let common = dx + dx_next;
                cs.push(3.0 * common / ((common + dx_next) / m + (common + dx) / m_next));
            }
        }
        cs.push(ms[n - 1]);

        let segments = (0..n)
            .map(|i| {
                let c1 = cs[i];
                let m = ms[i];
                let inv_dx = 1.0 / dxs[i];
                let common = c1 + cs[i + 1] - m - m;
                SplineSegment {
                    x1: input[i].x,
                    x2: if i == n - 1 { f64::MAX } else { input[i + 1].x },
                    d: input[i].y,
                    c: c1,
                    b: (m - c1 - common) * inv_dx,
                    a: common * inv_dx * inv_dx,
                }
            })
            .collect();

        MonotoneSpline { segments }
    }

    /// Evaluates the spline at x, returning (y, dy/dx).
    #[inline]
    pub fn evaluate(&self, x: f64) -> (f64, f64) {
        let idx = self
            .segments
            .partition_point(|s| s.x2 < x)
            .min(self.segments.len() - 1);
        let seg = &self.segments[idx];

        let diff = x - seg.x1;

        // y = a*x^3 + b*x^2 + c*x + d (in terms of diff from x1)
        let y = ((seg.a * diff + seg.b) * diff + seg.c) * diff + seg.d;

        // dy/dx = 3*a*x^2 + 2*b*x + c
        let dy = (3.0 * seg.a * diff + 2.0 * seg.b) * diff + seg.c;

        (y, dy)
    }
}

/// Newton step size below which a solution is accepted.
const EPSILON: f64 = 1e-8;

/// Iterations after which the current estimate is returned as is.
const MAX_ITERATIONS: usize = 100;

/// Solver for the output voltage of an op-amp stage.
///
/// The stage consists of the measured op-amp with NMOS "resistors" of
/// ratio `n` between input and output. Both transistors are in triode mode,
/// so the currents through them must satisfy
///
/// ```text
/// n*((Vddt - vx)^2 - (Vddt - vi)^2) = (Vddt - vx)^2 - (Vddt - vo)^2
/// ```
///
/// where vx is the op-amp input and vo = f(vx) its output.
#[derive(Clone, Debug)]
pub struct OpAmp {
    opamp: MonotoneSpline,
    vddt: f64,
    vmin: f64,
    vmax: f64,
    /// Last root, used as the starting guess for the next solve.
    x: f64,
}

impl OpAmp {
    /// Op-amp from measured (input, output) voltage pairs.
    pub fn new(voltages: &[(f64, f64)], vddt: f64, vmin: f64, vmax: f64) -> Self {
        let points: Vec<Point> = voltages.iter().map(|&(x, y)| Point { x, y }).collect();
        OpAmp {
            opamp: MonotoneSpline::new(&points),
            vddt,
            vmin,
            vmax,
            x: vmin,
        }
    }

    /// Restart the root search from the bottom of the range.
    pub fn reset(&mut self) {
        self.x = self.vmin;
    }

    /// Output voltage for input `vi` with loading ratio `n`.
    pub fn solve(&mut self, n: f64, vi: f64) -> f64 {
        // Start off with an estimate of x and a root bracket [ak, bk].
        // f is decreasing, so that f(ak) > 0 and f(bk) < 0.
        let mut ak = self.vmin;
        let mut bk = self.vmax;

        let a = n + 1.0;
        let b = self.vddt;
        let b_vi = (b - vi).max(0.0);
        let c = n * (b_vi * b_vi);

        for _ in 0..MAX_ITERATIONS {
            let xk = self.x;

            let (vo, dvo) = self.opamp.evaluate(self.x);

            let b_vx = (b - self.x).max(0.0);
            let b_vo = (b - vo).max(0.0);

            let f = a * (b_vx * b_vx) - c - (b_vo * b_vo);
            let df = 2.0 * (b_vo * dvo - a * b_vx);

            self.x -= f / df;
            if (self.x - xk).abs() < EPSILON {
                break;
            }

            // Narrow down root bracket.
            if f < 0.0 {
                bk = xk;
            } else {
                ak = xk;
            }

            if !(self.x > ak && self.x < bk) {
                // Bisection step (ala Dekker's method).
                self.x = (ak + bk) * 0.5;
            }
        }

        self.opamp.evaluate(self.x).0
    }
}
