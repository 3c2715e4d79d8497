// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Conversion of the chip's native cycle rate to the host sample rate.
//!
//! Provides decimation, linear interpolation and Kaiser-windowed sinc
//! resampling, the latter either with interpolated FIR tables or with a
//! larger table for faster lookup.

// Allow cast_lossless: intentional i16->i32 casts for audio sample processing
#![allow(clippy::cast_lossless)]
// Allow cast_ptr_alignment: SIMD pointer casts are aligned by construction
#![allow(clippy::cast_ptr_alignment)]

mod fir;
mod soft_clip;

pub use fir::{FirKey, FirTable, DEFAULT_PASS_FREQ};
pub use soft_clip::soft_clip;

use std::sync::Arc;

use crate::cache;
use crate::synth::Synth;
use crate::ConfigError;
use fir::FIR_SHIFT;

use wide::{i16x16, i32x8};

/// History of chip output kept for the resampling filter. Stored twice so
/// any window of up to RING_SIZE samples is contiguous.
const RING_SIZE: usize = 16384;
const RING_MASK: usize = RING_SIZE - 1;

// Sample positions are 16.16 fixed point cycle counts.
const FIXP_SHIFT: i32 = 16;
const FIXP_MASK: i32 = 0xffff;
const HALF_CYCLE: i32 = 1 << (FIXP_SHIFT - 1);

/// Audio sampling/resampling method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SamplingMethod {
    /// Simple decimation - fastest but lowest quality.
    #[default]
    Fast,
    /// Linear interpolation between samples.
    Interpolate,
    /// High-quality Kaiser-windowed sinc resampling.
    Resample,
    /// Faster sinc resampling with larger lookup tables.
    ResampleFast,
}

impl SamplingMethod {
    /// True for the sinc resampling methods.
    pub const fn is_resampling(self) -> bool {
        matches!(self, SamplingMethod::Resample | SamplingMethod::ResampleFast)
    }
}

/// Check that `method` can convert `clock_freq` to `sample_freq`.
///
/// # Errors
/// Returns `ConfigError::ZeroClockFreq` or `ConfigError::ZeroSampleFreq` for
/// zero frequencies, and `ConfigError::UnsupportedFrequency` when the output
/// rate exceeds the clock or the resampling filter would not fit the sample
/// ring buffer.
pub fn validate_parameters(
    method: SamplingMethod,
    clock_freq: u32,
    sample_freq: u32,
) -> Result<(), ConfigError> {
    if method.is_resampling() {
        return FirKey::new(method, clock_freq, sample_freq).map(|_| ());
    }
    if clock_freq == 0 {
        return Err(ConfigError::ZeroClockFreq);
    }
    if sample_freq == 0 {
        return Err(ConfigError::ZeroSampleFreq);
    }
    if sample_freq > clock_freq {
        return Err(ConfigError::UnsupportedFrequency {
            clock_freq,
            sample_freq,
        });
    }
    Ok(())
}

#[derive(Clone)]
/// Audio sampler wrapping the SID synthesizer and resamplers.
pub struct Sampler {
    // Dependencies
    /// Underlying SID synthesizer.
    pub synth: Synth,
    // Configuration
    cycles_per_sample: u32,
    fir: Option<Arc<FirTable>>,
    sampling_method: SamplingMethod,
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    use_avx2: bool,
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    use_sse2: bool,
    // Runtime State
    ring: Box<[i16]>,
    ring_pos: usize,
    /// Position of the next output sample relative to the last clocked
    /// cycle, 16.16 fixed point.
    offset: i32,
    prev_sample: i16,
    sample_now: i16,
}

impl Sampler {
    /// Construct a sampler around a SID synthesizer.
    pub fn new(synth: Synth) -> Self {
        Self {
            synth,
            cycles_per_sample: 0,
            fir: None,
            sampling_method: SamplingMethod::Fast,
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            use_avx2: std::is_x86_feature_detected!("avx2"),
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            use_sse2: std::is_x86_feature_detected!("sse2"),
            ring: vec![0; RING_SIZE * 2].into_boxed_slice(),
            ring_pos: 0,
            offset: 0,
            prev_sample: 0,
            sample_now: 0,
        }
    }

    /// Active sampling method.
    pub fn sampling_method(&self) -> SamplingMethod {
        self.sampling_method
    }

    /// Clock cycles per output sample, 16.16 fixed point.
    pub fn cycles_per_sample(&self) -> u32 {
        self.cycles_per_sample
    }

    /// Resampling filter in use, if any.
    pub fn fir(&self) -> Option<&FirTable> {
        self.fir.as_deref()
    }

    /// Set sampling parameters. On error the previous parameters are kept.
    ///
    /// # Errors
    /// See [`validate_parameters`].
    pub fn set_parameters(
        &mut self,
        method: SamplingMethod,
        clock_freq: u32,
        sample_freq: u32,
    ) -> Result<(), ConfigError> {
        validate_parameters(method, clock_freq, sample_freq)?;
        self.configure(method, clock_freq, sample_freq);
        Ok(())
    }

    /// Apply parameters that are already known to be valid.
    pub(crate) fn configure(&mut self, method: SamplingMethod, clock_freq: u32, sample_freq: u32) {
        self.cycles_per_sample =
            (clock_freq as f64 / sample_freq as f64 * (1 << FIXP_SHIFT) as f64 + 0.5) as u32;
        self.sampling_method = method;
        self.fir = if method.is_resampling() {
            FirKey::new(method, clock_freq, sample_freq)
                .ok()
                .map(cache::fir_table)
        } else {
            None
        };
        self.clear();
    }

    fn clear(&mut self) {
        self.ring.fill(0);
        self.ring_pos = 0;
        self.offset = 0;
        self.prev_sample = 0;
        self.sample_now = 0;
    }

    /// Reset sampler and underlying synth/filter state.
    pub fn reset(&mut self) {
        self.synth.reset();
        self.clear();
    }

    /// Clock the sampler for `delta` SID cycles, writing interleaved audio
    /// samples.
    ///
    /// Returns the number of samples written and the number of cycles left
    /// unclocked because the buffer filled up.
    pub fn clock(&mut self, mut delta: u32, buffer: &mut [i16], interleave: usize) -> (usize, u32) {
        // Decimation takes the cycle nearest to the sample position, the
        // other methods the one at or after it.
        let nearest = self.sampling_method == SamplingMethod::Fast;
        let capacity = if interleave == 0 {
            0
        } else {
            buffer.len().div_ceil(interleave)
        };
        let fir = self.fir.clone();
        let mut written = 0;
        loop {
            let mut next = self.offset + self.cycles_per_sample as i32;
            if nearest {
                next += HALF_CYCLE;
            }
            let cycles = (next >> FIXP_SHIFT) as u32;
            if cycles > delta || written >= capacity {
                break;
            }
            self.run(cycles);
            delta -= cycles;
            self.offset = next & FIXP_MASK;
            if nearest {
                self.offset -= HALF_CYCLE;
            }
            buffer[written * interleave] = self.sample(fir.as_deref());
            written += 1;
        }
        if delta > 0 && written < capacity {
            self.run(delta);
            self.offset -= (delta as i32) << FIXP_SHIFT;
            (written, 0)
        } else {
            (written, delta)
        }
    }

    /// Clock the chip, recording whatever the active method samples from.
    #[inline]
    fn run(&mut self, cycles: u32) {
        match self.sampling_method {
            SamplingMethod::Fast => self.synth.clock_delta(cycles),
            SamplingMethod::Interpolate => {
                for i in (1..=cycles).rev() {
                    self.synth.clock();
                    if i <= 2 {
                        self.prev_sample = self.sample_now;
                        self.sample_now = self.synth.output();
                    }
                }
            }
            SamplingMethod::Resample | SamplingMethod::ResampleFast => {
                for _ in 0..cycles {
                    self.synth.clock();
                    let output = self.synth.output();
                    self.ring[self.ring_pos] = output;
                    self.ring[self.ring_pos + RING_SIZE] = output;
                    self.ring_pos = (self.ring_pos + 1) & RING_MASK;
                }
            }
        }
    }

    /// Output sample at the current offset.
    #[inline]
    fn sample(&self, fir: Option<&FirTable>) -> i16 {
        match (self.sampling_method, fir) {
            (SamplingMethod::Interpolate, _) => {
                let prev = self.prev_sample as i64;
                let now = self.sample_now as i64;
                (prev + ((self.offset as i64 * (now - prev)) >> FIXP_SHIFT)) as i16
            }
            (SamplingMethod::Resample | SamplingMethod::ResampleFast, Some(fir)) => {
                soft_clip(self.convolve(fir) >> FIR_SHIFT)
            }
            _ => self.synth.output(),
        }
    }

    /// Filter the ring at the current offset, blending the two nearest
    /// phases when the table is interpolated.
    #[inline]
    fn convolve(&self, fir: &FirTable) -> i32 {
        let taps = fir.taps();
        let position = self.offset as i64 * fir.phases() as i64;
        let phase = (position >> FIXP_SHIFT) as usize;
        let start = self.ring_pos + RING_SIZE - taps;
        let v1 = self.compute_convolution_fir(&self.ring[start..start + taps], fir.phase(phase));
        if self.sampling_method == SamplingMethod::ResampleFast {
            return v1;
        }

        // The phase after the last one is phase 0 one sample earlier.
        let (next_phase, next_start) = if phase + 1 == fir.phases() {
            (0, start - 1)
        } else {
            (phase + 1, start)
        };
        let v2 = self.compute_convolution_fir(
            &self.ring[next_start..next_start + taps],
            fir.phase(next_phase),
        );
        let fraction = position & FIXP_MASK as i64;
        v1 + ((fraction * (v2 as i64 - v1 as i64)) >> FIXP_SHIFT) as i32
    }

    /// Dispatches to AVX2 intrinsics if available, wide_256 for SSE2, otherwise fallback.
    #[inline]
    pub fn compute_convolution_fir(&self, sample: &[i16], fir: &[i16]) -> i32 {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if self.use_avx2 {
                return unsafe { self.compute_convolution_fir_avx2(sample, fir) };
            }
            if self.use_sse2 {
                return self.compute_convolution_fir_wide_256(sample, fir);
            }
        }
        self.compute_convolution_fir_fallback(sample, fir)
    }

    /// LLVM auto-vectorizes this well on SSE/NEON.
    #[inline]
    pub fn compute_convolution_fir_fallback(&self, sample: &[i16], fir: &[i16]) -> i32 {
        let len = sample.len().min(fir.len());
        sample[..len]
            .iter()
            .zip(&fir[..len])
            .fold(0, |sum, (&s, &f)| sum + (s as i32 * f as i32))
    }

    /// Uses wide crate for portable SIMD; emits vpmaddwd on AVX2.
    #[inline]
    pub fn compute_convolution_fir_wide_256(&self, sample: &[i16], fir: &[i16]) -> i32 {
        let len = sample.len().min(fir.len());
        let mut ss = &sample[..len];
        let mut fs = &fir[..len];

        // 4 accumulators hide instruction latency
        let mut v1 = i32x8::ZERO;
        let mut v2 = i32x8::ZERO;
        let mut v3 = i32x8::ZERO;
        let mut v4 = i32x8::ZERO;

        while ss.len() >= 64 {
            let sv1 = i16x16::from(&ss[0..16]);
            let sv2 = i16x16::from(&ss[16..32]);
            let sv3 = i16x16::from(&ss[32..48]);
            let sv4 = i16x16::from(&ss[48..64]);
            let fv1 = i16x16::from(&fs[0..16]);
            let fv2 = i16x16::from(&fs[16..32]);
            let fv3 = i16x16::from(&fs[32..48]);
            let fv4 = i16x16::from(&fs[48..64]);

            v1 += sv1.dot(fv1);
            v2 += sv2.dot(fv2);
            v3 += sv3.dot(fv3);
            v4 += sv4.dot(fv4);

            ss = &ss[64..];
            fs = &fs[64..];
        }

        let combined = v1 + v2 + v3 + v4;
        let mut v = combined.reduce_add();

        for i in 0..ss.len() {
            v += ss[i] as i32 * fs[i] as i32;
        }
        v
    }

    /// AVX2 dot product.
    ///
    /// # Safety
    /// The CPU must support AVX2.
    #[target_feature(enable = "avx2")]
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub unsafe fn compute_convolution_fir_avx2(&self, sample: &[i16], fir: &[i16]) -> i32 {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::*;
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::*;

        let len = sample.len().min(fir.len());
        let mut fs = &fir[..len];
        let mut ss = &sample[..len];
        // 4 accumulators hide instruction latency
        let mut v1 = _mm256_set1_epi32(0);
        let mut v2 = _mm256_set1_epi32(0);
        let mut v3 = _mm256_set1_epi32(0);
        let mut v4 = _mm256_set1_epi32(0);
        while fs.len() >= 64 {
            let sv1 = _mm256_loadu_si256(ss.as_ptr() as *const _);
            let sv2 = _mm256_loadu_si256((&ss[16..]).as_ptr() as *const _);
            let sv3 = _mm256_loadu_si256((&ss[32..]).as_ptr() as *const _);
            let sv4 = _mm256_loadu_si256((&ss[48..]).as_ptr() as *const _);
            let fv1 = _mm256_loadu_si256(fs.as_ptr() as *const _);
            let fv2 = _mm256_loadu_si256((&fs[16..]).as_ptr() as *const _);
            let fv3 = _mm256_loadu_si256((&fs[32..]).as_ptr() as *const _);
            let fv4 = _mm256_loadu_si256((&fs[48..]).as_ptr() as *const _);
            let prod1 = _mm256_madd_epi16(sv1, fv1);
            let prod2 = _mm256_madd_epi16(sv2, fv2);
            let prod3 = _mm256_madd_epi16(sv3, fv3);
            let prod4 = _mm256_madd_epi16(sv4, fv4);
            v1 = _mm256_add_epi32(v1, prod1);
            v2 = _mm256_add_epi32(v2, prod2);
            v3 = _mm256_add_epi32(v3, prod3);
            v4 = _mm256_add_epi32(v4, prod4);
            fs = &fs[64..];
            ss = &ss[64..];
        }
        v1 = _mm256_add_epi32(v1, v2);
        v3 = _mm256_add_epi32(v3, v4);
        v1 = _mm256_add_epi32(v1, v3);
        let mut va = [0i32; 8];
        _mm256_storeu_si256(va[..].as_mut_ptr() as *mut _, v1);
        let mut v = va[0] + va[1] + va[2] + va[3] + va[4] + va[5] + va[6] + va[7];
        for i in 0..fs.len() {
            v += ss[i] as i32 * fs[i] as i32;
        }
        v
    }
}
