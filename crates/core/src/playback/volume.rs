//! Live mouth-volume signal: a smoothed byte spectrum of the audio around the
//! playback position, averaged and normalized to `[0, 1]`.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const FFT_SIZE: usize = 256;
pub const SMOOTHING: f32 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;
/// Average byte level that maps to full volume.
pub const VOLUME_NORMALIZATION: f64 = 40.0;
pub const VOLUME_SAMPLE_INTERVAL: Duration = Duration::from_millis(16);

/// Latest volume in `[0, 1]`, shared between the tracker and renderers.
#[derive(Clone, Debug, Default)]
pub struct LiveVolume(Arc<AtomicU32>);

impl LiveVolume {
    pub fn get(&self) -> f64 {
        f64::from(f32::from_bits(self.0.load(Ordering::Relaxed)))
    }

    pub fn set(&self, value: f64) {
        self.0.store((value as f32).to_bits(), Ordering::Relaxed);
    }
}

fn blackman(n: usize) -> Vec<f32> {
    let len = n as f32;
    (0..n)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / len;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

fn magnitude(c: Complex<f32>) -> f32 {
    (c.re * c.re + c.im * c.im).sqrt()
}

pub struct VolumeAnalyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl VolumeAnalyser {
    pub fn new() -> Self {
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);
        Self {
            fft,
            window: blackman(FFT_SIZE),
            smoothed: vec![0.0; FFT_SIZE / 2],
            scratch: vec![Complex::default(); FFT_SIZE],
        }
    }

    /// Byte spectrum (`0..=255` per bin) of the block ending at `end`.
    /// Samples before the start of the buffer count as silence.
    pub fn byte_spectrum(&mut self, samples: &[f32], end: usize) -> Vec<u8> {
        let end = end.min(samples.len());
        let start = end.saturating_sub(FFT_SIZE);
        let block = &samples[start..end];
        let pad = FFT_SIZE - block.len();

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { block[i - pad] };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        self.smoothed
            .iter_mut()
            .zip(&self.scratch)
            .map(|(prev, bin)| {
                let mag = magnitude(*bin) / FFT_SIZE as f32;
                *prev = SMOOTHING * *prev + (1.0 - SMOOTHING) * mag;
                let db = 20.0 * prev.log10();
                let scaled = 255.0 / range * (db - MIN_DECIBELS);
                if scaled.is_nan() {
                    0
                } else {
                    scaled.clamp(0.0, 255.0) as u8
                }
            })
            .collect()
    }

    /// Volume in `[0, 1]` for the block ending at `end`.
    pub fn volume(&mut self, samples: &[f32], end: usize) -> f64 {
        let bins = self.byte_spectrum(samples, end);
        let sum: u32 = bins.iter().map(|b| u32::from(*b)).sum();
        let average = f64::from(sum) / bins.len() as f64;
        (average / VOLUME_NORMALIZATION).clamp(0.0, 1.0)
    }
}

impl Default for VolumeAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize, amplitude: f32) -> Vec<f32> {
        // deterministic broadband signal
        let mut x: u32 = 12345;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
                amplitude * ((x >> 16) as f32 / 32768.0 - 1.0)
            })
            .collect()
    }

    #[test]
    fn silence_is_zero() {
        let mut a = VolumeAnalyser::new();
        assert_eq!(a.volume(&vec![0.0; 1024], 512), 0.0);
        assert_eq!(a.volume(&[], 0), 0.0);
    }

    #[test]
    fn loud_noise_saturates() {
        let mut a = VolumeAnalyser::new();
        let signal = noise(4096, 0.9);
        let mut v = 0.0;
        for end in (256..4096).step_by(256) {
            v = a.volume(&signal, end);
        }
        assert_eq!(v, 1.0);
    }

    #[test]
    fn smoothing_decays_instead_of_dropping() {
        let mut a = VolumeAnalyser::new();
        let mut signal = noise(2048, 0.9);
        signal.extend(vec![0.0; 2048]);
        for end in (256..=2048).step_by(256) {
            a.volume(&signal, end);
        }
        let after_silence = a.volume(&signal, 2048 + 256);
        assert!(after_silence > 0.0);

        let mut fresh = VolumeAnalyser::new();
        assert_eq!(fresh.volume(&signal, 2048 + 256), 0.0);
    }

    #[test]
    fn live_volume_round_trips_through_bits() {
        let v = LiveVolume::default();
        assert_eq!(v.get(), 0.0);
        v.set(0.5);
        assert_eq!(v.get(), 0.5);
        let shared = v.clone();
        shared.set(0.25);
        assert_eq!(v.get(), 0.25);
    }
}
