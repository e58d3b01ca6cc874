//! Optional coarse FFT magnitude tap over decoded PCM, for embedders that want a spectrum meter.
//!
//! Not part of the playback path: nothing here touches `AudioPipeline`'s state machine. A host
//! feeds it whatever interleaved PCM it receives from [`crate::delegate::PipelineDelegate::samples_available`].

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Forward-FFT magnitude tap over interleaved `i16` PCM, fixed at construction time to one
/// transform size.
pub struct SpectrumTap {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    channels: u16,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumTap {
    /// `size` should be a power of two; Hann-windowed to reduce spectral leakage from
    /// buffer-boundary discontinuities.
    pub fn new(size: usize, channels: u16) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(size);
        let window = hann_window(size);
        Self {
            fft,
            size,
            channels: channels.max(1),
            window,
            scratch: vec![Complex::new(0.0, 0.0); size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Mixes `samples` down to mono, windows, and returns magnitude per bin (DC to Nyquist
    /// inclusive). Pads with silence if fewer than `size` frames are available; truncates if
    /// more.
    pub fn magnitudes(&mut self, samples: &[i16]) -> Vec<f32> {
        let channels = self.channels as usize;
        let frames = samples.len() / channels;

        for (i, bin) in self.scratch.iter_mut().enumerate() {
            let sample = if i < frames {
                let base = i * channels;
                let sum: i32 = samples[base..base + channels].iter().map(|&s| s as i32).sum();
                (sum as f32 / channels as f32) / i16::MAX as f32
            } else {
                0.0
            };
            let windowed = if i < self.window.len() {
                sample * self.window[i]
            } else {
                0.0
            };
            *bin = Complex::new(windowed, 0.0);
        }

        self.fft.process(&mut self.scratch);

        self.scratch[..self.size / 2 + 1]
            .iter()
            .map(|c| c.norm())
            .collect()
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos())
        })
        .collect()
}
