//! # Fast Fourier Transform (FFT) Module
//!
//! FFT-backed correlation for the pitch tracker. Computing the YIN difference
//! function directly costs `O(window × lags)` per frame; going through the
//! frequency domain brings that down to a few FFTs per frame.
//!
//! ## Features
//! - Windowed cross-correlation of a frame with its own leading window
//! - FFT plans built once per analysis call and reused across frames
//! - DC offset removal for correlation-based measurements

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
///
/// # Arguments
/// * `signal` - Audio signal to process (modified in-place)
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Correlates the first `window` samples of a frame against the whole frame.
///
/// The transforms are planned once for a given frame length; a correlator
/// is owned by a single analysis call and never shared.
pub struct WindowCorrelator {
    frame_length: usize,
    window: usize,
    fft_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    frame_buffer: Vec<Complex<f32>>,
    window_buffer: Vec<Complex<f32>>,
}

impl WindowCorrelator {
    /// Plans the transforms for frames of `frame_length` samples correlated
    /// against their first `window` samples.
    pub fn new(frame_length: usize, window: usize) -> Self {
        let window = window.min(frame_length);
        // Large enough that circular correlation never wraps for valid lags.
        let fft_size = (frame_length + window).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            frame_length,
            window,
            fft_size,
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            frame_buffer: vec![Complex::default(); fft_size],
            window_buffer: vec![Complex::default(); fft_size],
        }
    }

    /// Highest lag the correlation is defined for.
    pub fn max_lag(&self) -> usize {
        self.frame_length - self.window
    }

    /// Computes `r[tau] = Σ_{j < window} frame[j] · frame[j + tau]` for
    /// `tau` in `0..=max_lag()`, writing into `out`.
    ///
    /// `frame` must be `frame_length` samples long.
    pub fn correlate(&mut self, frame: &[f32], out: &mut Vec<f32>) {
        debug_assert_eq!(frame.len(), self.frame_length);

        for (slot, i) in self.frame_buffer.iter_mut().zip(0..) {
            let sample = if i < frame.len() { frame[i] } else { 0.0 };
            *slot = Complex { re: sample, im: 0.0 };
        }
        for (slot, i) in self.window_buffer.iter_mut().zip(0..) {
            let sample = if i < self.window { frame[i] } else { 0.0 };
            *slot = Complex { re: sample, im: 0.0 };
        }

        self.forward.process(&mut self.frame_buffer);
        self.forward.process(&mut self.window_buffer);

        for (x, a) in self.frame_buffer.iter_mut().zip(self.window_buffer.iter()) {
            *x *= a.conj();
        }
        self.inverse.process(&mut self.frame_buffer);

        let scale = 1.0 / self.fft_size as f32;
        out.clear();
        out.extend(
            self.frame_buffer
                .iter()
                .take(self.max_lag() + 1)
                .map(|c| c.re * scale),
        );
    }
}
