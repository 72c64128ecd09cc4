//! # Periodic Point Process Module
//!
//! Locates individual glottal cycles in voiced stretches of a clip and
//! measures their cycle-to-cycle perturbation.
//!
//! ## Algorithm
//! 1. Split the pitch contour into runs of consecutive voiced frames
//! 2. In each run, start at the strongest positive peak of the first period
//! 3. Find each next pulse as the lag in [0.8 T, 1.2 T] whose waveform best
//!    cross-correlates with the previous period, refined to sub-sample
//!    precision by parabolic interpolation
//! 4. Record the period length and peak amplitude of every cycle
//!
//! Jitter and shimmer are then the mean absolute difference between
//! consecutive periods (or amplitudes) relative to their mean, counting only
//! pairs that pass the period and amplitude plausibility bounds.

use std::ops::Range;

use anyhow::{Result, bail, ensure};
use tracing::debug;

use crate::audio::AudioSignal;
use crate::config::HealthConfig;
use crate::pitch::PitchContour;

/// Lowest normalized correlation accepted as a continuation of the cycle train.
const MIN_CYCLE_CORRELATION: f32 = 0.3;
/// Search window around the expected next pulse, as fractions of the period.
const SEARCH_LOW: f32 = 0.8;
const SEARCH_HIGH: f32 = 1.2;

/// One glottal cycle: the span between two consecutive pulses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cycle {
    /// Period in seconds.
    pub period: f64,
    /// Peak absolute amplitude inside the cycle.
    pub amplitude: f32,
}

/// Pulses of one uninterrupted voiced stretch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulseTrain {
    /// Pulse positions in (fractional) samples.
    pub positions: Vec<f64>,
    pub cycles: Vec<Cycle>,
}

/// All pulse trains of a clip, one per voiced run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointProcess {
    pub trains: Vec<PulseTrain>,
}

impl PointProcess {
    pub fn pulse_count(&self) -> usize {
        self.trains.iter().map(|t| t.positions.len()).sum()
    }

    pub fn cycle_count(&self) -> usize {
        self.trains.iter().map(|t| t.cycles.len()).sum()
    }
}

/// Local jitter and shimmer of a point process, as fractions (not percent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    pub jitter_local: f64,
    pub shimmer_local: f64,
    pub period_pairs: usize,
    pub amplitude_pairs: usize,
}

/// Sample ranges covered by consecutive voiced frames of a contour.
pub fn voiced_runs(contour: &PitchContour, frame_length: usize, signal_len: usize) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (index, frequency) in contour.frequencies.iter().enumerate() {
        match (frequency.is_some(), start) {
            (true, None) => start = Some(index),
            (false, Some(first)) => {
                runs.push(frame_span(first, index - 1, contour.hop_length, frame_length, signal_len));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(first) = start {
        let last = contour.len() - 1;
        runs.push(frame_span(first, last, contour.hop_length, frame_length, signal_len));
    }
    runs
}

fn frame_span(first: usize, last: usize, hop: usize, frame_length: usize, signal_len: usize) -> Range<usize> {
    let start = (first * hop).min(signal_len);
    let end = (last * hop + frame_length).min(signal_len);
    start..end
}

/// Fundamental frequency governing a sample position: the voiced frame whose
/// centre is nearest, falling back to the nearest voiced frame in the contour.
fn frequency_at(contour: &PitchContour, frame_length: usize, position: f64) -> Option<f32> {
    let centre_offset = frame_length as f64 / 2.0;
    let nearest = ((position - centre_offset) / contour.hop_length as f64).round().max(0.0) as usize;
    let nearest = nearest.min(contour.len().saturating_sub(1));

    if let Some(Some(f)) = contour.frequencies.get(nearest) {
        return Some(*f);
    }
    (1..contour.len()).find_map(|distance| {
        let before = nearest.checked_sub(distance).and_then(|i| contour.frequencies.get(i));
        let after = contour.frequencies.get(nearest + distance);
        before.copied().flatten().or(after.copied().flatten())
    })
}

/// Normalized cross-correlation of `samples[a..a+len]` and `samples[b..b+len]`.
fn normalized_correlation(samples: &[f32], a: usize, b: usize, len: usize) -> f32 {
    let (mut cross, mut energy_a, mut energy_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for k in 0..len {
        let x = f64::from(samples[a + k]);
        let y = f64::from(samples[b + k]);
        cross += x * y;
        energy_a += x * x;
        energy_b += y * y;
    }
    let denominator = (energy_a * energy_b).sqrt();
    if denominator > 0.0 {
        (cross / denominator) as f32
    } else {
        0.0
    }
}

fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
}

/// Tracks glottal pulses through one voiced sample range.
fn track_run(
    samples: &[f32],
    run: Range<usize>,
    contour: &PitchContour,
    frame_length: usize,
    sample_rate: f64,
) -> PulseTrain {
    let mut train = PulseTrain::default();

    let Some(first_f0) = frequency_at(contour, frame_length, run.start as f64) else {
        return train;
    };
    let first_period = (sample_rate / f64::from(first_f0)).round() as usize;
    if first_period == 0 || run.start + first_period > run.end {
        return train;
    }

    // Anchor on the strongest positive peak of the first period.
    let anchor = samples[run.start..run.start + first_period]
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &s)| if s > best.1 { (i, s) } else { best })
        .0;
    let mut position = (run.start + anchor) as f64;
    train.positions.push(position);

    loop {
        let Some(f0) = frequency_at(contour, frame_length, position) else {
            break;
        };
        let period = sample_rate / f64::from(f0);
        let template = position.round() as usize;
        let length = period.round() as usize;
        let lowest = template + (period * f64::from(SEARCH_LOW)).floor() as usize;
        let highest = template + (period * f64::from(SEARCH_HIGH)).ceil() as usize;
        // Every candidate, plus one neighbour for refinement, must fit in the run.
        if length == 0 || highest + 1 + length > run.end || lowest == 0 {
            break;
        }

        let correlations: Vec<f32> = (lowest - 1..=highest + 1)
            .map(|candidate| normalized_correlation(samples, template, candidate, length))
            .collect();
        let (best_offset, best) = correlations[1..correlations.len() - 1]
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &r)| if r > best.1 { (i + 1, r) } else { best });
        if best < MIN_CYCLE_CORRELATION {
            break;
        }

        let y1 = correlations[best_offset - 1];
        let y2 = correlations[best_offset];
        let y3 = correlations[best_offset + 1];
        let curvature = y1 - 2.0 * y2 + y3;
        let shift = if curvature < 0.0 {
            f64::from(((y1 - y3) / (2.0 * curvature)).clamp(-0.5, 0.5))
        } else {
            0.0
        };

        let lag = (lowest - 1 + best_offset) as f64 + shift - template as f64;
        let next = position + lag;
        let cycle_start = template;
        let cycle_end = (next.round() as usize).max(cycle_start + 1);

        train.cycles.push(Cycle {
            period: lag / sample_rate,
            amplitude: peak_amplitude(&samples[cycle_start..cycle_end]),
        });
        train.positions.push(next);
        position = next;
    }
    train
}

/// Builds the periodic point process of a clip from its pitch contour.
///
/// `frame_length` is the window the contour was tracked with.
pub fn periodic_pulses(signal: &AudioSignal, contour: &PitchContour, frame_length: usize) -> PointProcess {
    let sample_rate = f64::from(signal.sample_rate());
    let trains: Vec<PulseTrain> = voiced_runs(contour, frame_length, signal.len())
        .into_iter()
        .map(|run| track_run(signal.samples(), run, contour, frame_length, sample_rate))
        .filter(|train| !train.cycles.is_empty())
        .collect();

    let process = PointProcess { trains };
    debug!(
        trains = process.trains.len(),
        pulses = process.pulse_count(),
        "periodic point process built"
    );
    process
}

/// Local jitter and shimmer over all pulse trains.
///
/// Periods outside `[shortest_period, longest_period]` are measurement
/// artifacts; consecutive periods differing by more than
/// `max_period_factor`, or amplitudes by more than `max_amplitude_factor`,
/// are not compared.
pub fn measure_perturbation(process: &PointProcess, config: &HealthConfig) -> Result<Perturbation> {
    let shortest = f64::from(config.shortest_period);
    let longest = f64::from(config.longest_period);
    let period_factor = f64::from(config.max_period_factor);
    let amplitude_factor = config.max_amplitude_factor;
    let valid = |c: &Cycle| c.period >= shortest && c.period <= longest;

    let (mut period_sum, mut period_count) = (0.0_f64, 0usize);
    let (mut amplitude_sum, mut amplitude_count) = (0.0_f64, 0usize);
    let (mut period_diff, mut period_pairs) = (0.0_f64, 0usize);
    let (mut amplitude_diff, mut amplitude_pairs) = (0.0_f64, 0usize);

    for train in &process.trains {
        for cycle in train.cycles.iter().filter(|c| valid(*c)) {
            period_sum += cycle.period;
            period_count += 1;
            amplitude_sum += f64::from(cycle.amplitude);
            amplitude_count += 1;
        }

        for pair in train.cycles.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if !valid(&a) || !valid(&b) {
                continue;
            }
            if a.period.max(b.period) / a.period.min(b.period) > period_factor {
                continue;
            }
            period_diff += (b.period - a.period).abs();
            period_pairs += 1;

            let (low, high) = (a.amplitude.min(b.amplitude), a.amplitude.max(b.amplitude));
            if low > 0.0 && high / low <= amplitude_factor {
                amplitude_diff += f64::from((b.amplitude - a.amplitude).abs());
                amplitude_pairs += 1;
            }
        }
    }

    if period_pairs == 0 {
        bail!(
            "no consecutive glottal periods within {shortest}..{longest} s ({} cycles found)",
            process.cycle_count()
        );
    }
    ensure!(amplitude_pairs > 0, "no consecutive cycle amplitudes within the amplitude factor");

    let mean_period = period_sum / period_count as f64;
    let mean_amplitude = amplitude_sum / amplitude_count as f64;
    ensure!(mean_period > 0.0 && mean_amplitude > 0.0, "degenerate cycle measurements");

    Ok(Perturbation {
        jitter_local: (period_diff / period_pairs as f64) / mean_period,
        shimmer_local: (amplitude_diff / amplitude_pairs as f64) / mean_amplitude,
        period_pairs,
        amplitude_pairs,
    })
}
