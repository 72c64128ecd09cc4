//! # Sequence Alignment Module
//!
//! Dynamic time warping between two frame series. Singers never reproduce an
//! exercise's tempo exactly, so user and target curves are aligned with
//! local stretching and compression while keeping sequence order.
//!
//! Scoring code only sees the [`SequenceAligner`] interface:
//! `(series_a, series_b, cost) -> (distance, path)`. Two implementations
//! exist, the classic full-matrix DTW and a Sakoe-Chiba banded variant.

use crate::config::AlignmentConfig;

/// Minimum-cost monotonic alignment of two series.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Accumulated cost along the path.
    pub distance: f32,
    /// `(index_a, index_b)` pairs from `(0, 0)` to `(len_a - 1, len_b - 1)`,
    /// non-decreasing in both coordinates.
    pub path: Vec<(usize, usize)>,
}

/// Aligns two series under a per-frame cost function.
pub trait SequenceAligner {
    /// Returns `None` when either series is empty or no path exists.
    fn align<F>(&self, a: &[f32], b: &[f32], cost: F) -> Option<Alignment>
    where
        F: Fn(f32, f32) -> f32;
}

/// Backtracking step stored per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    Diagonal,
    Up,
    Left,
}

/// Classic O(n·m) dynamic time warping with unit step weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullDtw;

/// DTW restricted to a band of cells around the (rescaled) diagonal.
///
/// The effective radius is widened to at least the length ratio of the two
/// series so the band always contains a connected path.
#[derive(Debug, Clone, Copy)]
pub struct BandedDtw {
    pub radius: usize,
}

/// Either aligner, chosen by configuration.
#[derive(Debug, Clone, Copy)]
pub enum Dtw {
    Full(FullDtw),
    Banded(BandedDtw),
}

impl Dtw {
    pub fn from_config(config: &AlignmentConfig) -> Self {
        match *config {
            AlignmentConfig::Full => Self::Full(FullDtw),
            AlignmentConfig::Banded { radius } => Self::Banded(BandedDtw { radius }),
        }
    }
}

impl SequenceAligner for Dtw {
    fn align<F>(&self, a: &[f32], b: &[f32], cost: F) -> Option<Alignment>
    where
        F: Fn(f32, f32) -> f32,
    {
        match self {
            Self::Full(dtw) => dtw.align(a, b, cost),
            Self::Banded(dtw) => dtw.align(a, b, cost),
        }
    }
}

impl SequenceAligner for FullDtw {
    fn align<F>(&self, a: &[f32], b: &[f32], cost: F) -> Option<Alignment>
    where
        F: Fn(f32, f32) -> f32,
    {
        accumulate(a, b, cost, |_| 0..b.len())
    }
}

impl SequenceAligner for BandedDtw {
    fn align<F>(&self, a: &[f32], b: &[f32], cost: F) -> Option<Alignment>
    where
        F: Fn(f32, f32) -> f32,
    {
        let (n, m) = (a.len(), b.len());
        if n == 0 || m == 0 {
            return None;
        }
        let ratio = (m as f64 / n as f64).max(n as f64 / m as f64).ceil() as usize;
        let radius = self.radius.max(ratio);
        let slope = if n > 1 {
            (m - 1) as f64 / (n - 1) as f64
        } else {
            0.0
        };

        accumulate(a, b, cost, |i| {
            let center = (i as f64 * slope).round() as usize;
            let start = center.saturating_sub(radius);
            let end = center.saturating_add(radius).saturating_add(1).min(m);
            start..end
        })
    }
}

/// Fills the accumulated cost matrix over the cells `band(i)` of every row
/// and backtracks the optimal path.
///
/// Ties prefer the diagonal, then the step in `a`, then the step in `b`.
fn accumulate<F, B>(a: &[f32], b: &[f32], cost: F, band: B) -> Option<Alignment>
where
    F: Fn(f32, f32) -> f32,
    B: Fn(usize) -> std::ops::Range<usize>,
{
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return None;
    }

    let mut total = vec![f32::INFINITY; n * m];
    let mut steps = vec![Step::Start; n * m];
    let at = |i: usize, j: usize| i * m + j;

    for i in 0..n {
        for j in band(i) {
            let local = cost(a[i], b[j]);
            let (best, step) = if i == 0 && j == 0 {
                (0.0, Step::Start)
            } else {
                let diagonal = if i > 0 && j > 0 { total[at(i - 1, j - 1)] } else { f32::INFINITY };
                let up = if i > 0 { total[at(i - 1, j)] } else { f32::INFINITY };
                let left = if j > 0 { total[at(i, j - 1)] } else { f32::INFINITY };

                if diagonal <= up && diagonal <= left {
                    (diagonal, Step::Diagonal)
                } else if up <= left {
                    (up, Step::Up)
                } else {
                    (left, Step::Left)
                }
            };
            total[at(i, j)] = best + local;
            steps[at(i, j)] = step;
        }
    }

    let distance = total[at(n - 1, m - 1)];
    if !distance.is_finite() {
        return None;
    }

    let mut path = Vec::with_capacity(n + m);
    let (mut i, mut j) = (n - 1, m - 1);
    loop {
        path.push((i, j));
        match steps[at(i, j)] {
            Step::Start => break,
            Step::Diagonal => {
                i -= 1;
                j -= 1;
            }
            Step::Up => i -= 1,
            Step::Left => j -= 1,
        }
    }
    path.reverse();

    Some(Alignment { distance, path })
}

/// Absolute difference, the per-frame cost used for pitch curves.
pub fn absolute_difference(a: f32, b: f32) -> f32 {
    (a - b).abs()
}
