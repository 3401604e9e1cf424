//! Random window selection for the feature extractor
//!
//! A series of length `k * time_len` is cut into `k` non-overlapping windows.
//! Each call shuffles the window indices and keeps a prefix of random length
//! `off` in `[1, k]`; the embedding is the mean over that subset.

use rand::{seq::SliceRandom, Rng};

use crate::utils::error::{DannError, Result};

/// Windows selected for one forward call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    /// Total number of windows in the series
    pub num_windows: usize,
    /// Window indices to evaluate, in sampled order
    pub selected: Vec<usize>,
}

impl WindowPlan {
    /// Number of sampled windows (`off`)
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Time range covered by window `index`
    pub fn range(&self, index: usize, time_len: usize) -> std::ops::Range<usize> {
        index * time_len..(index + 1) * time_len
    }
}

/// Splits a series into windows and samples a random subset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSampler {
    time_len: usize,
}

impl WindowSampler {
    pub fn new(time_len: usize) -> Self {
        Self { time_len }
    }

    pub fn time_len(&self) -> usize {
        self.time_len
    }

    /// Number of whole windows in `series_len`, rejecting partial windows
    pub fn num_windows(&self, series_len: usize) -> Result<usize> {
        if self.time_len == 0 || series_len % self.time_len != 0 {
            return Err(DannError::ShapeMismatch {
                context: "series windowing".to_string(),
                shape: vec![series_len],
                expected: format!("a length divisible by the window length {}", self.time_len),
            });
        }
        let count = series_len / self.time_len;
        if count == 0 {
            return Err(DannError::ShapeMismatch {
                context: "series windowing".to_string(),
                shape: vec![series_len],
                expected: format!("at least one window of length {}", self.time_len),
            });
        }
        Ok(count)
    }

    /// Shuffle window indices and keep a random, non-empty prefix
    pub fn plan<R: Rng + ?Sized>(&self, series_len: usize, rng: &mut R) -> Result<WindowPlan> {
        let num_windows = self.num_windows(series_len)?;

        let mut indices: Vec<usize> = (0..num_windows).collect();
        indices.shuffle(rng);
        let off = rng.gen_range(1..=num_windows);
        indices.truncate(off);

        Ok(WindowPlan {
            num_windows,
            selected: indices,
        })
    }
}
