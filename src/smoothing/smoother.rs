use std::num::NonZeroUsize;
use thiserror::Error;
use tracing::trace;

use super::window::SmoothingWindow;
use crate::emotion::{EmotionLabel, Prediction, Probabilities, SmoothedResult, NUM_LABELS};

/// Default number of predictions kept for smoothing
pub const DEFAULT_WINDOW_SIZE: usize = 5;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(DEFAULT_WINDOW_SIZE) {
    Some(n) => n,
    None => panic!("default window size must be non-zero"),
};

/// Errors raised when constructing a smoother
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SmootherError {
    #[error("Invalid smoothing window size {0}: must be at least 1")]
    InvalidWindowSize(usize),
}

/// Temporal smoothing of per-frame predictions.
///
/// Keeps the last N predictions and reports the majority label together with
/// the mean probability vector. Majority ties go to the label whose first
/// occurrence, scanning oldest to newest, comes earliest.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    window: SmoothingWindow<Prediction>,
}

impl TemporalSmoother {
    pub fn new(window_size: usize) -> Result<Self, SmootherError> {
        let capacity =
            NonZeroUsize::new(window_size).ok_or(SmootherError::InvalidWindowSize(window_size))?;
        Ok(Self {
            window: SmoothingWindow::new(capacity),
        })
    }

    /// Record a new prediction, evicting the oldest one when the window is full
    pub fn update(&mut self, prediction: Prediction) {
        if let Some(evicted) = self.window.push(prediction) {
            trace!("Evicted {} from smoothing window", evicted.label());
        }
    }

    /// Current smoothed prediction, or `None` before the first update
    pub fn smoothed(&self) -> Option<SmoothedResult> {
        if self.window.is_empty() {
            return None;
        }

        Some(SmoothedResult {
            label: self.majority_label()?,
            probabilities: self.mean_probabilities(),
        })
    }

    fn majority_label(&self) -> Option<EmotionLabel> {
        let mut counts = [0usize; NUM_LABELS];
        let mut first_seen = [usize::MAX; NUM_LABELS];

        for (position, prediction) in self.window.iter().enumerate() {
            let idx = prediction.label().index();
            counts[idx] += 1;
            if first_seen[idx] == usize::MAX {
                first_seen[idx] = position;
            }
        }

        (0..NUM_LABELS)
            .filter(|&idx| counts[idx] > 0)
            .max_by(|&a, &b| {
                counts[a]
                    .cmp(&counts[b])
                    // earlier first occurrence wins, so reverse the position ordering
                    .then_with(|| first_seen[b].cmp(&first_seen[a]))
            })
            .and_then(EmotionLabel::from_index)
    }

    fn mean_probabilities(&self) -> Probabilities {
        let mut sums = [0.0f32; NUM_LABELS];
        for prediction in self.window.iter() {
            for (sum, p) in sums.iter_mut().zip(prediction.probabilities()) {
                *sum += *p;
            }
        }

        let n = self.window.len() as f32;
        sums.map(|sum| sum / n)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Drop all stored predictions
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self {
            window: SmoothingWindow::new(DEFAULT_CAPACITY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EmotionLabel::*;

    fn pred(label: EmotionLabel) -> Prediction {
        let mut probs = [0.0; NUM_LABELS];
        probs[label.index()] = 1.0;
        Prediction::new(label, probs)
    }

    #[test]
    fn test_zero_window_rejected() {
        assert_eq!(
            TemporalSmoother::new(0).unwrap_err(),
            SmootherError::InvalidWindowSize(0)
        );
    }

    #[test]
    fn test_default_window_size() {
        let smoother = TemporalSmoother::default();
        assert_eq!(smoother.capacity(), DEFAULT_WINDOW_SIZE);
        assert!(smoother.is_empty());
    }

    #[test]
    fn test_smoothed_empty_is_none() {
        let smoother = TemporalSmoother::new(5).unwrap();
        assert!(smoother.smoothed().is_none());
    }

    #[test]
    fn test_majority_vote() {
        let mut smoother = TemporalSmoother::new(5).unwrap();
        for label in [Aggressive, Aggressive, LazyNervous, Aggressive, Normal] {
            smoother.update(pred(label));
        }
        assert_eq!(smoother.smoothed().unwrap().label, Aggressive);
    }

    #[test]
    fn test_tie_goes_to_first_occurrence() {
        let mut smoother = TemporalSmoother::new(4).unwrap();
        for label in [TiredSleepy, Aggressive, Aggressive, TiredSleepy] {
            smoother.update(pred(label));
        }
        assert_eq!(smoother.smoothed().unwrap().label, TiredSleepy);

        // Evicting the leading TiredSleepy makes Aggressive the earliest
        smoother.update(pred(Normal));
        assert_eq!(smoother.smoothed().unwrap().label, Aggressive);
    }

    #[test]
    fn test_mean_probabilities() {
        let mut smoother = TemporalSmoother::new(5).unwrap();
        smoother.update(Prediction::from_probabilities([0.8, 0.1, 0.05, 0.05]));
        smoother.update(Prediction::from_probabilities([0.0, 0.0, 1.0, 0.0]));

        let result = smoother.smoothed().unwrap();
        let expected = [0.4, 0.05, 0.525, 0.025];
        for (got, want) in result.probabilities.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "got {}, want {}", got, want);
        }
    }

    #[test]
    fn test_mean_only_covers_window() {
        let mut smoother = TemporalSmoother::new(2).unwrap();
        smoother.update(pred(Aggressive));
        smoother.update(pred(Normal));
        smoother.update(pred(Normal));

        let result = smoother.smoothed().unwrap();
        assert_eq!(result.label, Normal);
        assert_eq!(result.probabilities, [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_smoothed_is_idempotent() {
        let mut smoother = TemporalSmoother::new(3).unwrap();
        smoother.update(Prediction::from_probabilities([0.3, 0.3, 0.2, 0.2]));
        smoother.update(Prediction::from_probabilities([0.1, 0.7, 0.1, 0.1]));

        let first = smoother.smoothed().unwrap();
        let second = smoother.smoothed().unwrap();
        assert_eq!(first.label, second.label);
        for (a, b) in first.probabilities.iter().zip(second.probabilities.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_len_tracks_updates() {
        let mut smoother = TemporalSmoother::new(3).unwrap();
        for i in 0..6 {
            smoother.update(pred(Normal));
            assert_eq!(smoother.len(), (i + 1).min(3));
        }
    }

    #[test]
    fn test_reset() {
        let mut smoother = TemporalSmoother::new(3).unwrap();
        smoother.update(pred(Normal));
        smoother.reset();
        assert!(smoother.smoothed().is_none());
        assert_eq!(smoother.capacity(), 3);
    }
}
