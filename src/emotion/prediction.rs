use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::label::{EmotionLabel, NUM_LABELS};

/// Slack allowed on softmax output bounds and sum
const PROBABILITY_TOLERANCE: f32 = 1e-3;

/// Probability vector in `EmotionLabel::ALL` order
pub type Probabilities = [f32; NUM_LABELS];

/// Single-frame classification result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    label: EmotionLabel,
    probabilities: Probabilities,
}

impl Prediction {
    /// Create a prediction with an externally decided label
    pub fn new(label: EmotionLabel, probabilities: Probabilities) -> Self {
        Self {
            label,
            probabilities,
        }
    }

    /// Create a prediction whose label is the arg-max of `probabilities`.
    /// Equal maxima resolve to the lowest index.
    pub fn from_probabilities(probabilities: Probabilities) -> Self {
        let label = EmotionLabel::ALL[argmax(&probabilities)];
        Self::new(label, probabilities)
    }

    /// Build from raw model output. Returns `None` unless the output is a
    /// probability vector: one score per label, each in [0, 1], summing to 1.
    /// Logits or unnormalised heads are rejected, not softmaxed.
    pub fn from_scores(scores: &[f32]) -> Option<Self> {
        if scores.len() != NUM_LABELS {
            return None;
        }
        if scores
            .iter()
            .any(|s| !s.is_finite() || *s < -PROBABILITY_TOLERANCE || *s > 1.0 + PROBABILITY_TOLERANCE)
        {
            return None;
        }
        let sum: f32 = scores.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return None;
        }
        let mut probabilities = [0.0f32; NUM_LABELS];
        probabilities.copy_from_slice(scores);
        Some(Self::from_probabilities(probabilities))
    }

    pub fn label(&self) -> EmotionLabel {
        self.label
    }

    pub fn probabilities(&self) -> &Probabilities {
        &self.probabilities
    }

    /// Highest class probability
    pub fn confidence(&self) -> f32 {
        self.probabilities[argmax(&self.probabilities)]
    }

    pub fn probability_map(&self) -> BTreeMap<EmotionLabel, f32> {
        probability_map(&self.probabilities)
    }
}

/// Smoothed prediction derived from a window of recent predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedResult {
    pub label: EmotionLabel,
    pub probabilities: Probabilities,
}

impl SmoothedResult {
    pub fn probability_map(&self) -> BTreeMap<EmotionLabel, f32> {
        probability_map(&self.probabilities)
    }
}

fn argmax(values: &Probabilities) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn probability_map(values: &Probabilities) -> BTreeMap<EmotionLabel, f32> {
    EmotionLabel::ALL
        .iter()
        .map(|label| (*label, values[label.index()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_is_argmax() {
        let p = Prediction::from_probabilities([0.1, 0.2, 0.6, 0.1]);
        assert_eq!(p.label(), EmotionLabel::Normal);
        assert!((p.confidence() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_tie_takes_lowest_index() {
        let p = Prediction::from_probabilities([0.1, 0.4, 0.1, 0.4]);
        assert_eq!(p.label(), EmotionLabel::LazyNervous);
    }

    #[test]
    fn test_from_scores_rejects_bad_output() {
        assert!(Prediction::from_scores(&[0.5, 0.5]).is_none());
        assert!(Prediction::from_scores(&[0.1, 0.2, 0.3, 0.2, 0.2]).is_none());
        assert!(Prediction::from_scores(&[0.1, f32::NAN, 0.3, 0.6]).is_none());

        let p = Prediction::from_scores(&[0.7, 0.1, 0.1, 0.1]).unwrap();
        assert_eq!(p.label(), EmotionLabel::Aggressive);
    }

    #[test]
    fn test_from_scores_rejects_logits() {
        assert!(Prediction::from_scores(&[2.0, -1.0, 0.5, 3.0]).is_none());
        // In range but not normalised
        assert!(Prediction::from_scores(&[0.9, 0.9, 0.1, 0.1]).is_none());
        assert!(Prediction::from_scores(&[0.1, 0.1, 0.1, 0.1]).is_none());
        assert!(Prediction::from_scores(&[1.2, -0.2, 0.0, 0.0]).is_none());

        // Float rounding in a softmax head is tolerated
        let p = Prediction::from_scores(&[0.25, 0.25, 0.25, 0.2501]).unwrap();
        assert_eq!(p.label(), EmotionLabel::TiredSleepy);
    }

    #[test]
    fn test_probability_map_in_label_order() {
        let p = Prediction::from_probabilities([0.1, 0.2, 0.3, 0.4]);
        let json = serde_json::to_string(&p.probability_map()).unwrap();
        assert!(json.starts_with("{\"aggressive\":0.1"));
        assert!(json.contains("\"tired_sleepy\":0.4"));
    }
}
