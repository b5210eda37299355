use std::collections::BTreeMap;

use crate::emotion::{EmotionLabel, NUM_LABELS};

/// Running count of smoothed labels across one video
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmotionTally {
    counts: [u64; NUM_LABELS],
    sampled: u64,
}

impl EmotionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one sampled frame whose smoothed label is `label`
    pub fn record(&mut self, label: EmotionLabel) {
        self.counts[label.index()] += 1;
        self.sampled += 1;
    }

    pub fn count(&self, label: EmotionLabel) -> u64 {
        self.counts[label.index()]
    }

    pub fn sampled_frames(&self) -> u64 {
        self.sampled
    }

    /// Label with the highest count. Equal counts resolve to the label that
    /// comes first in `EmotionLabel::ALL`. `None` when nothing was sampled.
    pub fn dominant(&self) -> Option<EmotionLabel> {
        if self.sampled == 0 {
            return None;
        }
        let mut best = EmotionLabel::ALL[0];
        for label in EmotionLabel::ALL.iter().skip(1) {
            if self.count(*label) > self.count(best) {
                best = *label;
            }
        }
        Some(best)
    }

    /// Share of sampled frames per label, in percent. All zeros when nothing was sampled.
    pub fn distribution(&self) -> BTreeMap<EmotionLabel, f64> {
        EmotionLabel::ALL
            .iter()
            .map(|label| {
                let pct = if self.sampled > 0 {
                    self.count(*label) as f64 / self.sampled as f64 * 100.0
                } else {
                    0.0
                };
                (*label, pct)
            })
            .collect()
    }
}
