use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of emotion classes produced by the face model
pub const NUM_LABELS: usize = 4;

/// Emotion class predicted for a frame.
///
/// Variant order is the model's output order and is relied on for
/// arg-max, tie-breaking and serialized map ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Aggressive,
    LazyNervous,
    Normal,
    TiredSleepy,
}

impl EmotionLabel {
    /// All labels in model output order
    pub const ALL: [EmotionLabel; NUM_LABELS] = [
        EmotionLabel::Aggressive,
        EmotionLabel::LazyNervous,
        EmotionLabel::Normal,
        EmotionLabel::TiredSleepy,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Aggressive => 0,
            Self::LazyNervous => 1,
            Self::Normal => 2,
            Self::TiredSleepy => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::LazyNervous => "lazy_nervous",
            Self::Normal => "normal",
            Self::TiredSleepy => "tired_sleepy",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmotionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aggressive" => Ok(Self::Aggressive),
            "lazy_nervous" => Ok(Self::LazyNervous),
            "normal" => Ok(Self::Normal),
            "tired_sleepy" => Ok(Self::TiredSleepy),
            _ => Err(format!("Unknown emotion label: {}", s)),
        }
    }
}
