//! JSON reports emitted by the CLI

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use super::driver::Stage;
use super::tally::EmotionTally;
use crate::emotion::{EmotionLabel, Prediction};

/// Reported when no frame was sampled
pub const UNKNOWN_EMOTION: &str = "unknown";

/// Identifier for one video processing job: UTC timestamp plus a short random suffix
pub fn new_job_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Timing and parameters of a processing job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub processing_time_seconds: f64,
    pub job_id: String,
    pub sample_rate: u32,
}

/// Emotion analysis of one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    /// Frames sampled and classified successfully
    pub processed_frames: u64,
    /// Frames decoded from the input
    pub total_frames: u64,
    /// Sampled frames whose classification failed and were skipped
    pub failed_frames: u64,
    pub dominant_emotion: String,
    pub emotion_distribution: BTreeMap<EmotionLabel, f64>,
    pub processed_video_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_metadata: Option<ProcessingMetadata>,
}

impl VideoSummary {
    pub fn from_tally(
        tally: &EmotionTally,
        total_frames: u64,
        failed_frames: u64,
        processed_video_path: String,
    ) -> Self {
        Self {
            processed_frames: tally.sampled_frames(),
            total_frames,
            failed_frames,
            dominant_emotion: tally
                .dominant()
                .map(|label| label.as_str().to_string())
                .unwrap_or_else(|| UNKNOWN_EMOTION.to_string()),
            emotion_distribution: tally.distribution(),
            processed_video_path,
            processing_metadata: None,
        }
    }
}

/// Successful `video` job output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub status: String,
    pub filename: String,
    pub processed_video: String,
    pub processing_time_seconds: f64,
    pub job_id: String,
    pub analysis: VideoSummary,
}

impl JobReport {
    /// `processed_video` is the output's file name; the full path stays in
    /// `analysis.processed_video_path`
    pub fn success(filename: String, analysis: VideoSummary) -> Self {
        let processed_video = Path::new(&analysis.processed_video_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| analysis.processed_video_path.clone());
        let (processing_time_seconds, job_id) = analysis
            .processing_metadata
            .as_ref()
            .map(|m| (m.processing_time_seconds, m.job_id.clone()))
            .unwrap_or_default();
        Self {
            status: "success".to_string(),
            filename,
            processed_video,
            processing_time_seconds,
            job_id,
            analysis,
        }
    }
}

/// Failed job output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub status: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl ErrorReport {
    pub fn new(error: String, stage: Option<Stage>, job_id: Option<String>) -> Self {
        Self {
            status: "error".to_string(),
            error,
            stage,
            job_id,
        }
    }
}

/// Output of the single-image `image` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePredictionReport {
    pub emotion: EmotionLabel,
    pub probabilities: BTreeMap<EmotionLabel, f32>,
    pub confidence: f32,
}

impl From<&Prediction> for ImagePredictionReport {
    fn from(prediction: &Prediction) -> Self {
        Self {
            emotion: prediction.label(),
            probabilities: prediction.probability_map(),
            confidence: prediction.confidence(),
        }
    }
}

/// Output of the `check` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub models_loaded: ModelsLoaded,
    pub ffmpeg_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsLoaded {
    pub face_model: bool,
}

impl HealthReport {
    pub fn new(face_model: bool, ffmpeg_available: bool) -> Self {
        Self {
            status: if face_model { "healthy" } else { "degraded" }.to_string(),
            models_loaded: ModelsLoaded { face_model },
            ffmpeg_available,
        }
    }
}
