use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::{ClassifierConfig, Normalization, Preprocessor, TensorLayout};
use crate::pipeline::{FailurePolicy, PipelineOptions};
use crate::video::FrameRate;

/// File name of the face emotion model inside the models directory
pub const DEFAULT_MODEL_FILENAME: &str = "best_emotion_model.onnx";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,

    // Model
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub normalization: Normalization,
    pub layout: TensorLayout,
    pub n_threads: usize,

    // Smoothing and sampling
    pub window_size: usize,
    pub sample_rate: u32,
    pub failure_policy: FailurePolicy,

    // Output
    pub output_dir: PathBuf,
    pub video_codec: String,
    pub image_sequence_fps: u32,
    pub font_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            model_path: None,
            input_size: 224,
            normalization: Normalization::MobileNetV2,
            layout: TensorLayout::Nhwc,
            n_threads: 1,
            window_size: 5,
            sample_rate: 1,
            failure_policy: FailurePolicy::Abort,
            output_dir: PathBuf::from("processed_videos"),
            video_codec: "mpeg4".to_string(),
            image_sequence_fps: 30,
            font_path: None,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            serde_json::from_str(&content)
                .context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path, content)
            .context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Failed to get home directory")?;
        Ok(home.join(".emotionvideo"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    /// Get the default models directory
    pub fn default_models_dir() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("models"))
    }

    /// Get the model file path
    pub fn get_model_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.model_path {
            Ok(path.clone())
        } else {
            let models_dir = Self::default_models_dir()?;
            Ok(models_dir.join(DEFAULT_MODEL_FILENAME))
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            bail!("window_size must be at least 1");
        }
        if self.sample_rate == 0 {
            bail!("sample_rate must be at least 1");
        }
        if self.input_size == 0 {
            bail!("input_size must be at least 1");
        }
        if self.image_sequence_fps == 0 {
            bail!("image_sequence_fps must be at least 1");
        }
        if self.video_codec.trim().is_empty() {
            bail!("video_codec must not be empty");
        }
        Ok(())
    }

    pub fn classifier_config(&self) -> Result<ClassifierConfig> {
        Ok(ClassifierConfig {
            model_path: self.get_model_path()?,
            n_threads: self.n_threads.max(1),
            preprocessor: Preprocessor {
                input_size: self.input_size,
                normalization: self.normalization,
                layout: self.layout,
            },
        })
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            sample_rate: self.sample_rate,
            window_size: self.window_size,
            failure_policy: self.failure_policy,
            video_codec: self.video_codec.clone(),
            image_sequence_fps: FrameRate::new(self.image_sequence_fps, 1),
        }
    }
}
