//! Video frame I/O and annotation.
//!
//! Decoding and encoding sit behind `FrameSource` / `FrameSink` so the driver
//! never touches container formats directly. Two backends are provided:
//! piping raw rgb24 through `ffmpeg`, and directories of still images.

mod annotate;
pub mod ffmpeg;
mod frame;
pub mod image_sequence;

pub use annotate::Annotator;
pub use ffmpeg::{ffmpeg_available, FfmpegSink, FfmpegSource};
pub use frame::Frame;
pub use image_sequence::{ImageSequenceSink, ImageSequenceSource};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from decoding, encoding or drawing frames
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to probe video: {0}")]
    Probe(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Failed to load font: {0}")]
    Font(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame rate as a rational number of frames per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl std::str::FromStr for FrameRate {
    type Err = String;

    /// Parses `"30000/1001"` or `"25"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s, "1"),
        };
        let num = num
            .parse::<u32>()
            .map_err(|_| format!("Invalid frame rate: {}", s))?;
        let den = den
            .parse::<u32>()
            .map_err(|_| format!("Invalid frame rate: {}", s))?;
        Ok(Self { num, den })
    }
}

/// Stream properties needed to re-encode a clip unchanged in size and rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Frame count reported by the container, if any
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    pub fn duration_secs(&self) -> Option<f64> {
        let fps = self.frame_rate.as_f64();
        match self.frame_count {
            Some(count) if fps > 0.0 => Some(count as f64 / fps),
            _ => None,
        }
    }
}

/// Ordered stream of decoded frames
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// Next frame in temporal order, or `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError>;
}

/// Destination for annotated frames
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError>;

    /// Flush and close the output
    fn finish(&mut self) -> Result<(), VideoError>;

    /// Release the output and delete anything partially written
    fn abort(&mut self);

    fn output_path(&self) -> &Path;
}

/// Open a source for `path`: a directory of images or a container file
pub fn open_source(
    path: &Path,
    image_sequence_fps: FrameRate,
) -> Result<Box<dyn FrameSource>, VideoError> {
    if path.is_dir() {
        Ok(Box::new(ImageSequenceSource::open(path, image_sequence_fps)?))
    } else if path.exists() {
        Ok(Box::new(FfmpegSource::open(path)?))
    } else {
        Err(VideoError::Decode(format!("Video not found at {:?}", path)))
    }
}

/// Create a sink for `path`: paths without an extension become image directories
pub fn create_sink(
    path: &Path,
    info: &VideoInfo,
    codec: &str,
) -> Result<Box<dyn FrameSink>, VideoError> {
    if path.extension().is_none() {
        Ok(Box::new(ImageSequenceSink::create(path)?))
    } else {
        Ok(Box::new(FfmpegSink::create(path, info, codec)?))
    }
}

/// Default output path next to other processed clips
pub fn default_output_path(output_dir: &Path, job_id: &str, input: &Path) -> PathBuf {
    if input.is_dir() {
        return output_dir.join(format!("processed_{}", job_id));
    }
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    output_dir.join(format!("processed_{}.{}", job_id, ext))
}
