use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::report::VideoSummary;
use super::tally::EmotionTally;
use crate::classifier::{ClassifierError, FrameClassifier};
use crate::emotion::SmoothedResult;
use crate::smoothing::{SmootherError, TemporalSmoother, DEFAULT_WINDOW_SIZE};
use crate::video::{self, Annotator, FrameRate, FrameSink, FrameSource, VideoError};

/// Clips longer than this with every frame sampled trigger a warning
const LARGE_VIDEO_FRAMES: u64 = 1000;

/// Progress is logged every this many sample intervals
const PROGRESS_EVERY_SAMPLES: u64 = 30;

/// Processing stage an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configure,
    Decode,
    Classify,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configure => "configure",
            Self::Decode => "decode",
            Self::Classify => "classify",
            Self::Encode => "encode",
        };
        f.write_str(s)
    }
}

/// Errors that abort processing of a video
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Smoother(#[from] SmootherError),

    #[error("Failed to decode video: {0}")]
    Decode(#[source] VideoError),

    #[error("Failed to classify frame {frame}: {source}")]
    Classify {
        frame: u64,
        #[source]
        source: ClassifierError,
    },

    #[error("Failed to encode video: {0}")]
    Encode(#[source] VideoError),

    #[error("Processing cancelled after {frames} frames")]
    Cancelled { frames: u64 },

    #[error("Processing timed out after {frames} frames")]
    TimedOut { frames: u64 },
}

impl PipelineError {
    /// Stage that failed; `None` for cancellation and timeouts
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Configuration(_) | Self::Smoother(_) => Some(Stage::Configure),
            Self::Decode(_) => Some(Stage::Decode),
            Self::Classify { .. } => Some(Stage::Classify),
            Self::Encode(_) => Some(Stage::Encode),
            Self::Cancelled { .. } | Self::TimedOut { .. } => None,
        }
    }
}

/// What to do when a sampled frame cannot be classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole video
    #[default]
    Abort,
    /// Log, count the frame as failed and continue
    Skip,
}

/// Cancellation flag plus optional deadline, checked between frames
#[derive(Debug, Clone, Default)]
pub struct StopCondition {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl StopCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Shared flag; storing `true` cancels processing at the next frame boundary
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn check(&self, frames: u64) -> Result<(), PipelineError> {
        if self.flag.load(Ordering::Relaxed) {
            return Err(PipelineError::Cancelled { frames });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(PipelineError::TimedOut { frames });
            }
        }
        Ok(())
    }

    /// An I/O failure seen after a stop request is reported as the stop.
    /// A signal that also reached the ffmpeg children ends their streams early.
    fn or_stopped(&self, frames: u64, err: PipelineError) -> PipelineError {
        match self.check(frames) {
            Err(stopped) => {
                debug!("Ignoring error after stop request: {}", err);
                stopped
            }
            Ok(()) => err,
        }
    }
}

/// Driver parameters
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Classify one frame in every `sample_rate` frames
    pub sample_rate: u32,
    pub window_size: usize,
    pub failure_policy: FailurePolicy,
    /// Encoder codec for container outputs
    pub video_codec: String,
    /// Frame rate assigned to image-sequence inputs
    pub image_sequence_fps: FrameRate,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            sample_rate: 1,
            window_size: DEFAULT_WINDOW_SIZE,
            failure_policy: FailurePolicy::default(),
            video_codec: "mpeg4".to_string(),
            image_sequence_fps: FrameRate::default(),
        }
    }
}

/// Decode → classify → smooth → annotate → encode, one frame at a time.
///
/// Each `run` owns a fresh smoother and tally, so one pipeline can process
/// many videos in sequence while sharing a single loaded classifier.
pub struct VideoPipeline {
    options: PipelineOptions,
}

impl VideoPipeline {
    pub fn new(options: PipelineOptions) -> Result<Self, PipelineError> {
        if options.sample_rate == 0 {
            return Err(PipelineError::Configuration(
                "sample rate must be at least 1".to_string(),
            ));
        }
        // Validate the window size up front rather than per video
        TemporalSmoother::new(options.window_size)?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Open `input`, process it and write the annotated clip to `output`
    pub fn process_file(
        &self,
        input: &Path,
        output: &Path,
        classifier: &mut dyn FrameClassifier,
        annotator: &Annotator,
        stop: &StopCondition,
    ) -> Result<VideoSummary, PipelineError> {
        let mut source =
            video::open_source(input, self.options.image_sequence_fps).map_err(PipelineError::Decode)?;

        let info = source.info().clone();
        if let Some(duration) = info.duration_secs() {
            debug!("Input duration ~{:.1} seconds", duration);
        }

        let mut sink = video::create_sink(output, &info, &self.options.video_codec)
            .map_err(PipelineError::Encode)?;

        self.run(source.as_mut(), sink.as_mut(), classifier, annotator, stop)
    }

    /// Process every frame of `source` into `sink`.
    ///
    /// On any error the sink is aborted so no partial output remains.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        classifier: &mut dyn FrameClassifier,
        annotator: &Annotator,
        stop: &StopCondition,
    ) -> Result<VideoSummary, PipelineError> {
        match self.run_frames(source, sink, classifier, annotator, stop) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!("Video processing failed: {}", e);
                sink.abort();
                Err(e)
            }
        }
    }

    fn run_frames(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        classifier: &mut dyn FrameClassifier,
        annotator: &Annotator,
        stop: &StopCondition,
    ) -> Result<VideoSummary, PipelineError> {
        let sample_rate = self.options.sample_rate as u64;
        let progress_every = PROGRESS_EVERY_SAMPLES * sample_rate;
        let expected_frames = source.info().frame_count;

        if let Some(count) = expected_frames {
            if count > LARGE_VIDEO_FRAMES && sample_rate == 1 {
                warn!(
                    "Large video with {} frames. Consider using sample_rate > 1 for faster processing.",
                    count
                );
            }
        }

        let mut smoother = TemporalSmoother::new(self.options.window_size)?;
        let mut tally = EmotionTally::new();
        let mut last_smoothed: Option<SmoothedResult> = None;
        let mut total_frames = 0u64;
        let mut failed_frames = 0u64;

        loop {
            stop.check(total_frames)?;

            let next = source
                .next_frame()
                .map_err(|e| stop.or_stopped(total_frames, PipelineError::Decode(e)))?;
            let Some(mut frame) = next else {
                break;
            };
            total_frames += 1;

            if total_frames % sample_rate == 0 {
                match classifier.classify(&frame) {
                    Ok(prediction) => {
                        smoother.update(prediction);
                        if let Some(smoothed) = smoother.smoothed() {
                            tally.record(smoothed.label);
                            last_smoothed = Some(smoothed);
                        }
                    }
                    Err(e) => match self.options.failure_policy {
                        FailurePolicy::Abort => {
                            return Err(PipelineError::Classify {
                                frame: total_frames,
                                source: e,
                            });
                        }
                        FailurePolicy::Skip => {
                            warn!("Skipping frame {}: {}", total_frames, e);
                            failed_frames += 1;
                        }
                    },
                }
            }

            if let Some(result) = &last_smoothed {
                annotator.annotate(&mut frame.image, result);
            }
            sink.write_frame(&frame)
                .map_err(|e| stop.or_stopped(total_frames, PipelineError::Encode(e)))?;

            if total_frames % progress_every == 0 {
                match expected_frames {
                    Some(expected) if expected > 0 => info!(
                        "Processing frame {}/{} ({:.1}%)",
                        total_frames,
                        expected,
                        total_frames as f64 / expected as f64 * 100.0
                    ),
                    _ => info!("Processing frame {}", total_frames),
                }
            }
        }

        sink.finish()
            .map_err(|e| stop.or_stopped(total_frames, PipelineError::Encode(e)))?;

        let summary = VideoSummary::from_tally(
            &tally,
            total_frames,
            failed_frames,
            sink.output_path().display().to_string(),
        );

        debug!(
            "Decoded {} frames, sampled {}, failed {} (window {}/{})",
            total_frames,
            summary.processed_frames,
            failed_frames,
            smoother.len(),
            smoother.capacity()
        );
        info!("Video processing complete. Dominant emotion: {}", summary.dominant_emotion);

        Ok(summary)
    }
}
