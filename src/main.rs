use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use emotion_video::classifier::{FrameClassifier, OnnxFrameClassifier};
use emotion_video::config::Config;
use emotion_video::pipeline::{
    new_job_id, ErrorReport, FailurePolicy, HealthReport, ImagePredictionReport, JobReport,
    PipelineError, ProcessingMetadata, Stage, StopCondition, VideoPipeline, VideoSummary,
};
use emotion_video::video::{self, Annotator, Frame};

/// Headless CLI for facial emotion analysis of video clips
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file (defaults to ~/.emotionvideo/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Annotate a video with smoothed emotion predictions
    Video {
        /// Input video file or directory of frames
        input: PathBuf,

        /// Output video file (or directory, when it has no extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Classify every Nth frame
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Number of recent predictions used for smoothing
        #[arg(long)]
        window_size: Option<usize>,

        /// Skip frames that fail to classify instead of aborting
        #[arg(long)]
        skip_failed_frames: bool,

        /// Abort processing after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Path to the face emotion model (.onnx)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// TrueType font for the overlay text
        #[arg(long)]
        font: Option<PathBuf>,
    },

    /// Classify a single still image
    Image {
        /// Image file
        path: PathBuf,

        /// Path to the face emotion model (.onnx)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Report model and ffmpeg availability
    Check {
        /// Path to the face emotion model (.onnx)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

/// Failure of a CLI job, reported as JSON on stdout
struct JobFailure {
    error: String,
    stage: Option<Stage>,
}

impl JobFailure {
    fn new(error: impl std::fmt::Display, stage: Option<Stage>) -> Self {
        Self {
            error: error.to_string(),
            stage,
        }
    }
}

impl From<PipelineError> for JobFailure {
    fn from(e: PipelineError) -> Self {
        let stage = e.stage();
        Self::new(e, stage)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for JSON reports
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(JobFailure::new(format!("{:#}", e), Some(Stage::Configure)), None),
    };

    match args.command {
        Command::Video {
            input,
            output,
            sample_rate,
            window_size,
            skip_failed_frames,
            timeout_secs,
            model,
            font,
        } => {
            let mut config = config;
            if let Some(rate) = sample_rate {
                config.sample_rate = rate;
            }
            if let Some(size) = window_size {
                config.window_size = size;
            }
            if skip_failed_frames {
                config.failure_policy = FailurePolicy::Skip;
            }
            if model.is_some() {
                config.model_path = model;
            }
            if font.is_some() {
                config.font_path = font;
            }

            let job_id = new_job_id(Utc::now());
            if let Err(e) = config.validate() {
                fail(
                    JobFailure::new(format!("{:#}", e), Some(Stage::Configure)),
                    Some(job_id),
                );
            }

            let stop_flag = Arc::new(AtomicBool::new(false));
            let mut stop = StopCondition::with_flag(stop_flag.clone());
            if let Some(secs) = timeout_secs {
                stop = stop.with_timeout(Duration::from_secs(secs));
            }

            // Set up Ctrl+C handler
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C, stopping...");
                stop_flag.store(true, Ordering::SeqCst);
            });

            let (tx, rx) = oneshot::channel();
            let thread_job_id = job_id.clone();
            let worker = std::thread::spawn(move || {
                let result = run_video_job(&config, &input, output, &thread_job_id, &stop);
                let _ = tx.send(result);
            });

            let result = rx.await.unwrap_or_else(|_| {
                Err(JobFailure::new("Processing thread exited unexpectedly", None))
            });
            let _ = worker.join();

            match result {
                Ok(report) => print_json(&report),
                Err(failure) => fail(failure, Some(job_id)),
            }
        }

        Command::Image { path, model } => {
            let mut config = config;
            if model.is_some() {
                config.model_path = model;
            }
            match classify_image(&config, &path) {
                Ok(report) => print_json(&report),
                Err(failure) => fail(failure, None),
            }
        }

        Command::Check { model } => {
            let mut config = config;
            if model.is_some() {
                config.model_path = model;
            }
            let face_model = match config.classifier_config() {
                Ok(classifier_config) => match OnnxFrameClassifier::new(classifier_config) {
                    Ok(classifier) => classifier.is_ready(),
                    Err(e) => {
                        warn!("Face model unavailable: {}", e);
                        false
                    }
                },
                Err(e) => {
                    warn!("Face model unavailable: {:#}", e);
                    false
                }
            };
            print_json(&HealthReport::new(face_model, video::ffmpeg_available()))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };
    Config::load(&path).with_context(|| format!("Failed to load config from {:?}", path))
}

fn load_classifier(config: &Config) -> Result<OnnxFrameClassifier, JobFailure> {
    let classifier_config = config
        .classifier_config()
        .map_err(|e| JobFailure::new(format!("{:#}", e), Some(Stage::Configure)))?;
    info!("Model: {:?}", classifier_config.model_path);
    OnnxFrameClassifier::new(classifier_config)
        .map_err(|e| JobFailure::new(e, Some(Stage::Configure)))
}

fn load_annotator(config: &Config) -> Result<Annotator, JobFailure> {
    Annotator::load(config.font_path.as_deref())
        .map_err(|e| JobFailure::new(e, Some(Stage::Configure)))
}

/// Runs on the worker thread: load the model, process the clip, build the report
fn run_video_job(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    job_id: &str,
    stop: &StopCondition,
) -> Result<JobReport, JobFailure> {
    let started = Instant::now();

    let pipeline = VideoPipeline::new(config.pipeline_options())?;
    let mut classifier = load_classifier(config)?;
    let annotator = load_annotator(config)?;

    let output = match output {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(&config.output_dir).map_err(|e| {
                JobFailure::new(
                    format!("Failed to create {:?}: {}", config.output_dir, e),
                    Some(Stage::Encode),
                )
            })?;
            video::default_output_path(&config.output_dir, job_id, input)
        }
    };

    info!("Job {}: {:?} -> {:?}", job_id, input, output);

    let mut summary: VideoSummary =
        pipeline.process_file(input, &output, &mut classifier, &annotator, stop)?;

    let processing_time_seconds = started.elapsed().as_secs_f64();
    summary.processing_metadata = Some(ProcessingMetadata {
        processing_time_seconds,
        job_id: job_id.to_string(),
        sample_rate: config.sample_rate,
    });

    info!(
        "Job {} finished in {:.1}s: {} of {} frames sampled",
        job_id, processing_time_seconds, summary.processed_frames, summary.total_frames
    );

    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());

    Ok(JobReport::success(filename, summary))
}

fn classify_image(config: &Config, path: &Path) -> Result<ImagePredictionReport, JobFailure> {
    let image = image::open(path)
        .map_err(|e| JobFailure::new(format!("Failed to read {:?}: {}", path, e), Some(Stage::Decode)))?;
    let frame = Frame::from_image(image);

    let mut classifier = load_classifier(config)?;
    let prediction = classifier
        .classify(&frame)
        .map_err(|e| JobFailure::new(e, Some(Stage::Classify)))?;

    Ok(ImagePredictionReport::from(&prediction))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

/// Print an error report and exit non-zero
fn fail(failure: JobFailure, job_id: Option<String>) -> ! {
    error!("{}", failure.error);
    let report = ErrorReport::new(failure.error, failure.stage, job_id);
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize error report: {}", e),
    }
    std::process::exit(1);
}
