//! Per-video processing driver and its JSON reports.

mod driver;
pub mod report;
mod tally;

pub use driver::{
    FailurePolicy, PipelineError, PipelineOptions, Stage, StopCondition, VideoPipeline,
};
pub use report::{
    new_job_id, ErrorReport, HealthReport, ImagePredictionReport, JobReport, ProcessingMetadata,
    VideoSummary, UNKNOWN_EMOTION,
};
pub use tally::EmotionTally;
