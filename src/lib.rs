pub mod audio;
pub mod config;
pub mod error;
pub mod jobs;
pub mod languages;
pub mod pipeline;
pub mod progress;
pub mod recognize;
pub mod retry;
pub mod subtitle;
pub mod translate;

pub use config::{Config, ConfigSource, FailurePolicy, OutputFormat};
pub use error::{PolysubError, Result};
pub use jobs::{JobRunner, JobStatus, ProgressStore};
pub use pipeline::{print_summary, PipelineResult, PipelineStats, TranslateRequest, VideoTranslator};
pub use progress::{CancelFlag, ProgressEvent, ProgressReporter, Stage};
