use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the submit / poll / fetch workflow.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("could not reach generation service: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status. Status and body are
    /// passed through untouched.
    #[error("generation service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("unexpected response from generation service: {0}")]
    Protocol(String),

    #[error("job {job_id} ended with status '{status}'")]
    JobFailed { job_id: String, status: String },

    #[error("job {job_id} did not finish after {attempts} status checks ({elapsed:.1?})")]
    PollTimeout { job_id: String, attempts: u32, elapsed: Duration },

    #[error("generation cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not read image: {0}")]
    Image(#[from] image::ImageError),

    #[error("not an image file path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("`{command}` failed ({code}): {stderr}")]
    Git { command: String, code: String, stderr: String },

    #[error("upload failed with HTTP {status}: {body}")]
    Upload { status: u16, body: String },

    #[error("could not reach image host: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(String),

    #[error("invalid value '{value}' for {var}")]
    Invalid { var: String, value: String },

    #[error("could not read .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

/// Everything that can stop a full parents-to-baby run. `Display` is the
/// message shown to the user.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to publish parent image: {0}")]
    Store(#[from] StoreError),

    #[error("failed to set up image store: {0}")]
    Setup(#[source] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("failed to save result: {0}")]
    Save(#[source] std::io::Error),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Generation(GenerationError::Cancelled))
    }
}
