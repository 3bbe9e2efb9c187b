pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod results;
pub mod store;
mod attribute;
mod schemas;

pub use attribute::Attribute;
pub use cancel::CancelToken;
pub use client::RemoteClient;
pub use config::{ClientConfig, Config, StoreConfig};
pub use error::{ConfigError, GenerationError, PipelineError, StoreError};
pub use job::{GeneratedImage, GenerationRequest, Job, JobStatus};
pub use pipeline::{Pipeline, Stage};
pub use results::ResultStore;
pub use store::{GitImageStore, HttpImageStore, ImageStore, ParentRole};
