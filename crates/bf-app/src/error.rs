use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("generation worker is not running")]
    WorkerGone,

    #[error("{0}")]
    Generation(String),

    #[error("cancelled")]
    Cancelled,
}
