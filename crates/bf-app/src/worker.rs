use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;
use bf_core::{Attribute, CancelToken, GeneratedImage, Pipeline, Stage};
use crate::error::AppError;

pub enum WorkerCommand {
    Generate {
        request_id: Uuid,
        father: PathBuf,
        mother: PathBuf,
        attribute: Attribute,
        cancel: CancelToken,
    },
    Resume {
        request_id: Uuid,
        job_id: String,
        cancel: CancelToken,
    },
    Shutdown,
}

pub enum WorkerResponse {
    Stage { request_id: Uuid, stage: Stage },
    Success { request_id: Uuid, image: GeneratedImage },
    Error { request_id: Uuid, message: String, cancelled: bool },
}

impl WorkerResponse {
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::Stage { request_id, .. }
            | Self::Success { request_id, .. }
            | Self::Error { request_id, .. } => *request_id,
        }
    }

    fn is_final(&self) -> bool {
        !matches!(self, Self::Stage { .. })
    }
}

/// Runs generations on a background thread so the caller stays responsive.
/// Requests are processed one at a time in submission order.
pub struct GenerationWorker {
    command_tx: Sender<WorkerCommand>,
    response_rx: Receiver<WorkerResponse>,
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl GenerationWorker {
    pub fn new(pipeline: Pipeline) -> Self {
        let (cmd_tx, cmd_rx) = channel::<WorkerCommand>();
        let (resp_tx, resp_rx) = channel::<WorkerResponse>();

        let thread_handle = thread::spawn(move || {
            loop {
                let (request_id, result) = match cmd_rx.recv() {
                    Ok(WorkerCommand::Generate { request_id, father, mother, attribute, cancel }) => {
                        debug!("Worker starting request {}", request_id);
                        let result = pipeline.run(&father, &mother, attribute, &cancel, |stage| {
                            let _ = resp_tx.send(WorkerResponse::Stage { request_id, stage });
                        });
                        (request_id, result)
                    }
                    Ok(WorkerCommand::Resume { request_id, job_id, cancel }) => {
                        debug!("Worker resuming job {} as request {}", job_id, request_id);
                        let result = pipeline.resume(&job_id, &cancel, |stage| {
                            let _ = resp_tx.send(WorkerResponse::Stage { request_id, stage });
                        });
                        (request_id, result)
                    }
                    Ok(WorkerCommand::Shutdown) => {
                        break;
                    }
                    Err(_) => {
                        break;
                    }
                };

                let response = match result {
                    Ok(image) => WorkerResponse::Success { request_id, image },
                    Err(e) => {
                        error!("Request {} failed: {}", request_id, e);
                        WorkerResponse::Error {
                            request_id,
                            message: e.to_string(),
                            cancelled: e.is_cancelled(),
                        }
                    }
                };
                let _ = resp_tx.send(response);
            }
        });

        Self {
            command_tx: cmd_tx,
            response_rx: resp_rx,
            tokens: Mutex::new(HashMap::new()),
            thread_handle: Some(thread_handle),
        }
    }

    pub fn generate(&self, father: PathBuf, mother: PathBuf, attribute: Attribute) -> Result<Uuid, AppError> {
        let request_id = Uuid::new_v4();
        let cancel = self.track(request_id);
        self.send(WorkerCommand::Generate { request_id, father, mother, attribute, cancel })?;
        Ok(request_id)
    }

    pub fn resume(&self, job_id: String) -> Result<Uuid, AppError> {
        let request_id = Uuid::new_v4();
        let cancel = self.track(request_id);
        self.send(WorkerCommand::Resume { request_id, job_id, cancel })?;
        Ok(request_id)
    }

    /// Token of a queued or running request, for cancelling it from
    /// another thread.
    pub fn cancel_token(&self, request_id: Uuid) -> Option<CancelToken> {
        self.lock_tokens().get(&request_id).cloned()
    }

    pub fn cancel_all(&self) {
        for token in self.lock_tokens().values() {
            token.cancel();
        }
    }

    /// Waits up to `timeout` for the next response; `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<WorkerResponse>, AppError> {
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => {
                self.forget_if_final(&response);
                Ok(Some(response))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(AppError::WorkerGone),
        }
    }

    /// Blocks until `request_id` finishes, handing every stage to `on_stage`.
    pub fn wait_for(&self, request_id: Uuid, mut on_stage: impl FnMut(&Stage)) -> Result<GeneratedImage, AppError> {
        loop {
            let Some(response) = self.recv_timeout(Duration::from_millis(250))? else {
                continue;
            };
            if response.request_id() != request_id {
                continue;
            }

            match response {
                WorkerResponse::Stage { stage, .. } => on_stage(&stage),
                WorkerResponse::Success { image, .. } => return Ok(image),
                WorkerResponse::Error { cancelled: true, .. } => return Err(AppError::Cancelled),
                WorkerResponse::Error { message, .. } => return Err(AppError::Generation(message)),
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.cancel_all();
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn send(&self, command: WorkerCommand) -> Result<(), AppError> {
        self.command_tx.send(command).map_err(|_| AppError::WorkerGone)
    }

    fn track(&self, request_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.lock_tokens().insert(request_id, token.clone());
        token
    }

    fn forget_if_final(&self, response: &WorkerResponse) {
        if response.is_final() {
            self.lock_tokens().remove(&response.request_id());
        }
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancelToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
