use std::fmt;
use std::path::Path;
use tracing::info;
use crate::cancel::CancelToken;
use crate::client::RemoteClient;
use crate::config::{Config, StoreConfig};
use crate::error::{GenerationError, PipelineError};
use crate::job::{GeneratedImage, GenerationRequest};
use crate::results::ResultStore;
use crate::store::{self, GitImageStore, HttpImageStore, ImageStore, ParentRole};
use crate::Attribute;

/// Progress markers reported while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Publishing(ParentRole),
    Submitting,
    Polling { job_id: String },
    Downloading,
    Saving,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publishing(role) => write!(f, "Publishing {role} image..."),
            Self::Submitting => f.write_str("Submitting generation job..."),
            Self::Polling { job_id } => write!(f, "Waiting for job {job_id}..."),
            Self::Downloading => f.write_str("Downloading result..."),
            Self::Saving => f.write_str("Saving result..."),
        }
    }
}

/// Parents in, saved baby image out: publish both photos, run the remote
/// job, then persist the bytes.
pub struct Pipeline {
    store: Box<dyn ImageStore>,
    client: RemoteClient,
    results: ResultStore,
}

impl Pipeline {
    pub fn new(store: Box<dyn ImageStore>, client: RemoteClient, results: ResultStore) -> Self {
        Self {
            store,
            client,
            results,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let store: Box<dyn ImageStore> = match &config.store {
            StoreConfig::Git { repo_dir, images_dir, public_url_prefix } => Box::new(
                GitImageStore::new(repo_dir.clone(), images_dir.clone(), public_url_prefix.clone()),
            ),
            StoreConfig::Http { upload_url, token } => Box::new(
                HttpImageStore::new(upload_url.clone(), token.clone(), config.client.request_timeout)
                    .map_err(PipelineError::Setup)?,
            ),
        };
        let client = RemoteClient::new(config.client.clone())?;

        Ok(Self::new(store, client, ResultStore::new(config.results_dir.clone())))
    }

    pub fn publish(&self, path: &Path, role: ParentRole) -> Result<String, PipelineError> {
        Ok(store::publish_parent(self.store.as_ref(), path, role)?)
    }

    pub fn run(
        &self,
        father: &Path,
        mother: &Path,
        attribute: Attribute,
        cancel: &CancelToken,
        mut on_stage: impl FnMut(Stage),
    ) -> Result<GeneratedImage, PipelineError> {
        on_stage(Stage::Publishing(ParentRole::Father));
        let father_url = self.publish(father, ParentRole::Father)?;
        ensure_not_cancelled(cancel)?;

        on_stage(Stage::Publishing(ParentRole::Mother));
        let mother_url = self.publish(mother, ParentRole::Mother)?;
        ensure_not_cancelled(cancel)?;

        on_stage(Stage::Submitting);
        let request = GenerationRequest::new(father_url, mother_url, attribute);
        let job_id = self.client.submit(&request)?;

        self.finish(&job_id, cancel, on_stage)
    }

    /// Picks up a job that was already submitted.
    pub fn resume(
        &self,
        job_id: &str,
        cancel: &CancelToken,
        on_stage: impl FnMut(Stage),
    ) -> Result<GeneratedImage, PipelineError> {
        self.finish(job_id, cancel, on_stage)
    }

    fn finish(
        &self,
        job_id: &str,
        cancel: &CancelToken,
        mut on_stage: impl FnMut(Stage),
    ) -> Result<GeneratedImage, PipelineError> {
        on_stage(Stage::Polling { job_id: job_id.to_string() });
        let job = self.client.poll_with_cancel(job_id, cancel)?;

        on_stage(Stage::Downloading);
        let bytes = self.client.fetch(&job)?;

        on_stage(Stage::Saving);
        let image = self.results.save(bytes).map_err(PipelineError::Save)?;
        info!("Job {} saved to {}", job_id, image.path.display());

        Ok(image)
    }
}

fn ensure_not_cancelled(cancel: &CancelToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(GenerationError::Cancelled.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use crate::config::ClientConfig;
    use crate::error::StoreError;

    struct RecordingStore {
        names: Mutex<Vec<String>>,
    }

    impl ImageStore for RecordingStore {
        fn put(&self, name: &str, _bytes: &[u8]) -> Result<String, StoreError> {
            self.names.lock().unwrap().push(name.to_string());
            Ok(format!("http://cdn.local/{name}"))
        }
    }

    fn pipeline(results: &Path) -> Pipeline {
        let store = RecordingStore { names: Mutex::new(Vec::new()) };
        let client = RemoteClient::new(ClientConfig::new("http://127.0.0.1:9/gen", "k")).unwrap();
        Pipeline::new(Box::new(store), client, ResultStore::new(results))
    }

    #[test]
    fn test_missing_parent_image_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let mut stages = Vec::new();

        let err = pipeline
            .run(
                &dir.path().join("missing.jpg"),
                &dir.path().join("missing2.jpg"),
                Attribute::Random,
                &CancelToken::new(),
                |s| stages.push(s),
            )
            .unwrap_err();

        assert!(matches!(err, PipelineError::Store(_)));
        assert!(err.to_string().starts_with("failed to publish parent image"));
        assert_eq!(stages, vec![Stage::Publishing(ParentRole::Father)]);
    }

    #[test]
    fn test_cancel_before_submit() {
        let dir = tempfile::tempdir().unwrap();
        let father = dir.path().join("f.png");
        let mother = dir.path().join("m.png");
        image::RgbImage::new(4, 4).save(&father).unwrap();
        image::RgbImage::new(4, 4).save(&mother).unwrap();

        let pipeline = pipeline(&dir.path().join("results"));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = pipeline
            .run(&father, &mother, Attribute::BabyBoy, &cancel, |_| {})
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dir.path().join("results").exists());
    }

    #[test]
    fn test_store_setup_failure_is_not_reported_as_publish_failure() {
        let err = PipelineError::Setup(StoreError::Upload { status: 0, body: "tls backend".into() });
        assert!(err.to_string().starts_with("failed to set up image store"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_stage_messages() {
        assert_eq!(Stage::Publishing(ParentRole::Mother).to_string(), "Publishing mother image...");
        assert_eq!(
            Stage::Polling { job_id: "abc".into() }.to_string(),
            "Waiting for job abc..."
        );
    }
}
