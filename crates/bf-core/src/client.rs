use std::time::{Duration, Instant};
use reqwest::blocking::{Client, Response};
use tracing::{debug, info, warn};
use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::error::GenerationError;
use crate::job::{GenerationRequest, Job, JobStatus};
use crate::schemas::{JobCreateResponse, JobStatusResponse};
use crate::Attribute;

const API_KEY_HEADER: &str = "x-api-key";
/// Lower bound on the gap between status requests
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Blocking client for the hosted face-generation API.
///
/// A generation is a job: [`submit`](Self::submit) returns its id,
/// [`poll`](Self::poll) waits for a terminal status and
/// [`fetch`](Self::fetch) downloads the first produced image.
pub struct RemoteClient {
    http: Client,
    config: ClientConfig,
}

impl RemoteClient {
    pub fn new(config: ClientConfig) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn submit(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            url = %self.config.endpoint_url,
            father = %request.father_image_url,
            mother = %request.mother_image_url,
            gender = request.attribute.id(),
            "Submitting generation job"
        );

        let response = self.http
            .post(&self.config.endpoint_url)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .json(request)
            .send()?;

        let response = ensure_success(response)?;
        let body = response.text()?;
        debug!("Submission response: {}", body);

        let created: JobCreateResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Protocol(format!("submission response is not valid JSON: {e}")))?;

        match created.job_id {
            Some(job_id) if !job_id.is_empty() => {
                info!("Submitted job {}", job_id);
                Ok(job_id)
            }
            _ => Err(GenerationError::Protocol("submission response has no jobId".to_string())),
        }
    }

    pub fn poll(&self, job_id: &str) -> Result<Job, GenerationError> {
        self.poll_with_cancel(job_id, &CancelToken::new())
    }

    /// Waits for the job to reach a terminal status.
    ///
    /// Failed status requests (transport errors, non-2xx, unreadable bodies)
    /// are logged and retried. Polling stops after `max_attempts` requests
    /// (at least one) or once `poll_timeout` has elapsed.
    pub fn poll_with_cancel(&self, job_id: &str, cancel: &CancelToken) -> Result<Job, GenerationError> {
        let url = self.config.status_url(job_id);
        let max_attempts = self.config.max_attempts.max(1);
        let started = Instant::now();
        let mut delay = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut attempts = 0u32;

        debug!("Start polling job: {}", url);

        loop {
            if cancel.is_cancelled() {
                info!("Polling of job {} cancelled", job_id);
                return Err(GenerationError::Cancelled);
            }

            attempts += 1;
            let remaining = self.config.poll_timeout.saturating_sub(started.elapsed());
            match self.check_status(job_id, &url, remaining.max(MIN_POLL_INTERVAL)) {
                Ok(job) if job.status == JobStatus::Completed => {
                    info!("Job {} completed after {} status checks", job_id, attempts);
                    return Ok(job);
                }
                Ok(job) if job.status.is_terminal() => {
                    return Err(GenerationError::JobFailed {
                        job_id: job_id.to_string(),
                        status: job.status.as_wire().to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => warn!("Status check {} for job {} failed, retrying: {}", attempts, job_id, e),
            }

            let elapsed = started.elapsed();
            if attempts >= max_attempts || elapsed >= self.config.poll_timeout {
                return Err(GenerationError::PollTimeout {
                    job_id: job_id.to_string(),
                    attempts,
                    elapsed,
                });
            }

            let sleep = delay.min(self.config.poll_timeout - elapsed);
            if cancel.wait_timeout(sleep) {
                info!("Polling of job {} cancelled", job_id);
                return Err(GenerationError::Cancelled);
            }
            delay = next_delay(delay, self.config.poll_max_interval);
        }
    }

    /// Downloads the first result of a completed job. The bytes are returned
    /// exactly as served.
    pub fn fetch(&self, job: &Job) -> Result<Vec<u8>, GenerationError> {
        if job.status != JobStatus::Completed {
            return Err(GenerationError::Protocol(format!(
                "job {} is {}, not completed", job.job_id, job.status.as_wire()
            )));
        }
        let url = job.first_result_url().ok_or_else(|| {
            GenerationError::Protocol(format!("completed job {} has no result URL", job.job_id))
        })?;

        debug!("Downloading result: {}", url);
        let response = ensure_success(self.http.get(url).send()?)?;
        let bytes = response.bytes()?;
        debug!("Downloaded {} bytes for job {}", bytes.len(), job.job_id);
        if bytes.is_empty() {
            return Err(GenerationError::Protocol(format!("result for job {} is empty", job.job_id)));
        }

        Ok(bytes.to_vec())
    }

    pub fn generate(&self, father_url: &str, mother_url: &str, attribute: Attribute) -> Result<Vec<u8>, GenerationError> {
        self.generate_with_cancel(father_url, mother_url, attribute, &CancelToken::new())
    }

    /// submit, poll and fetch in one call
    pub fn generate_with_cancel(
        &self,
        father_url: &str,
        mother_url: &str,
        attribute: Attribute,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, GenerationError> {
        let request = GenerationRequest::new(father_url, mother_url, attribute);
        let job_id = self.submit(&request)?;
        let job = self.poll_with_cancel(&job_id, cancel)?;
        self.fetch(&job)
    }

    /// One status request. Non-terminal statuses come back as `Pending`.
    /// The request is cut off after `deadline` so a slow status check cannot
    /// outlive the poll timeout.
    fn check_status(&self, job_id: &str, url: &str, deadline: Duration) -> Result<Job, GenerationError> {
        let response = self.http
            .get(url)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .timeout(deadline.min(self.config.request_timeout))
            .send()?;
        debug!("Poll {} -> {}", url, response.status());

        let response = ensure_success(response)?;
        let body = response.text()?;
        let parsed: JobStatusResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Protocol(format!("status response is not valid JSON: {e}")))?;

        let raw_status = parsed.status.unwrap_or_default();
        debug!("Job {} status: {:?}", job_id, raw_status);

        let status = JobStatus::from_wire(&raw_status);
        let result_urls = match status {
            JobStatus::Completed => parsed.result.unwrap_or_default(),
            _ => Vec::new(),
        };

        Ok(Job {
            job_id: job_id.to_string(),
            status,
            result_urls,
        })
    }
}

fn ensure_success(response: Response) -> Result<Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(GenerationError::Service {
        status: status.as_u16(),
        body,
    })
}

fn next_delay(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max).max(MIN_POLL_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let max = Duration::from_secs(5);
        let mut delay = Duration::from_millis(500);
        let mut schedule = Vec::new();
        for _ in 0..6 {
            schedule.push(delay.as_millis());
            delay = next_delay(delay, max);
        }
        assert_eq!(schedule, vec![500, 1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn test_zero_interval_never_busy_polls() {
        let delay = next_delay(Duration::ZERO, Duration::ZERO);
        assert_eq!(delay, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_fetch_rejects_pending_job() {
        let client = RemoteClient::new(ClientConfig::new("http://127.0.0.1:9", "k")).unwrap();
        let job = Job {
            job_id: "j1".into(),
            status: JobStatus::Pending,
            result_urls: vec![],
        };
        assert!(matches!(client.fetch(&job), Err(GenerationError::Protocol(_))));
    }

    #[test]
    fn test_fetch_rejects_completed_job_without_urls() {
        let client = RemoteClient::new(ClientConfig::new("http://127.0.0.1:9", "k")).unwrap();
        let job = Job {
            job_id: "j1".into(),
            status: JobStatus::Completed,
            result_urls: vec![],
        };
        assert!(matches!(client.fetch(&job), Err(GenerationError::Protocol(_))));
    }

    #[test]
    fn test_poll_cancelled_before_first_request() {
        let client = RemoteClient::new(ClientConfig::new("http://127.0.0.1:9", "k")).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(client.poll_with_cancel("j1", &cancel), Err(GenerationError::Cancelled)));
    }
}
