use std::path::PathBuf;
use serde::Serialize;
use crate::Attribute;

/// Body of the submission request. Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationRequest {
    #[serde(rename = "fatherImage")]
    pub father_image_url: String,
    #[serde(rename = "motherImage")]
    pub mother_image_url: String,
    #[serde(rename = "gender")]
    pub attribute: Attribute,
}

impl GenerationRequest {
    pub fn new(father_image_url: impl Into<String>, mother_image_url: impl Into<String>, attribute: Attribute) -> Self {
        Self {
            father_image_url: father_image_url.into(),
            mother_image_url: mother_image_url.into(),
            attribute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
    NotFound,
}

impl JobStatus {
    /// Anything the service reports that is not one of the three terminal
    /// values ("pending", "processing", ...) counts as pending.
    pub fn from_wire(status: &str) -> Self {
        match status {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "not-found" => Self::NotFound,
            _ => Self::Pending,
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NotFound => "not-found",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    /// Output URLs, only populated once the job is completed
    pub result_urls: Vec<String>,
}

impl Job {
    pub fn first_result_url(&self) -> Option<&str> {
        self.result_urls.first().map(String::as_str)
    }
}

/// A downloaded result and the file it was written to.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = GenerationRequest::new("http://h/f.jpg", "http://h/m.jpg", Attribute::BabyGirl);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({
            "fatherImage": "http://h/f.jpg",
            "motherImage": "http://h/m.jpg",
            "gender": "babyGirl",
        }));
    }

    #[test]
    fn test_status_from_wire() {
        assert_eq!(JobStatus::from_wire("completed"), JobStatus::Completed);
        assert_eq!(JobStatus::from_wire("failed"), JobStatus::Failed);
        assert_eq!(JobStatus::from_wire("not-found"), JobStatus::NotFound);
        assert_eq!(JobStatus::from_wire("processing"), JobStatus::Pending);
        assert_eq!(JobStatus::from_wire("pending"), JobStatus::Pending);
        assert_eq!(JobStatus::from_wire(""), JobStatus::Pending);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::NotFound.is_terminal());
    }
}
