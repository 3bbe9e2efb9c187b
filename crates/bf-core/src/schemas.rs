use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JobCreateResponse {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JobStatusResponse {
    pub status: Option<String>,
    pub result: Option<Vec<String>>,
}
