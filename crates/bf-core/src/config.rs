use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use crate::error::ConfigError;

pub const DEFAULT_ENDPOINT_URL: &str = "https://api.maxstudio.ai/baby-generator";

/// Settings for [`crate::RemoteClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint_url: String,
    pub api_key: String,
    /// First delay between status requests; doubles up to `poll_max_interval`
    pub poll_interval: Duration,
    pub poll_max_interval: Duration,
    /// Overall deadline for the poll phase
    pub poll_timeout: Duration,
    pub max_attempts: u32,
    /// Applied to every single HTTP request
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            api_key: api_key.into(),
            poll_interval: Duration::from_millis(500),
            poll_max_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(300),
            max_attempts: 120,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Status URL for a job: `<endpoint>/<job_id>`
    pub fn status_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.endpoint_url.trim_end_matches('/'), job_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    /// Commit images into a git checkout whose files are publicly served
    Git {
        repo_dir: PathBuf,
        images_dir: String,
        public_url_prefix: String,
    },
    /// PUT images to a static file host
    Http {
        upload_url: String,
        token: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub client: ClientConfig,
    pub store: StoreConfig,
    pub results_dir: PathBuf,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e.into());
            }
            debug!("No .env file, using process environment only");
        }

        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let require = |var: &str| get(var).ok_or_else(|| ConfigError::Missing(var.to_string()));

        let mut client = ClientConfig::new(
            get("BABYFACE_ENDPOINT_URL").unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string()),
            require("BABYFACE_API_KEY")?,
        );
        if let Some(ms) = parse_nonzero(&get, "BABYFACE_POLL_INTERVAL_MS")? {
            client.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_nonzero(&get, "BABYFACE_POLL_MAX_INTERVAL_MS")? {
            client.poll_max_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_opt::<u64>(&get, "BABYFACE_POLL_TIMEOUT_SECS")? {
            client.poll_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_opt::<u32>(&get, "BABYFACE_MAX_ATTEMPTS")? {
            client.max_attempts = n;
        }
        if let Some(secs) = parse_opt::<u64>(&get, "BABYFACE_REQUEST_TIMEOUT_SECS")? {
            client.request_timeout = Duration::from_secs(secs);
        }

        let store = match get("BABYFACE_STORE").as_deref().unwrap_or("git") {
            "git" => StoreConfig::Git {
                repo_dir: get("BABYFACE_GIT_REPO_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
                images_dir: get("BABYFACE_IMAGES_DIR").unwrap_or_else(|| "images".to_string()),
                public_url_prefix: require("BABYFACE_PUBLIC_URL_PREFIX")?,
            },
            "http" => StoreConfig::Http {
                upload_url: require("BABYFACE_UPLOAD_URL")?,
                token: get("BABYFACE_UPLOAD_TOKEN"),
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "BABYFACE_STORE".to_string(),
                    value: other.to_string(),
                });
            }
        };

        let results_dir = get("BABYFACE_RESULTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("results"));

        Ok(Self {
            client,
            store,
            results_dir,
        })
    }
}

fn parse_opt<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    match get(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var: var.to_string(), value: raw }),
        None => Ok(None),
    }
}

/// Poll intervals of zero would turn the poll into back-to-back requests.
fn parse_nonzero(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<u64>, ConfigError> {
    match parse_opt::<u64>(get, var)? {
        Some(0) => Err(ConfigError::Invalid { var: var.to_string(), value: "0".to_string() }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_with_git_store() {
        let config = Config::from_lookup(lookup(&[
            ("BABYFACE_API_KEY", "secret"),
            ("BABYFACE_PUBLIC_URL_PREFIX", "https://example.com/raw/main"),
        ])).unwrap();

        assert_eq!(config.client.endpoint_url, DEFAULT_ENDPOINT_URL);
        assert_eq!(config.client.api_key, "secret");
        assert_eq!(config.client.poll_interval, Duration::from_millis(500));
        assert_eq!(config.client.max_attempts, 120);
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.store, StoreConfig::Git {
            repo_dir: PathBuf::from("."),
            images_dir: "images".to_string(),
            public_url_prefix: "https://example.com/raw/main".to_string(),
        });
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BABYFACE_API_KEY", "k"),
            ("BABYFACE_ENDPOINT_URL", "http://localhost:9000/gen"),
            ("BABYFACE_POLL_INTERVAL_MS", "10"),
            ("BABYFACE_POLL_TIMEOUT_SECS", "7"),
            ("BABYFACE_MAX_ATTEMPTS", "3"),
            ("BABYFACE_STORE", "http"),
            ("BABYFACE_UPLOAD_URL", "http://files.local/up"),
            ("BABYFACE_RESULTS_DIR", "/tmp/out"),
        ])).unwrap();

        assert_eq!(config.client.endpoint_url, "http://localhost:9000/gen");
        assert_eq!(config.client.poll_interval, Duration::from_millis(10));
        assert_eq!(config.client.poll_timeout, Duration::from_secs(7));
        assert_eq!(config.client.max_attempts, 3);
        assert_eq!(config.results_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.store, StoreConfig::Http {
            upload_url: "http://files.local/up".to_string(),
            token: None,
        });
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref var) if var == "BABYFACE_API_KEY"));
    }

    #[test]
    fn test_invalid_number() {
        let err = Config::from_lookup(lookup(&[
            ("BABYFACE_API_KEY", "k"),
            ("BABYFACE_MAX_ATTEMPTS", "many"),
        ])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "BABYFACE_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("BABYFACE_API_KEY", "k"),
            ("BABYFACE_PUBLIC_URL_PREFIX", "https://host/raw"),
            ("BABYFACE_POLL_INTERVAL_MS", "0"),
        ])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "BABYFACE_POLL_INTERVAL_MS"));
    }

    #[test]
    fn test_unknown_store_kind() {
        let err = Config::from_lookup(lookup(&[
            ("BABYFACE_API_KEY", "k"),
            ("BABYFACE_STORE", "s3"),
        ])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_status_url_joins_without_double_slash() {
        let config = ClientConfig::new("http://h/gen/", "k");
        assert_eq!(config.status_url("abc"), "http://h/gen/abc");
    }
}
