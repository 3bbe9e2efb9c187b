use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use chrono::Utc;
use tracing::{info, warn};
use crate::job::GeneratedImage;
use crate::store::with_counter;

const FILE_PREFIX: &str = "generated_baby";

/// Writes downloaded results into a directory, one new file per result.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    extension: String,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "jpg".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Saves `bytes` as `generated_baby_<unix millis>.<ext>`.
    ///
    /// Existing files are never overwritten: if the timestamped name is taken
    /// the next free `_1`, `_2`, ... variant is used and the collision logged.
    pub fn save(&self, bytes: Vec<u8>) -> io::Result<GeneratedImage> {
        fs::create_dir_all(&self.dir)?;

        let millis = Utc::now().timestamp_millis();
        let base = self.dir.join(format!("{FILE_PREFIX}_{millis}.{}", self.extension));

        for counter in 0.. {
            let path = with_counter(&base, counter);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&bytes)?;
                    info!("Saved result to {} ({} bytes)", path.display(), bytes.len());
                    return Ok(GeneratedImage { path, bytes });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!("Result file {} already exists, trying another name", path.display());
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("counter range is unbounded")
    }
}
