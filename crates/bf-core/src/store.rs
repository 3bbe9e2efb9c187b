//! Publishing parent images at publicly reachable URLs.
//!
//! The generation service only accepts image URLs, so local photos are first
//! put into an [`ImageStore`].

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;
use image::{DynamicImage, ImageFormat, ImageReader};
use reqwest::blocking::Client;
use tracing::{debug, info};
use crate::error::StoreError;

pub trait ImageStore: Send + Sync {
    /// Stores `bytes` under (roughly) `name` and returns the public URL.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRole {
    Father,
    Mother,
}

impl ParentRole {
    pub fn suffix(&self) -> &str {
        match self {
            Self::Father => "_father",
            Self::Mother => "_mother",
        }
    }
}

impl fmt::Display for ParentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Father => f.write_str("father"),
            Self::Mother => f.write_str("mother"),
        }
    }
}

impl FromStr for ParentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "father" => Ok(Self::Father),
            "mother" => Ok(Self::Mother),
            other => Err(format!("unknown parent role '{other}', expected father or mother")),
        }
    }
}

/// Re-encodes a parent photo for upload: alpha is dropped and the file is
/// renamed to `<stem>_father.<ext>` / `<stem>_mother.<ext>`. Unknown
/// extensions are written as JPEG.
pub fn prepare_parent_image(path: &Path, role: ParentRole) -> Result<(String, Vec<u8>), StoreError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| StoreError::InvalidPath(path.to_path_buf()))?;

    let (format, ext) = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(|ext| ImageFormat::from_extension(&ext).map(|format| (format, ext)))
        .unwrap_or((ImageFormat::Jpeg, "jpg".to_string()));

    let mut img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    if img.color().has_alpha() || format == ImageFormat::Jpeg {
        img = DynamicImage::ImageRgb8(img.to_rgb8());
    }

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format)?;

    let name = format!("{stem}{}.{ext}", role.suffix());
    debug!("Prepared {} image {} ({} bytes)", role, name, buf.get_ref().len());

    Ok((name, buf.into_inner()))
}

/// Prepares a parent photo and puts it into `store`, returning its URL.
pub fn publish_parent(store: &dyn ImageStore, path: &Path, role: ParentRole) -> Result<String, StoreError> {
    let (name, bytes) = prepare_parent_image(path, role)?;
    let url = store.put(&name, &bytes)?;
    info!("Published {} image at {}", role, url);
    Ok(url)
}

/// `dir/stem.ext`, then `dir/stem_1.ext`, `dir/stem_2.ext`, ...
pub(crate) fn with_counter(path: &Path, counter: u32) -> PathBuf {
    if counter == 0 {
        return path.to_path_buf();
    }

    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}_{counter}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{counter}"),
    };
    path.with_file_name(file_name)
}

/// First name in the [`with_counter`] sequence that does not exist yet.
pub(crate) fn unique_path(path: &Path) -> PathBuf {
    (0..)
        .map(|counter| with_counter(path, counter))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Uses a git checkout as an image host: files are committed and pushed, and
/// the remote serves them under `public_url_prefix`.
#[derive(Debug, Clone)]
pub struct GitImageStore {
    repo_dir: PathBuf,
    images_dir: String,
    public_url_prefix: String,
}

impl GitImageStore {
    pub fn new(repo_dir: impl Into<PathBuf>, images_dir: impl Into<String>, public_url_prefix: impl Into<String>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            images_dir: images_dir.into(),
            public_url_prefix: public_url_prefix.into(),
        }
    }

    pub fn url_for(&self, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_url_prefix.trim_end_matches('/'),
            self.images_dir.trim_matches('/'),
            file_name
        )
    }

    fn git(&self, args: &[&str]) -> Result<(), StoreError> {
        let command = format!("git {}", args.join(" "));
        debug!("Running {} in {}", command, self.repo_dir.display());

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()?;

        if !output.status.success() {
            return Err(StoreError::Git {
                command,
                code: output.status.code().map_or_else(|| "signal".to_string(), |c| format!("exit {c}")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

impl ImageStore for GitImageStore {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let dir = self.repo_dir.join(&self.images_dir);
        fs::create_dir_all(&dir)?;

        let path = unique_path(&dir.join(name));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidPath(path.clone()))?
            .to_string();
        fs::write(&path, bytes)?;
        debug!("Image saved to {}", path.display());

        let relative = format!("{}/{}", self.images_dir.trim_matches('/'), file_name);
        self.git(&["add", &relative])?;
        self.git(&["commit", "-m", &format!("Add {relative}")])?;
        self.git(&["push"])?;

        Ok(self.url_for(&file_name))
    }
}

/// Uploads images with `PUT <upload_url>/<name>` to a static file host.
pub struct HttpImageStore {
    http: Client,
    upload_url: String,
    token: Option<String>,
}

impl HttpImageStore {
    pub fn new(upload_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            upload_url: upload_url.into(),
            token,
        })
    }
}

impl ImageStore for HttpImageStore {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let url = format!("{}/{}", self.upload_url.trim_end_matches('/'), name);
        let content_type = ImageFormat::from_path(name)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");

        let mut request = self.http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Upload {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn write_rgba_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 128]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_prepare_drops_alpha_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rgba_png(dir.path(), "dad.png");

        let (name, bytes) = prepare_parent_image(&path, ParentRole::Father).unwrap();
        assert_eq!(name, "dad_father.png");

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(!decoded.color().has_alpha());
        assert_eq!(decoded.dimensions(), (8, 8));
    }

    #[test]
    fn test_prepare_unknown_extension_becomes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let png = write_rgba_png(dir.path(), "mum.png");
        let odd = dir.path().join("mum.photo");
        fs::copy(&png, &odd).unwrap();

        let (name, bytes) = prepare_parent_image(&odd, ParentRole::Mother).unwrap();
        assert_eq!(name, "mum_mother.jpg");
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_prepare_missing_file() {
        let err = prepare_parent_image(Path::new("/nonexistent/dad.jpg"), ParentRole::Father).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_unique_path_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("a_father.jpg");
        assert_eq!(unique_path(&base), base);

        fs::write(&base, b"x").unwrap();
        fs::write(dir.path().join("a_father_1.jpg"), b"x").unwrap();
        assert_eq!(unique_path(&base), dir.path().join("a_father_2.jpg"));
    }

    #[test]
    fn test_git_url_for() {
        let store = GitImageStore::new(".", "images/", "https://github.com/u/r/raw/main/");
        assert_eq!(store.url_for("x_father.jpg"), "https://github.com/u/r/raw/main/images/x_father.jpg");
    }

    #[test]
    fn test_git_put_outside_repository_fails_after_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = GitImageStore::new(dir.path(), "images", "https://host/raw");

        let err = store.put("a_father.jpg", b"bytes").unwrap_err();
        assert!(matches!(err, StoreError::Git { .. } | StoreError::Io(_)));
        assert_eq!(fs::read(dir.path().join("images/a_father.jpg")).unwrap(), b"bytes");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Father".parse::<ParentRole>().unwrap(), ParentRole::Father);
        assert_eq!("mother".parse::<ParentRole>().unwrap(), ParentRole::Mother);
        assert!("uncle".parse::<ParentRole>().is_err());
    }
}
