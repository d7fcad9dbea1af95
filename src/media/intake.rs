//! Image intake
//!
//! Images reach the editor three ways: picking a local file, dropping a file,
//! or dropping/pasting a URL. All three are normalized to an `EmbeddedImage`
//! before anything is staged.

use std::path::PathBuf;
use std::time::Duration;
use tokio::task;
use tracing::{debug, info};

use super::embedded::EmbeddedImage;
use crate::error::ImageLoadError;

/// Where an image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file chosen in a file picker (or passed on the command line)
    File(PathBuf),
    /// A file dropped onto the editor, already read into memory
    Dropped { name: String, bytes: Vec<u8> },
    /// A remote `http(s)` URL or an inline `data:` URL
    Url(String),
}

impl ImageSource {
    /// Interpret a command-line argument: URLs stay URLs, anything else is a path
    pub fn parse(arg: &str) -> Self {
        let lower = arg.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:") {
            ImageSource::Url(arg.to_string())
        } else {
            ImageSource::File(PathBuf::from(arg))
        }
    }
}

/// Loads images from any `ImageSource`
#[derive(Debug, Clone)]
pub struct ImageIntake {
    client: reqwest::Client,
}

impl ImageIntake {
    /// Create an intake whose URL fetches give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, ImageLoadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Load and validate an image
    ///
    /// The bytes must sniff as a known image format and their header must
    /// decode to pixel dimensions; otherwise nothing is returned.
    pub async fn load(&self, source: ImageSource) -> Result<EmbeddedImage, ImageLoadError> {
        let bytes = match source {
            ImageSource::File(path) => {
                debug!(path = %path.display(), "Reading image file");
                tokio::fs::read(&path).await?
            }
            ImageSource::Dropped { name, bytes } => {
                debug!(name = %name, size = bytes.len(), "Using dropped image");
                bytes
            }
            ImageSource::Url(url) if url.starts_with("data:") => {
                let image = EmbeddedImage::from_data_url(&url)?;
                return validate(image.bytes().to_vec()).await;
            }
            ImageSource::Url(url) => self.fetch(&url).await?,
        };

        validate(bytes).await
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageLoadError> {
        info!(url = %url, "Fetching remote image");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageLoadError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Sniff and probe the bytes off the async thread
async fn validate(bytes: Vec<u8>) -> Result<EmbeddedImage, ImageLoadError> {
    task::spawn_blocking(move || {
        let image = EmbeddedImage::from_bytes(bytes)?;
        let (width, height) = image.dimensions()?;
        debug!(width, height, mime = image.mime(), "Image validated");
        Ok(image)
    })
    .await
    .map_err(|e| ImageLoadError::Task(e.to_string()))?
}
