//! Where the client's screenshots come from.
//!
//! Grabbing the real screen needs the `xcap` feature, which links against the
//! platform's capture libraries. Without it the client can still replay an
//! image file, which is enough to drive a relay for demos and tests.

use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::config::ClientConfig;

pub trait ScreenSource {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to read {path:?}: {source}")]
    File {
        path: PathBuf,
        source: image::ImageError,
    },

    #[cfg(feature = "xcap")]
    #[error("failed to enumerate monitors: {0}")]
    MonitorEnumeration(String),

    #[cfg(feature = "xcap")]
    #[error("no monitor found")]
    NoMonitor,

    #[cfg(feature = "xcap")]
    #[error("screen capture failed: {0}")]
    CaptureFailed(String),
}

/// Re-reads the same file on every capture, so it can be swapped on disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileSource {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ScreenSource for FileSource {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        image::open(&self.path).map_err(|source| CaptureError::File {
            path: self.path.clone(),
            source,
        })
    }
}

/// The primary monitor, or the first one if none reports as primary.
#[cfg(feature = "xcap")]
pub struct MonitorSource;

#[cfg(feature = "xcap")]
impl ScreenSource for MonitorSource {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;
        let primary = monitors
            .iter()
            .position(|m| m.is_primary().unwrap_or(false))
            .unwrap_or(0);
        let monitor = monitors.get(primary).ok_or(CaptureError::NoMonitor)?;

        let image = monitor
            .capture_image()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
        Ok(DynamicImage::ImageRgba8(image))
    }
}

pub fn source_for(config: &ClientConfig) -> anyhow::Result<Box<dyn ScreenSource + Send>> {
    if let Some(path) = &config.image {
        return Ok(Box::new(FileSource::new(path)));
    }

    #[cfg(feature = "xcap")]
    {
        Ok(Box::new(MonitorSource))
    }

    #[cfg(not(feature = "xcap"))]
    {
        anyhow::bail!("no screen capture available: pass --image PATH or build with the `xcap` feature")
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, RgbImage};

    use super::{CaptureError, FileSource, ScreenSource};

    #[test]
    fn file_source_reads_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.png");
        DynamicImage::ImageRgb8(RgbImage::new(12, 8)).save(&path).unwrap();

        let image = FileSource::new(&path).capture().unwrap();
        assert_eq!((image.width(), image.height()), (12, 8));
    }

    #[test]
    fn file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSource::new(dir.path().join("missing.png")).capture();
        assert!(matches!(result, Err(CaptureError::File { .. })));
    }
}
