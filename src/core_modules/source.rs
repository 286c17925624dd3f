//! Video sources and the decode seam used by stream workers.
//!
//! Opening and decoding are behind the `VideoOpener` / `FrameReader` traits so
//! the worker loop does not depend on a particular video backend. The
//! `lane_monitor` binary provides an OpenCV implementation.

use crate::error::{DecodeError, OpenError};
use std::fmt;
use std::path::{Path, PathBuf};

/// A decoded RGB frame.
pub type Frame = image::RgbImage;

/// Identifier of one uploaded video (file path or URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoSource {
    location: PathBuf,
}

impl VideoSource {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location.display())
    }
}

impl From<PathBuf> for VideoSource {
    fn from(location: PathBuf) -> Self {
        Self::new(location)
    }
}

impl From<&str> for VideoSource {
    fn from(location: &str) -> Self {
        Self::new(location)
    }
}

/// An open video handle. Dropping the reader releases the underlying source.
pub trait FrameReader: Send {
    /// Returns the next frame, or `None` once the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<Frame>, DecodeError>;
}

/// Opens video sources for reading.
pub trait VideoOpener: Send + Sync {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn FrameReader>, OpenError>;
}
