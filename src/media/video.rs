//! Video frames and capture/render capabilities
//!
//! Capturers and renderers live outside the session core. The core only
//! holds them as opaque `Arc<dyn …>` capabilities, binds them to a
//! publisher or subscriber, and releases them on teardown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCode, ErrorDomain, Result};

/// Maximum size of per-frame metadata
pub const MAX_FRAME_METADATA_BYTES: usize = 32;

/// Width and height of a video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

impl VideoDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels per frame
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for VideoDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Source of a published video track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoType {
    #[default]
    Camera,
    Screen,
}

/// Pixel layout of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar Y, U, V (3 planes)
    I420,
    /// Packed 32-bit ARGB (1 plane)
    Argb,
    /// Y plane plus interleaved UV plane (2 planes)
    Nv12,
}

impl PixelFormat {
    /// Number of plane buffers a frame in this format carries
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::I420 => 3,
            PixelFormat::Argb => 1,
            PixelFormat::Nv12 => 2,
        }
    }
}

/// Rotation applied to a frame before display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VideoOrientation {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

/// Describes the layout of frames produced by a capturer
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFormat {
    pub name: String,
    pub pixel_format: PixelFormat,
    pub bytes_per_row: Vec<usize>,
    pub dimensions: VideoDimensions,
    pub estimated_fps: f64,
    pub estimated_capture_delay: Duration,
}

impl VideoFormat {
    /// Create a format with tightly packed rows
    pub fn new(pixel_format: PixelFormat, dimensions: VideoDimensions) -> Self {
        let w = dimensions.width as usize;
        let bytes_per_row = match pixel_format {
            PixelFormat::I420 => vec![w, w.div_ceil(2), w.div_ceil(2)],
            PixelFormat::Argb => vec![w * 4],
            PixelFormat::Nv12 => vec![w, w.div_ceil(2) * 2],
        };

        Self {
            name: String::new(),
            pixel_format,
            bytes_per_row,
            dimensions,
            estimated_fps: 30.0,
            estimated_capture_delay: Duration::ZERO,
        }
    }
}

/// A single captured or decoded frame
///
/// Planes are `Bytes`, so handing a frame to several consumers only bumps
/// reference counts.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub format: VideoFormat,
    pub planes: Vec<Bytes>,
    /// Presentation timestamp
    pub timestamp: Duration,
    pub orientation: VideoOrientation,
    metadata: Option<Bytes>,
}

impl VideoFrame {
    pub fn new(format: VideoFormat, planes: Vec<Bytes>, timestamp: Duration) -> Self {
        Self {
            format,
            planes,
            timestamp,
            orientation: VideoOrientation::Up,
            metadata: None,
        }
    }

    pub fn with_orientation(mut self, orientation: VideoOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Attach metadata to the frame.
    ///
    /// Fails without touching the existing metadata if `data` is longer
    /// than [`MAX_FRAME_METADATA_BYTES`].
    pub fn set_metadata(&mut self, data: Bytes) -> Result<()> {
        if data.len() > MAX_FRAME_METADATA_BYTES {
            return Err(Error::validation(
                ErrorDomain::Publisher,
                ErrorCode::FrameMetadataTooLarge,
                format!(
                    "frame metadata is {} bytes, limit is {}",
                    data.len(),
                    MAX_FRAME_METADATA_BYTES
                ),
            ));
        }
        self.metadata = Some(data);
        Ok(())
    }

    pub fn metadata(&self) -> Option<&Bytes> {
        self.metadata.as_ref()
    }

    pub fn clear_planes(&mut self) {
        self.planes.clear();
    }

    /// Whether the plane count matches the pixel format
    pub fn is_complete(&self) -> bool {
        self.planes.len() == self.format.pixel_format.plane_count()
    }
}

/// Receives frames pushed by a capturer
pub trait VideoCaptureConsumer: Send + Sync {
    fn consume_frame(&self, frame: VideoFrame);
}

/// External video source bound to a publisher
pub trait VideoCapture: Send + Sync {
    fn init_capture(&self);

    fn release_capture(&self);

    fn start_capture(&self) -> Result<()>;

    fn stop_capture(&self) -> Result<()>;

    fn is_capture_started(&self) -> bool;

    /// Format the capturer will produce
    fn capture_settings(&self) -> Option<VideoFormat>;

    /// Register the consumer frames are pushed to
    fn set_consumer(&self, consumer: Option<Arc<dyn VideoCaptureConsumer>>);
}

/// External video sink bound to a publisher preview or a subscriber
pub trait VideoRender: Send + Sync {
    fn render_frame(&self, frame: &VideoFrame);
}
