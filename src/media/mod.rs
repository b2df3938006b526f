//! Media capability interfaces
//!
//! This module provides:
//! - Video frame and format descriptions (`I420`, `ARGB`, `NV12`)
//! - Capture and render traits implemented outside the session core
//! - Track-level value types shared by streams and publishers

pub mod video;

pub use video::{
    PixelFormat, VideoCapture, VideoCaptureConsumer, VideoDimensions, VideoFormat, VideoFrame,
    VideoOrientation, VideoRender, VideoType, MAX_FRAME_METADATA_BYTES,
};
