//! Registry entries
//!
//! Connections and streams are plain values. A stream refers to the
//! connection that produced it by id only; resolving it goes through the
//! connection registry.

use std::time::SystemTime;

use crate::media::{VideoDimensions, VideoType};

use super::id::{ConnectionId, StreamId};

/// One participant endpoint (local or remote) in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub creation_time: SystemTime,
    /// Application data attached to the token that created this connection
    pub data: Option<String>,
}

impl Connection {
    pub fn new(id: impl Into<ConnectionId>, data: Option<String>) -> Self {
        Self {
            id: id.into(),
            creation_time: SystemTime::now(),
            data,
        }
    }
}

/// Stream property that can change while the stream is live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProperty {
    HasAudio(bool),
    HasVideo(bool),
    VideoDimensions(VideoDimensions),
}

/// One published audio/video unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: StreamId,
    /// Connection that published this stream
    pub connection_id: ConnectionId,
    pub name: Option<String>,
    pub has_audio: bool,
    pub has_video: bool,
    pub video_dimensions: Option<VideoDimensions>,
    pub video_type: VideoType,
    pub creation_time: SystemTime,
}

impl Stream {
    pub fn new(id: impl Into<StreamId>, connection_id: impl Into<ConnectionId>) -> Self {
        Self {
            id: id.into(),
            connection_id: connection_id.into(),
            name: None,
            has_audio: true,
            has_video: true,
            video_dimensions: None,
            video_type: VideoType::Camera,
            creation_time: SystemTime::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_media(mut self, has_audio: bool, has_video: bool) -> Self {
        self.has_audio = has_audio;
        self.has_video = has_video;
        self
    }

    pub fn with_video_dimensions(mut self, dimensions: VideoDimensions) -> Self {
        self.video_dimensions = Some(dimensions);
        self
    }

    pub fn with_video_type(mut self, video_type: VideoType) -> Self {
        self.video_type = video_type;
        self
    }

    /// Apply a property change.
    ///
    /// Returns `false` if the property already had that value.
    pub fn apply(&mut self, change: StreamProperty) -> bool {
        match change {
            StreamProperty::HasAudio(v) => std::mem::replace(&mut self.has_audio, v) != v,
            StreamProperty::HasVideo(v) => std::mem::replace(&mut self.has_video, v) != v,
            StreamProperty::VideoDimensions(d) => {
                self.video_dimensions.replace(d) != Some(d)
            }
        }
    }
}
