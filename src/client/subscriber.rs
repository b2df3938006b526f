//! Remote stream subscriber
//!
//! A [`Subscriber`] is bound to one stream at construction and the binding
//! never changes. The session creates a [`SubscriberController`] when the
//! subscriber is subscribed, after checking the stream is registered.
//!
//! ```text
//!   Connecting ──succeeded──► Connected ◄──► Disconnected (media interrupted)
//!       │                        │                │
//!       └──── failed / unsubscribe / stream removed / teardown ──► Destroyed
//! ```
//!
//! Video enablement is tracked separately from the connection state and
//! every change carries a [`VideoEventReason`].

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, ErrorDomain, Result};
use crate::media::{VideoDimensions, VideoRender};
use crate::observer::{SubscriberObserver, VideoEventReason};
use crate::registry::{Stream, StreamId, SubscriberId};
use crate::transport::OperationId;

use super::config::{SubscriberProperty, SubscriberSettings};

/// Subscriber connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberState {
    /// Subscribe requested, waiting for the transport
    Connecting,
    Connected,
    /// Media interrupted; may come back
    Disconnected,
    /// Terminal
    Destroyed,
}

/// Whether the subscriber is receiving video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoState {
    Enabled,
    Disabled,
}

/// A change of [`VideoState`] to report to the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTransition {
    pub enabled: bool,
    pub reason: VideoEventReason,
}

/// Application-side subscriber descriptor
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    stream: StreamId,
    settings: SubscriberSettings,
    observer: Option<Arc<dyn SubscriberObserver>>,
    render: Option<Arc<dyn VideoRender>>,
}

impl Subscriber {
    pub fn new(stream: impl Into<StreamId>, settings: SubscriberSettings) -> Self {
        Self {
            id: SubscriberId::next(),
            stream: stream.into(),
            settings,
            observer: None,
            render: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SubscriberObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_render(mut self, render: Arc<dyn VideoRender>) -> Self {
        self.render = Some(render);
        self
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream
    }

    pub fn settings(&self) -> &SubscriberSettings {
        &self.settings
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("stream", &self.stream)
            .field("settings", &self.settings)
            .field("observer", &self.observer.is_some())
            .field("render", &self.render.is_some())
            .finish()
    }
}

/// Session-side state for one subscriber
pub struct SubscriberController {
    id: SubscriberId,
    stream: StreamId,
    settings: SubscriberSettings,
    observer: Option<Arc<dyn SubscriberObserver>>,
    render: Option<Arc<dyn VideoRender>>,

    state: SubscriberState,
    pending: Option<OperationId>,

    video: VideoState,
    video_reason: Option<VideoEventReason>,
    video_warning: bool,

    /// Last known `has_video` of the bound stream
    stream_has_video: bool,
}

impl SubscriberController {
    /// Create the controller for a subscribe request tagged `op`
    pub fn new(subscriber: Subscriber, stream: &Stream, op: OperationId) -> Self {
        let (video, video_reason) = if !stream.has_video {
            (
                VideoState::Disabled,
                Some(VideoEventReason::PublisherPropertyChanged),
            )
        } else if !subscriber.settings.subscribe_to_video {
            (
                VideoState::Disabled,
                Some(VideoEventReason::SubscriberPropertyChanged),
            )
        } else {
            (VideoState::Enabled, None)
        };

        Self {
            id: subscriber.id,
            stream: subscriber.stream,
            settings: subscriber.settings,
            observer: subscriber.observer,
            render: subscriber.render,
            state: SubscriberState::Connecting,
            pending: Some(op),
            video,
            video_reason,
            video_warning: false,
            stream_has_video: stream.has_video,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn settings(&self) -> &SubscriberSettings {
        &self.settings
    }

    pub fn observer(&self) -> Option<&Arc<dyn SubscriberObserver>> {
        self.observer.as_ref()
    }

    pub fn render(&self) -> Option<&Arc<dyn VideoRender>> {
        self.render.as_ref()
    }

    pub fn pending(&self) -> Option<OperationId> {
        self.pending
    }

    pub fn video_state(&self) -> VideoState {
        self.video
    }

    /// Reason for the last video state change
    pub fn video_reason(&self) -> Option<VideoEventReason> {
        self.video_reason
    }

    pub fn video_warning(&self) -> bool {
        self.video_warning
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == SubscriberState::Destroyed
    }

    /// Fails with a state error once destroyed
    pub fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::state(
                ErrorDomain::Subscriber,
                ErrorCode::SubscriberDestroyed,
                format!("subscriber {} is destroyed", self.id),
            ));
        }
        Ok(())
    }

    /// Apply a subscribe completion. Returns false if `op` was superseded.
    pub fn complete(&mut self, op: OperationId) -> bool {
        if self.pending != Some(op) || self.state != SubscriberState::Connecting {
            return false;
        }
        self.pending = None;
        self.state = SubscriberState::Connected;
        true
    }

    /// Apply a subscribe failure, destroying the subscriber.
    /// Returns false if `op` was superseded.
    pub fn fail(&mut self, op: OperationId) -> bool {
        if self.pending != Some(op) {
            return false;
        }
        self.destroy()
    }

    pub fn media_disconnected(&mut self) -> bool {
        if self.state != SubscriberState::Connected {
            return false;
        }
        self.state = SubscriberState::Disconnected;
        true
    }

    pub fn media_reconnected(&mut self) -> bool {
        if self.state != SubscriberState::Disconnected {
            return false;
        }
        self.state = SubscriberState::Connected;
        true
    }

    /// Move to Destroyed and drop the renderer. Returns false if already
    /// destroyed.
    pub fn destroy(&mut self) -> bool {
        if self.is_destroyed() {
            return false;
        }
        self.state = SubscriberState::Destroyed;
        self.pending = None;
        self.video_warning = false;
        self.render = None;
        true
    }

    /// Swap the renderer, returning the previous one
    pub fn set_render(
        &mut self,
        render: Option<Arc<dyn VideoRender>>,
    ) -> Result<Option<Arc<dyn VideoRender>>> {
        self.ensure_live()?;
        Ok(std::mem::replace(&mut self.render, render))
    }

    /// Change a property. Returns whether the value changed and the video
    /// transition it caused, if any.
    pub fn set_property(
        &mut self,
        property: SubscriberProperty,
    ) -> Result<(bool, Option<VideoTransition>)> {
        self.ensure_live()?;

        let outcome = match property {
            SubscriberProperty::SubscribeToAudio(enabled) => {
                let changed = self.settings.subscribe_to_audio != enabled;
                self.settings.subscribe_to_audio = enabled;
                (changed, None)
            }
            SubscriberProperty::SubscribeToVideo(enabled) => {
                let changed = self.settings.subscribe_to_video != enabled;
                self.settings.subscribe_to_video = enabled;
                let transition = if !changed {
                    None
                } else if enabled && self.stream_has_video {
                    self.apply_video(true, VideoEventReason::SubscriberPropertyChanged)
                } else if !enabled {
                    self.apply_video(false, VideoEventReason::SubscriberPropertyChanged)
                } else {
                    None
                };
                (changed, transition)
            }
            SubscriberProperty::PreferredResolution(resolution) => {
                let changed = self.settings.preferred_resolution != resolution;
                self.settings.preferred_resolution = resolution;
                (changed, None)
            }
            SubscriberProperty::PreferredFrameRate(fps) => {
                let changed = self.settings.preferred_frame_rate != fps;
                self.settings.preferred_frame_rate = fps;
                (changed, None)
            }
        };
        Ok(outcome)
    }

    /// The bound stream started or stopped carrying video
    pub fn stream_video_changed(&mut self, has_video: bool) -> Option<VideoTransition> {
        if self.is_destroyed() || self.stream_has_video == has_video {
            return None;
        }
        self.stream_has_video = has_video;

        if has_video && !self.settings.subscribe_to_video {
            return None;
        }
        self.apply_video(has_video, VideoEventReason::PublisherPropertyChanged)
    }

    /// Video change reported by the transport (quality, codec)
    pub fn transport_video_changed(
        &mut self,
        enabled: bool,
        reason: VideoEventReason,
    ) -> Option<VideoTransition> {
        if self.is_destroyed() {
            return None;
        }
        if enabled && !(self.settings.subscribe_to_video && self.stream_has_video) {
            return None;
        }
        self.apply_video(enabled, reason)
    }

    /// Record the video-disable advisory. Returns whether it changed.
    pub fn set_video_warning(&mut self, active: bool) -> bool {
        if self.is_destroyed() || self.video_warning == active {
            return false;
        }
        self.video_warning = active;
        true
    }

    fn apply_video(&mut self, enabled: bool, reason: VideoEventReason) -> Option<VideoTransition> {
        let target = if enabled {
            VideoState::Enabled
        } else {
            VideoState::Disabled
        };
        if self.video == target {
            return None;
        }
        self.video = target;
        self.video_reason = Some(reason);
        Some(VideoTransition { enabled, reason })
    }

    /// Preferred resolution hint, if any
    pub fn preferred_resolution(&self) -> Option<VideoDimensions> {
        self.settings.preferred_resolution
    }
}

impl fmt::Debug for SubscriberController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberController")
            .field("id", &self.id)
            .field("stream", &self.stream)
            .field("state", &self.state)
            .field("video", &self.video)
            .finish()
    }
}
