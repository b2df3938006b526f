//! Local publisher
//!
//! [`Publisher`] is the application-side handle: settings, an optional
//! observer and an optional capturer. The session turns it into a
//! [`PublisherController`] the first time it is published and drives the
//! lifecycle from there:
//!
//! ```text
//!   Idle ──publish──► Idle(pending op) ──succeeded──► Publishing ──unpublish──► Stopped
//!     ▲                     │                                                     ▲
//!     └────── failed ───────┘──────────────── unpublish / teardown ───────────────┘
//! ```
//!
//! Stopped is terminal. Republishing needs a new `Publisher`.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, ErrorDomain, Result};
use crate::media::VideoCapture;
use crate::observer::PublisherObserver;
use crate::registry::{PublisherId, StreamId};
use crate::transport::OperationId;

use super::config::{PublisherProperty, PublisherSettings};

/// Publisher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublisherState {
    /// Not publishing; a publish request may be in flight
    Idle,
    Publishing,
    /// Terminal
    Stopped,
}

/// Application-side publisher descriptor
#[derive(Clone)]
pub struct Publisher {
    id: PublisherId,
    settings: PublisherSettings,
    observer: Option<Arc<dyn PublisherObserver>>,
    capture: Option<Arc<dyn VideoCapture>>,
}

impl Publisher {
    pub fn new(settings: PublisherSettings) -> Self {
        Self {
            id: PublisherId::next(),
            settings,
            observer: None,
            capture: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PublisherObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Use an external capturer instead of the transport's default source
    pub fn with_capture(mut self, capture: Arc<dyn VideoCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn id(&self) -> PublisherId {
        self.id
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(PublisherSettings::default())
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("observer", &self.observer.is_some())
            .field("capture", &self.capture.is_some())
            .finish()
    }
}

/// Session-side state for one publisher
pub struct PublisherController {
    id: PublisherId,
    settings: PublisherSettings,
    observer: Option<Arc<dyn PublisherObserver>>,
    capture: Option<Arc<dyn VideoCapture>>,

    state: PublisherState,

    /// In-flight publish request
    pending: Option<OperationId>,

    /// Stream produced once publishing
    stream: Option<StreamId>,

    publish_audio: bool,
    publish_video: bool,
    audio_fallback: bool,

    /// Outgoing video currently disabled by audio-fallback
    video_fallback_active: bool,
}

impl PublisherController {
    pub fn new(publisher: &Publisher) -> Self {
        Self {
            id: publisher.id,
            settings: publisher.settings.clone(),
            observer: publisher.observer.clone(),
            capture: publisher.capture.clone(),
            state: PublisherState::Idle,
            pending: None,
            stream: None,
            publish_audio: publisher.settings.audio_track,
            publish_video: publisher.settings.video_track,
            audio_fallback: publisher.settings.audio_fallback_effective(),
            video_fallback_active: false,
        }
    }

    pub fn id(&self) -> PublisherId {
        self.id
    }

    pub fn state(&self) -> PublisherState {
        self.state
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    pub fn observer(&self) -> Option<&Arc<dyn PublisherObserver>> {
        self.observer.as_ref()
    }

    pub fn capture(&self) -> Option<&Arc<dyn VideoCapture>> {
        self.capture.as_ref()
    }

    pub fn stream_id(&self) -> Option<&StreamId> {
        self.stream.as_ref()
    }

    pub fn pending(&self) -> Option<OperationId> {
        self.pending
    }

    /// Publishing, or waiting for a publish to complete
    pub fn is_active(&self) -> bool {
        self.state == PublisherState::Publishing || self.pending.is_some()
    }

    pub fn publish_audio(&self) -> bool {
        self.publish_audio
    }

    /// Video requested by the application, regardless of audio-fallback
    pub fn publish_video(&self) -> bool {
        self.publish_video
    }

    pub fn audio_fallback_enabled(&self) -> bool {
        self.audio_fallback
    }

    /// Whether video is actually flowing
    pub fn video_enabled(&self) -> bool {
        self.publish_video && !self.video_fallback_active
    }

    fn ensure_not_stopped(&self) -> Result<()> {
        if self.state == PublisherState::Stopped {
            return Err(Error::state(
                ErrorDomain::Publisher,
                ErrorCode::PublisherStopped,
                format!("publisher {} is stopped", self.id),
            ));
        }
        Ok(())
    }

    /// Record an outgoing publish request
    pub fn begin(&mut self, op: OperationId) -> Result<()> {
        self.ensure_not_stopped()?;
        if self.is_active() {
            return Err(Error::capacity(
                ErrorDomain::Publisher,
                ErrorCode::PublisherAlreadyActive,
                format!("publisher {} is already publishing", self.id),
            ));
        }

        if let Some(capture) = &self.capture {
            capture.init_capture();
        }
        self.pending = Some(op);
        Ok(())
    }

    /// Apply a publish completion. Returns false if `op` was superseded.
    pub fn complete(&mut self, op: OperationId, stream: StreamId) -> bool {
        if self.pending != Some(op) {
            return false;
        }
        self.pending = None;
        self.stream = Some(stream);
        self.state = PublisherState::Publishing;
        true
    }

    /// Apply a publish failure. Returns false if `op` was superseded.
    pub fn fail(&mut self, op: OperationId) -> bool {
        if self.pending != Some(op) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Move to Stopped and release the capturer, returning the stream that
    /// was being published. Stopping twice is a no-op.
    pub fn stop(&mut self) -> Option<StreamId> {
        if self.state == PublisherState::Stopped {
            return None;
        }

        self.state = PublisherState::Stopped;
        self.pending = None;
        self.video_fallback_active = false;
        self.release_capture();
        self.stream.take()
    }

    fn release_capture(&mut self) {
        let Some(capture) = self.capture.take() else {
            return;
        };

        if capture.is_capture_started() {
            if let Err(e) = capture.stop_capture() {
                tracing::warn!(publisher = %self.id, error = %e, "Failed to stop capture");
            }
        }
        capture.set_consumer(None);
        capture.release_capture();
        tracing::debug!(publisher = %self.id, "Capture released");
    }

    /// Swap the capturer, releasing the previous one
    pub fn set_capture(&mut self, capture: Option<Arc<dyn VideoCapture>>) -> Result<()> {
        self.ensure_not_stopped()?;
        self.release_capture();
        if let Some(capture) = &capture {
            if self.is_active() {
                capture.init_capture();
            }
        }
        self.capture = capture;
        Ok(())
    }

    /// Change a property. Returns whether the value changed.
    pub fn set_property(&mut self, property: PublisherProperty) -> Result<bool> {
        self.ensure_not_stopped()?;

        let slot = match property {
            PublisherProperty::PublishAudio(enabled) => (&mut self.publish_audio, enabled),
            PublisherProperty::PublishVideo(enabled) => (&mut self.publish_video, enabled),
            PublisherProperty::AudioFallback(enabled) => (&mut self.audio_fallback, enabled),
        };
        let changed = *slot.0 != slot.1;
        *slot.0 = slot.1;

        if let PublisherProperty::AudioFallback(false) = property {
            self.video_fallback_active = false;
        }
        Ok(changed)
    }

    /// Reflect a fallback toggle reported by the transport.
    ///
    /// Only honored while publishing with audio-fallback enabled, and only
    /// reported when the value actually changes.
    pub fn reflect_video_fallback(&mut self, video_enabled: bool) -> bool {
        if self.state != PublisherState::Publishing || !self.audio_fallback {
            return false;
        }
        let disabled = !video_enabled;
        if self.video_fallback_active == disabled {
            return false;
        }
        self.video_fallback_active = disabled;
        true
    }
}

impl fmt::Debug for PublisherController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherController")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.pending)
            .field("stream", &self.stream)
            .finish()
    }
}
