//! Publisher and subscriber settings

use serde::{Deserialize, Serialize};

use crate::media::{VideoDimensions, VideoType};

/// Lowest audio bitrate accepted by the encoder (bits/sec)
pub const MIN_AUDIO_BITRATE: u32 = 6_000;

/// Highest audio bitrate accepted by the encoder (bits/sec)
pub const MAX_AUDIO_BITRATE: u32 = 510_000;

/// Default audio bitrate (bits/sec)
pub const DEFAULT_AUDIO_BITRATE: u32 = 40_000;

/// Settings for a local publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherSettings {
    /// Stream name shown to other participants
    #[serde(default)]
    pub name: Option<String>,

    /// Publish an audio track
    #[serde(default = "default_true")]
    pub audio_track: bool,

    /// Publish a video track
    #[serde(default = "default_true")]
    pub video_track: bool,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u32,

    #[serde(default)]
    pub video_type: VideoType,

    /// Explicit audio-fallback policy; `None` uses the default for `video_type`
    #[serde(default)]
    pub audio_fallback_enabled: Option<bool>,
}

fn default_true() -> bool {
    true
}

fn default_audio_bitrate() -> u32 {
    DEFAULT_AUDIO_BITRATE
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            name: None,
            audio_track: true,
            video_track: true,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
            video_type: VideoType::Camera,
            audio_fallback_enabled: None,
        }
    }
}

impl PublisherSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn audio_track(mut self, enabled: bool) -> Self {
        self.audio_track = enabled;
        self
    }

    pub fn video_track(mut self, enabled: bool) -> Self {
        self.video_track = enabled;
        self
    }

    /// Set the audio bitrate, clamped to the encoder's range
    pub fn audio_bitrate(mut self, bitrate: u32) -> Self {
        self.audio_bitrate = bitrate.clamp(MIN_AUDIO_BITRATE, MAX_AUDIO_BITRATE);
        self
    }

    pub fn video_type(mut self, video_type: VideoType) -> Self {
        self.video_type = video_type;
        self
    }

    pub fn audio_fallback(mut self, enabled: bool) -> Self {
        self.audio_fallback_enabled = Some(enabled);
        self
    }

    /// Effective audio-fallback policy.
    ///
    /// Camera video falls back to audio-only by default; screen sharing
    /// does not.
    pub fn audio_fallback_effective(&self) -> bool {
        self.audio_fallback_enabled
            .unwrap_or(self.video_type == VideoType::Camera)
    }
}

/// Publisher property that can change while publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherProperty {
    PublishAudio(bool),
    PublishVideo(bool),
    AudioFallback(bool),
}

/// Settings for a subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberSettings {
    #[serde(default = "default_true")]
    pub subscribe_to_audio: bool,

    #[serde(default = "default_true")]
    pub subscribe_to_video: bool,

    /// Hint for the largest resolution worth receiving
    #[serde(default)]
    pub preferred_resolution: Option<VideoDimensions>,

    /// Hint for the highest frame rate worth receiving
    #[serde(default)]
    pub preferred_frame_rate: Option<f32>,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            subscribe_to_audio: true,
            subscribe_to_video: true,
            preferred_resolution: None,
            preferred_frame_rate: None,
        }
    }
}

impl SubscriberSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_to_audio(mut self, enabled: bool) -> Self {
        self.subscribe_to_audio = enabled;
        self
    }

    pub fn subscribe_to_video(mut self, enabled: bool) -> Self {
        self.subscribe_to_video = enabled;
        self
    }

    pub fn preferred_resolution(mut self, resolution: VideoDimensions) -> Self {
        self.preferred_resolution = Some(resolution);
        self
    }

    pub fn preferred_frame_rate(mut self, fps: f32) -> Self {
        self.preferred_frame_rate = Some(fps);
        self
    }
}

/// Subscriber property that can change while subscribed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubscriberProperty {
    SubscribeToAudio(bool),
    SubscribeToVideo(bool),
    PreferredResolution(Option<VideoDimensions>),
    PreferredFrameRate(Option<f32>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_fallback_defaults_by_video_type() {
        assert!(PublisherSettings::default().audio_fallback_effective());

        let screen = PublisherSettings::default().video_type(VideoType::Screen);
        assert!(!screen.audio_fallback_effective());

        let forced = screen.audio_fallback(true);
        assert!(forced.audio_fallback_effective());

        let camera_off = PublisherSettings::default().audio_fallback(false);
        assert!(!camera_off.audio_fallback_effective());
    }

    #[test]
    fn test_audio_bitrate_clamped() {
        assert_eq!(PublisherSettings::new().audio_bitrate(1).audio_bitrate, MIN_AUDIO_BITRATE);
        assert_eq!(
            PublisherSettings::new().audio_bitrate(u32::MAX).audio_bitrate,
            MAX_AUDIO_BITRATE
        );
        assert_eq!(PublisherSettings::new().audio_bitrate(64_000).audio_bitrate, 64_000);
    }

    #[test]
    fn test_subscriber_settings_builder() {
        let settings = SubscriberSettings::new()
            .subscribe_to_video(false)
            .preferred_resolution(VideoDimensions::new(320, 240))
            .preferred_frame_rate(15.0);

        assert!(settings.subscribe_to_audio);
        assert!(!settings.subscribe_to_video);
        assert_eq!(settings.preferred_resolution, Some(VideoDimensions::new(320, 240)));
        assert_eq!(settings.preferred_frame_rate, Some(15.0));
    }

    #[test]
    fn test_publisher_settings_from_json() {
        let settings: PublisherSettings =
            serde_json::from_str(r#"{ "name": "cam", "video_type": "screen" }"#).unwrap();

        assert_eq!(settings.name.as_deref(), Some("cam"));
        assert!(settings.audio_track);
        assert_eq!(settings.audio_bitrate, DEFAULT_AUDIO_BITRATE);
        assert!(!settings.audio_fallback_effective());
    }
}
