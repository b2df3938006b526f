//! Local publisher and remote subscribers
//!
//! Application-side descriptors ([`Publisher`], [`Subscriber`]) and the
//! controllers the session keeps for them:
//! - one publisher may be active per session
//! - one subscriber per subscribed remote stream

pub mod config;
pub mod publisher;
pub mod subscriber;

pub use config::{
    PublisherProperty, PublisherSettings, SubscriberProperty, SubscriberSettings,
    DEFAULT_AUDIO_BITRATE, MAX_AUDIO_BITRATE, MIN_AUDIO_BITRATE,
};
pub use publisher::{Publisher, PublisherController, PublisherState};
pub use subscriber::{
    Subscriber, SubscriberController, SubscriberState, VideoState, VideoTransition,
};
