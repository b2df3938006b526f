//! Client-side session core for real-time audio/video
//!
//! Coordinates a client's membership in a shared session: connecting and
//! reconnecting, publishing one local stream, subscribing to remote ones,
//! and routing small out-of-band signals. Media, ICE and the wire protocol
//! live behind the [`Transport`](transport::Transport) trait.
//!
//! ```no_run
//! use rtc_session::client::{Publisher, PublisherSettings};
//! use rtc_session::session::{Session, SessionConfig};
//! # use rtc_session::transport::Transport;
//! # fn transport(_: rtc_session::session::EventSink) -> Box<dyn Transport> { unimplemented!() }
//!
//! # async fn example() -> rtc_session::error::Result<()> {
//! let session = Session::spawn(SessionConfig::new("k1", "s1"), transport);
//! session.connect("token").await?;
//!
//! let publisher = Publisher::new(PublisherSettings::new().name("camera"));
//! session.publish(publisher).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod media;
pub mod observer;
pub mod registry;
pub mod session;
pub mod signal;
pub mod stats;
pub mod transport;

pub use error::{Error, ErrorCode, ErrorDomain, ErrorKind, Result};
pub use session::{Session, SessionConfig, SessionController, SessionStatus};
