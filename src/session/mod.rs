//! Session lifecycle
//!
//! This module provides:
//! - The session state machine and its permitted transitions
//! - Session configuration (ICE, reconnection, signal queue bounds)
//! - The synchronous [`SessionController`]
//! - The async [`Session`] handle running a controller on its own task

pub mod config;
pub mod context;
pub mod controller;
pub mod runtime;
pub mod state;

pub use config::{
    IceConfig, IceIncludeServers, IceServer, IceTransportPolicy, ReconnectPolicy, SessionConfig,
    SessionSettings, MAX_TURN_SERVERS,
};
pub use context::{Capabilities, SessionContext};
pub use controller::SessionController;
pub use runtime::{EventSink, Session, SessionBuilder};
pub use state::{InvalidTransition, SessionState, SessionStatus};
