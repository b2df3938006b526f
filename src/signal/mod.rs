//! Out-of-band signaling
//!
//! Small typed messages routed through the session, either to one
//! connection or broadcast to all of them.

pub mod message;
pub mod router;

pub use message::{
    validate_payload, validate_type, ReceivedSignal, Signal, MAX_SIGNAL_PAYLOAD_BYTES,
    MAX_SIGNAL_TYPE_LEN,
};
pub use router::{Delivery, RouterStats, Routing, SignalRouter};
