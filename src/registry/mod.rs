//! Connection and stream registries
//!
//! The session keeps two insertion-ordered maps of the entities that are
//! currently live. They hold no behavior beyond CRUD: creation events insert,
//! destruction events remove, and both are idempotent.
//!
//! # Ownership
//!
//! ```text
//!                 SessionController (session context)
//!            ┌──────────────────────────────────────────┐
//!            │ connections: OrderedRegistry<Connection> │
//!            │ streams:     OrderedRegistry<Stream>     │
//!            └───────────────┬──────────────────────────┘
//!                            │ snapshot()
//!                            ▼
//!              Snapshot (Arc, immutable) ──► any thread
//! ```
//!
//! Entities never point back at the session or at each other; a stream
//! names its connection by [`ConnectionId`] and a subscriber names its stream
//! by [`StreamId`].

pub mod entry;
pub mod error;
pub mod id;
pub mod store;

pub use entry::{Connection, Stream, StreamProperty};
pub use error::RegistryError;
pub use id::{ConnectionId, PublisherId, StreamId, SubscriberId};
pub use store::{ConnectionRegistry, OrderedRegistry, RegistryEntry, Snapshot, StreamRegistry};
