//! Network statistics
//!
//! The transport samples counters on its own schedule; this module defines
//! the snapshot schema and checks each sample against the epoch contract
//! before it reaches an observer.

pub mod aggregator;
pub mod network;

pub use aggregator::{AggregatorStats, NetworkStatsAggregator, StatsRejection};
pub use network::{
    MediaKind, NetworkCounters, PublisherNetworkStats, SubscriberNetworkStats,
};
