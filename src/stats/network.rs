//! Network statistics snapshots
//!
//! Immutable values produced by the transport's sampler. Cumulative
//! counters only grow within an epoch; a new `start_time_ms` marks a reset
//! (reconnection, or a new underlying media session).

use crate::registry::ConnectionId;

/// Which track a sample describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Cumulative transfer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub packets_lost: u64,
    /// Packets sent (publisher side) or received (subscriber side)
    pub packets: u64,
    /// Bytes sent (publisher side) or received (subscriber side)
    pub bytes: u64,
}

impl NetworkCounters {
    pub fn new(packets_lost: u64, packets: u64, bytes: u64) -> Self {
        Self {
            packets_lost,
            packets,
            bytes,
        }
    }

    /// True if no counter is smaller than in `earlier`
    pub fn dominates(&self, earlier: &NetworkCounters) -> bool {
        self.packets_lost >= earlier.packets_lost
            && self.packets >= earlier.packets
            && self.bytes >= earlier.bytes
    }

    /// Lost packets as a fraction of all packets (0.0 - 1.0)
    pub fn loss_ratio(&self) -> f64 {
        let total = self.packets + self.packets_lost;
        if total > 0 {
            self.packets_lost as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Counter growth since `earlier`, saturating at zero
    pub fn delta(&self, earlier: &NetworkCounters) -> NetworkCounters {
        NetworkCounters {
            packets_lost: self.packets_lost.saturating_sub(earlier.packets_lost),
            packets: self.packets.saturating_sub(earlier.packets),
            bytes: self.bytes.saturating_sub(earlier.bytes),
        }
    }
}

/// One publisher-side sample, per subscribing connection
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherNetworkStats {
    /// Connection of the subscriber receiving this publisher's media
    pub connection_id: ConnectionId,
    /// Subscriber id as reported by the transport
    pub subscriber_id: String,
    pub kind: MediaKind,
    pub counters: NetworkCounters,
    /// Sample time, milliseconds since the Unix epoch
    pub timestamp_ms: f64,
    /// Start of the counter epoch, milliseconds since the Unix epoch
    pub start_time_ms: Option<f64>,
}

impl PublisherNetworkStats {
    pub fn packets_sent(&self) -> u64 {
        self.counters.packets
    }

    pub fn bytes_sent(&self) -> u64 {
        self.counters.bytes
    }
}

/// One subscriber-side sample
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberNetworkStats {
    pub kind: MediaKind,
    pub counters: NetworkCounters,
    /// Sample time, milliseconds since the Unix epoch
    pub timestamp_ms: f64,
    /// Start of the counter epoch, milliseconds since the Unix epoch
    pub start_time_ms: Option<f64>,
}

impl SubscriberNetworkStats {
    pub fn packets_received(&self) -> u64 {
        self.counters.packets
    }

    pub fn bytes_received(&self) -> u64 {
        self.counters.bytes
    }
}
