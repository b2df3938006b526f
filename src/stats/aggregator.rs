//! Network statistics aggregation
//!
//! Sits between the transport's sampler and the publisher/subscriber
//! observers. Every sample is checked against the last accepted one for the
//! same key before it is delivered:
//!
//! - timestamps never go backwards within an epoch
//! - cumulative counters never decrease within an epoch
//! - a different `start_time_ms` opens a new epoch and resets both checks
//!
//! Samples that break the contract are dropped and counted.

use std::collections::HashMap;

use crate::registry::{ConnectionId, PublisherId, SubscriberId};

use super::network::{MediaKind, NetworkCounters, PublisherNetworkStats, SubscriberNetworkStats};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum StatsKey {
    Publisher {
        publisher: PublisherId,
        connection: ConnectionId,
        subscriber: String,
        kind: MediaKind,
    },
    Subscriber {
        subscriber: SubscriberId,
        kind: MediaKind,
    },
}

impl StatsKey {
    fn belongs_to_publisher(&self, id: PublisherId) -> bool {
        matches!(self, StatsKey::Publisher { publisher, .. } if *publisher == id)
    }

    fn belongs_to_subscriber(&self, id: SubscriberId) -> bool {
        matches!(self, StatsKey::Subscriber { subscriber, .. } if *subscriber == id)
    }
}

/// Last accepted sample for one key
#[derive(Debug, Clone)]
struct EpochTracker {
    start_time_ms: Option<f64>,
    last_timestamp_ms: f64,
    last_counters: NetworkCounters,
}

impl EpochTracker {
    fn new(start_time_ms: Option<f64>, timestamp_ms: f64, counters: NetworkCounters) -> Self {
        Self {
            start_time_ms,
            last_timestamp_ms: timestamp_ms,
            last_counters: counters,
        }
    }

    fn opens_new_epoch(&self, start_time_ms: Option<f64>) -> bool {
        match (start_time_ms, self.start_time_ms) {
            (Some(new), Some(current)) => new != current,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Why a sample was dropped
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum StatsRejection {
    #[error("timestamp went backwards ({previous_ms} -> {timestamp_ms})")]
    TimestampRegressed { previous_ms: f64, timestamp_ms: f64 },

    #[error("cumulative counters decreased without a new epoch")]
    CounterRegressed,
}

/// Totals kept by the aggregator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub accepted: u64,
    pub rejected: u64,
    pub epochs: u64,
}

/// Validates and forwards network statistics samples
#[derive(Debug, Default)]
pub struct NetworkStatsAggregator {
    trackers: HashMap<StatsKey, EpochTracker>,
    totals: AggregatorStats,
}

impl NetworkStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter a batch of publisher samples, returning the ones to deliver
    pub fn accept_publisher(
        &mut self,
        publisher: PublisherId,
        samples: Vec<PublisherNetworkStats>,
    ) -> Vec<PublisherNetworkStats> {
        samples
            .into_iter()
            .filter(|sample| {
                let key = StatsKey::Publisher {
                    publisher,
                    connection: sample.connection_id.clone(),
                    subscriber: sample.subscriber_id.clone(),
                    kind: sample.kind,
                };
                match self.check(key, sample.counters, sample.timestamp_ms, sample.start_time_ms) {
                    Ok(()) => true,
                    Err(reason) => {
                        tracing::warn!(
                            publisher = %publisher,
                            connection = %sample.connection_id,
                            kind = ?sample.kind,
                            %reason,
                            "Publisher stats sample rejected"
                        );
                        false
                    }
                }
            })
            .collect()
    }

    /// Check one subscriber sample, returning it if it should be delivered
    pub fn accept_subscriber(
        &mut self,
        subscriber: SubscriberId,
        sample: SubscriberNetworkStats,
    ) -> Option<SubscriberNetworkStats> {
        let key = StatsKey::Subscriber {
            subscriber,
            kind: sample.kind,
        };
        match self.check(key, sample.counters, sample.timestamp_ms, sample.start_time_ms) {
            Ok(()) => Some(sample),
            Err(reason) => {
                tracing::warn!(
                    subscriber = %subscriber,
                    kind = ?sample.kind,
                    %reason,
                    "Subscriber stats sample rejected"
                );
                None
            }
        }
    }

    fn check(
        &mut self,
        key: StatsKey,
        counters: NetworkCounters,
        timestamp_ms: f64,
        start_time_ms: Option<f64>,
    ) -> Result<(), StatsRejection> {
        let result = match self.trackers.get_mut(&key) {
            None => {
                self.trackers
                    .insert(key, EpochTracker::new(start_time_ms, timestamp_ms, counters));
                self.totals.epochs += 1;
                Ok(())
            }
            Some(tracker) if tracker.opens_new_epoch(start_time_ms) => {
                *tracker = EpochTracker::new(start_time_ms, timestamp_ms, counters);
                self.totals.epochs += 1;
                Ok(())
            }
            Some(tracker) => {
                if timestamp_ms < tracker.last_timestamp_ms {
                    Err(StatsRejection::TimestampRegressed {
                        previous_ms: tracker.last_timestamp_ms,
                        timestamp_ms,
                    })
                } else if !counters.dominates(&tracker.last_counters) {
                    Err(StatsRejection::CounterRegressed)
                } else {
                    tracker.last_timestamp_ms = timestamp_ms;
                    tracker.last_counters = counters;
                    Ok(())
                }
            }
        };

        match result {
            Ok(()) => self.totals.accepted += 1,
            Err(_) => self.totals.rejected += 1,
        }
        result
    }

    /// Drop all state for a publisher that stopped
    pub fn forget_publisher(&mut self, id: PublisherId) {
        self.trackers.retain(|key, _| !key.belongs_to_publisher(id));
    }

    /// Drop all state for a subscriber that was destroyed
    pub fn forget_subscriber(&mut self, id: SubscriberId) {
        self.trackers.retain(|key, _| !key.belongs_to_subscriber(id));
    }

    pub fn clear(&mut self) {
        self.trackers.clear();
    }

    pub fn totals(&self) -> AggregatorStats {
        self.totals
    }

    /// Number of keys with an open epoch
    pub fn tracked(&self) -> usize {
        self.trackers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub_sample(lost: u64, packets: u64, ts: f64, start: Option<f64>) -> SubscriberNetworkStats {
        SubscriberNetworkStats {
            kind: MediaKind::Video,
            counters: NetworkCounters::new(lost, packets, packets * 1_000),
            timestamp_ms: ts,
            start_time_ms: start,
        }
    }

    fn pub_sample(conn: &str, packets: u64, ts: f64, start: f64) -> PublisherNetworkStats {
        PublisherNetworkStats {
            connection_id: ConnectionId::from(conn),
            subscriber_id: format!("{}-sub", conn),
            kind: MediaKind::Audio,
            counters: NetworkCounters::new(0, packets, packets * 100),
            timestamp_ms: ts,
            start_time_ms: Some(start),
        }
    }

    #[test]
    fn test_monotonic_samples_accepted() {
        let mut agg = NetworkStatsAggregator::new();
        let id = SubscriberId::next();

        assert!(agg.accept_subscriber(id, sub_sample(0, 10, 100.0, None)).is_some());
        assert!(agg.accept_subscriber(id, sub_sample(1, 20, 200.0, None)).is_some());
        assert!(agg.accept_subscriber(id, sub_sample(1, 20, 200.0, None)).is_some());
        assert_eq!(agg.totals().accepted, 3);
    }

    #[test]
    fn test_regressions_rejected() {
        let mut agg = NetworkStatsAggregator::new();
        let id = SubscriberId::next();

        agg.accept_subscriber(id, sub_sample(2, 20, 200.0, None));
        assert!(agg.accept_subscriber(id, sub_sample(2, 30, 150.0, None)).is_none());
        assert!(agg.accept_subscriber(id, sub_sample(1, 30, 300.0, None)).is_none());
        assert_eq!(agg.totals().rejected, 2);

        // The rejected samples did not move the baseline
        assert!(agg.accept_subscriber(id, sub_sample(2, 21, 201.0, None)).is_some());
    }

    #[test]
    fn test_new_start_time_opens_epoch() {
        let mut agg = NetworkStatsAggregator::new();
        let id = SubscriberId::next();

        agg.accept_subscriber(id, sub_sample(5, 500, 1_000.0, Some(10.0)));
        // Counters reset and timestamp restarted: fine because the epoch changed
        assert!(agg
            .accept_subscriber(id, sub_sample(0, 3, 50.0, Some(900.0)))
            .is_some());
        assert_eq!(agg.totals().epochs, 2);

        // Same epoch again: regression is rejected
        assert!(agg
            .accept_subscriber(id, sub_sample(0, 2, 60.0, Some(900.0)))
            .is_none());
    }

    #[test]
    fn test_publisher_samples_keyed_per_connection() {
        let mut agg = NetworkStatsAggregator::new();
        let id = PublisherId::next();

        let accepted = agg.accept_publisher(
            id,
            vec![pub_sample("a", 100, 10.0, 1.0), pub_sample("b", 5, 10.0, 1.0)],
        );
        assert_eq!(accepted.len(), 2);

        // "b" is behind "a", but they are tracked independently
        let accepted = agg.accept_publisher(
            id,
            vec![pub_sample("a", 90, 20.0, 1.0), pub_sample("b", 6, 20.0, 1.0)],
        );
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].connection_id.as_str(), "b");
    }

    #[test]
    fn test_forget() {
        let mut agg = NetworkStatsAggregator::new();
        let publisher = PublisherId::next();
        let subscriber = SubscriberId::next();

        agg.accept_publisher(publisher, vec![pub_sample("a", 1, 1.0, 1.0)]);
        agg.accept_subscriber(subscriber, sub_sample(0, 1, 1.0, None));
        assert_eq!(agg.tracked(), 2);

        agg.forget_publisher(publisher);
        assert_eq!(agg.tracked(), 1);
        agg.forget_subscriber(subscriber);
        assert_eq!(agg.tracked(), 0);
    }
}
