mod common;

use std::time::Duration;

use common::*;
use rtc_session::client::{PublisherState, Subscriber, SubscriberSettings, SubscriberState};
use rtc_session::error::{ErrorCode, ErrorKind};
use rtc_session::registry::{Connection, ConnectionId, StreamId};
use rtc_session::session::{ReconnectPolicy, SessionSettings, SessionStatus};
use rtc_session::signal::{Delivery, Signal};
use rtc_session::transport::{TransportEvent, TransportFailure};
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_signals_across_reconnect() {
    let (mut session, recorder) = connected(SessionSettings::default());
    let publisher = publish(&mut session, None);
    remote_stream(&mut session, "peer", "remote-1");
    let sub_id = assert_ok!(session.subscribe(Subscriber::new("remote-1", SubscriberSettings::default())));

    session.handle_event(TransportEvent::NetworkLost);
    assert_eq!(session.status(), SessionStatus::Reconnecting);
    assert!(recorder.contains("session:reconnecting"));

    // Bindings preserved while reconnecting
    assert!(session.streams().contains(&StreamId::from("str1")));
    assert_eq!(session.publisher_state(publisher.id()), Some(PublisherState::Publishing));
    assert_ne!(session.subscriber_state(sub_id), Some(SubscriberState::Destroyed));

    let a = assert_ok!(session.send_signal(Signal::new("A", "first")));
    let b = assert_ok!(session.send_signal(Signal::new("B", "second").retry_after_reconnect(false)));
    assert_eq!(a, Delivery::Queued);
    assert_eq!(b, Delivery::Dropped);
    assert!(session.transport().signals().is_empty());
    assert_eq!(session.queued_signals(), 1);

    let (op, attempt) = session.transport().last_reconnect().unwrap();
    assert_eq!(attempt, 1);
    session.handle_event(TransportEvent::ReconnectSucceeded { op });

    assert_eq!(session.status(), SessionStatus::Connected);
    assert!(recorder.contains("session:reconnected"));
    let sent: Vec<String> = session.transport().signals().into_iter().map(|s| s.kind).collect();
    assert_eq!(sent, vec!["A"]);
    assert_eq!(session.queued_signals(), 0);

    // A late duplicate completion does not flush again
    session.handle_event(TransportEvent::ReconnectSucceeded { op });
    assert_eq!(session.transport().signals().len(), 1);
}

#[test]
fn test_queue_flushes_in_fifo_order() {
    let (mut session, _) = connected(SessionSettings::default());
    session.handle_event(TransportEvent::NetworkLost);

    for kind in ["one", "two", "three"] {
        assert_ok!(session.send_signal(Signal::new(kind, "")));
    }
    let (op, _) = session.transport().last_reconnect().unwrap();
    session.handle_event(TransportEvent::ReconnectSucceeded { op });

    let sent: Vec<String> = session.transport().signals().into_iter().map(|s| s.kind).collect();
    assert_eq!(sent, vec!["one", "two", "three"]);
}

#[test]
fn test_retry_budget_then_teardown() {
    let settings = SessionSettings::new().reconnect(ReconnectPolicy {
        max_attempts: 3,
        initial_delay_ms: 100,
        max_delay_ms: 250,
    });
    let (mut session, recorder) = connected(settings);
    let publisher = publish(&mut session, Some(recorder.clone()));
    session.handle_event(TransportEvent::NetworkLost);
    assert_ok!(session.send_signal(Signal::new("pending", "")));

    let mut delays = Vec::new();
    for _ in 0..3 {
        let (op, attempt) = session.transport().last_reconnect().unwrap();
        delays.push((attempt, session.transport().issued.iter().rev().find_map(|c| match c {
            Issued::Reconnect { delay, .. } => Some(*delay),
            _ => None,
        })));
        session.handle_event(TransportEvent::ReconnectAttemptFailed {
            op,
            failure: TransportFailure::new(-110, "timed out"),
        });
    }

    assert_eq!(
        delays,
        vec![
            (1, Some(Duration::from_millis(100))),
            (2, Some(Duration::from_millis(200))),
            (3, Some(Duration::from_millis(250))),
        ]
    );
    assert_eq!(session.status(), SessionStatus::NotConnected);
    assert!(session.streams().is_empty());
    assert!(session.connections().is_empty());
    assert_eq!(session.queued_signals(), 0);
    assert!(session.transport().signals().is_empty());
    assert_eq!(session.publisher_state(publisher.id()), Some(PublisherState::Stopped));
    assert!(recorder.contains("publisher:stream-destroyed:str1"));
    assert!(recorder.contains("session:error:ReconnectFailed"));
    assert!(recorder.contains("session:disconnected"));
    assert_eq!(session.signal_stats().discarded, 1);
}

#[test]
fn test_zero_attempts_tears_down_immediately() {
    let (mut session, recorder) = connected(SessionSettings::new().max_reconnect_attempts(0));
    session.handle_event(TransportEvent::NetworkLost);

    assert_eq!(session.status(), SessionStatus::NotConnected);
    assert!(session.transport().last_reconnect().is_none());
    assert!(recorder.contains("session:reconnecting"));
    assert!(recorder.contains("session:error:ReconnectFailed"));
}

#[test]
fn test_media_operations_allowed_while_reconnecting() {
    let (mut session, _) = connected(SessionSettings::default());
    let publisher = publish(&mut session, None);
    session.handle_event(TransportEvent::NetworkLost);

    assert_ok!(session.unpublish(publisher.id()));
    assert!(session.streams().is_empty());
}

#[test]
fn test_queue_capacity_bounded() {
    let (mut session, _) = connected(SessionSettings::new().signal_queue_capacity(2));
    session.handle_event(TransportEvent::NetworkLost);

    assert_ok!(session.send_signal(Signal::new("a", "")));
    assert_ok!(session.send_signal(Signal::new("b", "")));
    let err = assert_err!(session.send_signal(Signal::new("c", "")));
    assert_eq!(err.kind, ErrorKind::Capacity);
    assert_eq!(err.code, ErrorCode::SignalQueueFull);

    // Non-retry signals are dropped, not refused
    let dropped = assert_ok!(session.send_signal(Signal::new("d", "").retry_after_reconnect(false)));
    assert_eq!(dropped, Delivery::Dropped);
}

#[test]
fn test_second_episode_starts_with_empty_queue() {
    let (mut session, _) = connected(SessionSettings::default());

    session.handle_event(TransportEvent::NetworkLost);
    assert_ok!(session.send_signal(Signal::new("first", "")));
    let (op, _) = session.transport().last_reconnect().unwrap();
    session.handle_event(TransportEvent::ReconnectSucceeded { op });

    session.handle_event(TransportEvent::NetworkLost);
    let (op, attempt) = session.transport().last_reconnect().unwrap();
    assert_eq!(attempt, 1);
    session.handle_event(TransportEvent::ReconnectSucceeded { op });

    let sent: Vec<String> = session.transport().signals().into_iter().map(|s| s.kind).collect();
    assert_eq!(sent, vec!["first"]);
}

#[test]
fn test_queued_signal_for_departed_connection_dropped() {
    let (mut session, _) = connected(SessionSettings::default());
    session.handle_event(TransportEvent::ConnectionCreated(Connection::new("peer", None)));
    session.handle_event(TransportEvent::NetworkLost);

    assert_ok!(session.send_signal(Signal::new("direct", "").to("peer")));
    assert_ok!(session.send_signal(Signal::new("broadcast", "")));
    assert_eq!(session.queued_signals(), 2);

    session.handle_event(TransportEvent::ConnectionDestroyed(ConnectionId::from("peer")));
    let (op, _) = session.transport().last_reconnect().unwrap();
    session.handle_event(TransportEvent::ReconnectSucceeded { op });

    let sent: Vec<String> = session.transport().signals().into_iter().map(|s| s.kind).collect();
    assert_eq!(sent, vec!["broadcast"]);
    let stats = session.signal_stats();
    assert_eq!(stats.flushed, 1);
    assert_eq!(stats.dropped, 1);
}
