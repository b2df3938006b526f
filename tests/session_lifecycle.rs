mod common;

use std::sync::Arc;

use common::*;
use rtc_session::client::{
    Publisher, PublisherSettings, PublisherState, Subscriber, SubscriberSettings, SubscriberState,
};
use rtc_session::error::{ErrorCode, ErrorKind};
use rtc_session::registry::{Connection, Stream, StreamId};
use rtc_session::session::{Capabilities, SessionSettings, SessionStatus};
use rtc_session::transport::{OperationId, TransportEvent, TransportFailure};
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_publish_unpublish_scenario() {
    let (mut session, recorder) = controller(SessionSettings::default());
    assert_eq!(session.status(), SessionStatus::NotConnected);

    assert_ok!(session.connect("tok"));
    assert_eq!(session.status(), SessionStatus::Connecting);

    let op = session.transport().last_connect_op().unwrap();
    session.handle_event(TransportEvent::Connected {
        op,
        connection: Connection::new("conn-local", Some("role=publisher".into())),
        capabilities: Capabilities::publisher(),
    });
    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(session.local_connection().map(|c| c.id.as_str()), Some("conn-local"));
    assert_eq!(session.context().api_key, "k1");
    assert_eq!(session.context().session_id, "s1");

    let p1 = publish(&mut session, Some(recorder.clone()));
    assert_eq!(session.publisher_state(p1.id()), Some(PublisherState::Publishing));
    assert!(recorder.contains("publisher:stream-created:str1"));
    assert_eq!(session.streams().len(), 1);
    assert!(session.streams().contains(&StreamId::from("str1")));

    let p2 = Publisher::new(PublisherSettings::default());
    let err = assert_err!(session.publish(&p2));
    assert_eq!(err.kind, ErrorKind::Capacity);
    assert_eq!(err.code, ErrorCode::PublisherAlreadyActive);
    assert_eq!(session.streams().len(), 1);
    assert_eq!(session.publisher_state(p2.id()), None);

    assert_ok!(session.unpublish(p1.id()));
    assert!(recorder.contains("publisher:stream-destroyed:str1"));
    assert_eq!(session.streams().len(), 0);
    assert_eq!(session.publisher_state(p1.id()), Some(PublisherState::Stopped));

    assert_ok!(session.disconnect());
    assert_eq!(session.status(), SessionStatus::NotConnected);
    assert!(session.streams().is_empty());
    assert!(session.connections().is_empty());
    assert!(recorder.contains("session:disconnected"));
}

#[test]
fn test_disconnect_releases_everything() {
    let (mut session, recorder) = connected(SessionSettings::default());
    let publisher = publish(&mut session, Some(recorder.clone()));
    remote_stream(&mut session, "peer", "remote-1");

    let subscriber = Subscriber::new("remote-1", SubscriberSettings::default())
        .with_observer(recorder.clone());
    let sub_id = assert_ok!(session.subscribe(subscriber));
    assert_eq!(session.streams().len(), 2);
    assert_eq!(session.connections().len(), 2);

    assert_ok!(session.disconnect());

    assert_eq!(session.status(), SessionStatus::NotConnected);
    assert!(session.streams().is_empty());
    assert!(session.connections().is_empty());
    assert!(session.local_connection().is_none());
    assert!(session.capabilities().is_none());
    assert_eq!(session.publisher_state(publisher.id()), Some(PublisherState::Stopped));
    assert_eq!(session.subscriber_state(sub_id), Some(SubscriberState::Destroyed));
    assert!(recorder.contains("subscriber:destroyed:remote-1"));
    assert!(recorder.contains("publisher:stream-destroyed:str1"));

    let transport = session.transport();
    assert_eq!(transport.count(|c| matches!(c, Issued::Unpublish { .. })), 1);
    assert_eq!(transport.count(|c| matches!(c, Issued::Unsubscribe { .. })), 1);
    assert_eq!(transport.count(|c| matches!(c, Issued::Disconnect)), 1);
}

#[test]
fn test_permitted_states() {
    let (mut session, _) = controller(SessionSettings::default());
    let publisher = Publisher::default();

    let err = assert_err!(session.publish(&publisher));
    assert_eq!(err.kind, ErrorKind::State);
    let err = assert_err!(session.disconnect());
    assert_eq!(err.code, ErrorCode::NotConnected);
    let err = assert_err!(session.subscribe(Subscriber::new("x", SubscriberSettings::default())));
    assert_eq!(err.kind, ErrorKind::State);

    assert_ok!(session.connect("tok"));
    let err = assert_err!(session.connect("tok"));
    assert_eq!(err.kind, ErrorKind::State);
    let err = assert_err!(session.publish(&publisher));
    assert_eq!(err.kind, ErrorKind::State);

    // No transport traffic for rejected calls
    assert_eq!(session.transport().issued.len(), 1);
}

#[test]
fn test_connect_failure_returns_to_not_connected() {
    let (mut session, recorder) = controller(SessionSettings::default());
    assert_ok!(session.connect("bad-token"));
    let op = session.transport().last_connect_op().unwrap();

    session.handle_event(TransportEvent::ConnectFailed {
        op,
        failure: TransportFailure::new(401, "invalid token"),
    });

    assert_eq!(session.status(), SessionStatus::NotConnected);
    assert!(recorder.contains("session:error:ConnectFailed"));
    assert_ok!(session.connect("good-token"));
}

#[test]
fn test_disconnect_while_connecting_supersedes_connect() {
    let (mut session, recorder) = controller(SessionSettings::default());
    assert_ok!(session.connect("tok"));
    let op = session.transport().last_connect_op().unwrap();

    assert_ok!(session.disconnect());
    session.handle_event(TransportEvent::Connected {
        op,
        connection: Connection::new("late", None),
        capabilities: Capabilities::publisher(),
    });

    assert_eq!(session.status(), SessionStatus::NotConnected);
    assert!(session.local_connection().is_none());
    assert!(!recorder.contains("session:connected"));
}

#[test]
fn test_fatal_is_terminal() {
    let (mut session, recorder) = connected(SessionSettings::default());
    let publisher = publish(&mut session, None);

    session.handle_event(TransportEvent::Fatal {
        failure: TransportFailure::new(-1, "media engine crashed"),
    });

    assert_eq!(session.status(), SessionStatus::Failed);
    assert!(session.streams().is_empty());
    assert_eq!(session.publisher_state(publisher.id()), Some(PublisherState::Stopped));
    assert!(recorder.contains("session:error:SessionFatal"));

    let err = assert_err!(session.connect("tok"));
    assert_eq!(err.code, ErrorCode::SessionClosed);
    let err = assert_err!(session.disconnect());
    assert_eq!(err.code, ErrorCode::SessionClosed);
}

#[test]
fn test_publish_requires_capability() {
    let (mut session, _) = controller(SessionSettings::default());
    session.connect("tok").unwrap();
    let op = session.transport().last_connect_op().unwrap();
    session.handle_event(TransportEvent::Connected {
        op,
        connection: Connection::new("viewer", None),
        capabilities: Capabilities::subscriber(),
    });

    let err = assert_err!(session.publish(&Publisher::default()));
    assert_eq!(err.code, ErrorCode::PublishNotPermitted);
}

#[test]
fn test_publish_failure_leaves_publisher_idle() {
    let (mut session, recorder) = connected(SessionSettings::default());
    let publisher = Publisher::default().with_observer(recorder.clone());
    assert_ok!(session.publish(&publisher));
    let op = session.transport().last_publish_op(publisher.id()).unwrap();

    session.handle_event(TransportEvent::PublishFailed {
        op,
        publisher: publisher.id(),
        failure: TransportFailure::new(1500, "ice failed"),
    });

    assert_eq!(session.publisher_state(publisher.id()), Some(PublisherState::Idle));
    assert!(session.streams().is_empty());
    assert!(recorder.contains("publisher:error:PublishFailed"));

    // Retrying is allowed, and the first stream is still "str1"
    assert_ok!(session.publish(&publisher));
    let op = session.transport().last_publish_op(publisher.id()).unwrap();
    session.handle_event(TransportEvent::PublishSucceeded {
        op,
        publisher: publisher.id(),
        stream: None,
        video_dimensions: None,
    });
    assert!(session.streams().contains(&StreamId::from("str1")));
}

#[test]
fn test_unpublish_cancels_pending_publish() {
    let (mut session, recorder) = connected(SessionSettings::default());
    let publisher = Publisher::default().with_observer(recorder.clone());
    assert_ok!(session.publish(&publisher));
    let op = session.transport().last_publish_op(publisher.id()).unwrap();

    assert_ok!(session.unpublish(publisher.id()));
    session.handle_event(TransportEvent::PublishSucceeded {
        op,
        publisher: publisher.id(),
        stream: None,
        video_dimensions: None,
    });

    assert_eq!(session.publisher_state(publisher.id()), Some(PublisherState::Stopped));
    assert!(session.streams().is_empty());
    assert_eq!(recorder.count("publisher:"), 0);

    let err = assert_err!(session.publish(&publisher));
    assert_eq!(err.code, ErrorCode::PublisherStopped);
}

#[test]
fn test_stale_operation_ids_ignored() {
    let (mut session, recorder) = connected(SessionSettings::default());
    recorder.clear();

    session.handle_event(TransportEvent::Connected {
        op: OperationId::new(999),
        connection: Connection::new("other", None),
        capabilities: Capabilities::subscriber(),
    });
    session.handle_event(TransportEvent::ReconnectSucceeded {
        op: OperationId::new(999),
    });

    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(session.local_connection().map(|c| c.id.as_str()), Some("local"));
    assert!(recorder.events().is_empty());
}

#[test]
fn test_remote_disconnect_tears_down() {
    let (mut session, recorder) = connected(SessionSettings::default());
    publish(&mut session, None);

    session.handle_event(TransportEvent::Disconnected {
        failure: Some(TransportFailure::new(4001, "kicked")),
    });

    assert_eq!(session.status(), SessionStatus::NotConnected);
    assert!(session.streams().is_empty());
    assert!(recorder.contains("session:error:ConnectionDropped"));
    assert!(recorder.contains("session:disconnected"));
}

#[test]
fn test_archive_events_forwarded() {
    let (mut session, recorder) = connected(SessionSettings::default());
    session.handle_event(TransportEvent::ArchiveStarted {
        archive_id: "a1".into(),
        name: Some("lecture".into()),
    });
    session.handle_event(TransportEvent::ArchiveStopped {
        archive_id: "a1".into(),
    });

    let events = recorder.events();
    let started = events.iter().position(|e| e == "session:archive-started:a1");
    let stopped = events.iter().position(|e| e == "session:archive-stopped:a1");
    assert!(started.is_some() && started < stopped);
}

#[test]
fn test_remote_stream_reusing_local_id_leaves_publisher_alone() {
    let (mut session, recorder) = connected(SessionSettings::default());
    let p1 = publish(&mut session, Some(recorder.clone()));
    assert_eq!(session.publisher_stream(p1.id()), Some(&StreamId::from("str1")));

    session.handle_event(TransportEvent::ConnectionCreated(Connection::new("peer", None)));
    session.handle_event(TransportEvent::StreamCreated(Stream::new("str1", "peer")));
    assert!(!recorder.contains("session:stream-created:str1"));

    session.handle_event(TransportEvent::StreamDestroyed(StreamId::from("str1")));
    assert_eq!(session.publisher_state(p1.id()), Some(PublisherState::Publishing));
    assert_eq!(recorder.count("publisher:stream-destroyed"), 0);
    let streams = session.streams();
    let local = streams.get(&StreamId::from("str1")).unwrap();
    assert_eq!(local.connection_id.as_str(), "local");

    // Local allocation skips ids the peer already holds
    session.handle_event(TransportEvent::StreamCreated(Stream::new("str2", "peer")));
    assert_ok!(session.unpublish(p1.id()));
    let p2 = publish(&mut session, None);
    assert_eq!(session.publisher_stream(p2.id()), Some(&StreamId::from("str3")));
    assert_eq!(
        session.streams().get(&StreamId::from("str2")).map(|s| s.connection_id.as_str()),
        Some("peer")
    );
}

#[test]
fn test_transport_assigned_stream_id() {
    let (mut session, recorder) = connected(SessionSettings::default());
    let publisher = Publisher::default().with_observer(recorder.clone());
    assert_ok!(session.publish(&publisher));
    let op = session.transport().last_publish_op(publisher.id()).unwrap();
    session.handle_event(TransportEvent::PublishSucceeded {
        op,
        publisher: publisher.id(),
        stream: Some(StreamId::from("media-7")),
        video_dimensions: None,
    });

    assert_eq!(session.publisher_stream(publisher.id()), Some(&StreamId::from("media-7")));
    assert!(recorder.contains("publisher:stream-created:media-7"));
    assert_ok!(session.unpublish(publisher.id()));

    // An id already registered to a peer fails the publish
    remote_stream(&mut session, "peer", "taken");
    let publisher = Publisher::default().with_observer(recorder.clone());
    assert_ok!(session.publish(&publisher));
    let op = session.transport().last_publish_op(publisher.id()).unwrap();
    session.handle_event(TransportEvent::PublishSucceeded {
        op,
        publisher: publisher.id(),
        stream: Some(StreamId::from("taken")),
        video_dimensions: None,
    });

    assert_eq!(session.publisher_state(publisher.id()), Some(PublisherState::Idle));
    assert!(recorder.contains("publisher:error:PublishFailed"));
    assert_eq!(
        session.streams().get(&StreamId::from("taken")).map(|s| s.connection_id.as_str()),
        Some("peer")
    );
}

#[test]
fn test_stopped_publishers_are_released() {
    let (mut session, recorder) = connected(SessionSettings::default());
    let baseline = Arc::strong_count(&recorder);

    let first = publish(&mut session, Some(recorder.clone()));
    assert_ok!(session.unpublish(first.id()));
    for _ in 0..20 {
        let publisher = publish(&mut session, Some(recorder.clone()));
        assert_ok!(session.unpublish(publisher.id()));
        drop(publisher);
    }

    assert_eq!(session.tracked_publishers(), 0);
    assert_eq!(session.publisher_state(first.id()), Some(PublisherState::Stopped));
    let err = assert_err!(session.unpublish(first.id()));
    assert_eq!(err.code, ErrorCode::PublisherStopped);
    let err = assert_err!(session.publish(&first));
    assert_eq!(err.code, ErrorCode::PublisherStopped);

    drop(first);
    assert_eq!(Arc::strong_count(&recorder), baseline);
}
