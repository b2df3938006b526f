mod common;

use common::*;
use rtc_session::error::{ErrorCode, ErrorKind};
use rtc_session::registry::ConnectionId;
use rtc_session::session::SessionSettings;
use rtc_session::signal::{Delivery, ReceivedSignal, Signal, MAX_SIGNAL_PAYLOAD_BYTES};
use rtc_session::transport::TransportEvent;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_oversized_payloads_rejected() {
    let (mut session, _) = connected(SessionSettings::default());

    for size in [MAX_SIGNAL_PAYLOAD_BYTES + 1, MAX_SIGNAL_PAYLOAD_BYTES * 2, 100_000] {
        let err = assert_err!(session.send_signal(Signal::new("chat", "x".repeat(size))));
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.code, ErrorCode::SignalPayloadTooLarge);
    }
    assert!(session.transport().signals().is_empty());

    let exact = assert_ok!(session.send_signal(Signal::new("chat", "x".repeat(MAX_SIGNAL_PAYLOAD_BYTES))));
    assert_eq!(exact, Delivery::Sent);
}

#[test]
fn test_malformed_types_rejected() {
    let (mut session, _) = connected(SessionSettings::default());
    let too_long = "t".repeat(129);

    for kind in ["", " ", "a b", "a.b", "a/b", "a:b", "naïve", too_long.as_str()] {
        let err = assert_err!(session.send_signal(Signal::new(kind, "")));
        assert_eq!(err.kind, ErrorKind::Validation, "type {:?}", kind);
    }
    assert!(session.transport().signals().is_empty());
}

#[test]
fn test_validation_checked_before_state() {
    let (mut session, _) = controller(SessionSettings::default());

    let err = assert_err!(session.send_signal(Signal::new("bad type", "")));
    assert_eq!(err.kind, ErrorKind::Validation);

    let err = assert_err!(session.send_signal(Signal::new("good", "")));
    assert_eq!(err.kind, ErrorKind::State);
    assert_eq!(err.code, ErrorCode::NotConnected);
}

#[test]
fn test_targeted_signals() {
    let (mut session, _) = connected(SessionSettings::default());
    remote_stream(&mut session, "peer", "remote-1");

    assert_ok!(session.send_signal(Signal::new("chat", "hi").to("peer")));
    let err = assert_err!(session.send_signal(Signal::new("chat", "hi").to("nobody")));
    assert_eq!(err.code, ErrorCode::InvalidSignalTarget);

    let sent = session.transport().signals();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, Some(ConnectionId::from("peer")));
}

#[test]
fn test_broadcast_sent_immediately() {
    let (mut session, _) = connected(SessionSettings::default());
    let delivery = assert_ok!(session.send_signal(Signal::new("chat", "all")));

    assert_eq!(delivery, Delivery::Sent);
    assert!(session.transport().signals()[0].is_broadcast());
}

#[test]
fn test_inbound_signals_forwarded_in_order() {
    let (mut session, recorder) = connected(SessionSettings::default());
    recorder.clear();

    for kind in ["x", "y", "z"] {
        session.handle_event(TransportEvent::SignalReceived(ReceivedSignal {
            kind: Some(kind.into()),
            payload: None,
            from: Some(ConnectionId::from("peer")),
        }));
    }

    assert_eq!(
        recorder.events(),
        vec!["session:signal:x", "session:signal:y", "session:signal:z"]
    );
}
