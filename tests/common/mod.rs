#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtc_session::client::{
    Publisher, PublisherProperty, PublisherSettings, SubscriberProperty, SubscriberSettings,
};
use rtc_session::error::Error;
use rtc_session::media::VideoDimensions;
use rtc_session::observer::{PublisherObserver, SessionObserver, SubscriberObserver, VideoEventReason};
use rtc_session::registry::{
    Connection, PublisherId, Stream, StreamId, StreamProperty, SubscriberId,
};
use rtc_session::session::{Capabilities, SessionConfig, SessionContext, SessionController, SessionSettings};
use rtc_session::signal::{ReceivedSignal, Signal};
use rtc_session::stats::{PublisherNetworkStats, SubscriberNetworkStats};
use rtc_session::transport::{OperationId, Transport, TransportEvent};

/// One command issued to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Issued {
    Connect { op: OperationId, token: String },
    Disconnect,
    Reconnect { op: OperationId, attempt: u32, delay: Duration },
    Publish { op: OperationId, publisher: PublisherId },
    Unpublish { publisher: PublisherId, stream: Option<StreamId> },
    UpdatePublisher { publisher: PublisherId, property: PublisherProperty },
    Subscribe { op: OperationId, subscriber: SubscriberId, stream: StreamId },
    Unsubscribe { subscriber: SubscriberId },
    UpdateSubscriber { subscriber: SubscriberId, property: SubscriberProperty },
    Signal(Signal),
}

/// Transport that records every command and never responds
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub issued: Vec<Issued>,
}

impl RecordingTransport {
    pub fn last_connect_op(&self) -> Option<OperationId> {
        self.issued.iter().rev().find_map(|c| match c {
            Issued::Connect { op, .. } => Some(*op),
            _ => None,
        })
    }

    pub fn last_reconnect(&self) -> Option<(OperationId, u32)> {
        self.issued.iter().rev().find_map(|c| match c {
            Issued::Reconnect { op, attempt, .. } => Some((*op, *attempt)),
            _ => None,
        })
    }

    pub fn last_publish_op(&self, publisher: PublisherId) -> Option<OperationId> {
        self.issued.iter().rev().find_map(|c| match c {
            Issued::Publish { op, publisher: p } if *p == publisher => Some(*op),
            _ => None,
        })
    }

    pub fn last_subscribe_op(&self, subscriber: SubscriberId) -> Option<OperationId> {
        self.issued.iter().rev().find_map(|c| match c {
            Issued::Subscribe { op, subscriber: s, .. } if *s == subscriber => Some(*op),
            _ => None,
        })
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.issued
            .iter()
            .filter_map(|c| match c {
                Issued::Signal(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Issued) -> bool) -> usize {
        self.issued.iter().filter(|c| pred(c)).count()
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, op: OperationId, token: &str, _settings: &SessionSettings) {
        self.issued.push(Issued::Connect {
            op,
            token: token.to_string(),
        });
    }

    fn disconnect(&mut self) {
        self.issued.push(Issued::Disconnect);
    }

    fn reconnect(&mut self, op: OperationId, attempt: u32, delay: Duration) {
        self.issued.push(Issued::Reconnect { op, attempt, delay });
    }

    fn publish(&mut self, op: OperationId, publisher: PublisherId, _settings: &PublisherSettings) {
        self.issued.push(Issued::Publish { op, publisher });
    }

    fn unpublish(&mut self, publisher: PublisherId, stream: Option<&StreamId>) {
        self.issued.push(Issued::Unpublish {
            publisher,
            stream: stream.cloned(),
        });
    }

    fn update_publisher(&mut self, publisher: PublisherId, property: &PublisherProperty) {
        self.issued.push(Issued::UpdatePublisher {
            publisher,
            property: *property,
        });
    }

    fn subscribe(
        &mut self,
        op: OperationId,
        subscriber: SubscriberId,
        stream: &StreamId,
        _settings: &SubscriberSettings,
    ) {
        self.issued.push(Issued::Subscribe {
            op,
            subscriber,
            stream: stream.clone(),
        });
    }

    fn unsubscribe(&mut self, subscriber: SubscriberId) {
        self.issued.push(Issued::Unsubscribe { subscriber });
    }

    fn update_subscriber(&mut self, subscriber: SubscriberId, property: &SubscriberProperty) {
        self.issued.push(Issued::UpdateSubscriber {
            subscriber,
            property: *property,
        });
    }

    fn send_signal(&mut self, signal: &Signal) {
        self.issued.push(Issued::Signal(signal.clone()));
    }
}

/// Observer that records every notification as a short string
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl SessionObserver for Recorder {
    fn on_connected(&self, _ctx: &SessionContext) {
        self.push("session:connected".into());
    }

    fn on_disconnected(&self, _ctx: &SessionContext) {
        self.push("session:disconnected".into());
    }

    fn on_reconnecting(&self, _ctx: &SessionContext) {
        self.push("session:reconnecting".into());
    }

    fn on_reconnected(&self, _ctx: &SessionContext) {
        self.push("session:reconnected".into());
    }

    fn on_error(&self, _ctx: &SessionContext, error: &Error) {
        self.push(format!("session:error:{:?}", error.code));
    }

    fn on_connection_created(&self, _ctx: &SessionContext, connection: &Connection) {
        self.push(format!("session:connection-created:{}", connection.id));
    }

    fn on_connection_destroyed(&self, _ctx: &SessionContext, connection: &Connection) {
        self.push(format!("session:connection-destroyed:{}", connection.id));
    }

    fn on_stream_created(&self, _ctx: &SessionContext, stream: &Stream) {
        self.push(format!("session:stream-created:{}", stream.id));
    }

    fn on_stream_destroyed(&self, _ctx: &SessionContext, stream: &Stream) {
        self.push(format!("session:stream-destroyed:{}", stream.id));
    }

    fn on_stream_property_changed(&self, _ctx: &SessionContext, stream: &Stream, change: StreamProperty) {
        self.push(format!("session:stream-changed:{}:{:?}", stream.id, change));
    }

    fn on_signal_received(&self, _ctx: &SessionContext, signal: &ReceivedSignal) {
        self.push(format!(
            "session:signal:{}",
            signal.kind.as_deref().unwrap_or_default()
        ));
    }

    fn on_archive_started(&self, _ctx: &SessionContext, archive_id: &str, _name: Option<&str>) {
        self.push(format!("session:archive-started:{}", archive_id));
    }

    fn on_archive_stopped(&self, _ctx: &SessionContext, archive_id: &str) {
        self.push(format!("session:archive-stopped:{}", archive_id));
    }
}

impl PublisherObserver for Recorder {
    fn on_stream_created(&self, _ctx: &SessionContext, _publisher: PublisherId, stream: &Stream) {
        self.push(format!("publisher:stream-created:{}", stream.id));
    }

    fn on_stream_destroyed(&self, _ctx: &SessionContext, _publisher: PublisherId, stream: &Stream) {
        self.push(format!("publisher:stream-destroyed:{}", stream.id));
    }

    fn on_error(&self, _ctx: &SessionContext, _publisher: PublisherId, error: &Error) {
        self.push(format!("publisher:error:{:?}", error.code));
    }

    fn on_audio_level(&self, _ctx: &SessionContext, _publisher: PublisherId, _level: f32) {
        self.push("publisher:audio-level".into());
    }

    fn on_video_fallback_changed(&self, _ctx: &SessionContext, _publisher: PublisherId, video_enabled: bool) {
        self.push(format!("publisher:video-fallback:{}", video_enabled));
    }

    fn on_network_stats(&self, _ctx: &SessionContext, _publisher: PublisherId, stats: &[PublisherNetworkStats]) {
        self.push(format!("publisher:stats:{}", stats.len()));
    }
}

impl SubscriberObserver for Recorder {
    fn on_connected(&self, _ctx: &SessionContext, _subscriber: SubscriberId) {
        self.push("subscriber:connected".into());
    }

    fn on_disconnected(&self, _ctx: &SessionContext, _subscriber: SubscriberId) {
        self.push("subscriber:disconnected".into());
    }

    fn on_reconnected(&self, _ctx: &SessionContext, _subscriber: SubscriberId) {
        self.push("subscriber:reconnected".into());
    }

    fn on_error(&self, _ctx: &SessionContext, _subscriber: SubscriberId, error: &Error) {
        self.push(format!("subscriber:error:{:?}", error.code));
    }

    fn on_video_disabled(&self, _ctx: &SessionContext, _subscriber: SubscriberId, reason: VideoEventReason) {
        self.push(format!("subscriber:video-disabled:{:?}", reason));
    }

    fn on_video_enabled(&self, _ctx: &SessionContext, _subscriber: SubscriberId, reason: VideoEventReason) {
        self.push(format!("subscriber:video-enabled:{:?}", reason));
    }

    fn on_video_disable_warning(&self, _ctx: &SessionContext, _subscriber: SubscriberId) {
        self.push("subscriber:video-warning".into());
    }

    fn on_video_disable_warning_lifted(&self, _ctx: &SessionContext, _subscriber: SubscriberId) {
        self.push("subscriber:video-warning-lifted".into());
    }

    fn on_video_data_received(
        &self,
        _ctx: &SessionContext,
        _subscriber: SubscriberId,
        _dimensions: Option<VideoDimensions>,
    ) {
        self.push("subscriber:video-data".into());
    }

    fn on_audio_level(&self, _ctx: &SessionContext, _subscriber: SubscriberId, _level: f32) {
        self.push("subscriber:audio-level".into());
    }

    fn on_network_stats(&self, _ctx: &SessionContext, _subscriber: SubscriberId, _stats: &SubscriberNetworkStats) {
        self.push("subscriber:stats".into());
    }

    fn on_destroyed(&self, _ctx: &SessionContext, _subscriber: SubscriberId, stream: &StreamId) {
        self.push(format!("subscriber:destroyed:{}", stream));
    }
}

pub type Controller = SessionController<RecordingTransport>;

pub fn controller(settings: SessionSettings) -> (Controller, Arc<Recorder>) {
    let recorder = Recorder::new();
    let config = SessionConfig::new("k1", "s1").with_settings(settings);
    let controller = SessionController::new(config, RecordingTransport::default())
        .with_observer(recorder.clone());
    (controller, recorder)
}

/// Controller connected as "local" with publish and subscribe rights
pub fn connected(settings: SessionSettings) -> (Controller, Arc<Recorder>) {
    let (mut controller, recorder) = controller(settings);
    controller.connect("tok").unwrap();
    let op = controller.transport().last_connect_op().unwrap();
    controller.handle_event(TransportEvent::Connected {
        op,
        connection: Connection::new("local", None),
        capabilities: Capabilities::publisher(),
    });
    (controller, recorder)
}

/// Publish and confirm, returning the publisher
pub fn publish(controller: &mut Controller, observer: Option<Arc<Recorder>>) -> Publisher {
    let mut publisher = Publisher::new(PublisherSettings::new().name("cam"));
    if let Some(observer) = observer {
        publisher = publisher.with_observer(observer);
    }
    controller.publish(&publisher).unwrap();
    let op = controller.transport().last_publish_op(publisher.id()).unwrap();
    controller.handle_event(TransportEvent::PublishSucceeded {
        op,
        publisher: publisher.id(),
        stream: None,
        video_dimensions: None,
    });
    publisher
}

/// Register a remote connection with one stream
pub fn remote_stream(controller: &mut Controller, connection: &str, stream: &str) {
    controller.handle_event(TransportEvent::ConnectionCreated(Connection::new(connection, None)));
    controller.handle_event(TransportEvent::StreamCreated(Stream::new(stream, connection)));
}
