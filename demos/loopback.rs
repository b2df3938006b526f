//! In-process loopback session
//!
//! Run with: cargo run --example loopback
//!
//! Two clients join the same in-memory room. Alice publishes a camera
//! stream, Bob subscribes to it, both exchange signals, and Bob rides out a
//! simulated network drop with a signal queued for after the reconnect.
//!
//! ```text
//!   alice: Session ──► LoopbackTransport ──┐
//!                                          ├──► Room (members, streams)
//!   bob:   Session ──► LoopbackTransport ──┘        │
//!                 ▲                                 │
//!                 └─────── EventSink ◄──────────────┘
//! ```
//!
//! Set `RUST_LOG=rtc_session=debug` to see the session internals.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtc_session::client::{
    Publisher, PublisherProperty, PublisherSettings, Subscriber, SubscriberProperty,
    SubscriberSettings,
};
use rtc_session::error::Error;
use rtc_session::observer::{SessionObserver, SubscriberObserver, VideoEventReason};
use rtc_session::registry::{Connection, ConnectionId, PublisherId, Stream, StreamId, SubscriberId};
use rtc_session::session::{
    Capabilities, EventSink, Session, SessionConfig, SessionContext, SessionSettings,
};
use rtc_session::signal::{ReceivedSignal, Signal};
use rtc_session::transport::{OperationId, Transport, TransportEvent};

// ============================================================================
// Room
// ============================================================================

struct Member {
    connection: Connection,
    sink: EventSink,
}

/// Shared state standing in for the media server
#[derive(Default)]
struct Room {
    members: Mutex<Vec<Member>>,
    streams: Mutex<Vec<Stream>>,
}

impl Room {
    fn transport(self: &Arc<Self>, name: &str, events: EventSink) -> LoopbackTransport {
        LoopbackTransport {
            room: self.clone(),
            me: ConnectionId::from(name),
            events,
            published: Vec::new(),
        }
    }

    fn broadcast(&self, except: &ConnectionId, event: impl Fn() -> TransportEvent) {
        let members = self.members.lock().unwrap();
        for member in members.iter().filter(|m| &m.connection.id != except) {
            member.sink.send(event());
        }
    }

    /// Simulate the given member losing its network
    fn drop_network(&self, name: &str) {
        let members = self.members.lock().unwrap();
        if let Some(member) = members.iter().find(|m| m.connection.id.as_str() == name) {
            member.sink.send(TransportEvent::NetworkLost);
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

struct LoopbackTransport {
    room: Arc<Room>,
    me: ConnectionId,
    events: EventSink,
    published: Vec<(PublisherId, StreamId)>,
}

impl Transport for LoopbackTransport {
    fn connect(&mut self, op: OperationId, token: &str, _settings: &SessionSettings) {
        let connection = Connection::new(self.me.clone(), Some(format!("token={}", token)));

        self.events.send(TransportEvent::Connected {
            op,
            connection: connection.clone(),
            capabilities: Capabilities::publisher(),
        });
        {
            let members = self.room.members.lock().unwrap();
            for member in members.iter() {
                self.events.send(TransportEvent::ConnectionCreated(member.connection.clone()));
                member.sink.send(TransportEvent::ConnectionCreated(connection.clone()));
            }
        }
        for stream in self.room.streams.lock().unwrap().iter() {
            self.events.send(TransportEvent::StreamCreated(stream.clone()));
        }

        self.room.members.lock().unwrap().push(Member {
            connection,
            sink: self.events.clone(),
        });
    }

    fn disconnect(&mut self) {
        let me = self.me.clone();
        self.room.members.lock().unwrap().retain(|m| m.connection.id != me);

        let gone: Vec<Stream> = {
            let mut streams = self.room.streams.lock().unwrap();
            let (gone, kept) = streams.drain(..).partition(|s| s.connection_id == me);
            *streams = kept;
            gone
        };
        for stream in gone {
            self.room.broadcast(&me, || TransportEvent::StreamDestroyed(stream.id.clone()));
        }
        self.room.broadcast(&me, || TransportEvent::ConnectionDestroyed(me.clone()));
    }

    fn reconnect(&mut self, op: OperationId, attempt: u32, delay: Duration) {
        tracing::info!(connection = %self.me, attempt, ?delay, "Reconnecting");
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.send(TransportEvent::ReconnectSucceeded { op });
        });
    }

    fn publish(&mut self, op: OperationId, publisher: PublisherId, settings: &PublisherSettings) {
        let id = StreamId::new(format!("{}-{}", self.me, publisher));
        let mut stream = Stream::new(id.clone(), self.me.clone())
            .with_media(settings.audio_track, settings.video_track);
        stream.name = settings.name.clone();

        self.room.streams.lock().unwrap().push(stream.clone());
        self.room
            .broadcast(&self.me, || TransportEvent::StreamCreated(stream.clone()));
        self.published.push((publisher, id.clone()));

        self.events.send(TransportEvent::PublishSucceeded {
            op,
            publisher,
            stream: Some(id),
            video_dimensions: None,
        });
    }

    fn unpublish(&mut self, publisher: PublisherId, _stream: Option<&StreamId>) {
        let Some(pos) = self.published.iter().position(|(p, _)| *p == publisher) else {
            return;
        };
        let (_, id) = self.published.remove(pos);
        self.room.streams.lock().unwrap().retain(|s| s.id != id);
        self.room
            .broadcast(&self.me, || TransportEvent::StreamDestroyed(id.clone()));
    }

    fn update_publisher(&mut self, publisher: PublisherId, property: &PublisherProperty) {
        tracing::info!(publisher = %publisher, ?property, "Publisher updated");
    }

    fn subscribe(
        &mut self,
        op: OperationId,
        subscriber: SubscriberId,
        stream: &StreamId,
        _settings: &SubscriberSettings,
    ) {
        tracing::info!(subscriber = %subscriber, stream = %stream, "Subscribing");
        self.events
            .send(TransportEvent::SubscribeSucceeded { op, subscriber });
    }

    fn unsubscribe(&mut self, subscriber: SubscriberId) {
        tracing::info!(subscriber = %subscriber, "Unsubscribed");
    }

    fn update_subscriber(&mut self, subscriber: SubscriberId, property: &SubscriberProperty) {
        tracing::info!(subscriber = %subscriber, ?property, "Subscriber updated");
    }

    fn send_signal(&mut self, signal: &Signal) {
        let received = ReceivedSignal {
            kind: Some(signal.kind.clone()),
            payload: Some(signal.payload.clone()),
            from: Some(self.me.clone()),
        };
        let members = self.room.members.lock().unwrap();
        for member in members.iter() {
            if signal.target.as_ref().map_or(true, |t| *t == member.connection.id) {
                member.sink.send(TransportEvent::SignalReceived(received.clone()));
            }
        }
    }
}

// ============================================================================
// Observer
// ============================================================================

struct Printer {
    name: &'static str,
}

impl SessionObserver for Printer {
    fn on_connected(&self, ctx: &SessionContext) {
        println!("[{}] connected as {:?}", self.name, ctx.connection_id());
    }

    fn on_disconnected(&self, _ctx: &SessionContext) {
        println!("[{}] disconnected", self.name);
    }

    fn on_reconnecting(&self, _ctx: &SessionContext) {
        println!("[{}] network lost, reconnecting", self.name);
    }

    fn on_reconnected(&self, _ctx: &SessionContext) {
        println!("[{}] reconnected", self.name);
    }

    fn on_error(&self, _ctx: &SessionContext, error: &Error) {
        println!("[{}] error: {}", self.name, error);
    }

    fn on_connection_created(&self, _ctx: &SessionContext, connection: &Connection) {
        println!("[{}] {} joined", self.name, connection.id);
    }

    fn on_connection_destroyed(&self, _ctx: &SessionContext, connection: &Connection) {
        println!("[{}] {} left", self.name, connection.id);
    }

    fn on_stream_created(&self, _ctx: &SessionContext, stream: &Stream) {
        println!(
            "[{}] stream {} ({}) from {}",
            self.name,
            stream.id,
            stream.name.as_deref().unwrap_or("unnamed"),
            stream.connection_id
        );
    }

    fn on_stream_destroyed(&self, _ctx: &SessionContext, stream: &Stream) {
        println!("[{}] stream {} ended", self.name, stream.id);
    }

    fn on_signal_received(&self, _ctx: &SessionContext, signal: &ReceivedSignal) {
        println!(
            "[{}] signal {:?} from {:?}: {}",
            self.name,
            signal.kind.as_deref().unwrap_or(""),
            signal.from.as_ref().map(|c| c.as_str()),
            signal.payload.as_deref().unwrap_or("")
        );
    }
}

impl SubscriberObserver for Printer {
    fn on_connected(&self, _ctx: &SessionContext, subscriber: SubscriberId) {
        println!("[{}] {} receiving media", self.name, subscriber);
    }

    fn on_video_disabled(&self, _ctx: &SessionContext, subscriber: SubscriberId, reason: VideoEventReason) {
        println!("[{}] {} video off ({:?})", self.name, subscriber, reason);
    }

    fn on_video_enabled(&self, _ctx: &SessionContext, subscriber: SubscriberId, reason: VideoEventReason) {
        println!("[{}] {} video on ({:?})", self.name, subscriber, reason);
    }

    fn on_destroyed(&self, _ctx: &SessionContext, subscriber: SubscriberId, stream: &StreamId) {
        println!("[{}] {} for {} destroyed", self.name, subscriber, stream);
    }
}

// ============================================================================
// Main
// ============================================================================

fn join(room: &Arc<Room>, name: &'static str) -> Session {
    let room = room.clone();
    Session::builder(SessionConfig::new("demo-key", "demo-room"))
        .observer(Arc::new(Printer { name }))
        .spawn(move |events| room.transport(name, events))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtc_session=info".parse()?)
                .add_directive("loopback=info".parse()?),
        )
        .init();

    let room = Arc::new(Room::default());
    let alice = join(&room, "alice");
    let bob = join(&room, "bob");

    alice.connect("alice-token").await?;
    bob.connect("bob-token").await?;

    let camera = Publisher::new(PublisherSettings::new().name("alice-cam"));
    let camera_id = camera.id();
    alice.publish(camera).await?;

    let streams = bob.streams().await?;
    let remote = streams
        .iter()
        .find(|s| s.connection_id.as_str() == "alice")
        .map(|s| s.id.clone())
        .ok_or("bob never saw alice's stream")?;

    let subscriber = Subscriber::new(remote, SubscriberSettings::default())
        .with_observer(Arc::new(Printer { name: "bob" }));
    let subscriber_id = bob.subscribe(subscriber).await?;

    alice.send_signal(Signal::new("chat", "hello everyone")).await?;
    bob.send_signal(Signal::new("chat", "hi alice").to("alice")).await?;
    bob.update_subscriber(subscriber_id, SubscriberProperty::SubscribeToVideo(false))
        .await?;

    room.drop_network("bob");
    let delivery = bob
        .send_signal(Signal::new("chat", "sent while offline"))
        .await?;
    println!("[bob] offline signal: {:?}", delivery);

    tokio::time::sleep(Duration::from_millis(500)).await;

    alice
        .update_publisher(camera_id, PublisherProperty::PublishVideo(false))
        .await?;
    alice.unpublish(camera_id).await?;
    bob.disconnect().await?;
    alice.disconnect().await?;

    // Let the printers drain
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
