//! Session controller
//!
//! The synchronous state machine at the center of a session. It owns both
//! registries, the publisher and subscriber controllers, the signal router
//! and the stats aggregator. Application commands are validated against the
//! current status and forwarded to the [`Transport`]; outcomes come back as
//! [`TransportEvent`]s through [`SessionController::handle_event`].
//!
//! Nothing here blocks or awaits. [`Session`](super::Session) wraps a
//! controller in a task so commands and events are serialized on one
//! context.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::client::{
    Publisher, PublisherController, PublisherProperty, PublisherState, Subscriber,
    SubscriberController, SubscriberProperty, SubscriberState, VideoState, VideoTransition,
};
use crate::error::{Error, ErrorCode, ErrorDomain, Result};
use crate::media::{VideoCapture, VideoRender};
use crate::observer::{PublisherObserver, SessionObserver, SubscriberObserver};
use crate::registry::{
    Connection, ConnectionId, ConnectionRegistry, PublisherId, Snapshot, Stream, StreamId,
    StreamProperty, StreamRegistry, SubscriberId,
};
use crate::signal::{Delivery, RouterStats, Routing, Signal, SignalRouter};
use crate::stats::{AggregatorStats, NetworkStatsAggregator};
use crate::transport::{MediaEndpoint, OperationId, Transport, TransportEvent, TransportFailure};

use super::config::SessionConfig;
use super::context::{Capabilities, SessionContext};
use super::state::{SessionState, SessionStatus};

/// Stopped publishers and destroyed subscribers remembered after removal
const RETIRED_CAPACITY: usize = 256;

/// Session state machine driving a [`Transport`]
pub struct SessionController<T: Transport> {
    config: SessionConfig,
    transport: T,
    observer: Option<Arc<dyn SessionObserver>>,

    state: SessionState,
    local_connection: Option<Connection>,
    capabilities: Option<Capabilities>,

    connections: ConnectionRegistry,
    streams: StreamRegistry,

    /// Publishers that have not stopped yet
    publishers: IndexMap<PublisherId, PublisherController>,
    /// Subscribers that have not been destroyed yet
    subscribers: IndexMap<SubscriberId, SubscriberController>,
    /// Most recently stopped publishers, oldest first
    retired_publishers: IndexSet<PublisherId>,
    /// Most recently destroyed subscribers, oldest first
    retired_subscribers: IndexSet<SubscriberId>,
    /// Remote streams rejected because their id was already registered
    shadowed: IndexMap<StreamId, ConnectionId>,

    signals: SignalRouter,
    stats: NetworkStatsAggregator,

    next_op: u64,
    next_stream_seq: u64,
    connect_op: Option<OperationId>,
    reconnect_op: Option<OperationId>,
}

impl<T: Transport> SessionController<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let signals = SignalRouter::new(config.settings.signal_queue_capacity);
        Self {
            config,
            transport,
            observer: None,
            state: SessionState::new(),
            local_connection: None,
            capabilities: None,
            connections: ConnectionRegistry::new(),
            streams: StreamRegistry::new(),
            publishers: IndexMap::new(),
            subscribers: IndexMap::new(),
            retired_publishers: IndexSet::new(),
            retired_subscribers: IndexSet::new(),
            shadowed: IndexMap::new(),
            signals,
            stats: NetworkStatsAggregator::new(),
            next_op: 0,
            next_stream_seq: 0,
            connect_op: None,
            reconnect_op: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn SessionObserver>>) {
        self.observer = observer;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn local_connection(&self) -> Option<&Connection> {
        self.local_connection.as_ref()
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities
    }

    /// Snapshot passed to observers
    pub fn context(&self) -> SessionContext {
        SessionContext {
            api_key: self.config.api_key.clone(),
            session_id: self.config.session_id.clone(),
            status: self.state.status(),
            local_connection: self.local_connection.clone(),
            capabilities: self.capabilities,
        }
    }

    /// Immutable view of the live streams, in creation order
    pub fn streams(&self) -> Snapshot<Stream> {
        self.streams.snapshot()
    }

    /// Immutable view of the live connections, in creation order
    pub fn connections(&self) -> Snapshot<Connection> {
        self.connections.snapshot()
    }

    pub fn publisher_state(&self, id: PublisherId) -> Option<PublisherState> {
        match self.publishers.get(&id) {
            Some(p) => Some(p.state()),
            None if self.retired_publishers.contains(&id) => Some(PublisherState::Stopped),
            None => None,
        }
    }

    /// Stream produced by a publisher, once it is publishing
    pub fn publisher_stream(&self, id: PublisherId) -> Option<&StreamId> {
        self.publishers.get(&id).and_then(|p| p.stream_id())
    }

    pub fn subscriber_state(&self, id: SubscriberId) -> Option<SubscriberState> {
        match self.subscribers.get(&id) {
            Some(s) => Some(s.state()),
            None if self.retired_subscribers.contains(&id) => Some(SubscriberState::Destroyed),
            None => None,
        }
    }

    pub fn subscriber_video_state(&self, id: SubscriberId) -> Option<VideoState> {
        self.subscribers.get(&id).map(|s| s.video_state())
    }

    /// Publishers still holding controller state (not yet stopped)
    pub fn tracked_publishers(&self) -> usize {
        self.publishers.len()
    }

    /// Subscribers still holding controller state (not yet destroyed)
    pub fn tracked_subscribers(&self) -> usize {
        self.subscribers.len()
    }

    /// Signals waiting for the session to reconnect
    pub fn queued_signals(&self) -> usize {
        self.signals.queued()
    }

    pub fn signal_stats(&self) -> RouterStats {
        self.signals.stats()
    }

    pub fn stats_totals(&self) -> AggregatorStats {
        self.stats.totals()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn next_op(&mut self) -> OperationId {
        self.next_op += 1;
        OperationId::new(self.next_op)
    }

    fn enter(&mut self, to: SessionStatus) {
        if let Err(e) = self.state.transition(to) {
            tracing::error!(session_id = %self.config.session_id, error = %e, "Unexpected session transition");
        }
    }

    fn require_media(&self, domain: ErrorDomain, operation: &str) -> Result<()> {
        let status = self.state.status();
        if status.allows_media() {
            return Ok(());
        }
        let code = if status.is_terminal() {
            ErrorCode::SessionClosed
        } else {
            ErrorCode::NotConnected
        };
        Err(Error::state(
            domain,
            code,
            format!("cannot {} while {}", operation, status),
        ))
    }

    // ---- Connection lifecycle ----

    /// Start connecting with `token`. Valid only from NotConnected; the
    /// outcome arrives as an observer notification.
    pub fn connect(&mut self, token: &str) -> Result<()> {
        let status = self.state.status();
        if status != SessionStatus::NotConnected {
            let code = if status.is_terminal() {
                ErrorCode::SessionClosed
            } else {
                ErrorCode::InvalidSessionState
            };
            return Err(Error::state(
                ErrorDomain::Session,
                code,
                format!("cannot connect while {}", status),
            ));
        }

        self.state
            .transition(SessionStatus::Connecting)
            .map_err(|e| Error::state(ErrorDomain::Session, ErrorCode::InvalidSessionState, e.to_string()))?;

        let op = self.next_op();
        self.connect_op = Some(op);
        tracing::info!(session_id = %self.config.session_id, op = %op, "Connecting");
        self.transport.connect(op, token, &self.config.settings);
        Ok(())
    }

    /// Disconnect, releasing every publisher and subscriber before returning
    pub fn disconnect(&mut self) -> Result<()> {
        let status = self.state.status();
        if !status.allows_disconnect() {
            let code = if status.is_terminal() {
                ErrorCode::SessionClosed
            } else {
                ErrorCode::NotConnected
            };
            return Err(Error::state(
                ErrorDomain::Session,
                code,
                format!("cannot disconnect while {}", status),
            ));
        }

        tracing::info!(session_id = %self.config.session_id, from = %status, "Disconnecting");
        self.enter(SessionStatus::Disconnecting);
        self.release_all();
        self.transport.disconnect();
        self.enter(SessionStatus::NotConnected);
        self.notify_session(|o, ctx| o.on_disconnected(ctx));
        Ok(())
    }

    // ---- Publishing ----

    /// Start publishing. The stream is created when the transport confirms.
    pub fn publish(&mut self, publisher: &Publisher) -> Result<()> {
        self.require_media(ErrorDomain::Publisher, "publish")?;
        if !self.capabilities.is_some_and(|c| c.can_publish) {
            return Err(Error::state(
                ErrorDomain::Publisher,
                ErrorCode::PublishNotPermitted,
                "the token used to connect does not allow publishing",
            ));
        }

        let id = publisher.id();
        if self.retired_publishers.contains(&id) {
            return Err(stopped_publisher(id));
        }
        if let Some(active) = self
            .publishers
            .values()
            .find(|p| p.id() != id && p.is_active())
        {
            return Err(Error::capacity(
                ErrorDomain::Publisher,
                ErrorCode::PublisherAlreadyActive,
                format!("publisher {} is already active on this session", active.id()),
            ));
        }

        let op = self.next_op();
        let ctrl = self
            .publishers
            .entry(id)
            .or_insert_with(|| PublisherController::new(publisher));
        ctrl.begin(op)?;

        let capture = ctrl.capture().cloned();
        let settings = ctrl.settings().clone();
        if capture.is_some() {
            self.transport.attach_capture(id, capture);
        }
        tracing::info!(publisher = %id, op = %op, "Publishing");
        self.transport.publish(op, id, &settings);
        Ok(())
    }

    /// Stop publishing. A publish still in flight is cancelled.
    pub fn unpublish(&mut self, id: PublisherId) -> Result<()> {
        self.require_media(ErrorDomain::Publisher, "unpublish")?;
        let ctrl = self.publisher(id)?;

        match ctrl.state() {
            PublisherState::Stopped => return Err(stopped_publisher(id)),
            PublisherState::Idle if ctrl.pending().is_none() => {
                return Err(Error::state(
                    ErrorDomain::Publisher,
                    ErrorCode::PublisherNotPublishing,
                    format!("publisher {} is not publishing", id),
                ))
            }
            _ => {}
        }

        self.stop_publisher(id);
        Ok(())
    }

    pub fn update_publisher(&mut self, id: PublisherId, property: PublisherProperty) -> Result<()> {
        let ctrl = self.publisher_mut(id)?;
        if !ctrl.set_property(property)? {
            return Ok(());
        }
        let publishing = ctrl.state() == PublisherState::Publishing;
        let stream = ctrl.stream_id().filter(|_| publishing).cloned();

        tracing::debug!(publisher = %id, ?property, "Publisher property changed");
        self.transport.update_publisher(id, &property);

        let change = match property {
            PublisherProperty::PublishAudio(enabled) => StreamProperty::HasAudio(enabled),
            PublisherProperty::PublishVideo(enabled) => StreamProperty::HasVideo(enabled),
            PublisherProperty::AudioFallback(_) => return Ok(()),
        };
        if let Some(stream) = stream {
            self.on_stream_property_changed(&stream, change);
        }
        Ok(())
    }

    /// Replace the capturer feeding a publisher
    pub fn set_video_capture(
        &mut self,
        id: PublisherId,
        capture: Option<Arc<dyn VideoCapture>>,
    ) -> Result<()> {
        self.publisher_mut(id)?.set_capture(capture.clone())?;
        self.transport.attach_capture(id, capture);
        Ok(())
    }

    fn publisher(&self, id: PublisherId) -> Result<&PublisherController> {
        match self.publishers.get(&id) {
            Some(ctrl) => Ok(ctrl),
            None if self.retired_publishers.contains(&id) => Err(stopped_publisher(id)),
            None => Err(unknown_publisher(id)),
        }
    }

    fn publisher_mut(&mut self, id: PublisherId) -> Result<&mut PublisherController> {
        match self.publishers.get_mut(&id) {
            Some(ctrl) => Ok(ctrl),
            None if self.retired_publishers.contains(&id) => Err(stopped_publisher(id)),
            None => Err(unknown_publisher(id)),
        }
    }

    // ---- Subscribing ----

    /// Subscribe to a registered stream
    pub fn subscribe(&mut self, subscriber: Subscriber) -> Result<SubscriberId> {
        self.require_media(ErrorDomain::Subscriber, "subscribe")?;
        if !self.capabilities.is_some_and(|c| c.can_subscribe) {
            return Err(Error::state(
                ErrorDomain::Subscriber,
                ErrorCode::SubscribeNotPermitted,
                "the token used to connect does not allow subscribing",
            ));
        }

        let id = subscriber.id();
        if self.subscribers.contains_key(&id) || self.retired_subscribers.contains(&id) {
            return Err(Error::state(
                ErrorDomain::Subscriber,
                ErrorCode::SubscriberAlreadyBound,
                format!("subscriber {} was already subscribed", id),
            ));
        }

        let stream = self
            .streams
            .get(subscriber.stream_id())
            .map_err(|e| Error::invalid_stream(e.to_string()))?
            .clone();

        let op = self.next_op();
        let ctrl = SubscriberController::new(subscriber, &stream, op);
        let settings = ctrl.settings().clone();
        let render = ctrl.render().cloned();
        self.subscribers.insert(id, ctrl);

        if render.is_some() {
            self.transport.attach_render(id, render);
        }
        tracing::info!(subscriber = %id, stream = %stream.id, op = %op, "Subscribing");
        self.transport.subscribe(op, id, &stream.id, &settings);
        Ok(id)
    }

    /// Unsubscribe. Valid from any state except Destroyed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> Result<()> {
        self.subscriber(id)?.ensure_live()?;
        self.require_media(ErrorDomain::Subscriber, "unsubscribe")?;
        self.destroy_subscriber(id, true);
        Ok(())
    }

    pub fn update_subscriber(
        &mut self,
        id: SubscriberId,
        property: SubscriberProperty,
    ) -> Result<()> {
        let (changed, transition) = self.subscriber_mut(id)?.set_property(property)?;
        if changed {
            tracing::debug!(subscriber = %id, ?property, "Subscriber property changed");
            self.transport.update_subscriber(id, &property);
        }
        if let Some(transition) = transition {
            self.notify_video_transition(id, transition);
        }
        Ok(())
    }

    /// Replace the renderer fed by a subscriber
    pub fn set_video_render(
        &mut self,
        id: SubscriberId,
        render: Option<Arc<dyn VideoRender>>,
    ) -> Result<()> {
        self.subscriber_mut(id)?.set_render(render.clone())?;
        self.transport.attach_render(id, render);
        Ok(())
    }

    fn subscriber(&self, id: SubscriberId) -> Result<&SubscriberController> {
        match self.subscribers.get(&id) {
            Some(ctrl) => Ok(ctrl),
            None if self.retired_subscribers.contains(&id) => Err(destroyed_subscriber(id)),
            None => Err(unknown_subscriber(id)),
        }
    }

    fn subscriber_mut(&mut self, id: SubscriberId) -> Result<&mut SubscriberController> {
        match self.subscribers.get_mut(&id) {
            Some(ctrl) => Ok(ctrl),
            None if self.retired_subscribers.contains(&id) => Err(destroyed_subscriber(id)),
            None => Err(unknown_subscriber(id)),
        }
    }

    // ---- Signaling ----

    /// Send a signal now, queue it for after the reconnect, or drop it
    pub fn send_signal(&mut self, signal: Signal) -> Result<Delivery> {
        let routing = self
            .signals
            .route(signal, self.state.status(), &self.connections)?;
        let delivery = routing.delivery();
        if let Routing::Transmit(signal) = routing {
            self.transport.send_signal(&signal);
        }
        Ok(delivery)
    }

    // ---- Transport events ----

    /// Apply one event from the transport
    pub fn handle_event(&mut self, event: TransportEvent) {
        tracing::trace!(event = event.name(), status = %self.state.status(), "Transport event");

        match event {
            TransportEvent::Connected {
                op,
                connection,
                capabilities,
            } => self.on_connected(op, connection, capabilities),
            TransportEvent::ConnectFailed { op, failure } => self.on_connect_failed(op, failure),
            TransportEvent::NetworkLost => self.on_network_lost(),
            TransportEvent::ReconnectSucceeded { op } => self.on_reconnected(op),
            TransportEvent::ReconnectAttemptFailed { op, failure } => {
                self.on_reconnect_attempt_failed(op, failure)
            }
            TransportEvent::Disconnected { failure } => self.on_remote_disconnect(failure),
            TransportEvent::Fatal { failure } => self.on_fatal(failure),

            TransportEvent::ConnectionCreated(connection) => self.on_connection_created(connection),
            TransportEvent::ConnectionDestroyed(id) => self.on_connection_destroyed(&id),
            TransportEvent::StreamCreated(stream) => self.on_stream_created(stream),
            TransportEvent::StreamDestroyed(id) => self.on_stream_destroyed(&id),
            TransportEvent::StreamPropertyChanged { stream, change } => {
                self.on_stream_property_changed(&stream, change)
            }

            TransportEvent::PublishSucceeded {
                op,
                publisher,
                stream,
                video_dimensions,
            } => self.on_publish_succeeded(op, publisher, stream, video_dimensions),
            TransportEvent::PublishFailed {
                op,
                publisher,
                failure,
            } => self.on_publish_failed(op, publisher, failure),
            TransportEvent::PublisherVideoFallback {
                publisher,
                video_enabled,
            } => {
                let reflected = self
                    .publishers
                    .get_mut(&publisher)
                    .is_some_and(|p| p.reflect_video_fallback(video_enabled));
                if reflected {
                    tracing::info!(publisher = %publisher, video_enabled, "Audio-fallback toggled video");
                    self.notify_publisher(publisher, |o, ctx| {
                        o.on_video_fallback_changed(ctx, publisher, video_enabled)
                    });
                }
            }

            TransportEvent::SubscribeSucceeded { op, subscriber } => {
                let completed = self
                    .subscribers
                    .get_mut(&subscriber)
                    .is_some_and(|s| s.complete(op));
                if completed {
                    tracing::info!(subscriber = %subscriber, "Subscribed");
                    self.notify_subscriber(subscriber, |o, ctx| o.on_connected(ctx, subscriber));
                } else {
                    stale_completion(op, "subscribe-succeeded");
                }
            }
            TransportEvent::SubscribeFailed {
                op,
                subscriber,
                failure,
            } => self.on_subscribe_failed(op, subscriber, failure),
            TransportEvent::SubscriberMediaDisconnected(id) => {
                if self.subscribers.get_mut(&id).is_some_and(|s| s.media_disconnected()) {
                    self.notify_subscriber(id, |o, ctx| o.on_disconnected(ctx, id));
                }
            }
            TransportEvent::SubscriberMediaReconnected(id) => {
                if self.subscribers.get_mut(&id).is_some_and(|s| s.media_reconnected()) {
                    self.notify_subscriber(id, |o, ctx| o.on_reconnected(ctx, id));
                }
            }
            TransportEvent::SubscriberVideoChanged {
                subscriber,
                enabled,
                reason,
            } => {
                let transition = self
                    .subscribers
                    .get_mut(&subscriber)
                    .and_then(|s| s.transport_video_changed(enabled, reason));
                if let Some(transition) = transition {
                    self.notify_video_transition(subscriber, transition);
                }
            }
            TransportEvent::VideoDisableWarning { subscriber, lifted } => {
                let changed = self
                    .subscribers
                    .get_mut(&subscriber)
                    .is_some_and(|s| s.set_video_warning(!lifted));
                if changed {
                    self.notify_subscriber(subscriber, |o, ctx| {
                        if lifted {
                            o.on_video_disable_warning_lifted(ctx, subscriber)
                        } else {
                            o.on_video_disable_warning(ctx, subscriber)
                        }
                    });
                }
            }
            TransportEvent::VideoDataReceived {
                subscriber,
                dimensions,
            } => {
                if self.live_subscriber(subscriber) {
                    self.notify_subscriber(subscriber, |o, ctx| {
                        o.on_video_data_received(ctx, subscriber, dimensions)
                    });
                }
            }

            TransportEvent::SignalReceived(signal) => {
                if self.state.status().allows_media() {
                    self.notify_session(|o, ctx| o.on_signal_received(ctx, &signal));
                } else {
                    tracing::debug!(status = %self.state.status(), "Signal received while not connected, ignored");
                }
            }
            TransportEvent::ArchiveStarted { archive_id, name } => {
                tracing::info!(archive_id = %archive_id, "Archive started");
                self.notify_session(|o, ctx| o.on_archive_started(ctx, &archive_id, name.as_deref()));
            }
            TransportEvent::ArchiveStopped { archive_id } => {
                tracing::info!(archive_id = %archive_id, "Archive stopped");
                self.notify_session(|o, ctx| o.on_archive_stopped(ctx, &archive_id));
            }

            TransportEvent::AudioLevel { endpoint, level } => match endpoint {
                MediaEndpoint::Publisher(id) => {
                    if self.publisher_state(id) == Some(PublisherState::Publishing) {
                        self.notify_publisher(id, |o, ctx| o.on_audio_level(ctx, id, level));
                    }
                }
                MediaEndpoint::Subscriber(id) => {
                    if self.live_subscriber(id) {
                        self.notify_subscriber(id, |o, ctx| o.on_audio_level(ctx, id, level));
                    }
                }
            },
            TransportEvent::PublisherStats { publisher, samples } => {
                if self.publisher_state(publisher) != Some(PublisherState::Publishing) {
                    return;
                }
                let accepted = self.stats.accept_publisher(publisher, samples);
                if !accepted.is_empty() {
                    self.notify_publisher(publisher, |o, ctx| {
                        o.on_network_stats(ctx, publisher, &accepted)
                    });
                }
            }
            TransportEvent::SubscriberStats { subscriber, sample } => {
                if !self.live_subscriber(subscriber) {
                    return;
                }
                if let Some(sample) = self.stats.accept_subscriber(subscriber, sample) {
                    self.notify_subscriber(subscriber, |o, ctx| {
                        o.on_network_stats(ctx, subscriber, &sample)
                    });
                }
            }
        }
    }

    fn on_connected(&mut self, op: OperationId, connection: Connection, capabilities: Capabilities) {
        if self.connect_op != Some(op) || self.state.status() != SessionStatus::Connecting {
            stale_completion(op, "connected");
            return;
        }

        self.connect_op = None;
        self.enter(SessionStatus::Connected);
        self.connections.insert(connection.clone());
        tracing::info!(
            session_id = %self.config.session_id,
            connection = %connection.id,
            can_publish = capabilities.can_publish,
            can_subscribe = capabilities.can_subscribe,
            "Connected"
        );
        self.local_connection = Some(connection);
        self.capabilities = Some(capabilities);
        self.notify_session(|o, ctx| o.on_connected(ctx));
    }

    fn on_connect_failed(&mut self, op: OperationId, failure: TransportFailure) {
        if self.connect_op != Some(op) || self.state.status() != SessionStatus::Connecting {
            stale_completion(op, "connect-failed");
            return;
        }

        self.connect_op = None;
        tracing::warn!(session_id = %self.config.session_id, failure = %failure, "Connect failed");
        self.enter(SessionStatus::NotConnected);
        let error = failure.into_error(ErrorDomain::Session, ErrorCode::ConnectFailed);
        self.notify_session(|o, ctx| o.on_error(ctx, &error));
    }

    fn on_network_lost(&mut self) {
        if self.state.status() != SessionStatus::Connected {
            tracing::debug!(status = %self.state.status(), "Network loss ignored");
            return;
        }

        tracing::warn!(session_id = %self.config.session_id, "Network lost, reconnecting");
        self.enter(SessionStatus::Reconnecting);
        self.signals.begin_episode();
        self.notify_session(|o, ctx| o.on_reconnecting(ctx));
        self.schedule_reconnect(None);
    }

    /// Issue the next reconnect attempt, or give up once the budget is spent
    fn schedule_reconnect(&mut self, last_failure: Option<TransportFailure>) {
        let policy = self.config.settings.reconnect;
        if !policy.allows(self.state.reconnect_attempts()) {
            let failure = last_failure
                .unwrap_or_else(|| TransportFailure::new(0, "reconnection is disabled"));
            tracing::error!(
                session_id = %self.config.session_id,
                attempts = self.state.reconnect_attempts(),
                "Reconnection failed, giving up"
            );
            let error = failure.into_error(ErrorDomain::Session, ErrorCode::ReconnectFailed);
            self.teardown(Some(error));
            return;
        }

        let attempt = self.state.record_reconnect_attempt();
        let delay = policy.delay_for(attempt);
        let op = self.next_op();
        self.reconnect_op = Some(op);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, op = %op, "Scheduling reconnect");
        self.transport.reconnect(op, attempt, delay);
    }

    fn on_reconnected(&mut self, op: OperationId) {
        if self.reconnect_op != Some(op) || self.state.status() != SessionStatus::Reconnecting {
            stale_completion(op, "reconnect-succeeded");
            return;
        }

        self.reconnect_op = None;
        let attempts = self.state.reconnect_attempts();
        self.enter(SessionStatus::Connected);

        let queued = self.signals.flush(&self.connections);
        tracing::info!(
            session_id = %self.config.session_id,
            attempts,
            flushed = queued.len(),
            "Reconnected"
        );
        for signal in &queued {
            self.transport.send_signal(signal);
        }
        self.notify_session(|o, ctx| o.on_reconnected(ctx));
    }

    fn on_reconnect_attempt_failed(&mut self, op: OperationId, failure: TransportFailure) {
        if self.reconnect_op != Some(op) || self.state.status() != SessionStatus::Reconnecting {
            stale_completion(op, "reconnect-attempt-failed");
            return;
        }

        self.reconnect_op = None;
        tracing::warn!(
            attempt = self.state.reconnect_attempts(),
            failure = %failure,
            "Reconnect attempt failed"
        );
        self.schedule_reconnect(Some(failure));
    }

    fn on_remote_disconnect(&mut self, failure: Option<TransportFailure>) {
        let status = self.state.status();
        if !matches!(
            status,
            SessionStatus::Connecting | SessionStatus::Connected | SessionStatus::Reconnecting
        ) {
            tracing::debug!(status = %status, "Remote disconnect ignored");
            return;
        }

        tracing::warn!(session_id = %self.config.session_id, from = %status, "Disconnected by remote");
        let error = failure.map(|f| f.into_error(ErrorDomain::Session, ErrorCode::ConnectionDropped));
        self.teardown(error);
    }

    fn on_fatal(&mut self, failure: TransportFailure) {
        if self.state.status().is_terminal() {
            return;
        }

        tracing::error!(session_id = %self.config.session_id, failure = %failure, "Fatal transport fault");
        self.release_all();
        self.enter(SessionStatus::Failed);
        let error = Error::fatal(failure.to_string());
        self.notify_session(|o, ctx| o.on_error(ctx, &error));
    }

    fn on_connection_created(&mut self, connection: Connection) {
        if !self.state.status().allows_media() {
            tracing::debug!(connection = %connection.id, "Connection event while not connected, ignored");
            return;
        }
        if self.connections.insert(connection.clone())
            && !self.config.settings.connection_events_suppressed
        {
            self.notify_session(|o, ctx| o.on_connection_created(ctx, &connection));
        }
    }

    fn on_connection_destroyed(&mut self, id: &ConnectionId) {
        if self.local_connection.as_ref().is_some_and(|c| &c.id == id) {
            tracing::warn!(connection = %id, "Ignoring destroy event for the local connection");
            return;
        }
        let Some(connection) = self.connections.remove(id) else {
            return;
        };
        self.shadowed.retain(|_, owner| owner != id);

        let owned: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|s| &s.connection_id == id)
            .map(|s| s.id.clone())
            .collect();
        for stream_id in owned {
            if let Some(stream) = self.retire_stream(&stream_id) {
                self.notify_session(|o, ctx| o.on_stream_destroyed(ctx, &stream));
            }
        }

        if !self.config.settings.connection_events_suppressed {
            self.notify_session(|o, ctx| o.on_connection_destroyed(ctx, &connection));
        }
    }

    fn on_stream_created(&mut self, stream: Stream) {
        if !self.state.status().allows_media() {
            tracing::debug!(stream = %stream.id, "Stream event while not connected, ignored");
            return;
        }
        if !self.connections.contains(&stream.connection_id) {
            tracing::warn!(
                stream = %stream.id,
                connection = %stream.connection_id,
                "Stream from an unknown connection, ignored"
            );
            return;
        }
        if self.streams.insert(stream.clone()) {
            self.notify_session(|o, ctx| o.on_stream_created(ctx, &stream));
            return;
        }

        let owner = self.streams.get(&stream.id).map(|s| s.connection_id.clone());
        if let Ok(owner) = owner {
            if owner != stream.connection_id {
                tracing::warn!(
                    stream = %stream.id,
                    connection = %stream.connection_id,
                    owner = %owner,
                    "Stream id already registered to another connection, ignored"
                );
                self.shadowed.insert(stream.id, stream.connection_id);
            }
        }
    }

    fn on_stream_destroyed(&mut self, id: &StreamId) {
        if let Some(connection) = self.shadowed.shift_remove(id) {
            tracing::debug!(stream = %id, connection = %connection, "Ignored stream destroyed");
            return;
        }

        let local = self.streams.get(id).is_ok_and(|s| {
            self.local_connection
                .as_ref()
                .is_some_and(|c| c.id == s.connection_id)
        });
        let owner = self
            .publishers
            .values()
            .find(|p| local && p.stream_id() == Some(id))
            .map(|p| p.id());
        if let Some(publisher) = owner {
            tracing::info!(publisher = %publisher, stream = %id, "Local stream removed by the transport");
            self.stop_publisher(publisher);
            return;
        }

        if let Some(stream) = self.retire_stream(id) {
            self.notify_session(|o, ctx| o.on_stream_destroyed(ctx, &stream));
        }
    }

    fn on_stream_property_changed(&mut self, id: &StreamId, change: StreamProperty) {
        let Ok(stream) = self.streams.get_mut(id) else {
            tracing::debug!(stream = %id, "Property change for an unknown stream");
            return;
        };
        if !stream.apply(change) {
            return;
        }
        let stream = stream.clone();

        if let StreamProperty::HasVideo(has_video) = change {
            let bound: Vec<SubscriberId> = self
                .subscribers
                .values()
                .filter(|s| s.stream_id() == id && !s.is_destroyed())
                .map(|s| s.id())
                .collect();
            for subscriber in bound {
                let transition = self
                    .subscribers
                    .get_mut(&subscriber)
                    .and_then(|s| s.stream_video_changed(has_video));
                if let Some(transition) = transition {
                    self.notify_video_transition(subscriber, transition);
                }
            }
        }

        self.notify_session(|o, ctx| o.on_stream_property_changed(ctx, &stream, change));
    }

    fn on_publish_succeeded(
        &mut self,
        op: OperationId,
        id: PublisherId,
        assigned: Option<StreamId>,
        video_dimensions: Option<crate::media::VideoDimensions>,
    ) {
        let Some(local) = self.local_connection.as_ref().map(|c| c.id.clone()) else {
            stale_completion(op, "publish-succeeded");
            return;
        };
        if self.publishers.get(&id).and_then(|p| p.pending()) != Some(op) {
            stale_completion(op, "publish-succeeded");
            return;
        }

        let stream_id = match assigned {
            Some(assigned) if self.streams.contains(&assigned) => {
                let failure = TransportFailure::new(
                    0,
                    format!("stream id {} is already registered", assigned),
                );
                self.on_publish_failed(op, id, failure);
                return;
            }
            Some(assigned) => assigned,
            None => self.allocate_stream_id(),
        };

        let Some(ctrl) = self.publishers.get_mut(&id) else {
            return;
        };
        ctrl.complete(op, stream_id.clone());

        let settings = ctrl.settings();
        let mut stream = Stream::new(stream_id.clone(), local)
            .with_media(ctrl.publish_audio(), ctrl.publish_video())
            .with_video_type(settings.video_type);
        if let Some(name) = &settings.name {
            stream = stream.with_name(name.clone());
        }
        if let Some(dimensions) = video_dimensions {
            stream = stream.with_video_dimensions(dimensions);
        }

        self.streams.insert(stream.clone());
        tracing::info!(publisher = %id, stream = %stream_id, "Publishing started");
        self.notify_publisher(id, |o, ctx| o.on_stream_created(ctx, id, &stream));
    }

    /// Next `strN` id not already taken by a registered stream
    fn allocate_stream_id(&mut self) -> StreamId {
        loop {
            self.next_stream_seq += 1;
            let id = StreamId::local(self.next_stream_seq);
            if !self.streams.contains(&id) {
                return id;
            }
        }
    }

    fn on_publish_failed(&mut self, op: OperationId, id: PublisherId, failure: TransportFailure) {
        let failed = self.publishers.get_mut(&id).is_some_and(|p| p.fail(op));
        if !failed {
            stale_completion(op, "publish-failed");
            return;
        }

        tracing::warn!(publisher = %id, failure = %failure, "Publish failed");
        let error = failure.into_error(ErrorDomain::Publisher, ErrorCode::PublishFailed);
        self.notify_publisher(id, |o, ctx| o.on_error(ctx, id, &error));
    }

    fn on_subscribe_failed(&mut self, op: OperationId, id: SubscriberId, failure: TransportFailure) {
        let Some(ctrl) = self.subscribers.get_mut(&id) else {
            stale_completion(op, "subscribe-failed");
            return;
        };
        if !ctrl.fail(op) {
            stale_completion(op, "subscribe-failed");
            return;
        }
        let stream = ctrl.stream_id().clone();

        tracing::warn!(subscriber = %id, stream = %stream, failure = %failure, "Subscribe failed");
        self.stats.forget_subscriber(id);
        let error = failure.into_error(ErrorDomain::Subscriber, ErrorCode::SubscribeFailed);
        self.notify_subscriber(id, |o, ctx| {
            o.on_error(ctx, id, &error);
            o.on_destroyed(ctx, id, &stream);
        });
        self.retire_subscriber(id);
    }

    // ---- Teardown ----

    /// Stop a publisher, unregistering its stream. Returns false if it was
    /// already stopped.
    fn stop_publisher(&mut self, id: PublisherId) -> bool {
        let Some(ctrl) = self.publishers.get_mut(&id) else {
            return false;
        };
        if ctrl.state() == PublisherState::Stopped {
            return false;
        }

        let was_active = ctrl.is_active();
        let stream_id = ctrl.stop();
        if was_active {
            self.transport.unpublish(id, stream_id.as_ref());
        }
        self.stats.forget_publisher(id);
        tracing::info!(publisher = %id, stream = ?stream_id, "Publisher stopped");

        if let Some(stream) = stream_id.and_then(|s| self.retire_stream(&s)) {
            self.notify_publisher(id, |o, ctx| o.on_stream_destroyed(ctx, id, &stream));
        }
        self.publishers.shift_remove(&id);
        remember(&mut self.retired_publishers, id);
        true
    }

    /// Unregister a stream and destroy the subscribers bound to it
    fn retire_stream(&mut self, id: &StreamId) -> Option<Stream> {
        let stream = self.streams.remove(id)?;
        let bound: Vec<SubscriberId> = self
            .subscribers
            .values()
            .filter(|s| s.stream_id() == id && !s.is_destroyed())
            .map(|s| s.id())
            .collect();
        for subscriber in bound {
            self.destroy_subscriber(subscriber, true);
        }
        Some(stream)
    }

    fn destroy_subscriber(&mut self, id: SubscriberId, release_transport: bool) -> bool {
        let Some(ctrl) = self.subscribers.get_mut(&id) else {
            return false;
        };
        if !ctrl.destroy() {
            return false;
        }
        let stream = ctrl.stream_id().clone();

        if release_transport {
            self.transport.attach_render(id, None);
            self.transport.unsubscribe(id);
        }
        self.stats.forget_subscriber(id);
        tracing::info!(subscriber = %id, stream = %stream, "Subscriber destroyed");
        self.notify_subscriber(id, |o, ctx| o.on_destroyed(ctx, id, &stream));
        self.retire_subscriber(id);
        true
    }

    fn retire_subscriber(&mut self, id: SubscriberId) {
        self.subscribers.shift_remove(&id);
        remember(&mut self.retired_subscribers, id);
    }

    /// Release every publisher and subscriber and empty all session state
    fn release_all(&mut self) {
        self.connect_op = None;
        self.reconnect_op = None;

        let publishers: Vec<PublisherId> = self.publishers.keys().copied().collect();
        for id in publishers {
            self.stop_publisher(id);
        }

        let subscribers: Vec<SubscriberId> = self.subscribers.keys().copied().collect();
        for id in subscribers {
            self.destroy_subscriber(id, true);
        }

        let discarded = self.signals.discard();
        if discarded > 0 {
            tracing::info!(discarded, "Queued signals discarded");
        }

        self.streams.clear();
        self.shadowed.clear();
        self.connections.clear();
        self.stats.clear();
        self.local_connection = None;
        self.capabilities = None;
    }

    /// Tear down to NotConnected after a failure the application did not request
    fn teardown(&mut self, error: Option<Error>) {
        self.release_all();
        self.enter(SessionStatus::NotConnected);
        if let Some(error) = error {
            self.notify_session(|o, ctx| o.on_error(ctx, &error));
        }
        self.notify_session(|o, ctx| o.on_disconnected(ctx));
    }

    // ---- Notifications ----

    fn live_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.get(&id).is_some_and(|s| !s.is_destroyed())
    }

    fn notify_session(&self, f: impl FnOnce(&dyn SessionObserver, &SessionContext)) {
        if let Some(observer) = &self.observer {
            f(observer.as_ref(), &self.context());
        }
    }

    fn notify_publisher(&self, id: PublisherId, f: impl FnOnce(&dyn PublisherObserver, &SessionContext)) {
        if let Some(observer) = self.publishers.get(&id).and_then(|p| p.observer()) {
            f(observer.as_ref(), &self.context());
        }
    }

    fn notify_subscriber(
        &self,
        id: SubscriberId,
        f: impl FnOnce(&dyn SubscriberObserver, &SessionContext),
    ) {
        if let Some(observer) = self.subscribers.get(&id).and_then(|s| s.observer()) {
            f(observer.as_ref(), &self.context());
        }
    }

    fn notify_video_transition(&self, id: SubscriberId, transition: VideoTransition) {
        tracing::debug!(subscriber = %id, enabled = transition.enabled, reason = ?transition.reason, "Subscriber video changed");
        self.notify_subscriber(id, |o, ctx| {
            if transition.enabled {
                o.on_video_enabled(ctx, id, transition.reason)
            } else {
                o.on_video_disabled(ctx, id, transition.reason)
            }
        });
    }
}

fn unknown_publisher(id: PublisherId) -> Error {
    Error::state(
        ErrorDomain::Publisher,
        ErrorCode::UnknownPublisher,
        format!("publisher {} was never published on this session", id),
    )
}

fn stopped_publisher(id: PublisherId) -> Error {
    Error::state(
        ErrorDomain::Publisher,
        ErrorCode::PublisherStopped,
        format!("publisher {} is stopped", id),
    )
}

fn unknown_subscriber(id: SubscriberId) -> Error {
    Error::state(
        ErrorDomain::Subscriber,
        ErrorCode::UnknownSubscriber,
        format!("subscriber {} was never subscribed on this session", id),
    )
}

fn destroyed_subscriber(id: SubscriberId) -> Error {
    Error::state(
        ErrorDomain::Subscriber,
        ErrorCode::SubscriberDestroyed,
        format!("subscriber {} is destroyed", id),
    )
}

/// Record a retired id, forgetting the oldest once full
fn remember<K: std::hash::Hash + Eq>(retired: &mut IndexSet<K>, id: K) {
    if retired.len() >= RETIRED_CAPACITY {
        retired.shift_remove_index(0);
    }
    retired.insert(id);
}

fn stale_completion(op: OperationId, event: &'static str) {
    tracing::warn!(op = %op, event, "Ignoring completion for a superseded operation");
}
