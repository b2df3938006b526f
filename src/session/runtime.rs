//! Async session handle
//!
//! Runs a [`SessionController`] inside a task on an explicit tokio runtime.
//! That task is the session context: application commands and transport
//! events are both funneled into it and applied one at a time, so every
//! state change and observer callback happens in a single total order.
//!
//! ```text
//!   Session (clone) ──commands──┐
//!                               ├──► session task ──► SessionController
//!   EventSink (clone) ─events───┘
//! ```
//!
//! The task ends when the last `Session` handle is dropped, disconnecting
//! first if needed.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::client::{
    Publisher, PublisherProperty, PublisherState, Subscriber, SubscriberProperty, SubscriberState,
};
use crate::error::{Error, ErrorCode, ErrorDomain, Result};
use crate::media::{VideoCapture, VideoRender};
use crate::observer::SessionObserver;
use crate::registry::{Connection, PublisherId, Snapshot, Stream, SubscriberId};
use crate::signal::{Delivery, Signal};
use crate::transport::{Transport, TransportEvent};

use super::config::SessionConfig;
use super::context::SessionContext;
use super::controller::SessionController;
use super::state::SessionStatus;

type Controller = SessionController<Box<dyn Transport>>;
type Command = Box<dyn FnOnce(&mut Controller) + Send>;

/// Handle the transport uses to deliver events to the session context
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    /// Queue an event. Returns false if the session task has stopped.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Builder for a [`Session`]
pub struct SessionBuilder {
    config: SessionConfig,
    observer: Option<Arc<dyn SessionObserver>>,
    runtime: Option<Handle>,
}

impl SessionBuilder {
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runtime the session task runs on (default: the current one)
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Spawn the session task. `make_transport` receives the sink the
    /// transport must use to report events.
    ///
    /// # Panics
    ///
    /// Panics if no runtime was given and this is called outside a tokio
    /// runtime.
    pub fn spawn<T, F>(self, make_transport: F) -> Session
    where
        T: Transport + 'static,
        F: FnOnce(EventSink) -> T,
    {
        let runtime = self.runtime.unwrap_or_else(Handle::current);
        let (command_tx, command_rx) = mpsc::unbounded_channel::<Command>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let events = EventSink { tx: event_tx };

        let transport: Box<dyn Transport> = Box::new(make_transport(events.clone()));
        let mut controller = SessionController::new(self.config, transport);
        controller.set_observer(self.observer);

        let session_id = controller.config().session_id.clone();
        runtime.spawn(async move {
            tracing::debug!(session_id = %session_id, "Session task started");
            run(controller, command_rx, event_rx).await;
            tracing::debug!(session_id = %session_id, "Session task stopped");
        });

        Session {
            commands: command_tx,
            events,
        }
    }
}

async fn run(
    mut controller: Controller,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        // Pending transport events are applied before the next command
        tokio::select! {
            biased;
            Some(event) = events.recv() => controller.handle_event(event),
            command = commands.recv() => match command {
                Some(command) => command(&mut controller),
                None => break,
            },
        }
    }

    if controller.status().allows_disconnect() {
        if let Err(e) = controller.disconnect() {
            tracing::warn!(error = %e, "Disconnect on shutdown failed");
        }
    }
}

/// Cloneable async handle to a running session
#[derive(Debug, Clone)]
pub struct Session {
    commands: mpsc::UnboundedSender<Command>,
    events: EventSink,
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            observer: None,
            runtime: None,
        }
    }

    /// Spawn on the current runtime without an observer
    pub fn spawn<T, F>(config: SessionConfig, make_transport: F) -> Session
    where
        T: Transport + 'static,
        F: FnOnce(EventSink) -> T,
    {
        Self::builder(config).spawn(make_transport)
    }

    /// Spawn on an explicit runtime
    pub fn spawn_on<T, F>(
        handle: &Handle,
        config: SessionConfig,
        observer: Option<Arc<dyn SessionObserver>>,
        make_transport: F,
    ) -> Session
    where
        T: Transport + 'static,
        F: FnOnce(EventSink) -> T,
    {
        let mut builder = Self::builder(config).runtime(handle.clone());
        builder.observer = observer;
        builder.spawn(make_transport)
    }

    /// Sink for transport events, for transports created outside the builder
    pub fn events(&self) -> EventSink {
        self.events.clone()
    }

    /// Run `f` on the session context and return its result
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Controller) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let command: Command = Box::new(move |controller| {
            let _ = tx.send(f(controller));
        });
        self.commands.send(command).map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    pub async fn connect(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.call(move |c| c.connect(&token)).await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.call(|c| c.disconnect()).await?
    }

    pub async fn publish(&self, publisher: Publisher) -> Result<()> {
        self.call(move |c| c.publish(&publisher)).await?
    }

    pub async fn unpublish(&self, id: PublisherId) -> Result<()> {
        self.call(move |c| c.unpublish(id)).await?
    }

    pub async fn update_publisher(&self, id: PublisherId, property: PublisherProperty) -> Result<()> {
        self.call(move |c| c.update_publisher(id, property)).await?
    }

    pub async fn set_video_capture(
        &self,
        id: PublisherId,
        capture: Option<Arc<dyn VideoCapture>>,
    ) -> Result<()> {
        self.call(move |c| c.set_video_capture(id, capture)).await?
    }

    pub async fn subscribe(&self, subscriber: Subscriber) -> Result<SubscriberId> {
        self.call(move |c| c.subscribe(subscriber)).await?
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<()> {
        self.call(move |c| c.unsubscribe(id)).await?
    }

    pub async fn update_subscriber(
        &self,
        id: SubscriberId,
        property: SubscriberProperty,
    ) -> Result<()> {
        self.call(move |c| c.update_subscriber(id, property)).await?
    }

    pub async fn set_video_render(
        &self,
        id: SubscriberId,
        render: Option<Arc<dyn VideoRender>>,
    ) -> Result<()> {
        self.call(move |c| c.set_video_render(id, render)).await?
    }

    pub async fn send_signal(&self, signal: Signal) -> Result<Delivery> {
        self.call(move |c| c.send_signal(signal)).await?
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        self.call(|c| c.status()).await
    }

    pub async fn context(&self) -> Result<SessionContext> {
        self.call(|c| c.context()).await
    }

    pub async fn streams(&self) -> Result<Snapshot<Stream>> {
        self.call(|c| c.streams()).await
    }

    pub async fn connections(&self) -> Result<Snapshot<Connection>> {
        self.call(|c| c.connections()).await
    }

    pub async fn publisher_state(&self, id: PublisherId) -> Result<Option<PublisherState>> {
        self.call(move |c| c.publisher_state(id)).await
    }

    pub async fn subscriber_state(&self, id: SubscriberId) -> Result<Option<SubscriberState>> {
        self.call(move |c| c.subscriber_state(id)).await
    }
}

fn closed() -> Error {
    Error::state(
        ErrorDomain::Session,
        ErrorCode::SessionClosed,
        "session task has stopped",
    )
}
