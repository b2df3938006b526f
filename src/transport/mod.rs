//! Transport seam
//!
//! The session never touches sockets, ICE or media. It issues commands to a
//! [`Transport`] and learns about outcomes through [`TransportEvent`]s that
//! the transport marshals back onto the session context:
//!
//! ```text
//!   SessionController ──commands──► Transport ──► network / media
//!          ▲                            │
//!          └─────── TransportEvent ◄────┘   (via EventSink)
//! ```
//!
//! Commands must return without waiting on the network.

pub mod event;

use std::sync::Arc;
use std::time::Duration;

use crate::client::{PublisherProperty, PublisherSettings, SubscriberProperty, SubscriberSettings};
use crate::media::{VideoCapture, VideoRender};
use crate::registry::{PublisherId, StreamId, SubscriberId};
use crate::session::SessionSettings;
use crate::signal::Signal;

pub use event::{MediaEndpoint, OperationId, TransportEvent, TransportFailure};

/// Media and signaling backend driven by the session
pub trait Transport: Send {
    /// Start connecting with an opaque token
    fn connect(&mut self, op: OperationId, token: &str, settings: &SessionSettings);

    fn disconnect(&mut self);

    /// Schedule reconnection attempt `attempt` (1-based) after `delay`
    fn reconnect(&mut self, op: OperationId, attempt: u32, delay: Duration);

    fn publish(&mut self, op: OperationId, publisher: PublisherId, settings: &PublisherSettings);

    /// Stop publishing; `stream` is `None` if the publish never completed
    fn unpublish(&mut self, publisher: PublisherId, stream: Option<&StreamId>);

    fn update_publisher(&mut self, publisher: PublisherId, property: &PublisherProperty);

    fn subscribe(
        &mut self,
        op: OperationId,
        subscriber: SubscriberId,
        stream: &StreamId,
        settings: &SubscriberSettings,
    );

    fn unsubscribe(&mut self, subscriber: SubscriberId);

    fn update_subscriber(&mut self, subscriber: SubscriberId, property: &SubscriberProperty);

    fn send_signal(&mut self, signal: &Signal);

    /// Bind (or unbind) the capturer feeding a publisher
    fn attach_capture(&mut self, _publisher: PublisherId, _capture: Option<Arc<dyn VideoCapture>>) {}

    /// Bind (or unbind) the renderer fed by a subscriber
    fn attach_render(&mut self, _subscriber: SubscriberId, _render: Option<Arc<dyn VideoRender>>) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, op: OperationId, token: &str, settings: &SessionSettings) {
        (**self).connect(op, token, settings)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn reconnect(&mut self, op: OperationId, attempt: u32, delay: Duration) {
        (**self).reconnect(op, attempt, delay)
    }

    fn publish(&mut self, op: OperationId, publisher: PublisherId, settings: &PublisherSettings) {
        (**self).publish(op, publisher, settings)
    }

    fn unpublish(&mut self, publisher: PublisherId, stream: Option<&StreamId>) {
        (**self).unpublish(publisher, stream)
    }

    fn update_publisher(&mut self, publisher: PublisherId, property: &PublisherProperty) {
        (**self).update_publisher(publisher, property)
    }

    fn subscribe(
        &mut self,
        op: OperationId,
        subscriber: SubscriberId,
        stream: &StreamId,
        settings: &SubscriberSettings,
    ) {
        (**self).subscribe(op, subscriber, stream, settings)
    }

    fn unsubscribe(&mut self, subscriber: SubscriberId) {
        (**self).unsubscribe(subscriber)
    }

    fn update_subscriber(&mut self, subscriber: SubscriberId, property: &SubscriberProperty) {
        (**self).update_subscriber(subscriber, property)
    }

    fn send_signal(&mut self, signal: &Signal) {
        (**self).send_signal(signal)
    }

    fn attach_capture(&mut self, publisher: PublisherId, capture: Option<Arc<dyn VideoCapture>>) {
        (**self).attach_capture(publisher, capture)
    }

    fn attach_render(&mut self, subscriber: SubscriberId, render: Option<Arc<dyn VideoRender>>) {
        (**self).attach_render(subscriber, render)
    }
}
