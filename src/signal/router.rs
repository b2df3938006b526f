//! Signal routing
//!
//! Decides what happens to an outgoing signal based on the session status:
//!
//! ```text
//!   validate ──► Connected ───────────────► transmit now
//!            └─► Reconnecting ─┬ retry ───► FIFO queue ──► flush on reconnect
//!                              └ no retry ► drop
//! ```
//!
//! The queue belongs to a single disconnection episode. It is drained in
//! insertion order when the session reconnects and discarded if it tears
//! down instead.

use std::collections::VecDeque;

use crate::error::{Error, ErrorCode, ErrorDomain, Result};
use crate::registry::ConnectionRegistry;
use crate::session::SessionStatus;

use super::message::Signal;

/// What happened to a signal handed to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted for transmission (not an acknowledgement from the peer)
    Sent,
    /// Held until the session reconnects
    Queued,
    /// Reconnecting and the signal asked not to be retried
    Dropped,
}

/// Routing decision returned to the session controller
#[derive(Debug)]
pub enum Routing {
    /// Hand this signal to the transport now
    Transmit(Signal),
    Queued,
    Dropped,
}

impl Routing {
    pub fn delivery(&self) -> Delivery {
        match self {
            Routing::Transmit(_) => Delivery::Sent,
            Routing::Queued => Delivery::Queued,
            Routing::Dropped => Delivery::Dropped,
        }
    }
}

/// Signal counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub sent: u64,
    pub queued: u64,
    pub flushed: u64,
    pub dropped: u64,
    pub discarded: u64,
}

/// Validates, transmits and queues outgoing signals
#[derive(Debug)]
pub struct SignalRouter {
    queue: VecDeque<Signal>,
    capacity: usize,
    /// Disconnection episode the queue belongs to
    episode: u64,
    stats: RouterStats,
}

impl SignalRouter {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
            episode: 0,
            stats: RouterStats::default(),
        }
    }

    /// Route a signal.
    ///
    /// Validation runs first and rejects without side effects. Outside
    /// `Connected`/`Reconnecting` the signal is refused with a state error.
    /// A target must be a live connection.
    pub fn route(
        &mut self,
        signal: Signal,
        status: SessionStatus,
        connections: &ConnectionRegistry,
    ) -> Result<Routing> {
        signal.validate()?;

        if !status.allows_media() {
            return Err(Error::state(
                ErrorDomain::Session,
                ErrorCode::NotConnected,
                format!("cannot send a signal while {}", status),
            ));
        }

        if let Some(target) = &signal.target {
            if !connections.contains(target) {
                return Err(Error::validation(
                    ErrorDomain::Session,
                    ErrorCode::InvalidSignalTarget,
                    format!("unknown signal target connection {}", target),
                ));
            }
        }

        if status == SessionStatus::Connected {
            self.stats.sent += 1;
            tracing::debug!(kind = %signal.kind, bytes = signal.payload.len(), "Signal sent");
            return Ok(Routing::Transmit(signal));
        }

        if !signal.retry_after_reconnect {
            self.stats.dropped += 1;
            tracing::debug!(kind = %signal.kind, episode = self.episode, "Signal dropped while reconnecting");
            return Ok(Routing::Dropped);
        }

        if self.queue.len() >= self.capacity {
            return Err(Error::capacity(
                ErrorDomain::Session,
                ErrorCode::SignalQueueFull,
                format!("{} signals already queued for reconnect", self.queue.len()),
            ));
        }

        self.queue.push_back(signal);
        self.stats.queued += 1;
        tracing::debug!(episode = self.episode, queued = self.queue.len(), "Signal queued for reconnect");
        Ok(Routing::Queued)
    }

    /// Start a new disconnection episode
    pub fn begin_episode(&mut self) {
        let stale = self.discard();
        if stale > 0 {
            tracing::warn!(discarded = stale, "Stale signals left from a previous episode");
        }
        self.episode += 1;
    }

    /// Take every queued signal in FIFO order, leaving the queue empty.
    ///
    /// Targeted signals whose connection left while the session was
    /// reconnecting are dropped instead of flushed.
    pub fn flush(&mut self, connections: &ConnectionRegistry) -> Vec<Signal> {
        let mut signals = Vec::with_capacity(self.queue.len());
        for signal in self.queue.drain(..) {
            match &signal.target {
                Some(target) if !connections.contains(target) => {
                    self.stats.dropped += 1;
                    tracing::warn!(kind = %signal.kind, target = %target, "Queued signal target left, dropped");
                }
                _ => signals.push(signal),
            }
        }
        self.stats.flushed += signals.len() as u64;
        self.stats.sent += signals.len() as u64;
        signals
    }

    /// Throw away every queued signal, returning how many were lost
    pub fn discard(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        self.stats.discarded += count as u64;
        count
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}
