//! Lifecycle events for downstream consumers.
//!
//! Events are fire-and-forget: a sink that fails to deliver must never
//! affect the outcome of the operation that raised it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::AttemptId;

/// An event emitted after a successful transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AttemptEvent {
    Submitted { attempt_id: AttemptId },
    Evaluated { attempt_id: AttemptId, total_score: f64 },
}

/// Receiver of lifecycle events.
pub trait AttemptEvents: Send + Sync {
    fn attempt_submitted(&self, attempt_id: AttemptId);
    fn attempt_evaluated(&self, attempt_id: AttemptId, total_score: f64);
}

/// Discards every event.
pub struct NoopEvents;

impl AttemptEvents for NoopEvents {
    fn attempt_submitted(&self, _: AttemptId) {}
    fn attempt_evaluated(&self, _: AttemptId, _: f64) {}
}

/// Writes events to the tracing log.
pub struct LogEvents;

impl AttemptEvents for LogEvents {
    fn attempt_submitted(&self, attempt_id: AttemptId) {
        tracing::info!(%attempt_id, "attempt submitted");
    }

    fn attempt_evaluated(&self, attempt_id: AttemptId, total_score: f64) {
        tracing::info!(%attempt_id, total_score, "attempt evaluated");
    }
}

/// Forwards events to an in-process channel.
pub struct ChannelEvents {
    tx: mpsc::UnboundedSender<AttemptEvent>,
}

impl ChannelEvents {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AttemptEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: AttemptEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

impl AttemptEvents for ChannelEvents {
    fn attempt_submitted(&self, attempt_id: AttemptId) {
        self.send(AttemptEvent::Submitted { attempt_id });
    }

    fn attempt_evaluated(&self, attempt_id: AttemptId, total_score: f64) {
        self.send(AttemptEvent::Evaluated {
            attempt_id,
            total_score,
        });
    }
}
