//! Delivery plumbing between a transport task and the run consumer
//!
//! A transport pushes `Delivery` items through an `EventSink`; the consumer
//! holds the matching `CancelHandle`. Once the handle fires (or is dropped)
//! the sink refuses every further delivery, so a cancelled subscription
//! cannot reach the consumer even with events already scheduled.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::error::TransportError;
use crate::domain::SubscriptionId;
use crate::events::StreamEvent;

/// One item received from a subscription, tagged with its identity
#[derive(Debug)]
pub struct Delivery {
    pub subscription: SubscriptionId,
    pub item: Result<StreamEvent, TransportError>,
}

/// Consumer side of a subscription's cancellation signal
///
/// Cloneable; cancelling is idempotent and safe after the stream finished.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request that the subscription stop delivering
    pub fn cancel(&self) {
        debug!("CancelHandle::cancel: called");
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Future-friendly view of the cancellation signal for transport tasks
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Resolves once the subscription is cancelled or its consumer is gone
    pub async fn cancelled(&mut self) {
        // Err means every CancelHandle was dropped: nobody is listening
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Transport side of one subscription
pub struct EventSink {
    subscription: SubscriptionId,
    tx: mpsc::Sender<Delivery>,
    cancel: watch::Receiver<bool>,
}

impl EventSink {
    /// Create a sink delivering into `tx`, plus the handle that cancels it
    pub fn new(subscription: SubscriptionId, tx: mpsc::Sender<Delivery>) -> (Self, CancelHandle) {
        debug!(%subscription, "EventSink::new: called");
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let sink = Self {
            subscription,
            tx,
            cancel: cancel_rx,
        };
        let handle = CancelHandle {
            tx: Arc::new(cancel_tx),
        };
        (sink, handle)
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// True once cancelled or once every CancelHandle has been dropped
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }

    pub fn cancellation(&self) -> Cancellation {
        Cancellation {
            rx: self.cancel.clone(),
        }
    }

    /// Deliver an event; false means the subscription is over and the
    /// transport should stop producing
    pub async fn emit(&self, event: StreamEvent) -> bool {
        debug!(subscription = %self.subscription, event_type = event.event_type(), "EventSink::emit: called");
        self.deliver(Ok(event)).await
    }

    /// Deliver a channel-level failure
    pub async fn fail(&self, error: TransportError) -> bool {
        debug!(subscription = %self.subscription, %error, "EventSink::fail: called");
        self.deliver(Err(error)).await
    }

    async fn deliver(&self, item: Result<StreamEvent, TransportError>) -> bool {
        if self.is_cancelled() {
            debug!(subscription = %self.subscription, "EventSink::deliver: cancelled, dropping");
            return false;
        }

        // A full inbox must not hold a delivery past cancellation
        let mut cancellation = self.cancellation();
        let permit = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                debug!(subscription = %self.subscription, "EventSink::deliver: cancelled while waiting for capacity");
                return false;
            }
            permit = self.tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };
        if self.is_cancelled() {
            debug!(subscription = %self.subscription, "EventSink::deliver: cancelled, dropping");
            return false;
        }
        permit.send(Delivery {
            subscription: self.subscription,
            item,
        });
        true
    }
}
