//! RunController - bridges a transport's deliveries into one RunState
//!
//! The controller owns the subscription lifecycle. Every subscription pushes
//! into a single inbox, tagged with its `SubscriptionId`; only deliveries
//! from the current subscription reach the reducer, so a run that was
//! replaced or cancelled can never mutate the current one.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::state::{Applied, RunState};
use crate::domain::{RunRequest, RunStatus, SubscriptionId, UploadedFile};
use crate::events::StreamEvent;
use crate::transport::{CancelHandle, Delivery, EventSink, RunTransport, TransportError};

/// Default inbox capacity (deliveries)
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Errors surfaced before a run exists
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Run submission failed: {0}")]
    Submission(#[source] TransportError),

    #[error("Upload failed: {0}")]
    Upload(#[source] TransportError),
}

/// Observable result of one `next_update` step
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// An event arrived and was handed to the reducer
    Event { event: StreamEvent, applied: Applied },
    /// The event channel broke; the controller stopped listening
    ConnectionFailed(String),
}

struct ActiveSubscription {
    id: SubscriptionId,
    cancel: CancelHandle,
}

/// Owns the current run, its event log and its live subscription
pub struct RunController {
    transport: Arc<dyn RunTransport>,
    inbox_tx: mpsc::Sender<Delivery>,
    inbox_rx: mpsc::Receiver<Delivery>,
    last_subscription: SubscriptionId,
    active: Option<ActiveSubscription>,
    state: Option<RunState>,
}

impl RunController {
    pub fn new(transport: Arc<dyn RunTransport>) -> Self {
        Self::with_capacity(transport, DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_capacity(transport: Arc<dyn RunTransport>, capacity: usize) -> Self {
        debug!(transport = transport.name(), capacity, "RunController::with_capacity: called");
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity.max(1));
        Self {
            transport,
            inbox_tx,
            inbox_rx,
            last_subscription: SubscriptionId::new(0),
            active: None,
            state: None,
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// The most recently started run, if any
    pub fn state(&self) -> Option<&RunState> {
        self.state.as_ref()
    }

    /// True while a subscription is delivering into this controller
    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Submit a run and attach to its event stream
    ///
    /// Any previous subscription is cancelled first. On submission failure no
    /// run is created and the previous state is left untouched.
    pub async fn start(&mut self, request: RunRequest) -> Result<&RunState, RunError> {
        debug!(agent_id = %request.agent_id, "RunController::start: called");
        self.cancel();

        self.last_subscription = self.last_subscription.next();
        let id = self.last_subscription;
        let (sink, cancel) = EventSink::new(id, self.inbox_tx.clone());

        let ticket = match self.transport.submit(&request, sink).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(subscription = %id, error = %e, "RunController::start: submission failed");
                cancel.cancel();
                return Err(RunError::Submission(e));
            }
        };

        info!(run_id = %ticket.run_id, subscription = %id, transport = self.transport.name(), "RunController::start: run started");
        if ticket.status != RunStatus::Running {
            // Tracking begins at running whatever the backend reported
            debug!(run_id = %ticket.run_id, reported = %ticket.status, "RunController::start: backend reported non-running status");
        }
        self.active = Some(ActiveSubscription { id, cancel });
        Ok(&*self.state.insert(RunState::new(ticket.run_id, request)))
    }

    /// Wait for the next delivery from the current subscription and apply it
    ///
    /// Returns None when nothing is streaming: no run, a finished run, a
    /// cancelled run or a broken connection.
    pub async fn next_update(&mut self) -> Option<Update> {
        loop {
            let current = self.active.as_ref()?.id;
            let delivery = self.inbox_rx.recv().await?;

            if delivery.subscription != current {
                warn!(
                    stale = %delivery.subscription,
                    %current,
                    "RunController::next_update: discarding delivery from stale subscription"
                );
                continue;
            }

            let state = self.state.as_mut()?;
            match delivery.item {
                Ok(event) => {
                    let applied = state.apply(event.clone());
                    if state.is_finished() {
                        debug!(run_id = %state.run().run_id, "RunController::next_update: run finished, releasing subscription");
                        self.cancel();
                    }
                    return Some(Update::Event { event, applied });
                }
                Err(error) => {
                    let message = error.to_string();
                    state.record_connection_failure(message.clone());
                    self.cancel();
                    return Some(Update::ConnectionFailed(message));
                }
            }
        }
    }

    /// Drive the current subscription until it ends
    pub async fn run_until_finished(&mut self) -> Option<&RunState> {
        while self.next_update().await.is_some() {}
        self.state.as_ref()
    }

    /// Stop the current subscription without touching the run's status
    ///
    /// Idempotent. Deliveries already in flight are discarded.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(subscription = %active.id, "RunController::cancel: cancelling subscription");
            active.cancel.cancel();
        }
    }

    /// Cancel and record the run as cancelled
    ///
    /// Returns true if the run transitioned to `cancelled`.
    pub fn stop(&mut self) -> bool {
        debug!("RunController::stop: called");
        self.cancel();
        match self.state.as_mut() {
            Some(state) => state.mark_cancelled(),
            None => false,
        }
    }

    /// Upload an input file through the configured transport
    pub async fn upload(&self, path: &Path) -> Result<UploadedFile, RunError> {
        debug!(?path, "RunController::upload: called");
        self.transport.upload(path).await.map_err(RunError::Upload)
    }
}
