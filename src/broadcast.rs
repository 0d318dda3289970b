//! Fan-out of completed snapshots to live subscribers
//!
//! Each snapshot is serialized once and the same payload is queued for every
//! subscriber. Every subscriber has its own bounded queue, so a subscriber that
//! disconnects or falls behind is removed without affecting the others.
//!
//! Publishing and subscribing happen under the same lock. A new subscriber is handed
//! the last published payload first, which means it never receives a snapshot older
//! than one it has already seen.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, instrument, trace, warn};

use crate::{CombinedSnapshot, MetricsMessage};

/// Payloads a subscriber may have queued before it is considered gone
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

/// A serialized [`MetricsMessage`]
pub type Payload = Arc<str>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Subscribers removed during this publish
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct BroadcastHub {
    inner: Arc<Mutex<HubState>>,
    buffer: usize,
}

#[derive(Debug, Default)]
struct HubState {
    subscribers: HashMap<u64, mpsc::Sender<Payload>>,
    last_payload: Option<Payload>,
    next_id: u64,
    closed: bool,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubState::default())),
            buffer: buffer.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber. The last published snapshot, if any, is already
    /// queued on the returned subscription.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut state = self.state();

        if let Some(payload) = &state.last_payload {
            let _ = tx.try_send(payload.clone());
        }

        let id = state.next_id;
        state.next_id += 1;

        // after close_all the sender is dropped right away and the subscription ends
        if !state.closed {
            state.subscribers.insert(id, tx);
        }
        debug!("subscriber {id} registered ({} total)", state.subscribers.len());

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    #[instrument(skip_all, fields(timestamp = snapshot.timestamp))]
    pub fn publish(&self, snapshot: &CombinedSnapshot) -> BroadcastReport {
        let message = MetricsMessage::Metrics(snapshot.clone());
        let payload: Payload = match serde_json::to_string(&message) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("failed to serialize snapshot: {e}");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        let mut state = self.state();
        state.last_payload = Some(payload.clone());

        state
            .subscribers
            .retain(|id, tx| match tx.try_send(payload.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!("subscriber {id} is not keeping up, dropping it");
                    report.dropped += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("subscriber {id} went away");
                    report.dropped += 1;
                    false
                }
            });

        trace!("broadcast report: {report:?}");
        report
    }

    /// Number of connected subscribers
    pub fn len(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every subscriber and refuse new ones.
    pub fn close_all(&self) {
        let mut state = self.state();
        state.closed = true;
        let count = state.subscribers.len();
        state.subscribers.clear();
        debug!("closed {count} subscribers");
    }
}

/// Receiving end of one subscriber. Dropping it unregisters the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Payload>,
    hub: Weak<Mutex<HubState>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `None` once the hub dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut state = hub.lock().unwrap_or_else(PoisonError::into_inner);
            state.subscribers.remove(&self.id);
        }
    }
}
