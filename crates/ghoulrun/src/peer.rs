//! # Correlating Peer with Async Pump
//!
//! A `Peer` owns one channel into one execution context. A background pump
//! reads every response off the channel and hands it to whichever caller is
//! waiting on that `id`.
//!
//! ## Philosophy
//!
//! - **One Pending Entry Per Request**: an entry is inserted before the request
//!   is sent and removed exactly once: by its response, by a send failure, by
//!   a timeout, or by a channel fault.
//! - **Remove Then Resolve**: the pump takes the entry out of the table before
//!   waking its caller, so a response can never be delivered twice.
//! - **Fault Fans Out**: when the channel fails, every caller still waiting is
//!   rejected with the same `ChannelFault`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use ghoulcore::Error;
use ghoulcore::Payload;
use ghoulcore::Result;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::channel::Channel;
use crate::message::Request;
use crate::message::Response;

/// A caller waiting for its response.
struct Pending {
    name: String,
    tx: oneshot::Sender<Result<Payload>>,
}

/// Correlates requests sent over one channel with the responses coming back.
pub struct Peer {
    generation: u64,
    channel: Arc<dyn Channel>,
    pending: Arc<DashMap<u64, Pending>>,
    closed: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl Peer {
    /// Creates a peer and spawns its pump on the current tokio runtime.
    ///
    /// `on_fault` runs once, when the channel faults or closes, before the
    /// waiting callers are rejected.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new<F>(generation: u64, channel: Arc<dyn Channel>, on_fault: F) -> Self
    where
        F: FnOnce(&Error) + Send + 'static,
    {
        let pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let pump_channel = channel.clone();
        let pump_pending = pending.clone();
        let pump_closed = closed.clone();

        let pump = tokio::spawn(async move {
            let error = loop {
                match pump_channel.recv().await {
                    Ok(Some(response)) => Self::route(response, &pump_pending),
                    Ok(None) => break Error::channel_fault("execution context closed"),
                    Err(e) => {
                        warn!(generation, error = %e, "execution context faulted");
                        break Error::from(e);
                    }
                }
            };

            pump_closed.store(true, Ordering::SeqCst);
            on_fault(&error);
            Self::reject_all(&pump_pending, error);
        });

        Self {
            generation,
            channel,
            pending,
            closed,
            pump,
        }
    }

    /// Which execution context this peer talks to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn route(response: Response, pending: &DashMap<u64, Pending>) {
        let Some((id, waiting)) = pending.remove(&response.id) else {
            // Late response for a timed-out call, or an id we never issued.
            trace!(id = response.id, "dropping response with no pending request");
            return;
        };

        trace!(id, command = %waiting.name, "routing response");
        let _ = waiting.tx.send(response.outcome.into_result());
    }

    fn reject_all(pending: &DashMap<u64, Pending>, error: Error) {
        let ids: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        if !ids.is_empty() {
            debug!(count = ids.len(), "rejecting pending requests");
        }
        for id in ids {
            if let Some((_, waiting)) = pending.remove(&id) {
                let _ = waiting.tx.send(Err(error.clone()));
            }
        }
    }

    /// Sends `request` and waits for the response carrying the same id.
    pub async fn call(&self, request: Request, timeout: Option<Duration>) -> Result<Payload> {
        let id = request.id;
        let name = request.name.clone();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(id, Pending { name: name.clone(), tx });

        // The pump may have exited between our caller acquiring this peer and
        // the insert above. Nobody would ever resolve the entry.
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(Error::channel_fault("execution context closed"));
        }

        if let Err(e) = self.channel.send(request).await {
            self.pending.remove(&id);
            return Err(e.into());
        }

        let received = match timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.remove(&id);
                    return Err(Error::Timeout {
                        name,
                        after_ms: after.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };

        match received {
            Ok(result) => result,
            Err(_) => {
                self.pending.remove(&id);
                Err(Error::channel_fault("response channel dropped"))
            }
        }
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("generation", &self.generation)
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
