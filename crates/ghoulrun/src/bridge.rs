//! # Execution-Context Bridge
//!
//! Lazily constructs a single isolated execution context and forwards
//! commands to it over a correlated channel.
//!
//! ## Philosophy
//!
//! - **Exactly One Construction**: however many callers race for the first
//!   acquisition, one of them builds the context and the rest wait for it.
//! - **Edge-Triggered Wakeup**: waiters subscribe to the loading flag before
//!   looking at the handle state, so a construction finishing in between can
//!   never be missed.
//! - **Faults Reset, Never Poison**: a failed construction or a faulted
//!   channel returns the handle to `Uninitialized`, and the next call starts
//!   over with a fresh context.
//!
//! ## Handle lifecycle
//!
//! ```text
//! Uninitialized --acquire--> Initializing --ok--> Ready(peer)
//!       ^                         |                   |
//!       +--------construction-----+                   |
//!       |          failed                             |
//!       +-----------------channel fault---------------+
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use ghoulcore::Config;
use ghoulcore::Error;
use ghoulcore::Invoker;
use ghoulcore::Payload;
use ghoulcore::Result;
use sref::Reactive;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::channel::Channel;
use crate::channel::ChannelError;
use crate::message::Request;
use crate::peer::Peer;

/// Builds a new execution context and returns the caller's end of its channel.
#[async_trait::async_trait]
pub trait ContextFactory: Send + Sync + 'static {
    async fn create(&self) -> std::result::Result<Arc<dyn Channel>, ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initializing,
    Ready,
}

enum Handle {
    Uninitialized,
    Initializing,
    Ready(Arc<Peer>),
}

struct Slot {
    handle: Handle,
    generation: u64,
}

struct Inner {
    factory: Arc<dyn ContextFactory>,
    slot: Mutex<Slot>,
    loading: Reactive<bool>,
    next_id: AtomicU64,
    constructed: AtomicU64,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the handle if it still points at `generation`.
    fn invalidate(&self, generation: u64, error: &Error) {
        let mut slot = self.slot();
        let current = match &slot.handle {
            Handle::Ready(peer) => peer.generation() == generation,
            _ => false,
        };
        if current {
            warn!(generation, %error, "execution context lost, will rebuild on next call");
            slot.handle = Handle::Uninitialized;
        }
    }
}

/// Resets an abandoned construction so the next caller can retry.
struct InitGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut slot = self.inner.slot();
            if matches!(slot.handle, Handle::Initializing) {
                slot.handle = Handle::Uninitialized;
            }
        }
        self.inner.loading.set(false);
    }
}

/// Forwards commands into a lazily constructed execution context.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    pub fn new(factory: Arc<dyn ContextFactory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                slot: Mutex::new(Slot {
                    handle: Handle::Uninitialized,
                    generation: 0,
                }),
                loading: Reactive::new(false),
                next_id: AtomicU64::new(1),
                constructed: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ContextState {
        match self.inner.slot().handle {
            Handle::Uninitialized => ContextState::Uninitialized,
            Handle::Initializing => ContextState::Initializing,
            Handle::Ready(_) => ContextState::Ready,
        }
    }

    /// Whether a construction is in flight.
    pub fn is_loading(&self) -> bool {
        self.inner.loading.get()
    }

    /// How many contexts the factory has successfully built.
    pub fn contexts_constructed(&self) -> u64 {
        self.inner.constructed.load(Ordering::SeqCst)
    }

    /// Installs `channel` as the live context, replacing whatever was there.
    ///
    /// Requests already in flight on the old context still complete there.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn set_channel(&self, channel: Arc<dyn Channel>) {
        {
            let mut slot = self.inner.slot();
            slot.generation += 1;
            let peer = self.peer_for(channel, slot.generation);
            info!(generation = slot.generation, "execution context overridden");
            slot.handle = Handle::Ready(Arc::new(peer));
        }
        self.inner.loading.set(false);
    }

    /// Returns the live context, building it first if there is none.
    pub async fn acquire(&self) -> Result<Arc<Peer>> {
        loop {
            let ready = self.inner.loading.wait_until(false);
            {
                let mut slot = self.inner.slot();
                match &slot.handle {
                    Handle::Ready(peer) => return Ok(peer.clone()),
                    Handle::Initializing => {}
                    Handle::Uninitialized => {
                        slot.handle = Handle::Initializing;
                        break;
                    }
                }
            }
            trace!("waiting for execution context");
            ready.await;
        }

        self.construct().await
    }

    async fn construct(&self) -> Result<Arc<Peer>> {
        let mut guard = InitGuard {
            inner: &self.inner,
            armed: true,
        };
        self.inner.loading.set(true);
        debug!("constructing execution context");

        let created = self.inner.factory.create().await;

        let outcome = {
            let mut slot = self.inner.slot();
            match created {
                // An override landed while we were building; keep it.
                Ok(_) if !matches!(slot.handle, Handle::Initializing) => match &slot.handle {
                    Handle::Ready(peer) => Ok(peer.clone()),
                    _ => Err(Error::channel_fault("execution context was reset during construction")),
                },
                Ok(channel) => {
                    slot.generation += 1;
                    self.inner.constructed.fetch_add(1, Ordering::SeqCst);
                    let peer = Arc::new(self.peer_for(channel, slot.generation));
                    info!(generation = slot.generation, "execution context ready");
                    slot.handle = Handle::Ready(peer.clone());
                    Ok(peer)
                }
                Err(e) => {
                    warn!(error = %e, "execution context construction failed");
                    if matches!(slot.handle, Handle::Initializing) {
                        slot.handle = Handle::Uninitialized;
                    }
                    Err(Error::from(e))
                }
            }
        };

        guard.armed = false;
        self.inner.loading.set(false);
        outcome
    }

    fn peer_for(&self, channel: Arc<dyn Channel>, generation: u64) -> Peer {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Peer::new(generation, channel, move |error| {
            if let Some(inner) = weak.upgrade() {
                inner.invalidate(generation, error);
            }
        })
    }

    /// Sends one command to the context and waits for its outcome.
    pub async fn call(&self, name: &str, args: Vec<Payload>, config: Arc<Config>) -> Result<Payload> {
        let peer = self.acquire().await?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let timeout = config.request_timeout();

        trace!(id, command = name, generation = peer.generation(), "forwarding");
        peer.call(
            Request {
                id,
                name: name.to_string(),
                args,
                config,
            },
            timeout,
        )
        .await
    }
}

#[async_trait::async_trait]
impl Invoker for Bridge {
    async fn invoke(&self, name: &str, args: Vec<Payload>, config: Arc<Config>) -> Result<Payload> {
        self.call(name, args, config).await
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("constructed", &self.contexts_constructed())
            .finish()
    }
}
