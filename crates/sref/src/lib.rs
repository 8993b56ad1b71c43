//! # sref
//!
//! A reactive value cell: a single value, a list of change listeners, and an
//! async wait for "the next time this value is set to X".
//!
//! ## Philosophy
//!
//! - **Synchronous Notification**: `set` runs every listener registered at the
//!   time of the call, in registration order, before it returns.
//! - **Ordered Delivery**: a write and its notification happen in one turn.
//!   Sets from other threads wait for the current turn to finish, so listeners
//!   see values in the order they were written and the last one they see is
//!   what `get` returns. A `set` from inside a listener is delivered at once,
//!   nested inside the current turn.
//! - **Edge-Triggered Waits**: `wait_until(v)` completes on a *future* `set(v)`,
//!   never on the value the cell already holds. Callers that want level
//!   semantics register the wait first and then check `get()`.
//! - **No Lock Across Callbacks**: listeners run with no lock on the value or
//!   the listener list held, so they may read or set the cell, subscribe, or
//!   unsubscribe (including themselves).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::thread::ThreadId;

use tokio::sync::oneshot;


type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Re-entrant per-thread turn for write-then-notify.
#[derive(Default)]
struct Turn {
    holder: Mutex<Option<(ThreadId, usize)>>,
    released: Condvar,
}

impl Turn {
    fn enter(&self) -> TurnGuard<'_> {
        let me = std::thread::current().id();
        let mut holder = lock(&self.holder);
        loop {
            match holder.as_mut() {
                Some((owner, depth)) if *owner == me => {
                    *depth += 1;
                    break;
                }
                Some(_) => {
                    holder = self
                        .released
                        .wait(holder)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                None => {
                    *holder = Some((me, 1));
                    break;
                }
            }
        }
        TurnGuard { turn: self }
    }
}

struct TurnGuard<'a> {
    turn: &'a Turn,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut holder = lock(&self.turn.holder);
        if let Some((_, depth)) = holder.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                *holder = None;
                self.turn.released.notify_one();
            }
        }
    }
}

struct Inner<T> {
    value: Mutex<T>,
    turn: Turn,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T> Inner<T> {
    fn snapshot(&self) -> Vec<Listener<T>> {
        lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, id: u64, listener: Listener<T>) {
        lock(&self.listeners).push((id, listener));
    }

    fn remove(&self, id: u64) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

/// A shared, observable value.
///
/// Clones are handles to the same cell.
pub struct Reactive<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Reactive<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Default for Reactive<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Reactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("value", &*lock(&self.inner.value))
            .field("listeners", &lock(&self.inner.listeners).len())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Reactive<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(value),
                turn: Turn::default(),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        lock(&self.inner.value).clone()
    }

    /// Replaces the value and notifies every listener with it.
    pub fn set(&self, value: T) {
        self.store(|current| *current = value);
    }

    /// Mutates the value in place, then notifies listeners with the result.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.store(f);
    }

    fn store(&self, f: impl FnOnce(&mut T)) {
        let _turn = self.inner.turn.enter();
        let value = {
            let mut guard = lock(&self.inner.value);
            f(&mut guard);
            guard.clone()
        };

        // Snapshot so listeners can (un)subscribe while we iterate.
        for listener in self.inner.snapshot() {
            listener(&value);
        }
    }

    /// Registers a change listener.
    ///
    /// The listener stays registered until [`Subscription::unsubscribe`] is
    /// called; dropping the handle does not remove it.
    pub fn on_change<F>(&self, f: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id();
        self.inner.insert(id, Arc::new(f));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of listeners currently registered.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Reactive<T> {
    /// Resolves the first time `set` is called with a value equal to `expected`.
    ///
    /// The listener is registered when this method is called, not when the
    /// future is first polled. A cell that already holds `expected` does not
    /// resolve the wait; only a later `set` does. The listener removes itself
    /// when it fires, or when the returned future is dropped.
    pub fn wait_until(&self, expected: T) -> WaitUntil<T> {
        let id = self.inner.next_id();
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let weak = Arc::downgrade(&self.inner);

        self.inner.insert(
            id,
            Arc::new(move |value: &T| {
                if *value != expected {
                    return;
                }
                if let Some(tx) = lock(&tx).take() {
                    let _ = tx.send(());
                }
                if let Some(inner) = weak.upgrade() {
                    inner.remove(id);
                }
            }),
        );

        WaitUntil {
            rx,
            subscription: Subscription {
                inner: Arc::downgrade(&self.inner),
                id,
            },
        }
    }
}

/// Handle to a registered listener.
pub struct Subscription<T> {
    inner: Weak<Inner<T>>,
    id: u64,
}

impl<T> Subscription<T> {
    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.remove(self.id))
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Future returned by [`Reactive::wait_until`].
///
/// Never resolves if the cell is dropped before the matching `set`.
#[must_use = "futures do nothing unless awaited"]
pub struct WaitUntil<T> {
    rx: oneshot::Receiver<()>,
    subscription: Subscription<T>,
}

impl<T> Future for WaitUntil<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(()),
            Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for WaitUntil<T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
