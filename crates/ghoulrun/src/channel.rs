//! # Channel Abstraction
//!
//! The caller's end of the message link into an execution context.
//!
//! ## Philosophy
//!
//! - **Message-Oriented**: a channel moves whole `Request`s in and whole
//!   `Response`s out. It knows nothing about which command is running.
//! - **No Correlation**: responses come back in whatever order the context
//!   produces them. Matching them to callers is the peer's job.
//! - **Faults Are Out-of-Band**: `recv` returns `Err` for a context-level
//!   failure and `Ok(None)` when the context is gone.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::message::Event;
use crate::message::Request;
use crate::message::Response;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The other end is gone.
    Closed(String),
    /// The context reported a failure not tied to any request.
    Fault(String),
    /// The context could not be constructed.
    Construction(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed(msg) => write!(f, "Channel closed: {}", msg),
            Self::Fault(msg) => write!(f, "Context fault: {}", msg),
            Self::Construction(msg) => write!(f, "Context construction failed: {}", msg),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<ChannelError> for ghoulcore::Error {
    fn from(e: ChannelError) -> Self {
        ghoulcore::Error::channel_fault(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// The caller's end of a link to one execution context.
///
/// This trait is designed to be object-safe (`Arc<dyn Channel>`).
#[async_trait::async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Posts a request into the context. Does not wait for the response.
    async fn send(&self, request: Request) -> Result<()>;

    /// Waits for the next response.
    ///
    /// # Invariants
    /// - Returns `Ok(None)` once the context has shut down.
    /// - Returns `Err` for a context-level fault.
    /// - Only one task calls `recv` at a time.
    async fn recv(&self) -> Result<Option<Response>>;
}

/// In-process channel backed by tokio mpsc queues.
pub struct DuplexChannel {
    tx: mpsc::UnboundedSender<Request>,
    rx: Mutex<mpsc::UnboundedReceiver<Event>>,
}

/// The context's end of a [`DuplexChannel`].
#[derive(Clone)]
pub struct ContextPort {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Request>>>,
    tx: mpsc::UnboundedSender<Event>,
}

/// Creates a connected caller/context pair.
pub fn pair() -> (DuplexChannel, ContextPort) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let channel = DuplexChannel {
        tx: request_tx,
        rx: Mutex::new(event_rx),
    };

    let port = ContextPort {
        rx: Arc::new(Mutex::new(request_rx)),
        tx: event_tx,
    };

    (channel, port)
}

#[async_trait::async_trait]
impl Channel for DuplexChannel {
    async fn send(&self, request: Request) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| ChannelError::Closed("context is no longer receiving".into()))
    }

    async fn recv(&self) -> Result<Option<Response>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(Event::Response(response)) => Ok(Some(response)),
            Some(Event::Fault(msg)) => Err(ChannelError::Fault(msg)),
            None => Ok(None),
        }
    }
}

impl ContextPort {
    /// Next request, or `None` once the caller has dropped its end.
    pub async fn recv(&self) -> Option<Request> {
        self.rx.lock().await.recv().await
    }

    pub fn reply(&self, response: Response) -> Result<()> {
        self.emit(Event::Response(response))
    }

    /// Reports a context-level failure to the caller.
    pub fn fault(&self, reason: impl Into<String>) -> Result<()> {
        self.emit(Event::Fault(reason.into()))
    }

    /// Sends a raw event, for tests that need to script the context.
    pub fn emit(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| ChannelError::Closed("caller is no longer listening".into()))
    }
}
