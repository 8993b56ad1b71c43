//! Worker-thread execution contexts.
//!
//! Each context is a dedicated OS thread running its own single-threaded
//! tokio runtime with a [`RemoteEndpoint`] on it. The only link back to the
//! caller is the channel returned by [`WorkerFactory::create`]. Dropping that
//! channel stops the endpoint and lets the thread exit.

use std::sync::Arc;
use std::thread;

use ghoulcore::Registry;
use tokio::sync::oneshot;
use tracing::debug;

use crate::bridge::ContextFactory;
use crate::channel;
use crate::channel::Channel;
use crate::channel::ChannelError;
use crate::endpoint::RemoteEndpoint;

pub const DEFAULT_THREAD_NAME: &str = "ghoul-worker";

pub struct WorkerFactory {
    registry: Arc<Registry>,
    thread_name: String,
}

impl WorkerFactory {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

#[async_trait::async_trait]
impl ContextFactory for WorkerFactory {
    async fn create(&self) -> Result<Arc<dyn Channel>, ChannelError> {
        let (channel, port) = channel::pair();
        let endpoint = RemoteEndpoint::new(self.registry.clone());
        let (started_tx, started_rx) = oneshot::channel();

        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = started_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = started_tx.send(Ok(()));

                runtime.block_on(endpoint.serve(port));
                debug!("worker thread exiting");
            })
            .map_err(|e| ChannelError::Construction(format!("spawning worker thread: {}", e)))?;

        match started_rx.await {
            Ok(Ok(())) => {
                debug!(thread = %self.thread_name, "worker context started");
                Ok(Arc::new(channel))
            }
            Ok(Err(reason)) => Err(ChannelError::Construction(format!("worker runtime: {}", reason))),
            Err(_) => Err(ChannelError::Construction("worker thread exited during startup".into())),
        }
    }
}

impl std::fmt::Debug for WorkerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerFactory")
            .field("thread_name", &self.thread_name)
            .finish()
    }
}
