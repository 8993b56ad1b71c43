//! # Remote Endpoint
//!
//! The command-serving side of an execution context. It reads requests off a
//! [`ContextPort`], runs each one against its own registry and settings, and
//! posts the response back with the request's id.
//!
//! Requests run concurrently, so responses leave in completion order. The
//! caller's peer restores the pairing.

use std::sync::Arc;

use ghoulcore::Registry;
use ghoulcore::Settings;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::channel::ContextPort;
use crate::message::Request;
use crate::message::Response;

pub struct RemoteEndpoint {
    registry: Arc<Registry>,
    settings: Settings,
}

impl RemoteEndpoint {
    /// The endpoint starts with default settings; every request replaces them
    /// with the snapshot it carries.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            settings: Settings::default(),
        }
    }

    /// The settings live inside this context.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies the request's configuration, then runs the command under it.
    pub async fn handle(&self, request: Request) -> Response {
        let Request {
            id,
            name,
            args,
            config,
        } = request;

        self.settings.apply(config.clone());
        trace!(id, command = %name, "invoking");

        let result = self.registry.invoke(&name, args, &config).await;
        if let Err(e) = &result {
            debug!(id, command = %name, error = %e, "command failed");
        }

        Response {
            id,
            outcome: result.into(),
        }
    }

    /// Serves requests until the caller drops its end of the channel.
    ///
    /// A command task that panics is reported as a context fault.
    pub async fn serve(self, port: ContextPort) {
        let endpoint = Arc::new(self);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                request = port.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    let endpoint = endpoint.clone();
                    let port = port.clone();
                    tasks.spawn(async move {
                        let response = endpoint.handle(request).await;
                        if port.reply(response).is_err() {
                            trace!("caller went away before the response was sent");
                        }
                    });
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "command task panicked");
                            let _ = port.fault(format!("command task panicked: {}", e));
                        }
                    }
                }
            }
        }

        debug!(in_flight = tasks.len(), "endpoint shutting down");
    }
}

impl std::fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("settings", &self.settings)
            .finish()
    }
}
