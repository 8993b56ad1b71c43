//! # Dispatch Router
//!
//! The single entry point for running a command. Each call reads the live
//! `use_worker` flag and routes either to the local invoker or through the
//! bridge into the worker context. Callers see the same results and the same
//! errors either way.

use std::sync::Arc;

use ghoulcore::CommandName;
use ghoulcore::Config;
use ghoulcore::ConfigPatch;
use ghoulcore::Engine;
use ghoulcore::Error;
use ghoulcore::Failure;
use ghoulcore::Invoker;
use ghoulcore::LocalInvoker;
use ghoulcore::Payload;
use ghoulcore::Registry;
use ghoulcore::Result;
use ghoulcore::Settings;
use ghoulcore::config::ConfigError;
use ghoulcore::options::CompressOptions;
use ghoulcore::options::Info;
use ghoulcore::options::InfoOptions;
use ghoulcore::options::PageList;
use ghoulcore::options::RenderOptions;
use ghoulcore::payload::ShapeError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::bridge::Bridge;
use crate::bridge::ContextFactory;
use crate::channel::Channel;
use crate::worker::WorkerFactory;

#[derive(Clone)]
pub struct Dispatcher {
    settings: Settings,
    local: LocalInvoker,
    bridge: Bridge,
}

impl Dispatcher {
    /// Routes between in-process execution and a worker thread sharing the
    /// same engine.
    pub fn new(engine: Arc<dyn Engine>, config: Config) -> Self {
        let registry = Arc::new(Registry::new(engine));
        let factory = Arc::new(WorkerFactory::new(registry.clone()));
        Self::with_parts(registry, config, factory)
    }

    /// Like [`Dispatcher::new`], with the worker context built by `factory`.
    pub fn with_factory(engine: Arc<dyn Engine>, config: Config, factory: Arc<dyn ContextFactory>) -> Self {
        Self::with_parts(Arc::new(Registry::new(engine)), config, factory)
    }

    /// Loads configuration from `ghoul.toml` and `GHOUL_*` variables.
    pub fn from_env(engine: Arc<dyn Engine>) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(engine, Config::load()?))
    }

    fn with_parts(registry: Arc<Registry>, config: Config, factory: Arc<dyn ContextFactory>) -> Self {
        Self {
            settings: Settings::new(config),
            local: LocalInvoker::new(registry),
            bridge: Bridge::new(factory),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Merges `patch` into the live configuration. Takes effect on the next call.
    pub fn configure(&self, patch: &ConfigPatch) {
        self.settings.configure(patch);
    }

    /// Replaces the worker context with an externally built channel.
    pub fn set_channel(&self, channel: Arc<dyn Channel>) {
        self.bridge.set_channel(channel);
    }

    /// Runs `name` with a positional argument tuple.
    pub async fn call(&self, name: &str, args: Vec<Payload>) -> Result<Payload> {
        let config = self.settings.snapshot();
        let invoker: &dyn Invoker = if config.use_worker {
            &self.bridge
        } else {
            &self.local
        };

        debug!(command = name, worker = config.use_worker, "dispatching");
        invoker.invoke(name, args, config).await
    }

    async fn call_bytes(&self, command: CommandName, args: Vec<Payload>) -> Result<Vec<u8>> {
        let result = self.call(command.as_str(), args).await?;
        result.into_bytes().map_err(|e| unexpected(command, e))
    }

    async fn call_typed<R: DeserializeOwned>(&self, command: CommandName, args: Vec<Payload>) -> Result<R> {
        let result = self.call(command.as_str(), args).await?;
        result.decode().map_err(|e| unexpected(command, e))
    }

    pub async fn optimize_pdf(&self, input: &[u8], options: &CompressOptions) -> Result<Vec<u8>> {
        let command = CommandName::OptimizePdf;
        self.call_bytes(command, vec![input.into(), arg(command, options)?])
            .await
    }

    pub async fn combine_pdf(&self, inputs: &[Vec<u8>], options: &CompressOptions) -> Result<Vec<u8>> {
        let command = CommandName::CombinePdf;
        self.call_bytes(command, vec![inputs.to_vec().into(), arg(command, options)?])
            .await
    }

    pub async fn split_pdf(
        &self,
        input: &[u8],
        page_lists: &[PageList],
        options: &CompressOptions,
    ) -> Result<Vec<Vec<u8>>> {
        let command = CommandName::SplitPdf;
        let args = vec![input.into(), arg(command, page_lists)?, arg(command, options)?];
        let result = self.call(command.as_str(), args).await?;
        result.into_bytes_list().map_err(|e| unexpected(command, e))
    }

    pub async fn add_password(
        &self,
        input: &[u8],
        user_password: &str,
        owner_password: Option<&str>,
    ) -> Result<Vec<u8>> {
        let command = CommandName::AddPassword;
        let args = vec![
            input.into(),
            arg(command, user_password)?,
            arg(command, &owner_password)?,
        ];
        self.call_bytes(command, args).await
    }

    pub async fn remove_password(&self, input: &[u8], password: &str) -> Result<Vec<u8>> {
        let command = CommandName::RemovePassword;
        self.call_bytes(command, vec![input.into(), arg(command, password)?])
            .await
    }

    pub async fn render_page_as_image(
        &self,
        input: &[u8],
        page_number: u32,
        options: &RenderOptions,
    ) -> Result<Vec<u8>> {
        let command = CommandName::RenderPageAsImage;
        let args = vec![input.into(), arg(command, &page_number)?, arg(command, options)?];
        self.call_bytes(command, args).await
    }

    pub async fn get_info(&self, input: &[u8], options: &InfoOptions) -> Result<Info> {
        let command = CommandName::GetInfo;
        self.call_typed(command, vec![input.into(), arg(command, options)?])
            .await
    }

    pub async fn is_require_password(&self, input: &[u8]) -> Result<bool> {
        let command = CommandName::IsRequirePassword;
        self.call_typed(command, vec![input.into()]).await
    }
}

fn arg<T: Serialize + ?Sized>(command: CommandName, value: &T) -> Result<Payload> {
    Payload::json(value).map_err(|e| Error::InvalidArguments {
        name: command.to_string(),
        reason: e.to_string(),
    })
}

fn unexpected(command: CommandName, e: ShapeError) -> Error {
    Failure::new(format!("unexpected result from {}: {}", command, e)).into()
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.settings.snapshot())
            .field("bridge", &self.bridge)
            .finish()
    }
}
