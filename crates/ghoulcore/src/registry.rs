//! # Command Registry
//!
//! The closed table of commands that may be dispatched by name.
//!
//! ## Philosophy
//!
//! - **Closed Set**: `CommandName` is the only source of valid names. Nothing
//!   is registered at runtime.
//! - **Validate at the Boundary**: names and argument tuples arrive untyped
//!   (they may have crossed a message channel), so every `invoke` parses the
//!   name and decodes the arguments before anything runs.
//! - **Pass-Through Results**: a command's result or failure is returned as is.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::commands::Commands;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::Error;
use crate::error::Failure;
use crate::error::Result;
use crate::options::CompressOptions;
use crate::options::InfoOptions;
use crate::options::PageList;
use crate::options::RenderOptions;
use crate::payload::Payload;
use crate::payload::ShapeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    OptimizePdf,
    CombinePdf,
    SplitPdf,
    AddPassword,
    RemovePassword,
    RenderPageAsImage,
    GetInfo,
    IsRequirePassword,
}

impl CommandName {
    pub const ALL: [CommandName; 8] = [
        Self::OptimizePdf,
        Self::CombinePdf,
        Self::SplitPdf,
        Self::AddPassword,
        Self::RemovePassword,
        Self::RenderPageAsImage,
        Self::GetInfo,
        Self::IsRequirePassword,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OptimizePdf => "optimizePDF",
            Self::CombinePdf => "combinePDF",
            Self::SplitPdf => "splitPdf",
            Self::AddPassword => "addPassword",
            Self::RemovePassword => "removePassword",
            Self::RenderPageAsImage => "renderPageAsImage",
            Self::GetInfo => "getInfo",
            Self::IsRequirePassword => "isRequirePassword",
        }
    }
}

impl FromStr for CommandName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "optimizeDoc" => Ok(Self::OptimizePdf),
            _ => Self::ALL
                .into_iter()
                .find(|command| command.as_str() == name)
                .ok_or_else(|| Error::InvalidCommand {
                    name: name.to_string(),
                }),
        }
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positional argument decoder for one invocation.
struct Args {
    command: CommandName,
    values: std::vec::IntoIter<Payload>,
    position: usize,
}

impl Args {
    fn new(command: CommandName, values: Vec<Payload>) -> Self {
        Self {
            command,
            values: values.into_iter(),
            position: 0,
        }
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidArguments {
            name: self.command.to_string(),
            reason,
        }
    }

    fn shape(&self, e: ShapeError) -> Error {
        self.invalid(format!("argument {}: {}", self.position, e))
    }

    fn next(&mut self) -> Result<Payload> {
        let value = self.values.next();
        self.position += 1;
        value.ok_or_else(|| self.invalid(format!("missing argument {}", self.position)))
    }

    /// A document buffer.
    fn bytes(&mut self) -> Result<Vec<u8>> {
        let value = self.next()?;
        value.into_bytes().map_err(|e| self.shape(e))
    }

    /// An ordered list of document buffers.
    fn bytes_list(&mut self) -> Result<Vec<Vec<u8>>> {
        let value = self.next()?;
        value.into_bytes_list().map_err(|e| self.shape(e))
    }

    fn required<T: DeserializeOwned>(&mut self) -> Result<T> {
        let value = self.next()?;
        value.decode().map_err(|e| self.shape(e))
    }

    /// An omitted or `null` trailing argument becomes `default`.
    fn optional_or<T: DeserializeOwned>(&mut self, default: T) -> Result<T> {
        match self.next() {
            Err(_) => Ok(default),
            Ok(value) if value.is_null() => Ok(default),
            Ok(value) => value.decode().map_err(|e| self.shape(e)),
        }
    }

    fn optional<T: DeserializeOwned + Default>(&mut self) -> Result<T> {
        self.optional_or(T::default())
    }

    fn finish(mut self) -> Result<()> {
        let expected = self.position;
        let extra = self.values.by_ref().count();
        if extra > 0 {
            return Err(self.invalid(format!(
                "expected at most {} arguments, got {}",
                expected,
                expected + extra
            )));
        }
        Ok(())
    }
}

fn encode<T: Serialize>(result: T) -> Result<Payload> {
    Payload::json(&result).map_err(|e| Failure::new(format!("unencodable result: {}", e)).into())
}

/// Maps command names to their implementations.
#[derive(Debug, Clone)]
pub struct Registry {
    commands: Commands,
}

impl Registry {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            commands: Commands::new(engine),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        name.parse::<CommandName>().is_ok()
    }

    /// Typed access to the commands, bypassing name lookup.
    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    /// Runs the named command with a positional argument tuple.
    pub async fn invoke(&self, name: &str, args: Vec<Payload>, config: &Config) -> Result<Payload> {
        let command: CommandName = name.parse()?;
        trace!(%command, args = args.len(), "invoking command");

        let mut args = Args::new(command, args);
        let commands = &self.commands;

        match command {
            CommandName::OptimizePdf => {
                let input = args.bytes()?;
                let options: CompressOptions = args.optional()?;
                args.finish()?;
                Ok(commands.optimize_pdf(config, &input, &options).await?.into())
            }
            CommandName::CombinePdf => {
                let inputs = args.bytes_list()?;
                let options: CompressOptions = args.optional()?;
                args.finish()?;
                Ok(commands.combine_pdf(config, &inputs, &options).await?.into())
            }
            CommandName::SplitPdf => {
                let input = args.bytes()?;
                let page_lists: Vec<PageList> = args.required()?;
                let options: CompressOptions = args.optional()?;
                args.finish()?;
                Ok(commands.split_pdf(config, &input, &page_lists, &options).await?.into())
            }
            CommandName::AddPassword => {
                let input = args.bytes()?;
                let user_password: String = args.required()?;
                let owner_password: Option<String> = args.optional()?;
                args.finish()?;
                Ok(commands
                    .add_password(config, &input, &user_password, owner_password.as_deref())
                    .await?
                    .into())
            }
            CommandName::RemovePassword => {
                let input = args.bytes()?;
                let password: String = args.required()?;
                args.finish()?;
                Ok(commands.remove_password(config, &input, &password).await?.into())
            }
            CommandName::RenderPageAsImage => {
                let input = args.bytes()?;
                let page_number: u32 = args.optional_or(1)?;
                let options: RenderOptions = args.optional()?;
                args.finish()?;
                Ok(commands
                    .render_page_as_image(config, &input, page_number, &options)
                    .await?
                    .into())
            }
            CommandName::GetInfo => {
                let input = args.bytes()?;
                let options: InfoOptions = args.optional()?;
                args.finish()?;
                encode(commands.get_info(config, &input, &options).await?)
            }
            CommandName::IsRequirePassword => {
                let input = args.bytes()?;
                args.finish()?;
                encode(commands.is_require_password(config, &input).await?)
            }
        }
    }
}

/// A strategy for running a named command.
///
/// The local invoker and the worker bridge share this contract, so the
/// router can swap them per call.
#[async_trait::async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, name: &str, args: Vec<Payload>, config: Arc<Config>) -> Result<Payload>;
}

/// Runs commands directly in the caller's context.
#[derive(Debug, Clone)]
pub struct LocalInvoker {
    registry: Arc<Registry>,
}

impl LocalInvoker {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[async_trait::async_trait]
impl Invoker for LocalInvoker {
    async fn invoke(&self, name: &str, args: Vec<Payload>, config: Arc<Config>) -> Result<Payload> {
        self.registry.invoke(name, args, &config).await
    }
}
