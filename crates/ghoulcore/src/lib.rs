//! # ghoulcore
//!
//! The commands that can be dispatched, and everything they need to run in
//! whichever execution context receives them.
//!
//! - [`registry`]: the closed command table and the local invoker.
//! - [`commands`]: argument-vector construction for each document command.
//! - [`engine`]: the document engine boundary.
//! - [`payload`]: argument and result values, with document bytes kept raw.
//! - [`config`]: the configuration snapshot carried by every request.
//! - [`error`]: failures surfaced to callers.

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod options;
pub mod payload;
pub mod registry;

pub use config::Config;
pub use config::ConfigPatch;
pub use config::Settings;
pub use engine::Engine;
pub use engine::Exit;
pub use engine::ProcessEngine;
pub use engine::VirtualFs;
pub use error::Error;
pub use error::Failure;
pub use error::Result;
pub use payload::Payload;
pub use registry::CommandName;
pub use registry::Invoker;
pub use registry::LocalInvoker;
pub use registry::Registry;

#[cfg(test)]
mod tests;
