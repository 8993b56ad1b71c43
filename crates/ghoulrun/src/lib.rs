//! # ghoulrun
//!
//! Runs ghoulcore commands either in the caller's context or in an isolated
//! worker context, behind one call interface.
//!
//! - [`dispatch`]: the router callers talk to.
//! - [`bridge`]: lazy, single construction of the worker context.
//! - [`peer`]: request/response correlation over a channel.
//! - [`endpoint`]: the serving loop inside a context.
//! - [`worker`]: contexts on dedicated threads.

pub mod bridge;
pub mod channel;
pub mod dispatch;
pub mod endpoint;
pub mod message;
pub mod peer;
pub mod telemetry;
pub mod worker;

pub use bridge::Bridge;
pub use bridge::ContextFactory;
pub use bridge::ContextState;
pub use channel::Channel;
pub use channel::ChannelError;
pub use dispatch::Dispatcher;
pub use endpoint::RemoteEndpoint;
pub use message::Request;
pub use message::Response;
pub use worker::WorkerFactory;
