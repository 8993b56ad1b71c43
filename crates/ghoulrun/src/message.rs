//! Messages exchanged with an execution context.
//!
//! One request, one response, matched by `id`. Payloads are owned data only,
//! so they can be moved to another thread or serialized onto a byte channel.

use std::sync::Arc;

use ghoulcore::Config;
use ghoulcore::Error;
use ghoulcore::Payload;
use serde::Deserialize;
use serde::Serialize;

/// Caller → context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub name: String,
    pub args: Vec<Payload>,
    /// Configuration the command must run with.
    pub config: Arc<Config>,
}

/// Context → caller. Serializes as `{ id, result }` or `{ id, error }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Payload),
    Error(Error),
}

impl Outcome {
    pub fn into_result(self) -> ghoulcore::Result<Payload> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Error(error) => Err(error),
        }
    }
}

impl From<ghoulcore::Result<Payload>> for Outcome {
    fn from(result: ghoulcore::Result<Payload>) -> Self {
        match result {
            Ok(value) => Self::Result(value),
            Err(error) => Self::Error(error),
        }
    }
}

impl Response {
    pub fn ok(id: u64, value: Payload) -> Self {
        Self {
            id,
            outcome: Outcome::Result(value),
        }
    }

    pub fn err(id: u64, error: Error) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }
}

/// Everything a context can emit: a response, or a fault that is not tied to
/// any one request (the context crashed, a task panicked).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Response(Response),
    Fault(String),
}
