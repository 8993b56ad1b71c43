//! Argument and result values carried between callers and commands.
//!
//! Document buffers travel as raw bytes from the caller to the engine and
//! back, in either execution context. Everything else (options, page numbers,
//! passwords, structured results) is a JSON value.

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    Bytes(Vec<u8>),
    BytesList(Vec<Vec<u8>>),
    Json(Value),
}

/// A payload did not have the shape a command or caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError(pub String);

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ShapeError {}

pub type Result<T> = std::result::Result<T, ShapeError>;

impl Payload {
    pub fn null() -> Self {
        Self::Json(Value::Null)
    }

    /// Encodes any serializable value as a JSON payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| ShapeError(e.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Json(Value::Null))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::BytesList(_) => "a list of buffers",
            Self::Json(_) => "a JSON value",
        }
    }

    /// A single document buffer. A JSON array of byte values is accepted too,
    /// for callers that only speak JSON.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Json(value) => serde_json::from_value(value).map_err(|e| ShapeError(e.to_string())),
            other => Err(ShapeError(format!("expected bytes, got {}", other.kind()))),
        }
    }

    /// An ordered list of document buffers.
    pub fn into_bytes_list(self) -> Result<Vec<Vec<u8>>> {
        match self {
            Self::BytesList(list) => Ok(list),
            Self::Json(value) => serde_json::from_value(value).map_err(|e| ShapeError(e.to_string())),
            other => Err(ShapeError(format!("expected a list of buffers, got {}", other.kind()))),
        }
    }

    /// Decodes a JSON payload into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Json(value) => serde_json::from_value(value).map_err(|e| ShapeError(e.to_string())),
            other => Err(ShapeError(format!("expected a JSON value, got {}", other.kind()))),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<Vec<Vec<u8>>> for Payload {
    fn from(list: Vec<Vec<u8>>) -> Self {
        Self::BytesList(list)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}
