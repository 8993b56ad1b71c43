//! # Engine Abstraction
//!
//! The document engine is a black box: it takes an argument vector and a
//! virtual filesystem, runs to completion, and leaves its output as files in
//! that filesystem.
//!
//! `ProcessEngine` drives an installed interpreter binary by mirroring the
//! virtual filesystem into a scratch directory for the duration of one run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tracing::debug;
use tracing::trace;

#[derive(Debug, Clone)]
pub enum EngineError {
    /// The engine process could not be started.
    Spawn(String),
    /// Moving files in or out of the engine failed.
    Io(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "Failed to start engine: {}", msg),
            Self::Io(msg) => write!(f, "Engine I/O error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Flat in-memory filesystem handed to the engine for one run.
///
/// Paths are stored as given (`./input`, `./output`, ...).
#[derive(Debug, Clone, Default)]
pub struct VirtualFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl VirtualFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_file(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn read_file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Removes a file and returns its contents.
    pub fn take_file(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(path, bytes)| (path.as_str(), bytes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// How an engine run ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exit {
    pub code: i32,
    /// Diagnostic lines the engine printed, in order.
    pub messages: Vec<String>,
}

impl Exit {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// The command implementation.
///
/// # Invariants
/// - Must not retain `fs` past the call; everything it produces is written into it.
/// - Returns `Err` only when the engine could not run at all. A run that fails
///   is an `Exit` with a non-zero code.
#[async_trait::async_trait]
pub trait Engine: Send + Sync + 'static {
    async fn run(&self, args: &[String], fs: &mut VirtualFs) -> Result<Exit>;
}

/// Runs an external interpreter binary (`gs` by default).
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new("gs")
    }
}

fn local_name(path: &str) -> &str {
    path.trim_start_matches("./")
}

#[async_trait::async_trait]
impl Engine for ProcessEngine {
    async fn run(&self, args: &[String], fs: &mut VirtualFs) -> Result<Exit> {
        let scratch = tempfile::tempdir()?;

        for (path, bytes) in fs.iter() {
            tokio::fs::write(scratch.path().join(local_name(path)), bytes).await?;
        }

        debug!(program = %self.program.display(), args = args.len(), "running engine");
        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Spawn(format!("{}: {}", self.program.display(), e)))?;

        let mut entries = tokio::fs::read_dir(scratch.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let bytes = tokio::fs::read(entry.path()).await?;
            fs.write_file(format!("./{}", name), bytes);
        }

        let messages = String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let code = output.status.code().unwrap_or(-1);
        trace!(code, messages = messages.len(), "engine finished");

        Ok(Exit { code, messages })
    }
}
