//! Output sinks for snapshots (console line or overwritten file)

use crate::error::MonitorError;
use std::error::Error as _;
use std::fmt;
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Where snapshots go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Console,
    File(PathBuf),
}

impl OutputTarget {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(p) if !p.as_os_str().is_empty() => OutputTarget::File(p),
            _ => OutputTarget::Console,
        }
    }

    pub fn is_console(&self) -> bool {
        matches!(self, OutputTarget::Console)
    }

    pub fn into_sink(self) -> Box<dyn Sink> {
        match self {
            OutputTarget::Console => Box::new(ConsoleSink::stdout()),
            OutputTarget::File(path) => Box::new(FileSink::new(path)),
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Console => write!(f, "console"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[async_trait::async_trait]
pub trait Sink: Send {
    /// Writes one serialized snapshot.
    async fn emit(&mut self, json: &str) -> io::Result<()>;

    /// Best-effort report of the error that stopped sampling.
    async fn emit_failure(&mut self, error: &MonitorError) -> io::Result<()>;

    fn describe(&self) -> String;
}

#[async_trait::async_trait]
impl<S: Sink + ?Sized> Sink for Box<S> {
    async fn emit(&mut self, json: &str) -> io::Result<()> {
        (**self).emit(json).await
    }

    async fn emit_failure(&mut self, error: &MonitorError) -> io::Result<()> {
        (**self).emit_failure(error).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Human-readable failure line: the message followed by its source chain.
pub fn diagnostic_line(error: &MonitorError) -> String {
    let mut line = format!("Error: {}", error);
    let mut source = error.source();
    while let Some(cause) = source {
        line.push(' ');
        line.push_str(&cause.to_string());
        source = cause.source();
    }
    line
}

/// Structured failure object for machine consumers.
pub fn error_payload(error: &MonitorError) -> String {
    serde_json::json!({ "error": error.to_string() }).to_string()
}

/// One JSON line per snapshot.
pub struct ConsoleSink<W = tokio::io::Stdout> {
    writer: W,
}

impl ConsoleSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self { writer: tokio::io::stdout() }
    }
}

impl<W> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleSink<W> {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> Sink for ConsoleSink<W> {
    async fn emit(&mut self, json: &str) -> io::Result<()> {
        self.write_line(json).await
    }

    async fn emit_failure(&mut self, error: &MonitorError) -> io::Result<()> {
        self.write_line(&diagnostic_line(error)).await
    }

    fn describe(&self) -> String {
        "console".to_string()
    }
}

/// Replaces the file's whole content on every write.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Sink for FileSink {
    async fn emit(&mut self, json: &str) -> io::Result<()> {
        tokio::fs::write(&self.path, json).await
    }

    async fn emit_failure(&mut self, error: &MonitorError) -> io::Result<()> {
        tokio::fs::write(&self.path, error_payload(error)).await
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
