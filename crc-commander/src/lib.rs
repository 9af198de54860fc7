//! Commander: client for the local virtualization daemon.
//!
//! Request/response client for the crc daemon's API socket. Every call opens
//! one connection, writes a single newline-delimited JSON request and reads a
//! single JSON reply line. Replies carrying an `error` member are surfaced as
//! [`ClientError::Daemon`]; everything else is decoded into the typed reply.

pub mod model;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

pub use model::{
    ClusterConfig, DaemonState, DaemonStatus, DeleteReply, Preset, StartReply, StatusReply,
    StopReply, VersionReply,
};

use model::{ConfigGetReply, ConsoleUrlReply, LogsReply};

/// Timeout for quick informational calls.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Lifecycle operations (start/stop/delete) block daemon-side until the
/// instance settles, which can take minutes.
const LIFECYCLE_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon not available: {0}")]
    Unavailable(#[from] std::io::Error),
    #[error("request timed out")]
    Timeout,
    #[error("daemon closed the connection without replying")]
    Disconnected,
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("{0}")]
    Daemon(String),
}

/// The daemon call contract the orchestrator depends on.
///
/// The concrete transport lives in [`DaemonCommander`]; tests substitute
/// scripted implementations.
#[async_trait]
pub trait DaemonApi: Send + Sync {
    async fn status(&self) -> Result<StatusReply, ClientError>;
    async fn start(&self) -> Result<StartReply, ClientError>;
    async fn stop(&self) -> Result<StopReply, ClientError>;
    async fn delete(&self) -> Result<DeleteReply, ClientError>;
    async fn console_url(&self) -> Result<ClusterConfig, ClientError>;
    async fn config_get(&self) -> Result<serde_json::Map<String, Value>, ClientError>;
    async fn config_set(
        &self,
        properties: serde_json::Map<String, Value>,
    ) -> Result<(), ClientError>;
    /// Resolves to `Ok` when a pull secret is stored daemon-side; the error
    /// carries the daemon's explanation when it is absent.
    async fn pull_secret_available(&self) -> Result<(), ClientError>;
    async fn pull_secret_store(&self, secret: &str) -> Result<(), ClientError>;
    async fn logs(&self) -> Result<Vec<String>, ClientError>;
    async fn version(&self) -> Result<VersionReply, ClientError>;
}

/// Default location of the daemon API socket (`~/.crc/crc-daemon.sock`).
pub fn default_socket_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".crc")
        .join("crc-daemon.sock")
}

/// Unix-socket client for the daemon API.
pub struct DaemonCommander {
    socket_path: PathBuf,
}

impl DaemonCommander {
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        DaemonCommander {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    async fn request(
        &self,
        command: &str,
        args: Value,
        deadline: Duration,
    ) -> Result<Value, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (reader, mut writer) = stream.into_split();
        let mut buf_reader = BufReader::new(reader);

        let line = serde_json::to_string(&json!({ "command": command, "args": args }))? + "\n";
        writer.write_all(line.as_bytes()).await?;

        let mut response_line = String::new();
        match timeout(deadline, buf_reader.read_line(&mut response_line)).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Ok(0)) => Err(ClientError::Disconnected),
            Ok(Ok(_)) => {
                let trimmed = response_line.trim();
                if trimmed.is_empty() {
                    return Err(ClientError::Disconnected);
                }
                debug!(command, reply = trimmed, "daemon reply");
                let value: Value = serde_json::from_str(trimmed)?;
                if let Some(message) = value.get("error").and_then(Value::as_str) {
                    return Err(ClientError::Daemon(message.to_string()));
                }
                Ok(value)
            }
            Ok(Err(err)) => Err(ClientError::Unavailable(err)),
        }
    }

    async fn call(&self, command: &str, deadline: Duration) -> Result<Value, ClientError> {
        self.request(command, json!({}), deadline).await
    }
}

#[async_trait]
impl DaemonApi for DaemonCommander {
    async fn status(&self) -> Result<StatusReply, ClientError> {
        let value = self.call("status", DEFAULT_REQUEST_TIMEOUT).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn start(&self) -> Result<StartReply, ClientError> {
        let value = self.call("start", LIFECYCLE_REQUEST_TIMEOUT).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn stop(&self) -> Result<StopReply, ClientError> {
        let value = self.call("stop", LIFECYCLE_REQUEST_TIMEOUT).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn delete(&self) -> Result<DeleteReply, ClientError> {
        let value = self.call("delete", LIFECYCLE_REQUEST_TIMEOUT).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn console_url(&self) -> Result<ClusterConfig, ClientError> {
        let value = self.call("webconsoleurl", DEFAULT_REQUEST_TIMEOUT).await?;
        let reply: ConsoleUrlReply = serde_json::from_value(value)?;
        Ok(reply.cluster_config)
    }

    async fn config_get(&self) -> Result<serde_json::Map<String, Value>, ClientError> {
        let value = self.call("getconfig", DEFAULT_REQUEST_TIMEOUT).await?;
        let reply: ConfigGetReply = serde_json::from_value(value)?;
        Ok(reply.configs)
    }

    async fn config_set(
        &self,
        properties: serde_json::Map<String, Value>,
    ) -> Result<(), ClientError> {
        self.request(
            "setconfig",
            json!({ "properties": properties }),
            DEFAULT_REQUEST_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn pull_secret_available(&self) -> Result<(), ClientError> {
        self.call("pullsecret.available", DEFAULT_REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn pull_secret_store(&self, secret: &str) -> Result<(), ClientError> {
        self.request(
            "pullsecret.store",
            json!({ "pullsecret": secret }),
            DEFAULT_REQUEST_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn logs(&self) -> Result<Vec<String>, ClientError> {
        let value = self.call("logs", DEFAULT_REQUEST_TIMEOUT).await?;
        let reply: LogsReply = serde_json::from_value(value)?;
        Ok(reply.messages)
    }

    async fn version(&self) -> Result<VersionReply, ClientError> {
        let value = self.call("version", DEFAULT_REQUEST_TIMEOUT).await?;
        Ok(serde_json::from_value(value)?)
    }
}
