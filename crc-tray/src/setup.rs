//! Onboarding/setup runner: one-shot provisioning subprocess supervisor.
//!
//! Streams the provisioning command's stdout and stderr to a listener line
//! by line, detects the terminal outcome, and performs the post-step
//! (storing the pull secret) before raising the terminal signal. There is
//! no retry: a failed session requires the user to restart the app.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crc_commander::DaemonApi;

/// Terminal condition of a setup session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetupTerminal {
    #[default]
    None,
    Succeeded,
    Failed,
}

/// The one setup session a process may run.
#[derive(Debug, Default)]
pub struct SetupSession {
    pub active: bool,
    pub log_lines: Vec<String>,
    pub terminal: SetupTerminal,
}

impl SetupSession {
    /// Claim the session. At most one session runs per process lifetime;
    /// a second begin attempt is refused.
    pub fn begin(&mut self) -> bool {
        if self.active || self.terminal != SetupTerminal::None {
            return false;
        }
        self.active = true;
        true
    }

    pub fn record(&mut self, line: &str) {
        self.log_lines.push(line.to_string());
    }

    pub fn finish(&mut self, terminal: SetupTerminal) {
        self.active = false;
        self.terminal = terminal;
    }
}

/// Events forwarded to the session's log listener, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupEvent {
    /// One line of subprocess output or a preliminary-step diagnostic.
    Log(String),
    /// Terminal failure line.
    Error(String),
    /// Setup finished; normal operation may begin.
    Ended,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SetupOptions {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub consent_telemetry: Option<bool>,
    #[serde(default)]
    pub pullsecret: Option<String>,
}

pub struct SetupRunner {
    crc_binary: PathBuf,
    client: Arc<dyn DaemonApi>,
}

impl SetupRunner {
    pub fn new<P: AsRef<Path>>(crc_binary: P, client: Arc<dyn DaemonApi>) -> Self {
        SetupRunner {
            crc_binary: crc_binary.as_ref().to_path_buf(),
            client,
        }
    }

    /// Probe whether the host still needs provisioning. A probe that cannot
    /// run at all counts as unprovisioned.
    pub async fn needs_onboarding(&self) -> bool {
        match Command::new(&self.crc_binary)
            .args(["setup", "--check-only"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => !status.success(),
            Err(err) => {
                warn!(error = %err, binary = %self.crc_binary.display(), "check-only probe failed to run");
                true
            }
        }
    }

    /// Run the provisioning flow to its terminal state, forwarding output
    /// to `events` as it arrives.
    pub async fn run(
        &self,
        options: SetupOptions,
        events: UnboundedSender<SetupEvent>,
    ) -> SetupTerminal {
        if let Some(consent) = options.consent_telemetry {
            let value = if consent { "yes" } else { "no" };
            self.preliminary_config("consent-telemetry", value, &events)
                .await;
        }
        if let Some(preset) = options.preset.as_deref().filter(|p| !p.is_empty()) {
            self.preliminary_config("preset", preset, &events).await;
        }

        info!(binary = %self.crc_binary.display(), "starting provisioning run");
        let mut child = match Command::new(&self.crc_binary)
            .arg("setup")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(error = %err, "failed to spawn provisioning command");
                let _ = events.send(SetupEvent::Error("Setup failed.".into()));
                return SetupTerminal::Failed;
            }
        };

        let stdout_task = child.stdout.take().map(|out| forward_lines(out, events.clone()));
        let stderr_task = child.stderr.take().map(|err| forward_lines(err, events.clone()));

        let status = child.wait().await;

        // Drain both streams before raising any terminal signal so the
        // listener sees every line first.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let exited_ok = match status {
            Ok(status) => status.success(),
            Err(err) => {
                warn!(error = %err, "failed waiting for provisioning command");
                false
            }
        };

        if !exited_ok {
            let _ = events.send(SetupEvent::Error("Setup failed.".into()));
            return SetupTerminal::Failed;
        }

        if let Some(secret) = options.pullsecret.as_deref().filter(|s| !s.is_empty()) {
            match self.client.pull_secret_store(secret).await {
                Ok(()) => {
                    let _ = events.send(SetupEvent::Log("Pull secret stored in keyring".into()));
                    let _ = events.send(SetupEvent::Ended);
                    SetupTerminal::Succeeded
                }
                Err(err) => {
                    // The secret is not retried; the session ends failed.
                    warn!(error = %err, "pull secret not stored");
                    let _ = events.send(SetupEvent::Error("Pull secret not stored.".into()));
                    SetupTerminal::Failed
                }
            }
        } else {
            let _ = events.send(SetupEvent::Ended);
            SetupTerminal::Succeeded
        }
    }

    /// A preliminary configuration step. Failures become log lines and the
    /// run continues.
    async fn preliminary_config(
        &self,
        key: &str,
        value: &str,
        events: &UnboundedSender<SetupEvent>,
    ) {
        match Command::new(&self.crc_binary)
            .args(["config", "set", key, value])
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                debug!(key, value, "preliminary config applied");
            }
            Ok(output) => {
                let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let line = if detail.is_empty() {
                    format!("failed to set {key}")
                } else {
                    detail
                };
                let _ = events.send(SetupEvent::Log(line));
            }
            Err(err) => {
                let _ = events.send(SetupEvent::Log(err.to_string()));
            }
        }
    }
}

fn forward_lines<R>(reader: R, events: UnboundedSender<SetupEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if events.send(SetupEvent::Log(line)).is_err() {
                break;
            }
        }
    })
}
