//! Shell control socket.
//!
//! Renderer shells connect here, attach to a surface, send command
//! envelopes and receive pushed events. A second tray launch uses the same
//! socket to signal the running instance instead of starting up.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::App;
use crate::proto::Envelope;

/// Accept loop. Runs until the listener errors or the process shuts down.
pub async fn run_server(app: Arc<App>, listener: UnixListener) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let app = app.clone();
                tokio::spawn(async move {
                    handle_connection(app, stream).await;
                });
            }
            Err(err) => {
                warn!(error = %err, "shell accept failed");
                break;
            }
        }
    }
}

async fn handle_connection(app: Arc<App>, stream: UnixStream) {
    let (reader, mut writer) = stream.into_split();
    let (tx, mut rx) = unbounded_channel::<Envelope>();

    let writer_task = tokio::spawn(async move {
        while let Some(env) = rx.recv().await {
            let Ok(mut line) = serde_json::to_string(&env) else {
                continue;
            };
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope>(trimmed) {
            Ok(env) => app.handle_envelope(env, &tx).await,
            Err(err) => warn!(error = %err, "malformed shell message"),
        }
    }
    debug!("shell connection closed");

    drop(tx);
    let _ = writer_task.await;
}

/// Forward bus events to every attached shell.
pub fn spawn_broadcaster(
    app: Arc<App>,
    mut bus_rx: UnboundedReceiver<Envelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(env) = bus_rx.recv().await {
            app.broadcast(env).await;
        }
    })
}

/// Called by a second launch after losing the instance lock: tell the
/// running instance to surface itself, then go away.
pub async fn signal_running_instance(socket: &Path) -> anyhow::Result<()> {
    let stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("failed to reach running instance at {}", socket.display()))?;
    let (_reader, mut writer) = stream.into_split();
    let mut line = serde_json::to_string(&Envelope::new("activate", serde_json::json!({})))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}
