//! Log tailing for the logs surface.
//!
//! A recurring task that fetches the daemon's log buffer and forwards every
//! line past the previous high-water mark, inclusive of the newest line.
//! Armed when the logs surface asks for it, cancelled when the surface is
//! hidden, re-armed cleanly on the next request; at most one tail task
//! exists at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crc_commander::DaemonApi;

pub const TAIL_INTERVAL: Duration = Duration::from_secs(3);

pub struct LogTail {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LogTail {
    /// Arm a tail task delivering batches of fresh lines. The previous task,
    /// if any, must be stopped by the caller first.
    pub fn spawn(
        client: Arc<dyn DaemonApi>,
        interval: Duration,
        deliver: UnboundedSender<Vec<String>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut last_seen = 0usize;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match client.logs().await {
                    Ok(messages) => {
                        if last_seen > messages.len() {
                            // The daemon rotated its buffer; start over.
                            last_seen = 0;
                        }
                        let fresh: Vec<String> = messages[last_seen..].to_vec();
                        last_seen = messages.len();
                        if !fresh.is_empty() && deliver.send(fresh).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "logs tick failed");
                    }
                }
            }
        });
        LogTail { cancel, handle }
    }

    /// Cancel the tail. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crc_commander::{
        ClientError, ClusterConfig, DeleteReply, StartReply, StatusReply, StopReply, VersionReply,
    };
    use std::sync::Mutex;
    use tokio::sync::mpsc::unbounded_channel;

    struct GrowingLogs {
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl GrowingLogs {
        fn new(batches: Vec<Vec<&str>>) -> Arc<Self> {
            Arc::new(GrowingLogs {
                batches: Mutex::new(
                    batches
                        .into_iter()
                        .map(|lines| lines.into_iter().map(String::from).collect())
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl DaemonApi for GrowingLogs {
        async fn logs(&self) -> Result<Vec<String>, ClientError> {
            let mut batches = self.batches.lock().unwrap();
            if batches.len() > 1 {
                Ok(batches.remove(0))
            } else {
                Ok(batches[0].clone())
            }
        }

        async fn status(&self) -> Result<StatusReply, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn start(&self) -> Result<StartReply, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn stop(&self) -> Result<StopReply, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn delete(&self) -> Result<DeleteReply, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn console_url(&self) -> Result<ClusterConfig, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn config_get(
            &self,
        ) -> Result<serde_json::Map<String, serde_json::Value>, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn config_set(
            &self,
            _properties: serde_json::Map<String, serde_json::Value>,
        ) -> Result<(), ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn pull_secret_available(&self) -> Result<(), ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn pull_secret_store(&self, _secret: &str) -> Result<(), ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn version(&self) -> Result<VersionReply, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
    }

    #[tokio::test]
    async fn tail_is_inclusive_and_delivers_each_line_exactly_once() {
        let client = GrowingLogs::new(vec![
            vec!["a"],
            vec!["a", "b", "c"],
            vec!["a", "b", "c", "d"],
        ]);
        let (tx, mut rx) = unbounded_channel();
        let tail = LogTail::spawn(client, Duration::from_millis(5), tx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        tail.stop();

        let mut seen = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            seen.extend(batch);
        }
        // Every line arrives once, including the newest one of each fetch.
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn stop_cancels_and_rearming_starts_from_the_beginning() {
        let client = GrowingLogs::new(vec![vec!["x", "y"]]);
        let (tx, mut rx) = unbounded_channel();
        let tail = LogTail::spawn(client.clone(), Duration::from_millis(5), tx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        tail.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tail.is_finished());

        let mut first_run = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            first_run.extend(batch);
        }
        assert_eq!(first_run, vec!["x", "y"]);

        // A fresh task has a fresh high-water mark.
        let (tx2, mut rx2) = unbounded_channel();
        let tail2 = LogTail::spawn(client, Duration::from_millis(5), tx2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        tail2.stop();
        let mut second_run = Vec::new();
        while let Ok(batch) = rx2.try_recv() {
            second_run.extend(batch);
        }
        assert_eq!(second_run, vec!["x", "y"]);
    }
}
