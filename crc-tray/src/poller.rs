//! Status poller: the one perpetual background task.
//!
//! Strictly sequential: each cycle issues a single status request, waits for
//! it to settle, publishes the snapshot, then sleeps the full interval. A
//! failing request degrades to a synthetic stopped snapshot instead of
//! escaping the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crc_commander::{DaemonApi, DaemonStatus};

use crate::menu;
use crate::proto::Envelope;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct StatusPoller {
    client: Arc<dyn DaemonApi>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(client: Arc<dyn DaemonApi>, interval: Duration) -> Self {
        StatusPoller { client, interval }
    }

    /// One polling cycle: request, normalize, never fail.
    pub async fn tick(&self) -> DaemonStatus {
        match self.client.status().await {
            Ok(reply) => DaemonStatus::from(reply),
            Err(err) => {
                warn!(error = %err, "status tick failed");
                DaemonStatus::stopped()
            }
        }
    }

    /// Poll until cancelled. The next request is issued only after the
    /// previous one has settled and the full interval has elapsed.
    pub async fn run(
        self,
        status_tx: watch::Sender<DaemonStatus>,
        bus: UnboundedSender<Envelope>,
        cancel: CancellationToken,
    ) {
        loop {
            let snapshot = self.tick().await;
            status_tx.send_replace(snapshot.clone());
            let _ = bus.send(status_event(&snapshot));

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// The per-tick broadcast: the snapshot plus its menu projection.
pub fn status_event(status: &DaemonStatus) -> Envelope {
    Envelope::new(
        "status-changed",
        serde_json::json!({
            "status": status,
            "menu": menu::project(status),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crc_commander::{
        ClientError, ClusterConfig, DeleteReply, StartReply, StatusReply, StopReply, VersionReply,
    };
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio::sync::mpsc::unbounded_channel;

    /// Scripted daemon recording the time window of every status call.
    struct RecordingDaemon {
        latency: Duration,
        fail: bool,
        windows: Mutex<Vec<(Instant, Instant)>>,
    }

    impl RecordingDaemon {
        fn new(latency: Duration, fail: bool) -> Arc<Self> {
            Arc::new(RecordingDaemon {
                latency,
                fail,
                windows: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DaemonApi for RecordingDaemon {
        async fn status(&self) -> Result<StatusReply, ClientError> {
            let begin = Instant::now();
            tokio::time::sleep(self.latency).await;
            self.windows.lock().unwrap().push((begin, Instant::now()));
            if self.fail {
                Err(ClientError::Daemon("daemon unreachable".into()))
            } else {
                Ok(StatusReply {
                    crc_status: "Running".into(),
                    preset: "openshift".into(),
                    ..StatusReply::default()
                })
            }
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
        async fn logs(&self) -> Result<Vec<String>, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn version(&self) -> Result<VersionReply, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
    }

    #[tokio::test]
    async fn status_requests_never_overlap_even_when_slow() {
        // Latency far above the interval: overlap would be immediate if the
        // loop did not wait for the previous request to settle.
        let daemon = RecordingDaemon::new(Duration::from_millis(30), false);
        let poller = StatusPoller::new(daemon.clone(), Duration::from_millis(5));
        let (status_tx, _status_rx) = watch::channel(DaemonStatus::default());
        let (bus_tx, _bus_rx) = unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(poller.run(status_tx, bus_tx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
        let _ = handle.await;

        let windows = daemon.windows.lock().unwrap();
        assert!(windows.len() >= 3, "expected several ticks, got {}", windows.len());
        for pair in windows.windows(2) {
            assert!(
                pair[1].0 >= pair[0].1,
                "status call started before the previous one settled"
            );
        }
    }

    #[tokio::test]
    async fn failing_tick_publishes_one_stopped_snapshot_and_loop_survives() {
        let daemon = RecordingDaemon::new(Duration::from_millis(1), true);
        let poller = StatusPoller::new(daemon.clone(), Duration::from_millis(5));
        let (status_tx, status_rx) = watch::channel(DaemonStatus::default());
        let (bus_tx, mut bus_rx) = unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(poller.run(status_tx, bus_tx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        let _ = handle.await;

        let calls = daemon.windows.lock().unwrap().len();
        assert!(calls >= 2, "loop must continue past a failure, got {calls} calls");

        let mut published = 0;
        while let Ok(event) = bus_rx.try_recv() {
            assert_eq!(event.msg_type, "status-changed");
            assert_eq!(event.payload["status"]["state"], "Stopped");
            published += 1;
        }
        // Exactly one snapshot per tick, no extras on failure.
        assert_eq!(published, calls);
        assert_eq!(status_rx.borrow().state, crc_commander::DaemonState::Stopped);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let daemon = RecordingDaemon::new(Duration::from_millis(1), false);
        let poller = StatusPoller::new(daemon.clone(), Duration::from_millis(5));
        let (status_tx, _status_rx) = watch::channel(DaemonStatus::default());
        let (bus_tx, _bus_rx) = unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(poller.run(status_tx, bus_tx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let _ = handle.await;

        let settled = daemon.windows.lock().unwrap().len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(settled, daemon.windows.lock().unwrap().len());
    }

    #[tokio::test]
    async fn tick_normalizes_successful_replies() {
        let daemon = RecordingDaemon::new(Duration::from_millis(1), false);
        let poller = StatusPoller::new(daemon, Duration::from_millis(5));
        let snapshot = poller.tick().await;
        assert_eq!(snapshot.state, crc_commander::DaemonState::Running);
        assert_eq!(snapshot.preset, crc_commander::Preset::OpenShift);
    }
}
