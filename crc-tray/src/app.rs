//! Application state and the shell command router.
//!
//! Owns every long-lived piece of the orchestrator: the daemon client, the
//! window registry, the setup session, the log tail slot, and the shutdown
//! tokens. Commands arriving on the control socket are routed here.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crc_commander::{DaemonApi, DaemonStatus};

use crate::desktop;
use crate::dispatcher::Dispatcher;
use crate::logtail::LogTail;
use crate::poller::{self, StatusPoller};
use crate::prompt::Confirm;
use crate::proto::{Envelope, Surface};
use crate::setup::{SetupEvent, SetupOptions, SetupRunner, SetupSession, SetupTerminal};
use crate::windows::{CloseDecision, WindowRegistry};

const PODMAN_HOST: &str = "podman.crc.testing";

pub struct AppConfig {
    pub crc_binary: PathBuf,
    pub poll_interval: Duration,
    pub tail_interval: Duration,
}

pub struct App {
    pub client: Arc<dyn DaemonApi>,
    pub windows: Arc<Mutex<WindowRegistry>>,
    pub dispatcher: Dispatcher,
    pub setup: SetupRunner,
    pub session: Mutex<SetupSession>,
    pub tail: Mutex<Option<LogTail>>,
    pub shutdown: CancellationToken,
    pub poll_cancel: CancellationToken,
    bus: UnboundedSender<Envelope>,
    sinks: Mutex<Vec<UnboundedSender<Envelope>>>,
    status_rx: watch::Receiver<DaemonStatus>,
    status_tx: StdMutex<Option<watch::Sender<DaemonStatus>>>,
    prompter: Arc<dyn Confirm>,
    crc_binary: PathBuf,
    poll_interval: Duration,
    tail_interval: Duration,
    normal_started: AtomicBool,
    onboarding: AtomicBool,
}

impl App {
    pub fn new(
        client: Arc<dyn DaemonApi>,
        config: AppConfig,
        bus: UnboundedSender<Envelope>,
        prompter: Arc<dyn Confirm>,
    ) -> Arc<Self> {
        let windows = Arc::new(Mutex::new(WindowRegistry::new()));
        let dispatcher = Dispatcher::new(
            client.clone(),
            windows.clone(),
            bus.clone(),
            prompter.clone(),
        );
        let setup = SetupRunner::new(&config.crc_binary, client.clone());
        let (status_tx, status_rx) = watch::channel(DaemonStatus::default());

        Arc::new(App {
            client,
            windows,
            dispatcher,
            setup,
            session: Mutex::new(SetupSession::default()),
            tail: Mutex::new(None),
            shutdown: CancellationToken::new(),
            poll_cancel: CancellationToken::new(),
            bus,
            sinks: Mutex::new(Vec::new()),
            status_rx,
            status_tx: StdMutex::new(Some(status_tx)),
            prompter,
            crc_binary: config.crc_binary,
            poll_interval: config.poll_interval,
            tail_interval: config.tail_interval,
            normal_started: AtomicBool::new(false),
            onboarding: AtomicBool::new(false),
        })
    }

    pub fn publish(&self, env: Envelope) {
        let _ = self.bus.send(env);
    }

    pub fn is_onboarding(&self) -> bool {
        self.onboarding.load(Ordering::SeqCst)
    }

    /// Fan one event out to every attached shell, dropping dead sinks.
    pub async fn broadcast(&self, env: Envelope) {
        let mut sinks = self.sinks.lock().await;
        sinks.retain(|sink| sink.send(env.clone()).is_ok());
    }

    /// First-run path: show the onboarding surface and wait for the shell to
    /// send `start-setup`.
    pub async fn enter_onboarding(self: &Arc<Self>) {
        self.onboarding.store(true, Ordering::SeqCst);
        {
            let mut windows = self.windows.lock().await;
            windows.create_hidden(Surface::Onboarding);
            windows.show(Surface::Onboarding);
        }
        self.publish(Envelope::for_surface(
            "window-shown",
            Surface::Onboarding,
            json!({}),
        ));
        info!("onboarding surface opened");
    }

    /// Create the standard surfaces hidden and start the poller. Runs once;
    /// later calls are no-ops.
    pub async fn begin_normal_operation(self: &Arc<Self>) {
        if self.normal_started.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut windows = self.windows.lock().await;
            windows.create_standard_set();
        }
        let status_tx = self
            .status_tx
            .lock()
            .expect("status sender mutex poisoned")
            .take();
        if let Some(status_tx) = status_tx {
            let poller = StatusPoller::new(self.client.clone(), self.poll_interval);
            tokio::spawn(poller.run(status_tx, self.bus.clone(), self.poll_cancel.clone()));
        }
        info!("normal operation started");
    }

    /// Route one shell command. `conn` is the requesting connection's push
    /// channel, used for request-scoped replies; everything else goes over
    /// the broadcast bus.
    pub async fn handle_envelope(self: &Arc<Self>, env: Envelope, conn: &UnboundedSender<Envelope>) {
        debug!(msg_type = %env.msg_type, surface = ?env.surface, "shell command");
        match env.msg_type.as_str() {
            "attach" => {
                let Some(surface) = env.surface else {
                    warn!("attach without a surface name");
                    return;
                };
                self.sinks.lock().await.push(conn.clone());
                let retained = self.windows.lock().await.retained(surface);
                if !retained.is_empty() {
                    let _ = conn.send(Envelope::for_surface(
                        "window-restored",
                        surface,
                        json!({ "lines": retained }),
                    ));
                }
                // Let the new shell render without waiting for the next tick.
                let snapshot = self.status_rx.borrow().clone();
                let _ = conn.send(poller::status_event(&snapshot));
            }
            "activate" => {
                if self.is_onboarding() {
                    self.windows.lock().await.show(Surface::Onboarding);
                    self.publish(Envelope::for_surface(
                        "focus-onboarding",
                        Surface::Onboarding,
                        json!({}),
                    ));
                } else {
                    desktop::notify(
                        "Red Hat OpenShift Local is already running. \
                         Please use the tray icon to interact",
                    );
                    self.publish(Envelope::new("already-running", json!({})));
                }
            }
            // Lifecycle operations settle daemon-side over minutes; they run
            // as their own tasks so this connection keeps taking commands.
            // Completion is observed through polling, not here.
            "toggle-instance" => {
                let state = self.status_rx.borrow().state;
                let app = self.clone();
                tokio::spawn(async move { app.dispatcher.toggle(state).await });
            }
            "start-instance" => {
                let app = self.clone();
                tokio::spawn(async move { app.dispatcher.start().await });
            }
            "stop-instance" => {
                let app = self.clone();
                tokio::spawn(async move { app.dispatcher.stop().await });
            }
            "delete-instance" => {
                let app = self.clone();
                tokio::spawn(async move { app.dispatcher.delete().await });
            }
            "config-save" => {
                let fields = env.payload.as_object().cloned().unwrap_or_default();
                self.dispatcher.save_configuration(fields).await;
            }
            "config-load" => self.dispatcher.load_configuration().await,
            "pullsecret-change" => {
                match env.payload.get("pullsecret").and_then(Value::as_str) {
                    Some(secret) => self.dispatcher.change_pull_secret(secret).await,
                    None => warn!("pullsecret-change without a secret"),
                }
            }
            "open-pullsecret-window" => {
                {
                    let mut windows = self.windows.lock().await;
                    windows.ensure_pull_secret_modality(false);
                    windows.show(Surface::PullSecret);
                }
                self.publish(Envelope::for_surface(
                    "window-shown",
                    Surface::PullSecret,
                    json!({ "modal": false }),
                ));
            }
            "open-window" => {
                let Some(surface) = env.surface else {
                    warn!("open-window without a surface name");
                    return;
                };
                self.open_window(surface).await;
            }
            "close-window" => {
                let Some(surface) = env.surface else {
                    warn!("close-window without a surface name");
                    return;
                };
                self.close_window(surface).await;
            }
            "start-setup" => self.start_setup(env.payload).await,
            "abort-setup" => {
                // The renderer acknowledged a failed session; nothing is
                // recoverable past this point.
                self.onboarding.store(false, Ordering::SeqCst);
                {
                    let mut windows = self.windows.lock().await;
                    windows.hide(Surface::Onboarding);
                    windows.destroy(Surface::Onboarding);
                }
                self.shutdown.cancel();
            }
            "logs-retrieve" => self.arm_log_tail().await,
            "enable-autostart" => desktop::enable_autostart(),
            "disable-autostart" => desktop::disable_autostart(),
            "is-autostart-enabled" => {
                let _ = conn.send(Envelope::new(
                    "autostart-state",
                    json!({ "enabled": desktop::is_autostart_enabled() }),
                ));
            }
            "get-about" => match self.client.version().await {
                Ok(version) => self.publish(Envelope::for_surface(
                    "about-info",
                    Surface::About,
                    json!({
                        "app_version": env!("CARGO_PKG_VERSION"),
                        "crc_version": version.crc_version,
                        "crc_commit": version.commit_sha,
                        "openshift_version": version.openshift_version,
                        "podman_version": version.podman_version,
                    }),
                )),
                Err(err) => warn!(error = %err, "version request failed"),
            },
            "open-console" => match self.client.console_url().await {
                Ok(config) => desktop::open_external(&config.web_console_url),
                Err(err) => warn!(error = %err, "console url request failed"),
            },
            "copy-oc-login-admin" => match self.client.console_url().await {
                Ok(config) => desktop::copy_to_clipboard(&format!(
                    "{} login -u kubeadmin -p {} {}",
                    desktop::oc_command(),
                    config.kube_admin_pass,
                    config.cluster_api
                )),
                Err(err) => warn!(error = %err, "console url request failed"),
            },
            "copy-oc-login-developer" => match self.client.console_url().await {
                Ok(config) => desktop::copy_to_clipboard(&format!(
                    "{} login -u developer -p developer {}",
                    desktop::oc_command(),
                    config.cluster_api
                )),
                Err(err) => warn!(error = %err, "console url request failed"),
            },
            "open-podman-console" => {
                self.windows.lock().await.show(Surface::PodmanConsole);
                self.publish(Envelope::for_surface(
                    "window-shown",
                    Surface::PodmanConsole,
                    json!({
                        "url": format!(
                            "http://{PODMAN_HOST}:9090/cockpit/@localhost/podman/index.html"
                        ),
                    }),
                ));
            }
            "open-dev-terminal" => {
                let preset = self.status_rx.borrow().preset;
                desktop::open_dev_terminal(&self.crc_binary, preset);
            }
            "quit" => self.shutdown.cancel(),
            other => warn!(msg_type = other, "unknown shell command"),
        }
    }

    async fn open_window(self: &Arc<Self>, surface: Surface) {
        let (shown, retained) = {
            let mut windows = self.windows.lock().await;
            (windows.show(surface), windows.retained(surface))
        };
        if !shown {
            warn!(surface = %surface, "open request for a surface that does not exist");
            return;
        }
        self.publish(Envelope::for_surface("window-shown", surface, json!({})));
        if !retained.is_empty() {
            self.publish(Envelope::for_surface(
                "window-restored",
                surface,
                json!({ "lines": retained }),
            ));
        }
    }

    /// Second phase of the close protocol. Onboarding gets its own rule:
    /// abandoning it takes the whole process down, after an explicit yes.
    pub async fn close_window(self: &Arc<Self>, surface: Surface) {
        if surface == Surface::Onboarding && self.is_onboarding() {
            let prompter = self.prompter.clone();
            let confirmed = tokio::task::spawn_blocking(move || {
                prompter.confirm(
                    desktop::APP_TITLE,
                    "Are you sure you want to close the on-boarding wizard?",
                )
            })
            .await
            .unwrap_or(false);
            if confirmed {
                info!("onboarding abandoned by the user");
                self.windows.lock().await.destroy(Surface::Onboarding);
                self.shutdown.cancel();
            }
            return;
        }

        let decision = {
            let mut windows = self.windows.lock().await;
            let decision = windows.request_close(surface);
            match decision {
                CloseDecision::HideInstead => {
                    windows.hide(surface);
                }
                CloseDecision::Proceed => {
                    windows.destroy(surface);
                }
            }
            decision
        };

        if decision == CloseDecision::HideInstead {
            if surface == Surface::Logs {
                if let Some(tail) = self.tail.lock().await.take() {
                    tail.stop();
                }
            }
            self.publish(Envelope::for_surface("window-hidden", surface, json!({})));
        }
    }

    /// Launch the one setup session this process may run.
    async fn start_setup(self: &Arc<Self>, payload: Value) {
        let options: SetupOptions = serde_json::from_value(payload).unwrap_or_default();
        {
            let mut session = self.session.lock().await;
            if !session.begin() {
                warn!("a setup session already ran in this process; ignoring start-setup");
                return;
            }
        }

        let app = self.clone();
        tokio::spawn(async move {
            let (events_tx, mut events_rx) = unbounded_channel();
            let forwarder = {
                let app = app.clone();
                tokio::spawn(async move {
                    while let Some(event) = events_rx.recv().await {
                        app.forward_setup_event(event).await;
                    }
                })
            };
            let terminal = app.setup.run(options, events_tx).await;
            // All log lines reach the listener before the handoff begins.
            let _ = forwarder.await;
            app.finish_setup(terminal).await;
        });
    }

    async fn forward_setup_event(&self, event: SetupEvent) {
        match event {
            SetupEvent::Log(line) => {
                self.session.lock().await.record(&line);
                self.windows
                    .lock()
                    .await
                    .retain_line(Surface::Onboarding, &line);
                self.publish(Envelope::for_surface(
                    "setup-logs-async",
                    Surface::Onboarding,
                    json!({ "line": line }),
                ));
            }
            SetupEvent::Error(line) => {
                self.session.lock().await.record(&line);
                self.windows
                    .lock()
                    .await
                    .retain_line(Surface::Onboarding, &line);
                self.publish(Envelope::for_surface(
                    "setup-logs-error",
                    Surface::Onboarding,
                    json!({ "line": line }),
                ));
            }
            SetupEvent::Ended => {
                self.publish(Envelope::for_surface(
                    "setup-ended",
                    Surface::Onboarding,
                    json!({}),
                ));
            }
        }
    }

    async fn finish_setup(self: &Arc<Self>, terminal: SetupTerminal) {
        self.session.lock().await.finish(terminal);
        match terminal {
            SetupTerminal::Succeeded => {
                self.onboarding.store(false, Ordering::SeqCst);
                self.windows.lock().await.hide(Surface::Onboarding);
                self.publish(Envelope::for_surface(
                    "window-hidden",
                    Surface::Onboarding,
                    json!({}),
                ));
                // Hand off first, destroy after, so there is never a frame
                // without a window during the transition.
                self.begin_normal_operation().await;
                self.windows.lock().await.destroy(Surface::Onboarding);
                desktop::notify(
                    "Red Hat OpenShift Local is running. \
                     Please use the tray icon to start an instance.",
                );
            }
            SetupTerminal::Failed => {
                info!("setup session failed; waiting for the user to close");
            }
            SetupTerminal::None => {}
        }
    }

    /// (Re)arm the log tail. Any previous task is cancelled first so open/
    /// close cycles never leak a recurring task.
    async fn arm_log_tail(self: &Arc<Self>) {
        let mut slot = self.tail.lock().await;
        if let Some(existing) = slot.take() {
            existing.stop();
        }
        let (tx, mut rx) = unbounded_channel::<Vec<String>>();
        {
            let app = self.clone();
            tokio::spawn(async move {
                while let Some(lines) = rx.recv().await {
                    {
                        let mut windows = app.windows.lock().await;
                        for line in &lines {
                            windows.retain_line(Surface::Logs, line);
                        }
                    }
                    app.publish(Envelope::for_surface(
                        "logs-retrieved",
                        Surface::Logs,
                        json!({ "lines": lines }),
                    ));
                }
            });
        }
        *slot = Some(LogTail::spawn(self.client.clone(), self.tail_interval, tx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crc_commander::{
        ClientError, ClusterConfig, DeleteReply, StartReply, StatusReply, StopReply, VersionReply,
    };
    use tokio::sync::mpsc::UnboundedReceiver;

    struct IdleDaemon;

    #[async_trait]
    impl DaemonApi for IdleDaemon {
        async fn status(&self) -> Result<StatusReply, ClientError> {
            Ok(StatusReply::default())
        }
        async fn start(&self) -> Result<StartReply, ClientError> {
            Ok(StartReply::default())
        }
        async fn stop(&self) -> Result<StopReply, ClientError> {
            Ok(StopReply::default())
        }
        async fn delete(&self) -> Result<DeleteReply, ClientError> {
            Ok(DeleteReply::default())
        }
        async fn console_url(&self) -> Result<ClusterConfig, ClientError> {
            Err(ClientError::Daemon("not scripted".into()))
        }
        async fn config_get(
            &self,
        ) -> Result<serde_json::Map<String, serde_json::Value>, ClientError> {
            Ok(serde_json::Map::new())
        }
        async fn config_set(
            &self,
            _properties: serde_json::Map<String, serde_json::Value>,
        ) -> Result<(), ClientError> {
            Ok(())
        }
        async fn pull_secret_available(&self) -> Result<(), ClientError> {
            Ok(())
        }
        async fn pull_secret_store(&self, _secret: &str) -> Result<(), ClientError> {
            Ok(())
        }
        async fn logs(&self) -> Result<Vec<String>, ClientError> {
            Ok(vec!["daemon line".into()])
        }
        async fn version(&self) -> Result<VersionReply, ClientError> {
            Ok(VersionReply::default())
        }
    }

    struct Scripted(bool);

    impl crate::prompt::Confirm for Scripted {
        fn confirm(&self, _title: &str, _message: &str) -> bool {
            self.0
        }
    }

    fn app_with_prompter(answer: bool) -> (Arc<App>, UnboundedReceiver<Envelope>) {
        let (bus_tx, bus_rx) = unbounded_channel();
        let app = App::new(
            Arc::new(IdleDaemon),
            AppConfig {
                crc_binary: PathBuf::from("crc"),
                // Long intervals: tests drive everything explicitly.
                poll_interval: Duration::from_secs(3600),
                tail_interval: Duration::from_millis(5),
            },
            bus_tx,
            Arc::new(Scripted(answer)),
        );
        (app, bus_rx)
    }

    fn conn() -> (
        UnboundedSender<Envelope>,
        UnboundedReceiver<Envelope>,
    ) {
        unbounded_channel()
    }

    #[tokio::test]
    async fn closing_the_logs_surface_hides_it_and_cancels_the_tail() {
        let (app, mut bus_rx) = app_with_prompter(true);
        app.begin_normal_operation().await;
        let (tx, _rx) = conn();

        app.handle_envelope(Envelope::new("logs-retrieve", json!({})), &tx)
            .await;
        assert!(app.tail.lock().await.is_some());

        app.handle_envelope(
            Envelope::for_surface("open-window", Surface::Logs, json!({})),
            &tx,
        )
        .await;
        app.handle_envelope(
            Envelope::for_surface("close-window", Surface::Logs, json!({})),
            &tx,
        )
        .await;

        assert!(app.tail.lock().await.is_none());
        assert!(!app.windows.lock().await.is_visible(Surface::Logs));
        assert!(app.windows.lock().await.exists(Surface::Logs));

        let mut saw_hidden = false;
        while let Ok(event) = bus_rx.try_recv() {
            if event.msg_type == "window-hidden" && event.surface == Some(Surface::Logs) {
                saw_hidden = true;
            }
        }
        assert!(saw_hidden);
    }

    #[tokio::test]
    async fn abandoning_onboarding_needs_an_explicit_yes() {
        let (app, _bus_rx) = app_with_prompter(false);
        app.enter_onboarding().await;
        let (tx, _rx) = conn();

        app.handle_envelope(
            Envelope::for_surface("close-window", Surface::Onboarding, json!({})),
            &tx,
        )
        .await;
        assert!(!app.shutdown.is_cancelled());
        assert!(app.windows.lock().await.exists(Surface::Onboarding));
    }

    #[tokio::test]
    async fn confirmed_abandonment_destroys_the_window_and_ends_the_process() {
        let (app, _bus_rx) = app_with_prompter(true);
        app.enter_onboarding().await;
        let (tx, _rx) = conn();

        app.handle_envelope(
            Envelope::for_surface("close-window", Surface::Onboarding, json!({})),
            &tx,
        )
        .await;
        assert!(app.shutdown.is_cancelled());
        assert!(!app.windows.lock().await.exists(Surface::Onboarding));
    }

    #[tokio::test]
    async fn attach_replays_retained_surface_state() {
        let (app, _bus_rx) = app_with_prompter(true);
        app.begin_normal_operation().await;
        {
            let mut windows = app.windows.lock().await;
            windows.retain_line(Surface::Logs, "old line");
        }
        let (tx, mut rx) = conn();

        app.handle_envelope(
            Envelope::for_surface("attach", Surface::Logs, json!({})),
            &tx,
        )
        .await;

        let restored = rx.try_recv().unwrap();
        assert_eq!(restored.msg_type, "window-restored");
        assert_eq!(restored.payload["lines"], json!(["old line"]));
        let status = rx.try_recv().unwrap();
        assert_eq!(status.msg_type, "status-changed");
    }

    #[tokio::test]
    async fn activate_during_onboarding_refocuses_the_wizard() {
        let (app, mut bus_rx) = app_with_prompter(true);
        app.enter_onboarding().await;
        {
            let mut windows = app.windows.lock().await;
            windows.hide(Surface::Onboarding);
        }
        let (tx, _rx) = conn();

        app.handle_envelope(Envelope::new("activate", json!({})), &tx)
            .await;

        assert!(app.windows.lock().await.is_visible(Surface::Onboarding));
        let mut saw_focus = false;
        while let Ok(event) = bus_rx.try_recv() {
            if event.msg_type == "focus-onboarding" {
                saw_focus = true;
            }
        }
        assert!(saw_focus);
    }
}
