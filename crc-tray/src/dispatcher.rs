//! Lifecycle action dispatcher.
//!
//! Thin wrappers that translate a user command into a daemon call and its
//! outcome into a notification or a surface acknowledgment. Completion of
//! lifecycle operations is observed through polling, not through these
//! calls' return values.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crc_commander::{DaemonApi, DaemonState};

use crate::desktop;
use crate::prompt::Confirm;
use crate::proto::{Envelope, Surface};
use crate::windows::WindowRegistry;

pub struct Dispatcher {
    client: Arc<dyn DaemonApi>,
    windows: Arc<Mutex<WindowRegistry>>,
    bus: UnboundedSender<Envelope>,
    prompter: Arc<dyn Confirm>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn DaemonApi>,
        windows: Arc<Mutex<WindowRegistry>>,
        bus: UnboundedSender<Envelope>,
        prompter: Arc<dyn Confirm>,
    ) -> Self {
        Dispatcher {
            client,
            windows,
            bus,
            prompter,
        }
    }

    /// Start when the instance is stopped or unknown, stop otherwise.
    pub async fn toggle(&self, state: DaemonState) {
        if state.is_stopped() {
            self.start().await;
        } else {
            self.stop().await;
        }
    }

    /// Gated start: a missing pull secret redirects to the pull-secret
    /// surface (modal, as it now gates the start) and the daemon is not
    /// called at all.
    pub async fn start(&self) {
        if self.pull_secret_missing().await {
            {
                let mut windows = self.windows.lock().await;
                windows.ensure_pull_secret_modality(true);
                windows.show(Surface::PullSecret);
            }
            let _ = self.bus.send(Envelope::for_surface(
                "window-shown",
                Surface::PullSecret,
                json!({ "modal": true }),
            ));
            info!("start withheld: pull secret not configured yet");
            return;
        }

        if let Err(err) = self.client.start().await {
            warn!(error = %err, "start request failed");
            desktop::notify(&format!(
                "There was an error starting the OpenShift Local instance: {err}"
            ));
        }
    }

    pub async fn stop(&self) {
        if let Err(err) = self.client.stop().await {
            warn!(error = %err, "stop request failed");
            desktop::notify(&format!(
                "There was an error stopping the OpenShift Local instance: {err}"
            ));
        }
    }

    /// Ask for confirmation, then delete. Declining is a no-op.
    pub async fn delete(&self) {
        let prompter = self.prompter.clone();
        let confirmed = tokio::task::spawn_blocking(move || {
            prompter.confirm(
                "Delete",
                "Are you sure you want to delete the OpenShift Local instance? \
                 This is a destructive operation and can not be undone.",
            )
        })
        .await
        .unwrap_or(false);

        if confirmed {
            self.delete_confirmed().await;
        } else {
            debug!("instance delete declined");
        }
    }

    pub async fn delete_confirmed(&self) {
        if let Err(err) = self.client.delete().await {
            warn!(error = %err, "delete request failed");
            desktop::notify(&format!(
                "There was an error deleting the OpenShift Local instance: {err}"
            ));
        }
    }

    /// Submit a partial configuration update, dropping empty-valued fields.
    /// Configuration is non-critical: failures are logged, never alarmed.
    pub async fn save_configuration(&self, fields: Map<String, Value>) {
        let properties: Map<String, Value> = fields
            .into_iter()
            .filter(|(_, value)| !is_empty_value(value))
            .collect();
        match self.client.config_set(properties).await {
            Ok(()) => {
                let _ = self.bus.send(Envelope::for_surface(
                    "config-saved",
                    Surface::Configuration,
                    json!({}),
                ));
            }
            Err(err) => warn!(error = %err, "failed to set config"),
        }
    }

    pub async fn load_configuration(&self) {
        match self.client.config_get().await {
            Ok(configs) => {
                let _ = self.bus.send(Envelope::for_surface(
                    "config-loaded",
                    Surface::Configuration,
                    Value::Object(configs),
                ));
            }
            Err(err) => warn!(error = %err, "failed to get config"),
        }
    }

    /// Store a new pull secret. On failure the surface stays open so the
    /// user can retry.
    pub async fn change_pull_secret(&self, secret: &str) {
        match self.client.pull_secret_store(secret).await {
            Ok(()) => {
                info!("pull secret stored");
                let _ = self.bus.send(Envelope::for_surface(
                    "pullsecret-changed",
                    Surface::PullSecret,
                    json!({}),
                ));
            }
            Err(err) => warn!(error = %err, "pull secret not stored"),
        }
    }

    pub async fn pull_secret_missing(&self) -> bool {
        self.client.pull_secret_available().await.is_err()
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}
