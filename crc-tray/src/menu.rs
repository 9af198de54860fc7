//! Menu projection: pure function from the latest status snapshot to the
//! menu affordances a shell renders. No window system involved.

use serde::Serialize;

use crc_commander::{DaemonState, DaemonStatus, Preset};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub label: &'static str,
    pub command: &'static str,
    pub enabled: bool,
}

/// Derived, read-only projection of a status snapshot. Recomputed on every
/// tick; carries no identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuModel {
    pub headline: String,
    /// Status icon key (`status-<icon>.png` in the shell's asset set).
    pub icon: &'static str,
    pub primary: Action,
    pub delete: Action,
    pub preset_actions: Vec<Action>,
}

fn state_icon(state: DaemonState) -> &'static str {
    if state.is_busy() {
        return "busy";
    }
    match state {
        DaemonState::Running => "running",
        DaemonState::Stopped => "stopped",
        _ => "unknown",
    }
}

pub fn project(status: &DaemonStatus) -> MenuModel {
    let primary_label = if status.state.is_stopped() {
        "Start"
    } else {
        "Stop"
    };

    let enabled_when_running = status.state.is_running();
    let preset_actions = if enabled_when_running && status.preset.is_known() {
        match status.preset {
            Preset::OpenShift => vec![
                Action {
                    label: "Open Console",
                    command: "open-console",
                    enabled: enabled_when_running,
                },
                Action {
                    label: "Copy OC login command (admin)",
                    command: "copy-oc-login-admin",
                    enabled: enabled_when_running,
                },
                Action {
                    label: "Copy OC login command (developer)",
                    command: "copy-oc-login-developer",
                    enabled: enabled_when_running,
                },
                Action {
                    label: "Open developer terminal",
                    command: "open-dev-terminal",
                    enabled: enabled_when_running,
                },
            ],
            Preset::Podman => vec![
                Action {
                    label: "Open Console",
                    command: "open-podman-console",
                    enabled: enabled_when_running,
                },
                Action {
                    label: "Open developer terminal",
                    command: "open-dev-terminal",
                    enabled: enabled_when_running,
                },
            ],
            Preset::Unknown => Vec::new(),
        }
    } else {
        Vec::new()
    };

    MenuModel {
        headline: status.state.to_string(),
        icon: state_icon(status.state),
        primary: Action {
            label: primary_label,
            command: "toggle-instance",
            enabled: true,
        },
        delete: Action {
            label: "Delete",
            command: "delete-instance",
            enabled: true,
        },
        preset_actions,
    }
}
