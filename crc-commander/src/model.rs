//! Wire and domain model for the daemon API.
//!
//! Raw replies keep the daemon's field names; the normalized types are what
//! the rest of the application consumes. Anything empty or unrecognized on
//! the wire collapses to `Unknown`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the managed instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonState {
    #[default]
    Unknown,
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl DaemonState {
    /// Parse the daemon's status string, case-insensitively. Empty and
    /// unrecognized values map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "stopped" => DaemonState::Stopped,
            "starting" => DaemonState::Starting,
            "running" => DaemonState::Running,
            "stopping" => DaemonState::Stopping,
            _ => DaemonState::Unknown,
        }
    }

    pub fn is_running(self) -> bool {
        self == DaemonState::Running
    }

    /// The instance counts as stopped when it is stopped or in an unknown
    /// state; both are startable.
    pub fn is_stopped(self) -> bool {
        matches!(self, DaemonState::Stopped | DaemonState::Unknown)
    }

    pub fn is_busy(self) -> bool {
        matches!(self, DaemonState::Starting | DaemonState::Stopping)
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DaemonState::Unknown => "Unknown",
            DaemonState::Stopped => "Stopped",
            DaemonState::Starting => "Starting",
            DaemonState::Running => "Running",
            DaemonState::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

/// Operating mode of the managed instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Unknown,
    OpenShift,
    Podman,
}

impl Preset {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "openshift" => Preset::OpenShift,
            "podman" => Preset::Podman,
            _ => Preset::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != Preset::Unknown
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Preset::Unknown => "unknown",
            Preset::OpenShift => "openshift",
            Preset::Podman => "podman",
        };
        f.write_str(name)
    }
}

/// Raw `status` reply as the daemon sends it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReply {
    #[serde(rename = "CrcStatus", default)]
    pub crc_status: String,
    #[serde(rename = "Preset", default)]
    pub preset: String,
    #[serde(rename = "OpenshiftStatus", default)]
    pub openshift_status: Option<String>,
    #[serde(rename = "OpenshiftVersion", default)]
    pub openshift_version: Option<String>,
    #[serde(rename = "PodmanVersion", default)]
    pub podman_version: Option<String>,
    #[serde(rename = "DiskUse", default)]
    pub disk_use: Option<u64>,
    #[serde(rename = "DiskSize", default)]
    pub disk_size: Option<u64>,
}

/// Normalized status snapshot. One is produced per poll tick and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub state: DaemonState,
    pub preset: Preset,
    pub openshift_status: Option<String>,
    pub openshift_version: Option<String>,
    pub podman_version: Option<String>,
    pub disk_used: Option<u64>,
    pub disk_size: Option<u64>,
}

impl DaemonStatus {
    /// Synthetic snapshot published when the daemon cannot be reached.
    pub fn stopped() -> Self {
        DaemonStatus {
            state: DaemonState::Stopped,
            ..DaemonStatus::default()
        }
    }
}

impl From<StatusReply> for DaemonStatus {
    fn from(raw: StatusReply) -> Self {
        DaemonStatus {
            state: DaemonState::parse(&raw.crc_status),
            preset: Preset::parse(&raw.preset),
            openshift_status: raw.openshift_status.filter(|s| !s.is_empty()),
            openshift_version: raw.openshift_version.filter(|s| !s.is_empty()),
            podman_version: raw.podman_version.filter(|s| !s.is_empty()),
            disk_used: raw.disk_use,
            disk_size: raw.disk_size,
        }
    }
}

/// Console coordinates of a running cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(rename = "WebConsoleURL", default)]
    pub web_console_url: String,
    #[serde(rename = "KubeAdminPass", default)]
    pub kube_admin_pass: String,
    #[serde(rename = "ClusterAPI", default)]
    pub cluster_api: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConsoleUrlReply {
    #[serde(rename = "ClusterConfig", default)]
    pub cluster_config: ClusterConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartReply {
    #[serde(rename = "Started", alias = "KubeletStarted", default)]
    pub started: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopReply {
    #[serde(rename = "Stopped", default)]
    pub stopped: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteReply {
    #[serde(rename = "Deleted", default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LogsReply {
    #[serde(rename = "Messages", default)]
    pub messages: Vec<String>,
}

/// Daemon and bundle version information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionReply {
    #[serde(rename = "CrcVersion", default)]
    pub crc_version: String,
    #[serde(rename = "CommitSha", default)]
    pub commit_sha: String,
    #[serde(rename = "OpenshiftVersion", default)]
    pub openshift_version: String,
    #[serde(rename = "PodmanVersion", default)]
    pub podman_version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ConfigGetReply {
    #[serde(rename = "Configs", default)]
    pub configs: serde_json::Map<String, serde_json::Value>,
}
