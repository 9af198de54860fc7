//! Envelope protocol spoken on the shell control socket.
//!
//! Renderer shells send command envelopes in and receive pushed events out,
//! one JSON object per line in both directions.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Named auxiliary surfaces owned by the window registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Surface {
    Status,
    Logs,
    Configuration,
    PodmanConsole,
    PullSecret,
    About,
    Onboarding,
}

impl Surface {
    /// Surfaces created hidden when normal operation begins. Onboarding is
    /// created lazily, only on the first-run path.
    pub const STANDARD: [Surface; 6] = [
        Surface::Status,
        Surface::Logs,
        Surface::Configuration,
        Surface::PodmanConsole,
        Surface::PullSecret,
        Surface::About,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Surface::Status => "status",
            Surface::Logs => "logs",
            Surface::Configuration => "configuration",
            Surface::PodmanConsole => "podman-console",
            Surface::PullSecret => "pull-secret",
            Surface::About => "about",
            Surface::Onboarding => "onboarding",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One message on the shell socket, either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub msg_type: String,
    pub msg_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<Surface>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Envelope {
    pub fn new(msg_type: &str, payload: Value) -> Self {
        Envelope {
            msg_type: msg_type.to_string(),
            msg_id: Uuid::new_v4().to_string(),
            surface: None,
            payload,
        }
    }

    pub fn for_surface(msg_type: &str, surface: Surface, payload: Value) -> Self {
        Envelope {
            surface: Some(surface),
            ..Envelope::new(msg_type, payload)
        }
    }
}
