//! Window registry: exclusive owner of every auxiliary surface handle.
//!
//! Surfaces are created hidden and live for the whole process; a user close
//! request is answered with "hide instead" so surface state survives
//! show/hide cycles. Destruction happens only during the shutdown sequence,
//! plus the one sanctioned exception: the pull-secret surface is recreated
//! whenever its modality has to flip.

use std::collections::HashMap;

use tracing::debug;

use crate::proto::Surface;

/// Answer to a surface close request (two-phase close protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Hide the surface and keep its state.
    HideInstead,
    /// Destruction may proceed.
    Proceed,
}

/// Per-surface state that survives show/hide cycles.
#[derive(Debug)]
struct WindowHandle {
    visible: bool,
    modal: bool,
    retained: Vec<String>,
}

impl WindowHandle {
    fn new(modal: bool) -> Self {
        WindowHandle {
            visible: false,
            modal,
            retained: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct WindowRegistry {
    windows: HashMap<Surface, WindowHandle>,
    shutting_down: bool,
}

impl WindowRegistry {
    pub fn new() -> Self {
        WindowRegistry::default()
    }

    /// Create a surface hidden. Creating an already-present surface is a
    /// no-op; handles are never replaced behind a holder's back.
    pub fn create_hidden(&mut self, surface: Surface) {
        self.windows
            .entry(surface)
            .or_insert_with(|| WindowHandle::new(false));
    }

    /// Create the full set of normal-operation surfaces, all hidden; the
    /// pull-secret surface starts modeless (parented to configuration).
    pub fn create_standard_set(&mut self) {
        for surface in Surface::STANDARD {
            self.create_hidden(surface);
        }
    }

    pub fn exists(&self, surface: Surface) -> bool {
        self.windows.contains_key(&surface)
    }

    pub fn is_visible(&self, surface: Surface) -> bool {
        self.windows
            .get(&surface)
            .map(|handle| handle.visible)
            .unwrap_or(false)
    }

    pub fn is_modal(&self, surface: Surface) -> bool {
        self.windows
            .get(&surface)
            .map(|handle| handle.modal)
            .unwrap_or(false)
    }

    pub fn show(&mut self, surface: Surface) -> bool {
        match self.windows.get_mut(&surface) {
            Some(handle) => {
                handle.visible = true;
                true
            }
            None => false,
        }
    }

    pub fn hide(&mut self, surface: Surface) -> bool {
        match self.windows.get_mut(&surface) {
            Some(handle) => {
                handle.visible = false;
                true
            }
            None => false,
        }
    }

    /// First phase of the close protocol: may this surface close?
    /// "Hide instead" for everything while the process is running; closes
    /// proceed uniformly once the shutdown sequence has begun.
    pub fn request_close(&mut self, surface: Surface) -> CloseDecision {
        if self.shutting_down || !self.windows.contains_key(&surface) {
            CloseDecision::Proceed
        } else {
            CloseDecision::HideInstead
        }
    }

    pub fn begin_shutdown(&mut self) {
        self.shutting_down = true;
    }

    /// Destroy a handle. Idempotent: destroying an absent surface is fine.
    pub fn destroy(&mut self, surface: Surface) -> bool {
        let existed = self.windows.remove(&surface).is_some();
        if existed {
            debug!(surface = %surface, "window destroyed");
        }
        existed
    }

    pub fn destroy_all(&mut self) {
        for surface in self.windows.keys().copied().collect::<Vec<_>>() {
            self.destroy(surface);
        }
    }

    /// Append a line to the surface's retained state so it can be replayed
    /// after the next show.
    pub fn retain_line(&mut self, surface: Surface, line: &str) {
        if let Some(handle) = self.windows.get_mut(&surface) {
            handle.retained.push(line.to_string());
        }
    }

    pub fn retained(&self, surface: Surface) -> Vec<String> {
        self.windows
            .get(&surface)
            .map(|handle| handle.retained.clone())
            .unwrap_or_default()
    }

    /// Make the pull-secret surface modal or modeless. A mismatch destroys
    /// the existing handle and creates a fresh one with the requested
    /// parenting; returns whether a recreation happened.
    pub fn ensure_pull_secret_modality(&mut self, modal: bool) -> bool {
        if let Some(handle) = self.windows.get(&Surface::PullSecret) {
            if handle.modal == modal {
                return false;
            }
            debug!(modal, "pull-secret window recreated with new parenting");
        }
        self.windows
            .insert(Surface::PullSecret, WindowHandle::new(modal));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_request_is_answered_with_hide_and_state_survives() {
        let mut registry = WindowRegistry::new();
        registry.create_hidden(Surface::Logs);
        registry.show(Surface::Logs);
        registry.retain_line(Surface::Logs, "line one");
        registry.retain_line(Surface::Logs, "line two");

        assert_eq!(registry.request_close(Surface::Logs), CloseDecision::HideInstead);
        registry.hide(Surface::Logs);
        assert!(!registry.is_visible(Surface::Logs));

        registry.show(Surface::Logs);
        assert!(registry.is_visible(Surface::Logs));
        assert_eq!(registry.retained(Surface::Logs), vec!["line one", "line two"]);
    }

    #[test]
    fn closes_proceed_uniformly_during_shutdown() {
        let mut registry = WindowRegistry::new();
        registry.create_standard_set();
        registry.begin_shutdown();
        for surface in Surface::STANDARD {
            assert_eq!(registry.request_close(surface), CloseDecision::Proceed);
        }
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut registry = WindowRegistry::new();
        registry.create_hidden(Surface::About);
        assert!(registry.destroy(Surface::About));
        assert!(!registry.destroy(Surface::About));
        registry.destroy_all();
        registry.destroy_all();
    }

    #[test]
    fn create_hidden_never_replaces_an_existing_handle() {
        let mut registry = WindowRegistry::new();
        registry.create_hidden(Surface::Status);
        registry.retain_line(Surface::Status, "kept");
        registry.create_hidden(Surface::Status);
        assert_eq!(registry.retained(Surface::Status), vec!["kept"]);
    }

    #[test]
    fn pull_secret_modality_flip_recreates_the_handle() {
        let mut registry = WindowRegistry::new();
        registry.create_standard_set();
        registry.retain_line(Surface::PullSecret, "draft secret");

        assert!(!registry.ensure_pull_secret_modality(false));
        assert_eq!(registry.retained(Surface::PullSecret), vec!["draft secret"]);

        assert!(registry.ensure_pull_secret_modality(true));
        assert!(registry.is_modal(Surface::PullSecret));
        assert!(registry.retained(Surface::PullSecret).is_empty());
        assert!(!registry.is_visible(Surface::PullSecret));

        assert!(!registry.ensure_pull_secret_modality(true));
    }
}
