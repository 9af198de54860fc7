//! Yes/no confirmation seam.
//!
//! Destructive steps (instance delete, abandoning a running onboarding) go
//! through this trait so the flows stay testable without a terminal.

use dialoguer::Confirm as DialoguerConfirm;
use tracing::debug;

pub trait Confirm: Send + Sync {
    /// Returns true only on an explicit "yes"; any failure to ask counts as
    /// a decline.
    fn confirm(&self, title: &str, message: &str) -> bool;
}

/// Interactive prompt on the controlling terminal.
pub struct InteractivePrompt;

impl Confirm for InteractivePrompt {
    fn confirm(&self, title: &str, message: &str) -> bool {
        match DialoguerConfirm::new()
            .with_prompt(format!("{title}: {message}"))
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(err) => {
                debug!(error = %err, "confirmation prompt unavailable, declining");
                false
            }
        }
    }
}
