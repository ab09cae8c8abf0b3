//! Worker lifecycle state machine.
//!
//! ```text
//! Parsed ─► Installing ─► Installed ─► Activating ─► Activated
//!               │             │             │            │
//!               └─────────────┴─────────────┴────────────┴──► Redundant
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{SwError, SwResult};

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ServiceWorkerState {
    /// Script parsed, nothing run yet.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Failed or replaced.
    Redundant,
}

impl ServiceWorkerState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_become(self, next: ServiceWorkerState) -> bool {
        use ServiceWorkerState::*;
        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
                | (Installing | Installed | Activating | Activated, Redundant)
        )
    }
}

/// Current lifecycle position plus the skip-waiting flag.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: ServiceWorkerState,
    skip_waiting: bool,
}

impl Lifecycle {
    /// Current state.
    pub fn state(&self) -> ServiceWorkerState {
        self.state
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: ServiceWorkerState) -> SwResult<()> {
        if !self.state.can_become(next) {
            return Err(SwError::InvalidState(format!(
                "cannot go from {:?} to {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Ask to activate as soon as install finishes.
    pub fn request_skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// Installed and allowed to activate right away.
    pub fn ready_to_activate(&self) -> bool {
        self.state == ServiceWorkerState::Installed && self.skip_waiting
    }

    /// Move to `Activating` if ready. Only one caller ever gets `true`.
    pub fn begin_activation(&mut self) -> bool {
        if !self.ready_to_activate() {
            return false;
        }
        self.state = ServiceWorkerState::Activating;
        true
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    /// Check if redundant.
    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}
