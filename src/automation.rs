// ===============================
// src/automation.rs
// ===============================
//
// Debounce FSM untuk aksi otomatis (auto-borrow, auto-trade):
//   Idle -> Processing(action) -> Cooldown(action, until) -> ...
// - selama Processing: semua aksi ditolak (cegah double-fire)
// - selama Cooldown: aksi yang sama ditolak sampai lewat `until_ms`,
//   aksi lain boleh jalan
// Dimutasi hanya dari alur pemanggil, jadi tidak perlu lock.
//
use std::future::Future;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metrics::AUTOMATION_BLOCKED;

pub const DEBOUNCE_MS: i64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationState {
    Idle,
    Processing { action: String },
    Cooldown { action: String, until_ms: i64 },
}

/// Pure gate: may `action` start at `now_ms`?
pub fn can_execute(state: &AutomationState, action: &str, now_ms: i64) -> bool {
    match state {
        AutomationState::Idle => true,
        AutomationState::Processing { .. } => false,
        AutomationState::Cooldown { action: last, until_ms } => last != action || now_ms > *until_ms,
    }
}

/// User toggles; both off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub auto_borrow: bool,
    pub auto_trade: bool,
}

#[derive(Debug)]
pub struct Automation {
    state: AutomationState,
    settings: AutomationSettings,
    debounce_ms: i64,
}

impl Default for Automation {
    fn default() -> Self {
        Self::new(AutomationSettings::default())
    }
}

impl Automation {
    pub fn new(settings: AutomationSettings) -> Self {
        Self { state: AutomationState::Idle, settings, debounce_ms: DEBOUNCE_MS }
    }

    pub fn with_debounce_ms(mut self, ms: i64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn state(&self) -> &AutomationState {
        &self.state
    }

    pub fn settings(&self) -> AutomationSettings {
        self.settings
    }

    pub fn toggle_auto_borrow(&mut self) -> bool {
        self.settings.auto_borrow = !self.settings.auto_borrow;
        self.settings.auto_borrow
    }

    pub fn toggle_auto_trade(&mut self) -> bool {
        self.settings.auto_trade = !self.settings.auto_trade;
        self.settings.auto_trade
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, AutomationState::Processing { .. })
    }

    pub fn can_execute(&self, action: &str, now_ms: i64) -> bool {
        can_execute(&self.state, action, now_ms)
    }

    pub fn begin(&mut self, action: &str, now_ms: i64) -> Result<()> {
        if !self.can_execute(action, now_ms) {
            AUTOMATION_BLOCKED.with_label_values(&[action]).inc();
            return Err(Error::Automation(format!("{action} blocked in state {:?}", self.state)));
        }
        debug!(action, "automation: processing");
        self.state = AutomationState::Processing { action: action.to_string() };
        Ok(())
    }

    /// Success starts the cooldown for the action that was running.
    pub fn finish(&mut self, now_ms: i64) {
        if let AutomationState::Processing { action } = &self.state {
            self.state = AutomationState::Cooldown {
                action: action.clone(),
                until_ms: now_ms + self.debounce_ms,
            };
        }
    }

    /// Failure releases the gate without a cooldown so the user can retry.
    pub fn fail(&mut self) {
        if self.is_processing() {
            self.state = AutomationState::Idle;
        }
    }

    /// begin -> run -> finish/fail, using wall-clock time.
    pub async fn run<F, T>(&mut self, action: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.begin(action, Utc::now().timestamp_millis())?;
        match fut.await {
            Ok(v) => {
                self.finish(Utc::now().timestamp_millis());
                Ok(v)
            }
            Err(e) => {
                warn!(action, error = %e, "automation: action failed");
                self.fail();
                Err(e)
            }
        }
    }
}
