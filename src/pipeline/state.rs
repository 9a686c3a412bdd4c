//! Cross-worker coordination for one run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Result cell plus the cooperative stop signals every worker polls.
///
/// The found password lives in a single-assignment cell: "found" means the
/// cell is set, so the flag and the password can never disagree and the
/// first successful write is the only one.
#[derive(Debug, Default)]
pub struct SharedSearchState {
    found: OnceLock<String>,
    cancel: Arc<AtomicBool>,
    halted: AtomicBool,
}

impl SharedSearchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State that also stops when the caller raises `cancel`.
    pub fn with_cancel(cancel: Arc<AtomicBool>) -> Self {
        Self {
            found: OnceLock::new(),
            cancel,
            halted: AtomicBool::new(false),
        }
    }

    /// Record `password` as the result.
    ///
    /// Returns `true` only for the one call that fills the cell. Callers
    /// that arrive after the cell is set skip the write entirely.
    pub fn try_record_match(&self, password: &str) -> bool {
        if self.found.get().is_some() {
            return false;
        }
        self.found.set(password.to_string()).is_ok()
    }

    pub fn is_found(&self) -> bool {
        self.found.get().is_some()
    }

    pub fn found_password(&self) -> Option<&str> {
        self.found.get().map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Mark the run as over; workers still running stop at their next candidate.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    /// Checked by workers before every probe.
    pub fn should_stop(&self) -> bool {
        self.is_found() || self.is_cancelled() || self.is_halted()
    }
}
