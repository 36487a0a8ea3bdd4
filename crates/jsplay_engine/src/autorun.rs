//! Debounced auto-run.
//!
//! Every change aborts the pending timer and starts a new one, so at most one
//! auto-run is ever waiting. Once the timer fires the run is detached: a later
//! change supersedes it through its job ticket instead of aborting it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::task::JoinHandle;

use crate::EngineError;
use crate::playground::Playground;

#[derive(Debug)]
pub struct AutoRunScheduler {
    enabled: AtomicBool,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutoRunScheduler {
    pub fn new(enabled: bool, debounce: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            debounce,
            pending: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Disabling also drops a pending timer
    pub fn set_enabled(&self, enabled: bool) {
        debug!("auto-run {}", if enabled { "enabled" } else { "disabled" });
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.abort_pending();
        }
    }

    /// Whether a timer is waiting to fire
    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn abort_pending(&self) {
        if let Some(task) = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }

    pub(crate) fn schedule(&self, playground: Playground, source: String) -> Result<(), EngineError> {
        if !self.is_enabled() {
            trace!("auto-run disabled, ignoring change");
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let debounce = self.debounce;
        let task = runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            tokio::spawn(async move {
                if let Err(e) = playground.auto_run(&source).await {
                    warn!("auto-run failed: {e}");
                }
            });
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
        Ok(())
    }
}
