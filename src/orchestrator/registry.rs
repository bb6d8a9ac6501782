//! Registry of waves currently executing in this process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct RunningWaves {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl RunningWaves {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `wave_id`. Returns `None` if it is already running.
    pub fn claim(&self, wave_id: &str) -> Option<RunGuard> {
        if !self.lock().insert(wave_id.to_string()) {
            return None;
        }
        Some(RunGuard {
            waves: self.clone(),
            wave_id: wave_id.to_string(),
        })
    }

    pub fn is_running(&self, wave_id: &str) -> bool {
        self.lock().contains(wave_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its wave id when dropped.
#[derive(Debug)]
pub struct RunGuard {
    waves: RunningWaves,
    wave_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.waves.lock().remove(&self.wave_id);
    }
}
