//! Tracks user-initiated edits so background refreshes do not overwrite them.
//!
//! Each edit holds an [`InteractionToken`] for its whole duration, network calls
//! included. The guard stays busy while any token is alive and for a settle delay
//! after the last one is dropped.

use crate::domain::week_calendar::NowProvider;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct GuardState {
    active: usize,
    settle_until: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct InteractionGuard {
    state: Arc<Mutex<GuardState>>,
    settle_delay: Duration,
    now_provider: NowProvider,
}

impl fmt::Debug for InteractionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionGuard")
            .field("settle_delay", &self.settle_delay)
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl InteractionGuard {
    pub fn new(settle_delay: std::time::Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(GuardState::default())),
            settle_delay: Duration::from_std(settle_delay).unwrap_or(Duration::zero()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn begin(&self) -> InteractionToken {
        let mut state = lock(&self.state);
        state.active += 1;
        log::debug!("interaction started ({} active)", state.active);
        InteractionToken {
            guard: self.clone(),
        }
    }

    pub fn is_busy(&self) -> bool {
        let state = lock(&self.state);
        if state.active > 0 {
            return true;
        }
        state
            .settle_until
            .is_some_and(|until| (self.now_provider)() < until)
    }

    fn finish(&self) {
        let mut state = lock(&self.state);
        state.active = state.active.saturating_sub(1);
        if state.active == 0 {
            state.settle_until = Some((self.now_provider)() + self.settle_delay);
        }
        log::debug!("interaction finished ({} active)", state.active);
    }
}

fn lock(state: &Mutex<GuardState>) -> MutexGuard<'_, GuardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Proof that an edit is in flight; dropping it starts the settle window.
#[must_use = "the interaction ends as soon as the token is dropped"]
pub struct InteractionToken {
    guard: InteractionGuard,
}

impl fmt::Debug for InteractionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionToken").finish_non_exhaustive()
    }
}

impl Drop for InteractionToken {
    fn drop(&mut self) {
        self.guard.finish();
    }
}
