//! Network activity tracking for idle detection.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct ActivityState {
    inflight: HashSet<String>,
    /// Requests reported done before their start was seen
    finished_early: HashSet<String>,
    /// When the in-flight count last dropped to the watched threshold.
    quiet_since: Option<Instant>,
    max_inflight: usize,
}

/// Counts requests in flight and how long the page has been quiet.
///
/// "Quiet" means at most `max_inflight` requests are outstanding.
#[derive(Debug)]
pub struct NetworkActivity {
    state: Mutex<ActivityState>,
}

impl NetworkActivity {
    pub fn new(max_inflight: usize, now: Instant) -> Self {
        Self {
            state: Mutex::new(ActivityState {
                inflight: HashSet::new(),
                finished_early: HashSet::new(),
                quiet_since: Some(now),
                max_inflight,
            }),
        }
    }

    pub fn request_started(&self, request_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.finished_early.remove(request_id) {
            return;
        }
        state.inflight.insert(request_id.to_string());
        if state.inflight.len() > state.max_inflight {
            state.quiet_since = None;
        }
    }

    /// A request finished or failed.
    pub fn request_done(&self, request_id: &str, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.inflight.remove(request_id) {
            state.finished_early.insert(request_id.to_string());
            return;
        }
        if state.inflight.len() <= state.max_inflight && state.quiet_since.is_none() {
            state.quiet_since = Some(now);
        }
    }

    pub fn inflight(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .inflight
            .len()
    }

    /// Quiet for at least `quiet` as of `now`.
    pub fn is_idle(&self, quiet: Duration, now: Instant) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .quiet_since
            .is_some_and(|since| now.saturating_duration_since(since) >= quiet)
    }
}
