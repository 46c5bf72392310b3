//! Pending teleport requests and the timers that expire them.
//!
//! The registry is plain synchronous state. It never talks to the host; the
//! workflow layer wraps it in a lock and drives it.

use std::collections::HashMap;

use host_integration::TimerHandle;
use shared::domain::{ParticipantName, RequestKey};
use tracing::{debug, warn};

mod timer_index;

pub use timer_index::{ScheduledTimer, TimerIndex, TimerTicket};

/// Per-target sets of requesters, plus the expiry timer of every request.
///
/// A target with no entry has no pending requests. Sets keep insertion order
/// and never hold the same requester twice.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    pending: HashMap<ParticipantName, Vec<ParticipantName>>,
    timers: TimerIndex,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requesters waiting on `target`, oldest first.
    pub fn get_request_list(&self, target: &ParticipantName) -> &[ParticipantName] {
        self.pending
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_request(&self, target: &ParticipantName, requester: &ParticipantName) -> bool {
        self.get_request_list(target).contains(requester)
    }

    pub fn get_request_count(&self, target: &ParticipantName) -> usize {
        self.get_request_list(target).len()
    }

    /// Appends `requester` to `target`'s set. No-op if already present.
    pub fn add_request(&mut self, target: &ParticipantName, requester: &ParticipantName) {
        self.try_add_request(target, requester);
    }

    /// Adds the request unless it is already pending. Returns `true` only when
    /// the request was newly added.
    pub fn try_add_request(&mut self, target: &ParticipantName, requester: &ParticipantName) -> bool {
        let requesters = self.pending.entry(target.clone()).or_default();
        if requesters.contains(requester) {
            return false;
        }
        requesters.push(requester.clone());
        true
    }

    /// Removes `requester` from `target`'s set. Returns whether it was there.
    pub fn remove_request(&mut self, target: &ParticipantName, requester: &ParticipantName) -> bool {
        let Some(requesters) = self.pending.get_mut(target) else {
            return false;
        };
        let Some(position) = requesters.iter().position(|name| name == requester) else {
            return false;
        };
        requesters.remove(position);
        if requesters.is_empty() {
            self.pending.remove(target);
        }
        true
    }

    /// Number of pending requests across every target.
    pub fn pending_total(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn timers(&self) -> &TimerIndex {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerIndex {
        &mut self.timers
    }

    /// Records the expiry timer of a request that was just added.
    pub fn track_timer(&mut self, key: RequestKey, ticket: TimerTicket, handle: Box<dyn TimerHandle>) {
        if let Some(previous) = self.timers.set_timeout(key.clone(), ticket, handle) {
            warn!(%key, "replacing an existing request timer");
            previous.cancel();
        }
    }

    /// Acceptance path: retires the request and cancels its timer so the
    /// expiry never runs.
    pub fn resolve(&mut self, key: &RequestKey) -> bool {
        let removed = self.remove_request(&key.target, &key.requester);
        if let Some(timer) = self.timers.delete_timeout(key) {
            timer.cancel();
        }
        removed
    }

    /// Expiry path, called from the fired timer. Only acts if `ticket` is still
    /// the live timer for `key`; a timer that fires after its request was
    /// resolved or replaced is ignored.
    pub fn expire(&mut self, key: &RequestKey, ticket: TimerTicket) -> bool {
        match self.timers.get_timeout(key) {
            Some(timer) if timer.ticket == ticket => {}
            _ => {
                debug!(%key, ?ticket, "ignoring stale request timer");
                return false;
            }
        }
        self.timers.delete_timeout(key);
        self.remove_request(&key.target, &key.requester);
        true
    }

    /// Drops every request sent by or to `name` and cancels their timers.
    pub fn invalidate_participant(&mut self, name: &ParticipantName) -> Vec<RequestKey> {
        let mut retired: Vec<RequestKey> = self
            .pending
            .remove(name)
            .unwrap_or_default()
            .into_iter()
            .map(|requester| RequestKey {
                requester,
                target: name.clone(),
            })
            .collect();

        for (target, requesters) in self.pending.iter_mut() {
            if let Some(position) = requesters.iter().position(|requester| requester == name) {
                requesters.remove(position);
                retired.push(RequestKey {
                    requester: name.clone(),
                    target: target.clone(),
                });
            }
        }
        self.pending.retain(|_, requesters| !requesters.is_empty());

        for key in &retired {
            if let Some(timer) = self.timers.delete_timeout(key) {
                timer.cancel();
            }
        }
        retired
    }

    /// Empties every set and cancels every timer.
    pub fn clear_all_requests(&mut self) {
        self.pending.clear();
        for (_, timer) in self.timers.drain() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
