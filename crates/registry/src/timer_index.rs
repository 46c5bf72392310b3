use std::collections::HashMap;

use host_integration::TimerHandle;
use shared::domain::RequestKey;

/// Generation number tying a scheduled expiry to the index entry it was
/// created for. A callback holding a stale ticket must not touch the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerTicket(pub u64);

#[derive(Debug)]
pub struct ScheduledTimer {
    pub ticket: TimerTicket,
    pub handle: Box<dyn TimerHandle>,
}

impl ScheduledTimer {
    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

/// Maps `requester=>target` to the cancellable expiry of that request.
#[derive(Debug, Default)]
pub struct TimerIndex {
    entries: HashMap<RequestKey, ScheduledTimer>,
    next_ticket: u64,
}

impl TimerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_ticket(&mut self) -> TimerTicket {
        self.next_ticket += 1;
        TimerTicket(self.next_ticket)
    }

    /// Stores `handle` under `key`, returning whatever was there before.
    pub fn set_timeout(
        &mut self,
        key: RequestKey,
        ticket: TimerTicket,
        handle: Box<dyn TimerHandle>,
    ) -> Option<ScheduledTimer> {
        self.entries.insert(key, ScheduledTimer { ticket, handle })
    }

    pub fn get_timeout(&self, key: &RequestKey) -> Option<&ScheduledTimer> {
        self.entries.get(key)
    }

    pub fn delete_timeout(&mut self, key: &RequestKey) -> Option<ScheduledTimer> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (RequestKey, ScheduledTimer)> + '_ {
        self.entries.drain()
    }
}
