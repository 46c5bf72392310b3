use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{runtime::Handle, task::JoinHandle};
use tracing::trace;

use crate::{Deferred, Scheduler, TimerHandle};

/// Wall-clock scheduler backed by tokio tasks. Cancelling aborts the task.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Binds to the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Deferred) -> Box<dyn TimerHandle> {
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        Box::new(TokioTimer { join })
    }
}

#[derive(Debug)]
struct TokioTimer {
    join: JoinHandle<()>,
}

impl TimerHandle for TokioTimer {
    fn cancel(&self) {
        self.join.abort();
    }
}

type SlotKey = (Duration, u64);

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<SlotKey, Deferred>,
}

/// Scheduler driven by an explicit clock.
///
/// Nothing fires until the host calls [`ManualScheduler::advance`], which makes
/// it suitable for tick-based game loops and for tests. Due tasks run in
/// deadline order, ties broken by scheduling order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Moves the clock forward by `by` and runs every task that became due.
    /// Returns how many tasks ran.
    pub async fn advance(&self, by: Duration) -> usize {
        let deadline = {
            let mut state = self.lock();
            state.now += by;
            state.now
        };

        let mut fired = 0;
        while let Some(task) = self.pop_due(deadline) {
            task.await;
            fired += 1;
        }
        trace!(fired, now = ?deadline, "manual scheduler advanced");
        fired
    }

    fn pop_due(&self, deadline: Duration) -> Option<Deferred> {
        let mut state = self.lock();
        let key = state
            .pending
            .keys()
            .next()
            .copied()
            .filter(|(due, _)| *due <= deadline)?;
        state.pending.remove(&key)
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Deferred) -> Box<dyn TimerHandle> {
        let mut state = self.lock();
        let slot = (state.now + delay, state.next_id);
        state.next_id += 1;
        state.pending.insert(slot, task);
        Box::new(ManualTimer {
            state: Arc::downgrade(&self.state),
            slot,
        })
    }
}

#[derive(Debug)]
struct ManualTimer {
    state: Weak<Mutex<ManualState>>,
    slot: SlotKey,
}

impl TimerHandle for ManualTimer {
    fn cancel(&self) {
        if let Some(state) = self.state.upgrade() {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pending
                .remove(&self.slot);
        }
    }
}
