//! Capabilities the teleport workflow borrows from its host environment.
//!
//! The workflow never talks to sessions, chat or the game clock directly. It
//! goes through the traits in this crate, which the host implements.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::BoxFuture;
use shared::{
    domain::{Location, ParticipantName},
    protocol::Notice,
};

mod scheduler;

pub use scheduler::{ManualScheduler, TokioScheduler};

/// Work to run once a scheduled delay has elapsed.
pub type Deferred = BoxFuture<'static, ()>;

/// Cancellable reference to one scheduled [`Deferred`].
///
/// Once `cancel` returns, the deferred work must not start. Cancelling a timer
/// that already fired, or cancelling twice, is a no-op.
pub trait TimerHandle: fmt::Debug + Send + Sync {
    fn cancel(&self);
}

pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Deferred) -> Box<dyn TimerHandle>;
}

#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// Every currently connected participant, in join order.
    async fn participant_names(&self) -> Vec<ParticipantName>;

    /// Resolves a name to the live session's location, `None` if disconnected.
    async fn location_of(&self, name: &ParticipantName) -> Option<Location>;

    async fn is_online(&self, name: &ParticipantName) -> bool {
        self.location_of(name).await.is_some()
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &ParticipantName, notice: Notice);
}

#[async_trait]
pub trait Teleporter: Send + Sync {
    async fn teleport(&self, who: &ParticipantName, destination: &Location) -> anyhow::Result<()>;
}

/// Bundle of host capabilities handed to the workflow at construction time.
#[derive(Clone)]
pub struct HostServices {
    pub directory: Arc<dyn ParticipantDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub teleporter: Arc<dyn Teleporter>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
