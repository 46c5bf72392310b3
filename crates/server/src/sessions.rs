use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use host_integration::{HostServices, Notifier, ParticipantDirectory, Scheduler, Teleporter};
use shared::{
    domain::{Location, ParticipantName},
    protocol::{Notice, ServerEvent},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct Session {
    name: ParticipantName,
    location: Location,
}

/// Live participant sessions of this server. Sessions are kept in join order.
#[derive(Clone)]
pub(crate) struct SessionHub {
    sessions: Arc<RwLock<Vec<Session>>>,
    events: broadcast::Sender<ServerEvent>,
}

impl SessionHub {
    pub(crate) fn new(events: broadcast::Sender<ServerEvent>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
            events,
        }
    }

    pub(crate) fn host_services(&self, scheduler: Arc<dyn Scheduler>) -> HostServices {
        let hub = Arc::new(self.clone());
        HostServices {
            directory: hub.clone(),
            notifier: hub.clone(),
            teleporter: hub,
            scheduler,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Returns `false` if a session with that name already exists.
    pub(crate) async fn join(&self, name: ParticipantName, location: Location) -> bool {
        {
            let mut sessions = self.sessions.write().await;
            if sessions.iter().any(|session| session.name == name) {
                return false;
            }
            sessions.push(Session {
                name: name.clone(),
                location,
            });
        }
        info!(participant = %name, "participant joined");
        let _ = self.events.send(ServerEvent::ParticipantJoined { name });
        true
    }

    pub(crate) async fn leave(&self, name: &ParticipantName) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|session| &session.name != name);
            sessions.len() != before
        };
        if removed {
            info!(participant = %name, "participant left");
            let _ = self
                .events
                .send(ServerEvent::ParticipantLeft { name: name.clone() });
        }
        removed
    }

    pub(crate) async fn move_to(&self, name: &ParticipantName, location: Location) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.iter_mut().find(|session| &session.name == name) {
            Some(session) => {
                session.location = location;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ParticipantDirectory for SessionHub {
    async fn participant_names(&self) -> Vec<ParticipantName> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|session| session.name.clone())
            .collect()
    }

    async fn location_of(&self, name: &ParticipantName) -> Option<Location> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|session| &session.name == name)
            .map(|session| session.location.clone())
    }
}

#[async_trait]
impl Notifier for SessionHub {
    async fn notify(&self, recipient: &ParticipantName, notice: Notice) {
        // No subscribers is not an error; the participant simply isn't listening.
        if self
            .events
            .send(ServerEvent::Notice {
                recipient: recipient.clone(),
                notice,
                sent_at: Utc::now(),
            })
            .is_err()
        {
            debug!(%recipient, "notice dropped, no listeners");
        }
    }
}

#[async_trait]
impl Teleporter for SessionHub {
    async fn teleport(&self, who: &ParticipantName, destination: &Location) -> anyhow::Result<()> {
        if !self.move_to(who, destination.clone()).await {
            return Err(anyhow!("participant {who} is not connected"));
        }
        self.notify(
            who,
            Notice::Teleported {
                destination: destination.clone(),
            },
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> SessionHub {
        let (events, _) = broadcast::channel(16);
        SessionHub::new(events)
    }

    #[tokio::test]
    async fn duplicate_names_cannot_join() {
        let hub = hub();
        let spawn = Location::new("overworld", 0.0, 64.0, 0.0);
        assert!(hub.join(ParticipantName::from("Alice"), spawn.clone()).await);
        assert!(!hub.join(ParticipantName::from("Alice"), spawn).await);
        assert_eq!(hub.participant_names().await.len(), 1);
    }

    #[tokio::test]
    async fn teleport_moves_participant_and_notifies_them() {
        let hub = hub();
        let mut events = hub.subscribe();
        let alice = ParticipantName::from("Alice");
        hub.join(alice.clone(), Location::new("overworld", 0.0, 64.0, 0.0))
            .await;
        let destination = Location::new("nether", 8.0, 32.0, 8.0);

        hub.teleport(&alice, &destination).await.expect("teleport");

        assert_eq!(hub.location_of(&alice).await, Some(destination.clone()));
        assert!(matches!(
            events.recv().await.expect("joined"),
            ServerEvent::ParticipantJoined { .. }
        ));
        match events.recv().await.expect("notice") {
            ServerEvent::Notice {
                recipient, notice, ..
            } => {
                assert_eq!(recipient, alice);
                assert_eq!(notice, Notice::Teleported { destination });
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn teleporting_a_missing_participant_fails() {
        let hub = hub();
        let result = hub
            .teleport(
                &ParticipantName::from("Ghost"),
                &Location::new("overworld", 0.0, 0.0, 0.0),
            )
            .await;
        assert!(result.is_err());
    }
}
