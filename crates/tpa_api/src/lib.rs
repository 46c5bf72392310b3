//! The teleport request workflow: sending, accepting and expiring requests on
//! top of the [`RequestRegistry`] and the host's capabilities.

use std::{sync::Arc, time::Duration};

use host_integration::{Deferred, HostServices};
use registry::{RequestRegistry, TimerTicket};
use shared::{
    domain::{CommandOrigin, MenuChoice, ParticipantName, RequestKey},
    error::TpaError,
    protocol::{AcceptMenu, MainMenu, Notice, SendMenu},
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

#[derive(Clone)]
pub struct TeleportService {
    registry: Arc<Mutex<RequestRegistry>>,
    host: HostServices,
    request_timeout: Duration,
}

impl TeleportService {
    pub fn new(host: HostServices, request_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(RequestRegistry::new())),
            host,
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Entry point of the `tpa` command.
    pub async fn open_menu(&self, origin: &CommandOrigin) -> Result<MainMenu, TpaError> {
        let CommandOrigin::Participant(participant) = origin else {
            return Err(TpaError::InvalidOrigin);
        };
        self.ensure_online_origin(participant).await?;
        Ok(MainMenu {
            participant: participant.clone(),
            choices: vec![MenuChoice::SendRequest, MenuChoice::AcceptRequest],
        })
    }

    pub async fn send_menu(&self, sender: &ParticipantName) -> Result<SendMenu, TpaError> {
        self.ensure_online_origin(sender).await?;
        let candidates: Vec<ParticipantName> = self
            .host
            .directory
            .participant_names()
            .await
            .into_iter()
            .filter(|name| name != sender)
            .collect();
        if candidates.is_empty() {
            return Err(TpaError::NoEligibleTargets);
        }
        Ok(SendMenu {
            sender: sender.clone(),
            candidates,
        })
    }

    #[instrument(skip_all, fields(%sender, %target))]
    pub async fn send_request(
        &self,
        sender: &ParticipantName,
        target: &ParticipantName,
    ) -> Result<(), TpaError> {
        self.ensure_online_origin(sender).await?;
        if sender == target {
            return Err(TpaError::SelfRequest);
        }
        self.ensure_online_target(target).await?;

        let key = RequestKey {
            requester: sender.clone(),
            target: target.clone(),
        };
        {
            let mut registry = self.registry.lock().await;
            // Either party may have left while we waited for the lock. Hosts
            // call `participant_left` after the session is gone, so checking
            // again here means a departure is never missed.
            self.ensure_online_origin(sender).await?;
            self.ensure_online_target(target).await?;
            if !registry.try_add_request(target, sender) {
                debug!(%key, "duplicate teleport request rejected");
                return Err(TpaError::DuplicateRequest {
                    target: target.clone(),
                });
            }
            self.arm_expiry(&mut registry, key.clone());
        }
        info!(%key, timeout_secs = self.request_timeout.as_secs(), "teleport request sent");

        self.host
            .notifier
            .notify(
                sender,
                Notice::RequestSent {
                    target: target.clone(),
                },
            )
            .await;
        self.host
            .notifier
            .notify(
                target,
                Notice::RequestReceived {
                    requester: sender.clone(),
                    expires_in_secs: self.request_timeout.as_secs(),
                },
            )
            .await;
        Ok(())
    }

    // The timer is tracked before the caller releases the lock, so its
    // callback always finds the entry it was created for.
    fn arm_expiry(&self, registry: &mut RequestRegistry, key: RequestKey) {
        let ticket = registry.timers_mut().next_ticket();
        let handle = self
            .host
            .scheduler
            .schedule(self.request_timeout, self.expiry_task(key.clone(), ticket));
        registry.track_timer(key, ticket, handle);
    }

    // Expiry is silent: neither party is told.
    fn expiry_task(&self, key: RequestKey, ticket: TimerTicket) -> Deferred {
        let registry = Arc::clone(&self.registry);
        Box::pin(async move {
            if registry.lock().await.expire(&key, ticket) {
                info!(%key, "teleport request expired");
            }
        })
    }

    pub async fn accept_menu(&self, target: &ParticipantName) -> Result<AcceptMenu, TpaError> {
        self.ensure_online_origin(target).await?;
        let requesters = self.pending_requests(target).await;
        if requesters.is_empty() {
            return Err(TpaError::NoPendingRequests);
        }
        Ok(AcceptMenu {
            target: target.clone(),
            requesters,
        })
    }

    /// Accepts the entry at `selection` of a previously rendered menu.
    pub async fn accept_selection(&self, menu: &AcceptMenu, selection: usize) -> Result<(), TpaError> {
        let requester = menu.resolve(selection)?;
        self.accept_request(&menu.target, requester).await
    }

    /// Accepts a pending request and moves the requester to `target`.
    ///
    /// The request is retired under the registry lock before the transfer
    /// starts, so a concurrent accept of the same pair sees `ExpiredRequest`.
    /// The transfer itself runs without the lock. If it fails the request is
    /// put back with a fresh timeout, provided both parties are still online.
    #[instrument(skip_all, fields(%target, %requester))]
    pub async fn accept_request(
        &self,
        target: &ParticipantName,
        requester: &ParticipantName,
    ) -> Result<(), TpaError> {
        let destination = self
            .host
            .directory
            .location_of(target)
            .await
            .ok_or(TpaError::InvalidOrigin)?;
        let key = RequestKey {
            requester: requester.clone(),
            target: target.clone(),
        };

        {
            let mut registry = self.registry.lock().await;
            if !registry.has_request(target, requester) {
                return Err(TpaError::ExpiredRequest {
                    requester: requester.clone(),
                });
            }
            let requester_online = self.host.directory.is_online(requester).await;
            registry.resolve(&key);
            if !requester_online {
                warn!(%key, "requester disconnected before acceptance");
                return Err(TpaError::UnknownParticipant {
                    name: requester.clone(),
                });
            }
        }

        if let Err(error) = self.host.teleporter.teleport(requester, &destination).await {
            let reason = format!("{error:#}");
            warn!(%key, %reason, "teleport transfer failed");
            self.restore_request(key).await;
            return Err(TpaError::TransferFailed { reason });
        }
        info!(%key, %destination, "teleport request accepted");

        self.host
            .notifier
            .notify(
                target,
                Notice::RequestAccepted {
                    requester: requester.clone(),
                },
            )
            .await;
        self.host
            .notifier
            .notify(
                requester,
                Notice::AcceptedByTarget {
                    target: target.clone(),
                },
            )
            .await;
        Ok(())
    }

    async fn restore_request(&self, key: RequestKey) {
        let mut registry = self.registry.lock().await;
        if !self.host.directory.is_online(&key.requester).await
            || !self.host.directory.is_online(&key.target).await
        {
            debug!(%key, "not restoring request, a participant left during transfer");
            return;
        }
        if registry.try_add_request(&key.target, &key.requester) {
            self.arm_expiry(&mut registry, key);
        }
    }

    /// Retires every request sent by or to a participant who left. Returns how
    /// many requests were dropped.
    pub async fn participant_left(&self, name: &ParticipantName) -> usize {
        let retired = self.registry.lock().await.invalidate_participant(name);
        if !retired.is_empty() {
            info!(participant = %name, count = retired.len(), "dropped requests of departed participant");
        }
        retired.len()
    }

    pub async fn pending_requests(&self, target: &ParticipantName) -> Vec<ParticipantName> {
        self.registry.lock().await.get_request_list(target).to_vec()
    }

    pub async fn has_request(&self, target: &ParticipantName, requester: &ParticipantName) -> bool {
        self.registry.lock().await.has_request(target, requester)
    }

    pub async fn request_count(&self, target: &ParticipantName) -> usize {
        self.registry.lock().await.get_request_count(target)
    }

    pub async fn has_timer(&self, key: &RequestKey) -> bool {
        self.registry.lock().await.timers().contains(key)
    }

    /// Administrative reset, not part of the request flow.
    pub async fn clear_all_requests(&self) {
        self.registry.lock().await.clear_all_requests();
        warn!("all teleport requests cleared");
    }

    async fn ensure_online_origin(&self, name: &ParticipantName) -> Result<(), TpaError> {
        if self.host.directory.is_online(name).await {
            Ok(())
        } else {
            Err(TpaError::InvalidOrigin)
        }
    }

    async fn ensure_online_target(&self, name: &ParticipantName) -> Result<(), TpaError> {
        if self.host.directory.is_online(name).await {
            Ok(())
        } else {
            Err(TpaError::UnknownParticipant { name: name.clone() })
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
