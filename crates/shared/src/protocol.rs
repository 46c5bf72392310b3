use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Location, MenuChoice, ParticipantName},
    error::TpaError,
};

/// A message addressed to a single participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notice {
    RequestSent {
        target: ParticipantName,
    },
    RequestReceived {
        requester: ParticipantName,
        expires_in_secs: u64,
    },
    RequestAccepted {
        requester: ParticipantName,
    },
    AcceptedByTarget {
        target: ParticipantName,
    },
    Teleported {
        destination: Location,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Notice {
        recipient: ParticipantName,
        notice: Notice,
        sent_at: DateTime<Utc>,
    },
    ParticipantJoined {
        name: ParticipantName,
    },
    ParticipantLeft {
        name: ParticipantName,
    },
}

impl ServerEvent {
    /// Whether `name` should see this event on their stream.
    pub fn is_visible_to(&self, name: &ParticipantName) -> bool {
        match self {
            Self::Notice { recipient, .. } => recipient == name,
            Self::ParticipantJoined { .. } | Self::ParticipantLeft { .. } => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub name: ParticipantName,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub location: Location,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenuRequest {
    #[serde(default)]
    pub origin: Option<ParticipantName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainMenu {
    pub participant: ParticipantName,
    pub choices: Vec<MenuChoice>,
}

/// Everyone the sender could ask to teleport to, in directory order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMenu {
    pub sender: ParticipantName,
    pub candidates: Vec<ParticipantName>,
}

impl SendMenu {
    pub fn resolve(&self, selection: usize) -> Result<&ParticipantName, TpaError> {
        resolve_selection(&self.candidates, selection)
    }
}

/// Snapshot of the requests waiting on `target` at the time it was built.
///
/// An index into the snapshot only picks a name. Whether that request is still
/// pending is checked again when it is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptMenu {
    pub target: ParticipantName,
    pub requesters: Vec<ParticipantName>,
}

impl AcceptMenu {
    pub fn resolve(&self, selection: usize) -> Result<&ParticipantName, TpaError> {
        resolve_selection(&self.requesters, selection)
    }
}

fn resolve_selection(entries: &[ParticipantName], selection: usize) -> Result<&ParticipantName, TpaError> {
    entries.get(selection).ok_or(TpaError::InvalidSelection {
        index: selection,
        len: entries.len(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequestBody {
    pub sender: ParticipantName,
    pub target: ParticipantName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptRequestBody {
    pub target: ParticipantName,
    pub requester: ParticipantName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantList {
    pub participants: Vec<ParticipantName>,
}
