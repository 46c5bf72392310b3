use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ParticipantName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DuplicateRequest,
    ExpiredRequest,
    NoEligibleTargets,
    NoPendingRequests,
    InvalidOrigin,
    NotFound,
    Conflict,
    Validation,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Business-rule failures of the teleport request workflow. None of these are
/// fatal; they are reported back to whoever triggered the action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TpaError {
    #[error("a teleport request to {target} has already been sent")]
    DuplicateRequest { target: ParticipantName },
    #[error("the teleport request from {requester} has expired")]
    ExpiredRequest { requester: ParticipantName },
    #[error("there is nobody to send a teleport request to")]
    NoEligibleTargets,
    #[error("there are no pending teleport requests")]
    NoPendingRequests,
    #[error("the command must be run by a connected participant")]
    InvalidOrigin,
    #[error("participant {name} is not connected")]
    UnknownParticipant { name: ParticipantName },
    #[error("cannot send a teleport request to yourself")]
    SelfRequest,
    #[error("selection {index} is out of range for a menu of {len} entries")]
    InvalidSelection { index: usize, len: usize },
    #[error("teleport failed: {reason}")]
    TransferFailed { reason: String },
}

impl TpaError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateRequest { .. } => ErrorCode::DuplicateRequest,
            Self::ExpiredRequest { .. } => ErrorCode::ExpiredRequest,
            Self::NoEligibleTargets => ErrorCode::NoEligibleTargets,
            Self::NoPendingRequests => ErrorCode::NoPendingRequests,
            Self::InvalidOrigin => ErrorCode::InvalidOrigin,
            Self::UnknownParticipant { .. } => ErrorCode::NotFound,
            Self::SelfRequest | Self::InvalidSelection { .. } => ErrorCode::Validation,
            Self::TransferFailed { .. } => ErrorCode::Internal,
        }
    }
}

impl From<TpaError> for ApiError {
    fn from(value: TpaError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}
