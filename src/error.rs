//! Error taxonomy shared by the repository, synchronizer, wizard and commands

use crate::db::DbError;
use crate::fields::FieldError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RideError {
    #[error("{0}")]
    Validation(#[from] FieldError),
    #[error("Ride not found: {0}")]
    NotFound(String),
    #[error("Only the creator of ride {ride_id} can {action} it")]
    PermissionDenied {
        ride_id: String,
        action: &'static str,
    },
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("Session expired")]
    SessionExpired,
    #[error("A ride wizard is already active in this chat")]
    SessionActive,
    #[error("Storage error: {0}")]
    Storage(DbError),
}

impl From<DbError> for RideError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::RideNotFound(id) => RideError::NotFound(id),
            other => RideError::Storage(other),
        }
    }
}

pub type RideResult<T> = Result<T, RideError>;

impl RideError {
    pub fn permission_denied(ride_id: impl Into<String>, action: &'static str) -> Self {
        RideError::PermissionDenied {
            ride_id: ride_id.into(),
            action,
        }
    }

    /// Short text shown to the chat user
    pub fn user_message(&self) -> String {
        match self {
            RideError::Validation(err) => err.message.clone(),
            RideError::NotFound(id) => format!("Ride #{id} not found"),
            RideError::PermissionDenied { action, .. } => {
                format!("Only the ride creator can {action} this ride")
            }
            RideError::Transport(_) => {
                "Could not reach the chat right now. Please try again later".to_string()
            }
            RideError::SessionExpired => {
                "This session has expired. Start again with /newride".to_string()
            }
            RideError::SessionActive => {
                "You already have a ride wizard open in this chat. Finish or cancel it first"
                    .to_string()
            }
            RideError::Storage(_) => "Something went wrong, please try again".to_string(),
        }
    }
}
