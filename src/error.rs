use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    StoreFailure,
}

/// Failures returned by services. The `Display` text is the user-facing message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("You do not belong to this workspace")]
    NotMember,
    #[error("This invitation is not for you")]
    InvitationNotForYou,
    #[error("You cannot invite yourself to the workspace")]
    SelfInvite,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("No workspace found")]
    NoWorkspace,
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("This user is already a member of the workspace")]
    AlreadyMember,
    #[error("An invitation has already been sent to this email")]
    DuplicateInvitation,
    #[error("This invitation has already been processed")]
    AlreadyProcessed,
    #[error("Something went wrong. Please try again.")]
    Store(#[from] StoreError),
    #[error("Something went wrong. Please try again.")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Unauthenticated(_) | AppError::InvalidCredentials => {
                ErrorKind::Unauthenticated
            }
            AppError::NotMember | AppError::InvitationNotForYou | AppError::SelfInvite => {
                ErrorKind::Forbidden
            }
            AppError::NotFound(_) | AppError::NoWorkspace => ErrorKind::NotFound,
            AppError::EmailTaken
            | AppError::AlreadyMember
            | AppError::DuplicateInvitation
            | AppError::AlreadyProcessed => ErrorKind::Conflict,
            AppError::Store(_) | AppError::Internal(_) => ErrorKind::StoreFailure,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Store(e) => error!(error = %e, "store failure"),
            AppError::Internal(e) => error!(error = %e, "internal failure"),
            _ => {}
        }
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
