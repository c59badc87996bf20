//! Request extractors whose failures render through [`AppError`], so a bad
//! body or path id still gets the `{success, error}` shape.

use axum::extract::{
    rejection::{JsonRejection, PathRejection},
    FromRequest, Path,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;

/// `axum::Json` with a validation error instead of axum's plain-text rejection.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "request body rejected");
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                AppError::validation("Expected a JSON request body")
            }
            _ => AppError::validation("Invalid request body"),
        }
    }
}

/// An id segment that is not a UUID cannot name a stored row.
pub fn path_id(
    path: Result<Path<Uuid>, PathRejection>,
    resource: &'static str,
) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id).map_err(|rejection| {
        debug!(error = %rejection.body_text(), resource, "malformed path id");
        AppError::NotFound(resource)
    })
}
