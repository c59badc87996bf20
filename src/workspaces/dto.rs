use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::Workspace;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetCurrentWorkspaceRequest {
    pub workspace_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceDetails {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Workspace> for WorkspaceDetails {
    fn from(w: Workspace) -> Self {
        Self {
            id: w.id,
            name: w.name,
            owner_id: w.owner_id,
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedWorkspaceResponse {
    pub success: bool,
    pub workspace: WorkspaceDetails,
}
