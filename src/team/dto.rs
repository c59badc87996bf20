use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::PublicUser;
use crate::store::{InvitationStatus, PendingInvitation, Role, TeamMember};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InviteMemberRequest {
    pub email: String,
    /// `admin` or `member`; defaults to `member`.
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TeamMemberView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

impl From<TeamMember> for TeamMemberView {
    fn from(m: TeamMember) -> Self {
        Self {
            is_admin: m.membership.is_admin(),
            role: m.membership.role,
            joined_at: m.membership.created_at,
            id: m.user.id,
            name: m.user.name,
            email: m.user.email,
            avatar_url: m.user.avatar_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvitationWorkspace {
    pub id: Uuid,
    pub name: String,
    pub owner: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct PendingInvitationView {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub status: InvitationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub workspace: InvitationWorkspace,
    pub inviter: PublicUser,
}

impl From<PendingInvitation> for PendingInvitationView {
    fn from(p: PendingInvitation) -> Self {
        Self {
            id: p.invitation.id,
            email: p.invitation.email,
            role: p.invitation.role,
            status: p.invitation.status,
            created_at: p.invitation.created_at,
            workspace: InvitationWorkspace {
                id: p.workspace.id,
                name: p.workspace.name,
                owner: p.owner.into(),
            },
            inviter: p.inviter.into(),
        }
    }
}
