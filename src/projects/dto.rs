use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{Priority, Project, Task, TaskStatus};

/// Body of project create and update.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectInput {
    pub name: String,
    pub description: Option<String>,
}

/// Body of task create and update. On update, an absent `status` or
/// `priority` keeps the current value; the other fields are replaced.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TaskInput {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub assignee_id: Option<Uuid>,
}

/// Board column move.
#[derive(Debug, Deserialize)]
pub struct TaskStatusInput {
    pub status: TaskStatus,
}

#[derive(Debug, Serialize)]
pub struct ProjectView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub workspace_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Project> for ProjectView {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            workspace_id: p.workspace_id,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub assignee_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Task> for TaskView {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            title: t.title,
            description: t.description,
            status: t.status,
            priority: t.priority,
            due_date: t.due_date,
            assignee_id: t.assignee_id,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectDetails {
    #[serde(flatten)]
    pub project: ProjectView,
    pub tasks: Vec<TaskView>,
}
