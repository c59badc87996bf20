use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{Priority, TaskActivity, TaskStatus, UpcomingTask};

/// One line of the activity feed, e.g. "Ana completed Copy in Website".
#[derive(Debug, Serialize)]
pub struct ActivityView {
    pub id: Uuid,
    pub user: String,
    pub action: &'static str,
    pub target: String,
    pub project: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl From<TaskActivity> for ActivityView {
    fn from(a: TaskActivity) -> Self {
        Self {
            id: a.task_id,
            user: a.assignee_name.unwrap_or_else(|| "Team".to_string()),
            action: match a.status {
                TaskStatus::Done => "completed",
                TaskStatus::InProgress => "started working on",
                TaskStatus::Todo => "created",
            },
            target: a.title,
            project: a.project_name,
            time: a.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeadlineView {
    pub id: Uuid,
    pub title: String,
    pub project: String,
    #[serde(with = "time::serde::rfc3339")]
    pub due_date: OffsetDateTime,
    pub priority: Priority,
}

impl From<UpcomingTask> for DeadlineView {
    fn from(t: UpcomingTask) -> Self {
        Self {
            id: t.task_id,
            title: t.title,
            project: t.project_name,
            due_date: t.due_date,
            priority: t.priority,
        }
    }
}
