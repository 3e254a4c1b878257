use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorType, ApplicationKey, UserId};

/// Outbound work item for a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub assignee_type: ActorType,
    pub assignee_id: UserId,
    pub due_date: DateTime<Utc>,
    pub entity_type: String,
    pub entity_id: ApplicationKey,
    pub created_by_type: ActorType,
    pub created_by_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub assignee_type: ActorType,
    pub assignee_id: UserId,
    pub due_date: DateTime<Utc>,
}

#[async_trait]
pub trait TaskSink: Send + Sync {
    async fn create_task(&self, task: NewTask) -> Result<Task, SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: UserId,
    pub user_type: ActorType,
    pub description: String,
}

/// Push event type attached to a delivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ApplicationApproved,
    ApplicationDeclined,
    TaskAssigned,
    CreditLimitExpiring,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::ApplicationApproved => "APPLICATION_APPROVED",
            NotificationKind::ApplicationDeclined => "APPLICATION_DECLINED",
            NotificationKind::TaskAssigned => "TASK_ASSIGNED",
            NotificationKind::CreditLimitExpiring => "CREDIT_LIMIT_EXPIRING",
        }
    }
}

/// Stores a notification for a user.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_id: &UserId,
        user_type: ActorType,
        description: String,
    ) -> Result<Notification, SinkError>;
}

/// Realtime delivery of a stored notification (socket push, webhook, ...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn push(
        &self,
        kind: NotificationKind,
        notification: &Notification,
    ) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Add,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_ref_id: String,
    pub action_type: AuditAction,
    pub user_type: ActorType,
    pub user_ref_id: Option<UserId>,
    pub description: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), SinkError>;
}

/// Side-effect dispatch error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("sink transport unavailable: {0}")]
    Transport(String),
}
