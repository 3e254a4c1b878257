use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::automation::{AutomationError, GateOutcome, Insurer};
use super::collaborators::Collaborators;
use super::domain::{
    ActiveLimitUpdate, Actor, ActorType, Application, Client, UserId,
};
use super::lifecycle::{transition, LifecycleEvent, LifecycleState};
use super::notify::{
    AuditAction, AuditEntry, AuditSink, NewTask, NotificationChannel, NotificationKind,
    NotificationSink, Task, TaskSink,
};
use super::repository::{ApplicationRepository, ClientDebtorStore};

pub const APPROVAL_VALIDITY_MONTHS: u32 = 12;
pub const REVIEW_TASK_DUE_DAYS: i64 = 7;

/// Auto-approval requires a clean gate and an insurer that accepts automated limits.
pub fn qualifies_for_auto_approval(blockers: &[String], insurer: Option<Insurer>) -> bool {
    blockers.is_empty() && insurer != Some(Insurer::Euler)
}

pub fn approval_expiry(approved_at: DateTime<Utc>) -> DateTime<Utc> {
    approved_at
        .checked_add_months(Months::new(APPROVAL_VALIDITY_MONTHS))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    AutoApproved,
    Referred,
    UnderwriterApproved,
    UnderwriterDeclined,
}

/// Result of writing a decision. Side-effect failures, including the credit-limit sync, never
/// undo the decision itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionReport {
    pub decision: DecisionKind,
    pub application: Application,
    pub insurer: Option<Insurer>,
    pub task: Option<Task>,
    pub side_effect_failures: Vec<String>,
}

impl DecisionReport {
    fn new(decision: DecisionKind, application: Application) -> Self {
        Self {
            decision,
            application,
            insurer: None,
            task: None,
            side_effect_failures: Vec::new(),
        }
    }
}

/// Applies a decision to the application and credit-limit record, then fans out audit entries,
/// tasks and notifications.
#[derive(Clone)]
pub struct DecisionFinalizer {
    applications: Arc<dyn ApplicationRepository>,
    limits: Arc<dyn ClientDebtorStore>,
    tasks: Arc<dyn TaskSink>,
    notifications: Arc<dyn NotificationSink>,
    channel: Arc<dyn NotificationChannel>,
    audit: Arc<dyn AuditSink>,
}

impl DecisionFinalizer {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            applications: Arc::clone(&collaborators.applications),
            limits: Arc::clone(&collaborators.limits),
            tasks: Arc::clone(&collaborators.tasks),
            notifications: Arc::clone(&collaborators.notifications),
            channel: Arc::clone(&collaborators.channel),
            audit: Arc::clone(&collaborators.audit),
        }
    }

    pub async fn finalize(
        &self,
        application: Application,
        client: &Client,
        outcome: &GateOutcome,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<DecisionReport, AutomationError> {
        let mut report = if qualifies_for_auto_approval(&outcome.blockers, outcome.insurer) {
            self.auto_approve(application, client, actor, now).await?
        } else {
            self.refer(application, client, outcome.blockers.clone(), actor, now)
                .await?
        };
        report.insurer = outcome.insurer;
        Ok(report)
    }

    async fn auto_approve(
        &self,
        mut application: Application,
        client: &Client,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<DecisionReport, AutomationError> {
        let state = transition(
            LifecycleState {
                stage: application.stage,
                status: application.status,
            },
            LifecycleEvent::AutoApproved,
        )?;
        let requested = application.credit_limit.unwrap_or(Decimal::ZERO);
        let expiry = approval_expiry(now);

        application.status = state.status;
        application.blockers = Vec::new();
        application.is_auto_approved = true;
        application.accepted_amount = Some(requested);
        application.approval_date = Some(now);
        application.expiry_date = Some(expiry);
        self.applications.update(application.clone()).await?;

        info!(
            application_id = %application.application_id,
            credit_limit = %requested,
            "application auto-approved"
        );

        let mut report = DecisionReport::new(DecisionKind::AutoApproved, application);
        self.activate_limit(&mut report, requested, false, expiry).await;
        self.announce_approval(&mut report, client, actor).await;
        Ok(report)
    }

    /// Route an application to a human underwriter with the given blockers.
    pub async fn refer(
        &self,
        mut application: Application,
        client: &Client,
        blockers: Vec<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<DecisionReport, AutomationError> {
        let state = transition(
            LifecycleState {
                stage: application.stage,
                status: application.status,
            },
            LifecycleEvent::Referred,
        )?;
        application.status = state.status;
        application.blockers = blockers;
        self.applications.update(application.clone()).await?;

        info!(
            application_id = %application.application_id,
            blockers = ?application.blockers,
            "application referred for review"
        );

        let mut report = DecisionReport::new(DecisionKind::Referred, application);
        match client.risk_analyst_id.as_ref() {
            Some(analyst) => {
                let task = self
                    .assign_review_task(&mut report, analyst, actor, now)
                    .await;
                report.task = task;
            }
            None => warn!(
                application_id = %report.application.application_id,
                client = %client.name,
                "client has no risk analyst; review task not created"
            ),
        }
        Ok(report)
    }

    /// Underwriter accepts a referred application, possibly for a different amount.
    pub async fn underwriter_approve(
        &self,
        mut application: Application,
        client: &Client,
        accepted_amount: Decimal,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<DecisionReport, AutomationError> {
        let state = transition(
            LifecycleState {
                stage: application.stage,
                status: application.status,
            },
            LifecycleEvent::UnderwriterApproved,
        )?;
        let expiry = approval_expiry(now);

        application.status = state.status;
        application.is_auto_approved = false;
        application.accepted_amount = Some(accepted_amount);
        application.approval_date = Some(now);
        application.expiry_date = Some(expiry);
        self.applications.update(application.clone()).await?;

        info!(
            application_id = %application.application_id,
            accepted_amount = %accepted_amount,
            underwriter = %actor.id.0,
            "application approved by underwriter"
        );

        let mut report = DecisionReport::new(DecisionKind::UnderwriterApproved, application);
        self.activate_limit(&mut report, accepted_amount, true, expiry).await;
        self.announce_approval(&mut report, client, actor).await;
        Ok(report)
    }

    pub async fn underwriter_decline(
        &self,
        mut application: Application,
        client: &Client,
        actor: &Actor,
    ) -> Result<DecisionReport, AutomationError> {
        let state = transition(
            LifecycleState {
                stage: application.stage,
                status: application.status,
            },
            LifecycleEvent::UnderwriterDeclined,
        )?;
        application.status = state.status;
        self.applications.update(application.clone()).await?;

        info!(
            application_id = %application.application_id,
            underwriter = %actor.id.0,
            "application declined by underwriter"
        );

        let description = format!("An application {} is declined", application.application_id);
        let entry = AuditEntry {
            entity_type: "application".to_string(),
            entity_ref_id: application.key.to_string(),
            action_type: AuditAction::Edit,
            user_type: actor.kind,
            user_ref_id: audit_user(actor),
            description: description.clone(),
        };
        let mut report = DecisionReport::new(DecisionKind::UnderwriterDeclined, application);
        self.record_audit(&mut report, entry).await;
        self.deliver(
            &mut report,
            &UserId(client.id.0.clone()),
            ActorType::ClientUser,
            NotificationKind::ApplicationDeclined,
            description,
        )
        .await;
        Ok(report)
    }

    /// Point the credit-limit record at the approved application. Runs after the decision is
    /// stored; a failure is reported so the limit can be re-synced from the application.
    async fn activate_limit(
        &self,
        report: &mut DecisionReport,
        credit_limit: Decimal,
        is_endorsed_limit: bool,
        expiry: DateTime<Utc>,
    ) {
        let update = ActiveLimitUpdate {
            credit_limit,
            is_endorsed_limit,
            active_application_id: report.application.key,
            expiry_date: expiry,
        };
        let outcome = self
            .limits
            .upsert_active_limit(
                &report.application.client_id,
                &report.application.debtor_id,
                update,
            )
            .await;
        if let Err(error) = outcome {
            note_failure(report, "credit limit", error);
        }
    }

    async fn announce_approval(&self, report: &mut DecisionReport, client: &Client, actor: &Actor) {
        let application_id = report.application.application_id.clone();
        let entry = AuditEntry {
            entity_type: "application".to_string(),
            entity_ref_id: report.application.key.to_string(),
            action_type: AuditAction::Edit,
            user_type: actor.kind,
            user_ref_id: audit_user(actor),
            description: format!("An application {application_id} is approved"),
        };
        self.record_audit(report, entry).await;

        self.deliver(
            report,
            &UserId(client.id.0.clone()),
            ActorType::ClientUser,
            NotificationKind::ApplicationApproved,
            format!("An application {application_id} is being approved"),
        )
        .await;

        if let Some(analyst) = client.risk_analyst_id.as_ref() {
            self.deliver(
                report,
                analyst,
                ActorType::User,
                NotificationKind::ApplicationApproved,
                format!("A new application {application_id} is being approved"),
            )
            .await;
        }
    }

    async fn assign_review_task(
        &self,
        report: &mut DecisionReport,
        analyst: &UserId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Option<Task> {
        let application_id = report.application.application_id.clone();
        let request = NewTask {
            title: format!("Review Application {application_id}"),
            assignee_type: ActorType::User,
            assignee_id: analyst.clone(),
            due_date: now + Duration::days(REVIEW_TASK_DUE_DAYS),
            entity_type: "application".to_string(),
            entity_id: report.application.key,
            created_by_type: actor.kind,
            created_by_id: actor.id.clone(),
        };

        let task = match self.tasks.create_task(request).await {
            Ok(task) => task,
            Err(error) => {
                note_failure(report, "review task", error);
                return None;
            }
        };

        let entry = AuditEntry {
            entity_type: "task".to_string(),
            entity_ref_id: task.id.clone(),
            action_type: AuditAction::Add,
            user_type: actor.kind,
            user_ref_id: audit_user(actor),
            description: format!(
                "A new task for {application_id} is created by {}",
                actor.kind.label()
            ),
        };
        self.record_audit(report, entry).await;
        self.deliver(
            report,
            analyst,
            ActorType::User,
            NotificationKind::TaskAssigned,
            format!(
                "A new task {} is assigned by {}",
                task.title,
                actor.kind.label()
            ),
        )
        .await;

        Some(task)
    }

    async fn record_audit(&self, report: &mut DecisionReport, entry: AuditEntry) {
        if let Err(error) = self.audit.record(entry).await {
            note_failure(report, "audit entry", error);
        }
    }

    async fn deliver(
        &self,
        report: &mut DecisionReport,
        user_id: &UserId,
        user_type: ActorType,
        kind: NotificationKind,
        description: String,
    ) {
        let notification = match self
            .notifications
            .notify(user_id, user_type, description)
            .await
        {
            Ok(notification) => notification,
            Err(error) => {
                note_failure(report, "notification", error);
                return;
            }
        };
        if let Err(error) = self.channel.push(kind, &notification).await {
            note_failure(report, kind.label(), error);
        }
    }
}

fn audit_user(actor: &Actor) -> Option<UserId> {
    (actor.kind != ActorType::System).then(|| actor.id.clone())
}

fn note_failure(report: &mut DecisionReport, what: &str, error: impl std::fmt::Display) {
    warn!(
        application_id = %report.application.application_id,
        side_effect = what,
        %error,
        "decision side effect failed"
    );
    report.side_effect_failures.push(format!("{what}: {error}"));
}
