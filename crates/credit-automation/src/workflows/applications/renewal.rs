//! Successor applications for credit limits coming up for renewal.
//!
//! A renewal clones the carry-over fields of the most recent approved application, persists the
//! successor directly in PENDING_AUTOMATION and hands decisioning to a tracked background task.
//! Callers get a [`RenewalTicket`] immediately.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::info;

use super::automation::{AutomationError, AutomationPipeline};
use super::collaborators::Collaborators;
use super::decision::DecisionReport;
use super::domain::{
    Actor, Application, ApplicationId, ApplicationKey, ApplicationStatus, ClientDebtorId,
};
use super::lifecycle::{transition, LifecycleEvent, LifecycleState};
use super::repository::{ApplicationRepository, ApplicationSequence, PartyDirectory, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Lifecycle(#[from] super::lifecycle::LifecycleError),
    #[error("{entity} {id} not found")]
    MissingRecord { entity: &'static str, id: String },
    #[error("renewal credit limit must be greater than zero")]
    InvalidCreditLimit,
    #[error("application {0} is already in progress for this credit limit")]
    AlreadyInProgress(ApplicationId),
    #[error(transparent)]
    Automation(#[from] AutomationError),
    #[error("renewal task aborted: {0}")]
    Aborted(String),
}

/// Handle on a renewal whose decisioning runs in the background.
#[derive(Debug)]
pub struct RenewalTicket {
    pub application: Application,
    handle: JoinHandle<Result<DecisionReport, AutomationError>>,
}

impl RenewalTicket {
    pub fn key(&self) -> ApplicationKey {
        self.application.key
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.application.application_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the decisioning run to complete.
    pub async fn wait(self) -> Result<DecisionReport, RenewalError> {
        match self.handle.await {
            Ok(result) => Ok(result?),
            Err(join) => Err(RenewalError::Aborted(join.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct RenewalOrchestrator {
    applications: Arc<dyn ApplicationRepository>,
    parties: Arc<dyn PartyDirectory>,
    sequence: Arc<dyn ApplicationSequence>,
    pipeline: Arc<AutomationPipeline>,
}

impl RenewalOrchestrator {
    pub fn new(collaborators: &Collaborators, pipeline: Arc<AutomationPipeline>) -> Self {
        Self {
            applications: Arc::clone(&collaborators.applications),
            parties: Arc::clone(&collaborators.parties),
            sequence: Arc::clone(&collaborators.sequence),
            pipeline,
        }
    }

    /// Start a renewal for the credit-limit record. `Ok(None)` when it has no approved
    /// application to renew from.
    pub async fn renew(
        &self,
        client_debtor_id: &ClientDebtorId,
        credit_limit: Decimal,
        actor: &Actor,
    ) -> Result<Option<RenewalTicket>, RenewalError> {
        if credit_limit <= Decimal::ZERO {
            return Err(RenewalError::InvalidCreditLimit);
        }

        let Some(previous) = self.applications.latest_approved(client_debtor_id).await? else {
            info!(%client_debtor_id, "no approved application to renew");
            return Ok(None);
        };

        // Rejects early without consuming a sequence number; the insert re-checks atomically.
        if let Some(open) = self
            .applications
            .find_blocking(&previous.client_id, &previous.debtor_id)
            .await?
        {
            return Err(RenewalError::AlreadyInProgress(open.application_id));
        }

        let (client, debtor) = tokio::try_join!(
            self.parties.client(&previous.client_id),
            self.parties.debtor(&previous.debtor_id),
        )?;
        let client = client.ok_or_else(|| RenewalError::MissingRecord {
            entity: "client",
            id: previous.client_id.0.clone(),
        })?;
        let debtor = debtor.ok_or_else(|| RenewalError::MissingRecord {
            entity: "debtor",
            id: previous.debtor_id.0.clone(),
        })?;

        let now = Utc::now();
        let queued = transition(
            LifecycleState {
                stage: previous.stage,
                status: ApplicationStatus::Submitted,
            },
            LifecycleEvent::AutomationQueued,
        )?;
        let sequence = self.sequence.next_application_number().await?;
        let application = Application {
            key: ApplicationKey::new(),
            application_id: ApplicationId::compose(
                &client.client_code,
                &debtor.debtor_code,
                now.date_naive(),
                sequence,
            ),
            client_id: previous.client_id.clone(),
            debtor_id: previous.debtor_id.clone(),
            client_debtor_id: client_debtor_id.clone(),
            stage: queued.stage,
            status: queued.status,
            credit_limit: Some(credit_limit),
            accepted_amount: None,
            blockers: Vec::new(),
            is_auto_approved: false,
            approval_date: None,
            expiry_date: None,
            payment_terms: previous.payment_terms.clone(),
            outstanding_amount: previous.outstanding_amount,
            order_on_hand: previous.order_on_hand,
            note: previous.note.clone(),
            created_by_type: actor.kind,
            created_by_id: actor.id.clone(),
            created_at: now,
        };
        let application = match self.applications.insert_if_no_blocking(application).await {
            Ok(stored) => stored,
            Err(RepositoryError::OpenApplication(open)) => {
                return Err(RenewalError::AlreadyInProgress(open))
            }
            Err(other) => return Err(other.into()),
        };

        info!(
            application_id = %application.application_id,
            renewed_from = %previous.application_id,
            "renewal queued for automation"
        );

        let pipeline = Arc::clone(&self.pipeline);
        let key = application.key;
        let actor = actor.clone();
        let handle = tokio::spawn(async move { pipeline.run_with_retry(&key, &actor).await });

        Ok(Some(RenewalTicket {
            application,
            handle,
        }))
    }
}
