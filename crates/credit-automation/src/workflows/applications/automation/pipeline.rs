use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::{AutomationError, EligibilityGate, InsurerRegistry};
use crate::config::AutomationConfig;
use crate::workflows::applications::collaborators::Collaborators;
use crate::workflows::applications::decision::{DecisionFinalizer, DecisionReport};
use crate::workflows::applications::domain::{Actor, Application, ApplicationKey, Client, Debtor};
use crate::workflows::applications::repository::{ApplicationRepository, PartyDirectory};

/// Load → gate → finalize for one submitted application.
pub struct AutomationPipeline {
    applications: Arc<dyn ApplicationRepository>,
    parties: Arc<dyn PartyDirectory>,
    gate: EligibilityGate,
    finalizer: DecisionFinalizer,
    max_attempts: u32,
    backoff: Duration,
}

impl AutomationPipeline {
    pub fn new(
        collaborators: &Collaborators,
        insurers: Arc<InsurerRegistry>,
        config: &AutomationConfig,
    ) -> Self {
        let gate = EligibilityGate::new(
            Arc::clone(&collaborators.policies),
            Arc::clone(&collaborators.classifier),
            insurers,
            config.policy_lookup_timeout,
        );
        Self {
            applications: Arc::clone(&collaborators.applications),
            parties: Arc::clone(&collaborators.parties),
            gate,
            finalizer: DecisionFinalizer::new(collaborators),
            max_attempts: config.renewal_max_attempts.max(1),
            backoff: config.renewal_retry_backoff,
        }
    }

    pub fn finalizer(&self) -> &DecisionFinalizer {
        &self.finalizer
    }

    pub async fn run(
        &self,
        key: &ApplicationKey,
        actor: &Actor,
    ) -> Result<DecisionReport, AutomationError> {
        self.run_at(key, actor, Utc::now()).await
    }

    /// Run decisioning, retrying transient repository failures with linear backoff. Replays
    /// are safe: an application that already left SUBMITTED/PENDING_AUTOMATION is refused.
    pub async fn run_with_retry(
        &self,
        key: &ApplicationKey,
        actor: &Actor,
    ) -> Result<DecisionReport, AutomationError> {
        let mut attempt = 1;
        loop {
            match self.run(key, actor).await {
                Ok(report) => return Ok(report),
                Err(failure) if failure.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        application_key = %key,
                        attempt,
                        error = %failure,
                        "decisioning failed; retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(failure) => {
                    error!(
                        application_key = %key,
                        attempt,
                        error = %failure,
                        "decisioning failed"
                    );
                    return Err(failure);
                }
            }
        }
    }

    /// Decide one application against a fixed clock.
    pub async fn run_at(
        &self,
        key: &ApplicationKey,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<DecisionReport, AutomationError> {
        let application = self.load_application(key).await?;
        if !application.status.awaits_decision() {
            return Err(AutomationError::AlreadyDecided {
                application_id: application.application_id.to_string(),
                status: application.status,
            });
        }
        let (client, debtor) = self.load_parties(&application).await?;

        match self.gate.evaluate(&application, &client, &debtor, now).await {
            Ok(outcome) => {
                let report = self
                    .finalizer
                    .finalize(application, &client, &outcome, actor, now)
                    .await?;
                info!(
                    application_id = %report.application.application_id,
                    decision = ?report.decision,
                    status = %report.application.status,
                    "automation run complete"
                );
                Ok(report)
            }
            Err(failure) => {
                error!(
                    application_id = %application.application_id,
                    error = %failure,
                    "eligibility evaluation failed; referring for review"
                );
                let blockers = vec![format!("Automation failed: {failure}")];
                self.finalizer
                    .refer(application, &client, blockers, actor, now)
                    .await?;
                Err(AutomationError::EvaluationFailed {
                    source: Box::new(failure),
                })
            }
        }
    }

    async fn load_application(&self, key: &ApplicationKey) -> Result<Application, AutomationError> {
        self.applications
            .fetch(key)
            .await?
            .ok_or_else(|| AutomationError::MissingRecord {
                entity: "application",
                id: key.to_string(),
            })
    }

    async fn load_parties(
        &self,
        application: &Application,
    ) -> Result<(Client, Debtor), AutomationError> {
        let (client, debtor) = tokio::try_join!(
            self.parties.client(&application.client_id),
            self.parties.debtor(&application.debtor_id),
        )?;
        let client = client.ok_or_else(|| AutomationError::MissingRecord {
            entity: "client",
            id: application.client_id.0.clone(),
        })?;
        let debtor = debtor.ok_or_else(|| AutomationError::MissingRecord {
            entity: "debtor",
            id: application.debtor_id.0.clone(),
        })?;
        Ok((client, debtor))
    }
}
