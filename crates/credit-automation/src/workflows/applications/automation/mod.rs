//! Eligibility gate and decisioning pipeline.
//!
//! The gate runs its checks in a fixed order, appending human-readable blockers and halting
//! early where a check makes the rest meaningless. Collaborator failures are returned as
//! [`AutomationError`] so "no blockers" can never be confused with "evaluation failed".

mod classifier;
mod insurers;
mod pipeline;
mod policy;

pub use classifier::{
    token_for, tokens, Classification, ClassifierError, DisclosureClassifier, EntityClassifier,
};
pub use insurers::{
    Insurer, InsurerContext, InsurerRegistry, InsurerResolution, InsurerRules,
    UnderwritingAppetite,
};
pub use pipeline::AutomationPipeline;
pub use policy::PolicyFigures;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{
    Application, ApplicationStatus, Client, ClientId, Debtor, Policy, PolicyProduct,
};
use super::lifecycle::LifecycleError;
use super::notify::SinkError;
use super::repository::{PolicyRepository, RepositoryError};

/// Registered countries whose buyers can be auto-approved.
pub const DOMESTIC_COUNTRIES: [&str; 2] = ["AUS", "NZL"];

pub const BLOCKER_AUTOMATION_NOT_ALLOWED: &str = "Automation is not Allowed";
pub const BLOCKER_FOREIGN_BUYER: &str = "Foreign Buyer";
pub const BLOCKER_NO_RMP_POLICY: &str = "No RMP policy found";
pub const BLOCKER_NO_CI_POLICY: &str = "No CI policy found";
pub const BLOCKER_ABOVE_DISCRETIONARY_LIMIT: &str =
    "Credit limit is greater than Discretionary limit";
pub const BLOCKER_NO_INSURER: &str = "No insurer found";
pub const BLOCKER_RMP_ONLY_INSURER: &str = "RMP only insurer";

/// Gate step that stopped evaluation early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStep {
    AutomationPermission,
    Geography,
    PolicyCoverage,
    DiscretionaryLimit,
    EntityClassification,
}

/// Everything the finalizer needs from one gate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateOutcome {
    pub blockers: Vec<String>,
    pub insurer: Option<Insurer>,
    pub policy: PolicyFigures,
    pub classification: Option<String>,
    pub halted_at: Option<GateStep>,
}

impl GateOutcome {
    fn halted(mut self, step: GateStep) -> Self {
        self.halted_at = Some(step);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("policy lookup did not complete within {0:?}")]
    PolicyLookupTimeout(Duration),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("{entity} {id} not found")]
    MissingRecord { entity: &'static str, id: String },
    #[error("application {application_id} is not awaiting a decision (status {status})")]
    AlreadyDecided {
        application_id: String,
        status: ApplicationStatus,
    },
    #[error("evaluation failed and the application was referred for review: {source}")]
    EvaluationFailed {
        #[source]
        source: Box<AutomationError>,
    },
}

impl AutomationError {
    /// Transient failures that happened before any decision was written.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::Repository(RepositoryError::Unavailable(_))
        )
    }
}

/// Ordered eligibility checks over one application snapshot.
pub struct EligibilityGate {
    policies: Arc<dyn PolicyRepository>,
    classifier: Arc<dyn EntityClassifier>,
    insurers: Arc<InsurerRegistry>,
    policy_lookup_timeout: Duration,
}

impl EligibilityGate {
    pub fn new(
        policies: Arc<dyn PolicyRepository>,
        classifier: Arc<dyn EntityClassifier>,
        insurers: Arc<InsurerRegistry>,
        policy_lookup_timeout: Duration,
    ) -> Self {
        Self {
            policies,
            classifier,
            insurers,
            policy_lookup_timeout,
        }
    }

    pub async fn evaluate(
        &self,
        application: &Application,
        client: &Client,
        debtor: &Debtor,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome, AutomationError> {
        let mut outcome = GateOutcome {
            blockers: Vec::new(),
            insurer: None,
            policy: PolicyFigures::default(),
            classification: None,
            halted_at: None,
        };

        if !client.is_auto_approve_allowed {
            outcome.blockers.push(BLOCKER_AUTOMATION_NOT_ALLOWED.to_string());
            return Ok(outcome.halted(GateStep::AutomationPermission));
        }

        if let Some(country) = debtor.country_code.as_deref() {
            if !DOMESTIC_COUNTRIES.contains(&country) {
                outcome.blockers.push(BLOCKER_FOREIGN_BUYER.to_string());
                return Ok(outcome.halted(GateStep::Geography));
            }
        }

        let (credit_insurance, risk_management) = self.lookup_policies(&client.id, now).await?;
        if risk_management.is_none() {
            outcome.blockers.push(BLOCKER_NO_RMP_POLICY.to_string());
        }
        if credit_insurance.is_none() {
            outcome.blockers.push(BLOCKER_NO_CI_POLICY.to_string());
        }
        let (Some(credit_insurance), Some(risk_management)) = (credit_insurance, risk_management)
        else {
            return Ok(outcome.halted(GateStep::PolicyCoverage));
        };

        outcome.policy = PolicyFigures::resolve(&credit_insurance, &risk_management);
        let requested = application.credit_limit.unwrap_or(Decimal::ZERO);
        if outcome.policy.exceeds_discretionary_limit(requested) {
            outcome
                .blockers
                .push(BLOCKER_ABOVE_DISCRETIONARY_LIMIT.to_string());
            return Ok(outcome.halted(GateStep::DiscretionaryLimit));
        }

        let classification = self
            .classifier
            .classify(&debtor.id, debtor.entity_type)
            .await?;
        outcome.blockers.extend(classification.blockers);
        outcome.classification = Some(classification.token);
        if !classification.proceed {
            return Ok(outcome.halted(GateStep::EntityClassification));
        }

        match self.insurers.resolve(client.insurer_name.as_deref()) {
            InsurerResolution::Resolved(insurer) => {
                if insurer == Insurer::Trad {
                    outcome.blockers.push(BLOCKER_RMP_ONLY_INSURER.to_string());
                }
                let context = InsurerContext {
                    application,
                    classification: outcome.classification.as_deref().unwrap_or_default(),
                    policy: &outcome.policy,
                };
                let extra = self.insurers.evaluate(insurer, &context);
                outcome.blockers.extend(extra);
                outcome.insurer = Some(insurer);
            }
            InsurerResolution::Unresolved { name } => {
                warn!(
                    application_id = %application.application_id,
                    insurer = name.as_deref().unwrap_or("<none>"),
                    "client insurer not recognised; continuing without insurer rules"
                );
                outcome.blockers.push(BLOCKER_NO_INSURER.to_string());
            }
        }

        debug!(
            application_id = %application.application_id,
            blockers = outcome.blockers.len(),
            insurer = ?outcome.insurer,
            "eligibility gate complete"
        );
        Ok(outcome)
    }

    async fn lookup_policies(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<(Option<Policy>, Option<Policy>), AutomationError> {
        let lookups = async {
            tokio::try_join!(
                self.policies
                    .find_active_policy(client_id, PolicyProduct::CreditInsurance, now),
                self.policies
                    .find_active_policy(client_id, PolicyProduct::RiskManagement, now),
            )
        };

        match tokio::time::timeout(self.policy_lookup_timeout, lookups).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AutomationError::PolicyLookupTimeout(
                self.policy_lookup_timeout,
            )),
        }
    }
}
