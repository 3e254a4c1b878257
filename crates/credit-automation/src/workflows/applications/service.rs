use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::automation::{AutomationError, AutomationPipeline, InsurerRegistry};
use super::collaborators::Collaborators;
use super::decision::DecisionReport;
use super::domain::{
    Actor, Application, ApplicationId, ApplicationKey, ClientDebtorId, ClientId,
    Debtor, DebtorDetails, EntityType, PaymentTerms,
};
use super::expiry::{ExpiringLimitSweep, SweepSummary};
use super::lifecycle::{transition, LifecycleError, LifecycleEvent, LifecycleState};
use super::renewal::{RenewalError, RenewalOrchestrator, RenewalTicket};
use super::repository::RepositoryError;
use super::stakeholders::{
    dedupe_by_natural_key, partner_disclosure_sufficient, PartnerSubmission, Stakeholder,
};
use crate::config::AutomationConfig;

/// First intake step: who the application is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetailsRequest {
    /// Present when editing an existing draft.
    #[serde(default)]
    pub application_key: Option<ApplicationKey>,
    pub client_id: ClientId,
    pub debtor: DebtorDetails,
}

/// Result of the company step: the draft plus stakeholders already on file for the debtor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyStep {
    pub application: Application,
    pub debtor: Debtor,
    pub stakeholders: Vec<Stakeholder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerDetailsRequest {
    pub partners: Vec<PartnerSubmission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLimitRequest {
    pub credit_limit: Decimal,
    #[serde(flatten)]
    pub payment_terms: PaymentTerms,
    #[serde(default)]
    pub outstanding_amount: Option<Decimal>,
    #[serde(default)]
    pub order_on_hand: Option<Decimal>,
    #[serde(default)]
    pub note: String,
}

/// Outcome recorded by an underwriter on a referred application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum UnderwriterDecision {
    #[serde(rename_all = "camelCase")]
    Approve {
        #[serde(default)]
        accepted_amount: Option<Decimal>,
    },
    Decline,
}

/// Service composing intake, the automation pipeline, renewal and the expiry sweep.
pub struct CreditApplicationService {
    collaborators: Collaborators,
    pipeline: Arc<AutomationPipeline>,
    renewals: RenewalOrchestrator,
    expiry: ExpiringLimitSweep,
}

impl CreditApplicationService {
    pub fn new(
        collaborators: Collaborators,
        insurers: InsurerRegistry,
        config: &AutomationConfig,
    ) -> Self {
        let pipeline = Arc::new(AutomationPipeline::new(
            &collaborators,
            Arc::new(insurers),
            config,
        ));
        let renewals = RenewalOrchestrator::new(&collaborators, Arc::clone(&pipeline));
        let expiry = ExpiringLimitSweep::new(&collaborators);
        Self {
            collaborators,
            pipeline,
            renewals,
            expiry,
        }
    }

    pub fn pipeline(&self) -> Arc<AutomationPipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Create a draft for the client/debtor pair, or re-point an existing draft at a new pair.
    pub async fn store_company_details(
        &self,
        request: CompanyDetailsRequest,
        actor: &Actor,
    ) -> Result<CompanyStep, IntakeError> {
        let CompanyDetailsRequest {
            application_key,
            client_id,
            debtor: details,
        } = request;

        if details.entity_name.trim().is_empty() {
            return Err(IntakeError::RequiredFieldMissing("entityName"));
        }
        let Some(identifier) = details.identifier() else {
            return Err(IntakeError::RequiredFieldMissing("abn"));
        };

        let client = self
            .collaborators
            .parties
            .client(&client_id)
            .await?
            .ok_or_else(|| IntakeError::UnknownParty {
                entity: "client",
                id: client_id.0.clone(),
            })?;

        // Nothing is written until the request has passed the duplicate and lifecycle checks.
        let known = self.collaborators.parties.find_debtor(&identifier).await?;
        let blocking = match &known {
            Some(existing) => {
                self.collaborators
                    .applications
                    .find_blocking(&client.id, &existing.id)
                    .await?
            }
            None => None,
        };

        let edit = match application_key {
            Some(key) => {
                let application = self.load(&key).await?;
                if let Some(other) = blocking.filter(|other| other.key != application.key) {
                    return Err(IntakeError::ApplicationAlreadyExists(other.application_id));
                }
                let state = transition(lifecycle_of(&application), LifecycleEvent::CompanyStored)?;
                Some((application, state))
            }
            None => {
                if let Some(existing) = blocking {
                    return Err(IntakeError::ApplicationAlreadyExists(
                        existing.application_id,
                    ));
                }
                None
            }
        };

        // An existing debtor is refreshed only after the application write.
        let (debtor, refresh) = match known {
            Some(existing) => (existing, Some(details)),
            None => (self.collaborators.parties.save_debtor(details).await?, None),
        };

        let application = match edit {
            Some((mut application, state)) => {
                if let Some(rebased) = application
                    .application_id
                    .rebase(&client.client_code, &debtor.debtor_code)
                {
                    application.application_id = rebased;
                }
                application.client_id = client.id.clone();
                application.debtor_id = debtor.id.clone();
                application.client_debtor_id = ClientDebtorId::for_pair(&client.id, &debtor.id);
                application.stage = state.stage;
                self.collaborators
                    .applications
                    .update(application.clone())
                    .await?;
                debug!(application_id = %application.application_id, "draft company details updated");
                application
            }
            None => {
                let now = Utc::now();
                let sequence = self
                    .collaborators
                    .sequence
                    .next_application_number()
                    .await?;
                let initial = LifecycleState::initial();
                let draft = Application {
                    key: ApplicationKey::new(),
                    application_id: ApplicationId::compose(
                        &client.client_code,
                        &debtor.debtor_code,
                        now.date_naive(),
                        sequence,
                    ),
                    client_id: client.id.clone(),
                    debtor_id: debtor.id.clone(),
                    client_debtor_id: ClientDebtorId::for_pair(&client.id, &debtor.id),
                    stage: initial.stage,
                    status: initial.status,
                    credit_limit: None,
                    accepted_amount: None,
                    blockers: Vec::new(),
                    is_auto_approved: false,
                    approval_date: None,
                    expiry_date: None,
                    payment_terms: PaymentTerms::default(),
                    outstanding_amount: None,
                    order_on_hand: None,
                    note: String::new(),
                    created_by_type: actor.kind,
                    created_by_id: actor.id.clone(),
                    created_at: now,
                };
                let stored = match self
                    .collaborators
                    .applications
                    .insert_if_no_blocking(draft)
                    .await
                {
                    Ok(stored) => stored,
                    Err(RepositoryError::OpenApplication(open)) => {
                        return Err(IntakeError::ApplicationAlreadyExists(open))
                    }
                    Err(other) => return Err(other.into()),
                };
                info!(application_id = %stored.application_id, "draft application created");
                stored
            }
        };

        let debtor = match refresh {
            Some(details) => self.collaborators.parties.save_debtor(details).await?,
            None => debtor,
        };

        let stakeholders = self
            .collaborators
            .stakeholders
            .for_debtor(&debtor.id)
            .await?;

        Ok(CompanyStep {
            application,
            debtor,
            stakeholders,
        })
    }

    /// Validate and store the debtor's stakeholders. Field checks run before the count rule.
    pub async fn store_partner_details(
        &self,
        key: &ApplicationKey,
        request: PartnerDetailsRequest,
    ) -> Result<Application, IntakeError> {
        let mut application = self.load(key).await?;
        let debtor = self.debtor_of(&application).await?;

        if let Some(field) = request.partners.iter().find_map(PartnerSubmission::missing_field) {
            return Err(IntakeError::RequiredFieldMissing(field));
        }
        let companies = request.partners.iter().filter(|p| p.is_company()).count();
        let individuals = request.partners.len() - companies;
        if !partner_disclosure_sufficient(debtor.entity_type, individuals, companies) {
            return Err(IntakeError::InsufficientData(debtor.entity_type));
        }

        let state = transition(
            lifecycle_of(&application),
            LifecycleEvent::StakeholdersStored,
        )?;

        let stakeholders = dedupe_by_natural_key(
            request
                .partners
                .into_iter()
                .filter_map(|partner| partner.into_stakeholder(&debtor.id))
                .collect(),
        );
        let store = &self.collaborators.stakeholders;
        try_join_all(
            stakeholders
                .into_iter()
                .map(|stakeholder| store.upsert(stakeholder)),
        )
        .await?;

        application.stage = state.stage;
        self.collaborators
            .applications
            .update(application.clone())
            .await?;
        Ok(application)
    }

    pub async fn store_credit_limit_details(
        &self,
        key: &ApplicationKey,
        request: CreditLimitRequest,
    ) -> Result<Application, IntakeError> {
        if request.credit_limit <= Decimal::ZERO {
            return Err(IntakeError::InvalidCreditLimit);
        }
        let mut application = self.load(key).await?;
        let debtor = self.debtor_of(&application).await?;

        let state = transition(
            lifecycle_of(&application),
            LifecycleEvent::CreditLimitStored {
                requires_disclosure: debtor.entity_type.requires_stakeholder_disclosure(),
            },
        )?;

        application.stage = state.stage;
        application.credit_limit = Some(request.credit_limit);
        application.payment_terms = request.payment_terms;
        application.outstanding_amount = request.outstanding_amount;
        application.order_on_hand = request.order_on_hand;
        application.note = request.note;
        self.collaborators
            .applications
            .update(application.clone())
            .await?;
        Ok(application)
    }

    /// Submit a completed draft and run automated decisioning on it.
    pub async fn submit(
        &self,
        key: &ApplicationKey,
        actor: &Actor,
    ) -> Result<DecisionReport, IntakeError> {
        let mut application = self.load(key).await?;
        let debtor = self.debtor_of(&application).await?;

        let state = transition(
            lifecycle_of(&application),
            LifecycleEvent::Submitted {
                requires_disclosure: debtor.entity_type.requires_stakeholder_disclosure(),
            },
        )?;
        application.status = state.status;
        self.collaborators
            .applications
            .update(application.clone())
            .await?;
        info!(application_id = %application.application_id, "application submitted");

        Ok(self.pipeline.run_with_retry(key, actor).await?)
    }

    /// Re-run decisioning for an application left SUBMITTED or PENDING_AUTOMATION by a failed
    /// run. Decided applications are refused with `ALREADY_DECIDED`.
    pub async fn retry_automation(
        &self,
        key: &ApplicationKey,
        actor: &Actor,
    ) -> Result<DecisionReport, IntakeError> {
        let application = self.load(key).await?;
        info!(
            application_id = %application.application_id,
            status = %application.status,
            "automation retry requested"
        );
        Ok(self.pipeline.run_with_retry(key, actor).await?)
    }

    pub async fn record_underwriter_decision(
        &self,
        key: &ApplicationKey,
        decision: UnderwriterDecision,
        actor: &Actor,
    ) -> Result<DecisionReport, IntakeError> {
        let application = self.load(key).await?;
        let client = self
            .collaborators
            .parties
            .client(&application.client_id)
            .await?
            .ok_or_else(|| IntakeError::UnknownParty {
                entity: "client",
                id: application.client_id.0.clone(),
            })?;
        let finalizer = self.pipeline.finalizer();

        let report = match decision {
            UnderwriterDecision::Approve { accepted_amount } => {
                let amount = accepted_amount
                    .or(application.credit_limit)
                    .filter(|amount| *amount > Decimal::ZERO)
                    .ok_or(IntakeError::InvalidCreditLimit)?;
                finalizer
                    .underwriter_approve(application, &client, amount, actor, Utc::now())
                    .await?
            }
            UnderwriterDecision::Decline => {
                finalizer
                    .underwriter_decline(application, &client, actor)
                    .await?
            }
        };
        Ok(report)
    }

    pub async fn renew(
        &self,
        client_debtor_id: &ClientDebtorId,
        credit_limit: Decimal,
        actor: &Actor,
    ) -> Result<Option<RenewalTicket>, IntakeError> {
        Ok(self
            .renewals
            .renew(client_debtor_id, credit_limit, actor)
            .await?)
    }

    pub async fn get(&self, key: &ApplicationKey) -> Result<Application, IntakeError> {
        self.load(key).await
    }

    pub async fn notify_expiring_limits(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SweepSummary, IntakeError> {
        Ok(self.expiry.notify_expiring_limits(start, end).await?)
    }

    async fn load(&self, key: &ApplicationKey) -> Result<Application, IntakeError> {
        self.collaborators
            .applications
            .fetch(key)
            .await?
            .ok_or_else(|| IntakeError::NoApplicationFound(key.to_string()))
    }

    async fn debtor_of(&self, application: &Application) -> Result<Debtor, IntakeError> {
        self.collaborators
            .parties
            .debtor(&application.debtor_id)
            .await?
            .ok_or_else(|| IntakeError::UnknownParty {
                entity: "debtor",
                id: application.debtor_id.0.clone(),
            })
    }
}

fn lifecycle_of(application: &Application) -> LifecycleState {
    LifecycleState {
        stage: application.stage,
        status: application.status,
    }
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("application {0} already exists for this client and debtor")]
    ApplicationAlreadyExists(ApplicationId),
    #[error("no application found for {0}")]
    NoApplicationFound(String),
    #[error("required field {0} is missing")]
    RequiredFieldMissing(&'static str),
    #[error("stakeholder details are insufficient for a {0:?} debtor")]
    InsufficientData(EntityType),
    #[error("credit limit must be greater than zero")]
    InvalidCreditLimit,
    #[error("{entity} {id} not found")]
    UnknownParty { entity: &'static str, id: String },
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Automation(#[from] AutomationError),
    #[error(transparent)]
    Renewal(#[from] RenewalError),
}

impl IntakeError {
    /// Machine-readable code returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            IntakeError::ApplicationAlreadyExists(_) => "APPLICATION_ALREADY_EXISTS",
            IntakeError::NoApplicationFound(_) => "NO_APPLICATION_FOUND",
            IntakeError::RequiredFieldMissing(_) => "REQUIRE_FIELD_MISSING",
            IntakeError::InsufficientData(_) => "INSUFFICIENT_DATA",
            IntakeError::InvalidCreditLimit => "INVALID_CREDIT_LIMIT",
            IntakeError::UnknownParty { .. } => "NO_RECORD_FOUND",
            IntakeError::Lifecycle(_) => "INVALID_TRANSITION",
            IntakeError::Repository(_) => "REPOSITORY_UNAVAILABLE",
            IntakeError::Automation(AutomationError::Lifecycle(_)) => "INVALID_TRANSITION",
            IntakeError::Automation(AutomationError::AlreadyDecided { .. }) => "ALREADY_DECIDED",
            IntakeError::Automation(_) => "AUTOMATION_FAILED",
            IntakeError::Renewal(RenewalError::InvalidCreditLimit) => "INVALID_CREDIT_LIMIT",
            IntakeError::Renewal(RenewalError::AlreadyInProgress(_)) => {
                "APPLICATION_ALREADY_EXISTS"
            }
            IntakeError::Renewal(_) => "RENEWAL_FAILED",
        }
    }

    /// Whether the caller can fix the request, as opposed to a collaborator failure.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self.code(),
            "REPOSITORY_UNAVAILABLE" | "AUTOMATION_FAILED" | "RENEWAL_FAILED"
        )
    }
}
