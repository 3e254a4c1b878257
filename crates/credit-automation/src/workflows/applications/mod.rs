//! Credit application intake, automated decisioning and renewal.
//!
//! Intake moves a draft through the company, stakeholder and credit-limit steps; submission runs
//! the [`automation`] gate and the [`decision`] finalizer, which either auto-approves the limit or
//! routes the application to a risk analyst. Collaborators are async traits bundled in
//! [`Collaborators`]; [`memory`] provides in-process implementations.

pub mod automation;
mod collaborators;
pub mod decision;
pub mod domain;
pub mod expiry;
pub mod lifecycle;
pub mod memory;
pub mod notify;
pub mod renewal;
pub mod repository;
pub mod router;
pub mod service;
pub mod stakeholders;

#[cfg(test)]
mod tests;

pub use automation::{
    AutomationError, AutomationPipeline, Classification, ClassifierError, DisclosureClassifier,
    EligibilityGate, EntityClassifier, GateOutcome, GateStep, Insurer, InsurerContext,
    InsurerRegistry, InsurerResolution, InsurerRules, PolicyFigures, UnderwritingAppetite,
};
pub use collaborators::Collaborators;
pub use decision::{
    DecisionFinalizer, DecisionKind, DecisionReport, APPROVAL_VALIDITY_MONTHS,
    REVIEW_TASK_DUE_DAYS,
};
pub use domain::{
    Actor, ActorType, Application, ApplicationId, ApplicationKey, ApplicationStage,
    ApplicationStatus, ApplicationStatusView, Client, ClientDebtor, ClientDebtorId, ClientId,
    Debtor, DebtorDetails, DebtorId, EntityType, PaymentTerms, Policy, PolicyProduct, UserId,
};
pub use expiry::{ExpiringLimitSweep, ExpiryNotice, SweepSummary};
pub use lifecycle::{LifecycleError, LifecycleEvent, LifecycleState};
pub use memory::{in_memory_collaborators, MemoryOutbox, MemoryStore};
pub use notify::{NotificationKind, SinkError};
pub use renewal::{RenewalError, RenewalOrchestrator, RenewalTicket};
pub use repository::RepositoryError;
pub use router::application_router;
pub use service::{
    CompanyDetailsRequest, CompanyStep, CreditApplicationService, CreditLimitRequest,
    IntakeError, PartnerDetailsRequest, UnderwriterDecision,
};
pub use stakeholders::{partner_disclosure_sufficient, PartnerSubmission, Stakeholder};
