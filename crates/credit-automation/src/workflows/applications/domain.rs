use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque persistence key for an application; stable across intake edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationKey(pub Uuid);

impl ApplicationKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApplicationKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Human facing application code: `{clientCode}-{debtorCode}-{YYYYMMDD}-{NNN}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn compose(client_code: &str, debtor_code: &str, date: NaiveDate, sequence: u32) -> Self {
        Self(format!(
            "{client_code}-{debtor_code}-{}-{sequence:03}",
            date.format("%Y%m%d")
        ))
    }

    /// Swap the client/debtor codes while keeping the original date and sequence segments.
    pub fn rebase(&self, client_code: &str, debtor_code: &str) -> Option<Self> {
        let mut segments = self.0.rsplitn(3, '-');
        let sequence = segments.next()?;
        let date = segments.next()?;
        segments.next()?;
        Some(Self(format!("{client_code}-{debtor_code}-{date}-{sequence}")))
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebtorId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Identifier of the credit-limit record for a client/debtor pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientDebtorId(pub String);

impl ClientDebtorId {
    pub fn for_pair(client_id: &ClientId, debtor_id: &DebtorId) -> Self {
        Self(format!("{}:{}", client_id.0, debtor_id.0))
    }
}

impl fmt::Display for ClientDebtorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who performed an action; mirrors `createdByType` / `assigneeType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActorType {
    User,
    ClientUser,
    System,
}

impl ActorType {
    pub const fn label(self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::ClientUser => "client-user",
            ActorType::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(rename = "type")]
    pub kind: ActorType,
    pub id: UserId,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            kind: ActorType::System,
            id: UserId("system".to_string()),
        }
    }
}

/// Intake progress marker. Stage 2 means "stakeholders stored" for disclosure entities and
/// "credit limit stored" for simple entities; stage 3 is only reached by disclosure entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ApplicationStage {
    Company = 1,
    Stakeholders = 2,
    CreditLimit = 3,
}

impl From<ApplicationStage> for u8 {
    fn from(stage: ApplicationStage) -> Self {
        stage as u8
    }
}

impl TryFrom<u8> for ApplicationStage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ApplicationStage::Company),
            2 => Ok(ApplicationStage::Stakeholders),
            3 => Ok(ApplicationStage::CreditLimit),
            other => Err(format!("application stage {other} out of range 1..=3")),
        }
    }
}

/// Lifecycle status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    PendingAutomation,
    ReviewApplication,
    Approved,
    Declined,
    Withdrawn,
    Cancelled,
    Surrendered,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "DRAFT",
            ApplicationStatus::Submitted => "SUBMITTED",
            ApplicationStatus::PendingAutomation => "PENDING_AUTOMATION",
            ApplicationStatus::ReviewApplication => "REVIEW_APPLICATION",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Declined => "DECLINED",
            ApplicationStatus::Withdrawn => "WITHDRAWN",
            ApplicationStatus::Cancelled => "CANCELLED",
            ApplicationStatus::Surrendered => "SURRENDERED",
        }
    }

    /// Whether an application in this status prevents a new one for the same pair.
    pub const fn blocks_new_application(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Draft
                | ApplicationStatus::Submitted
                | ApplicationStatus::PendingAutomation
                | ApplicationStatus::ReviewApplication
        )
    }

    /// Statuses the decisioning pipeline may move out of.
    pub const fn awaits_decision(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted | ApplicationStatus::PendingAutomation
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Legal entity type recorded against a debtor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    ProprietaryLimited,
    LimitedCompany,
    Partnership,
    SoleTrader,
    Trust,
    Business,
    Corporation,
    Government,
    Incorporated,
    NoLiability,
    Proprietary,
    RegisteredBody,
    #[serde(other)]
    Unrecognized,
}

impl EntityType {
    /// Trusts and partnerships disclose stakeholders before the credit limit is captured.
    pub const fn requires_stakeholder_disclosure(self) -> bool {
        matches!(self, EntityType::Trust | EntityType::Partnership)
    }
}

/// Credit-insurance client on whose behalf limits are requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub client_code: String,
    pub is_auto_approve_allowed: bool,
    pub insurer_name: Option<String>,
    pub risk_analyst_id: Option<UserId>,
}

/// Buyer the credit limit is granted against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debtor {
    pub id: DebtorId,
    pub debtor_code: String,
    pub entity_name: String,
    pub entity_type: EntityType,
    pub country_code: Option<String>,
    pub abn: Option<String>,
    pub acn: Option<String>,
    pub registration_number: Option<String>,
}

/// Identifier used to find an existing debtor during company intake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DebtorIdentifier {
    RegistrationNumber(String),
    Abn(String),
    Acn(String),
}

/// Company details captured on the first intake step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtorDetails {
    pub entity_name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub abn: Option<String>,
    #[serde(default)]
    pub acn: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
}

impl DebtorDetails {
    /// Registration number wins over ABN, which wins over ACN.
    pub fn identifier(&self) -> Option<DebtorIdentifier> {
        non_blank(&self.registration_number)
            .map(DebtorIdentifier::RegistrationNumber)
            .or_else(|| non_blank(&self.abn).map(DebtorIdentifier::Abn))
            .or_else(|| non_blank(&self.acn).map(DebtorIdentifier::Acn))
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Payment-terms disclosures carried from one application to its renewal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerms {
    pub is_extended_payment_terms: bool,
    #[serde(default)]
    pub extended_payment_terms_details: String,
    pub is_passed_overdue_amount: bool,
    #[serde(default)]
    pub passed_overdue_details: String,
}

/// One credit-limit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub key: ApplicationKey,
    pub application_id: ApplicationId,
    pub client_id: ClientId,
    pub debtor_id: DebtorId,
    pub client_debtor_id: ClientDebtorId,
    pub stage: ApplicationStage,
    pub status: ApplicationStatus,
    pub credit_limit: Option<Decimal>,
    pub accepted_amount: Option<Decimal>,
    pub blockers: Vec<String>,
    pub is_auto_approved: bool,
    pub approval_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payment_terms: PaymentTerms,
    pub outstanding_amount: Option<Decimal>,
    pub order_on_hand: Option<Decimal>,
    pub note: String,
    pub created_by_type: ActorType,
    pub created_by_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            key: self.key,
            application_id: self.application_id.clone(),
            stage: self.stage.into(),
            status: self.status.label(),
            credit_limit: self.credit_limit,
            accepted_amount: self.accepted_amount,
            blockers: self.blockers.clone(),
            is_auto_approved: self.is_auto_approved,
            expiry_date: self.expiry_date,
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatusView {
    pub key: ApplicationKey,
    pub application_id: ApplicationId,
    pub stage: u8,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_limit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_amount: Option<Decimal>,
    pub blockers: Vec<String>,
    pub is_auto_approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Currently effective credit limit for a client/debtor pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDebtor {
    pub id: ClientDebtorId,
    pub client_id: ClientId,
    pub debtor_id: DebtorId,
    pub credit_limit: Option<Decimal>,
    pub is_endorsed_limit: bool,
    pub active_application_id: Option<ApplicationKey>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Fields written by `ClientDebtorStore::upsert_active_limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveLimitUpdate {
    pub credit_limit: Decimal,
    pub is_endorsed_limit: bool,
    pub active_application_id: ApplicationKey,
    pub expiry_date: DateTime<Utc>,
}

/// Insurance product family a policy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyProduct {
    CreditInsurance,
    RiskManagement,
}

impl PolicyProduct {
    /// Product names are free text; match on the family keyword.
    pub fn matches(self, product: &str) -> bool {
        match self {
            PolicyProduct::CreditInsurance => product.contains("Credit Insurance"),
            PolicyProduct::RiskManagement => product.contains("Risk Management"),
        }
    }

    pub const fn short_name(self) -> &'static str {
        match self {
            PolicyProduct::CreditInsurance => "CI",
            PolicyProduct::RiskManagement => "RMP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub client_id: ClientId,
    pub product: String,
    pub inception_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub discretionary_limit: Option<Decimal>,
    pub excess: Option<Decimal>,
}

impl Policy {
    pub fn is_in_force(&self, at: DateTime<Utc>) -> bool {
        self.inception_date <= at && at < self.expiry_date
    }
}
