use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::AutomationConfig;
use crate::workflows::applications::automation::{
    DisclosureClassifier, EligibilityGate, InsurerRegistry,
};
use crate::workflows::applications::domain::{
    ActiveLimitUpdate, Actor, ActorType, Application, ApplicationId, ApplicationKey,
    ApplicationStage, ApplicationStatus, Client, ClientDebtor, ClientDebtorId, ClientId, Debtor,
    DebtorId, EntityType, PaymentTerms, Policy, PolicyProduct, UserId,
};
use crate::workflows::applications::memory::{in_memory_collaborators, MemoryOutbox, MemoryStore};
use crate::workflows::applications::notify::{Notification, NotificationSink, SinkError};
use crate::workflows::applications::repository::{
    ApplicationRepository, ClientDebtorStore, PolicyRepository, RepositoryError,
};
use crate::workflows::applications::stakeholders::{PartnerSubmission, StakeholderAddress};
use crate::workflows::applications::{Collaborators, CreditApplicationService};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn amount(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("valid decimal")
}

pub(super) fn analyst() -> UserId {
    UserId("analyst-7".to_string())
}

pub(super) fn client() -> Client {
    Client {
        id: ClientId("client-1".to_string()),
        name: "Southern Cross Wholesale".to_string(),
        client_code: "SCW".to_string(),
        is_auto_approve_allowed: true,
        insurer_name: Some("QBE Insurance (Australia)".to_string()),
        risk_analyst_id: Some(analyst()),
    }
}

pub(super) fn debtor() -> Debtor {
    Debtor {
        id: DebtorId("debtor-1".to_string()),
        debtor_code: "D0001".to_string(),
        entity_name: "Harbour Traders Pty Ltd".to_string(),
        entity_type: EntityType::ProprietaryLimited,
        country_code: Some("AUS".to_string()),
        abn: Some("51824753556".to_string()),
        acn: None,
        registration_number: None,
    }
}

pub(super) fn policy(product: &str, discretionary: Option<&str>, excess: Option<&str>) -> Policy {
    let reference = now();
    Policy {
        id: format!("policy-{}", product.len()),
        client_id: client().id,
        product: product.to_string(),
        inception_date: reference - chrono::Duration::days(180),
        expiry_date: Utc
            .with_ymd_and_hms(2099, 12, 31, 0, 0, 0)
            .single()
            .expect("valid timestamp"),
        discretionary_limit: discretionary.map(amount),
        excess: excess.map(amount),
    }
}

pub(super) fn ci_policy(discretionary: Option<&str>) -> Policy {
    policy("Trade Credit Insurance", discretionary, None)
}

pub(super) fn rmp_policy(discretionary: Option<&str>) -> Policy {
    policy("Risk Management Package", discretionary, None)
}

pub(super) fn application(status: ApplicationStatus, credit_limit: &str) -> Application {
    let client = client();
    let debtor = debtor();
    Application {
        key: ApplicationKey::new(),
        application_id: ApplicationId::compose(
            &client.client_code,
            &debtor.debtor_code,
            NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date"),
            1,
        ),
        client_id: client.id.clone(),
        debtor_id: debtor.id.clone(),
        client_debtor_id: ClientDebtorId::for_pair(&client.id, &debtor.id),
        stage: ApplicationStage::Stakeholders,
        status,
        credit_limit: Some(amount(credit_limit)),
        accepted_amount: None,
        blockers: Vec::new(),
        is_auto_approved: false,
        approval_date: None,
        expiry_date: None,
        payment_terms: PaymentTerms::default(),
        outstanding_amount: None,
        order_on_hand: None,
        note: String::new(),
        created_by_type: ActorType::ClientUser,
        created_by_id: UserId("client-user-1".to_string()),
        created_at: now(),
    }
}

pub(super) fn underwriter() -> Actor {
    Actor {
        kind: ActorType::User,
        id: analyst(),
    }
}

/// Store seeded with one client, one domestic debtor and in-force CI and RMP policies.
pub(super) struct Fixture {
    pub store: MemoryStore,
    pub outbox: MemoryOutbox,
}

impl Fixture {
    pub(super) fn new() -> Self {
        let fixture = Self::bare();
        fixture.store.seed_policy(ci_policy(Some("100000")));
        fixture.store.seed_policy(rmp_policy(None));
        fixture
    }

    /// Client and debtor only; no policies on file.
    pub(super) fn bare() -> Self {
        let store = MemoryStore::default();
        store.seed_client(client());
        store.seed_debtor(debtor());
        Self {
            store,
            outbox: MemoryOutbox::default(),
        }
    }

    pub(super) fn with_client(self, client: Client) -> Self {
        self.store.seed_client(client);
        self
    }

    pub(super) fn with_debtor(self, debtor: Debtor) -> Self {
        self.store.seed_debtor(debtor);
        self
    }

    pub(super) fn collaborators(&self) -> Collaborators {
        in_memory_collaborators(&self.store, &self.outbox)
    }

    pub(super) fn gate(&self) -> EligibilityGate {
        let collaborators = self.collaborators();
        EligibilityGate::new(
            collaborators.policies,
            collaborators.classifier,
            Arc::new(InsurerRegistry::with_defaults()),
            Duration::from_secs(1),
        )
    }

    pub(super) fn service(&self) -> CreditApplicationService {
        service_with(self.collaborators())
    }
}

pub(super) fn service_with(collaborators: Collaborators) -> CreditApplicationService {
    CreditApplicationService::new(collaborators, InsurerRegistry::with_defaults(), &fast_config())
}

pub(super) fn fast_config() -> AutomationConfig {
    AutomationConfig {
        policy_lookup_timeout: Duration::from_millis(200),
        renewal_max_attempts: 3,
        renewal_retry_backoff: Duration::from_millis(5),
    }
}

pub(super) fn gate_with_policies(
    fixture: &Fixture,
    policies: Arc<dyn PolicyRepository>,
    timeout: Duration,
) -> EligibilityGate {
    EligibilityGate::new(
        policies,
        Arc::new(DisclosureClassifier::new(Arc::new(fixture.store.clone()))),
        Arc::new(InsurerRegistry::with_defaults()),
        timeout,
    )
}

/// Policy source that never answers inside a test's timeout.
pub(super) struct SlowPolicies {
    pub delay: Duration,
}

#[async_trait]
impl PolicyRepository for SlowPolicies {
    async fn find_active_policy(
        &self,
        _client_id: &ClientId,
        _product: PolicyProduct,
        _at: DateTime<Utc>,
    ) -> Result<Option<Policy>, RepositoryError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }
}

pub(super) struct UnavailablePolicies;

#[async_trait]
impl PolicyRepository for UnavailablePolicies {
    async fn find_active_policy(
        &self,
        _client_id: &ClientId,
        _product: PolicyProduct,
        _at: DateTime<Utc>,
    ) -> Result<Option<Policy>, RepositoryError> {
        Err(RepositoryError::Unavailable("policy service offline".to_string()))
    }
}

pub(super) struct FailingNotifications;

#[async_trait]
impl NotificationSink for FailingNotifications {
    async fn notify(
        &self,
        _user_id: &UserId,
        _user_type: ActorType,
        _description: String,
    ) -> Result<Notification, SinkError> {
        Err(SinkError::Transport("notification service offline".to_string()))
    }
}

/// Application repository whose fetches fail a fixed number of times before delegating.
pub(super) struct FlakyApplications {
    pub inner: MemoryStore,
    pub healthy_fetches: AtomicU32,
    pub remaining_failures: AtomicU32,
}

impl FlakyApplications {
    pub(super) fn new(inner: MemoryStore, failures: u32) -> Self {
        Self::failing_after(inner, 0, failures)
    }

    /// Lets `healthy` fetches through before the failures start.
    pub(super) fn failing_after(inner: MemoryStore, healthy: u32, failures: u32) -> Self {
        Self {
            inner,
            healthy_fetches: AtomicU32::new(healthy),
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ApplicationRepository for FlakyApplications {
    async fn insert_if_no_blocking(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        self.inner.insert_if_no_blocking(application).await
    }

    async fn update(&self, application: Application) -> Result<(), RepositoryError> {
        ApplicationRepository::update(&self.inner, application).await
    }

    async fn fetch(&self, key: &ApplicationKey) -> Result<Option<Application>, RepositoryError> {
        if !take_one(&self.healthy_fetches) && take_one(&self.remaining_failures) {
            return Err(RepositoryError::Unavailable("connection reset".to_string()));
        }
        ApplicationRepository::fetch(&self.inner, key).await
    }

    async fn find_blocking(
        &self,
        client_id: &ClientId,
        debtor_id: &DebtorId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_blocking(client_id, debtor_id).await
    }

    async fn latest_approved(
        &self,
        client_debtor_id: &ClientDebtorId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.latest_approved(client_debtor_id).await
    }
}

/// Hands control back to the scheduler after every duplicate check, so concurrent intake
/// requests interleave between the check and the insert.
pub(super) struct InterleavingApplications {
    pub inner: MemoryStore,
}

#[async_trait]
impl ApplicationRepository for InterleavingApplications {
    async fn insert_if_no_blocking(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        self.inner.insert_if_no_blocking(application).await
    }

    async fn update(&self, application: Application) -> Result<(), RepositoryError> {
        ApplicationRepository::update(&self.inner, application).await
    }

    async fn fetch(&self, key: &ApplicationKey) -> Result<Option<Application>, RepositoryError> {
        ApplicationRepository::fetch(&self.inner, key).await
    }

    async fn find_blocking(
        &self,
        client_id: &ClientId,
        debtor_id: &DebtorId,
    ) -> Result<Option<Application>, RepositoryError> {
        let found = self.inner.find_blocking(client_id, debtor_id).await;
        tokio::task::yield_now().await;
        found
    }

    async fn latest_approved(
        &self,
        client_debtor_id: &ClientDebtorId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.latest_approved(client_debtor_id).await
    }
}

/// Application repository that refuses every update.
pub(super) struct RejectingUpdates {
    pub inner: MemoryStore,
}

#[async_trait]
impl ApplicationRepository for RejectingUpdates {
    async fn insert_if_no_blocking(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        self.inner.insert_if_no_blocking(application).await
    }

    async fn update(&self, _application: Application) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    async fn fetch(&self, key: &ApplicationKey) -> Result<Option<Application>, RepositoryError> {
        ApplicationRepository::fetch(&self.inner, key).await
    }

    async fn find_blocking(
        &self,
        client_id: &ClientId,
        debtor_id: &DebtorId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_blocking(client_id, debtor_id).await
    }

    async fn latest_approved(
        &self,
        client_debtor_id: &ClientDebtorId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.latest_approved(client_debtor_id).await
    }
}

pub(super) struct UnavailableLimits;

#[async_trait]
impl ClientDebtorStore for UnavailableLimits {
    async fn upsert_active_limit(
        &self,
        _client_id: &ClientId,
        _debtor_id: &DebtorId,
        _update: ActiveLimitUpdate,
    ) -> Result<ClientDebtor, RepositoryError> {
        Err(RepositoryError::Unavailable("limit service offline".to_string()))
    }

    async fn expiring_between(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<ClientDebtor>, RepositoryError> {
        Ok(Vec::new())
    }
}

pub(super) fn individual(first_name: &str, date_of_birth: Option<NaiveDate>) -> PartnerSubmission {
    PartnerSubmission::Individual {
        title: Some("Ms".to_string()),
        first_name: Some(first_name.to_string()),
        last_name: Some("Nguyen".to_string()),
        date_of_birth,
        driver_licence_number: Some(format!("LIC-{first_name}")),
        address: Some(StakeholderAddress {
            street_number: Some("12".to_string()),
            street_name: Some("Wharf St".to_string()),
            suburb: Some("Pyrmont".to_string()),
            state: Some("NSW".to_string()),
            post_code: Some("2009".to_string()),
        }),
    }
}

pub(super) fn company(name: &str, abn: &str) -> PartnerSubmission {
    PartnerSubmission::Company {
        entity_name: Some(name.to_string()),
        entity_type: Some(EntityType::ProprietaryLimited),
        abn: Some(abn.to_string()),
        acn: None,
        registration_number: None,
    }
}

pub(super) fn birth_date(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 6, 1)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
