use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    ActiveLimitUpdate, Application, ApplicationId, ApplicationKey, Client, ClientDebtor,
    ClientDebtorId, ClientId, Debtor, DebtorDetails, DebtorId, DebtorIdentifier, Policy,
    PolicyProduct,
};
use super::stakeholders::Stakeholder;

/// Storage abstraction for application documents.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Insert unless the pair already has an application whose status blocks a new one. The
    /// check and the write are atomic; a blocked insert fails with `OpenApplication`.
    async fn insert_if_no_blocking(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError>;
    async fn update(&self, application: Application) -> Result<(), RepositoryError>;
    async fn fetch(&self, key: &ApplicationKey) -> Result<Option<Application>, RepositoryError>;
    /// Any application for the pair whose status blocks a new one.
    async fn find_blocking(
        &self,
        client_id: &ClientId,
        debtor_id: &DebtorId,
    ) -> Result<Option<Application>, RepositoryError>;
    /// Most recently created APPROVED application for a credit-limit record.
    async fn latest_approved(
        &self,
        client_debtor_id: &ClientDebtorId,
    ) -> Result<Option<Application>, RepositoryError>;
}

/// Active credit-limit records (client-debtor links).
#[async_trait]
pub trait ClientDebtorStore: Send + Sync {
    async fn upsert_active_limit(
        &self,
        client_id: &ClientId,
        debtor_id: &DebtorId,
        update: ActiveLimitUpdate,
    ) -> Result<ClientDebtor, RepositoryError>;
    async fn expiring_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClientDebtor>, RepositoryError>;
}

/// Client and debtor master data.
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn client(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError>;
    async fn debtor(&self, id: &DebtorId) -> Result<Option<Debtor>, RepositoryError>;
    async fn find_debtor(
        &self,
        identifier: &DebtorIdentifier,
    ) -> Result<Option<Debtor>, RepositoryError>;
    /// Create the debtor or refresh the one matching the details' identifier.
    async fn save_debtor(&self, details: DebtorDetails) -> Result<Debtor, RepositoryError>;
}

/// Debtor directors keyed by their natural identity.
#[async_trait]
pub trait StakeholderStore: Send + Sync {
    /// Conditional upsert on `Stakeholder::natural_key`.
    async fn upsert(&self, stakeholder: Stakeholder) -> Result<(), RepositoryError>;
    async fn for_debtor(&self, debtor_id: &DebtorId) -> Result<Vec<Stakeholder>, RepositoryError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_active_policy(
        &self,
        client_id: &ClientId,
        product: PolicyProduct,
        at: DateTime<Utc>,
    ) -> Result<Option<Policy>, RepositoryError>;
}

/// Organisation-wide application counter backing the `NNN` id segment.
#[async_trait]
pub trait ApplicationSequence: Send + Sync {
    /// Atomically increment and return the new value.
    async fn next_application_number(&self) -> Result<u32, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("application {0} is still open for this client and debtor")]
    OpenApplication(ApplicationId),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
