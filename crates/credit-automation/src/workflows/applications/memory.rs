//! In-process collaborators for demos and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::automation::DisclosureClassifier;
use super::collaborators::Collaborators;
use super::domain::{
    ActiveLimitUpdate, ActorType, Application, ApplicationKey, ApplicationStatus, Client,
    ClientDebtor, ClientDebtorId, ClientId, Debtor, DebtorDetails, DebtorId, DebtorIdentifier,
    Policy, PolicyProduct, UserId,
};
use super::notify::{
    AuditEntry, AuditSink, NewTask, Notification, NotificationChannel, NotificationKind,
    NotificationSink, SinkError, Task, TaskSink,
};
use super::repository::{
    ApplicationRepository, ApplicationSequence, ClientDebtorStore, PartyDirectory,
    PolicyRepository, RepositoryError, StakeholderStore,
};
use super::stakeholders::Stakeholder;

#[derive(Default)]
struct StoreState {
    applications: HashMap<ApplicationKey, Application>,
    limits: HashMap<ClientDebtorId, ClientDebtor>,
    clients: HashMap<ClientId, Client>,
    debtors: HashMap<DebtorId, Debtor>,
    stakeholders: Vec<Stakeholder>,
    policies: Vec<Policy>,
    application_sequence: u32,
}

/// Mutex-guarded store implementing every repository trait.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().expect("store mutex poisoned")
    }

    pub fn seed_client(&self, client: Client) {
        self.lock().clients.insert(client.id.clone(), client);
    }

    pub fn seed_debtor(&self, debtor: Debtor) {
        self.lock().debtors.insert(debtor.id.clone(), debtor);
    }

    pub fn seed_policy(&self, policy: Policy) {
        self.lock().policies.push(policy);
    }

    pub fn seed_application(&self, application: Application) {
        self.lock()
            .applications
            .insert(application.key, application);
    }

    pub fn seed_limit(&self, limit: ClientDebtor) {
        self.lock().limits.insert(limit.id.clone(), limit);
    }

    pub fn application(&self, key: &ApplicationKey) -> Option<Application> {
        self.lock().applications.get(key).cloned()
    }

    pub fn applications(&self) -> Vec<Application> {
        let mut all: Vec<_> = self.lock().applications.values().cloned().collect();
        all.sort_by_key(|application| application.created_at);
        all
    }

    pub fn limit(&self, id: &ClientDebtorId) -> Option<ClientDebtor> {
        self.lock().limits.get(id).cloned()
    }

    pub fn stakeholders(&self) -> Vec<Stakeholder> {
        self.lock().stakeholders.clone()
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn insert_if_no_blocking(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        let mut state = self.lock();
        if state.applications.contains_key(&application.key) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(open) = state.applications.values().find(|other| {
            other.client_id == application.client_id
                && other.debtor_id == application.debtor_id
                && other.status.blocks_new_application()
        }) {
            return Err(RepositoryError::OpenApplication(
                open.application_id.clone(),
            ));
        }
        state
            .applications
            .insert(application.key, application.clone());
        Ok(application)
    }

    async fn update(&self, application: Application) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        match state.applications.get_mut(&application.key) {
            Some(slot) => {
                *slot = application;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn fetch(&self, key: &ApplicationKey) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock().applications.get(key).cloned())
    }

    async fn find_blocking(
        &self,
        client_id: &ClientId,
        debtor_id: &DebtorId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self
            .lock()
            .applications
            .values()
            .find(|application| {
                application.client_id == *client_id
                    && application.debtor_id == *debtor_id
                    && application.status.blocks_new_application()
            })
            .cloned())
    }

    async fn latest_approved(
        &self,
        client_debtor_id: &ClientDebtorId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self
            .lock()
            .applications
            .values()
            .filter(|application| {
                application.client_debtor_id == *client_debtor_id
                    && application.status == ApplicationStatus::Approved
            })
            .max_by_key(|application| application.created_at)
            .cloned())
    }
}

#[async_trait]
impl ClientDebtorStore for MemoryStore {
    async fn upsert_active_limit(
        &self,
        client_id: &ClientId,
        debtor_id: &DebtorId,
        update: ActiveLimitUpdate,
    ) -> Result<ClientDebtor, RepositoryError> {
        let id = ClientDebtorId::for_pair(client_id, debtor_id);
        let mut state = self.lock();
        let record = state
            .limits
            .entry(id.clone())
            .or_insert_with(|| ClientDebtor {
                id,
                client_id: client_id.clone(),
                debtor_id: debtor_id.clone(),
                credit_limit: None,
                is_endorsed_limit: false,
                active_application_id: None,
                expiry_date: None,
                is_active: true,
            });
        record.credit_limit = Some(update.credit_limit);
        record.is_endorsed_limit = update.is_endorsed_limit;
        record.active_application_id = Some(update.active_application_id);
        record.expiry_date = Some(update.expiry_date);
        record.is_active = true;
        Ok(record.clone())
    }

    async fn expiring_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClientDebtor>, RepositoryError> {
        let mut expiring: Vec<_> = self
            .lock()
            .limits
            .values()
            .filter(|limit| {
                limit.is_active
                    && limit
                        .expiry_date
                        .map(|expiry| start <= expiry && expiry <= end)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        expiring.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(expiring)
    }
}

fn matches_identifier(debtor: &Debtor, identifier: &DebtorIdentifier) -> bool {
    match identifier {
        DebtorIdentifier::RegistrationNumber(number) => {
            debtor.registration_number.as_deref() == Some(number.as_str())
        }
        DebtorIdentifier::Abn(abn) => debtor.abn.as_deref() == Some(abn.as_str()),
        DebtorIdentifier::Acn(acn) => debtor.acn.as_deref() == Some(acn.as_str()),
    }
}

#[async_trait]
impl PartyDirectory for MemoryStore {
    async fn client(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        Ok(self.lock().clients.get(id).cloned())
    }

    async fn debtor(&self, id: &DebtorId) -> Result<Option<Debtor>, RepositoryError> {
        Ok(self.lock().debtors.get(id).cloned())
    }

    async fn find_debtor(
        &self,
        identifier: &DebtorIdentifier,
    ) -> Result<Option<Debtor>, RepositoryError> {
        Ok(self
            .lock()
            .debtors
            .values()
            .find(|debtor| matches_identifier(debtor, identifier))
            .cloned())
    }

    async fn save_debtor(&self, details: DebtorDetails) -> Result<Debtor, RepositoryError> {
        let identifier = details.identifier();
        let mut state = self.lock();
        let existing = identifier.as_ref().and_then(|identifier| {
            state
                .debtors
                .values()
                .find(|debtor| matches_identifier(debtor, identifier))
                .map(|debtor| (debtor.id.clone(), debtor.debtor_code.clone()))
        });
        let (id, debtor_code) = match existing {
            Some(found) => found,
            None => {
                let n = state.debtors.len() + 1;
                (DebtorId(format!("debtor-{n}")), format!("D{n:04}"))
            }
        };
        let debtor = Debtor {
            id: id.clone(),
            debtor_code,
            entity_name: details.entity_name,
            entity_type: details.entity_type,
            country_code: details.country_code,
            abn: details.abn,
            acn: details.acn,
            registration_number: details.registration_number,
        };
        state.debtors.insert(id, debtor.clone());
        Ok(debtor)
    }
}

#[async_trait]
impl StakeholderStore for MemoryStore {
    async fn upsert(&self, stakeholder: Stakeholder) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let key = stakeholder.natural_key();
        let position = key.as_ref().and_then(|key| {
            state
                .stakeholders
                .iter()
                .position(|existing| existing.natural_key().as_ref() == Some(key))
        });
        match position {
            Some(index) => state.stakeholders[index] = stakeholder,
            None => state.stakeholders.push(stakeholder),
        }
        Ok(())
    }

    async fn for_debtor(&self, debtor_id: &DebtorId) -> Result<Vec<Stakeholder>, RepositoryError> {
        Ok(self
            .lock()
            .stakeholders
            .iter()
            .filter(|stakeholder| stakeholder.debtor_id == *debtor_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PolicyRepository for MemoryStore {
    async fn find_active_policy(
        &self,
        client_id: &ClientId,
        product: PolicyProduct,
        at: DateTime<Utc>,
    ) -> Result<Option<Policy>, RepositoryError> {
        Ok(self
            .lock()
            .policies
            .iter()
            .filter(|policy| {
                policy.client_id == *client_id
                    && product.matches(&policy.product)
                    && policy.is_in_force(at)
            })
            .max_by_key(|policy| policy.inception_date)
            .cloned())
    }
}

#[async_trait]
impl ApplicationSequence for MemoryStore {
    async fn next_application_number(&self) -> Result<u32, RepositoryError> {
        let mut state = self.lock();
        state.application_sequence += 1;
        Ok(state.application_sequence)
    }
}

#[derive(Default)]
struct OutboxState {
    tasks: Vec<Task>,
    notifications: Vec<Notification>,
    pushes: Vec<(NotificationKind, Notification)>,
    audit: Vec<AuditEntry>,
}

/// Records every task, notification, push and audit entry it receives.
#[derive(Default, Clone)]
pub struct MemoryOutbox {
    state: Arc<Mutex<OutboxState>>,
}

impl MemoryOutbox {
    fn lock(&self) -> std::sync::MutexGuard<'_, OutboxState> {
        self.state.lock().expect("outbox mutex poisoned")
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn pushes(&self) -> Vec<(NotificationKind, Notification)> {
        self.lock().pushes.clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.lock().audit.clone()
    }
}

#[async_trait]
impl TaskSink for MemoryOutbox {
    async fn create_task(&self, task: NewTask) -> Result<Task, SinkError> {
        let mut state = self.lock();
        let created = Task {
            id: format!("task-{:04}", state.tasks.len() + 1),
            title: task.title,
            assignee_type: task.assignee_type,
            assignee_id: task.assignee_id,
            due_date: task.due_date,
        };
        state.tasks.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl NotificationSink for MemoryOutbox {
    async fn notify(
        &self,
        user_id: &UserId,
        user_type: ActorType,
        description: String,
    ) -> Result<Notification, SinkError> {
        let mut state = self.lock();
        let notification = Notification {
            id: format!("notification-{:04}", state.notifications.len() + 1),
            user_id: user_id.clone(),
            user_type,
            description,
        };
        state.notifications.push(notification.clone());
        Ok(notification)
    }
}

#[async_trait]
impl NotificationChannel for MemoryOutbox {
    async fn push(
        &self,
        kind: NotificationKind,
        notification: &Notification,
    ) -> Result<(), SinkError> {
        self.lock().pushes.push((kind, notification.clone()));
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryOutbox {
    async fn record(&self, entry: AuditEntry) -> Result<(), SinkError> {
        self.lock().audit.push(entry);
        Ok(())
    }
}

/// Wire a store and outbox into a full collaborator bundle using the default classifier.
pub fn in_memory_collaborators(store: &MemoryStore, outbox: &MemoryOutbox) -> Collaborators {
    let store = Arc::new(store.clone());
    let outbox = Arc::new(outbox.clone());
    Collaborators {
        applications: store.clone(),
        limits: store.clone(),
        parties: store.clone(),
        stakeholders: store.clone(),
        policies: store.clone(),
        sequence: store.clone(),
        classifier: Arc::new(DisclosureClassifier::new(store)),
        tasks: outbox.clone(),
        notifications: outbox.clone(),
        channel: outbox.clone(),
        audit: outbox,
    }
}
