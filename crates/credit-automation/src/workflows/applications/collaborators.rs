use std::sync::Arc;

use super::automation::EntityClassifier;
use super::notify::{AuditSink, NotificationChannel, NotificationSink, TaskSink};
use super::repository::{
    ApplicationRepository, ApplicationSequence, ClientDebtorStore, PartyDirectory,
    PolicyRepository, StakeholderStore,
};

/// External systems the engine reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub applications: Arc<dyn ApplicationRepository>,
    pub limits: Arc<dyn ClientDebtorStore>,
    pub parties: Arc<dyn PartyDirectory>,
    pub stakeholders: Arc<dyn StakeholderStore>,
    pub policies: Arc<dyn PolicyRepository>,
    pub sequence: Arc<dyn ApplicationSequence>,
    pub classifier: Arc<dyn EntityClassifier>,
    pub tasks: Arc<dyn TaskSink>,
    pub notifications: Arc<dyn NotificationSink>,
    pub channel: Arc<dyn NotificationChannel>,
    pub audit: Arc<dyn AuditSink>,
}
