use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflows::applications::domain::{DebtorId, EntityType};
use crate::workflows::applications::repository::{RepositoryError, StakeholderStore};
use crate::workflows::applications::stakeholders::partner_disclosure_sufficient;

/// Classification tokens handed to insurer evaluators.
pub mod tokens {
    pub const COMPANY: &str = "company";
    pub const PARTNERSHIP: &str = "partnership";
    pub const SOLE_TRADER: &str = "sole_trader";
    pub const TRUST: &str = "trust";
    pub const GOVERNMENT: &str = "government";
}

/// Outcome of the entity-type check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub token: String,
    pub blockers: Vec<String>,
    pub proceed: bool,
}

impl Classification {
    pub fn clear(token: &str) -> Self {
        Self {
            token: token.to_string(),
            blockers: Vec::new(),
            proceed: true,
        }
    }

    pub fn halted(token: &str, blocker: impl Into<String>) -> Self {
        Self {
            token: token.to_string(),
            blockers: vec![blocker.into()],
            proceed: false,
        }
    }
}

/// Maps a debtor's entity type to a classification token, possibly adding blockers.
#[async_trait]
pub trait EntityClassifier: Send + Sync {
    async fn classify(
        &self,
        debtor_id: &DebtorId,
        entity_type: EntityType,
    ) -> Result<Classification, ClassifierError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    #[error("classification source unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for ClassifierError {
    fn from(value: RepositoryError) -> Self {
        Self::Unavailable(value.to_string())
    }
}

/// Default classifier: buckets entity types and re-checks stakeholder disclosure for trusts and
/// partnerships against what is on file.
pub struct DisclosureClassifier {
    stakeholders: Arc<dyn StakeholderStore>,
}

impl DisclosureClassifier {
    pub fn new(stakeholders: Arc<dyn StakeholderStore>) -> Self {
        Self { stakeholders }
    }
}

pub fn token_for(entity_type: EntityType) -> Option<&'static str> {
    match entity_type {
        EntityType::ProprietaryLimited
        | EntityType::LimitedCompany
        | EntityType::Business
        | EntityType::Corporation
        | EntityType::Incorporated
        | EntityType::NoLiability
        | EntityType::Proprietary
        | EntityType::RegisteredBody => Some(tokens::COMPANY),
        EntityType::Government => Some(tokens::GOVERNMENT),
        EntityType::Partnership => Some(tokens::PARTNERSHIP),
        EntityType::SoleTrader => Some(tokens::SOLE_TRADER),
        EntityType::Trust => Some(tokens::TRUST),
        EntityType::Unrecognized => None,
    }
}

#[async_trait]
impl EntityClassifier for DisclosureClassifier {
    async fn classify(
        &self,
        debtor_id: &DebtorId,
        entity_type: EntityType,
    ) -> Result<Classification, ClassifierError> {
        let Some(token) = token_for(entity_type) else {
            return Ok(Classification::halted("unknown", "Unknown entity type"));
        };

        if !entity_type.requires_stakeholder_disclosure() {
            return Ok(Classification::clear(token));
        }

        let on_file = self.stakeholders.for_debtor(debtor_id).await?;
        let companies = on_file.iter().filter(|s| s.is_company()).count();
        let individuals = on_file.len() - companies;
        if partner_disclosure_sufficient(entity_type, individuals, companies) {
            Ok(Classification::clear(token))
        } else {
            Ok(Classification::halted(
                token,
                "Insufficient stakeholder details",
            ))
        }
    }
}
