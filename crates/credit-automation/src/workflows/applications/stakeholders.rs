use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{non_blank, DebtorId, EntityType};

/// Whether the disclosed stakeholders satisfy the quota for an entity type.
pub fn partner_disclosure_sufficient(
    entity_type: EntityType,
    individuals: usize,
    companies: usize,
) -> bool {
    match entity_type {
        EntityType::ProprietaryLimited
        | EntityType::LimitedCompany
        | EntityType::Business
        | EntityType::Corporation
        | EntityType::Government
        | EntityType::Incorporated
        | EntityType::NoLiability
        | EntityType::Proprietary
        | EntityType::RegisteredBody => individuals >= 1 && companies == 0,
        EntityType::Partnership => {
            individuals >= 2 || (individuals >= 1 && companies >= 1) || companies >= 2
        }
        EntityType::SoleTrader => individuals == 1 && companies == 0,
        EntityType::Trust => individuals >= 1 || companies >= 1,
        EntityType::Unrecognized => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeholderAddress {
    #[serde(default)]
    pub street_number: Option<String>,
    #[serde(default)]
    pub street_name: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub post_code: Option<String>,
}

/// Partner entry as submitted on the stakeholder intake step. Fields are optional on the wire so
/// missing mandatory values surface as `RequiredFieldMissing` rather than a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PartnerSubmission {
    #[serde(rename_all = "camelCase")]
    Individual {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        first_name: Option<String>,
        #[serde(default)]
        last_name: Option<String>,
        #[serde(default)]
        date_of_birth: Option<NaiveDate>,
        #[serde(default)]
        driver_licence_number: Option<String>,
        #[serde(default)]
        address: Option<StakeholderAddress>,
    },
    #[serde(rename_all = "camelCase")]
    Company {
        #[serde(default)]
        entity_name: Option<String>,
        #[serde(default)]
        entity_type: Option<EntityType>,
        #[serde(default)]
        abn: Option<String>,
        #[serde(default)]
        acn: Option<String>,
        #[serde(default)]
        registration_number: Option<String>,
    },
}

impl PartnerSubmission {
    pub fn is_company(&self) -> bool {
        matches!(self, PartnerSubmission::Company { .. })
    }

    /// First mandatory field that is missing, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        match self {
            PartnerSubmission::Individual {
                title,
                first_name,
                last_name,
                date_of_birth,
                driver_licence_number,
                address,
            } => {
                if non_blank(title).is_none() {
                    return Some("title");
                }
                if non_blank(first_name).is_none() {
                    return Some("firstName");
                }
                if non_blank(last_name).is_none() {
                    return Some("lastName");
                }
                if date_of_birth.is_none() && non_blank(driver_licence_number).is_none() {
                    return Some("dateOfBirth");
                }
                let Some(address) = address else {
                    return Some("address");
                };
                if non_blank(&address.state).is_none() {
                    return Some("address.state");
                }
                if non_blank(&address.post_code).is_none() {
                    return Some("address.postCode");
                }
                if non_blank(&address.street_number).is_none() {
                    return Some("address.streetNumber");
                }
                None
            }
            PartnerSubmission::Company {
                entity_name,
                entity_type,
                abn,
                acn,
                registration_number,
            } => {
                if non_blank(entity_name).is_none() {
                    return Some("entityName");
                }
                if entity_type.is_none() {
                    return Some("entityType");
                }
                if non_blank(abn).is_none()
                    && non_blank(acn).is_none()
                    && non_blank(registration_number).is_none()
                {
                    return Some("abn");
                }
                None
            }
        }
    }

    /// Convert a validated submission into a stakeholder record for `debtor_id`.
    pub fn into_stakeholder(self, debtor_id: &DebtorId) -> Option<Stakeholder> {
        if self.missing_field().is_some() {
            return None;
        }
        let details = match self {
            PartnerSubmission::Individual {
                title,
                first_name,
                last_name,
                date_of_birth,
                driver_licence_number,
                address,
            } => StakeholderDetails::Individual {
                title: title.unwrap_or_default(),
                first_name: first_name.unwrap_or_default(),
                last_name: last_name.unwrap_or_default(),
                date_of_birth,
                driver_licence_number: non_blank(&driver_licence_number),
                address: address.unwrap_or_default(),
            },
            PartnerSubmission::Company {
                entity_name,
                entity_type,
                abn,
                acn,
                registration_number,
            } => StakeholderDetails::Company {
                entity_name: entity_name.unwrap_or_default(),
                entity_type: entity_type.unwrap_or(EntityType::Unrecognized),
                abn: non_blank(&abn),
                acn: non_blank(&acn),
                registration_number: non_blank(&registration_number),
            },
        };
        Some(Stakeholder {
            debtor_id: debtor_id.clone(),
            details,
        })
    }
}

/// Disclosed individual or company stakeholder (debtor director).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stakeholder {
    pub debtor_id: DebtorId,
    pub details: StakeholderDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StakeholderDetails {
    #[serde(rename_all = "camelCase")]
    Individual {
        title: String,
        first_name: String,
        last_name: String,
        date_of_birth: Option<NaiveDate>,
        driver_licence_number: Option<String>,
        address: StakeholderAddress,
    },
    #[serde(rename_all = "camelCase")]
    Company {
        entity_name: String,
        entity_type: EntityType,
        abn: Option<String>,
        acn: Option<String>,
        registration_number: Option<String>,
    },
}

/// Natural identity used for conditional upserts of stakeholders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StakeholderKey {
    IndividualByBirthDate(DebtorId, NaiveDate),
    IndividualByLicence(DebtorId, String),
    CompanyByAbn(DebtorId, String),
    CompanyByAcn(DebtorId, String),
    CompanyByRegistration(DebtorId, String),
}

impl Stakeholder {
    pub fn natural_key(&self) -> Option<StakeholderKey> {
        let debtor = self.debtor_id.clone();
        match &self.details {
            StakeholderDetails::Individual {
                date_of_birth,
                driver_licence_number,
                ..
            } => match (date_of_birth, driver_licence_number) {
                (Some(dob), _) => Some(StakeholderKey::IndividualByBirthDate(debtor, *dob)),
                (None, Some(licence)) => {
                    Some(StakeholderKey::IndividualByLicence(debtor, licence.clone()))
                }
                (None, None) => None,
            },
            StakeholderDetails::Company {
                abn,
                acn,
                registration_number,
                ..
            } => abn
                .clone()
                .map(|abn| StakeholderKey::CompanyByAbn(debtor.clone(), abn))
                .or_else(|| {
                    acn.clone()
                        .map(|acn| StakeholderKey::CompanyByAcn(debtor.clone(), acn))
                })
                .or_else(|| {
                    registration_number
                        .clone()
                        .map(|number| StakeholderKey::CompanyByRegistration(debtor, number))
                }),
        }
    }

    pub fn is_company(&self) -> bool {
        matches!(self.details, StakeholderDetails::Company { .. })
    }
}

/// Collapse entries sharing a natural key so one payload never races itself; the last entry wins
/// and first-seen order is kept.
pub(crate) fn dedupe_by_natural_key(stakeholders: Vec<Stakeholder>) -> Vec<Stakeholder> {
    let mut positions: HashMap<StakeholderKey, usize> = HashMap::new();
    let mut unique: Vec<Stakeholder> = Vec::with_capacity(stakeholders.len());
    for stakeholder in stakeholders {
        match stakeholder.natural_key() {
            Some(key) => match positions.get(&key) {
                Some(&index) => unique[index] = stakeholder,
                None => {
                    positions.insert(key, unique.len());
                    unique.push(stakeholder);
                }
            },
            None => unique.push(stakeholder),
        }
    }
    unique
}
