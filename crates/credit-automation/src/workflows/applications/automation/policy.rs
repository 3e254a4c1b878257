use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::workflows::applications::domain::Policy;

/// Discretionary limit and excess resolved from the client's in-force policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFigures {
    pub discretionary_limit: Option<Decimal>,
    pub excess: Option<Decimal>,
}

impl PolicyFigures {
    /// Credit-insurance values win; risk-management values fill the gaps. Zero counts as unset.
    pub fn resolve(credit_insurance: &Policy, risk_management: &Policy) -> Self {
        Self {
            discretionary_limit: positive(credit_insurance.discretionary_limit)
                .or_else(|| positive(risk_management.discretionary_limit)),
            excess: positive(credit_insurance.excess).or_else(|| positive(risk_management.excess)),
        }
    }

    pub fn exceeds_discretionary_limit(&self, requested: Decimal) -> bool {
        self.discretionary_limit
            .map(|limit| requested > limit)
            .unwrap_or(false)
    }
}

fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|amount| *amount > Decimal::ZERO)
}
