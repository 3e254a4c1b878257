use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::classifier::tokens;
use super::policy::PolicyFigures;
use crate::workflows::applications::domain::Application;

/// Underwriters with a registered rule evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Insurer {
    Qbe,
    Bond,
    Atradius,
    Coface,
    Euler,
    Trad,
}

impl Insurer {
    /// Match order matters: "atradius" contains "trad".
    pub const ALL: [Insurer; 6] = [
        Insurer::Qbe,
        Insurer::Bond,
        Insurer::Atradius,
        Insurer::Coface,
        Insurer::Euler,
        Insurer::Trad,
    ];

    pub const fn keyword(self) -> &'static str {
        match self {
            Insurer::Qbe => "qbe",
            Insurer::Bond => "bond",
            Insurer::Atradius => "atradius",
            Insurer::Coface => "coface",
            Insurer::Euler => "euler",
            Insurer::Trad => "trad",
        }
    }

    /// Case-insensitive keyword match against a free-text insurer name.
    pub fn identify(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|insurer| lowered.contains(insurer.keyword()))
    }
}

impl fmt::Display for Insurer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Result of looking up a client's insurer in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsurerResolution {
    Resolved(Insurer),
    Unresolved { name: Option<String> },
}

/// Inputs an insurer evaluator may inspect.
#[derive(Debug, Clone, Copy)]
pub struct InsurerContext<'a> {
    pub application: &'a Application,
    pub classification: &'a str,
    pub policy: &'a PolicyFigures,
}

impl InsurerContext<'_> {
    fn requested_limit(&self) -> Decimal {
        self.application.credit_limit.unwrap_or(Decimal::ZERO)
    }
}

/// Insurer-specific appetite check. Returns zero or more blockers.
pub trait InsurerRules: Send + Sync {
    fn evaluate(&self, context: &InsurerContext<'_>) -> Vec<String>;
}

/// Table-driven appetite shared by the built-in evaluators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnderwritingAppetite {
    pub refer_extended_payment_terms: bool,
    pub refer_passed_overdue: bool,
    pub referred_classifications: Vec<&'static str>,
    pub requires_discretionary_limit: bool,
    pub requires_limit_above_excess: bool,
}

/// The per-insurer constructors below are placeholder defaults, not negotiated underwriting
/// rules. Deployments replace them through [`InsurerRegistry::register`].
impl UnderwritingAppetite {
    fn baseline() -> Self {
        Self {
            refer_extended_payment_terms: true,
            refer_passed_overdue: true,
            referred_classifications: Vec::new(),
            requires_discretionary_limit: false,
            requires_limit_above_excess: false,
        }
    }

    pub fn qbe() -> Self {
        Self::baseline()
    }

    pub fn bond() -> Self {
        Self {
            referred_classifications: vec![tokens::SOLE_TRADER],
            ..Self::baseline()
        }
    }

    pub fn atradius() -> Self {
        Self {
            referred_classifications: vec![tokens::TRUST, tokens::PARTNERSHIP],
            ..Self::baseline()
        }
    }

    pub fn coface() -> Self {
        Self {
            requires_discretionary_limit: true,
            requires_limit_above_excess: true,
            ..Self::baseline()
        }
    }

    pub fn euler() -> Self {
        Self::baseline()
    }

    pub fn trad() -> Self {
        Self {
            refer_passed_overdue: false,
            ..Self::baseline()
        }
    }
}

impl InsurerRules for UnderwritingAppetite {
    fn evaluate(&self, context: &InsurerContext<'_>) -> Vec<String> {
        let mut blockers = Vec::new();
        let terms = &context.application.payment_terms;

        if self.refer_extended_payment_terms && terms.is_extended_payment_terms {
            blockers.push("Extended payment terms requested".to_string());
        }
        if self.refer_passed_overdue && terms.is_passed_overdue_amount {
            blockers.push("Debtor has amounts overdue beyond terms".to_string());
        }
        if self
            .referred_classifications
            .iter()
            .any(|token| *token == context.classification)
        {
            blockers.push(format!(
                "Entity classification {} requires referral",
                context.classification
            ));
        }
        if self.requires_discretionary_limit && context.policy.discretionary_limit.is_none() {
            blockers.push("No discretionary limit on policy".to_string());
        }
        if self.requires_limit_above_excess {
            if let Some(excess) = context.policy.excess {
                if context.requested_limit() < excess {
                    blockers.push("Credit limit is below policy excess".to_string());
                }
            }
        }

        blockers
    }
}

/// Maps each supported insurer to its rule evaluator.
#[derive(Clone)]
pub struct InsurerRegistry {
    evaluators: HashMap<Insurer, Arc<dyn InsurerRules>>,
}

impl InsurerRegistry {
    pub fn empty() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// Registry loaded with the placeholder appetites from [`UnderwritingAppetite`]. Override an
    /// insurer with [`InsurerRegistry::register`] once its real rules are known.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Insurer::Qbe, Arc::new(UnderwritingAppetite::qbe()))
            .register(Insurer::Bond, Arc::new(UnderwritingAppetite::bond()))
            .register(Insurer::Atradius, Arc::new(UnderwritingAppetite::atradius()))
            .register(Insurer::Coface, Arc::new(UnderwritingAppetite::coface()))
            .register(Insurer::Euler, Arc::new(UnderwritingAppetite::euler()))
            .register(Insurer::Trad, Arc::new(UnderwritingAppetite::trad()));
        registry
    }

    /// Install or replace the evaluator for an insurer.
    pub fn register(&mut self, insurer: Insurer, rules: Arc<dyn InsurerRules>) -> &mut Self {
        self.evaluators.insert(insurer, rules);
        self
    }

    /// Resolve a client's insurer name. An identified insurer without a registered evaluator is
    /// treated as unresolved.
    pub fn resolve(&self, name: Option<&str>) -> InsurerResolution {
        match name.and_then(Insurer::identify) {
            Some(insurer) if self.evaluators.contains_key(&insurer) => {
                InsurerResolution::Resolved(insurer)
            }
            _ => InsurerResolution::Unresolved {
                name: name.map(str::to_string),
            },
        }
    }

    pub fn evaluate(&self, insurer: Insurer, context: &InsurerContext<'_>) -> Vec<String> {
        self.evaluators
            .get(&insurer)
            .map(|rules| rules.evaluate(context))
            .unwrap_or_default()
    }
}

impl Default for InsurerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for InsurerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<_> = self.evaluators.keys().map(|i| i.keyword()).collect();
        registered.sort_unstable();
        f.debug_struct("InsurerRegistry")
            .field("registered", &registered)
            .finish()
    }
}
