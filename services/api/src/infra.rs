use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use credit_automation::config::AutomationConfig;
use credit_automation::workflows::applications::domain::{
    Client, ClientId, Debtor, DebtorId, EntityType, Policy, UserId,
};
use credit_automation::workflows::applications::{
    in_memory_collaborators, CreditApplicationService, InsurerRegistry, MemoryOutbox, MemoryStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Service over in-memory collaborators plus handles for inspecting what it wrote.
pub(crate) struct LocalBackend {
    pub(crate) store: MemoryStore,
    pub(crate) outbox: MemoryOutbox,
    pub(crate) service: Arc<CreditApplicationService>,
}

impl LocalBackend {
    pub(crate) fn new(store: MemoryStore, config: &AutomationConfig) -> Self {
        let outbox = MemoryOutbox::default();
        let service = CreditApplicationService::new(
            in_memory_collaborators(&store, &outbox),
            InsurerRegistry::with_defaults(),
            config,
        );
        Self {
            store,
            outbox,
            service: Arc::new(service),
        }
    }
}

pub(crate) const DEMO_CLIENT: &str = "client-demo";

/// One client insured with QBE, a domestic and a foreign debtor, and in-force CI/RMP policies.
pub(crate) fn seeded_store(now: DateTime<Utc>) -> MemoryStore {
    let store = MemoryStore::default();
    let client_id = ClientId(DEMO_CLIENT.to_string());

    store.seed_client(Client {
        id: client_id.clone(),
        name: "Tasman Hardware Supplies".to_string(),
        client_code: "THS".to_string(),
        is_auto_approve_allowed: true,
        insurer_name: Some("QBE Insurance (Australia) Limited".to_string()),
        risk_analyst_id: Some(UserId("analyst-demo".to_string())),
    });
    store.seed_debtor(Debtor {
        id: DebtorId("debtor-1".to_string()),
        debtor_code: "D0001".to_string(),
        entity_name: "Outback Builders Pty Ltd".to_string(),
        entity_type: EntityType::ProprietaryLimited,
        country_code: Some("AUS".to_string()),
        abn: Some("41002645487".to_string()),
        acn: None,
        registration_number: None,
    });
    store.seed_debtor(Debtor {
        id: DebtorId("debtor-2".to_string()),
        debtor_code: "D0002".to_string(),
        entity_name: "Lion City Traders Pte Ltd".to_string(),
        entity_type: EntityType::LimitedCompany,
        country_code: Some("SGP".to_string()),
        abn: None,
        acn: None,
        registration_number: Some("201912345K".to_string()),
    });

    for (product, discretionary) in [
        ("Trade Credit Insurance", Some("150000")),
        ("Risk Management Package", None),
    ] {
        store.seed_policy(Policy {
            id: format!("policy-{}", product.len()),
            client_id: client_id.clone(),
            product: product.to_string(),
            inception_date: now - Duration::days(90),
            expiry_date: now + Duration::days(275),
            discretionary_limit: discretionary.and_then(|raw| Decimal::from_str(raw).ok()),
            excess: None,
        });
    }
    store
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Start of `day` in UTC.
pub(crate) fn day_start(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Last instant of `day` in UTC.
pub(crate) fn day_end(day: NaiveDate) -> DateTime<Utc> {
    day_start(day) + Duration::days(1) - Duration::milliseconds(1)
}
