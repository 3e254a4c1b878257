//! End-to-end credit application scenarios driven through the HTTP router and the in-memory
//! collaborators, without reaching into private modules.

mod common {
    use std::str::FromStr;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::response::Response;
    use axum::Router;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    use credit_automation::config::AutomationConfig;
    use credit_automation::workflows::applications::domain::{
        Client, ClientId, Debtor, DebtorId, EntityType, Policy, UserId,
    };
    use credit_automation::workflows::applications::{
        application_router, in_memory_collaborators, CreditApplicationService, InsurerRegistry,
        MemoryOutbox, MemoryStore,
    };

    pub(super) struct Harness {
        pub store: MemoryStore,
        pub outbox: MemoryOutbox,
        pub router: Router,
    }

    pub(super) fn amount(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("valid decimal")
    }

    fn policy(product: &str, discretionary: &str) -> Policy {
        Policy {
            id: format!("policy-{product}"),
            client_id: ClientId("client-ab".to_string()),
            product: product.to_string(),
            inception_date: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid timestamp"),
            expiry_date: Utc
                .with_ymd_and_hms(2099, 1, 1, 0, 0, 0)
                .single()
                .expect("valid timestamp"),
            discretionary_limit: Some(amount(discretionary)),
            excess: None,
        }
    }

    pub(super) fn harness(insurer: &str) -> Harness {
        let store = MemoryStore::default();
        store.seed_client(Client {
            id: ClientId("client-ab".to_string()),
            name: "Antipodes Beverages".to_string(),
            client_code: "ANB".to_string(),
            is_auto_approve_allowed: true,
            insurer_name: Some(insurer.to_string()),
            risk_analyst_id: Some(UserId("analyst-3".to_string())),
        });
        store.seed_debtor(Debtor {
            id: DebtorId("debtor-1".to_string()),
            debtor_code: "D0001".to_string(),
            entity_name: "Existing Buyer Ltd".to_string(),
            entity_type: EntityType::LimitedCompany,
            country_code: Some("NZL".to_string()),
            abn: None,
            acn: None,
            registration_number: Some("NZ-889911".to_string()),
        });
        store.seed_policy(policy("Trade Credit Insurance", "250000"));
        store.seed_policy(policy("Risk Management Package", "100000"));

        let outbox = MemoryOutbox::default();
        let config = AutomationConfig {
            policy_lookup_timeout: Duration::from_millis(500),
            renewal_max_attempts: 2,
            renewal_retry_backoff: Duration::from_millis(5),
        };
        let service = CreditApplicationService::new(
            in_memory_collaborators(&store, &outbox),
            InsurerRegistry::with_defaults(),
            &config,
        );
        Harness {
            store,
            outbox,
            router: application_router(Arc::new(service)),
        }
    }

    pub(super) async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", "client-user-21")
            .header("x-user-type", "client-user");
        let request = match body {
            Some(payload) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");
        router.clone().oneshot(request).await.expect("route executes")
    }

    pub(super) async fn json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }
}

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::{amount, harness, json, send};
use credit_automation::workflows::applications::domain::{ActorType, ApplicationStatus};
use credit_automation::workflows::applications::NotificationKind;

fn partnership_company_step() -> serde_json::Value {
    json!({
        "clientId": "client-ab",
        "debtor": {
            "entityName": "Kauri & Fern Partners",
            "entityType": "PARTNERSHIP",
            "countryCode": "NZL",
            "registrationNumber": "NZ-440021"
        }
    })
}

fn partners() -> serde_json::Value {
    json!({
        "partners": [
            {
                "type": "individual",
                "title": "Mr",
                "firstName": "Tane",
                "lastName": "Walker",
                "dateOfBirth": "1979-04-02",
                "address": {
                    "streetNumber": "4",
                    "streetName": "Quay St",
                    "suburb": "Auckland Central",
                    "state": "AUK",
                    "postCode": "1010"
                }
            },
            {
                "type": "company",
                "entityName": "Fern Holdings Ltd",
                "entityType": "LIMITED_COMPANY",
                "registrationNumber": "NZ-550077"
            }
        ]
    })
}

#[tokio::test]
async fn partnership_application_is_auto_approved_then_renewed() {
    let harness = harness("QBE Insurance");

    let created = send(
        &harness.router,
        "POST",
        "/api/v1/credit/applications",
        Some(partnership_company_step()),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = json(created).await;
    let key = created["application"]["key"]
        .as_str()
        .expect("key present")
        .to_string();
    let application_id = created["application"]["applicationId"]
        .as_str()
        .expect("id present")
        .to_string();
    assert!(application_id.starts_with("ANB-D0002-"));

    let partners_stored = send(
        &harness.router,
        "PUT",
        &format!("/api/v1/credit/applications/{key}/partners"),
        Some(partners()),
    )
    .await;
    assert_eq!(partners_stored.status(), StatusCode::OK);
    assert_eq!(json(partners_stored).await["stage"], 2);

    let limit_stored = send(
        &harness.router,
        "PUT",
        &format!("/api/v1/credit/applications/{key}/credit-limit"),
        Some(json!({
            "creditLimit": "80000",
            "isExtendedPaymentTerms": false,
            "isPassedOverdueAmount": false,
            "note": "Summer range"
        })),
    )
    .await;
    assert_eq!(limit_stored.status(), StatusCode::OK);
    assert_eq!(json(limit_stored).await["stage"], 3);

    let submitted = send(
        &harness.router,
        "POST",
        &format!("/api/v1/credit/applications/{key}/submit"),
        None,
    )
    .await;
    assert_eq!(submitted.status(), StatusCode::OK);
    let submitted = json(submitted).await;
    assert_eq!(submitted["decision"], "auto_approved");
    assert_eq!(submitted["application"]["status"], "APPROVED");

    let stored = harness.store.applications();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].created_by_type, ActorType::ClientUser);
    assert_eq!(harness.store.stakeholders().len(), 2);
    assert!(harness
        .outbox
        .pushes()
        .iter()
        .all(|(kind, _)| *kind == NotificationKind::ApplicationApproved));

    let pair = stored[0].client_debtor_id.0.clone();
    let renewal = send(
        &harness.router,
        "POST",
        &format!("/api/v1/credit/limits/{pair}/renewals"),
        Some(json!({ "creditLimit": "95000" })),
    )
    .await;
    assert_eq!(renewal.status(), StatusCode::ACCEPTED);
    let renewal = json(renewal).await;
    assert_eq!(renewal["renewed"], true);
    assert_eq!(renewal["application"]["status"], "PENDING_AUTOMATION");

    let mut renewed = None;
    for _ in 0..100 {
        renewed = harness
            .store
            .applications()
            .into_iter()
            .find(|application| {
                application.credit_limit == Some(amount("95000"))
                    && application.status == ApplicationStatus::Approved
            });
        if renewed.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let renewed = renewed.expect("renewal decided in the background");
    assert_eq!(renewed.note, "Summer range");
    assert_eq!(
        harness
            .store
            .limit(&renewed.client_debtor_id)
            .expect("limit recorded")
            .active_application_id,
        Some(renewed.key)
    );
}

#[tokio::test]
async fn referred_application_is_declined_by_underwriter() {
    let harness = harness("Euler Hermes");

    let created = json(
        send(
            &harness.router,
            "POST",
            "/api/v1/credit/applications",
            Some(json!({
                "clientId": "client-ab",
                "debtor": {
                    "entityName": "Existing Buyer Ltd",
                    "entityType": "LIMITED_COMPANY",
                    "countryCode": "NZL",
                    "registrationNumber": "NZ-889911"
                }
            })),
        )
        .await,
    )
    .await;
    let key = created["application"]["key"]
        .as_str()
        .expect("key present")
        .to_string();

    send(
        &harness.router,
        "PUT",
        &format!("/api/v1/credit/applications/{key}/credit-limit"),
        Some(json!({
            "creditLimit": "20000",
            "isExtendedPaymentTerms": false,
            "isPassedOverdueAmount": false
        })),
    )
    .await;

    let submitted = json(
        send(
            &harness.router,
            "POST",
            &format!("/api/v1/credit/applications/{key}/submit"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(submitted["decision"], "referred");
    assert_eq!(submitted["application"]["status"], "REVIEW_APPLICATION");
    assert_eq!(harness.outbox.tasks().len(), 1);

    let declined = send(
        &harness.router,
        "POST",
        &format!("/api/v1/credit/applications/{key}/decision"),
        Some(json!({ "decision": "decline" })),
    )
    .await;
    assert_eq!(declined.status(), StatusCode::OK);
    assert_eq!(json(declined).await["application"]["status"], "DECLINED");

    let replay = send(
        &harness.router,
        "POST",
        &format!("/api/v1/credit/applications/{key}/submit"),
        None,
    )
    .await;
    assert_eq!(replay.status(), StatusCode::CONFLICT);
    assert_eq!(json(replay).await["code"], "INVALID_TRANSITION");
}
