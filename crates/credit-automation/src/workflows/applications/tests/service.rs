use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Duration;

use super::common::*;
use crate::workflows::applications::automation::AutomationError;
use crate::workflows::applications::decision::DecisionKind;
use crate::workflows::applications::domain::{
    ApplicationKey, ApplicationStage, ApplicationStatus, Client, ClientDebtor, ClientDebtorId,
    ClientId, DebtorDetails, EntityType, PaymentTerms,
};
use crate::workflows::applications::lifecycle::LifecycleError;
use crate::workflows::applications::notify::NotificationKind;
use crate::workflows::applications::repository::PartyDirectory;
use crate::workflows::applications::service::{
    CompanyDetailsRequest, CreditLimitRequest, IntakeError, PartnerDetailsRequest,
    UnderwriterDecision,
};
use crate::workflows::applications::stakeholders::PartnerSubmission;

fn harbour_traders() -> DebtorDetails {
    DebtorDetails {
        entity_name: "Harbour Traders Pty Ltd".to_string(),
        entity_type: EntityType::ProprietaryLimited,
        country_code: Some("AUS".to_string()),
        abn: Some("51824753556".to_string()),
        acn: None,
        registration_number: None,
    }
}

fn new_debtor(name: &str, entity_type: EntityType, abn: &str) -> DebtorDetails {
    DebtorDetails {
        entity_name: name.to_string(),
        entity_type,
        country_code: Some("AUS".to_string()),
        abn: Some(abn.to_string()),
        acn: None,
        registration_number: None,
    }
}

fn company_request(debtor: DebtorDetails) -> CompanyDetailsRequest {
    CompanyDetailsRequest {
        application_key: None,
        client_id: client().id,
        debtor,
    }
}

fn credit_limit(raw: &str) -> CreditLimitRequest {
    CreditLimitRequest {
        credit_limit: amount(raw),
        payment_terms: PaymentTerms::default(),
        outstanding_amount: Some(amount("2500")),
        order_on_hand: None,
        note: "Seasonal stock build".to_string(),
    }
}

#[tokio::test]
async fn company_step_creates_a_draft() {
    let fixture = Fixture::new();
    let step = fixture
        .service()
        .store_company_details(company_request(harbour_traders()), &underwriter())
        .await
        .expect("draft created");

    let id = &step.application.application_id.0;
    assert!(id.starts_with("SCW-D0001-"), "{id}");
    assert!(id.ends_with("-001"), "{id}");
    assert_eq!(step.application.status, ApplicationStatus::Draft);
    assert_eq!(step.application.stage, ApplicationStage::Company);
    assert_eq!(step.debtor.id, debtor().id);
    assert!(step.stakeholders.is_empty());
    assert!(fixture.store.application(&step.application.key).is_some());
}

#[tokio::test]
async fn second_draft_for_the_same_pair_is_rejected() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let first = service
        .store_company_details(company_request(harbour_traders()), &underwriter())
        .await
        .expect("draft created");

    let second = service
        .store_company_details(company_request(harbour_traders()), &underwriter())
        .await;

    match second {
        Err(IntakeError::ApplicationAlreadyExists(id)) => {
            assert_eq!(id, first.application.application_id)
        }
        other => panic!("expected duplicate rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_duplicate_leaves_the_debtor_untouched() {
    let fixture = Fixture::new();
    let service = fixture.service();
    service
        .store_company_details(company_request(harbour_traders()), &underwriter())
        .await
        .expect("draft created");

    let mut retyped = harbour_traders();
    retyped.entity_type = EntityType::Trust;
    retyped.entity_name = "Harbour Traders Trust".to_string();
    let error = service
        .store_company_details(company_request(retyped), &underwriter())
        .await
        .expect_err("pair already has a draft");
    assert_eq!(error.code(), "APPLICATION_ALREADY_EXISTS");

    let stored = PartyDirectory::debtor(&fixture.store, &debtor().id)
        .await
        .expect("directory reachable")
        .expect("debtor on file");
    assert_eq!(stored.entity_type, EntityType::ProprietaryLimited);
    assert_eq!(stored.entity_name, "Harbour Traders Pty Ltd");
}

#[tokio::test]
async fn refused_edit_of_a_submitted_application_leaves_the_debtor_untouched() {
    let fixture = Fixture::new();
    let submitted = application(ApplicationStatus::Submitted, "50000");
    let key = submitted.key;
    fixture.store.seed_application(submitted);

    let mut retyped = harbour_traders();
    retyped.entity_type = EntityType::Trust;
    let mut edit = company_request(retyped);
    edit.application_key = Some(key);
    let error = fixture
        .service()
        .store_company_details(edit, &underwriter())
        .await
        .expect_err("submitted applications are not editable");
    assert_eq!(error.code(), "INVALID_TRANSITION");

    let stored = PartyDirectory::debtor(&fixture.store, &debtor().id)
        .await
        .expect("directory reachable")
        .expect("debtor on file");
    assert_eq!(stored.entity_type, EntityType::ProprietaryLimited);
}

#[tokio::test]
async fn concurrent_drafts_for_one_pair_yield_a_single_application() {
    let fixture = Fixture::new();
    let mut collaborators = fixture.collaborators();
    collaborators.applications = Arc::new(InterleavingApplications {
        inner: fixture.store.clone(),
    });
    let service = service_with(collaborators);

    let first_actor = underwriter();
    let second_actor = underwriter();
    let (first, second) = tokio::join!(
        service.store_company_details(company_request(harbour_traders()), &first_actor),
        service.store_company_details(company_request(harbour_traders()), &second_actor),
    );

    let codes: Vec<_> = [first.as_ref().err(), second.as_ref().err()]
        .into_iter()
        .flatten()
        .map(IntakeError::code)
        .collect();
    assert_eq!(codes, vec!["APPLICATION_ALREADY_EXISTS"]);
    assert!(first.is_ok() || second.is_ok());
    assert_eq!(fixture.store.applications().len(), 1);
}

#[tokio::test]
async fn company_step_requires_name_and_identifier() {
    let fixture = Fixture::new();
    let service = fixture.service();

    let mut unnamed = harbour_traders();
    unnamed.entity_name = "  ".to_string();
    let result = service
        .store_company_details(company_request(unnamed), &underwriter())
        .await;
    assert!(matches!(
        result,
        Err(IntakeError::RequiredFieldMissing("entityName"))
    ));

    let mut anonymous = harbour_traders();
    anonymous.abn = None;
    let result = service
        .store_company_details(company_request(anonymous), &underwriter())
        .await;
    assert!(matches!(result, Err(IntakeError::RequiredFieldMissing("abn"))));
}

#[tokio::test]
async fn unknown_client_is_reported() {
    let fixture = Fixture::new();
    let mut request = company_request(harbour_traders());
    request.client_id = ClientId("client-404".to_string());

    let error = fixture
        .service()
        .store_company_details(request, &underwriter())
        .await
        .expect_err("unknown client");

    assert_eq!(error.code(), "NO_RECORD_FOUND");
}

#[tokio::test]
async fn editing_a_draft_rebases_its_id_onto_the_new_debtor() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let draft = service
        .store_company_details(company_request(harbour_traders()), &underwriter())
        .await
        .expect("draft created");

    let mut edit = company_request(new_debtor(
        "Coastal Produce Pty Ltd",
        EntityType::ProprietaryLimited,
        "33102417032",
    ));
    edit.application_key = Some(draft.application.key);
    let edited = service
        .store_company_details(edit, &underwriter())
        .await
        .expect("draft edited");

    assert_eq!(edited.application.key, draft.application.key);
    assert_eq!(edited.debtor.debtor_code, "D0002");
    let original = &draft.application.application_id.0;
    let rebased = &edited.application.application_id.0;
    assert!(rebased.starts_with("SCW-D0002-"), "{rebased}");
    assert_eq!(
        original.trim_start_matches("SCW-D0001-"),
        rebased.trim_start_matches("SCW-D0002-")
    );
    assert_eq!(
        edited.application.client_debtor_id,
        ClientDebtorId::for_pair(&client().id, &edited.debtor.id)
    );
    assert_eq!(fixture.store.applications().len(), 1);
}

#[tokio::test]
async fn partner_fields_are_checked_before_partner_count() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let draft = service
        .store_company_details(
            company_request(new_debtor("Nguyen & Park", EntityType::Partnership, "53004085616")),
            &underwriter(),
        )
        .await
        .expect("draft created");

    let mut incomplete = individual("Ava", birth_date(1981));
    if let PartnerSubmission::Individual { last_name, .. } = &mut incomplete {
        *last_name = None;
    }
    let result = service
        .store_partner_details(
            &draft.application.key,
            PartnerDetailsRequest {
                partners: vec![incomplete],
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(IntakeError::RequiredFieldMissing("lastName"))
    ));
}

#[tokio::test]
async fn partnership_needs_two_partners() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let draft = service
        .store_company_details(
            company_request(new_debtor("Nguyen & Park", EntityType::Partnership, "53004085616")),
            &underwriter(),
        )
        .await
        .expect("draft created");

    let error = service
        .store_partner_details(
            &draft.application.key,
            PartnerDetailsRequest {
                partners: vec![individual("Ava", birth_date(1981))],
            },
        )
        .await
        .expect_err("one partner is not enough");

    assert!(matches!(
        error,
        IntakeError::InsufficientData(EntityType::Partnership)
    ));
    assert_eq!(error.code(), "INSUFFICIENT_DATA");
    assert!(fixture.store.stakeholders().is_empty());
}

#[tokio::test]
async fn duplicate_partners_are_stored_once() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let draft = service
        .store_company_details(
            company_request(new_debtor("Nguyen & Park", EntityType::Partnership, "53004085616")),
            &underwriter(),
        )
        .await
        .expect("draft created");

    let application = service
        .store_partner_details(
            &draft.application.key,
            PartnerDetailsRequest {
                partners: vec![
                    individual("Ava", birth_date(1981)),
                    individual("Ava", birth_date(1981)),
                    company("Park Holdings Pty Ltd", "86001974625"),
                ],
            },
        )
        .await
        .expect("partners stored");

    assert_eq!(application.stage, ApplicationStage::Stakeholders);
    assert_eq!(fixture.store.stakeholders().len(), 2);
}

#[tokio::test]
async fn trust_intake_runs_through_to_auto_approval() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let draft = service
        .store_company_details(
            company_request(new_debtor("Harbour Family Trust", EntityType::Trust, "72159340870")),
            &underwriter(),
        )
        .await
        .expect("draft created");
    let key = draft.application.key;

    let early = service
        .store_credit_limit_details(&key, credit_limit("45000"))
        .await
        .expect_err("stakeholders come first for a trust");
    assert!(matches!(
        early,
        IntakeError::Lifecycle(LifecycleError::StakeholdersRequired)
    ));
    assert_eq!(early.code(), "INVALID_TRANSITION");

    service
        .store_partner_details(
            &key,
            PartnerDetailsRequest {
                partners: vec![individual("Ava", birth_date(1981))],
            },
        )
        .await
        .expect("partners stored");
    let application = service
        .store_credit_limit_details(&key, credit_limit("45000"))
        .await
        .expect("limit stored");
    assert_eq!(application.stage, ApplicationStage::CreditLimit);
    assert_eq!(application.note, "Seasonal stock build");

    let report = service.submit(&key, &underwriter()).await.expect("submitted");
    assert_eq!(report.decision, DecisionKind::AutoApproved);
    assert_eq!(
        service.get(&key).await.expect("stored").status,
        ApplicationStatus::Approved
    );
}

#[tokio::test]
async fn submit_retries_a_transient_repository_failure() {
    let fixture = Fixture::new();
    let draft = application(ApplicationStatus::Draft, "50000");
    let key = draft.key;
    fixture.store.seed_application(draft);
    let mut collaborators = fixture.collaborators();
    collaborators.applications =
        Arc::new(FlakyApplications::failing_after(fixture.store.clone(), 1, 1));

    let report = service_with(collaborators)
        .submit(&key, &underwriter())
        .await
        .expect("decided on the second attempt");

    assert_eq!(report.decision, DecisionKind::AutoApproved);
}

#[tokio::test]
async fn stranded_submission_is_decided_by_an_automation_retry() {
    let fixture = Fixture::new();
    let draft = application(ApplicationStatus::Draft, "50000");
    let key = draft.key;
    fixture.store.seed_application(draft);
    let flaky = Arc::new(FlakyApplications::failing_after(fixture.store.clone(), 1, 10));
    let mut collaborators = fixture.collaborators();
    collaborators.applications = flaky.clone();
    let service = service_with(collaborators);

    let error = service
        .submit(&key, &underwriter())
        .await
        .expect_err("every decisioning attempt fails");
    assert_eq!(error.code(), "AUTOMATION_FAILED");
    assert_eq!(
        fixture.store.application(&key).expect("stored").status,
        ApplicationStatus::Submitted
    );

    flaky.remaining_failures.store(0, Ordering::SeqCst);
    let report = service
        .retry_automation(&key, &underwriter())
        .await
        .expect("retry decides");
    assert_eq!(report.decision, DecisionKind::AutoApproved);

    let replay = service
        .retry_automation(&key, &underwriter())
        .await
        .expect_err("decided applications are not replayed");
    assert_eq!(replay.code(), "ALREADY_DECIDED");
    assert_eq!(fixture.outbox.audit_entries().len(), 1);
}

#[tokio::test]
async fn incomplete_intake_cannot_be_submitted() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let draft = service
        .store_company_details(company_request(harbour_traders()), &underwriter())
        .await
        .expect("draft created");

    let error = service
        .submit(&draft.application.key, &underwriter())
        .await
        .expect_err("no credit limit yet");

    assert!(matches!(
        error,
        IntakeError::Lifecycle(LifecycleError::IntakeIncomplete { .. })
    ));
    assert_eq!(error.code(), "INVALID_TRANSITION");
    assert!(error.is_client_error());
}

#[tokio::test]
async fn company_debtor_skips_the_partner_step() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let draft = service
        .store_company_details(company_request(harbour_traders()), &underwriter())
        .await
        .expect("draft created");
    let key = draft.application.key;

    let stored = service
        .store_credit_limit_details(&key, credit_limit("150000"))
        .await
        .expect("limit stored");
    assert_eq!(stored.stage, ApplicationStage::Stakeholders);

    let report = service.submit(&key, &underwriter()).await.expect("submitted");
    assert_eq!(report.decision, DecisionKind::Referred);
    assert_eq!(
        report.application.blockers,
        vec!["Credit limit is greater than Discretionary limit"]
    );
}

#[tokio::test]
async fn non_positive_credit_limit_is_rejected() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let draft = service
        .store_company_details(company_request(harbour_traders()), &underwriter())
        .await
        .expect("draft created");

    let error = service
        .store_credit_limit_details(&draft.application.key, credit_limit("-10"))
        .await
        .expect_err("negative limit");

    assert!(matches!(error, IntakeError::InvalidCreditLimit));
}

#[tokio::test]
async fn underwriter_approval_defaults_to_requested_amount() {
    let fixture = Fixture::new();
    let referred = application(ApplicationStatus::ReviewApplication, "150000");
    let key = referred.key;
    fixture.store.seed_application(referred);

    let report = fixture
        .service()
        .record_underwriter_decision(
            &key,
            UnderwriterDecision::Approve {
                accepted_amount: None,
            },
            &underwriter(),
        )
        .await
        .expect("approved");

    assert_eq!(report.decision, DecisionKind::UnderwriterApproved);
    assert_eq!(report.application.accepted_amount, Some(amount("150000")));
}

#[tokio::test]
async fn underwriter_cannot_decide_an_approved_application() {
    let fixture = Fixture::new();
    let approved = application(ApplicationStatus::Approved, "50000");
    let key = approved.key;
    fixture.store.seed_application(approved);

    let error = fixture
        .service()
        .record_underwriter_decision(&key, UnderwriterDecision::Decline, &underwriter())
        .await
        .expect_err("already approved");

    assert!(matches!(
        error,
        IntakeError::Automation(AutomationError::Lifecycle(_))
    ));
    assert_eq!(error.code(), "INVALID_TRANSITION");
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let fixture = Fixture::new();
    let error = fixture
        .service()
        .get(&ApplicationKey::new())
        .await
        .expect_err("nothing stored");

    assert_eq!(error.code(), "NO_APPLICATION_FOUND");
}

#[tokio::test]
async fn expiring_limits_notify_each_analyst_once_per_debtor() {
    let second_client = Client {
        id: ClientId("client-2".to_string()),
        name: "Pacific Foods".to_string(),
        client_code: "PCF".to_string(),
        ..client()
    };
    let fixture = Fixture::new().with_client(second_client.clone());
    let expiring_at = now() + Duration::hours(2);
    for client_id in [client().id, second_client.id.clone()] {
        fixture.store.seed_limit(ClientDebtor {
            id: ClientDebtorId::for_pair(&client_id, &debtor().id),
            client_id,
            debtor_id: debtor().id,
            credit_limit: Some(amount("50000")),
            is_endorsed_limit: false,
            active_application_id: None,
            expiry_date: Some(expiring_at),
            is_active: true,
        });
    }

    let summary = fixture
        .service()
        .notify_expiring_limits(now(), now() + Duration::days(1))
        .await
        .expect("sweep runs");

    assert_eq!(summary.examined, 2);
    assert_eq!(summary.notices.len(), 1);
    assert!(summary.failures.is_empty());
    let pushes = fixture.outbox.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].0, NotificationKind::CreditLimitExpiring);
    assert_eq!(pushes[0].1.user_id, analyst());
    assert!(pushes[0].1.description.ends_with("is expiring today"));
}
