use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use clap::Args;
use credit_automation::config::AutomationConfig;
use credit_automation::error::AppError;
use credit_automation::workflows::applications::domain::{
    Actor, ActorType, ApplicationStatus, ClientDebtor, ClientDebtorId, ClientId, DebtorDetails, DebtorId,
    EntityType, PaymentTerms, UserId,
};
use credit_automation::workflows::applications::{
    CompanyDetailsRequest, CreditLimitRequest, DecisionReport, IntakeError,
};
use rust_decimal::Decimal;

use crate::infra::{day_end, day_start, parse_date, seeded_store, LocalBackend, DEMO_CLIENT};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Credit limit requested for the domestic sample debtor. Defaults to 50000.
    #[arg(long, value_parser = parse_amount)]
    pub(crate) credit_limit: Option<Decimal>,
    /// Skip the renewal portion of the demo.
    #[arg(long)]
    pub(crate) skip_renewal: bool,
    /// Print the public status payload of every decided application.
    #[arg(long)]
    pub(crate) show_payloads: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct SweepArgs {
    /// Day to sweep (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long, value_parser = parse_date)]
    pub(crate) day: Option<NaiveDate>,
}

fn parse_amount(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|err| format!("failed to parse '{raw}' as an amount ({err})"))
}

fn client_user() -> Actor {
    Actor {
        kind: ActorType::ClientUser,
        id: UserId("client-user-demo".to_string()),
    }
}

async fn intake(
    backend: &LocalBackend,
    debtor: DebtorDetails,
    credit_limit: Decimal,
) -> Result<DecisionReport, IntakeError> {
    let actor = client_user();
    let step = backend
        .service
        .store_company_details(
            CompanyDetailsRequest {
                application_key: None,
                client_id: ClientId(DEMO_CLIENT.to_string()),
                debtor,
            },
            &actor,
        )
        .await?;
    let key = step.application.key;
    backend
        .service
        .store_credit_limit_details(
            &key,
            CreditLimitRequest {
                credit_limit,
                payment_terms: PaymentTerms::default(),
                outstanding_amount: None,
                order_on_hand: None,
                note: "Demo request".to_string(),
            },
        )
        .await?;
    backend.service.submit(&key, &actor).await
}

fn render_report(label: &str, report: &DecisionReport, show_payload: bool) {
    let application = &report.application;
    println!(
        "- {label}: {} -> {} ({:?})",
        application.application_id, application.status, report.decision
    );
    match report.insurer {
        Some(insurer) => println!("  Insurer: {insurer}"),
        None => println!("  Insurer: unresolved"),
    }
    if application.blockers.is_empty() {
        println!("  Blockers: none");
    } else {
        println!("  Blockers:");
        for blocker in &application.blockers {
            println!("    - {blocker}");
        }
    }
    if let Some(task) = &report.task {
        println!("  Review task: {} (due {})", task.title, task.due_date.date_naive());
    }
    for failure in &report.side_effect_failures {
        println!("  Side effect failed: {failure}");
    }
    if show_payload {
        match serde_json::to_string_pretty(&application.status_view()) {
            Ok(json) => println!("  Public status payload:\n{json}"),
            Err(err) => println!("  Public status payload unavailable: {err}"),
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        credit_limit,
        skip_renewal,
        show_payloads,
    } = args;
    let credit_limit = credit_limit.unwrap_or_else(|| Decimal::new(50_000, 0));

    let backend = LocalBackend::new(seeded_store(Utc::now()), &AutomationConfig::default());

    println!("Credit automation demo");
    let domestic = intake(
        &backend,
        DebtorDetails {
            entity_name: "Outback Builders Pty Ltd".to_string(),
            entity_type: EntityType::ProprietaryLimited,
            country_code: Some("AUS".to_string()),
            abn: Some("41002645487".to_string()),
            acn: None,
            registration_number: None,
        },
        credit_limit,
    )
    .await?;
    render_report("Domestic buyer", &domestic, show_payloads);

    let foreign = intake(
        &backend,
        DebtorDetails {
            entity_name: "Lion City Traders Pte Ltd".to_string(),
            entity_type: EntityType::LimitedCompany,
            country_code: Some("SGP".to_string()),
            abn: None,
            acn: None,
            registration_number: Some("201912345K".to_string()),
        },
        Decimal::new(20_000, 0),
    )
    .await?;
    render_report("Foreign buyer", &foreign, show_payloads);

    if !skip_renewal && domestic.application.status == ApplicationStatus::Approved {
        let renewal_limit = credit_limit + Decimal::new(10_000, 0);
        let ticket = backend
            .service
            .renew(
                &domestic.application.client_debtor_id,
                renewal_limit,
                &Actor::system(),
            )
            .await?;
        match ticket {
            Some(ticket) => {
                println!(
                    "\nRenewal {} queued at {renewal_limit}",
                    ticket.application_id()
                );
                match ticket.wait().await {
                    Ok(report) => render_report("Renewal", &report, show_payloads),
                    Err(err) => println!("  Renewal decisioning failed: {err}"),
                }
            }
            None => println!("\nNo approved application to renew"),
        }
    }

    let notifications = backend.outbox.notifications();
    if notifications.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications:");
        for notification in notifications {
            println!(
                "  - {} [{}]: {}",
                notification.user_id.0,
                notification.user_type.label(),
                notification.description
            );
        }
    }
    println!("Audit entries recorded: {}", backend.outbox.audit_entries().len());

    Ok(())
}

pub(crate) async fn run_expiry_sweep(args: SweepArgs) -> Result<(), AppError> {
    let day = args.day.unwrap_or_else(|| Utc::now().date_naive());
    let backend = LocalBackend::new(seeded_store(Utc::now()), &AutomationConfig::default());

    let client_id = ClientId(DEMO_CLIENT.to_string());
    let debtor_id = DebtorId("debtor-1".to_string());
    backend.store.seed_limit(ClientDebtor {
        id: ClientDebtorId::for_pair(&client_id, &debtor_id),
        client_id,
        debtor_id,
        credit_limit: Some(Decimal::new(75_000, 0)),
        is_endorsed_limit: false,
        active_application_id: None,
        expiry_date: Some(day_start(day) + chrono::Duration::hours(12)),
        is_active: true,
    });

    let summary = backend
        .service
        .notify_expiring_limits(day_start(day), day_end(day))
        .await?;

    println!("Expiring credit limit sweep for {day}");
    println!(
        "- {} limits examined | {} analysts notified",
        summary.examined,
        summary.notices.len()
    );
    for notice in &summary.notices {
        println!("  - {}: {}", notice.analyst_id.0, notice.description);
    }
    for failure in &summary.failures {
        println!("  Delivery failed: {failure}");
    }
    Ok(())
}
