use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::collaborators::Collaborators;
use super::domain::{ActorType, DebtorId, UserId};
use super::notify::{NotificationChannel, NotificationKind, NotificationSink};
use super::repository::{ClientDebtorStore, PartyDirectory, RepositoryError};

/// Notice sent to a risk analyst about one expiring credit limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryNotice {
    pub debtor_id: DebtorId,
    pub analyst_id: UserId,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub examined: usize,
    pub notices: Vec<ExpiryNotice>,
    pub failures: Vec<String>,
}

/// Warns risk analysts about active credit limits expiring inside a window.
pub struct ExpiringLimitSweep {
    limits: Arc<dyn ClientDebtorStore>,
    parties: Arc<dyn PartyDirectory>,
    notifications: Arc<dyn NotificationSink>,
    channel: Arc<dyn NotificationChannel>,
}

impl ExpiringLimitSweep {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            limits: Arc::clone(&collaborators.limits),
            parties: Arc::clone(&collaborators.parties),
            notifications: Arc::clone(&collaborators.notifications),
            channel: Arc::clone(&collaborators.channel),
        }
    }

    /// One notification per (debtor, analyst) pair, however many clients hold a limit on the
    /// debtor.
    pub async fn notify_expiring_limits(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SweepSummary, RepositoryError> {
        let expiring = self.limits.expiring_between(start, end).await?;
        let mut summary = SweepSummary {
            examined: expiring.len(),
            ..SweepSummary::default()
        };
        let mut notified: HashSet<(DebtorId, UserId)> = HashSet::new();

        for limit in expiring.iter().filter(|limit| limit.is_active) {
            let (client, debtor) = tokio::try_join!(
                self.parties.client(&limit.client_id),
                self.parties.debtor(&limit.debtor_id),
            )?;
            let (Some(client), Some(debtor)) = (client, debtor) else {
                warn!(client_debtor_id = %limit.id, "skipping limit with missing client or debtor");
                continue;
            };
            let Some(analyst) = client.risk_analyst_id.clone() else {
                continue;
            };
            if !notified.insert((debtor.id.clone(), analyst.clone())) {
                continue;
            }

            let description = format!(
                "Credit limit for {} - {} is expiring today",
                client.name, debtor.entity_name
            );
            match self
                .notifications
                .notify(&analyst, ActorType::User, description.clone())
                .await
            {
                Ok(notification) => {
                    if let Err(error) = self
                        .channel
                        .push(NotificationKind::CreditLimitExpiring, &notification)
                        .await
                    {
                        warn!(%error, analyst = %analyst.0, "expiry push failed");
                        summary.failures.push(error.to_string());
                    }
                    summary.notices.push(ExpiryNotice {
                        debtor_id: debtor.id.clone(),
                        analyst_id: analyst,
                        description,
                    });
                }
                Err(error) => {
                    warn!(%error, analyst = %analyst.0, "expiry notification failed");
                    summary.failures.push(error.to_string());
                }
            }
        }

        info!(
            examined = summary.examined,
            notified = summary.notices.len(),
            "expiring credit limit sweep complete"
        );
        Ok(summary)
    }
}
