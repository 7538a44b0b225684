//! Entry points used by the scheduler and by operators.
//!
//! Every public method returns an [`EngineResponse`] and never an error: whatever
//! goes wrong inside (store failures, timeouts, bad data) is logged and described in
//! the response so the calling layer can always report an outcome.

use crate::{
    config::engine::EngineConfig,
    core::{
        notifications::{self, NotificationEvent},
        reminders::{self, ReminderRunResult},
        renewal::{self, RenewalFailure, RenewedSubscription, TenantRenewalResult},
        tenants,
    },
    email::EmailSender,
    errors::{Error, Result},
    store::SubscriptionStore,
};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::{future::Future, sync::Arc};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Uniform envelope returned by every entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineResponse<T> {
    /// False only when a tenant (or the whole run) could not be processed
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Structured result, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> EngineResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    fn with_status(success: bool, message: impl Into<String>, data: T) -> Self {
        Self {
            success,
            message: message.into(),
            data: Some(data),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The daily scheduler
    Scheduled,
    /// An operator
    Manual,
}

/// A tenant whose processing could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantFailure {
    /// Tenant id
    pub tenant_id: String,
    /// Rendered error
    pub error: String,
}

/// Renewals and policy reminders for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRunSummary {
    /// Tenant id
    pub tenant_id: String,
    /// Renewal outcome
    pub renewals: TenantRenewalResult,
    /// Reminder outcome; `None` when the reminder pass did not complete
    pub reminders: Option<ReminderRunResult>,
    /// Why the reminder pass did not complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_error: Option<String>,
}

/// Result of a full daily run over all tenants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRunSummary {
    /// Processing day
    pub date: NaiveDate,
    /// Tenants whose renewal pass completed
    pub tenants: Vec<TenantRunSummary>,
    /// Tenants that failed or timed out in either pass
    pub failed_tenants: Vec<TenantFailure>,
}

/// Auto-renewal results flattened across tenants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalRunSummary {
    /// Tenants processed
    pub tenants_processed: usize,
    /// Subscriptions renewed
    pub renewed: Vec<RenewedSubscription>,
    /// Subscriptions that failed to renew
    pub failed: Vec<RenewalFailure>,
    /// Tenants that failed or timed out
    pub failed_tenants: Vec<TenantFailure>,
}

/// Reminder results aggregated across tenants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRunSummary {
    /// Tenants processed
    pub tenants_processed: usize,
    /// Aggregated counts and failures
    #[serde(flatten)]
    pub totals: ReminderRunResult,
    /// Tenants that failed or timed out
    pub failed_tenants: Vec<TenantFailure>,
}

/// The renewal & reminder engine.
#[derive(Clone)]
pub struct RenewalEngine {
    store: Arc<dyn SubscriptionStore>,
    mailer: Arc<dyn EmailSender>,
    config: EngineConfig,
}

impl RenewalEngine {
    /// Creates an engine over the given store and mailer.
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        mailer: Arc<dyn EmailSender>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }

    fn tenant_deadline(&self) -> Instant {
        Instant::now() + self.config.tenant_timeout()
    }

    /// Runs `work` for one tenant, failing once `deadline` passes.
    async fn with_deadline<T, F>(&self, tenant_id: &str, deadline: Instant, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => result,
            Err(_) => Err(Error::TenantTimeout {
                tenant_id: tenant_id.to_string(),
                seconds: self.config.tenant_timeout_secs,
            }),
        }
    }

    /// Runs `work` for one tenant under the configured timeout.
    async fn with_tenant_timeout<T, F>(&self, tenant_id: &str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.with_deadline(tenant_id, self.tenant_deadline(), work)
            .await
    }

    /// Renewals, then policy reminders, sharing one deadline.
    ///
    /// Fails only when the renewal pass fails. A reminder pass that errors or runs out
    /// of time is reported in the summary, next to the renewals already committed.
    async fn run_tenant(&self, tenant_id: &str, today: NaiveDate) -> Result<TenantRunSummary> {
        let store = self.store.as_ref();
        let mailer = self.mailer.as_ref();
        let deadline = self.tenant_deadline();

        let renewals = self
            .with_deadline(
                tenant_id,
                deadline,
                renewal::process_tenant(store, tenant_id, today),
            )
            .await?;
        let reminder_outcome = self
            .with_deadline(
                tenant_id,
                deadline,
                reminders::process_tenant(store, mailer, tenant_id, today),
            )
            .await;

        let (reminders, reminder_error) = match reminder_outcome {
            Ok(result) => (Some(result), None),
            Err(e) => {
                error!(
                    tenant_id = %tenant_id,
                    renewed = renewals.renewed.len(),
                    error = %e,
                    "Reminder pass failed after renewals"
                );
                (None, Some(e.to_string()))
            }
        };

        Ok(TenantRunSummary {
            tenant_id: tenant_id.to_string(),
            renewals,
            reminders,
            reminder_error,
        })
    }

    /// Renews and reminds for a single tenant.
    pub async fn process_tenant(
        &self,
        tenant_id: &str,
        today: NaiveDate,
    ) -> EngineResponse<TenantRunSummary> {
        match self.run_tenant(tenant_id, today).await {
            Ok(summary) => {
                let renewed = summary.renewals.renewed.len();
                let message = match (&summary.reminders, &summary.reminder_error) {
                    (Some(reminders), _) => format!(
                        "Tenant {tenant_id}: {renewed} renewed, {} reminder(s) sent",
                        reminders.emails_sent
                    ),
                    (None, error) => format!(
                        "Tenant {tenant_id}: {renewed} renewed, reminders failed: {}",
                        error.as_deref().unwrap_or("unknown error")
                    ),
                };
                EngineResponse::with_status(summary.reminder_error.is_none(), message, summary)
            }
            Err(e) => {
                error!(tenant_id = %tenant_id, error = %e, "Tenant processing failed");
                EngineResponse::failure(format!("Tenant {tenant_id} failed: {e}"))
            }
        }
    }

    /// Enumerates tenants, then for each renews due subscriptions and sends policy
    /// reminders. One tenant's failure or timeout does not stop the others.
    pub async fn process_renewals_and_reminders(
        &self,
        today: NaiveDate,
    ) -> EngineResponse<DailyRunSummary> {
        let tenant_ids = tenants::list_active_tenants(self.store.as_ref()).await;
        let mut summary = DailyRunSummary {
            date: today,
            tenants: Vec::new(),
            failed_tenants: Vec::new(),
        };

        for tenant_id in &tenant_ids {
            match self.run_tenant(tenant_id, today).await {
                Ok(tenant_summary) => {
                    if let Some(error) = &tenant_summary.reminder_error {
                        summary.failed_tenants.push(TenantFailure {
                            tenant_id: tenant_id.clone(),
                            error: error.clone(),
                        });
                    }
                    summary.tenants.push(tenant_summary);
                }
                Err(e) => {
                    error!(tenant_id = %tenant_id, error = %e, "Tenant processing failed");
                    summary.failed_tenants.push(TenantFailure {
                        tenant_id: tenant_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let renewed: usize = summary.tenants.iter().map(|t| t.renewals.renewed.len()).sum();
        let reminded: usize = summary
            .tenants
            .iter()
            .filter_map(|t| t.reminders.as_ref())
            .map(|r| r.emails_sent)
            .sum();
        let message = format!(
            "Processed {} tenant(s): {renewed} renewed, {reminded} reminder(s) sent, {} tenant(s) failed",
            summary.tenants.len(),
            summary.failed_tenants.len()
        );
        info!(date = %today, "{message}");
        EngineResponse::with_status(summary.failed_tenants.is_empty(), message, summary)
    }

    /// Renews due subscriptions across all tenants.
    pub async fn process_auto_renewals(&self, today: NaiveDate) -> EngineResponse<RenewalRunSummary> {
        let store = self.store.as_ref();
        let mut summary = RenewalRunSummary::default();

        for tenant_id in tenants::list_active_tenants(store).await {
            let outcome = self
                .with_tenant_timeout(&tenant_id, renewal::process_tenant(store, &tenant_id, today))
                .await;
            match outcome {
                Ok(result) => {
                    summary.tenants_processed += 1;
                    summary.renewed.extend(result.renewed);
                    summary.failed.extend(result.failed);
                }
                Err(e) => {
                    error!(tenant_id = %tenant_id, error = %e, "Auto-renewal failed for tenant");
                    summary.failed_tenants.push(TenantFailure {
                        tenant_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let message = format!(
            "Auto-renewal complete: {} renewed, {} failed",
            summary.renewed.len(),
            summary.failed.len()
        );
        info!(date = %today, "{message}");
        EngineResponse::with_status(summary.failed_tenants.is_empty(), message, summary)
    }

    /// Runs one reminder pass over every tenant.
    async fn run_reminder_pass<'a, F, Fut>(
        &'a self,
        label: &str,
        today: NaiveDate,
        pass: F,
    ) -> EngineResponse<ReminderRunSummary>
    where
        F: Fn(&'a dyn SubscriptionStore, &'a dyn EmailSender, String) -> Fut,
        Fut: Future<Output = Result<ReminderRunResult>>,
    {
        let store = self.store.as_ref();
        let mailer = self.mailer.as_ref();
        let mut summary = ReminderRunSummary::default();

        for tenant_id in tenants::list_active_tenants(store).await {
            let outcome = self
                .with_tenant_timeout(&tenant_id, pass(store, mailer, tenant_id.clone()))
                .await;
            match outcome {
                Ok(result) => {
                    summary.tenants_processed += 1;
                    summary.totals.merge(result);
                }
                Err(e) => {
                    error!(tenant_id = %tenant_id, error = %e, pass = label, "Reminder pass failed for tenant");
                    summary.failed_tenants.push(TenantFailure {
                        tenant_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let message = format!(
            "{label}: {} email(s) sent, {} subscription(s) checked, {} failed",
            summary.totals.emails_sent,
            summary.totals.checked,
            summary.totals.failed.len()
        );
        info!(date = %today, "{message}");
        EngineResponse::with_status(summary.failed_tenants.is_empty(), message, summary)
    }

    /// Sends yearly individual reminders across all tenants.
    pub async fn check_and_send_yearly_reminders(
        &self,
        today: NaiveDate,
    ) -> EngineResponse<ReminderRunSummary> {
        self.run_reminder_pass("Yearly reminders", today, |store, mailer, tenant_id| async move {
            reminders::process_yearly_reminders(store, mailer, &tenant_id, today).await
        })
        .await
    }

    /// Sends the monthly digest across all tenants, regardless of the day.
    pub async fn send_monthly_reminders(
        &self,
        today: NaiveDate,
    ) -> EngineResponse<ReminderRunSummary> {
        self.run_reminder_pass("Monthly reminders", today, |store, mailer, tenant_id| async move {
            reminders::process_monthly_reminders(store, mailer, &tenant_id, today).await
        })
        .await
    }

    /// Sends the monthly digest only on the configured day of the month.
    pub async fn check_and_run_daily_reminders(
        &self,
        today: NaiveDate,
    ) -> EngineResponse<ReminderRunSummary> {
        if today.day() != self.config.monthly_reminder_day {
            let message = format!(
                "Monthly reminders run on day {}; today is day {}",
                self.config.monthly_reminder_day,
                today.day()
            );
            info!("{message}");
            return EngineResponse::ok(message, ReminderRunSummary::default());
        }
        self.send_monthly_reminders(today).await
    }

    /// Operator-triggered auto-renewal run.
    pub async fn trigger_auto_renewals(&self, today: NaiveDate) -> EngineResponse<RenewalRunSummary> {
        warn!(trigger = ?Trigger::Manual, date = %today, "Manual auto-renewal run requested");
        self.process_auto_renewals(today).await
    }

    /// Operator-triggered yearly reminder run.
    pub async fn trigger_yearly_reminders(
        &self,
        today: NaiveDate,
    ) -> EngineResponse<ReminderRunSummary> {
        warn!(trigger = ?Trigger::Manual, date = %today, "Manual yearly reminder run requested");
        self.check_and_send_yearly_reminders(today).await
    }

    /// Operator-triggered monthly digest; bypasses the day-of-month gate.
    pub async fn trigger_monthly_reminders(
        &self,
        today: NaiveDate,
    ) -> EngineResponse<ReminderRunSummary> {
        warn!(trigger = ?Trigger::Manual, date = %today, "Manual monthly reminder run requested");
        self.send_monthly_reminders(today).await
    }

    /// Everything the daily scheduler runs, in order. The monthly digest stays gated
    /// on its configured day whatever the trigger.
    pub async fn run_daily_jobs(&self, today: NaiveDate, trigger: Trigger) {
        info!(trigger = ?trigger, date = %today, "Starting daily jobs");
        let daily = self.process_renewals_and_reminders(today).await;
        let yearly = self.check_and_send_yearly_reminders(today).await;
        let monthly = self.check_and_run_daily_reminders(today).await;
        info!(
            daily = %daily.message,
            yearly = %yearly.message,
            monthly = %monthly.message,
            "Daily jobs finished"
        );
    }

    /// Deduplicated notification feed for one tenant, newest first.
    pub async fn notification_feed(&self, tenant_id: &str) -> EngineResponse<Vec<NotificationEvent>> {
        match notifications::build_feed(self.store.as_ref(), tenant_id).await {
            Ok(feed) => EngineResponse::ok(format!("{} notification(s)", feed.len()), feed),
            Err(e) => {
                error!(tenant_id = %tenant_id, error = %e, "Failed to build notification feed");
                EngineResponse::failure(format!("Failed to build notification feed: {e}"))
            }
        }
    }
}
