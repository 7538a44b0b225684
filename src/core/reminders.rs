//! Reminder scheduling and delivery.
//!
//! Three firing paths share the same delivery pipeline:
//!
//! - policy-driven reminders ([`process_tenant`]), where each subscription's
//!   reminder policy decides the trigger dates;
//! - yearly individual reminders ([`process_yearly_reminders`]) fired exactly
//!   `reminder_days` before a yearly renewal;
//! - the monthly batch digest ([`process_monthly_reminders`]) listing each owner's
//!   monthly subscriptions that renew before the end of next month.
//!
//! Each path records its own [`ReminderType`], so the "already sent today" check of one
//! path never suppresses another. A reminder record is written only after the email
//! was accepted, which keeps a failed delivery eligible for the next run.
//!
//! The check is read-then-write and not atomic: two overlapping runs on the same day
//! can both send. Runs are expected to be once daily.

use crate::{
    core::date_math::{days_before, is_same_calendar_day, reminder_trigger_dates},
    email::{EmailMessage, EmailSender},
    entities::SubscriptionModel,
    errors::Result,
    models::{BillingCycle, ReminderType},
    store::{NewReminder, SubscriptionStore},
};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Why a reminder could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderFailureKind {
    /// No usable owner email could be resolved
    InvalidEmail,
    /// The email sender reported a failure
    SendFailed,
    /// Reading or writing reminder state failed
    Store,
}

/// A reminder that was due but not delivered (or not recorded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderFailure {
    /// Tenant owning the subscription
    pub tenant_id: String,
    /// Subscription id
    pub subscription_id: String,
    /// Firing path
    pub reminder_type: ReminderType,
    /// Failure category
    pub kind: ReminderFailureKind,
    /// Human-readable detail
    pub detail: String,
}

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRunResult {
    /// Reminder records written
    pub reminders_sent: usize,
    /// Emails accepted by the sender
    pub emails_sent: usize,
    /// Subscriptions evaluated
    pub checked: usize,
    /// Due reminders that did not go out
    pub failed: Vec<ReminderFailure>,
}

impl ReminderRunResult {
    /// Folds another result into this one.
    pub fn merge(&mut self, other: Self) {
        self.reminders_sent += other.reminders_sent;
        self.emails_sent += other.emails_sent;
        self.checked += other.checked;
        self.failed.extend(other.failed);
    }

    fn fail(
        &mut self,
        sub: &SubscriptionModel,
        reminder_type: ReminderType,
        kind: ReminderFailureKind,
        detail: impl Into<String>,
    ) {
        self.failed.push(ReminderFailure {
            tenant_id: sub.tenant_id.clone(),
            subscription_id: sub.id.clone(),
            reminder_type,
            kind,
            detail: detail.into(),
        });
    }
}

/// Loose syntactic check on an email address.
#[must_use]
pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL_REGEX.is_match(candidate.trim())
}

/// Reminder type due today under the subscription's policy, if any.
#[must_use]
pub fn policy_reminder_due(sub: &SubscriptionModel, today: NaiveDate) -> Option<ReminderType> {
    let policy = sub.policy();
    reminder_trigger_dates(policy, sub.reminder_days, sub.next_renewal, today)
        .contains(&today)
        .then_some(policy.reminder_type())
}

/// True when a yearly subscription's single reminder date is `today`.
#[must_use]
pub fn yearly_reminder_due(sub: &SubscriptionModel, today: NaiveDate) -> bool {
    sub.cycle() == BillingCycle::Yearly
        && sub
            .next_renewal
            .and_then(|renewal| days_before(renewal, sub.reminder_days))
            .is_some_and(|reminder_date| is_same_calendar_day(&reminder_date, &today))
}

/// Inclusive renewal-date window covered by the monthly digest sent on `today`:
/// from tomorrow through the last day of next month.
#[must_use]
pub fn monthly_batch_window(today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = today.succ_opt()?;
    let end = today
        .with_day(1)?
        .checked_add_months(Months::new(2))?
        .pred_opt()?;
    Some((start, end))
}

/// Timestamp stored on reminder records created while processing `today`.
fn processing_timestamp(today: NaiveDate) -> DateTime<Utc> {
    today.and_time(Utc::now().time()).and_utc()
}

/// Whether a reminder of `reminder_type` was already recorded for `sub` on `today`.
pub async fn already_sent_today(
    store: &dyn SubscriptionStore,
    sub: &SubscriptionModel,
    reminder_type: ReminderType,
    today: NaiveDate,
) -> Result<bool> {
    let records = store
        .find_reminders(&sub.tenant_id, &sub.id, reminder_type)
        .await?;
    Ok(records
        .iter()
        .any(|record| is_same_calendar_day(&record.created_at, &today)))
}

/// Resolves the address reminders for `sub` go to.
///
/// Uses `owner_email` when it is a valid address, otherwise looks the owner's display
/// name up in the tenant's user directory. Returns `None` when neither yields a valid
/// address.
pub async fn resolve_owner_email(
    store: &dyn SubscriptionStore,
    sub: &SubscriptionModel,
) -> Result<Option<String>> {
    if let Some(email) = sub.owner_email.as_deref().map(str::trim) {
        if is_valid_email(email) {
            return Ok(Some(email.to_string()));
        }
    }

    let Some(owner) = sub.owner.as_deref().map(str::trim).filter(|o| !o.is_empty()) else {
        return Ok(None);
    };

    let looked_up = store.find_user_email(&sub.tenant_id, owner).await?;
    Ok(looked_up
        .map(|email| email.trim().to_string())
        .filter(|email| is_valid_email(email)))
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders the reminder email for a single subscription.
#[must_use]
pub fn render_reminder_email(
    sub: &SubscriptionModel,
    to: &str,
    today: NaiveDate,
) -> EmailMessage {
    let renewal = sub
        .next_renewal
        .map_or_else(|| "an upcoming date".to_string(), |d| d.format("%B %-d, %Y").to_string());
    let days_left = sub
        .next_renewal
        .map(|d| (d - today).num_days())
        .unwrap_or_default();
    let service = escape_html(&sub.service_name);

    EmailMessage {
        to: to.to_string(),
        subject: format!("Renewal reminder: {} renews on {renewal}", sub.service_name),
        html: format!(
            "<p>Your subscription <strong>{service}</strong> from {vendor} renews on \
             <strong>{renewal}</strong> ({days_left} day(s) from now).</p>\
             <p>Amount: {amount} {currency} ({cycle}). Auto-renewal is {auto}.</p>",
            vendor = escape_html(&sub.vendor),
            amount = escape_html(&sub.amount),
            currency = escape_html(sub.currency.as_deref().unwrap_or("")),
            cycle = sub.cycle(),
            auto = if sub.auto_renewal { "on" } else { "off" },
        ),
    }
}

/// Renders one owner's monthly digest.
#[must_use]
pub fn render_monthly_digest(to: &str, subs: &[&SubscriptionModel], today: NaiveDate) -> EmailMessage {
    let mut rows = String::new();
    for sub in subs {
        let renewal = sub
            .next_renewal
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&sub.service_name),
            escape_html(&sub.vendor),
            escape_html(&sub.amount),
            renewal
        ));
    }

    EmailMessage {
        to: to.to_string(),
        subject: format!(
            "Monthly renewal summary: {} subscription(s) renewing soon",
            subs.len()
        ),
        html: format!(
            "<p>As of {}, the following monthly subscriptions renew before the end of next \
             month:</p><table><tr><th>Service</th><th>Vendor</th><th>Amount</th>\
             <th>Renews</th></tr>{rows}</table>",
            today.format("%B %-d, %Y")
        ),
    }
}

async fn record_reminder(
    store: &dyn SubscriptionStore,
    sub: &SubscriptionModel,
    reminder_type: ReminderType,
    today: NaiveDate,
    result: &mut ReminderRunResult,
) {
    let new = NewReminder {
        subscription_id: sub.id.clone(),
        tenant_id: sub.tenant_id.clone(),
        alert_days: sub.reminder_days,
        reminder_type,
        renewal_date: sub.next_renewal,
        created_at: processing_timestamp(today),
    };
    match store.create_reminder(new).await {
        Ok(_) => result.reminders_sent += 1,
        Err(e) => {
            error!(
                tenant_id = %sub.tenant_id,
                subscription_id = %sub.id,
                reminder_type = %reminder_type,
                error = %e,
                "Reminder sent but could not be recorded"
            );
            result.fail(sub, reminder_type, ReminderFailureKind::Store, e.to_string());
        }
    }
}

/// Runs idempotence check, email resolution, delivery and recording for one
/// subscription. Never fails; problems land in `result.failed`.
async fn fire_individual(
    store: &dyn SubscriptionStore,
    mailer: &dyn EmailSender,
    sub: &SubscriptionModel,
    reminder_type: ReminderType,
    today: NaiveDate,
    result: &mut ReminderRunResult,
) {
    match already_sent_today(store, sub, reminder_type, today).await {
        Ok(true) => {
            debug!(subscription_id = %sub.id, reminder_type = %reminder_type, "Already sent today");
            return;
        }
        Ok(false) => {}
        Err(e) => {
            result.fail(sub, reminder_type, ReminderFailureKind::Store, e.to_string());
            return;
        }
    }

    let to = match resolve_owner_email(store, sub).await {
        Ok(Some(to)) => to,
        Ok(None) => {
            warn!(subscription_id = %sub.id, owner = ?sub.owner, "No valid owner email");
            result.fail(
                sub,
                reminder_type,
                ReminderFailureKind::InvalidEmail,
                format!("no valid email for owner {:?}", sub.owner),
            );
            return;
        }
        Err(e) => {
            result.fail(sub, reminder_type, ReminderFailureKind::Store, e.to_string());
            return;
        }
    };

    let message = render_reminder_email(sub, &to, today);
    if !mailer.send_email(&message).await {
        warn!(subscription_id = %sub.id, to = %to, "Reminder email was not delivered");
        result.fail(
            sub,
            reminder_type,
            ReminderFailureKind::SendFailed,
            format!("delivery to {to} failed"),
        );
        return;
    }
    result.emails_sent += 1;

    record_reminder(store, sub, reminder_type, today, result).await;
}

/// Sends policy-driven reminders for one tenant.
///
/// # Errors
/// Only when the tenant's subscriptions cannot be loaded.
#[instrument(skip(store, mailer))]
pub async fn process_tenant(
    store: &dyn SubscriptionStore,
    mailer: &dyn EmailSender,
    tenant_id: &str,
    today: NaiveDate,
) -> Result<ReminderRunResult> {
    let subscriptions = store.get_subscriptions(tenant_id).await?;
    let mut result = ReminderRunResult::default();

    for sub in subscriptions
        .iter()
        .filter(|s| s.is_live() && s.next_renewal.is_some())
    {
        result.checked += 1;
        if let Some(reminder_type) = policy_reminder_due(sub, today) {
            fire_individual(store, mailer, sub, reminder_type, today, &mut result).await;
        }
    }

    info!(
        tenant_id = %tenant_id,
        checked = result.checked,
        emails_sent = result.emails_sent,
        reminders_sent = result.reminders_sent,
        failed = result.failed.len(),
        "Policy reminders processed"
    );
    Ok(result)
}

/// Sends the individual reminder for yearly subscriptions whose reminder date is today.
///
/// # Errors
/// Only when the tenant's subscriptions cannot be loaded.
#[instrument(skip(store, mailer))]
pub async fn process_yearly_reminders(
    store: &dyn SubscriptionStore,
    mailer: &dyn EmailSender,
    tenant_id: &str,
    today: NaiveDate,
) -> Result<ReminderRunResult> {
    let subscriptions = store.get_subscriptions(tenant_id).await?;
    let mut result = ReminderRunResult::default();

    for sub in subscriptions
        .iter()
        .filter(|s| s.is_live() && s.next_renewal.is_some() && s.cycle() == BillingCycle::Yearly)
    {
        result.checked += 1;
        if yearly_reminder_due(sub, today) {
            fire_individual(
                store,
                mailer,
                sub,
                ReminderType::YearlyIndividual,
                today,
                &mut result,
            )
            .await;
        }
    }

    info!(
        tenant_id = %tenant_id,
        checked = result.checked,
        emails_sent = result.emails_sent,
        "Yearly reminders processed"
    );
    Ok(result)
}

/// Sends each owner one digest of their monthly subscriptions renewing between
/// tomorrow and the end of next month.
///
/// Subscriptions already included in a digest today are left out; an owner with
/// nothing left gets no email.
///
/// # Errors
/// Only when the tenant's subscriptions cannot be loaded.
#[instrument(skip(store, mailer))]
pub async fn process_monthly_reminders(
    store: &dyn SubscriptionStore,
    mailer: &dyn EmailSender,
    tenant_id: &str,
    today: NaiveDate,
) -> Result<ReminderRunResult> {
    const TYPE: ReminderType = ReminderType::MonthlyRecurring;

    let subscriptions = store.get_subscriptions(tenant_id).await?;
    let mut result = ReminderRunResult::default();
    let Some((window_start, window_end)) = monthly_batch_window(today) else {
        return Ok(result);
    };

    let mut by_owner: BTreeMap<String, Vec<&SubscriptionModel>> = BTreeMap::new();
    for sub in subscriptions.iter().filter(|s| {
        s.is_live()
            && s.cycle() == BillingCycle::Monthly
            && s
                .next_renewal
                .is_some_and(|d| d >= window_start && d <= window_end)
    }) {
        result.checked += 1;

        match already_sent_today(store, sub, TYPE, today).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                result.fail(sub, TYPE, ReminderFailureKind::Store, e.to_string());
                continue;
            }
        }

        match resolve_owner_email(store, sub).await {
            Ok(Some(to)) => by_owner.entry(to).or_default().push(sub),
            Ok(None) => result.fail(
                sub,
                TYPE,
                ReminderFailureKind::InvalidEmail,
                format!("no valid email for owner {:?}", sub.owner),
            ),
            Err(e) => result.fail(sub, TYPE, ReminderFailureKind::Store, e.to_string()),
        }
    }

    for (to, subs) in by_owner {
        let message = render_monthly_digest(&to, &subs, today);
        if !mailer.send_email(&message).await {
            warn!(tenant_id = %tenant_id, to = %to, "Monthly digest was not delivered");
            for sub in subs {
                result.fail(
                    sub,
                    TYPE,
                    ReminderFailureKind::SendFailed,
                    format!("delivery to {to} failed"),
                );
            }
            continue;
        }
        result.emails_sent += 1;
        for sub in subs {
            record_reminder(store, sub, TYPE, today, &mut result).await;
        }
    }

    info!(
        tenant_id = %tenant_id,
        checked = result.checked,
        emails_sent = result.emails_sent,
        reminders_sent = result.reminders_sent,
        "Monthly digests processed"
    );
    Ok(result)
}
