//! Automatic renewal of subscriptions whose payment date has arrived.
//!
//! For one tenant, every subscription with auto-renewal enabled and a next payment
//! date equal to the processing day gets a new billing period starting that day. Each
//! renewal writes the new dates and appends a `"Renewed"` history record in one store
//! transaction, so a renewal that fails leaves the subscription due for the next run.
//! Failures are isolated per subscription: one bad record never stops its siblings.

use crate::{
    core::date_math::{add_billing_period, is_same_calendar_day},
    entities::SubscriptionModel,
    errors::{Error, Result},
    store::{NewHistoryRecord, SubscriptionStore, SubscriptionUpdate},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::{collections::HashSet, str::FromStr};
use tracing::{error, info, instrument, warn};

/// Actor recorded on history entries written by this module.
pub const AUTO_RENEWAL_ACTOR: &str = "System (Auto-Renewal)";

/// History action for a completed renewal.
pub const RENEWED_ACTION: &str = "Renewed";

/// A subscription that was renewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewedSubscription {
    /// Tenant owning the subscription
    pub tenant_id: String,
    /// Subscription id
    pub subscription_id: String,
    /// Service name, for operator-facing output
    pub service_name: String,
    /// Start date before renewal
    pub previous_start_date: NaiveDate,
    /// Payment date that triggered the renewal
    pub previous_next_renewal: NaiveDate,
    /// New start date (the processing day)
    pub start_date: NaiveDate,
    /// New next payment date
    pub next_renewal: NaiveDate,
}

/// A subscription whose renewal failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalFailure {
    /// Tenant owning the subscription
    pub tenant_id: String,
    /// Subscription id
    pub subscription_id: String,
    /// Service name, for operator-facing output
    pub service_name: String,
    /// Rendered error
    pub error: String,
}

/// Outcome of renewing one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRenewalResult {
    /// Subscriptions renewed
    pub renewed: Vec<RenewedSubscription>,
    /// Subscriptions that could not be renewed
    pub failed: Vec<RenewalFailure>,
}

/// Picks the subscriptions due for automatic renewal on `today`.
///
/// Duplicate ids in the input are only selected once.
#[must_use]
pub fn select_renewal_candidates(
    subscriptions: &[SubscriptionModel],
    today: NaiveDate,
) -> Vec<&SubscriptionModel> {
    let mut seen: HashSet<String> = HashSet::new();
    subscriptions
        .iter()
        .filter(|sub| sub.auto_renewal)
        .filter(|sub| {
            sub.next_renewal
                .is_some_and(|next| is_same_calendar_day(&next, &today))
        })
        .filter(|sub| seen.insert(sub.id.clone()))
        .collect()
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Parses a stored money-like field, returning `default` when absent or malformed.
#[must_use]
pub fn coerce_decimal(raw: Option<&str>, default: Decimal) -> Decimal {
    raw.and_then(parse_decimal).unwrap_or(default)
}

/// Builds the pre-renewal snapshot stored under the history record's `data`.
///
/// Money fields are normalised to decimals; unparseable values degrade to 0 (amounts)
/// or 1 (quantity) and are logged, never rejected.
#[must_use]
pub fn renewal_snapshot(sub: &SubscriptionModel) -> serde_json::Value {
    let amount = parse_decimal(&sub.amount).unwrap_or_else(|| {
        warn!(
            subscription_id = %sub.id,
            raw_amount = %sub.amount,
            "Malformed amount, recording 0 in audit snapshot"
        );
        Decimal::ZERO
    });

    json!({
        "id": sub.id,
        "tenantId": sub.tenant_id,
        "serviceName": sub.service_name,
        "vendor": sub.vendor,
        "amount": amount,
        "qty": coerce_decimal(sub.qty.as_deref(), Decimal::ONE),
        "totalAmount": coerce_decimal(sub.total_amount.as_deref(), Decimal::ZERO),
        "lcyAmount": coerce_decimal(sub.lcy_amount.as_deref(), Decimal::ZERO),
        "currency": sub.currency,
        "billingCycle": sub.billing_cycle,
        "startDate": sub.start_date,
        "nextRenewal": sub.next_renewal,
        "autoRenewal": sub.auto_renewal,
        "reminderPolicy": sub.reminder_policy,
        "reminderDays": sub.reminder_days,
        "isActive": sub.is_active,
        "status": sub.status,
        "owner": sub.owner,
    })
}

/// Renews every due subscription of one tenant.
///
/// # Errors
/// Only when the tenant's subscriptions cannot be loaded; per-subscription failures
/// are reported in [`TenantRenewalResult::failed`].
#[instrument(skip(store))]
pub async fn process_tenant(
    store: &dyn SubscriptionStore,
    tenant_id: &str,
    today: NaiveDate,
) -> Result<TenantRenewalResult> {
    let subscriptions = store.get_subscriptions(tenant_id).await?;
    let candidates = select_renewal_candidates(&subscriptions, today);
    info!(
        tenant_id = %tenant_id,
        total = subscriptions.len(),
        due = candidates.len(),
        "Processing auto-renewals"
    );

    let mut result = TenantRenewalResult::default();
    for sub in candidates {
        match renew_subscription(store, sub, today).await {
            Ok(renewed) => {
                info!(
                    tenant_id = %tenant_id,
                    subscription_id = %sub.id,
                    next_renewal = %renewed.next_renewal,
                    "Subscription renewed"
                );
                result.renewed.push(renewed);
            }
            Err(e) => {
                error!(
                    tenant_id = %tenant_id,
                    subscription_id = %sub.id,
                    error = %e,
                    "Failed to renew subscription"
                );
                result.failed.push(RenewalFailure {
                    tenant_id: tenant_id.to_string(),
                    subscription_id: sub.id.clone(),
                    service_name: sub.service_name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(result)
}

async fn renew_subscription(
    store: &dyn SubscriptionStore,
    sub: &SubscriptionModel,
    today: NaiveDate,
) -> Result<RenewedSubscription> {
    let previous_next_renewal = sub.next_renewal.unwrap_or(today);
    let new_end =
        add_billing_period(today, sub.cycle()).ok_or(Error::DateOutOfRange { date: today })?;
    let snapshot = renewal_snapshot(sub);

    let update = SubscriptionUpdate {
        start_date: Some(today),
        next_renewal: Some(new_end),
    };
    let record = NewHistoryRecord {
        action: RENEWED_ACTION.to_string(),
        subscription_id: sub.id.clone(),
        tenant_id: sub.tenant_id.clone(),
        timestamp: Utc::now(),
        data: snapshot,
        updated_fields: json!({
            "startDate": today,
            "nextRenewal": new_end,
        }),
        changed_by: AUTO_RENEWAL_ACTOR.to_string(),
        change_reason: Some(format!(
            "Automatic {} renewal on billing date",
            sub.cycle()
        )),
    };
    store
        .renew_subscription(&sub.tenant_id, &sub.id, update, record)
        .await?;

    Ok(RenewedSubscription {
        tenant_id: sub.tenant_id.clone(),
        subscription_id: sub.id.clone(),
        service_name: sub.service_name.clone(),
        previous_start_date: sub.start_date,
        previous_next_renewal,
        start_date: today,
        next_renewal: new_end,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{models::BillingCycle, test_utils::*};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn due_monthly(id: &str, tenant: &str) -> SubscriptionModel {
        let mut sub = test_subscription(id, tenant);
        sub.billing_cycle = "monthly".to_string();
        sub.start_date = date(2025, 1, 1);
        sub.next_renewal = Some(date(2025, 2, 1));
        sub.auto_renewal = true;
        sub
    }

    #[tokio::test]
    async fn test_monthly_renewal_scenario() -> Result<()> {
        let store = setup_test_store().await?;
        insert_subscription(store.connection(), due_monthly("s1", "acme")).await?;

        let today = date(2025, 2, 1);
        let result = process_tenant(&store, "acme", today).await?;
        assert_eq!(result.renewed.len(), 1);
        assert!(result.failed.is_empty());

        let sub = store.get_subscriptions("acme").await?.remove(0);
        assert_eq!(sub.start_date, date(2025, 2, 1));
        assert_eq!(sub.next_renewal, Some(date(2025, 2, 28)));
        assert_eq!(sub.amount, "49.99");

        let history = store.get_history("acme").await?;
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.action, "Renewed");
        assert_eq!(record.changed_by, AUTO_RENEWAL_ACTOR);
        assert_eq!(record.data["startDate"], json!("2025-01-01"));
        assert_eq!(record.data["nextRenewal"], json!("2025-02-01"));
        assert_eq!(
            record.updated_fields,
            json!({"startDate": "2025-02-01", "nextRenewal": "2025-02-28"})
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_new_start_is_previous_renewal_and_end_is_later() -> Result<()> {
        let store = setup_test_store().await?;
        let today = date(2025, 5, 15);
        for (i, cycle) in BillingCycle::ALL.iter().enumerate() {
            let mut sub = test_subscription(&format!("s{i}"), "acme");
            sub.billing_cycle = cycle.as_str().to_string();
            sub.start_date = date(2025, 4, 1);
            sub.next_renewal = Some(today);
            sub.auto_renewal = true;
            insert_subscription(store.connection(), sub).await?;
        }

        let result = process_tenant(&store, "acme", today).await?;
        assert_eq!(result.renewed.len(), BillingCycle::ALL.len());
        for renewed in &result.renewed {
            assert_eq!(renewed.start_date, renewed.previous_next_renewal);
            assert!(renewed.next_renewal > today);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_only_due_auto_renewing_subscriptions_renew() -> Result<()> {
        let store = setup_test_store().await?;
        let db = store.connection();
        insert_subscription(db, due_monthly("due", "acme")).await?;

        let mut manual = due_monthly("manual", "acme");
        manual.auto_renewal = false;
        insert_subscription(db, manual).await?;

        let mut later = due_monthly("later", "acme");
        later.next_renewal = Some(date(2025, 2, 2));
        insert_subscription(db, later).await?;

        let mut unset = due_monthly("unset", "acme");
        unset.next_renewal = None;
        insert_subscription(db, unset).await?;

        let result = process_tenant(&store, "acme", date(2025, 2, 1)).await?;
        let ids: Vec<_> = result.renewed.iter().map(|r| r.subscription_id.as_str()).collect();
        assert_eq!(ids, vec!["due"]);
        assert_eq!(store.get_history("acme").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_subscription() -> Result<()> {
        let inner = setup_test_store().await?;
        insert_subscription(inner.connection(), due_monthly("bad", "acme")).await?;
        insert_subscription(inner.connection(), due_monthly("good", "acme")).await?;
        let store = FaultyStore::new(inner).failing_updates_for("bad");

        let result = process_tenant(&store, "acme", date(2025, 2, 1)).await?;
        assert_eq!(result.renewed.len(), 1);
        assert_eq!(result.renewed[0].subscription_id, "good");
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].subscription_id, "bad");

        // No audit record for the failed renewal
        let history = store.get_history("acme").await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].subscription_id, "good");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_history_append_leaves_subscription_due() -> Result<()> {
        let inner = setup_test_store().await?;
        insert_subscription(inner.connection(), due_monthly("s1", "acme")).await?;
        let store = FaultyStore::new(inner).failing_history_appends();
        let today = date(2025, 2, 1);

        let result = process_tenant(&store, "acme", today).await?;
        assert!(result.renewed.is_empty());
        assert_eq!(result.failed.len(), 1);

        let sub = store.get_subscriptions("acme").await?.remove(0);
        assert_eq!(sub.start_date, date(2025, 1, 1));
        assert_eq!(sub.next_renewal, Some(today));
        assert!(store.get_history("acme").await?.is_empty());

        // Still a candidate once the store recovers
        let retry = process_tenant(store.inner(), "acme", today).await?;
        assert_eq!(retry.renewed.len(), 1);
        assert_eq!(store.get_history("acme").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_amount_does_not_block_renewal() -> Result<()> {
        let store = setup_test_store().await?;
        let mut sub = due_monthly("s1", "acme");
        sub.amount = "twelve dollars".to_string();
        sub.qty = Some("n/a".to_string());
        sub.total_amount = Some("1,200.50".to_string());
        insert_subscription(store.connection(), sub).await?;

        let result = process_tenant(&store, "acme", date(2025, 2, 1)).await?;
        assert_eq!(result.renewed.len(), 1);

        let record = store.get_history("acme").await?.remove(0);
        assert_eq!(record.data["amount"], json!("0"));
        assert_eq!(record.data["qty"], json!("1"));
        assert_eq!(record.data["totalAmount"], json!("1200.50"));
        Ok(())
    }

    #[test]
    fn test_duplicate_ids_selected_once() {
        let sub = due_monthly("dup", "acme");
        let subs = vec![sub.clone(), sub];
        let candidates = select_renewal_candidates(&subs, date(2025, 2, 1));
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_coerce_decimal_defaults() {
        assert_eq!(coerce_decimal(None, Decimal::ONE), Decimal::ONE);
        assert_eq!(coerce_decimal(Some("  "), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(
            coerce_decimal(Some("19.90"), Decimal::ZERO),
            Decimal::from_str("19.90").unwrap()
        );
    }
}
