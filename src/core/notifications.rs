//! Notification deduplication and the per-tenant notification feed.
//!
//! Several stored records can describe the same user-facing notification (a reminder
//! written by two firing paths, repeated "owner changed" edits on one day, ...). Those
//! records are collapsed by a composite identity key rather than by storage id, and
//! the most informative record of each group is kept.

use crate::{
    entities::{HistoryModel, ReminderModel},
    errors::Result,
    store::SubscriptionStore,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// A notification-like event as surfaced to clients.
///
/// Every field except `id` is optional because events come from heterogeneous
/// sources (lifecycle history, reminder logs, compliance filings, licenses).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Storage id of the underlying record
    pub id: String,
    /// `"subscription"`, `"compliance"` or `"license"`
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    /// Set for subscription events
    pub subscription_id: Option<String>,
    /// Set for compliance events
    pub compliance_id: Option<String>,
    /// Set for license events
    pub license_id: Option<String>,
    /// Explicit kind: created, updated, deleted, reminder, `payment_method_expiring`
    pub event_type: Option<String>,
    /// Lifecycle subtype, e.g. `owner_changed`, `price_changed`, `renewed`
    pub lifecycle_event_type: Option<String>,
    /// Date the reminder fired for
    pub reminder_trigger_date: Option<String>,
    /// Reminder policy or reminder type
    pub reminder_type: Option<String>,
    /// Reminder lead time
    pub reminder_days: Option<i64>,
    /// Compliance submission deadline
    pub submission_deadline: Option<String>,
    /// Subscription renewal/end date
    pub subscription_end_date: Option<String>,
    /// When the event happened
    pub timestamp: Option<String>,
    /// Role the notification targets
    pub recipient_role: Option<String>,
    /// Departments the notification targets
    #[serde(default)]
    pub recipient_departments: Vec<String>,
    /// Preformatted message
    pub message: Option<String>,
    /// Display name for subscriptions
    pub service_name: Option<String>,
    /// Display name for compliance filings
    pub filing_name: Option<String>,
    /// Display name for licenses
    pub license_name: Option<String>,
}

impl NotificationEvent {
    fn entity_id(&self) -> Option<&str> {
        let id = match self.entity_type.as_deref()?.trim().to_ascii_lowercase().as_str() {
            "subscription" => self.subscription_id.as_deref(),
            "compliance" => self.compliance_id.as_deref(),
            "license" => self.license_id.as_deref(),
            _ => None,
        };
        id.map(str::trim).filter(|s| !s.is_empty())
    }

    fn display_name(&self) -> Option<&str> {
        [&self.service_name, &self.filing_name, &self.license_name]
            .into_iter()
            .filter_map(|name| name.as_deref())
            .map(str::trim)
            .find(|name| !name.is_empty())
    }

    fn has_reminder_shape(&self) -> bool {
        self.reminder_trigger_date.is_some()
            || self.reminder_type.is_some()
            || self.reminder_days.is_some()
            || self.submission_deadline.is_some()
            || self.subscription_end_date.is_some()
    }

    /// Event kind used in the dedup key.
    #[must_use]
    pub fn kind(&self) -> String {
        if let Some(event_type) = non_blank(self.event_type.as_deref()) {
            event_type.to_ascii_lowercase()
        } else if non_blank(self.lifecycle_event_type.as_deref()).is_some() {
            "updated".to_string()
        } else if self.has_reminder_shape() {
            "reminder".to_string()
        } else {
            String::new()
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Parses an event timestamp into epoch milliseconds.
///
/// Tries RFC 3339, then a bare `YYYY-MM-DD` date, then a naive `YYYY-MM-DD HH:MM:SS`
/// date-time, then raw epoch milliseconds; anything else is 0.
#[must_use]
pub fn timestamp_millis(raw: Option<&str>) -> i64 {
    let Some(raw) = non_blank(raw) else {
        return 0;
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_millis();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map_or(0, |dt| dt.and_utc().timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return dt.and_utc().timestamp_millis();
        }
    }
    raw.parse::<i64>().unwrap_or(0)
}

/// Date-only portion of a timestamp, as `YYYY-MM-DD`.
fn date_part(raw: Option<&str>) -> String {
    let Some(raw) = non_blank(raw) else {
        return String::new();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.date_naive().to_string();
    }
    raw.split(['T', ' ']).next().unwrap_or(raw).to_string()
}

fn normalize_policy(raw: Option<&str>) -> String {
    non_blank(raw)
        .map(|p| {
            p.to_ascii_lowercase()
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("_")
        })
        .unwrap_or_default()
}

/// Builds the composite identity key of an event.
///
/// Events without a type or entity id are keyed by their literal id so they are
/// kept rather than dropped.
#[must_use]
pub fn dedupe_key(event: &NotificationEvent) -> String {
    let (Some(entity_type), Some(entity_id)) = (
        non_blank(event.entity_type.as_deref()),
        event.entity_id(),
    ) else {
        return format!("id:{}", event.id);
    };

    let kind = event.kind();
    let mut key = format!("{}|{entity_id}|{kind}", entity_type.to_ascii_lowercase());

    match kind.as_str() {
        "updated" => {
            if let Some(subtype) = non_blank(event.lifecycle_event_type.as_deref()) {
                key.push('|');
                key.push_str(&subtype.to_ascii_lowercase());
                key.push('|');
                key.push_str(&date_part(event.timestamp.as_deref()));
            }
        }
        "reminder" => {
            let deadline = event
                .submission_deadline
                .as_deref()
                .or(event.subscription_end_date.as_deref());
            key.push_str(&format!(
                "|{}|{}|{}|{}",
                normalize_policy(event.reminder_type.as_deref()),
                event.reminder_days.map(|d| d.to_string()).unwrap_or_default(),
                date_part(event.reminder_trigger_date.as_deref()),
                date_part(deadline),
            ));
        }
        _ => {}
    }
    key
}

/// Informativeness score used to pick the survivor among duplicates.
///
/// Weights are powers of two so a higher-priority field always outweighs every
/// lower-priority field combined.
#[must_use]
pub fn survivor_score(event: &NotificationEvent) -> u32 {
    let mut score = 0;
    if non_blank(event.recipient_role.as_deref()).is_some() {
        score += 32;
    }
    if event.recipient_departments.iter().any(|d| !d.trim().is_empty()) {
        score += 16;
    }
    if non_blank(event.message.as_deref()).is_some() {
        score += 8;
    }
    if non_blank(event.reminder_trigger_date.as_deref()).is_some() {
        score += 4;
    }
    if event.display_name().is_some() {
        score += 2;
    }
    if non_blank(event.lifecycle_event_type.as_deref()).is_some() {
        score += 1;
    }
    score
}

/// True when `candidate` should replace `current` as the survivor of a key.
fn prefers(candidate: &NotificationEvent, current: &NotificationEvent) -> bool {
    let rank = |e: &NotificationEvent| (survivor_score(e), timestamp_millis(e.timestamp.as_deref()));
    match rank(candidate).cmp(&rank(current)) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        // Stable tie-break keeps the result independent of input order.
        std::cmp::Ordering::Equal => candidate.id < current.id,
    }
}

/// Collapses events that represent the same user-facing notification.
///
/// The output is ordered by key; callers re-sort for display.
#[must_use]
pub fn dedupe(events: Vec<NotificationEvent>) -> Vec<NotificationEvent> {
    let mut survivors: BTreeMap<String, NotificationEvent> = BTreeMap::new();
    for event in events {
        let key = dedupe_key(&event);
        match survivors.get(&key) {
            Some(current) if !prefers(&event, current) => {}
            _ => {
                survivors.insert(key, event);
            }
        }
    }
    survivors.into_values().collect()
}

fn snake_case(action: &str) -> String {
    action
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Converts a history record into a lifecycle event.
#[must_use]
pub fn history_event(record: &HistoryModel) -> NotificationEvent {
    let action = snake_case(&record.action);
    let (event_type, lifecycle_event_type) = match action.as_str() {
        "created" => (Some("created".to_string()), None),
        "deleted" => (Some("deleted".to_string()), None),
        _ => (None, Some(action)),
    };

    NotificationEvent {
        id: format!("history-{}", record.id),
        entity_type: Some("subscription".to_string()),
        subscription_id: Some(record.subscription_id.clone()),
        event_type,
        lifecycle_event_type,
        timestamp: Some(record.timestamp.to_rfc3339()),
        message: record
            .change_reason
            .clone()
            .or_else(|| Some(format!("{} by {}", record.action, record.changed_by))),
        service_name: record
            .data
            .get("serviceName")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        ..Default::default()
    }
}

/// Converts a reminder record into a reminder event.
#[must_use]
pub fn reminder_event(record: &ReminderModel, service_name: Option<&str>) -> NotificationEvent {
    NotificationEvent {
        id: format!("reminder-{}", record.id),
        entity_type: Some("subscription".to_string()),
        subscription_id: Some(record.subscription_id.clone()),
        event_type: Some("reminder".to_string()),
        reminder_trigger_date: Some(record.created_at.date_naive().to_string()),
        reminder_type: Some(record.reminder_type.clone()),
        reminder_days: Some(i64::from(record.alert_days)),
        subscription_end_date: record.renewal_date.map(|d| d.to_string()),
        timestamp: Some(record.created_at.to_rfc3339()),
        service_name: service_name.map(str::to_string),
        ..Default::default()
    }
}

/// Builds a tenant's deduplicated notification feed, newest first.
///
/// # Errors
/// When history, reminders or subscriptions cannot be read.
#[instrument(skip(store))]
pub async fn build_feed(
    store: &dyn SubscriptionStore,
    tenant_id: &str,
) -> Result<Vec<NotificationEvent>> {
    let names: HashMap<String, String> = store
        .get_subscriptions(tenant_id)
        .await?
        .into_iter()
        .map(|sub| (sub.id, sub.service_name))
        .collect();

    let mut events: Vec<NotificationEvent> = store
        .get_history(tenant_id)
        .await?
        .iter()
        .map(history_event)
        .collect();
    events.extend(store.get_reminders(tenant_id).await?.iter().map(|record| {
        reminder_event(record, names.get(&record.subscription_id).map(String::as_str))
    }));

    let mut feed = dedupe(events);
    feed.sort_by(|a, b| {
        timestamp_millis(b.timestamp.as_deref())
            .cmp(&timestamp_millis(a.timestamp.as_deref()))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(feed)
}
