//! Storage port consumed by the engine.
//!
//! The engine never talks to the database directly; it goes through
//! [`SubscriptionStore`] with the tenant id passed explicitly on every call. The
//! production implementation is [`SeaOrmSubscriptionStore`].

mod sea_orm_store;

pub use sea_orm_store::SeaOrmSubscriptionStore;

use crate::{
    entities::{HistoryModel, ReminderModel, SubscriptionModel},
    errors::Result,
    models::ReminderType,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Fields the engine is allowed to change on a subscription. `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    /// New start of the billing period
    pub start_date: Option<NaiveDate>,
    /// New next payment date
    pub next_renewal: Option<NaiveDate>,
}

/// A reminder record about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    /// Subscription the reminder was about
    pub subscription_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Reminder lead time at the moment of firing
    pub alert_days: i32,
    /// Firing path
    pub reminder_type: ReminderType,
    /// Renewal date announced by the reminder
    pub renewal_date: Option<NaiveDate>,
    /// Send time
    pub created_at: DateTime<Utc>,
}

/// A history record about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryRecord {
    /// What happened
    pub action: String,
    /// Subscription affected
    pub subscription_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Pre-change snapshot
    pub data: serde_json::Value,
    /// Changed keys with new values
    pub updated_fields: serde_json::Value,
    /// Actor
    pub changed_by: String,
    /// Free-text reason
    pub change_reason: Option<String>,
}

/// Read/write access to tenant-scoped subscription data.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Raw distinct `tenant_id` values over active subscriptions. May contain blanks.
    async fn distinct_active_tenant_ids(&self) -> Result<Vec<String>>;

    /// All subscriptions of a tenant, whatever their status.
    async fn get_subscriptions(&self, tenant_id: &str) -> Result<Vec<SubscriptionModel>>;

    /// Applies `update` to one subscription of the tenant.
    ///
    /// # Errors
    /// `Error::SubscriptionNotFound` when no such subscription exists for the tenant.
    async fn update_subscription(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<()>;

    /// All reminder records of a tenant.
    async fn get_reminders(&self, tenant_id: &str) -> Result<Vec<ReminderModel>>;

    /// Reminder records for one subscription and firing path.
    async fn find_reminders(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        reminder_type: ReminderType,
    ) -> Result<Vec<ReminderModel>>;

    /// Appends a reminder record.
    async fn create_reminder(&self, reminder: NewReminder) -> Result<ReminderModel>;

    /// Appends a history record.
    async fn append_history(&self, record: NewHistoryRecord) -> Result<HistoryModel>;

    /// Applies `update` and appends `record` atomically: either both are stored or
    /// neither is.
    ///
    /// # Errors
    /// `Error::SubscriptionNotFound` as for [`Self::update_subscription`], or any
    /// database failure; in both cases nothing is written.
    async fn renew_subscription(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        update: SubscriptionUpdate,
        record: NewHistoryRecord,
    ) -> Result<HistoryModel>;

    /// All history records of a tenant.
    async fn get_history(&self, tenant_id: &str) -> Result<Vec<HistoryModel>>;

    /// Looks up a user's email by display name in the tenant's directory.
    async fn find_user_email(&self, tenant_id: &str, full_name: &str) -> Result<Option<String>>;
}
