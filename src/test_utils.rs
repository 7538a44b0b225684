//! Shared test utilities for the renewal engine.
//!
//! Helpers for setting up in-memory stores, inserting fixtures with sensible
//! defaults, and test doubles for the email sender and for store failures.

use crate::{
    email::{EmailMessage, EmailSender},
    entities::{
        HistoryModel, ReminderModel, SubscriptionModel, subscription, tenant_user,
    },
    errors::{Error, Result},
    models::ReminderType,
    store::{
        NewHistoryRecord, NewReminder, SeaOrmSubscriptionStore, SubscriptionStore,
        SubscriptionUpdate,
    },
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use std::{collections::HashSet, sync::Mutex};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a store over a fresh in-memory database.
pub async fn setup_test_store() -> Result<SeaOrmSubscriptionStore> {
    Ok(SeaOrmSubscriptionStore::new(setup_test_db().await?))
}

/// Builds a subscription fixture without touching the database.
///
/// # Defaults
/// * `billing_cycle`: "monthly", `amount`: "49.99" USD
/// * `start_date`: 2025-01-01, `next_renewal`: 2025-02-01
/// * `auto_renewal`: false
/// * `reminder_policy`: "One time", 7 days before renewal
/// * active, status "Active", no owner
#[allow(clippy::unwrap_used)]
pub fn test_subscription(id: &str, tenant_id: &str) -> SubscriptionModel {
    SubscriptionModel {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        service_name: format!("Service {id}"),
        vendor: "Acme Vendor".to_string(),
        amount: "49.99".to_string(),
        qty: Some("1".to_string()),
        total_amount: None,
        lcy_amount: None,
        currency: Some("USD".to_string()),
        billing_cycle: "monthly".to_string(),
        start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        next_renewal: NaiveDate::from_ymd_opt(2025, 2, 1),
        auto_renewal: false,
        reminder_policy: Some("One time".to_string()),
        reminder_days: 7,
        is_active: true,
        status: "Active".to_string(),
        owner: None,
        owner_email: None,
    }
}

/// Inserts a subscription fixture as-is.
pub async fn insert_subscription(
    db: &DatabaseConnection,
    model: SubscriptionModel,
) -> Result<SubscriptionModel> {
    let active = subscription::ActiveModel {
        id: Set(model.id),
        tenant_id: Set(model.tenant_id),
        service_name: Set(model.service_name),
        vendor: Set(model.vendor),
        amount: Set(model.amount),
        qty: Set(model.qty),
        total_amount: Set(model.total_amount),
        lcy_amount: Set(model.lcy_amount),
        currency: Set(model.currency),
        billing_cycle: Set(model.billing_cycle),
        start_date: Set(model.start_date),
        next_renewal: Set(model.next_renewal),
        auto_renewal: Set(model.auto_renewal),
        reminder_policy: Set(model.reminder_policy),
        reminder_days: Set(model.reminder_days),
        is_active: Set(model.is_active),
        status: Set(model.status),
        owner: Set(model.owner),
        owner_email: Set(model.owner_email),
    };
    Ok(active.insert(db).await?)
}

/// Adds a user to a tenant's directory.
pub async fn insert_tenant_user(
    db: &DatabaseConnection,
    tenant_id: &str,
    full_name: &str,
    email: &str,
) -> Result<()> {
    tenant_user::ActiveModel {
        tenant_id: Set(tenant_id.to_string()),
        full_name: Set(full_name.to_string()),
        email: Set(email.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Email sender that records what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    rejected: HashSet<String>,
}

impl RecordingEmailSender {
    /// Accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects messages addressed to `address`, accepts the rest.
    pub fn failing_for(address: &str) -> Self {
        Self {
            rejected: HashSet::from([address.to_string()]),
            ..Self::default()
        }
    }

    /// Messages accepted so far.
    #[allow(clippy::unwrap_used)]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    #[allow(clippy::unwrap_used)]
    async fn send_email(&self, message: &EmailMessage) -> bool {
        if self.rejected.contains(&message.to) {
            return false;
        }
        self.sent.lock().unwrap().push(message.clone());
        true
    }
}

/// Wraps a real store and injects failures on demand.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    fail_tenant_listing: bool,
    fail_history_appends: bool,
    stall_reminder_lookups: bool,
    failing_updates: HashSet<String>,
    failing_loads: HashSet<String>,
    stalled_tenants: HashSet<String>,
}

impl<S: SubscriptionStore> FaultyStore<S> {
    /// Passes everything through until configured otherwise.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_tenant_listing: false,
            fail_history_appends: false,
            stall_reminder_lookups: false,
            failing_updates: HashSet::new(),
            failing_loads: HashSet::new(),
            stalled_tenants: HashSet::new(),
        }
    }

    /// Tenant enumeration returns an error.
    pub fn failing_tenant_listing(mut self) -> Self {
        self.fail_tenant_listing = true;
        self
    }

    /// History appends return an error; renewals then fail before anything is stored.
    pub fn failing_history_appends(mut self) -> Self {
        self.fail_history_appends = true;
        self
    }

    /// Reminder lookups never complete.
    pub fn stalling_reminder_lookups(mut self) -> Self {
        self.stall_reminder_lookups = true;
        self
    }

    /// Updates to `subscription_id` return an error.
    pub fn failing_updates_for(mut self, subscription_id: &str) -> Self {
        self.failing_updates.insert(subscription_id.to_string());
        self
    }

    /// Loading `tenant_id`'s subscriptions returns an error.
    pub fn failing_loads_for_tenant(mut self, tenant_id: &str) -> Self {
        self.failing_loads.insert(tenant_id.to_string());
        self
    }

    /// Loading `tenant_id`'s subscriptions never completes.
    pub fn stalling_tenant(mut self, tenant_id: &str) -> Self {
        self.stalled_tenants.insert(tenant_id.to_string());
        self
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

fn injected(what: &str) -> Error {
    Error::Database(DbErr::Custom(format!("injected failure: {what}")))
}

#[async_trait]
impl<S: SubscriptionStore> SubscriptionStore for FaultyStore<S> {
    async fn distinct_active_tenant_ids(&self) -> Result<Vec<String>> {
        if self.fail_tenant_listing {
            return Err(injected("tenant listing"));
        }
        self.inner.distinct_active_tenant_ids().await
    }

    async fn get_subscriptions(&self, tenant_id: &str) -> Result<Vec<SubscriptionModel>> {
        if self.stalled_tenants.contains(tenant_id) {
            std::future::pending::<()>().await;
        }
        if self.failing_loads.contains(tenant_id) {
            return Err(injected("subscription load"));
        }
        self.inner.get_subscriptions(tenant_id).await
    }

    async fn update_subscription(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<()> {
        if self.failing_updates.contains(subscription_id) {
            return Err(injected("subscription update"));
        }
        self.inner
            .update_subscription(tenant_id, subscription_id, update)
            .await
    }

    async fn get_reminders(&self, tenant_id: &str) -> Result<Vec<ReminderModel>> {
        self.inner.get_reminders(tenant_id).await
    }

    async fn find_reminders(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        reminder_type: ReminderType,
    ) -> Result<Vec<ReminderModel>> {
        if self.stall_reminder_lookups {
            std::future::pending::<()>().await;
        }
        self.inner
            .find_reminders(tenant_id, subscription_id, reminder_type)
            .await
    }

    async fn create_reminder(&self, reminder: NewReminder) -> Result<ReminderModel> {
        self.inner.create_reminder(reminder).await
    }

    async fn append_history(&self, record: NewHistoryRecord) -> Result<HistoryModel> {
        if self.fail_history_appends {
            return Err(injected("history append"));
        }
        self.inner.append_history(record).await
    }

    async fn renew_subscription(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        update: SubscriptionUpdate,
        record: NewHistoryRecord,
    ) -> Result<HistoryModel> {
        if self.failing_updates.contains(subscription_id) {
            return Err(injected("subscription update"));
        }
        if self.fail_history_appends {
            return Err(injected("history append"));
        }
        self.inner
            .renew_subscription(tenant_id, subscription_id, update, record)
            .await
    }

    async fn get_history(&self, tenant_id: &str) -> Result<Vec<HistoryModel>> {
        self.inner.get_history(tenant_id).await
    }

    async fn find_user_email(&self, tenant_id: &str, full_name: &str) -> Result<Option<String>> {
        self.inner.find_user_email(tenant_id, full_name).await
    }
}
