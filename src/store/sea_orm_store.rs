//! `SeaORM`-backed implementation of [`SubscriptionStore`].

use super::{NewHistoryRecord, NewReminder, SubscriptionStore, SubscriptionUpdate};
use crate::{
    entities::{
        History, HistoryModel, Reminder, ReminderModel, Subscription, SubscriptionModel,
        TenantUser, history, reminder, subscription, tenant_user,
    },
    errors::{Error, Result},
    models::ReminderType,
};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use tracing::{debug, instrument};

/// Subscription store over a `SeaORM` connection.
#[derive(Debug, Clone)]
pub struct SeaOrmSubscriptionStore {
    db: DatabaseConnection,
}

impl SeaOrmSubscriptionStore {
    /// Wraps an open connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Underlying connection, for setup code that needs raw access.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl SubscriptionStore for SeaOrmSubscriptionStore {
    #[instrument(skip(self))]
    async fn distinct_active_tenant_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = Subscription::find()
            .select_only()
            .column(subscription::Column::TenantId)
            .distinct()
            .filter(subscription::Column::IsActive.eq(true))
            .into_tuple()
            .all(&self.db)
            .await?;
        debug!(count = ids.len(), "Fetched distinct tenant ids");
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn get_subscriptions(&self, tenant_id: &str) -> Result<Vec<SubscriptionModel>> {
        Subscription::find()
            .filter(subscription::Column::TenantId.eq(tenant_id))
            .order_by_asc(subscription::Column::Id)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn update_subscription(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<()> {
        apply_update(&self.db, tenant_id, subscription_id, update).await
    }

    #[instrument(skip(self))]
    async fn get_reminders(&self, tenant_id: &str) -> Result<Vec<ReminderModel>> {
        Reminder::find()
            .filter(reminder::Column::TenantId.eq(tenant_id))
            .order_by_asc(reminder::Column::Id)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn find_reminders(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        reminder_type: ReminderType,
    ) -> Result<Vec<ReminderModel>> {
        Reminder::find()
            .filter(reminder::Column::TenantId.eq(tenant_id))
            .filter(reminder::Column::SubscriptionId.eq(subscription_id))
            .filter(reminder::Column::ReminderType.eq(reminder_type.as_str()))
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self), fields(subscription_id = %new.subscription_id))]
    async fn create_reminder(&self, new: NewReminder) -> Result<ReminderModel> {
        let record = reminder::ActiveModel {
            subscription_id: Set(new.subscription_id),
            tenant_id: Set(new.tenant_id),
            alert_days: Set(new.alert_days),
            reminder_type: Set(new.reminder_type.as_str().to_string()),
            renewal_date: Set(new.renewal_date),
            created_at: Set(new.created_at),
            ..Default::default()
        };
        record.insert(&self.db).await.map_err(Into::into)
    }

    #[instrument(skip(self, record), fields(subscription_id = %record.subscription_id, action = %record.action))]
    async fn append_history(&self, record: NewHistoryRecord) -> Result<HistoryModel> {
        history_entry(record).insert(&self.db).await.map_err(Into::into)
    }

    #[instrument(skip(self, update, record))]
    async fn renew_subscription(
        &self,
        tenant_id: &str,
        subscription_id: &str,
        update: SubscriptionUpdate,
        record: NewHistoryRecord,
    ) -> Result<HistoryModel> {
        // Dropping the transaction on an early return rolls it back
        let txn = self.db.begin().await?;
        apply_update(&txn, tenant_id, subscription_id, update).await?;
        let entry = history_entry(record).insert(&txn).await?;
        txn.commit().await?;
        Ok(entry)
    }

    #[instrument(skip(self))]
    async fn get_history(&self, tenant_id: &str) -> Result<Vec<HistoryModel>> {
        History::find()
            .filter(history::Column::TenantId.eq(tenant_id))
            .order_by_asc(history::Column::Id)
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn find_user_email(&self, tenant_id: &str, full_name: &str) -> Result<Option<String>> {
        let user = TenantUser::find()
            .filter(tenant_user::Column::TenantId.eq(tenant_id))
            .filter(tenant_user::Column::FullName.eq(full_name.trim()))
            .one(&self.db)
            .await?;
        Ok(user.map(|u| u.email))
    }
}

async fn apply_update<C: ConnectionTrait>(
    conn: &C,
    tenant_id: &str,
    subscription_id: &str,
    update: SubscriptionUpdate,
) -> Result<()> {
    let existing = Subscription::find_by_id(subscription_id.to_string())
        .filter(subscription::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await?
        .ok_or_else(|| Error::SubscriptionNotFound {
            id: subscription_id.to_string(),
        })?;

    let mut active_model: subscription::ActiveModel = existing.into();
    if let Some(start_date) = update.start_date {
        active_model.start_date = Set(start_date);
    }
    if let Some(next_renewal) = update.next_renewal {
        active_model.next_renewal = Set(Some(next_renewal));
    }
    active_model.update(conn).await?;
    Ok(())
}

fn history_entry(record: NewHistoryRecord) -> history::ActiveModel {
    history::ActiveModel {
        action: Set(record.action),
        subscription_id: Set(record.subscription_id),
        tenant_id: Set(record.tenant_id),
        timestamp: Set(record.timestamp),
        data: Set(record.data),
        updated_fields: Set(record.updated_fields),
        changed_by: Set(record.changed_by),
        change_reason: Set(record.change_reason),
        ..Default::default()
    }
}
