//! Reminder entity - Append-only log of reminders that were actually delivered.
//!
//! A row here is the only durable state that stops a reminder from being sent twice on
//! the same day; rows are never updated or deleted by the engine.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Reminder record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reminders")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Subscription the reminder was about
    pub subscription_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Configured reminder lead time at the moment of firing
    pub alert_days: i32,
    /// One of the `ReminderType` string forms
    pub reminder_type: String,
    /// Renewal date the reminder announced
    pub renewal_date: Option<Date>,
    /// When the reminder was sent
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Reminder and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each reminder belongs to one subscription
    #[sea_orm(
        belongs_to = "super::subscription::Entity",
        from = "Column::SubscriptionId",
        to = "super::subscription::Column::Id"
    )]
    Subscription,
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
