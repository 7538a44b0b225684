//! Subscription entity - A tenant's recurring service contract.
//!
//! Money fields are kept as strings exactly as the document store holds them; callers
//! coerce them to decimals when they need numbers. Cycle, policy and status are also
//! strings so legacy documents with odd values still load.

use crate::models::{BillingCycle, ReminderPolicy, SubscriptionStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subscription database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Document id
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Display name of the subscribed service
    pub service_name: String,
    /// Vendor supplying the service
    pub vendor: String,
    /// Amount per billing period, as a decimal string
    pub amount: String,
    /// Quantity (legacy, may be missing or malformed)
    pub qty: Option<String>,
    /// Total amount (legacy)
    pub total_amount: Option<String>,
    /// Amount in local currency (legacy)
    pub lcy_amount: Option<String>,
    /// ISO currency code
    pub currency: Option<String>,
    /// `"monthly"`, `"quarterly"`, `"yearly"`, `"weekly"` or `"trial"`
    pub billing_cycle: String,
    /// First day of the current billing period
    pub start_date: Date,
    /// Date of the next payment
    pub next_renewal: Option<Date>,
    /// Whether the engine advances the billing period automatically
    pub auto_renewal: bool,
    /// `"One time"`, `"Two times"` or `"Until Renewal"`
    pub reminder_policy: Option<String>,
    /// Days before renewal that reminders start
    pub reminder_days: i32,
    /// Soft on/off switch independent of status
    pub is_active: bool,
    /// `"Active"`, `"Cancelled"` or `"Draft"`
    pub status: String,
    /// Owner display name, resolved against the tenant's user directory
    pub owner: Option<String>,
    /// Owner email when stored directly on the subscription
    pub owner_email: Option<String>,
}

impl Model {
    /// Parsed billing cycle (unknown values behave as monthly).
    #[must_use]
    pub fn cycle(&self) -> BillingCycle {
        BillingCycle::parse_lenient(&self.billing_cycle)
    }

    /// Parsed reminder policy. Missing or unrecognised policies behave as "One time".
    #[must_use]
    pub fn policy(&self) -> ReminderPolicy {
        self.reminder_policy
            .as_deref()
            .and_then(ReminderPolicy::parse)
            .unwrap_or(ReminderPolicy::OneTime)
    }

    /// Parsed status.
    #[must_use]
    pub fn lifecycle_status(&self) -> SubscriptionStatus {
        SubscriptionStatus::parse_lenient(&self.status)
    }

    /// True when the subscription should receive reminders.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_active && self.lifecycle_status() == SubscriptionStatus::Active
    }
}

/// Defines relationships between Subscription and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One subscription has many reminder records
    #[sea_orm(has_many = "super::reminder::Entity")]
    Reminders,
    /// One subscription has many history records
    #[sea_orm(has_many = "super::history::Entity")]
    History,
}

impl Related<super::reminder::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reminders.def()
    }
}

impl Related<super::history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::History.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
