//! History entity - Append-only audit trail of subscription mutations.
//!
//! `data` holds the full pre-change snapshot; `updated_fields` only the keys that
//! changed, both as JSON objects keyed the way the document store names fields.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// History record database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "history")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// What happened, e.g. `"Renewed"`, `"Created"`, `"Owner Changed"`
    pub action: String,
    /// Subscription the record is about
    pub subscription_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// When the change happened
    pub timestamp: DateTimeUtc,
    /// Snapshot of the subscription before the change
    pub data: Json,
    /// Only the changed fields, with their new values
    pub updated_fields: Json,
    /// Actor responsible for the change
    pub changed_by: String,
    /// Free-text reason
    pub change_reason: Option<String>,
}

/// Defines relationships between History and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each history record belongs to one subscription
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
