//! Tenant user entity - The per-tenant user directory used to resolve owner emails.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tenant user database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenant_users")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning tenant
    pub tenant_id: String,
    /// Display name as shown in the owner field of subscriptions
    pub full_name: String,
    /// Contact email
    pub email: String,
}

/// `TenantUser` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
