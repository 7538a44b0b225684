//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod history;
pub mod reminder;
pub mod subscription;
pub mod tenant_user;

// Re-export specific types to avoid conflicts
pub use history::{Column as HistoryColumn, Entity as History, Model as HistoryModel};
pub use reminder::{Column as ReminderColumn, Entity as Reminder, Model as ReminderModel};
pub use subscription::{
    Column as SubscriptionColumn, Entity as Subscription, Model as SubscriptionModel,
};
pub use tenant_user::{
    Column as TenantUserColumn, Entity as TenantUser, Model as TenantUserModel,
};
