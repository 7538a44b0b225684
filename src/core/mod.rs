//! Core business logic - framework-agnostic renewal, reminder and notification operations.
//!
//! Everything here talks to storage and email through the [`crate::store::SubscriptionStore`]
//! and [`crate::email::EmailSender`] ports, so it runs the same against `SQLite` in
//! production and against in-memory doubles in tests.

pub mod date_math;
pub mod engine;
pub mod notifications;
pub mod reminders;
pub mod renewal;
pub mod tenants;
