use thiserror::Error;

/// Errors produced inside the engine. Public `RenewalEngine` entry points never
/// return these directly; they are folded into an `EngineResponse`.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong
        message: String,
    },

    /// Any failure reported by the database layer
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// An update targeted a subscription that does not exist for the tenant
    #[error("Subscription not found: {id}")]
    SubscriptionNotFound {
        /// Subscription id that was looked up
        id: String,
    },

    /// Date arithmetic left chrono's supported range
    #[error("Date out of range while computing billing period from {date}")]
    DateOutOfRange {
        /// Date the computation started from
        date: chrono::NaiveDate,
    },

    /// A tenant's processing exceeded the configured time budget
    #[error("Tenant {tenant_id} timed out after {seconds}s")]
    TenantTimeout {
        /// Tenant that was being processed
        tenant_id: String,
        /// Configured timeout
        seconds: u64,
    },

    /// Cron scheduler setup failed
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
