//! Domain vocabulary shared by the entities and the engine.
//!
//! Stored documents keep these values as plain strings (legacy records are not
//! guaranteed to be well-formed), so each enum parses leniently from its stored form
//! and renders back to the exact string the rest of the application expects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How often a subscription is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    /// Billed every month
    Monthly,
    /// Billed every three months
    Quarterly,
    /// Billed every year
    Yearly,
    /// Billed every week
    Weekly,
    /// Thirty-day trial period
    Trial,
}

impl BillingCycle {
    /// All cycles, in display order.
    pub const ALL: [Self; 5] = [
        Self::Monthly,
        Self::Quarterly,
        Self::Yearly,
        Self::Weekly,
        Self::Trial,
    ];

    /// Parses a stored cycle. Unknown or empty values fall back to monthly.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quarterly" => Self::Quarterly,
            "yearly" | "annual" | "annually" => Self::Yearly,
            "weekly" => Self::Weekly,
            "trial" => Self::Trial,
            _ => Self::Monthly,
        }
    }

    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Weekly => "weekly",
            Self::Trial => "trial",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many reminders precede a renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderPolicy {
    /// A single reminder `reminder_days` before renewal
    #[serde(rename = "One time")]
    OneTime,
    /// Reminders at `reminder_days` and at half of it
    #[serde(rename = "Two times")]
    TwoTimes,
    /// A reminder every day from `reminder_days` out until the renewal day
    #[serde(rename = "Until Renewal")]
    UntilRenewal,
}

impl ReminderPolicy {
    /// Parses a stored policy; returns `None` for anything unrecognised.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "onetime" => Some(Self::OneTime),
            "twotimes" => Some(Self::TwoTimes),
            "untilrenewal" => Some(Self::UntilRenewal),
            _ => None,
        }
    }

    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneTime => "One time",
            Self::TwoTimes => "Two times",
            Self::UntilRenewal => "Until Renewal",
        }
    }

    /// Reminder type recorded when this policy fires.
    #[must_use]
    pub const fn reminder_type(self) -> ReminderType {
        match self {
            Self::OneTime => ReminderType::OneTime,
            Self::TwoTimes => ReminderType::TwoTimesIndividual,
            Self::UntilRenewal => ReminderType::UntilRenewalDaily,
        }
    }
}

impl fmt::Display for ReminderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminates reminder records so each firing path has its own idempotence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    /// "One time" policy reminder
    OneTime,
    /// "Two times" policy reminder
    TwoTimesIndividual,
    /// Yearly-cycle individual reminder
    YearlyIndividual,
    /// Monthly batch digest
    MonthlyRecurring,
    /// "Until Renewal" daily reminder
    UntilRenewalDaily,
}

impl ReminderType {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::TwoTimesIndividual => "two_times_individual",
            Self::YearlyIndividual => "yearly_individual",
            Self::MonthlyRecurring => "monthly_recurring",
            Self::UntilRenewalDaily => "until_renewal_daily",
        }
    }
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// Live subscription
    Active,
    /// Cancelled by the user; kept for history
    Cancelled,
    /// Not yet confirmed
    Draft,
}

impl SubscriptionStatus {
    /// Parses a stored status. Anything unrecognised is treated as a draft so it never
    /// receives reminders.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Draft,
        }
    }

    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Cancelled => "Cancelled",
            Self::Draft => "Draft",
        }
    }
}
