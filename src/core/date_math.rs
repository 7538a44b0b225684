//! Calendar arithmetic for billing periods and reminder schedules.
//!
//! Billing periods are inclusive of both their first and last day: a monthly period
//! starting on Jan 1 ends on Jan 31. All functions here are pure.

use crate::models::{BillingCycle, ReminderPolicy};
use chrono::{Datelike, Days, Months, NaiveDate};
use std::collections::BTreeSet;

/// Returns the last day of the billing period that starts on `date`.
///
/// Month arithmetic clamps to the end of the target month (Jan 31 + 1 month is
/// Feb 28/29) before the inclusive-end day is subtracted. Returns `None` only when the
/// result would leave chrono's supported date range.
#[must_use]
pub fn add_billing_period(date: NaiveDate, cycle: BillingCycle) -> Option<NaiveDate> {
    match cycle {
        BillingCycle::Monthly => add_months_inclusive(date, 1),
        BillingCycle::Quarterly => add_months_inclusive(date, 3),
        BillingCycle::Yearly => add_months_inclusive(date, 12),
        BillingCycle::Weekly => date.checked_add_days(Days::new(6)),
        BillingCycle::Trial => date.checked_add_days(Days::new(30)),
    }
}

fn add_months_inclusive(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))?.pred_opt()
}

/// `renewal_date - days`, or `None` when `days` is not positive.
#[must_use]
pub fn days_before(renewal_date: NaiveDate, days: i32) -> Option<NaiveDate> {
    let days = u64::try_from(days).ok().filter(|d| *d > 0)?;
    renewal_date.checked_sub_days(Days::new(days))
}

/// Computes the dates on which a reminder should fire for one renewal.
///
/// Only dates on or after `today` are returned. An absent renewal date or a
/// non-positive `reminder_days` yields an empty set.
#[must_use]
pub fn reminder_trigger_dates(
    policy: ReminderPolicy,
    reminder_days: i32,
    renewal_date: Option<NaiveDate>,
    today: NaiveDate,
) -> BTreeSet<NaiveDate> {
    let Some(renewal_date) = renewal_date else {
        return BTreeSet::new();
    };
    let Some(first) = days_before(renewal_date, reminder_days) else {
        return BTreeSet::new();
    };

    match policy {
        ReminderPolicy::OneTime => std::iter::once(first).filter(|d| *d >= today).collect(),
        ReminderPolicy::TwoTimes => {
            // floor(days/2) is 0 for a one-day lead time, which lands on the renewal day.
            let second = renewal_date
                .checked_sub_days(Days::new(u64::from(reminder_days.unsigned_abs() / 2)))
                .unwrap_or(renewal_date);

            let kept: BTreeSet<NaiveDate> = [first, second]
                .into_iter()
                .filter(|d| *d <= renewal_date && *d >= today)
                .collect();

            if kept.is_empty() {
                std::iter::once(first).filter(|d| *d >= today).collect()
            } else {
                kept
            }
        }
        ReminderPolicy::UntilRenewal => first
            .iter_days()
            .take_while(|d| *d <= renewal_date)
            .filter(|d| *d >= today)
            .collect(),
    }
}

/// Compares only the year, month and day of two calendar values.
#[must_use]
pub fn is_same_calendar_day<A, B>(a: &A, b: &B) -> bool
where
    A: Datelike,
    B: Datelike,
{
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_add_billing_period_per_cycle() {
        let start = date(2025, 1, 1);
        assert_eq!(
            add_billing_period(start, BillingCycle::Monthly),
            Some(date(2025, 1, 31))
        );
        assert_eq!(
            add_billing_period(start, BillingCycle::Quarterly),
            Some(date(2025, 3, 31))
        );
        assert_eq!(
            add_billing_period(start, BillingCycle::Yearly),
            Some(date(2025, 12, 31))
        );
        assert_eq!(
            add_billing_period(start, BillingCycle::Weekly),
            Some(date(2025, 1, 7))
        );
        assert_eq!(
            add_billing_period(start, BillingCycle::Trial),
            Some(date(2025, 1, 31))
        );
    }

    #[test]
    fn test_monthly_period_from_february_first_ends_last_day_of_february() {
        assert_eq!(
            add_billing_period(date(2025, 2, 1), BillingCycle::Monthly),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            add_billing_period(date(2024, 2, 1), BillingCycle::Monthly),
            Some(date(2024, 2, 29))
        );
    }

    #[test]
    fn test_month_end_start_clamps_before_subtracting() {
        // Jan 31 + 1 month clamps to Feb 28, so the period ends Feb 27.
        assert_eq!(
            add_billing_period(date(2025, 1, 31), BillingCycle::Monthly),
            Some(date(2025, 2, 27))
        );
    }

    #[test]
    fn test_period_end_is_strictly_after_start_for_every_cycle() {
        let mut day = date(2024, 1, 1);
        while day <= date(2025, 12, 31) {
            for cycle in BillingCycle::ALL {
                let end = add_billing_period(day, cycle).unwrap();
                assert!(end > day, "{cycle} from {day} produced {end}");
            }
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_one_time_trigger() {
        let renewal = date(2025, 3, 10);
        let dates = reminder_trigger_dates(ReminderPolicy::OneTime, 7, Some(renewal), date(2025, 3, 1));
        assert_eq!(dates.into_iter().collect::<Vec<_>>(), vec![date(2025, 3, 3)]);

        let passed =
            reminder_trigger_dates(ReminderPolicy::OneTime, 7, Some(renewal), date(2025, 3, 4));
        assert!(passed.is_empty());
    }

    #[test]
    fn test_two_times_trigger_both_dates() {
        let renewal = date(2025, 3, 20);
        let dates =
            reminder_trigger_dates(ReminderPolicy::TwoTimes, 10, Some(renewal), date(2025, 3, 1));
        assert_eq!(
            dates.into_iter().collect::<Vec<_>>(),
            vec![date(2025, 3, 10), date(2025, 3, 15)]
        );
    }

    #[test]
    fn test_two_times_drops_past_first_date() {
        let renewal = date(2025, 3, 20);
        let dates =
            reminder_trigger_dates(ReminderPolicy::TwoTimes, 10, Some(renewal), date(2025, 3, 12));
        assert_eq!(dates.into_iter().collect::<Vec<_>>(), vec![date(2025, 3, 15)]);
    }

    #[test]
    fn test_two_times_after_renewal_excludes_past_dates() {
        let renewal = date(2025, 3, 20);
        let today = renewal.succ_opt().unwrap();
        let dates = reminder_trigger_dates(ReminderPolicy::TwoTimes, 10, Some(renewal), today);
        assert!(dates.iter().all(|d| *d >= today));
        assert!(dates.is_empty());
    }

    #[test]
    fn test_two_times_single_day_lead_collapses() {
        let renewal = date(2025, 3, 20);
        let dates =
            reminder_trigger_dates(ReminderPolicy::TwoTimes, 1, Some(renewal), date(2025, 3, 1));
        assert_eq!(
            dates.into_iter().collect::<Vec<_>>(),
            vec![date(2025, 3, 19), date(2025, 3, 20)]
        );
    }

    #[test]
    fn test_until_renewal_daily_window() {
        let renewal = date(2025, 3, 20);
        let dates = reminder_trigger_dates(
            ReminderPolicy::UntilRenewal,
            3,
            Some(renewal),
            date(2025, 3, 18),
        );
        assert_eq!(
            dates.into_iter().collect::<Vec<_>>(),
            vec![date(2025, 3, 18), date(2025, 3, 19), date(2025, 3, 20)]
        );
    }

    #[test]
    fn test_no_triggers_without_renewal_or_days() {
        let today = date(2025, 3, 1);
        assert!(reminder_trigger_dates(ReminderPolicy::OneTime, 7, None, today).is_empty());
        assert!(
            reminder_trigger_dates(ReminderPolicy::UntilRenewal, 0, Some(date(2025, 3, 5)), today)
                .is_empty()
        );
        assert!(
            reminder_trigger_dates(ReminderPolicy::TwoTimes, -3, Some(date(2025, 3, 5)), today)
                .is_empty()
        );
    }

    #[test]
    fn test_is_same_calendar_day_ignores_time() {
        let morning = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 1).unwrap();
        let night = Utc.with_ymd_and_hms(2025, 2, 1, 23, 59, 59).unwrap();
        assert!(is_same_calendar_day(&morning, &night));
        assert!(is_same_calendar_day(&morning, &date(2025, 2, 1)));
        assert!(!is_same_calendar_day(&morning, &date(2025, 2, 2)));
    }
}
