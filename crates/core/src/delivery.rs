//! Delivery-date computation.
//!
//! All calendar reasoning happens in the bakery's reference timezone: "today"
//! is the local date at `now`, and the lead-time cutoff is the local date of
//! `now + min_lead_hours`. A date is eligible only when it falls strictly
//! after that cutoff date, so an order placed late Tuesday evening with a 24
//! hour lead time cannot be delivered on Wednesday.
//!
//! Searches are linear scans over a bounded window.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::types::Frequency;

/// Days scanned when collecting several delivery dates.
pub const MULTI_DATE_LOOKAHEAD_DAYS: i64 = 60;

/// Days scanned when looking for the single next delivery date.
pub const SINGLE_DATE_LOOKAHEAD_DAYS: i64 = 14;

/// Rules deciding which calendar days are deliverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Weekdays on which the bakery delivers.
    pub allowed_weekdays: BTreeSet<u8>,
    /// Minimum hours between ordering and delivery.
    pub min_lead_hours: u32,
    /// Dates with no delivery regardless of weekday.
    pub blackout_dates: BTreeSet<NaiveDate>,
    /// Reference timezone for "today".
    pub timezone: Tz,
}

impl DeliveryPolicy {
    /// Whether `day` is one of the allowed delivery weekdays.
    #[must_use]
    pub fn allows_weekday(&self, day: Weekday) -> bool {
        self.allowed_weekdays
            .contains(&crate::types::weekday_number(day))
    }

    /// Today's date in the reference timezone.
    #[must_use]
    pub fn local_today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Last local date that is still inside the lead time.
    #[must_use]
    pub fn lead_time_cutoff(&self, now: DateTime<Utc>) -> NaiveDate {
        let earliest = now + Duration::hours(i64::from(self.min_lead_hours));
        earliest.with_timezone(&self.timezone).date_naive()
    }

    /// Whether `date` can be delivered for an order placed at `now`.
    #[must_use]
    pub fn is_deliverable_on(&self, date: NaiveDate, now: DateTime<Utc>) -> bool {
        self.allows_weekday(date.weekday())
            && date > self.lead_time_cutoff(now)
            && !self.blackout_dates.contains(&date)
    }

    fn scan(&self, now: DateTime<Utc>, window_days: i64) -> impl Iterator<Item = NaiveDate> + '_ {
        let today = self.local_today(now);
        (0..window_days)
            .filter_map(move |offset| today.checked_add_signed(Duration::days(offset)))
            .filter(move |date| self.is_deliverable_on(*date, now))
    }
}

/// The next `count` deliverable dates, ascending.
///
/// Returns fewer than `count` dates (possibly none) if the bounded window
/// runs out, and none at all when no weekday is allowed.
#[must_use]
pub fn available_delivery_dates(
    now: DateTime<Utc>,
    policy: &DeliveryPolicy,
    count: usize,
) -> Vec<NaiveDate> {
    if policy.allowed_weekdays.is_empty() || count == 0 {
        return Vec::new();
    }
    policy
        .scan(now, MULTI_DATE_LOOKAHEAD_DAYS)
        .take(count)
        .collect()
}

/// The single next deliverable date within a two-week window.
#[must_use]
pub fn next_delivery_date(now: DateTime<Utc>, policy: &DeliveryPolicy) -> Option<NaiveDate> {
    if policy.allowed_weekdays.is_empty() {
        return None;
    }
    policy.scan(now, SINGLE_DATE_LOOKAHEAD_DAYS).next()
}

/// Whether a customer-chosen `date` is deliverable for an order placed at
/// `now`. Dates past the multi-date lookahead are refused.
#[must_use]
pub fn is_delivery_date_available(
    date: NaiveDate,
    now: DateTime<Utc>,
    policy: &DeliveryPolicy,
) -> bool {
    let horizon = policy.local_today(now) + Duration::days(MULTI_DATE_LOOKAHEAD_DAYS);
    date < horizon && policy.is_deliverable_on(date, now)
}

/// Next local date falling on `weekday`, strictly after today.
///
/// When today already is `weekday`, the result is one full frequency step
/// ahead (7, 14 or 28 days) rather than today.
#[must_use]
pub fn next_occurrence_date(
    weekday: Weekday,
    frequency: Frequency,
    now: DateTime<Utc>,
    timezone: Tz,
) -> NaiveDate {
    let today = now.with_timezone(&timezone).date_naive();
    let ahead = (i64::from(weekday.num_days_from_sunday()) + 7
        - i64::from(today.weekday().num_days_from_sunday()))
        % 7;
    let days = if ahead == 0 {
        frequency.step_days()
    } else {
        ahead
    };
    today + Duration::days(days)
}

/// [`next_occurrence_date`] expressed as the instant of local midnight.
#[must_use]
pub fn next_occurrence_of_weekday(
    weekday: Weekday,
    frequency: Frequency,
    now: DateTime<Utc>,
    timezone: Tz,
) -> DateTime<Utc> {
    let date = next_occurrence_date(weekday, frequency, now, timezone);
    start_of_local_day(date, timezone)
}

/// UTC instant at which `date` begins in `timezone`.
#[must_use]
pub fn start_of_local_day(date: NaiveDate, timezone: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    timezone
        .from_local_datetime(&midnight)
        .earliest()
        .map_or_else(
            // Midnight skipped by a DST jump: fall back to the same wall time in UTC
            || Utc.from_utc_datetime(&midnight),
            |local| local.with_timezone(&Utc),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn policy(weekdays: &[u8], lead: u32, blackout: &[NaiveDate]) -> DeliveryPolicy {
        DeliveryPolicy {
            allowed_weekdays: weekdays.iter().copied().collect(),
            min_lead_hours: lead,
            blackout_dates: blackout.iter().copied().collect(),
            timezone: chrono_tz::America::Los_Angeles,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_wednesday_and_saturday_dates() {
        // Monday 2024-03-04 10:00 in Portland
        let now = utc("2024-03-04T18:00:00Z");
        let dates = available_delivery_dates(now, &policy(&[3, 6], 24, &[]), 3);
        assert_eq!(dates, vec![date(2024, 3, 6), date(2024, 3, 9), date(2024, 3, 13)]);
    }

    #[test]
    fn test_lead_time_compares_calendar_days_in_reference_zone() {
        // Tuesday 2024-03-05 20:00 Portland = Wednesday 04:00 UTC.
        // now + 24h is Wednesday evening locally, so Wednesday is not eligible.
        let now = utc("2024-03-06T04:00:00Z");
        let next = next_delivery_date(now, &policy(&[3, 6], 24, &[])).unwrap();
        assert_eq!(next, date(2024, 3, 9));
    }

    #[test]
    fn test_cutoff_day_itself_is_excluded() {
        // Monday 09:00 Portland, 48h lead lands on Wednesday: Wednesday is out.
        let now = utc("2024-03-04T17:00:00Z");
        let next = next_delivery_date(now, &policy(&[3], 48, &[])).unwrap();
        assert_eq!(next, date(2024, 3, 13));
    }

    #[test]
    fn test_blackout_dates_skipped() {
        let now = utc("2024-03-04T18:00:00Z");
        let dates =
            available_delivery_dates(now, &policy(&[3, 6], 24, &[date(2024, 3, 9)]), 2);
        assert_eq!(dates, vec![date(2024, 3, 6), date(2024, 3, 13)]);
    }

    #[test]
    fn test_empty_weekdays_return_nothing() {
        let now = utc("2024-03-04T18:00:00Z");
        assert!(available_delivery_dates(now, &policy(&[], 24, &[]), 3).is_empty());
        assert_eq!(next_delivery_date(now, &policy(&[], 24, &[])), None);
    }

    #[test]
    fn test_single_date_window_is_bounded() {
        // Only Wednesday allowed but the next three Wednesdays are blacked out
        let now = utc("2024-03-04T18:00:00Z");
        let blocked = [date(2024, 3, 6), date(2024, 3, 13), date(2024, 3, 20)];
        assert_eq!(next_delivery_date(now, &policy(&[3], 24, &blocked)), None);
        // The wider multi-date scan still finds later ones
        let dates = available_delivery_dates(now, &policy(&[3], 24, &blocked), 1);
        assert_eq!(dates, vec![date(2024, 3, 27)]);
    }

    #[test]
    fn test_is_delivery_date_available() {
        let now = utc("2024-03-04T18:00:00Z");
        let p = policy(&[3, 6], 24, &[date(2024, 3, 9)]);
        assert!(is_delivery_date_available(date(2024, 3, 6), now, &p));
        // Thursday
        assert!(!is_delivery_date_available(date(2024, 3, 7), now, &p));
        // Blackout
        assert!(!is_delivery_date_available(date(2024, 3, 9), now, &p));
        // In the past
        assert!(!is_delivery_date_available(date(2024, 2, 28), now, &p));
        // Too far out
        assert!(!is_delivery_date_available(date(2024, 9, 4), now, &p));
    }

    #[test]
    fn test_returned_dates_satisfy_every_rule() {
        let blackout = [date(2024, 11, 28), date(2024, 12, 25)];
        let weekday_sets: [&[u8]; 4] = [&[0], &[3, 6], &[1, 2, 3, 4, 5], &[0, 1, 2, 3, 4, 5, 6]];
        let start = utc("2024-11-01T00:00:00Z");

        for weekdays in weekday_sets {
            for lead in [0, 12, 24, 36, 72] {
                let p = policy(weekdays, lead, &blackout);
                // Every 5 hours across two months, crossing the DST change
                for step in 0..300 {
                    let now = start + Duration::hours(step * 5);
                    let dates = available_delivery_dates(now, &p, 3);
                    assert_eq!(dates.len(), 3);
                    let cutoff = (now + Duration::hours(i64::from(lead)))
                        .with_timezone(&p.timezone)
                        .date_naive();
                    for d in &dates {
                        assert!(p.allows_weekday(d.weekday()));
                        assert!(*d > cutoff);
                        assert!(!blackout.contains(d));
                    }
                    assert!(dates.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }
    }

    #[test]
    fn test_next_occurrence_skips_today() {
        // Wednesday 2024-03-06 10:00 Portland
        let now = utc("2024-03-06T18:00:00Z");
        let tz = chrono_tz::America::Los_Angeles;
        assert_eq!(
            next_occurrence_date(Weekday::Wed, Frequency::Weekly, now, tz),
            date(2024, 3, 13)
        );
        assert_eq!(
            next_occurrence_date(Weekday::Wed, Frequency::BiWeekly, now, tz),
            date(2024, 3, 20)
        );
        assert_eq!(
            next_occurrence_date(Weekday::Wed, Frequency::EveryFourWeeks, now, tz),
            date(2024, 4, 3)
        );
        assert_eq!(
            next_occurrence_date(Weekday::Sat, Frequency::BiWeekly, now, tz),
            date(2024, 3, 9)
        );
    }

    #[test]
    fn test_next_occurrence_uses_reference_zone_for_today() {
        // Thursday 03:00 UTC is still Wednesday evening in Portland
        let now = utc("2024-03-07T03:00:00Z");
        let tz = chrono_tz::America::Los_Angeles;
        assert_eq!(
            next_occurrence_date(Weekday::Thu, Frequency::Weekly, now, tz),
            date(2024, 3, 7)
        );
    }

    #[test]
    fn test_next_occurrence_instant_is_local_midnight() {
        let now = utc("2024-03-04T18:00:00Z");
        let tz = chrono_tz::America::Los_Angeles;
        let instant = next_occurrence_of_weekday(Weekday::Wed, Frequency::Weekly, now, tz);
        // PST is UTC-8
        assert_eq!(instant, utc("2024-03-06T08:00:00Z"));
    }
}
