//! Server-side price calculation. Inputs always come from the database, never
//! from the client, so a tampered request cannot change what is charged.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Month/day pairs, year-independent.
const PUBLIC_HOLIDAYS: [(u32, u32); 3] = [
    (1, 1),   // New Year's Day
    (5, 1),   // Workers' Day
    (12, 25), // Christmas
];

const NEW_RELEASE_WINDOW_DAYS: i64 = 7;
const NEW_RELEASE_PREMIUM: f64 = 0.20;
const HOLIDAY_PREMIUM: f64 = 0.15;

/// Per-ticket price: base plus a 20% new-release premium plus a 15% holiday
/// premium. Both premiums apply to the base price independently, they do not
/// compound.
pub fn calculate_price(base_price: f64, show_time: DateTime<Utc>, is_new_release: bool) -> f64 {
    let mut final_price = base_price;

    if is_new_release {
        final_price += base_price * NEW_RELEASE_PREMIUM;
    }

    if is_public_holiday(show_time.date_naive()) {
        final_price += base_price * HOLIDAY_PREMIUM;
    }

    final_price
}

/// A movie counts as a new release while its release date is within the last
/// seven days of `now`.
pub fn is_new_release(release_date: NaiveDate, now: DateTime<Utc>) -> bool {
    release_date >= (now - Duration::days(NEW_RELEASE_WINDOW_DAYS)).date_naive()
}

fn is_public_holiday(date: NaiveDate) -> bool {
    PUBLIC_HOLIDAYS
        .iter()
        .any(|&(month, day)| date.month() == month && date.day() == day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 18, 30, 0).unwrap()
    }

    #[test]
    fn base_price_unchanged_on_regular_day() {
        assert_eq!(calculate_price(100.0, at(2026, 3, 14), false), 100.0);
    }

    #[test]
    fn new_release_adds_twenty_percent() {
        assert_eq!(calculate_price(100.0, at(2026, 3, 14), true), 120.0);
    }

    #[test]
    fn holiday_adds_fifteen_percent() {
        assert_eq!(calculate_price(100.0, at(2026, 12, 25), false), 115.0);
        assert_eq!(calculate_price(100.0, at(2026, 1, 1), false), 115.0);
        assert_eq!(calculate_price(100.0, at(2026, 5, 1), false), 115.0);
    }

    #[test]
    fn premiums_are_additive_not_compounding() {
        // 100 + 20 + 15, not 100 * 1.2 * 1.15
        assert_eq!(calculate_price(100.0, at(2026, 12, 25), true), 135.0);
    }

    #[test]
    fn holiday_match_ignores_year() {
        assert_eq!(calculate_price(100.0, at(1999, 5, 1), false), 115.0);
    }

    #[test]
    fn release_window_boundaries() {
        let now = at(2026, 8, 28);
        assert!(is_new_release(NaiveDate::from_ymd_opt(2026, 8, 28).unwrap(), now));
        assert!(is_new_release(NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(), now));
        assert!(!is_new_release(NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(), now));
    }

    proptest! {
        #[test]
        fn price_is_bounded_by_premiums(
            base in 1.0f64..10_000.0,
            month in 1u32..=12,
            day in 1u32..=28,
            new_release: bool,
        ) {
            let price = calculate_price(base, at(2026, month, day), new_release);
            prop_assert!(price >= base);
            prop_assert!(price <= base * (1.0 + NEW_RELEASE_PREMIUM + HOLIDAY_PREMIUM) + 1e-9);
        }

        #[test]
        fn no_premium_means_exact_base(base in 1.0f64..10_000.0) {
            // March has no public holidays
            prop_assert_eq!(calculate_price(base, at(2026, 3, 10), false), base);
        }
    }
}
