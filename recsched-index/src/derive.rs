//! Derived-fact computation: reservation requirements, effective date
//! ranges, and explicit-date day labels.
//!
//! These are the raw computations; the index precomputes them at build time
//! and the public reference API reads the cached results.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;

use crate::refs::{ActivityRef, ScheduleRef, TimeRangeRef};

/// Guess whether an activity needs a reservation.
///
/// Returns `(required, definite)`. The first matching rule wins:
/// an explicit marker on the activity itself is authoritative; otherwise the
/// sibling activities in the schedule group and the group's reservation
/// links disambiguate.
pub(crate) fn reservation_requirement(act: &ActivityRef) -> (bool, bool) {
    if let Some(explicit) = act.reservation() {
        return (explicit, true);
    }

    let grp = act.schedule_group();
    let has_link = grp.reservation_links().next().is_some();

    let mut explicit_yes = false;
    let mut explicit_no = false;
    for sibling in grp.activities() {
        match sibling.reservation() {
            Some(true) => explicit_yes = true,
            Some(false) => explicit_no = true,
            None => {}
        }
        if explicit_yes && explicit_no {
            break;
        }
    }

    match (explicit_yes, explicit_no) {
        // nothing marked: assume a reservation is needed iff there is a link
        (false, false) => (has_link, false),
        // both marked but not us: ambiguous, assume needed
        (true, true) => (true, false),
        // only the no-reservation ones are marked: we need one, certainly so
        // if there is a link to make it
        (false, true) => (true, has_link),
        // only the reservation-needing ones are marked: we probably don't
        (true, false) => (false, false),
    }
}

/// Resolve a schedule's partial date range into concrete inclusive bounds.
///
/// Missing components are filled in: the `from` year comes from the facility
/// scrape date (fallback: the index update time), the `from` day defaults to
/// the 1st, the `to` month inherits the `from` month, the inherited `to`
/// year rolls forward by one when the resolved `to` month precedes the
/// `from` month, and a missing `to` day means the last day of its month.
/// A missing `from` month, an unresolvable year, an invalid date, or a
/// reversed range all yield `None`.
pub(crate) fn effective_date_range(sched: &ScheduleRef) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let tz = sched.index().timezone();
    let range = sched.date_range()?;

    let from_month = range.from.month?;

    let reference = sched
        .facility()
        .source_date()
        .or_else(|| sched.index().updated())
        .map(|d| d.with_timezone(&tz));

    let from_year = match range.from.year {
        Some(y) => y,
        None => reference?.year(),
    };
    let from_day = range.from.day.unwrap_or(1);
    let from_date = NaiveDate::from_ymd_opt(from_year, from_month, from_day)?;

    let to_month = range.to.month.unwrap_or(from_month);
    let to_year = match range.to.year {
        Some(y) => y,
        None => {
            // inherited year: a "Nov to Feb" style range crosses new year
            if to_month < from_month {
                from_year + 1
            } else {
                from_year
            }
        }
    };
    let to_date = match range.to.day {
        Some(d) => NaiveDate::from_ymd_opt(to_year, to_month, d)?,
        None => last_day_of_month(to_year, to_month)?,
    };

    let from = local_midnight(tz, from_date)?;
    let to = local_midnight(tz, to_date.succ_opt()?)? - Duration::nanoseconds(1);
    if from > to {
        return None;
    }
    Some((from, to))
}

/// Resolve a time range's day label when it names an explicit date.
///
/// Day labels are usually weekday names, but schedules with one-off columns
/// carry dates like `"December 25"`. The year comes from the schedule's
/// effective date range: whichever bounding year puts the date inside the
/// range, preferring the start year.
pub(crate) fn single_date(tm: &TimeRangeRef) -> Option<NaiveDate> {
    let sched = tm.schedule();
    let label = sched.day(tm.day_index());
    let (month, day) = parse_month_day(label)?;
    let (from, to) = sched.effective_date_range()?;

    let candidate = NaiveDate::from_ymd_opt(from.year(), month, day)?;
    if candidate >= from.date_naive() && candidate <= to.date_naive() {
        return Some(candidate);
    }
    if to.year() != from.year() {
        let alt = NaiveDate::from_ymd_opt(to.year(), month, day)?;
        if alt >= from.date_naive() && alt <= to.date_naive() {
            return Some(alt);
        }
    }
    Some(candidate)
}

/// Parse `"December 25"` / `"Dec 25"` / `"dec. 25"` into `(month, day)`.
fn parse_month_day(label: &str) -> Option<(u32, u32)> {
    let mut words = label.split_whitespace();
    let month_word = words.next()?;
    let day_word = words.next()?;
    if words.next().is_some() {
        return None;
    }

    let month = month_number(month_word.trim_end_matches('.'))?;
    let day: u32 = day_word
        .trim_end_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .ok()?;
    if !(1..=31).contains(&day) {
        return None;
    }
    Some((month, day))
}

fn month_number(word: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lower = word.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| lower == *m || (lower.len() == 3 && m.starts_with(&lower)))
        .map(|i| i as u32 + 1)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }?;
    first_of_next.pred_opt()
}

/// Midnight at the start of `date` in `tz`. Toronto never skips midnight,
/// but ambiguous local times resolve to the earlier instant.
fn local_midnight(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_number() {
        assert_eq!(month_number("December"), Some(12));
        assert_eq!(month_number("dec"), Some(12));
        assert_eq!(month_number("May"), Some(5));
        assert_eq!(month_number("mar"), Some(3));
        assert_eq!(month_number("Monday"), None);
        assert_eq!(month_number(""), None);
    }

    #[test]
    fn test_parse_month_day() {
        assert_eq!(parse_month_day("December 25"), Some((12, 25)));
        assert_eq!(parse_month_day("Dec. 25"), Some((12, 25)));
        assert_eq!(parse_month_day("dec 1st"), Some((12, 1)));
        assert_eq!(parse_month_day("Monday"), None);
        assert_eq!(parse_month_day("December 25 2024"), None);
        assert_eq!(parse_month_day("December 40"), None);
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 2),
            NaiveDate::from_ymd_opt(2025, 2, 28)
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
    }
}
