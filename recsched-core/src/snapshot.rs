//! The scraped-snapshot data model.
//!
//! One snapshot is the full tree of facilities scraped at one point in time:
//! facility → schedule group → schedule → activity → time range. The canonical
//! wire form is the postcard encoding of [`Snapshot`]; the cache stores that
//! payload verbatim under the `pb` format label and parses it only to extract
//! metadata and to build indexes.
//!
//! Fields produced downstream by the scraper's own parsing (names, dates,
//! clock ranges, weekdays) are optional: absence means "unknown" and is never
//! an error.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Root of one scraped snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Attribution lines for the dataset.
    pub attribution: Vec<String>,
    /// All scraped facilities.
    pub facilities: Vec<Facility>,
}

/// One recreation facility page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub name: String,
    pub description: String,
    /// Source page URL.
    pub source_url: String,
    /// When the page was scraped, unix seconds.
    pub source_date: Option<i64>,
    pub address: String,
    /// Geocoded position, if geocoding succeeded.
    pub lnglat: Option<(f32, f32)>,
    pub notifications_html: String,
    pub special_hours_html: String,
    /// Errors encountered while scraping this facility.
    pub errors: Vec<String>,
    pub schedule_groups: Vec<ScheduleGroup>,
}

/// A group of schedules sharing a heading and reservation links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleGroup {
    pub label: String,
    /// Normalized title derived from the label.
    pub title: Option<String>,
    pub reservation_links: Vec<ReservationLink>,
    pub schedule_changes_html: String,
    pub schedules: Vec<Schedule>,
}

/// A reservation link attached to a schedule group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationLink {
    pub label: String,
    pub url: String,
}

/// One schedule table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub caption: String,
    /// Normalized name derived from the caption.
    pub name: Option<String>,
    /// Raw date text derived from the caption.
    pub date: Option<String>,
    /// Parsed (possibly partial) date range derived from the caption.
    pub date_range: Option<PartialDateRange>,
    /// Column day labels (weekday names or explicit dates).
    pub days: Vec<String>,
    pub activities: Vec<Activity>,
}

/// One activity row within a schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub label: String,
    /// Normalized name derived from the label.
    pub name: Option<String>,
    /// Explicit reservation-required marker parsed from the label, if any.
    pub reservation: Option<bool>,
    /// Per-day cells, parallel to `Schedule::days`.
    pub days: Vec<DayTimes>,
}

/// The time ranges in one day cell of an activity row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayTimes {
    pub times: Vec<TimeRange>,
}

/// One time range within a day cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub label: String,
    /// Parsed weekday, 0 = Sunday .. 6 = Saturday.
    pub weekday: Option<u8>,
    /// Parsed clock range.
    pub clock: Option<ClockRange>,
}

/// Minutes since local midnight. Ends may exceed 24h for past-midnight
/// ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub minutes: u16,
}

impl ClockTime {
    /// Render as `HH:MM` (wrapping past-midnight hours).
    pub fn format(self) -> String {
        format!("{:02}:{:02}", (self.minutes / 60) % 24, self.minutes % 60)
    }
}

/// A parsed clock range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockRange {
    pub start: ClockTime,
    /// Exclusive end.
    pub end: ClockTime,
}

impl ClockRange {
    /// True if the two ranges overlap, treating ends before starts as
    /// past-midnight.
    pub fn overlaps(self, other: ClockRange) -> bool {
        let norm = |r: ClockRange| {
            let end = if r.end.minutes < r.start.minutes {
                r.end.minutes as u32 + 24 * 60
            } else {
                r.end.minutes as u32
            };
            (r.start.minutes as u32, end)
        };
        let (a0, a1) = norm(self);
        let (b0, b1) = norm(other);
        a0 < b1 && b0 < a1
    }
}

/// A calendar date with possibly-unknown components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDate {
    pub year: Option<i32>,
    /// 1-based month.
    pub month: Option<u32>,
    /// 1-based day of month.
    pub day: Option<u32>,
}

/// A possibly-partial date range parsed from a schedule caption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDateRange {
    pub from: PartialDate,
    pub to: PartialDate,
}

impl Snapshot {
    /// Decode the canonical binary payload.
    pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
        postcard::from_bytes(bytes).map_err(|e| Error::decode(format!("snapshot payload: {e}")))
    }

    /// Encode to the canonical binary payload.
    pub fn encode(&self) -> Vec<u8> {
        // postcard serialization of plain structs cannot fail
        postcard::to_allocvec(self).expect("snapshot encoding is infallible")
    }

    /// The dataset update time: the most recent facility scrape date, if any
    /// facility carries one.
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.facilities
            .iter()
            .filter_map(|f| f.source_date)
            .max()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Counts of facilities with and without a scrape date.
    pub fn source_date_counts(&self) -> (usize, usize) {
        let with = self
            .facilities
            .iter()
            .filter(|f| f.source_date.is_some())
            .count();
        (with, self.facilities.len() - with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot {
            attribution: vec!["data: city open data".into()],
            facilities: vec![Facility {
                name: "Main Pool".into(),
                source_url: "https://example.org/pool".into(),
                source_date: Some(1_700_000_000),
                schedule_groups: vec![ScheduleGroup {
                    label: "Swimming".into(),
                    schedules: vec![Schedule {
                        caption: "Lane swim".into(),
                        days: vec!["Monday".into()],
                        activities: vec![Activity {
                            label: "Lane swim".into(),
                            days: vec![DayTimes {
                                times: vec![TimeRange {
                                    label: "7 to 9 am".into(),
                                    weekday: Some(1),
                                    clock: Some(ClockRange {
                                        start: ClockTime { minutes: 7 * 60 },
                                        end: ClockTime { minutes: 9 * 60 },
                                    }),
                                }],
                            }],
                            ..Default::default()
                        }],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let snap = sample();
        let bytes = snap.encode();
        let back = Snapshot::decode(&bytes).unwrap();
        assert_eq!(snap, back);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Snapshot::decode(&[0xff; 64]).is_err());
    }

    #[test]
    fn test_updated_is_max_source_date() {
        let mut snap = sample();
        snap.facilities.push(Facility {
            name: "Rink".into(),
            source_date: Some(1_700_000_500),
            ..Default::default()
        });
        snap.facilities.push(Facility {
            name: "No date".into(),
            ..Default::default()
        });
        let updated = snap.updated().unwrap();
        assert_eq!(updated.timestamp(), 1_700_000_500);
        assert_eq!(snap.source_date_counts(), (2, 1));
    }

    #[test]
    fn test_updated_none_when_no_dates() {
        let snap = Snapshot {
            facilities: vec![Facility::default()],
            ..Default::default()
        };
        assert!(snap.updated().is_none());
    }

    #[test]
    fn test_clock_format_and_overlap() {
        let t = ClockTime { minutes: 9 * 60 + 5 };
        assert_eq!(t.format(), "09:05");

        let morning = ClockRange {
            start: ClockTime { minutes: 7 * 60 },
            end: ClockTime { minutes: 9 * 60 },
        };
        let overlapping = ClockRange {
            start: ClockTime { minutes: 8 * 60 },
            end: ClockTime { minutes: 10 * 60 },
        };
        let evening = ClockRange {
            start: ClockTime { minutes: 20 * 60 },
            end: ClockTime { minutes: 22 * 60 },
        };
        assert!(morning.overlaps(overlapping));
        assert!(!morning.overlaps(evening));

        // past-midnight end
        let late = ClockRange {
            start: ClockTime { minutes: 23 * 60 },
            end: ClockTime { minutes: 60 },
        };
        let midnight = ClockRange {
            start: ClockTime { minutes: 0 },
            end: ClockTime { minutes: 30 },
        };
        assert!(late.overlaps(ClockRange {
            start: ClockTime { minutes: 23 * 60 + 30 },
            end: ClockTime { minutes: 24 * 60 },
        }));
        assert!(!late.overlaps(midnight)); // next-day minutes are not wrapped
    }
}
