//! The simplified denormalized dataset.
//!
//! Unlike the snapshot tree, this shape makes higher-level conclusions and
//! does not preserve structure: one `activity` row per time range, with the
//! schedule's effective dates and the reservation guess already applied.
//! Longer HTML blobs are deduplicated into the `html` table and referenced
//! by small integer ids; id 0 is always the empty string.

use std::collections::HashMap;

use recsched_index::DataRef;

use crate::table::{ColumnKind, ColumnSpec, Row, Table, Value};

/// The five exported tables.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub facility: Vec<FacilityRow>,
    pub activity: Vec<ActivityRow>,
    pub error: Vec<ErrorRow>,
    pub html: Vec<HtmlRow>,
    pub attribution: Vec<AttributionRow>,
}

#[derive(Debug, Clone, Default)]
pub struct FacilityRow {
    pub url: String,
    pub scraped_at: String,
    pub name: String,
    pub address: String,
    pub longitude: f32,
    pub latitude: f32,
    pub special_hours_html_id: i64,
    pub notifications_html_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityRow {
    pub facility_url: String,
    pub start_date: String,
    pub end_date: String,
    pub weekday: String,
    pub start_time: String,
    pub end_time: String,
    pub name: String,
    pub reservation_required: bool,
    pub reservation_links: Vec<String>,
    pub exceptions_html_id: i64,
    pub raw_schedule_group: String,
    pub raw_schedule: String,
    pub raw_day: String,
    pub raw_activity: String,
    pub raw_time: String,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorRow {
    pub facility_url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct HtmlRow {
    pub id: i64,
    pub html: String,
}

#[derive(Debug, Clone, Default)]
pub struct AttributionRow {
    pub text: String,
}

const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";
const TIME_PATTERN: &str = r"^\d{2}:\d{2}$";
const DATE_FORMAT: &str = "%Y-%m-%d";

impl Row for FacilityRow {
    const TABLE: &'static str = "facility";
    const DOC: &'static str = "facility information";
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec {
            json_name: "url",
            csv_name: "facility_url",
            doc: "facility page url on the source website",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "scrapedAt",
            csv_name: "facility_scraped_at",
            doc: "date (YYYY-MM-DD) the data for the facility was scraped at",
            kind: ColumnKind::Str,
            pattern: Some(DATE_PATTERN),
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "name",
            csv_name: "facility_name",
            doc: "name of the facility",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "address",
            csv_name: "facility_address",
            doc: "the address of the facility",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "longitude",
            csv_name: "facility_longitude",
            doc: "facility longitude (may not be set if geocoding failed)",
            kind: ColumnKind::Float,
            pattern: None,
            omit_zero: true,
        },
        ColumnSpec {
            json_name: "latitude",
            csv_name: "facility_latitude",
            doc: "facility latitude (may not be set if geocoding failed)",
            kind: ColumnKind::Float,
            pattern: None,
            omit_zero: true,
        },
        ColumnSpec {
            json_name: "specialHoursHtmlId",
            csv_name: "facility_special_hours_html_id",
            doc: "html for special hours",
            kind: ColumnKind::Int,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "notificationsHtmlId",
            csv_name: "facility_notifications_html_id",
            doc: "html for notifications",
            kind: ColumnKind::Int,
            pattern: None,
            omit_zero: false,
        },
    ];

    fn value(&self, i: usize) -> Value<'_> {
        match i {
            0 => Value::Str(&self.url),
            1 => Value::Str(&self.scraped_at),
            2 => Value::Str(&self.name),
            3 => Value::Str(&self.address),
            4 => Value::Float(self.longitude),
            5 => Value::Float(self.latitude),
            6 => Value::Int(self.special_hours_html_id),
            7 => Value::Int(self.notifications_html_id),
            _ => unreachable!("column out of range"),
        }
    }
}

impl Row for ActivityRow {
    const TABLE: &'static str = "activity";
    const DOC: &'static str = "activity information";
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec {
            json_name: "facilityUrl",
            csv_name: "facility_url",
            doc: "facility url for the activity",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "startDate",
            csv_name: "activity_date_start",
            doc: "start date (YYYY-MM-DD), inclusive (may not be set if parsing failed or there's no range)",
            kind: ColumnKind::Str,
            pattern: Some(DATE_PATTERN),
            omit_zero: true,
        },
        ColumnSpec {
            json_name: "endDate",
            csv_name: "activity_date_end",
            doc: "end date (YYYY-MM-DD), inclusive (may not be set if parsing failed or there's no range)",
            kind: ColumnKind::Str,
            pattern: Some(DATE_PATTERN),
            omit_zero: true,
        },
        ColumnSpec {
            json_name: "weekday",
            csv_name: "activity_weekday",
            doc: "weekday (lowercase, long-form) or single date (YYYY-MM-DD) (may not be set if parsing failed)",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: true,
        },
        ColumnSpec {
            json_name: "startTime",
            csv_name: "activity_time_start",
            doc: "start time (HH:MM), inclusive (may not be set if parsing failed)",
            kind: ColumnKind::Str,
            pattern: Some(TIME_PATTERN),
            omit_zero: true,
        },
        ColumnSpec {
            json_name: "endTime",
            csv_name: "activity_time_end",
            doc: "end time (HH:MM), exclusive (may not be set if parsing failed)",
            kind: ColumnKind::Str,
            pattern: Some(TIME_PATTERN),
            omit_zero: true,
        },
        ColumnSpec {
            json_name: "name",
            csv_name: "activity_name",
            doc: "activity name, normalized",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "reservationRequired",
            csv_name: "activity_reservation_required",
            doc: "whether reservation is required, best-effort",
            kind: ColumnKind::Bool,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "reservationLinks",
            csv_name: "activity_reservation_links",
            doc: "reservation urls (comma-separated for csv)",
            kind: ColumnKind::StrList,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "exceptionsHtmlId",
            csv_name: "activity_exceptions_html_id",
            doc: "html for schedule exceptions",
            kind: ColumnKind::Int,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "rawScheduleGroup",
            csv_name: "activity_raw_group",
            doc: "raw schedule group text (this field is not stable)",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "rawSchedule",
            csv_name: "activity_raw_schedule",
            doc: "raw schedule caption text (this field is not stable)",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "rawDay",
            csv_name: "activity_raw_day",
            doc: "raw schedule activity day (this field is not stable)",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "rawActivity",
            csv_name: "activity_raw_activity",
            doc: "raw schedule activity label (this field is not stable)",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "rawTime",
            csv_name: "activity_raw_time",
            doc: "raw schedule activity time (this field is not stable)",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
    ];

    fn value(&self, i: usize) -> Value<'_> {
        match i {
            0 => Value::Str(&self.facility_url),
            1 => Value::Str(&self.start_date),
            2 => Value::Str(&self.end_date),
            3 => Value::Str(&self.weekday),
            4 => Value::Str(&self.start_time),
            5 => Value::Str(&self.end_time),
            6 => Value::Str(&self.name),
            7 => Value::Bool(self.reservation_required),
            8 => Value::List(&self.reservation_links),
            9 => Value::Int(self.exceptions_html_id),
            10 => Value::Str(&self.raw_schedule_group),
            11 => Value::Str(&self.raw_schedule),
            12 => Value::Str(&self.raw_day),
            13 => Value::Str(&self.raw_activity),
            14 => Value::Str(&self.raw_time),
            _ => unreachable!("column out of range"),
        }
    }
}

impl Row for ErrorRow {
    const TABLE: &'static str = "error";
    const DOC: &'static str = "errors which occurred while scraping the facility pages";
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec {
            json_name: "facilityUrl",
            csv_name: "facility_url",
            doc: "facility url the error occurred while scraping",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "error",
            csv_name: "error",
            doc: "error message",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
    ];

    fn value(&self, i: usize) -> Value<'_> {
        match i {
            0 => Value::Str(&self.facility_url),
            1 => Value::Str(&self.error),
            _ => unreachable!("column out of range"),
        }
    }
}

impl Row for HtmlRow {
    const TABLE: &'static str = "html";
    const DOC: &'static str = "longer snippets of html referenced from facility/activity";
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec {
            json_name: "id",
            csv_name: "id",
            doc: "index for cross-referencing, not stable",
            kind: ColumnKind::Int,
            pattern: None,
            omit_zero: false,
        },
        ColumnSpec {
            json_name: "html",
            csv_name: "html",
            doc: "raw html",
            kind: ColumnKind::Str,
            pattern: None,
            omit_zero: false,
        },
    ];

    fn value(&self, i: usize) -> Value<'_> {
        match i {
            0 => Value::Int(self.id),
            1 => Value::Str(&self.html),
            _ => unreachable!("column out of range"),
        }
    }
}

impl Row for AttributionRow {
    const TABLE: &'static str = "attribution";
    const DOC: &'static str = "attribution text";
    const COLUMNS: &'static [ColumnSpec] = &[ColumnSpec {
        json_name: "text",
        csv_name: "text",
        doc: "attribution line",
        kind: ColumnKind::Str,
        pattern: None,
        omit_zero: false,
    }];

    fn value(&self, i: usize) -> Value<'_> {
        match i {
            0 => Value::Str(&self.text),
            _ => unreachable!("column out of range"),
        }
    }
}

impl Dataset {
    /// The tables in wire order.
    pub fn tables(&self) -> [&dyn Table; 5] {
        [
            &self.facility,
            &self.activity,
            &self.error,
            &self.html,
            &self.attribution,
        ]
    }

    /// Flatten an indexed snapshot into the export shape. The reference's
    /// filter is honored, so a view can be exported directly.
    pub fn build(data: &DataRef) -> Dataset {
        let mut out = Dataset {
            html: vec![HtmlRow {
                id: 0,
                html: String::new(),
            }],
            attribution: data
                .attribution()
                .map(|s| AttributionRow { text: s.to_string() })
                .collect(),
            ..Default::default()
        };

        let mut html_ids: HashMap<String, i64> = HashMap::new();
        let mut add_html = |html: &mut Vec<HtmlRow>, s: String| -> i64 {
            if let Some(&id) = html_ids.get(&s) {
                return id;
            }
            let id = html.len() as i64;
            html.push(HtmlRow {
                id,
                html: s.clone(),
            });
            html_ids.insert(s, id);
            id
        };

        for fac in data.facilities() {
            let mut rf = FacilityRow {
                url: fac.source_url().to_string(),
                name: fac.name().to_string(),
                address: fac.address().replace('\n', ", "),
                ..Default::default()
            };
            if let Some(t) = fac.source_date() {
                rf.scraped_at = t.format(DATE_FORMAT).to_string();
            }
            if let Some((lng, lat)) = fac.lnglat() {
                rf.longitude = lng;
                rf.latitude = lat;
            }
            let special = fac.special_hours_html();
            if !special.is_empty() {
                rf.special_hours_html_id = add_html(&mut out.html, special.replace('\n', ""));
            }
            let notifications = fac.notifications_html();
            if !notifications.is_empty() {
                rf.notifications_html_id =
                    add_html(&mut out.html, notifications.replace('\n', ""));
            }
            for e in fac.errors() {
                out.error.push(ErrorRow {
                    facility_url: rf.url.clone(),
                    error: e.to_string(),
                });
            }

            for tm in fac.time_ranges() {
                let mut ra = ActivityRow {
                    facility_url: rf.url.clone(),
                    ..Default::default()
                };
                if let Some((from, to)) = tm.schedule().effective_date_range() {
                    ra.start_date = from.format(DATE_FORMAT).to_string();
                    ra.end_date = to.format(DATE_FORMAT).to_string();
                }
                if let Some(date) = tm.single_date() {
                    ra.weekday = date.format(DATE_FORMAT).to_string();
                } else if let Some(day) = tm.weekday() {
                    ra.weekday = long_weekday(day).to_string();
                }
                if let Some(clock) = tm.clock() {
                    ra.start_time = clock.start.format();
                    ra.end_time = clock.end.format();
                }
                let act = tm.activity();
                ra.name = act.name().to_string();
                if act.reservation_requirement().0 {
                    ra.reservation_required = true;
                    for link in tm.schedule_group().reservation_links() {
                        if !link.url.is_empty() {
                            ra.reservation_links.push(link.url.replace(',', "%2C"));
                        }
                    }
                }
                let changes = tm.schedule_group().schedule_changes_html();
                if !changes.is_empty() {
                    ra.exceptions_html_id = add_html(&mut out.html, changes.to_string());
                }
                ra.raw_schedule_group = tm.schedule_group().label().to_string();
                ra.raw_schedule = tm.schedule().caption().to_string();
                ra.raw_day = tm.schedule_day().to_string();
                ra.raw_activity = act.label().to_string();
                ra.raw_time = tm.label().to_string();
                out.activity.push(ra);
            }

            out.facility.push(rf);
        }

        out
    }
}

fn long_weekday(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    }
}
