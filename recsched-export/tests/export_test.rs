//! Export sanity: wire-format rules, determinism, and dataset flattening.

use recsched_core::snapshot::{
    Activity, DayTimes, Facility, PartialDate, PartialDateRange, ReservationLink, Schedule,
    ScheduleGroup, Snapshot, TimeRange,
};
use recsched_core::CoreConfig;
use recsched_export::{
    bundle, csv, json, ActivityRow, AttributionRow, Dataset, ErrorRow, FacilityRow, HtmlRow,
};
use recsched_index::Indexer;

const ESCAPE_TEST: &str =
    "escape test !@#$%^&*():, \\ \n\r\t\u{b}\u{c} \u{2028}\u{2029} \u{a0} \"";

/// One blank row per table; the scrape date is a placeholder so the schema
/// pattern holds.
fn empty_data() -> Dataset {
    Dataset {
        facility: vec![FacilityRow {
            scraped_at: "0001-01-01".into(),
            ..Default::default()
        }],
        activity: vec![ActivityRow::default()],
        error: vec![ErrorRow::default()],
        html: vec![HtmlRow::default()],
        attribution: vec![AttributionRow::default()],
    }
}

/// One fully populated row per table, including the escaping stress string.
fn dummy_data() -> Dataset {
    Dataset {
        facility: vec![FacilityRow {
            url: "DummyURL".into(),
            scraped_at: "2025-01-02".into(),
            name: "DummyName".into(),
            address: "DummyAddress".into(),
            longitude: 123.456,
            latitude: 23.5,
            special_hours_html_id: 1,
            notifications_html_id: 2,
        }],
        activity: vec![ActivityRow {
            facility_url: "DummyFacilityURL".into(),
            start_date: "2025-01-02".into(),
            end_date: "2025-02-03".into(),
            weekday: "sunday".into(),
            start_time: "23:59".into(),
            end_time: "23:59".into(),
            name: "DummyName".into(),
            reservation_required: true,
            reservation_links: vec![
                "DummyReservationLink1".into(),
                "DummyReservationLink2".into(),
            ],
            exceptions_html_id: 3,
            raw_schedule_group: "DummyRawScheduleGroup".into(),
            raw_schedule: "DummyRawSchedule".into(),
            raw_day: "DummyRawDay".into(),
            raw_activity: "DummyRawActivity".into(),
            raw_time: "DummyRawTime".into(),
        }],
        error: vec![ErrorRow {
            facility_url: "DummyFacilityURL".into(),
            error: "DummyError".into(),
        }],
        html: vec![
            HtmlRow {
                id: 0,
                html: String::new(),
            },
            HtmlRow {
                id: 1,
                html: "HTML1".into(),
            },
            HtmlRow {
                id: 2,
                html: "HTML2".into(),
            },
            HtmlRow {
                id: 3,
                html: "HTML3".into(),
            },
        ],
        attribution: vec![
            AttributionRow {
                text: "DummyText".into(),
            },
            AttributionRow {
                text: ESCAPE_TEST.into(),
            },
        ],
    }
}

#[test]
fn test_empty_csv_exact_bytes() {
    let tables = csv::tables(&empty_data()).unwrap();
    let by_name: std::collections::HashMap<_, _> = tables.into_iter().collect();

    assert_eq!(
        String::from_utf8(by_name["facility"].clone()).unwrap(),
        "facility_url,facility_scraped_at,facility_name,facility_address,\
         facility_longitude,facility_latitude,facility_special_hours_html_id,\
         facility_notifications_html_id\r\n,0001-01-01,,,,,0,0\r\n"
    );
    assert_eq!(
        String::from_utf8(by_name["activity"].clone()).unwrap(),
        "facility_url,activity_date_start,activity_date_end,activity_weekday,\
         activity_time_start,activity_time_end,activity_name,\
         activity_reservation_required,activity_reservation_links,\
         activity_exceptions_html_id,activity_raw_group,activity_raw_schedule,\
         activity_raw_day,activity_raw_activity,activity_raw_time\r\n\
         ,,,,,,,0,,0,,,,,\r\n"
    );
    assert_eq!(
        String::from_utf8(by_name["error"].clone()).unwrap(),
        "facility_url,error\r\n,\r\n"
    );
    assert_eq!(
        String::from_utf8(by_name["html"].clone()).unwrap(),
        "id,html\r\n0,\r\n"
    );
    assert_eq!(
        String::from_utf8(by_name["attribution"].clone()).unwrap(),
        "text\r\n\r\n"
    );
}

#[test]
fn test_every_table_has_header_even_when_empty() {
    let tables = csv::tables(&Dataset::default()).unwrap();
    for (name, bytes) in tables {
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with("\r\n"), "table {name} is CRLF-terminated");
        assert_eq!(text.matches("\r\n").count(), 1, "table {name} is header-only");
    }
}

#[test]
fn test_dummy_csv_quoting() {
    let tables = csv::tables(&dummy_data()).unwrap();
    let by_name: std::collections::HashMap<_, _> = tables.into_iter().collect();

    // the stress string: quoted, quote doubled, LF normalized to CRLF
    let attribution = String::from_utf8(by_name["attribution"].clone()).unwrap();
    let expected = "text\r\nDummyText\r\n\"escape test !@#$%^&*():, \\ \r\n\r\t\u{b}\u{c} \u{2028}\u{2029} \u{a0} \"\"\"\r\n";
    assert_eq!(attribution, expected);

    // list column: one quoted comma-joined field
    let activity = String::from_utf8(by_name["activity"].clone()).unwrap();
    assert!(activity.contains(",\"DummyReservationLink1,DummyReservationLink2\","));
    // booleans are 1/0
    assert!(activity.contains(",1,\"DummyReservationLink1"));
}

#[test]
fn test_dummy_json_escapes_and_parses() {
    let bytes = json::write(&dummy_data(), Some("https://example.com/schema.json"));
    let text = String::from_utf8(bytes.clone()).unwrap();

    let expected_escape = "escape test !@#$%^&*():, \\\\ \\n\\r\\t\\u000b\\f \\u2028\\u2029 \u{a0} \\\"";
    assert!(text.contains(expected_escape), "got: {text}");
    assert!(text.starts_with("{\"$schema\":\"https://example.com/schema.json\",\"facility\":["));

    // still valid JSON, and the escape round-trips
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        parsed["attribution"][1]["text"].as_str().unwrap(),
        ESCAPE_TEST
    );
    assert_eq!(parsed["activity"][0]["reservationRequired"], true);
    // f32 Display never uses exponent notation, so the value survives
    assert_eq!(parsed["facility"][0]["longitude"].as_f64().unwrap(), 123.456);
}

#[test]
fn test_json_nulls_for_omitted_zeroes() {
    let bytes = json::write(&empty_data(), None);
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(parsed.get("$schema").is_none());
    assert!(parsed["facility"][0]["longitude"].is_null());
    assert!(parsed["activity"][0]["startDate"].is_null());
    assert_eq!(parsed["facility"][0]["specialHoursHtmlId"], 0);
    // non-omitted strings stay empty strings
    assert_eq!(parsed["facility"][0]["name"], "");
}

#[test]
fn test_json_schema_structure() {
    let bytes = json::schema(Some("https://example.com/schema.json"));
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(
        parsed["$schema"],
        "https://json-schema.org/draft/2020-12/schema"
    );
    assert_eq!(parsed["$id"], "https://example.com/schema.json");
    assert_eq!(parsed["type"], "object");

    let facility = &parsed["properties"]["facility"];
    assert_eq!(facility["type"], "array");
    assert_eq!(facility["items"]["type"], "object");
    let props = &facility["items"]["properties"];
    assert_eq!(props["url"]["type"], "string");
    // nullable scalar becomes a type union
    assert_eq!(
        props["longitude"]["type"],
        serde_json::json!(["number", "null"])
    );
    // pattern attached where declared
    assert_eq!(props["scrapedAt"]["pattern"], r"^\d{4}-\d{2}-\d{2}$");

    let links = &parsed["properties"]["activity"]["items"]["properties"]["reservationLinks"];
    assert_eq!(links["type"], "array");
    assert_eq!(links["items"]["type"], "string");

    // every column of every table is described
    for (table, rows) in [("facility", 8), ("activity", 15), ("error", 2), ("html", 2)] {
        let props = parsed["properties"][table]["items"]["properties"]
            .as_object()
            .unwrap();
        assert_eq!(props.len(), rows, "table {table}");
        for schema in props.values() {
            assert!(schema["description"].is_string());
        }
    }
}

#[test]
fn test_exports_are_deterministic() {
    let data = dummy_data();
    assert_eq!(json::write(&data, None), json::write(&data, None));
    assert_eq!(csv::tables(&data).unwrap(), csv::tables(&data).unwrap());
    assert_eq!(bundle::csv_zip(&data).unwrap(), bundle::csv_zip(&data).unwrap());
    assert_eq!(json::schema(None), json::schema(None));
    assert_eq!(csv::schema(), csv::schema());
}

#[test]
fn test_csv_zip_contents() {
    let bytes = bundle::csv_zip(&dummy_data()).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "schema.csv",
            "facility.csv",
            "activity.csv",
            "error.csv",
            "html.csv",
            "attribution.csv",
        ]
    );

    use std::io::Read;
    let mut schema = String::new();
    archive
        .by_name("schema.csv")
        .unwrap()
        .read_to_string(&mut schema)
        .unwrap();
    assert!(schema.starts_with("table,column,description\r\n"));
}

fn indexed_snapshot() -> Snapshot {
    Snapshot {
        attribution: vec!["source: city open data".into()],
        facilities: vec![Facility {
            name: "Main Pool".into(),
            source_url: "https://example.org/pool".into(),
            source_date: Some(1_743_500_000),
            address: "1 Pool Rd\nSuite 2".into(),
            lnglat: Some((-75.7, 45.4)),
            notifications_html: "<p>note</p>".into(),
            special_hours_html: "<p>hours\nline</p>".into(),
            errors: vec!["partial scrape".into()],
            schedule_groups: vec![ScheduleGroup {
                label: "Swimming".into(),
                reservation_links: vec![ReservationLink {
                    label: "reserve".into(),
                    url: "https://example.org/reserve?a,b".into(),
                }],
                schedule_changes_html: "<p>changes</p>".into(),
                schedules: vec![Schedule {
                    caption: "Lane swim".into(),
                    date_range: Some(PartialDateRange {
                        from: PartialDate {
                            year: Some(2025),
                            month: Some(4),
                            day: Some(1),
                        },
                        to: PartialDate {
                            year: None,
                            month: Some(4),
                            day: None,
                        },
                    }),
                    days: vec!["Monday".into()],
                    activities: vec![Activity {
                        label: "Lane swim".into(),
                        name: Some("lane swim".into()),
                        reservation: Some(true),
                        days: vec![DayTimes {
                            times: vec![TimeRange {
                                label: "7 to 9".into(),
                                weekday: Some(1),
                                clock: None,
                            }],
                        }],
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
fn test_dataset_build_flattens_index() {
    let mut indexer = Indexer::new(CoreConfig::new());
    let idx = indexer.load(&indexed_snapshot().encode()).unwrap();
    let data = Dataset::build(&idx.data());

    assert_eq!(data.facility.len(), 1);
    let fac = &data.facility[0];
    assert_eq!(fac.url, "https://example.org/pool");
    assert_eq!(fac.scraped_at, "2025-04-01");
    assert_eq!(fac.address, "1 Pool Rd, Suite 2");
    assert_eq!(fac.longitude, -75.7);
    // html blobs deduplicated, newlines stripped from facility snippets
    assert_eq!(fac.special_hours_html_id, 1);
    assert_eq!(fac.notifications_html_id, 2);
    assert_eq!(data.html[1].html, "<p>hoursline</p>");
    assert_eq!(data.html[0].html, "");

    assert_eq!(data.error.len(), 1);
    assert_eq!(data.error[0].error, "partial scrape");

    assert_eq!(data.activity.len(), 1);
    let act = &data.activity[0];
    assert_eq!(act.facility_url, fac.url);
    assert_eq!(act.name, "lane swim");
    assert_eq!(act.weekday, "monday");
    assert_eq!(act.start_date, "2025-04-01");
    assert_eq!(act.end_date, "2025-04-30");
    assert!(act.reservation_required);
    // commas in reservation links are percent-escaped
    assert_eq!(act.reservation_links, vec!["https://example.org/reserve?a%2Cb"]);
    assert_eq!(act.exceptions_html_id, 3);
    assert_eq!(act.raw_day, "Monday");
    assert_eq!(act.raw_time, "7 to 9");

    assert_eq!(data.attribution.len(), 1);

    // a filtered view exports only what it shows
    let mut view = idx.data().mutate();
    view.retain_facilities(|_| false);
    let filtered = Dataset::build(&view.freeze());
    assert!(filtered.facility.is_empty());
    assert!(filtered.activity.is_empty());
    assert_eq!(filtered.html.len(), 1);
}

#[test]
fn test_build_is_deterministic_end_to_end() {
    let mut indexer = Indexer::new(CoreConfig::new());
    let idx = indexer.load(&indexed_snapshot().encode()).unwrap();
    let a = Dataset::build(&idx.data());
    let b = Dataset::build(&idx.data());
    assert_eq!(json::write(&a, None), json::write(&b, None));
    assert_eq!(
        bundle::csv_zip(&a).unwrap(),
        bundle::csv_zip(&b).unwrap()
    );
}
