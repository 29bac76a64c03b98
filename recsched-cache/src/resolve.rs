//! Version spec resolution.
//!
//! A spec is one of: a full version id, `latest`, `latest-N` (N-th most
//! recent), or a date prefix (`YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM`,
//! `YYYY-MM-DDTHH:MM:SS`) interpreted in the cache's time zone. A month
//! prefix matches the most recent version within that month; finer prefixes
//! match the most recent version strictly before the end of their window.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use recsched_core::ContentHash;
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::store::{from_unix, to_unix, Cache};

/// Outcome of resolving a version spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The spec is not in any recognized form.
    Invalid,
    /// The spec is well-formed but matches no stored version.
    NoMatch,
    /// The matching version.
    Found { id: String, updated: DateTime<Utc> },
}

impl Resolved {
    /// The id, if a version matched.
    pub fn id(&self) -> Option<&str> {
        match self {
            Resolved::Found { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl Cache {
    /// Resolve a version spec.
    pub fn resolve_version(&self, spec: &str) -> Result<Resolved> {
        if ContentHash::is_id(spec) {
            return self.get_one("WHERE id = ?1", [spec.to_string()]);
        }

        if let Some(offset) = spec.strip_prefix("latest") {
            if offset.is_empty() {
                return self.get_one("ORDER BY updated DESC, revision DESC LIMIT 1", []);
            }
            if let Ok(n) = offset.parse::<i64>() {
                if n < 0 {
                    return self.get_one(
                        &format!("ORDER BY updated DESC, revision DESC LIMIT 1 OFFSET {}", -n),
                        [],
                    );
                }
            }
            return Ok(Resolved::Invalid);
        }

        let tz = self.timezone();
        match parse_window(spec, tz) {
            Some(Window::Month { start, end }) => self.get_one(
                "WHERE updated >= ?1 AND updated < ?2 \
                 ORDER BY updated DESC, revision DESC LIMIT 1",
                [to_unix(start), to_unix(end)],
            ),
            Some(Window::Before { end }) => self.get_one(
                "WHERE updated < ?1 ORDER BY updated DESC, revision DESC LIMIT 1",
                [to_unix(end)],
            ),
            None => Ok(Resolved::Invalid),
        }
    }

    fn get_one<P: rusqlite::Params>(&self, clause: &str, params: P) -> Result<Resolved> {
        self.with_reader(|conn| query_one(conn, clause, params))
    }
}

fn query_one<P: rusqlite::Params>(conn: &Connection, clause: &str, params: P) -> Result<Resolved> {
    let sql = format!("SELECT id, updated FROM data {clause}");
    let row: Option<(String, f64)> = conn
        .query_row(&sql, params, |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
    Ok(match row {
        Some((id, updated)) => Resolved::Found {
            id,
            updated: from_unix(updated),
        },
        None => Resolved::NoMatch,
    })
}

enum Window {
    /// Bounded to one month.
    Month {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Everything strictly before the end of the window.
    Before { end: DateTime<Utc> },
}

fn parse_window(spec: &str, tz: Tz) -> Option<Window> {
    match spec.len() {
        7 => {
            let start_date = NaiveDate::parse_from_str(&format!("{spec}-01"), "%Y-%m-%d").ok()?;
            let end_date = if start_date.month() == 12 {
                NaiveDate::from_ymd_opt(start_date.year() + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(start_date.year(), start_date.month() + 1, 1)?
            };
            Some(Window::Month {
                start: instant(tz, start_date.and_hms_opt(0, 0, 0)?)?,
                end: instant(tz, end_date.and_hms_opt(0, 0, 0)?)?,
            })
        }
        10 => {
            let date = NaiveDate::parse_from_str(spec, "%Y-%m-%d").ok()?;
            Some(Window::Before {
                end: instant(tz, date.succ_opt()?.and_hms_opt(0, 0, 0)?)?,
            })
        }
        16 => {
            let dt = NaiveDateTime::parse_from_str(spec, "%Y-%m-%dT%H:%M").ok()?;
            Some(Window::Before {
                end: instant(tz, dt + Duration::minutes(1))?,
            })
        }
        19 => {
            let dt = NaiveDateTime::parse_from_str(spec, "%Y-%m-%dT%H:%M:%S").ok()?;
            Some(Window::Before {
                end: instant(tz, dt + Duration::seconds(1))?,
            })
        }
        _ => None,
    }
}

fn instant(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Toronto;

    /// Insert a version row directly, with `updated` at local midnight of
    /// the given date.
    fn insert(cache: &Cache, id_seed: u8, date: &str, revision: i64) -> String {
        let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let updated = instant(Toronto, naive.and_hms_opt(0, 0, 0).unwrap()).unwrap();
        let id: String = (0..32)
            .map(|i| char::from(b'A' + ((id_seed as usize + i) % 26) as u8))
            .collect();
        let commit = format!("{:040x}", id_seed as u128);
        cache
            .with_writer(|conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO commits (hash, date) VALUES (?1, ?2)",
                    rusqlite::params![commit, to_unix(updated)],
                )?;
                tx.execute(
                    "INSERT INTO data (id, hash, updated, revision) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, commit, to_unix(updated), revision],
                )?;
                tx.commit()?;
                Ok(())
            })
            .unwrap();
        id
    }

    fn resolved_id(cache: &Cache, spec: &str) -> Option<String> {
        match cache.resolve_version(spec).unwrap() {
            Resolved::Found { id, .. } => Some(id),
            Resolved::NoMatch => None,
            Resolved::Invalid => panic!("spec {spec:?} should be valid"),
        }
    }

    fn seeded_cache() -> (tempfile::TempDir, Cache, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(&dir.path().join("cache.db"), false, Toronto).unwrap();
        let ids = vec![
            insert(&cache, 0, "2025-04-14", 1),
            insert(&cache, 1, "2025-05-20", 1),
            insert(&cache, 2, "2025-10-02", 1),
            insert(&cache, 3, "2025-10-02", 2),
            insert(&cache, 4, "2025-10-03", 1),
        ];
        (dir, cache, ids)
    }

    #[test]
    fn test_latest_and_offsets() {
        let (_dir, cache, ids) = seeded_cache();
        assert_eq!(resolved_id(&cache, "latest").as_deref(), Some(&*ids[4]));
        assert_eq!(resolved_id(&cache, "latest-1").as_deref(), Some(&*ids[3]));
        assert_eq!(resolved_id(&cache, "latest-2").as_deref(), Some(&*ids[2]));
        assert_eq!(resolved_id(&cache, "latest-3").as_deref(), Some(&*ids[1]));
        assert_eq!(resolved_id(&cache, "latest-9"), None);
    }

    #[test]
    fn test_date_prefixes() {
        let (_dir, cache, ids) = seeded_cache();
        // month prefixes are bounded to the month
        assert_eq!(resolved_id(&cache, "2025-10").as_deref(), Some(&*ids[4]));
        assert_eq!(resolved_id(&cache, "2025-09"), None);
        // day prefixes take the most recent before the end of the day
        assert_eq!(resolved_id(&cache, "2025-05-19").as_deref(), Some(&*ids[0]));
        assert_eq!(resolved_id(&cache, "2025-05-20").as_deref(), Some(&*ids[1]));
        assert_eq!(resolved_id(&cache, "2025-10-02").as_deref(), Some(&*ids[3]));
        // minute and second precision
        assert_eq!(
            resolved_id(&cache, "2025-10-02T00:00").as_deref(),
            Some(&*ids[3])
        );
        assert_eq!(
            resolved_id(&cache, "2025-04-13T23:59:58"),
            None
        );
    }

    #[test]
    fn test_exact_id_roundtrip() {
        let (_dir, cache, ids) = seeded_cache();
        for id in &ids {
            assert_eq!(resolved_id(&cache, id).as_deref(), Some(&**id));
        }
        let missing = "Z".repeat(32);
        assert_eq!(resolved_id(&cache, &missing), None);
    }

    #[test]
    fn test_invalid_specs() {
        let (_dir, cache, _ids) = seeded_cache();
        for spec in ["", "latest+1", "latest-x", "2025", "2025-10-", "bogus", "latest-"] {
            assert_eq!(cache.resolve_version(spec).unwrap(), Resolved::Invalid, "{spec:?}");
        }
    }

    #[test]
    fn test_valid_spec_empty_cache_is_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(&dir.path().join("cache.db"), false, Toronto).unwrap();
        assert_eq!(cache.resolve_version("latest").unwrap(), Resolved::NoMatch);
        assert_eq!(cache.resolve_version("2025-10").unwrap(), Resolved::NoMatch);
    }
}
