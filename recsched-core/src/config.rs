//! Process-wide configuration, passed explicitly.
//!
//! The canonical time zone and the published schema URL are configuration,
//! not globals: constructors that need them take a [`CoreConfig`] so tests
//! can override both without touching process state.

use chrono_tz::Tz;

/// Configuration shared by the index and export layers.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Time zone all civil-date resolution happens in.
    pub timezone: Tz,
    /// URL of the published JSON schema, included in JSON exports as
    /// `$schema` when set.
    pub schema_url: Option<String>,
}

impl CoreConfig {
    /// The deployment default: schedules are published in Toronto local time.
    pub fn new() -> Self {
        CoreConfig {
            timezone: chrono_tz::America::Toronto,
            schema_url: None,
        }
    }

    /// Set the schema URL.
    pub fn with_schema_url(mut self, url: impl Into<String>) -> Self {
        self.schema_url = Some(url.into());
        self
    }

    /// Override the time zone.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.timezone = tz;
        self
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
