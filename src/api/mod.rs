use std::str::FromStr;

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

pub mod consumption;

pub trait FormatToApiFmt {
    fn to_api_format(&self) -> String;
}

impl FormatToApiFmt for DateTime<Tz> {
    /// ISO-8601 with millisecond precision and the zone's offset,
    /// e.g. `2024-03-24T00:00:00.000+01:00`.
    fn to_api_format(&self) -> String {
        self.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
    }
}

/// Where a timezone can come from, in the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TimezoneSource<'a> {
    Named(&'a str),
    SystemLocal,
    Utc,
}

impl TimezoneSource<'_> {
    fn resolve(&self) -> Option<Tz> {
        match self {
            TimezoneSource::Named(name) => {
                let tz = Tz::from_str(name).ok();
                if tz.is_none() {
                    warn!(
                        timezone = %name,
                        "timezone not found, falling back to system local timezone"
                    );
                }
                tz
            }
            TimezoneSource::SystemLocal => local_timezone(),
            TimezoneSource::Utc => Some(Tz::UTC),
        }
    }
}

fn local_timezone() -> Option<Tz> {
    if let Some(tz) = std::env::var("TZ")
        .ok()
        .and_then(|name| Tz::from_str(&name).ok())
    {
        debug!("Using timezone from TZ environment variable: {}", tz);
        return Some(tz);
    }

    match iana_time_zone::get_timezone() {
        Ok(name) => Tz::from_str(&name).ok(),
        Err(e) => {
            debug!("Could not detect local timezone: {:?}", e);
            None
        }
    }
}

/// Resolves `name` to a timezone, falling back to the system local zone and
/// finally UTC. Never fails.
pub fn resolve_timezone(name: Option<&str>) -> Tz {
    let mut candidates = name
        .filter(|name| !name.trim().is_empty())
        .map(|name| TimezoneSource::Named(name.trim()))
        .into_iter()
        .chain([TimezoneSource::SystemLocal, TimezoneSource::Utc]);

    candidates
        .find_map(|source| source.resolve())
        .unwrap_or(Tz::UTC)
}

/// An inclusive range of whole local days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRange {
    pub from: DateTime<Tz>,
    pub until: DateTime<Tz>,
}

impl HistoryRange {
    /// The range of `days_back` days before today up to the end of today, in
    /// the zone named by `timezone_name`.
    pub fn build(days_back: u32, timezone_name: Option<&str>) -> Self {
        let tz = resolve_timezone(timezone_name);
        Self::ending_at(Utc::now(), days_back, tz)
    }

    pub fn ending_at(now: DateTime<Utc>, days_back: u32, tz: Tz) -> Self {
        let today = now.with_timezone(&tz).date_naive();
        let first_day = today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .unwrap_or(NaiveDate::MIN);

        let start = first_day.and_time(NaiveTime::MIN);
        let end = today
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_default();

        HistoryRange {
            from: localize(&tz, start, true),
            until: localize(&tz, end, false),
        }
    }

    pub fn to_query_string(&self) -> Vec<(String, String)> {
        vec![
            ("historyFrom".to_string(), self.from.to_api_format()),
            ("historyUntil".to_string(), self.until.to_api_format()),
        ]
    }
}

/// Maps a local wall-clock time to an instant. Times skipped by a DST jump
/// are shifted forward by an hour.
fn localize(tz: &Tz, naive: NaiveDateTime, earliest: bool) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(first, last) => {
            if earliest {
                first
            } else {
                last
            }
        }
        LocalResult::None => {
            let shifted = naive + chrono::Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        }
    }
}
