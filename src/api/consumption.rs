use std::fmt;

use polars::prelude::{DataFrame, NamedFrom, PolarsError, Series};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{ApiClient, FluviusError, Result};

use super::HistoryRange;

pub struct MeasurementHistory<'a> {
    client: &'a dyn ApiClient,
}

/// What to ask the measurement-history endpoint for.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub ean: String,
    pub meter_serial: String,
    pub days_back: u32,
    /// IANA timezone name used to compute the local day boundaries
    pub timezone: Option<String>,
    /// Provider code: 3 = quarter-hourly, 4 = daily
    pub granularity: String,
}

/// Whether a reading was taken from or fed into the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Consumption,
    Injection,
    Other(i64),
}

impl From<i64> for Direction {
    fn from(code: i64) -> Self {
        match code {
            1 => Direction::Consumption,
            2 => Direction::Injection,
            other => Direction::Other(other),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Consumption => write!(f, "Consumption"),
            Direction::Injection => write!(f, "Injection"),
            Direction::Other(code) => write!(f, "Direction {}", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tariff {
    High,
    Low,
}

impl From<i64> for Tariff {
    fn from(code: i64) -> Self {
        if code == 1 {
            Tariff::High
        } else {
            Tariff::Low
        }
    }
}

impl fmt::Display for Tariff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tariff::High => "High",
            Tariff::Low => "Low",
        };
        write!(f, "{}", name)
    }
}

/// One day of readings as returned by the portal. Each field falls back to
/// its default on its own, so one odd value never hides the rest of the day.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct DayMeasurement {
    #[serde(rename = "d", default, deserialize_with = "scalar_label")]
    pub date: Option<String>,

    #[serde(rename = "v", default, deserialize_with = "lenient_readings")]
    pub readings: Vec<Reading>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Reading {
    #[serde(rename = "dc", default, deserialize_with = "exact_code")]
    pub direction_code: i64,

    #[serde(rename = "t", default, deserialize_with = "exact_code")]
    pub tariff_code: i64,

    /// kWh
    #[serde(rename = "v", default, deserialize_with = "lenient_number")]
    pub value: f64,
}

impl Reading {
    pub fn direction(&self) -> Direction {
        Direction::from(self.direction_code)
    }

    pub fn tariff(&self) -> Tariff {
        Tariff::from(self.tariff_code)
    }
}

/// Any scalar is usable as a label; `null`, arrays and objects are not.
fn scalar_label<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

/// The portal is not consistent about sending numbers as numbers.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Codes only count when they are integral JSON numbers; anything else
/// (strings, fractions, booleans) reads as 0, i.e. an ignored direction and
/// the low tariff.
fn exact_code<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    })
}

/// Readings that are not objects are dropped one by one.
fn lenient_readings<'de, D>(deserializer: D) -> std::result::Result<Vec<Reading>, D::Error>
where
    D: Deserializer<'de>,
{
    let readings = match Value::deserialize(deserializer)? {
        Value::Array(readings) => readings,
        _ => return Ok(vec![]),
    };

    Ok(readings
        .iter()
        .enumerate()
        .filter_map(|(idx, reading)| {
            Reading::deserialize(reading)
                .inspect_err(|e| debug!(reading = idx, error = %e, "skipping malformed reading"))
                .ok()
        })
        .collect())
}

/// The measurement history exactly as the portal sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterMeasurementHistory {
    days: Vec<Value>,
}

impl MeterMeasurementHistory {
    pub fn new(days: Vec<Value>) -> Self {
        Self { days }
    }

    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).map_err(FluviusError::ResponseParse)?;
        match value {
            Value::Array(days) => Ok(Self::new(days)),
            other => Err(FluviusError::UnexpectedShape(format!(
                "expected a JSON array of days, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn raw(&self) -> &[Value] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Typed view of the days. A day that can't be read is treated as having
    /// no readings.
    pub fn days(&self) -> Vec<DayMeasurement> {
        self.days
            .iter()
            .enumerate()
            .map(|(idx, day)| {
                DayMeasurement::deserialize(day).unwrap_or_else(|e| {
                    warn!(day = idx + 1, error = %e, "skipping malformed day record");
                    DayMeasurement::default()
                })
            })
            .collect()
    }

    /// One row per reading.
    pub fn as_polars_df(&self) -> std::result::Result<DataFrame, PolarsError> {
        let mut day_numbers: Vec<i64> = vec![];
        let mut dates: Vec<String> = vec![];
        let mut directions: Vec<String> = vec![];
        let mut tariffs: Vec<String> = vec![];
        let mut values: Vec<f64> = vec![];

        for (idx, day) in self.days().iter().enumerate() {
            for reading in &day.readings {
                day_numbers.push(idx as i64 + 1);
                dates.push(day.date.clone().unwrap_or_default());
                directions.push(reading.direction().to_string());
                tariffs.push(reading.tariff().to_string());
                values.push(reading.value);
            }
        }

        DataFrame::new(vec![
            Series::new("day".into(), day_numbers),
            Series::new("date".into(), dates),
            Series::new("direction".into(), directions),
            Series::new("tariff".into(), tariffs),
            Series::new("value".into(), values),
        ])
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<'a> MeasurementHistory<'a> {
    const URL: &'static str = "/verbruik/api/meter-measurement-history";

    pub fn new(client: &'a dyn ApiClient) -> Self {
        Self { client }
    }

    fn query_string(&self, query: &HistoryQuery, range: &HistoryRange) -> Vec<(String, String)> {
        let mut qs = range.to_query_string();
        qs.push(("granularity".to_string(), query.granularity.clone()));
        qs.push(("asServiceProvider".to_string(), "false".to_string()));
        qs.push(("meterSerialNumber".to_string(), query.meter_serial.clone()));
        qs
    }

    /// Fetches the readings of the last `days_back` days, today included.
    pub fn fetch(&self, query: &HistoryQuery) -> Result<MeterMeasurementHistory> {
        let range = HistoryRange::build(query.days_back, query.timezone.as_deref());
        self.fetch_range(query, &range)
    }

    pub fn fetch_range(
        &self,
        query: &HistoryQuery,
        range: &HistoryRange,
    ) -> Result<MeterMeasurementHistory> {
        let path = format!("{}/{}", MeasurementHistory::URL, query.ean);
        let qs = self.query_string(query, range);

        info!(
            "Getting {} days of consumption data (granularity={}, tz={})...",
            query.days_back,
            query.granularity,
            range.from.format("%:z")
        );

        let reply = self.client.http_get(&path, &qs)?;

        let history = MeterMeasurementHistory::from_json(&reply).inspect_err(|e| {
            error!("Error: parsing reply of {}?{:?}: {}", path, qs, e);
        })?;

        info!("Successfully retrieved {} days of data", history.len());
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FormatToApiFmt;
    use crate::ApiException;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::cell::RefCell;

    struct FakeClient {
        reply: Box<dyn Fn() -> Result<String>>,
        calls: RefCell<Vec<(String, Vec<(String, String)>)>>,
    }

    impl FakeClient {
        fn replying(reply: impl Fn() -> Result<String> + 'static) -> Self {
            Self {
                reply: Box::new(reply),
                calls: RefCell::new(vec![]),
            }
        }
    }

    impl ApiClient for FakeClient {
        fn http_get(&self, path: &str, query_string: &[(String, String)]) -> Result<String> {
            self.calls
                .borrow_mut()
                .push((path.to_string(), query_string.to_vec()));
            (self.reply)()
        }
    }

    fn query() -> HistoryQuery {
        HistoryQuery {
            ean: "541448800000000000".to_string(),
            meter_serial: "1SAG1100000000".to_string(),
            days_back: 7,
            timezone: Some("Europe/Brussels".to_string()),
            granularity: "4".to_string(),
        }
    }

    fn fixed_range() -> HistoryRange {
        let now = DateTime::parse_from_rfc3339("2024-06-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        HistoryRange::ending_at(now, 7, chrono_tz::Europe::Brussels)
    }

    #[test]
    fn test_fetch_sends_expected_request() {
        let client = FakeClient::replying(|| Ok("[]".to_string()));
        let range = fixed_range();

        MeasurementHistory::new(&client)
            .fetch_range(&query(), &range)
            .unwrap();

        let calls = client.calls.borrow();
        assert_eq!(calls.len(), 1);
        let (path, qs) = &calls[0];
        assert_eq!(
            path,
            "/verbruik/api/meter-measurement-history/541448800000000000"
        );

        let expected: Vec<(String, String)> = [
            ("historyFrom", range.from.to_api_format().as_str()),
            ("historyUntil", range.until.to_api_format().as_str()),
            ("granularity", "4"),
            ("asServiceProvider", "false"),
            ("meterSerialNumber", "1SAG1100000000"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(qs, &expected);
        assert_eq!(qs[0].1, "2024-06-08T00:00:00.000+02:00");
    }

    #[test]
    fn test_fetch_returns_days_verbatim() {
        let body = json!([
            {"d": "2024-06-14T00:00:00+02:00", "v": [{"dc": 1, "t": 1, "v": 2.5, "u": 3}]},
            {"d": "2024-06-15T00:00:00+02:00", "v": [], "extra": true}
        ]);
        let reply = body.to_string();
        let client = FakeClient::replying(move || Ok(reply.clone()));

        let history = MeasurementHistory::new(&client).fetch(&query()).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(Value::Array(history.raw().to_vec()), body);
    }

    #[test]
    fn test_fetch_propagates_http_failure() {
        let client = FakeClient::replying(|| {
            Err(FluviusError::HttpStatus {
                status: 401,
                reason: ApiException::InvalidToken,
                body: "".to_string(),
            })
        });

        let err = MeasurementHistory::new(&client)
            .fetch(&query())
            .unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn test_fetch_rejects_non_json() {
        let client = FakeClient::replying(|| Ok("<html>login</html>".to_string()));

        let err = MeasurementHistory::new(&client)
            .fetch(&query())
            .unwrap_err();
        assert!(matches!(err, FluviusError::ResponseParse(_)));
    }

    #[test]
    fn test_fetch_rejects_non_array() {
        let client = FakeClient::replying(|| Ok(r#"{"error": "nope"}"#.to_string()));

        let err = MeasurementHistory::new(&client)
            .fetch(&query())
            .unwrap_err();
        assert!(matches!(err, FluviusError::UnexpectedShape(_)));
    }

    #[test]
    fn test_reading_defaults() {
        let day: DayMeasurement = serde_json::from_value(json!({
            "v": [{"v": "1.25"}, {"dc": 2, "t": 1}, {"dc": null, "t": null, "v": null}]
        }))
        .unwrap();

        assert_eq!(day.date, None);
        assert_eq!(day.readings.len(), 3);
        assert_eq!(day.readings[0].direction(), Direction::Other(0));
        assert_eq!(day.readings[0].tariff(), Tariff::Low);
        assert_eq!(day.readings[0].value, 1.25);
        assert_eq!(day.readings[1].direction(), Direction::Injection);
        assert_eq!(day.readings[1].tariff(), Tariff::High);
        assert_eq!(day.readings[1].value, 0.0);
        assert_eq!(day.readings[2].direction(), Direction::Other(0));
        assert_eq!(day.readings[2].value, 0.0);
    }

    #[test]
    fn test_codes_must_be_integral_numbers() {
        let day: DayMeasurement = serde_json::from_value(json!({"v": [
            {"dc": "1", "t": "1", "v": 1.0},
            {"dc": 1.5, "t": 1.0, "v": 1.0},
            {"dc": 2.0, "t": true, "v": 1.0}
        ]}))
        .unwrap();

        assert_eq!(day.readings[0].direction(), Direction::Other(0));
        assert_eq!(day.readings[0].tariff(), Tariff::Low);
        assert_eq!(day.readings[1].direction(), Direction::Other(0));
        assert_eq!(day.readings[1].tariff(), Tariff::High);
        assert_eq!(day.readings[2].direction(), Direction::Injection);
        assert_eq!(day.readings[2].tariff(), Tariff::Low);
    }

    #[test]
    fn test_odd_field_keeps_rest_of_day() {
        let history = MeterMeasurementHistory::new(vec![
            json!({"d": 20240614, "v": [{"dc": 1, "t": 1, "v": 2.5}]}),
            json!({"d": "2024-06-15", "v": [
                {"dc": 1, "t": 1, "v": 2.5},
                {"dc": true, "t": 1, "v": 1.0},
                "not a reading",
                {"dc": 2, "t": [1], "v": {"kwh": 1}}
            ]}),
            json!({"d": {"nested": true}, "v": "none"}),
        ]);

        let days = history.days();

        assert_eq!(days[0].date.as_deref(), Some("20240614"));
        assert_eq!(days[0].readings.len(), 1);
        assert_eq!(days[0].readings[0].value, 2.5);

        assert_eq!(days[1].date.as_deref(), Some("2024-06-15"));
        assert_eq!(days[1].readings.len(), 3);
        assert_eq!(days[1].readings[1].direction(), Direction::Other(0));
        assert_eq!(days[1].readings[2].direction(), Direction::Injection);
        assert_eq!(days[1].readings[2].tariff(), Tariff::Low);
        assert_eq!(days[1].readings[2].value, 0.0);

        assert_eq!(days[2].date, None);
        assert!(days[2].readings.is_empty());
    }

    #[test]
    fn test_malformed_day_is_empty() {
        let history = MeterMeasurementHistory::new(vec![json!("oops"), json!({"v": null})]);

        let days = history.days();
        assert_eq!(days.len(), 2);
        assert!(days[0].readings.is_empty());
        assert!(days[1].readings.is_empty());
    }

    #[test]
    fn test_as_polars_df() {
        let history = MeterMeasurementHistory::new(vec![
            json!({"d": "2024-06-14", "v": [{"dc": 1, "t": 1, "v": "2.5"}, {"dc": 2, "t": 2, "v": "1.0"}]}),
            json!({"d": "2024-06-15", "v": [{"dc": 1, "t": 2, "v": 3.0}]}),
        ]);

        let df = history.as_polars_df().unwrap();

        assert_eq!(df.shape(), (3, 5));
        let values: Vec<Option<f64>> = df.column("value").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(2.5), Some(1.0), Some(3.0)]);
    }
}
