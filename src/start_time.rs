//! Schedule anchors: a fixed instant, or a time of day that repeats daily.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartTimeError {
    #[error("start time must be <hhmm> on the 24-hour clock, got '{0}'")]
    Format(String),
}

/// When a schedule's first phase begins.
///
/// `DailyAnchor` holds a UTC time of day. It resolves to the latest
/// occurrence of that time not after `now`, so schedules that do not divide
/// a day evenly still restart at the same wall-clock time every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StartTime {
    DailyAnchor { hour: u32, minute: u32 },
    Absolute(DateTime<Utc>),
}

impl StartTime {
    pub fn daily(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self::DailyAnchor { hour, minute })
    }

    /// Interpret a JSON value as sent by clients.
    ///
    /// Numbers are milliseconds since the Unix epoch, strings are RFC 3339 or
    /// naive date-times taken as UTC, and `{hour, minute}` objects are daily
    /// anchors.
    pub fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64))?;
                DateTime::from_timestamp_millis(millis).map(Self::Absolute)
            }
            Value::String(s) => parse_date_time(s).map(Self::Absolute),
            Value::Object(map) => {
                let hour = map.get("hour")?.as_u64()?;
                let minute = map.get("minute")?.as_u64()?;
                Self::daily(u32::try_from(hour).ok()?, u32::try_from(minute).ok()?)
            }
            _ => None,
        }
    }

    /// Parse `<hhmm>` given in `offset` into a UTC daily anchor.
    pub fn parse_hhmm(s: &str, offset: FixedOffset) -> Result<Self, StartTimeError> {
        let err = || StartTimeError::Format(s.to_string());
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let hour: i64 = s[..2].parse().map_err(|_| err())?;
        let minute: i64 = s[2..].parse().map_err(|_| err())?;
        if hour >= 24 || minute >= 60 {
            return Err(err());
        }

        let utc_minutes =
            (hour * 60 + minute - i64::from(offset.local_minus_utc()) / 60).rem_euclid(24 * 60);
        Ok(Self::DailyAnchor {
            hour: (utc_minutes / 60) as u32,
            minute: (utc_minutes % 60) as u32,
        })
    }

    /// The concrete instant this anchor refers to as of `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Absolute(at) => at,
            Self::DailyAnchor { hour, minute } => today_start_time(hour, minute, now),
        }
    }
}

impl<'de> Deserialize<'de> for StartTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_wire(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid start time: {value}")))
    }
}

/// Today's instant at `hour:minute` UTC, or yesterday's if that is still ahead of `now`.
pub fn today_start_time(hour: u32, minute: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    let candidate = now.date_naive().and_time(time).and_utc();
    if candidate > now {
        candidate - Duration::days(1)
    } else {
        candidate
    }
}

fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
