//! Runtime settings for the server and the timer client.

use chrono::{FixedOffset, Local};
use std::net::IpAddr;
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unrecognized timezone '{0}', expected a UTC offset like +02:00 or UTC")]
    Timezone(String),
    #[error("{0} must be at least one minute")]
    ZeroMinutes(&'static str),
    #[error("{0} is too large")]
    OutOfRange(&'static str),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Idle time before a group is swept.
    pub session_lifetime: chrono::Duration,
    pub sweep_interval: Duration,
}

impl ServerConfig {
    pub fn new(
        host: IpAddr,
        port: u16,
        lifetime_mins: u64,
        sweep_mins: u64,
    ) -> Result<Self, ConfigError> {
        if lifetime_mins == 0 {
            return Err(ConfigError::ZeroMinutes("session lifetime"));
        }
        if sweep_mins == 0 {
            return Err(ConfigError::ZeroMinutes("sweep interval"));
        }
        let session_lifetime = i64::try_from(lifetime_mins)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or(ConfigError::OutOfRange("session lifetime"))?;
        let sweep_secs = sweep_mins
            .checked_mul(60)
            .ok_or(ConfigError::OutOfRange("sweep interval"))?;
        Ok(Self {
            host,
            port,
            session_lifetime,
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

/// Settings for `start` and `connect`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub sounds: bool,
    pub notifications: bool,
    /// Offset used to read `--start-time` and to print the clock.
    pub offset: FixedOffset,
}

impl ClientConfig {
    pub fn new(
        server: String,
        no_sounds: bool,
        no_notifications: bool,
        timezone: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let offset = match timezone {
            Some(tz) => parse_offset(tz)?,
            None => local_offset(),
        };
        Ok(Self {
            server,
            sounds: !no_sounds,
            notifications: !no_notifications,
            offset,
        })
    }
}

pub fn local_offset() -> FixedOffset {
    *Local::now().offset()
}

/// Parse `UTC`, `Z`, `+HH`, `+HHMM` or `+HH:MM` (either sign).
pub fn parse_offset(s: &str) -> Result<FixedOffset, ConfigError> {
    let err = || ConfigError::Timezone(s.to_string());
    let trimmed = s.trim();
    if ["utc", "gmt", "z"].contains(&trimmed.to_ascii_lowercase().as_str()) {
        return FixedOffset::east_opt(0).ok_or_else(err);
    }

    let (sign, rest) = if let Some(rest) = trimmed.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = trimmed.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(err());
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) || rest.matches(':').count() > 1 {
        return Err(err());
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().map_err(|_| err())?, 0),
        4 => (
            digits[..2].parse::<i32>().map_err(|_| err())?,
            digits[2..].parse::<i32>().map_err(|_| err())?,
        ),
        _ => return Err(err()),
    };
    if hours > 14 || minutes >= 60 {
        return Err(err());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(err)
}
