//! Shared application state and the group session registry.

use crate::schedule::Schedule;
use crate::start_time::StartTime;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Idle time after which a session is swept (60 minutes).
pub const SESSION_LIFETIME_MINS: i64 = 60;

/// Longest group name accepted, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("The requested name is invalid.")]
    InvalidName,
    #[error("The supplied start time is invalid.")]
    InvalidStartTime,
    #[error("The supplied schedule is invalid.")]
    InvalidSchedule,
    #[error("The requested name is already in use.")]
    NameTaken,
    #[error("The requested pom name does not exist.")]
    NotFound,
}

/// A named schedule shared by every client that connects to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub name: String,
    pub start_time: StartTime,
    pub schedule: Schedule,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_queried: DateTime<Utc>,
}

/// Unvalidated create request, fields exactly as the client sent them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub start_time: Value,
    #[serde(default)]
    pub schedule: Value,
}

impl NewSession {
    /// Check the fields in order, reporting the first one that is invalid.
    fn validate(&self) -> Result<(String, StartTime, Schedule), RegistryError> {
        let name = match &self.name {
            Value::String(s) if !s.is_empty() && s.chars().count() <= MAX_NAME_LEN => s.clone(),
            _ => return Err(RegistryError::InvalidName),
        };

        let start_time =
            StartTime::from_wire(&self.start_time).ok_or(RegistryError::InvalidStartTime)?;

        let schedule = self
            .schedule
            .as_str()
            .and_then(|s| s.parse::<Schedule>().ok())
            .ok_or(RegistryError::InvalidSchedule)?;

        Ok((name, start_time, schedule))
    }
}

/// In-memory store of group sessions.
///
/// Every operation takes the single write lock, so a keep-alive touch and a
/// sweep never interleave on the same session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
            lifetime: Duration::minutes(SESSION_LIFETIME_MINS),
        }
    }

    /// Override the idle lifetime.
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn create(&self, request: NewSession) -> Result<Session, RegistryError> {
        let (name, start_time, schedule) = request.validate()?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&name) {
            return Err(RegistryError::NameTaken);
        }

        let session = Session {
            name: name.clone(),
            start_time,
            schedule,
            last_queried: self.clock.now(),
        };
        sessions.insert(name, session.clone());
        info!(name = %session.name, schedule = %session.schedule, "Created pom");
        Ok(session)
    }

    /// Look up a session, extending its lifetime.
    pub async fn get(&self, name: &str) -> Result<Session, RegistryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(name).ok_or(RegistryError::NotFound)?;
        session.last_queried = self.clock.now();
        Ok(session.clone())
    }

    /// Drop every session idle for longer than the lifetime as of `now`.
    ///
    /// Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|name, session| {
            let keep = now.signed_duration_since(session.last_queried) <= self.lifetime;
            if !keep {
                debug!(name = %name, "Expiring idle pom");
            }
            keep
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}
