//! Pomodoro schedules and the phase engine.
//!
//! A schedule is a list of phase durations in minutes. Even positions are
//! work phases and odd positions are breaks. The list repeats forever and
//! every repetition starts with work, so a schedule of odd length does not
//! flip parity from one cycle to the next.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The classic four-pomodoro day block.
pub const DEFAULT_SCHEDULE: &str = "25-5-25-5-25-5-25-35";

/// Longest textual schedule accepted.
pub const MAX_SCHEDULE_LEN: usize = 64;

static SCHEDULE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+(-\d+)*$").unwrap_or_else(|e| panic!("Invalid schedule regex: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule is longer than {} characters", MAX_SCHEDULE_LEN)]
    TooLong,
    #[error("schedule must be dash-separated minutes, e.g. {}", DEFAULT_SCHEDULE)]
    Malformed,
    #[error("phase {0} has no duration")]
    ZeroDuration(usize),
    #[error("phase {0} is too long")]
    Overflow(usize),
}

/// Validated, non-empty list of phase durations in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Schedule {
    phases: Vec<u32>,
}

impl Schedule {
    /// Build a schedule from durations, rejecting empty lists and zero phases.
    pub fn new(phases: Vec<u32>) -> Result<Self, ScheduleError> {
        if phases.is_empty() {
            return Err(ScheduleError::Malformed);
        }
        if let Some(index) = phases.iter().position(|&p| p == 0) {
            return Err(ScheduleError::ZeroDuration(index));
        }
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[u32] {
        &self.phases
    }

    /// Total minutes in one full cycle.
    pub fn cycle_minutes(&self) -> u64 {
        self.phases.iter().map(|&p| u64::from(p)).sum()
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            phases: vec![25, 5, 25, 5, 25, 5, 25, 35],
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_SCHEDULE_LEN {
            return Err(ScheduleError::TooLong);
        }
        if !SCHEDULE_PATTERN.is_match(s) {
            return Err(ScheduleError::Malformed);
        }
        let phases = s
            .split('-')
            .enumerate()
            .map(|(i, part)| part.parse::<u32>().map_err(|_| ScheduleError::Overflow(i)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(phases)
    }
}

impl TryFrom<String> for Schedule {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.phases.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("-"))
    }
}

/// Where in the schedule a given instant falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseState {
    pub is_working: bool,
    /// Whole minutes already spent in the current phase.
    pub time_passed: u32,
    /// Length of the current phase in minutes.
    pub session_length: u32,
    /// Position of the current phase in the schedule.
    pub index: usize,
}

impl PhaseState {
    pub fn time_left(&self) -> u32 {
        self.session_length - self.time_passed
    }
}

/// Compute the phase that `now` falls into for a schedule started at `start`.
///
/// An instant before `start` reports the first phase with nothing elapsed.
pub fn compute_state(start: DateTime<Utc>, schedule: &Schedule, now: DateTime<Utc>) -> PhaseState {
    let phases = schedule.phases();
    let elapsed = now.signed_duration_since(start);
    if elapsed.num_seconds() < 0 {
        return PhaseState {
            is_working: true,
            time_passed: 0,
            session_length: phases[0],
            index: 0,
        };
    }

    // Every cycle restarts with work, so whole cycles can be dropped up front.
    let mut delta = elapsed.num_minutes().unsigned_abs() % schedule.cycle_minutes();
    let mut index = 0;
    let mut is_working = true;

    loop {
        if index == 0 {
            is_working = true;
        }
        let length = u64::from(phases[index]);
        if delta < length {
            return PhaseState {
                is_working,
                time_passed: delta as u32,
                session_length: phases[index],
                index,
            };
        }
        delta -= length;
        is_working = !is_working;
        index = (index + 1) % phases.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn at(schedule: &Schedule, minutes: i64) -> PhaseState {
        compute_state(start(), schedule, start() + Duration::minutes(minutes))
    }

    #[test]
    fn test_parse_default_schedule() {
        let schedule: Schedule = DEFAULT_SCHEDULE.parse().unwrap();
        assert_eq!(schedule, Schedule::default());
        assert_eq!(schedule.cycle_minutes(), 150);
        assert_eq!(schedule.to_string(), DEFAULT_SCHEDULE);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!("25-5-".parse::<Schedule>(), Err(ScheduleError::Malformed));
        assert_eq!("-25".parse::<Schedule>(), Err(ScheduleError::Malformed));
        assert_eq!("25--5".parse::<Schedule>(), Err(ScheduleError::Malformed));
        assert_eq!("".parse::<Schedule>(), Err(ScheduleError::Malformed));
        assert_eq!("25 5".parse::<Schedule>(), Err(ScheduleError::Malformed));
        assert_eq!("25-0-5".parse::<Schedule>(), Err(ScheduleError::ZeroDuration(1)));
        assert_eq!("99999999999".parse::<Schedule>(), Err(ScheduleError::Overflow(0)));
        assert!("25-5-25".parse::<Schedule>().is_ok());
    }

    #[test]
    fn test_parse_rejects_long_schedule() {
        let long = vec!["1"; 33].join("-");
        assert_eq!(long.len(), 65);
        assert_eq!(long.parse::<Schedule>(), Err(ScheduleError::TooLong));
    }

    #[test]
    fn test_uneven_day_schedule() {
        let schedule = Schedule::default();
        assert_eq!(
            at(&schedule, 0),
            PhaseState { is_working: true, time_passed: 0, session_length: 25, index: 0 }
        );
        assert_eq!(
            at(&schedule, 149),
            PhaseState { is_working: false, time_passed: 34, session_length: 35, index: 7 }
        );
        assert_eq!(
            at(&schedule, 150),
            PhaseState { is_working: true, time_passed: 0, session_length: 25, index: 0 }
        );
    }

    #[test]
    fn test_cycle_restarts_with_work() {
        let schedule = Schedule::new(vec![25, 5]).unwrap();
        let state = at(&schedule, 25);
        assert!(!state.is_working);
        assert_eq!(state.session_length, 5);

        let state = at(&schedule, 30);
        assert!(state.is_working);
        assert_eq!(state.time_passed, 0);
    }

    #[test]
    fn test_odd_length_schedule_resets_parity() {
        // 10 work, 5 break, 20 work, then wrap straight into 10 work again
        let schedule = Schedule::new(vec![10, 5, 20]).unwrap();
        let last = at(&schedule, 34);
        assert!(last.is_working);
        assert_eq!(last.index, 2);

        let wrapped = at(&schedule, 35);
        assert!(wrapped.is_working);
        assert_eq!(wrapped.index, 0);
        assert!(!at(&schedule, 45).is_working);
    }

    #[test]
    fn test_state_matches_cumulative_durations() {
        for text in ["25-5", "10-5-20", "1", "50-10-50-10-50-30", "3-1-4-1-5-9-2-6"] {
            let schedule: Schedule = text.parse().unwrap();
            let cycle = schedule.cycle_minutes() as i64;
            for minute in 0..cycle * 3 {
                let state = at(&schedule, minute);
                assert!(state.time_passed < state.session_length, "{text} @ {minute}");

                let mut offset = minute % cycle;
                let mut expected = 0;
                while offset >= i64::from(schedule.phases()[expected]) {
                    offset -= i64::from(schedule.phases()[expected]);
                    expected += 1;
                }
                assert_eq!(state.index, expected, "{text} @ {minute}");
                assert_eq!(state.session_length, schedule.phases()[expected]);
                assert_eq!(i64::from(state.time_passed), offset);
                assert_eq!(state.is_working, expected % 2 == 0);
            }
        }
    }

    #[test]
    fn test_partial_minutes_round_down() {
        let schedule = Schedule::new(vec![25, 5]).unwrap();
        let now = start() + Duration::seconds(24 * 60 + 59);
        let state = compute_state(start(), &schedule, now);
        assert_eq!(state.time_passed, 24);
        assert_eq!(state.time_left(), 1);
    }

    #[test]
    fn test_before_start_reports_first_phase() {
        let schedule = Schedule::default();
        let state = compute_state(start(), &schedule, start() - Duration::minutes(90));
        assert_eq!(
            state,
            PhaseState { is_working: true, time_passed: 0, session_length: 25, index: 0 }
        );
        let state = compute_state(start(), &schedule, start() - Duration::seconds(10));
        assert_eq!(state.time_passed, 0);
    }

    #[test]
    fn test_far_future_is_bounded() {
        let schedule = Schedule::new(vec![1, 1]).unwrap();
        let state = at(&schedule, 10_000_001);
        assert!(!state.is_working);
        assert_eq!(state.index, 1);
    }

    #[test]
    fn test_serde_as_string() {
        let schedule: Schedule = "25-5-25".parse().unwrap();
        let json = serde_json::to_string(&schedule).unwrap();
        assert_eq!(json, "\"25-5-25\"");
        let back: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schedule);
        assert!(serde_json::from_str::<Schedule>("\"25-\"").is_err());
    }
}
