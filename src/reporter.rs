//! Once-a-second timer loop: phase tracking, transition alerts and the
//! terminal progress line.

use crate::schedule::{compute_state, PhaseState, Schedule};
use crate::start_time::StartTime;
use crate::state::Clock;
use chrono::{DateTime, FixedOffset, Utc};
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    WorkFinished,
    BreakFinished,
}

pub trait NotificationSink: Send {
    fn notify(&self, title: &str, message: &str);
}

pub trait SoundSink: Send {
    fn play(&self, sound: Sound);
}

/// Prints notifications above the progress line.
pub struct TerminalNotifier;

impl NotificationSink for TerminalNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!(title, "{message}");
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "\r\x1b[2K{} {}", title.bold(), message);
        let _ = out.flush();
    }
}

/// Rings the terminal bell: once after work, twice after a break.
pub struct TerminalBell;

impl SoundSink for TerminalBell {
    fn play(&self, sound: Sound) {
        let rings = match sound {
            Sound::WorkFinished => "\x07",
            Sound::BreakFinished => "\x07\x07",
        };
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(rings.as_bytes());
        let _ = out.flush();
    }
}

/// Sink for disabled alerts.
pub struct Silent;

impl NotificationSink for Silent {
    fn notify(&self, _title: &str, _message: &str) {}
}

impl SoundSink for Silent {
    fn play(&self, _sound: Sound) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Work ended; carries the length of the break that started.
    WorkFinished { break_minutes: u32 },
    /// A break ended; carries the length of the work phase that started.
    BreakFinished { work_minutes: u32 },
}

impl Transition {
    fn between(was_working: bool, state: &PhaseState) -> Option<Self> {
        match (was_working, state.is_working) {
            (true, false) => Some(Self::WorkFinished { break_minutes: state.session_length }),
            (false, true) => Some(Self::BreakFinished { work_minutes: state.session_length }),
            _ => None,
        }
    }

    pub fn sound(&self) -> Sound {
        match self {
            Self::WorkFinished { .. } => Sound::WorkFinished,
            Self::BreakFinished { .. } => Sound::BreakFinished,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::WorkFinished { .. } => "Work done",
            Self::BreakFinished { .. } => "Back to work",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::WorkFinished { break_minutes } => format!("Take a {break_minutes} minute break."),
            Self::BreakFinished { work_minutes } => {
                format!("{work_minutes} minute work session started.")
            }
        }
    }
}

/// Tracks one schedule and fires alerts when the phase kind changes.
///
/// `tick` expects non-decreasing instants. The first tick compares against
/// work, so joining a group during a break announces that break.
pub struct Reporter {
    start_time: StartTime,
    schedule: Schedule,
    was_working: bool,
    notifier: Box<dyn NotificationSink>,
    sound: Box<dyn SoundSink>,
}

impl Reporter {
    pub fn new(
        start_time: StartTime,
        schedule: Schedule,
        notifier: Box<dyn NotificationSink>,
        sound: Box<dyn SoundSink>,
    ) -> Self {
        Self {
            start_time,
            schedule,
            was_working: true,
            notifier,
            sound,
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> (PhaseState, Option<Transition>) {
        let start = self.start_time.resolve(now);
        let state = compute_state(start, &self.schedule, now);

        let transition = Transition::between(self.was_working, &state);
        if let Some(transition) = transition {
            self.sound.play(transition.sound());
            self.notifier.notify(transition.title(), &transition.message());
        }
        self.was_working = state.is_working;
        (state, transition)
    }

    /// Tick forever, redrawing the progress line in place.
    pub async fn run(mut self, clock: Arc<dyn Clock>, offset: FixedOffset) {
        let mut interval = interval(TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let now = clock.now();
            let (state, _) = self.tick(now);
            let line = render_line(&state, now.with_timezone(&offset));

            let mut out = std::io::stdout().lock();
            let _ = write!(out, "\r\x1b[2K{line}");
            let _ = out.flush();
        }
    }
}

/// One-line progress display: clock, phase, bar and minutes left.
pub fn render_line(state: &PhaseState, local_now: DateTime<FixedOffset>) -> String {
    let filled = "■".repeat(state.time_passed as usize);
    let bar = format!("{filled:<width$}", width = state.session_length as usize);
    let clock = local_now.format("%H:%M:%S").to_string();

    let (label, open, close) = if state.is_working {
        (" work ".blue(), "[".blue(), "] ".blue())
    } else {
        (" break ".green(), "[".green(), "] ".green())
    };
    format!(
        "{}{label}{open}{bar}{close}{} minutes left.",
        clock.cyan(),
        state.time_left()
    )
}
