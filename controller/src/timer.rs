use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerMode {
    #[serde(rename = "stopwatch")]
    Stopwatch,
    #[serde(rename = "timer")]
    Countdown,
}

impl Default for TimerMode {
    fn default() -> Self {
        TimerMode::Stopwatch
    }
}

/// Bathing-session timer. Purely informational; never touches the heater.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTimer {
    pub mode: TimerMode,
    pub running: bool,
    pub started_at: Option<DateTime<Local>>,
    /// Time accumulated over all completed run segments.
    pub elapsed: Duration,
    /// Countdown length; ignored in stopwatch mode.
    pub duration: Option<Duration>,
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self {
            mode: TimerMode::Stopwatch,
            running: false,
            started_at: None,
            elapsed: Duration::zero(),
            duration: None,
        }
    }
}

impl SessionTimer {
    pub fn start(&mut self, now: DateTime<Local>) {
        if !self.running {
            self.running = true;
            self.started_at = Some(now);
        }
    }

    pub fn stop(&mut self, now: DateTime<Local>) {
        if self.running {
            if let Some(since) = self.started_at {
                self.elapsed = self.elapsed + span(since, now);
            }
        }
        self.running = false;
        self.started_at = None;
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.started_at = None;
        self.elapsed = Duration::zero();
    }

    /// Switching mode discards any accumulated time.
    pub fn set_mode(&mut self, mode: TimerMode) {
        if self.mode != mode {
            self.mode = mode;
            self.reset();
        }
    }

    pub fn set_duration(&mut self, duration: Option<Duration>) {
        self.duration = duration;
    }

    /// Fold the time since the last accrual into `elapsed`. Called once per
    /// control poll. Returns true when a countdown just ran out and the
    /// timer stopped itself.
    pub fn accrue(&mut self, now: DateTime<Local>) -> bool {
        if !self.running {
            return false;
        }
        let since = match self.started_at {
            Some(since) => since,
            None => return false,
        };
        self.elapsed = self.elapsed + span(since, now);
        self.started_at = Some(now);

        if self.mode == TimerMode::Countdown {
            if let Some(limit) = self.duration {
                if self.elapsed >= limit {
                    self.elapsed = limit;
                    self.running = false;
                    self.started_at = None;
                    return true;
                }
            }
        }
        false
    }

    pub fn current_elapsed(&self, now: DateTime<Local>) -> Duration {
        match (self.running, self.started_at) {
            (true, Some(since)) => self.elapsed + span(since, now),
            _ => self.elapsed,
        }
    }

    /// What the display shows: elapsed time for a stopwatch, remaining time
    /// for a countdown. A countdown without a duration counts up.
    pub fn display_value(&self, now: DateTime<Local>) -> Duration {
        let elapsed = self.current_elapsed(now);
        match (self.mode, self.duration) {
            (TimerMode::Countdown, Some(limit)) => (limit - elapsed).max(Duration::zero()),
            _ => elapsed,
        }
    }
}

// Clock steps backwards must not shrink the accumulator.
fn span(from: DateTime<Local>, to: DateTime<Local>) -> Duration {
    to.signed_duration_since(from).max(Duration::zero())
}
