/// Per-habit countdown driven by a one-second tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Finished,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    total: u32,
    remaining: u32,
    state: TimerState,
}

impl Countdown {
    pub fn from_minutes(minutes: u32) -> Self {
        let total = minutes.saturating_mul(60);
        Self {
            total,
            remaining: total,
            state: TimerState::Idle,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// Start, pause or resume. A completed countdown restarts from the top.
    pub fn toggle(&mut self) {
        self.state = match self.state {
            TimerState::Idle | TimerState::Paused => TimerState::Running,
            TimerState::Running => TimerState::Paused,
            TimerState::Completed => {
                self.remaining = self.total;
                TimerState::Running
            }
        };
    }

    /// Advance one second. `Finished` is reported once, on the tick that
    /// reaches zero.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Continue;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = TimerState::Completed;
            return TickOutcome::Finished;
        }
        TickOutcome::Continue
    }

    pub fn reset(&mut self) {
        self.remaining = self.total;
        self.state = TimerState::Idle;
    }

    /// Fraction of the duration already elapsed.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        1.0 - f64::from(self.remaining) / f64::from(self.total)
    }

    /// `MM:SS`
    pub fn display(&self) -> String {
        format!("{:02}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}
