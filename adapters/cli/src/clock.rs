use std::{
    thread,
    time::{Duration, Instant},
};

/// Source of the session timeline.
pub(crate) trait Clock {
    /// Time elapsed since the clock started.
    fn now(&self) -> Duration;

    /// Advances to `at`, returning the time reached.
    fn wait_until(&mut self, at: Duration) -> Duration;
}

/// Wall-clock timeline that sleeps between scripted steps.
#[derive(Debug)]
pub(crate) struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub(crate) fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn wait_until(&mut self, at: Duration) -> Duration {
        let now = self.now();
        if at > now {
            thread::sleep(at - now);
        }
        self.now()
    }
}

/// Timeline that jumps straight to each scripted timestamp.
#[derive(Debug, Default)]
pub(crate) struct ScriptedClock {
    now: Duration,
}

impl Clock for ScriptedClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn wait_until(&mut self, at: Duration) -> Duration {
        self.now = self.now.max(at);
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_clock_never_runs_backwards() {
        let mut clock = ScriptedClock::default();
        assert_eq!(clock.wait_until(Duration::from_millis(300)), Duration::from_millis(300));
        assert_eq!(clock.wait_until(Duration::from_millis(100)), Duration::from_millis(300));
        assert_eq!(clock.now(), Duration::from_millis(300));
    }

    #[test]
    fn monotonic_clock_sleeps_until_target() {
        let mut clock = MonotonicClock::start();
        let reached = clock.wait_until(Duration::from_millis(5));
        assert!(reached >= Duration::from_millis(5));
        assert!(clock.now() >= reached);
    }
}
