use crate::models::ProgressSettings;
use std::time::Duration;

/// Synthetic progress for a request whose real progress is unknown.
///
/// Ticking advances `step_percent` per `tick_interval` of time spent in the
/// current attempt, starting from wherever earlier attempts of the same
/// submission left off, and stops at `cap_percent`. Only [`complete`] reaches
/// 100.
///
/// [`complete`]: ProgressEstimator::complete
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    cap: u8,
    step: u8,
    interval: Duration,
    base: u8,
    current: u8,
}

impl ProgressEstimator {
    pub fn new(settings: &ProgressSettings) -> Self {
        Self {
            cap: settings.cap_percent.min(99),
            step: settings.step_percent,
            interval: settings.tick_interval(),
            base: 0,
            current: 0,
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn tick_interval(&self) -> Duration {
        self.interval
    }

    /// Mark the start of an attempt; ticks measure time from here.
    pub fn begin_attempt(&mut self) {
        self.base = self.current;
    }

    /// Progress after `elapsed_in_phase` of the current attempt.
    pub fn tick(&mut self, elapsed_in_phase: Duration) -> u8 {
        if self.current >= 100 {
            return self.current;
        }

        let steps = if self.interval.is_zero() {
            0
        } else {
            elapsed_in_phase.as_millis() / self.interval.as_millis().max(1)
        };
        let advanced = (self.base as u128)
            .saturating_add(steps.saturating_mul(self.step as u128))
            .min(self.cap as u128) as u8;

        self.current = self.current.max(advanced);
        self.current
    }

    pub fn complete(&mut self) -> u8 {
        self.current = 100;
        self.current
    }

    pub fn reset(&mut self) {
        self.base = 0;
        self.current = 0;
    }
}
