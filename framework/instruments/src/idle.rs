use std::time::Duration;

use anyhow::bail;
use rand::Rng;

/// Tracks time a scenario deliberately spends waiting, which is excluded from its duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleTracker {
    total: Duration,
}

impl IdleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, idle: Duration) {
        self.total += idle;
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn total_secs(&self) -> f64 {
        self.total.as_secs_f64()
    }

    /// Block the current thread for `duration` and count it as idle time.
    pub fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
        self.add(duration);
    }

    /// Sleep for a random number of seconds in `[min_s, max_s]`, returning the time slept.
    pub fn sleep_between(&mut self, min_s: f64, max_s: f64) -> anyhow::Result<f64> {
        if !(min_s.is_finite() && max_s.is_finite()) || min_s < 0.0 || max_s < min_s {
            bail!("Invalid sleep range [{min_s}, {max_s}]");
        }

        let seconds = if max_s > min_s {
            rand::thread_rng().gen_range(min_s..=max_s)
        } else {
            min_s
        };
        log::debug!("Sleeping for {seconds:.3}s");
        self.sleep(Duration::from_secs_f64(seconds));

        Ok(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_idle_time() {
        let mut idle = IdleTracker::new();
        idle.add(Duration::from_millis(250));
        idle.add(Duration::from_millis(500));

        assert_eq!(0.75, idle.total_secs());
    }

    #[test]
    fn sleep_between_stays_in_range() {
        let mut idle = IdleTracker::new();

        let slept = idle.sleep_between(0.001, 0.003).unwrap();

        assert!((0.001..=0.003).contains(&slept));
        assert!((slept - idle.total_secs()).abs() < 1e-6);
    }

    #[test]
    fn sleep_between_rejects_bad_range() {
        let mut idle = IdleTracker::new();

        assert!(idle.sleep_between(2.0, 1.0).is_err());
        assert!(idle.sleep_between(-1.0, 1.0).is_err());
        assert_eq!(Duration::ZERO, idle.total());
    }
}
