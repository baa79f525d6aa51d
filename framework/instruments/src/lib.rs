mod atomic;
mod idle;

pub use atomic::{ActionTimer, AtomicActionRecorder};
pub use idle::IdleTracker;

use std::time::{Duration, Instant};

pub mod prelude {
    pub use crate::{ActionTimer, AtomicActionRecorder, IdleTracker, Timer};
}

/// Wall clock timer for a single operation.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

impl Timer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}
