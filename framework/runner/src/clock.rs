use std::fmt::Debug;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;

/// Source of time for strategies that pace themselves.
///
/// Runners use [SystemClock] unless another clock is set with
/// [crate::prelude::ScenarioRunner::with_clock], which lets tests skip real waits.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}
