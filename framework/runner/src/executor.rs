use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use crosswind_core::prelude::ResultRecord;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::invoker::{invoke, Iteration};

/// How long a graceful shutdown waits for worker threads to wind down.
pub(crate) const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns the runtime that a strategy's dispatch loop runs on.
///
/// The dispatch loop runs on the calling thread through [Executor::execute_in_place]. Each
/// iteration gets a thread of its own so that scenario code can block freely, and a hung
/// iteration never holds up the start of another one.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
}

impl Executor {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("crosswind-worker")
            .build()
            .context("Failed to create Tokio runtime")?;

        Ok(Self { runtime })
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Must not be called from within another Tokio runtime.
    pub fn execute_in_place<T>(&self, fut: impl Future<Output = T>) -> T {
        self.runtime.block_on(fut)
    }

    /// Start an iteration on a dedicated thread.
    ///
    /// Dropping the returned receiver detaches the thread, which keeps running until the scenario
    /// returns. Its result is then discarded. If the thread cannot be started the receiver reports
    /// a closed channel.
    pub fn spawn_iteration(&self, iteration: Iteration) -> oneshot::Receiver<ResultRecord> {
        let (sender, receiver) = oneshot::channel();
        let n = iteration.index + 1;

        let spawned = std::thread::Builder::new()
            .name(format!("crosswind-iteration-{n}"))
            .spawn(move || {
                if sender.send(invoke(iteration)).is_err() {
                    log::debug!("Discarding late result of iteration {n}");
                }
            });
        if let Err(e) = spawned {
            log::error!("Could not start a thread for iteration {n}: {e:?}");
        }

        receiver
    }

    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.runtime.spawn_blocking(f)
    }

    /// Tear down the runtime.
    ///
    /// A graceful shutdown waits up to [TEARDOWN_GRACE] for blocking work to finish. Otherwise
    /// work that is still running is abandoned, which is what should happen after an abort or when
    /// an iteration timed out and may never return.
    pub fn shutdown(self, graceful: bool) {
        if graceful {
            log::debug!("Shutting down executor");
            self.runtime.shutdown_timeout(TEARDOWN_GRACE);
        } else {
            log::warn!("Abandoning workers that are still running");
            self.runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_work_runs_off_the_calling_thread() {
        let executor = Executor::new().unwrap();
        let caller = std::thread::current().id();

        let worker = executor
            .execute_in_place(executor.spawn_blocking(|| std::thread::current().id()))
            .unwrap();

        assert_ne!(caller, worker);
        executor.shutdown(true);
    }

    #[test]
    fn hung_worker_does_not_block_teardown() {
        let executor = Executor::new().unwrap();
        let _detached = executor.spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));

        let started = std::time::Instant::now();
        executor.shutdown(false);

        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
