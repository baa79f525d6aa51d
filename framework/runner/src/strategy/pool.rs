use std::time::Duration;

use crosswind_core::prelude::{ResultRecord, RunnerError};
use futures::stream::{FuturesUnordered, StreamExt};

use crate::executor::Executor;
use crate::invoker::IterationSource;
use crate::runner::ScenarioRunner;

/// Keep up to `concurrency` iterations in flight until `should_dispatch` says stop or the runner is
/// aborted, forwarding results in completion order.
///
/// `should_dispatch` gets the number of iterations dispatched so far. Each iteration is waited on
/// for at most `timeout`. An iteration that takes longer is recorded as a timeout and its worker is
/// left to finish on its own, so it no longer holds a slot.
pub(crate) fn run_pool(
    runner: &ScenarioRunner,
    source: &IterationSource,
    concurrency: usize,
    timeout: Duration,
    mut should_dispatch: impl FnMut(usize) -> bool,
) -> Result<(), RunnerError> {
    let executor = Executor::new()?;
    let abort = runner.abort_listener();
    let timeout_s = timeout.as_secs_f64();
    let mut timed_out = 0usize;

    let outcome = executor.execute_in_place(async {
        let mut in_flight = FuturesUnordered::new();
        let mut dispatched = 0usize;

        loop {
            while in_flight.len() < concurrency
                && !abort.is_aborted()
                && should_dispatch(dispatched)
            {
                let iteration = source.next_iteration();
                let index = iteration.index;
                let handle = executor.spawn_iteration(iteration);
                in_flight.push(async move { (index, tokio::time::timeout(timeout, handle).await) });
                dispatched += 1;
            }

            let Some((index, joined)) = in_flight.next().await else {
                break;
            };

            let record = match joined {
                Ok(Ok(record)) => record,
                Ok(Err(e)) => {
                    log::error!("Worker for iteration {} failed: {e:?}", index + 1);
                    ResultRecord::from_failure(&anyhow::Error::new(e))
                }
                Err(_) => {
                    timed_out += 1;
                    log::warn!(
                        "Iteration {} did not finish within {timeout_s}s, recording a timeout",
                        index + 1
                    );
                    ResultRecord::on_timeout(index, timeout_s)
                }
            };
            runner.send_result(record)?;
        }

        log::debug!("Dispatched {dispatched} iterations");
        Ok::<_, RunnerError>(())
    });

    executor.shutdown(timed_out == 0 && !abort.is_aborted());

    outcome
}
