use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::result::ResultRecord;

/// Unbounded FIFO of completed iteration results, shared between a runner and its consumers.
///
/// Cloning gives another handle to the same queue, so results can be drained while a run is still
/// pushing new ones.
#[derive(Debug, Clone, Default)]
pub struct ResultQueue {
    inner: Arc<Mutex<VecDeque<ResultRecord>>>,
}

impl ResultQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ResultRecord) {
        self.inner.lock().push_back(record);
    }

    /// Take everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<ResultRecord> {
        self.inner.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(duration: f64) -> ResultRecord {
        ResultRecord {
            duration,
            ..Default::default()
        }
    }

    #[test]
    fn drains_in_push_order() {
        let queue = ResultQueue::new();
        queue.push(record(1.0));
        queue.push(record(2.0));

        let drained = queue.drain();

        assert_eq!(vec![1.0, 2.0], drained.iter().map(|r| r.duration).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_pushes_are_all_kept() {
        let queue = ResultQueue::new();

        std::thread::scope(|s| {
            for t in 0..4 {
                let queue = queue.clone();
                s.spawn(move || {
                    for i in 0..25 {
                        queue.push(record((t * 25 + i) as f64));
                    }
                });
            }
        });

        assert_eq!(100, queue.len());
    }
}
