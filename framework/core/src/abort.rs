use std::sync::Arc;

use tokio::sync::watch::{Receiver, Sender};

/// The abort flag shared by a runner and everything it dispatches.
///
/// Setting the flag only stops new iterations from being started. Iterations which are already in
/// flight are left to finish or to hit their own timeout.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    sender: Arc<Sender<bool>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(tokio::sync::watch::channel(false).0),
        }
    }

    /// Request that no further iterations are started. Calling this more than once has no extra
    /// effect.
    pub fn abort(&self) {
        // `send_replace` stores the value even when nobody is subscribed yet, so a listener created
        // after this call still sees the abort.
        let already_aborted = self.sender.send_replace(true);
        if !already_aborted {
            log::info!("Abort requested, no new iterations will be started");
        }
    }

    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> AbortListener {
        AbortListener::new(self.sender.subscribe())
    }
}

#[derive(Debug, Clone)]
pub struct AbortListener {
    receiver: Receiver<bool>,
}

impl AbortListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check of the abort flag. Dispatch loops call this before starting each new
    /// iteration.
    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the abort flag is set. Returns immediately if it is already set.
    ///
    /// It is safe to race this with other work, for example a pacing sleep, so that an abort cuts
    /// the wait short.
    pub async fn wait_for_abort(&mut self) {
        if self.receiver.wait_for(|aborted| *aborted).await.is_err() {
            // Every handle was dropped without aborting, so the flag can never be set now.
            std::future::pending::<()>().await;
        }
    }
}
