use crosswind_core::prelude::AtomicActions;

use crate::Timer;

/// A started atomic action. Hand it back to [AtomicActionRecorder::finish] to record its duration.
#[derive(Debug)]
pub struct ActionTimer {
    name: String,
    timer: Timer,
}

impl ActionTimer {
    /// The name the action was registered under, which may carry a ` (n)` suffix.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Records the durations of the named sub-actions of one scenario iteration.
///
/// Actions are kept in the order they were started. Starting an action with a name that is already
/// taken registers it as `name (2)`, `name (3)` and so on.
#[derive(Debug, Default)]
pub struct AtomicActionRecorder {
    actions: AtomicActions,
}

impl AtomicActionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, name: &str) -> ActionTimer {
        let name = self.unique_name(name);
        self.actions.insert(name.clone(), 0.0);
        log::trace!("Atomic action started: {name}");

        ActionTimer {
            name,
            timer: Timer::start(),
        }
    }

    pub fn finish(&mut self, action: ActionTimer) -> f64 {
        let duration = action.timer.elapsed_secs();
        log::trace!("Atomic action {} took {duration:.3}s", action.name);
        self.actions.insert(action.name, duration);
        duration
    }

    pub fn actions(&self) -> &AtomicActions {
        &self.actions
    }

    pub fn into_actions(self) -> AtomicActions {
        self.actions
    }

    fn unique_name(&self, name: &str) -> String {
        if !self.actions.contains(name) {
            return name.to_string();
        }

        (2..)
            .map(|n| format!("{name} ({n})"))
            .find(|candidate| !self.actions.contains(candidate))
            .unwrap_or_else(|| name.to_string())
    }
}
