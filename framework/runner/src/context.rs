use std::sync::Arc;
use std::time::Duration;

use crosswind_core::prelude::{AtomicActions, TaskContext};
use crosswind_instruments::prelude::{AtomicActionRecorder, IdleTracker};
use serde_json::Value;

/// Client handle built from a credential descriptor in the context.
///
/// The runner does not know how to talk to the system under test. Scenarios use the credential to
/// build whatever clients they need.
#[derive(Debug, Clone)]
pub struct Clients {
    credential: Arc<Value>,
}

impl Clients {
    pub fn new(credential: Arc<Value>) -> Self {
        Self { credential }
    }

    pub fn credential(&self) -> &Value {
        &self.credential
    }
}

/// The scenario instance for one iteration.
///
/// A fresh context is created for every iteration, so nothing recorded here leaks between
/// iterations.
#[derive(Debug)]
pub struct ScenarioContext {
    index: usize,
    task_uuid: Arc<str>,
    context: TaskContext,
    admin_clients: Option<Clients>,
    clients: Option<Clients>,
    idle: IdleTracker,
    atomic_actions: AtomicActionRecorder,
}

impl ScenarioContext {
    pub(crate) fn new(index: usize, task_uuid: Arc<str>, context: TaskContext) -> Self {
        let admin_clients = context.get_shared("admin").map(Clients::new);
        let clients = context.get_shared("user").map(Clients::new);

        Self {
            index,
            task_uuid,
            context,
            admin_clients,
            clients,
            idle: IdleTracker::new(),
            atomic_actions: AtomicActionRecorder::new(),
        }
    }

    /// The iteration number, counting from 1.
    pub fn iteration(&self) -> usize {
        self.index + 1
    }

    pub fn task_uuid(&self) -> &str {
        &self.task_uuid
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub fn admin_clients(&self) -> Option<&Clients> {
        self.admin_clients.as_ref()
    }

    /// Clients for the user selected for this iteration, if the context has users.
    pub fn clients(&self) -> Option<&Clients> {
        self.clients.as_ref()
    }

    pub fn user(&self) -> Option<&Value> {
        self.context.get("user")
    }

    pub fn tenant(&self) -> Option<&Value> {
        self.context.get("tenant")
    }

    /// Sleep for a random time between `min_s` and `max_s` seconds. The time slept is idle time.
    pub fn sleep_between(&mut self, min_s: f64, max_s: f64) -> anyhow::Result<f64> {
        self.idle.sleep_between(min_s, max_s)
    }

    /// Count time the scenario spent waiting by other means as idle time.
    pub fn record_idle(&mut self, idle: Duration) {
        self.idle.add(idle);
    }

    pub fn idle_duration(&self) -> f64 {
        self.idle.total_secs()
    }

    /// Time `f` as a named atomic action.
    ///
    /// The duration is recorded whether or not `f` succeeds.
    pub fn atomic_action<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let action = self.atomic_actions.begin(name);
        let result = f(self);
        self.atomic_actions.finish(action);
        result
    }

    pub fn atomic_actions(&self) -> &AtomicActions {
        self.atomic_actions.actions()
    }

    pub(crate) fn finish(self) -> (Duration, AtomicActions) {
        (self.idle.total(), self.atomic_actions.into_actions())
    }
}
