#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crosswind_runner::prelude::*;
use serde_json::{json, Value};

/// How long the `hang` scenario blocks for. Long enough to outlive any timeout used in the tests.
pub const HANG_FOR: Duration = Duration::from_secs(2);

pub fn catalog() -> Arc<ScenarioCatalog> {
    Arc::new(
        ScenarioCatalogBuilder::new()
            .add_family(
                ScenarioFamilyBuilder::new("Dummy")
                    .with_validators(["number", "required_positive_int"])
                    .use_method("dummy", |ctx, args| {
                        if let Some(sleep) = args.get("sleep").and_then(Value::as_f64) {
                            std::thread::sleep(Duration::from_secs_f64(sleep));
                        }
                        ctx.atomic_action("dummy.noop", |_| Ok(()))?;
                        Ok(None)
                    })
                    .use_method("failure", |_, _| {
                        Err(ScenarioError::new("ValueError", "boom").into())
                    })
                    .use_method("hang", |_, _| {
                        std::thread::sleep(HANG_FOR);
                        Ok(None)
                    })
                    .use_method("iteration", |ctx, _| {
                        Ok(Some(ScenarioOutput::with_data([(
                            "iteration".to_string(),
                            ctx.iteration() as f64,
                        )])))
                    })
                    .use_method("whoami", |ctx, _| {
                        let user = ctx
                            .user()
                            .and_then(|u| u["n"].as_f64())
                            .ok_or_else(|| anyhow::anyhow!("no user selected"))?;
                        Ok(Some(ScenarioOutput::with_data([("user".to_string(), user)])))
                    }),
            )
            .build(),
    )
}

pub fn task() -> Task {
    Task::new(catalog())
}

pub fn admin_context() -> TaskContext {
    TaskContext::try_from(json!({"admin": {"credential": "admin"}})).unwrap()
}

pub fn args(value: Value) -> ScenarioArgs {
    value.as_object().cloned().unwrap_or_default()
}

pub fn runner(config: Value) -> ScenarioRunner {
    get_runner(task(), config).unwrap()
}

pub fn init_logging() {
    env_logger::try_init().ok();
}
