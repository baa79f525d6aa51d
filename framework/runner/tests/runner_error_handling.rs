mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{admin_context, args, catalog, init_logging, runner};
use crosswind_runner::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

#[test]
fn unknown_scenario_runs_nothing() {
    init_logging();
    let runner = runner(json!({"type": "constant", "times": 3}));

    let err = runner
        .run("Dummy.missing", admin_context(), args(json!({})))
        .unwrap_err();

    assert!(matches!(err, RunnerError::NoSuchScenario { ref name } if name == "Dummy.missing"));
    assert!(runner.drain_results().is_empty());
}

#[test]
fn context_without_admin_is_rejected() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let catalog = Arc::new(
        ScenarioCatalogBuilder::new()
            .add_family(ScenarioFamilyBuilder::new("Counted").use_method("count", move |_, _| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }))
            .build(),
    );
    let runner = get_runner(Task::new(catalog), json!({"type": "serial", "times": 2})).unwrap();
    let context = TaskContext::try_from(json!({"users": []})).unwrap();

    let err = runner.run("Counted.count", context, args(json!({}))).unwrap_err();

    assert!(matches!(err, RunnerError::InvalidContext { .. }));
    assert_eq!(0, calls.load(Ordering::SeqCst));
}

#[test]
fn unknown_user_choice_method_is_rejected() {
    init_logging();
    let runner = runner(json!({"type": "serial"}));
    let context = TaskContext::try_from(json!({
        "admin": {"credential": "admin"},
        "config": {"users": {"user_choice_method": "alphabetical"}},
        "users": [{"credential": "u1", "tenant_id": "t1"}],
    }))
    .unwrap();

    let err = runner.run("Dummy.dummy", context, args(json!({}))).unwrap_err();

    assert!(matches!(err, RunnerError::InvalidContext { .. }));
}

#[test]
fn runner_can_only_run_once() {
    init_logging();
    let runner = runner(json!({"type": "serial", "times": 1}));

    runner
        .run("Dummy.dummy", admin_context(), args(json!({})))
        .unwrap();
    let err = runner
        .run("Dummy.dummy", admin_context(), args(json!({})))
        .unwrap_err();

    assert!(matches!(err, RunnerError::AlreadyRun));
    assert_eq!(RunState::Completed, runner.state());
}

#[test]
fn panicking_scenario_is_captured_per_iteration() {
    init_logging();
    let catalog = Arc::new(
        ScenarioCatalogBuilder::new()
            .add_family(
                ScenarioFamilyBuilder::new("Flaky").use_method("odd_panics", |ctx, _| {
                    if ctx.iteration() % 2 == 1 {
                        panic!("iteration {} went wrong", ctx.iteration());
                    }
                    Ok(None)
                }),
            )
            .build(),
    );
    let runner = get_runner(
        Task::new(catalog),
        json!({"type": "constant", "times": 4, "concurrency": 2}),
    )
    .unwrap();

    let results = runner
        .run("Flaky.odd_panics", admin_context(), args(json!({})))
        .unwrap();

    assert_eq!(4, results.len());
    let panicked = results
        .iter()
        .filter(|r| r.error_kind() == Some("Panic"))
        .count();
    assert_eq!(2, panicked);
    assert_eq!(2, results.iter().filter(|r| !r.is_error()).count());
}

#[test]
fn failing_atomic_action_is_still_recorded() {
    init_logging();
    let catalog = Arc::new(
        ScenarioCatalogBuilder::new()
            .add_family(ScenarioFamilyBuilder::new("Actions").use_method("fails", |ctx, _| {
                ctx.atomic_action("first", |_| Ok(()))?;
                ctx.atomic_action("second", |_| -> anyhow::Result<()> {
                    Err(ScenarioError::new("ConnectionError", "refused").into())
                })?;
                ctx.atomic_action("never", |_| Ok(()))?;
                Ok(None)
            }))
            .build(),
    );
    let runner = get_runner(Task::new(catalog), json!({"type": "serial"})).unwrap();

    let results = runner
        .run("Actions.fails", admin_context(), args(json!({})))
        .unwrap();

    assert_eq!(1, results.len());
    let record = &results[0];
    assert_eq!(Some("ConnectionError"), record.error_kind());
    let names = record
        .atomic_actions
        .iter()
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
    assert_eq!(vec!["first", "second"], names);
}

#[test]
fn family_default_context_is_merged_under_caller_config() {
    init_logging();
    let mut defaults = Map::new();
    defaults.insert(
        "users".to_string(),
        json!({"tenants": 2, "users_per_tenant": 3}),
    );
    let catalog = Arc::new(
        ScenarioCatalogBuilder::new()
            .add_family(
                ScenarioFamilyBuilder::new("Configured")
                    .with_default_context(defaults)
                    .use_method("inspect", |ctx, _| {
                        let context = ctx.context();
                        anyhow::ensure!(
                            context.get("scenario_name") == Some(&json!("Configured.inspect")),
                            "scenario name missing from context"
                        );
                        anyhow::ensure!(
                            context.get("task").map(|t| &t["uuid"]) == Some(&json!("task-123")),
                            "task missing from context"
                        );
                        anyhow::ensure!(ctx.task_uuid() == "task-123", "wrong task uuid");

                        let users = context
                            .config()
                            .map(|c| c["users"].clone())
                            .unwrap_or(Value::Null);
                        Ok(Some(ScenarioOutput::with_data([
                            ("tenants".to_string(), users["tenants"].as_f64().unwrap_or(-1.0)),
                            (
                                "users_per_tenant".to_string(),
                                users["users_per_tenant"].as_f64().unwrap_or(-1.0),
                            ),
                        ])))
                    }),
            )
            .build(),
    );
    let runner = get_runner(Task::with_uuid("task-123", catalog), json!({"type": "serial"})).unwrap();
    let context = TaskContext::try_from(json!({
        "admin": {"credential": "admin"},
        "config": {"users": {"tenants": 5}},
    }))
    .unwrap();

    let results = runner
        .run("Configured.inspect", context, args(json!({})))
        .unwrap();

    assert_eq!(1, results.len());
    assert_eq!(Vec::<String>::new(), results[0].error);
    assert_eq!(5.0, results[0].scenario_output.data["tenants"]);
    assert_eq!(3.0, results[0].scenario_output.data["users_per_tenant"]);
}

#[derive(Debug)]
struct BrokenStrategy;

impl RunnerStrategy for BrokenStrategy {
    fn execution_type(&self) -> &'static str {
        "broken"
    }

    fn execute(&self, runner: &ScenarioRunner, source: IterationSource) -> Result<(), RunnerError> {
        runner.send_result(invoke(source.next_iteration()))?;
        runner.send_result(ResultRecord {
            duration: -1.0,
            ..Default::default()
        })
    }
}

const BROKEN_SCHEMA: ConfigSchema = ConfigSchema {
    properties: &[PropertySchema::string("type")],
    required: &[],
    additional_properties: false,
};

fn build_broken(_: &Value) -> Result<Box<dyn RunnerStrategy>, RunnerError> {
    Ok(Box::new(BrokenStrategy))
}

#[test]
fn invalid_result_from_custom_strategy_fails_the_run() {
    init_logging();
    let mut registry = RunnerRegistry::default();
    registry.register(RunnerPlugin {
        execution_type: "broken",
        config_schema: &BROKEN_SCHEMA,
        check: None,
        build: build_broken,
    });
    let config = json!({"type": "broken"});
    registry.validate_config(&config).unwrap();
    let runner = registry.get_runner(Task::new(catalog()), config).unwrap();

    let err = runner
        .run("Dummy.dummy", admin_context(), args(json!({})))
        .unwrap_err();

    assert!(matches!(err, RunnerError::SchemaValidation(_)));
    assert_eq!(1, runner.drain_results().len());
}

#[test]
fn results_can_be_drained_during_a_run() {
    init_logging();
    let runner = runner(json!({"type": "serial", "times": 5}));
    let queue = runner.results();

    let results = runner
        .run("Dummy.iteration", admin_context(), args(json!({})))
        .unwrap();

    assert_eq!(5, results.len());
    assert!(queue.is_empty());
    assert!(runner.drain_results().is_empty());
}
