mod results;

pub use results::{load_results, store_results, JsonlError};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha3::Digest;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// Summary of a completed scenario run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The uuid of the task the run belongs to
    pub task_uuid: String,
    /// The `Family.method` name of the scenario that was run
    pub scenario_name: String,
    /// The execution type of the runner strategy, such as `constant` or `rps`
    pub runner_type: String,
    /// The runner config the run was started with
    pub runner_config: Value,
    /// The arguments passed to every iteration of the scenario
    pub scenario_args: Value,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// Wall clock duration of the run, in seconds
    pub run_duration: f64,
    /// The number of iterations that produced a result
    pub iterations: usize,
    /// The number of iterations whose result carries an error, including timeouts
    pub failed_iterations: usize,
    /// Whether the run was aborted before all iterations were started
    pub aborted: bool,
    /// The version of Crosswind that was used for this run
    pub crosswind_version: String,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        task_uuid: String,
        scenario_name: String,
        runner_type: String,
        started_at: i64,
        crosswind_version: String,
    ) -> Self {
        Self {
            run_id,
            task_uuid,
            scenario_name,
            runner_type,
            runner_config: Value::Object(Default::default()),
            scenario_args: Value::Object(Default::default()),
            started_at,
            run_duration: 0.0,
            iterations: 0,
            failed_iterations: 0,
            aborted: false,
            crosswind_version,
        }
    }

    pub fn with_runner_config(mut self, runner_config: Value) -> Self {
        self.runner_config = runner_config;
        self
    }

    pub fn with_scenario_args(mut self, scenario_args: Value) -> Self {
        self.scenario_args = scenario_args;
        self
    }

    /// Record how the run went
    pub fn set_outcome(
        &mut self,
        run_duration: f64,
        iterations: usize,
        failed_iterations: usize,
        aborted: bool,
    ) {
        self.run_duration = run_duration;
        self.iterations = iterations;
        self.failed_iterations = failed_iterations;
        self.aborted = aborted;
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Runner type
    ///     - Runner config
    ///     - Scenario arguments
    ///     - Crosswind version
    ///
    /// Object keys are hashed in sorted order so the fingerprint does not depend on how the config
    /// was written. The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.runner_type.as_bytes());
        hash_value(&mut hasher, &self.runner_config);
        hash_value(&mut hasher, &self.scenario_args);
        Digest::update(&mut hasher, self.crosswind_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

fn hash_value(hasher: &mut sha3::Sha3_256, value: &Value) {
    match value {
        Value::Object(map) => {
            Digest::update(&mut *hasher, b"{");
            map.iter()
                .sorted_by_key(|(k, _)| k.to_owned())
                .for_each(|(k, v)| {
                    Digest::update(&mut *hasher, k.as_bytes());
                    hash_value(hasher, v);
                });
            Digest::update(&mut *hasher, b"}");
        }
        Value::Array(items) => {
            Digest::update(&mut *hasher, b"[");
            items.iter().for_each(|v| hash_value(hasher, v));
            Digest::update(&mut *hasher, b"]");
        }
        other => Digest::update(&mut *hasher, other.to_string().as_bytes()),
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: impl AsRef<Path>) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn summary(run_id: &str) -> RunSummary {
        RunSummary::new(
            run_id.to_string(),
            "task-1".to_string(),
            "Dummy.dummy".to_string(),
            "constant".to_string(),
            1_700_000_000,
            "0.1.0".to_string(),
        )
        .with_runner_config(json!({"type": "constant", "times": 4, "concurrency": 2}))
        .with_scenario_args(json!({"sleep": 0.1}))
    }

    #[test]
    fn fingerprint_ignores_run_specific_fields() {
        let first = summary("a");
        let mut second = summary("b");
        second.started_at += 60;
        second.set_outcome(3.5, 4, 1, false);

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let first = summary("a");
        let second = summary("a")
            .with_runner_config(json!({"concurrency": 2, "times": 4, "type": "constant"}));

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_config() {
        let first = summary("a");
        let second = summary("a").with_runner_config(json!({"type": "constant", "times": 5}));

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn append_and_load_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.jsonl");

        let mut first = summary("a");
        first.set_outcome(1.25, 4, 0, false);
        let second = summary("b");
        append_run_summary(&first, &path).unwrap();
        append_run_summary(&second, &path).unwrap();

        let loaded = load_summary_runs(&path).unwrap();

        assert_eq!(vec![first, second], loaded);
    }

    #[test]
    fn store_and_load_single_summary() {
        let mut buf = Vec::new();
        store_run_summary(&summary("a"), &mut buf).unwrap();

        let loaded = load_run_summary(buf.as_slice()).unwrap();

        assert_eq!(summary("a"), loaded);
    }
}
