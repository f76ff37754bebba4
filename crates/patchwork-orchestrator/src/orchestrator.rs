//! The calculation pipeline
//!
//! One job runs: fetch the context, write the inputs, run the command,
//! collect what changed and upload it. Any failure before the upload aborts
//! the job without uploading anything. A command that fails or times out is
//! not a pipeline failure; its diagnostics travel in the uploaded response.

use patchwork_agent::Coordinator;
use patchwork_core::{fail_open, CalculationResponse, Result};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{info, instrument, warn};

use crate::package::package;
use crate::runner;
use crate::workspace::materialize;

/// Everything needed to run one calculation
#[derive(Debug, Clone)]
pub struct CalculationJob {
    /// Shell command line executed in `work_dir`
    pub command: String,
    /// Calculation identifier as known to the coordinator
    pub calculation: String,
    /// Directory inputs are written to and outputs are collected from
    pub work_dir: PathBuf,
    /// Deadline for the command
    pub timeout: Duration,
    /// Also post the raw command output to the coordinator's log endpoint
    pub submit_logs: bool,
}

impl CalculationJob {
    pub fn new(
        command: impl Into<String>,
        calculation: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: command.into(),
            calculation: calculation.into(),
            work_dir: work_dir.into(),
            timeout: Duration::from_secs(3600),
            submit_logs: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_submit_logs(mut self, submit_logs: bool) -> Self {
        self.submit_logs = submit_logs;
        self
    }
}

/// Run one calculation end to end and return the uploaded response
#[instrument(skip_all, fields(calculation = %job.calculation))]
pub async fn run_calculation<C>(coordinator: &C, job: &CalculationJob) -> Result<CalculationResponse>
where
    C: Coordinator + ?Sized,
{
    info!("Fetching calculation context");
    let context = coordinator.fetch_context(&job.calculation).await?;
    info!(
        "Context for {} owned by {:?} has {} inputs",
        context.id,
        context.owner,
        context.inputs.len()
    );

    let written = materialize(&job.work_dir, &context).await?;
    info!(
        "Wrote {} input files to {}",
        written.len(),
        job.work_dir.display()
    );

    let since = SystemTime::now();
    info!("Running {}", job.command);
    let output = runner::run(&job.command, &job.work_dir, job.timeout).await?;
    if output.timed_out {
        warn!("Command timed out after {}s", job.timeout.as_secs());
    }

    if job.submit_logs {
        let text = output.combined();
        fail_open("log submission", || {
            coordinator.submit_logs(&job.calculation, &text)
        })
        .await;
    }

    let response = package(&job.work_dir, since, &output.stdout, &output.stderr).await?;
    info!(
        outputs = response.outputs.len(),
        logs = response.logs.len(),
        errors = response.errors.len(),
        "Uploading result"
    );

    coordinator
        .submit_result(&job.calculation, &response)
        .await?;
    info!("Calculation complete");

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_agent::MockCoordinator;
    use patchwork_core::{CalcError, CalcValue, CalculationContext};
    use serde_json::json;
    use tempfile::TempDir;

    fn context(inputs: serde_json::Value) -> CalculationContext {
        serde_json::from_value(json!({ "inputs": inputs })).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_command_uploads_new_output_only() {
        let dir = TempDir::new().unwrap();
        let coordinator = MockCoordinator::new().with_context("c1", context(json!({"a": 5})));
        let job = CalculationJob::new("sleep 0.1 && cp a.json b.json", "c1", dir.path());

        let response = run_calculation(&coordinator, &job).await.unwrap();

        assert_eq!(response.outputs.len(), 1);
        assert_eq!(response.outputs["b"], CalcValue::Json(json!(5)));
        assert!(response.logs.is_empty());
        assert!(response.errors.is_empty());

        let submitted = coordinator.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, "c1");
        assert_eq!(submitted[0].1, response);
    }

    #[tokio::test]
    async fn test_unknown_calculation_aborts_before_anything_runs() {
        let dir = TempDir::new().unwrap();
        let coordinator = MockCoordinator::new();
        let job = CalculationJob::new("touch ran.txt", "missing", dir.path());

        let err = run_calculation(&coordinator, &job).await.unwrap_err();

        assert!(matches!(err, CalcError::Protocol { status: 404, .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(coordinator.submitted().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_command_still_uploads() {
        let dir = TempDir::new().unwrap();
        let coordinator = MockCoordinator::new().with_context("slow", context(json!({})));
        let job = CalculationJob::new("echo started; exec sleep 30", "slow", dir.path())
            .with_timeout(Duration::from_secs(1));

        let response = run_calculation(&coordinator, &job).await.unwrap();

        assert_eq!(response.logs, vec!["started"]);
        assert!(response
            .errors
            .iter()
            .any(|line| line == runner::TIMEOUT_MESSAGE));
        assert_eq!(coordinator.submitted().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reported_as_data() {
        let dir = TempDir::new().unwrap();
        let coordinator = MockCoordinator::new().with_context("bad", context(json!({})));
        let job = CalculationJob::new("echo partial; echo broken >&2; exit 2", "bad", dir.path());

        let response = run_calculation(&coordinator, &job).await.unwrap();

        assert_eq!(response.logs, vec!["partial"]);
        assert_eq!(response.errors[0], "broken");
        assert_eq!(response.errors.len(), 2);
        assert_eq!(coordinator.submitted().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_submit_logs_posts_combined_output() {
        let dir = TempDir::new().unwrap();
        let coordinator = MockCoordinator::new().with_context("logged", context(json!({})));
        let job = CalculationJob::new("echo hello", "logged", dir.path()).with_submit_logs(true);

        run_calculation(&coordinator, &job).await.unwrap();

        let logs = coordinator.submitted_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].0, "logged");
        assert_eq!(logs[0].1.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_logs_not_posted_by_default() {
        let dir = TempDir::new().unwrap();
        let coordinator = MockCoordinator::new().with_context("quiet", context(json!({})));
        let job = CalculationJob::new("echo hello", "quiet", dir.path());

        run_calculation(&coordinator, &job).await.unwrap();

        assert!(coordinator.submitted_logs().is_empty());
    }

    #[tokio::test]
    async fn test_bad_artifact_input_aborts_without_upload() {
        let dir = TempDir::new().unwrap();
        let coordinator = MockCoordinator::new().with_context(
            "art",
            context(json!({
                "img": {"name": "x.png", "contentType": "image/png", "uri": "not-a-data-uri"}
            })),
        );
        let job = CalculationJob::new("touch ran.txt", "art", dir.path());

        let err = run_calculation(&coordinator, &job).await.unwrap_err();

        assert!(matches!(err, CalcError::Format(_)));
        assert!(!dir.path().join("ran.txt").exists());
        assert!(coordinator.submitted().is_empty());
    }
}
