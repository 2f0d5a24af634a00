//! Scenario execution
//!
//! Drives the four stages of a scenario through a [`ProcessRunner`],
//! stopping at the first failure, then verifies the publish output and
//! removes the scenario directory.

use std::time::{Duration, Instant};

use super::cleanup::{remove_scenario_dir, CleanupOutcome};
use super::model::{Scenario, Stage, StageKind};
use super::report::{ScenarioReport, StageRecord, Verdict};
use super::verify::missing_artifacts;
use crate::common::config::{Config, RetryConfig};
use crate::process::{CancelToken, ExecutionResult, ExitOutcome, ProcessRunner};

/// Which stage failures are re-run, and how often
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    stages: Vec<StageKind>,
}

impl RetryPolicy {
    /// Every stage runs exactly once
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            stages: Vec::new(),
        }
    }

    pub fn new(max_attempts: u32, delay: Duration, stages: Vec<StageKind>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            stages,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.delay_ms),
            config.stages.clone(),
        )
    }

    /// Only a completed non-zero exit is worth another attempt
    fn should_retry(&self, stage: StageKind, result: &ExecutionResult, attempt: u32) -> bool {
        attempt < self.max_attempts
            && self.stages.contains(&stage)
            && matches!(result.outcome, ExitOutcome::Completed { code } if code != 0)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Runs scenarios one stage at a time
pub struct Orchestrator<R> {
    runner: R,
    retry: RetryPolicy,
    keep_on_failure: bool,
}

impl<R: ProcessRunner> Orchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            retry: RetryPolicy::none(),
            keep_on_failure: false,
        }
    }

    /// Orchestrator with retry and cleanup settings taken from `config`
    pub fn from_config(runner: R, config: &Config) -> Self {
        Self::new(runner)
            .with_retry(RetryPolicy::from_config(&config.retry))
            .keep_on_failure(config.workspace.keep_on_failure)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Leave failed scenario directories on disk
    pub fn keep_on_failure(mut self, keep: bool) -> Self {
        self.keep_on_failure = keep;
        self
    }

    #[cfg(test)]
    fn runner(&self) -> &R {
        &self.runner
    }

    /// Run one scenario to a verdict, then clean up its directory
    #[tracing::instrument(skip_all, fields(scenario = %scenario.project_name()))]
    pub async fn run(&self, scenario: &Scenario, cancel: &CancelToken) -> ScenarioReport {
        let started = Instant::now();
        let mut records = Vec::with_capacity(scenario.stages().len());

        let verdict = match self.run_stages(scenario, cancel, &mut records).await {
            Some(verdict) => verdict,
            None => {
                let missing = missing_artifacts(
                    scenario.working_dir(),
                    scenario.publish_output(),
                    scenario.expected_artifacts(),
                );
                if missing.is_empty() {
                    Verdict::Passed
                } else {
                    Verdict::VerificationFailed { missing }
                }
            }
        };

        let cleanup = if self.keep_on_failure && !verdict.passed() {
            tracing::info!(dir = %scenario.working_dir().display(), "Keeping failed scenario directory");
            CleanupOutcome::Kept
        } else {
            remove_scenario_dir(scenario.working_dir()).await
        };

        if verdict.passed() {
            tracing::info!("Scenario passed");
        } else {
            tracing::warn!(%verdict, "Scenario failed");
        }

        ScenarioReport {
            name: scenario.name().to_string(),
            project_name: scenario.project_name().to_string(),
            working_dir: scenario.working_dir().to_path_buf(),
            result_url: scenario.result_url().to_string(),
            verdict,
            stages: records,
            cleanup,
            duration: started.elapsed(),
        }
    }

    /// Run scenarios sequentially, starting no new scenario once cancelled
    ///
    /// `on_report` sees each report as soon as its scenario finishes.
    pub async fn run_all<F>(
        &self,
        scenarios: &[Scenario],
        cancel: &CancelToken,
        mut on_report: F,
    ) -> Vec<ScenarioReport>
    where
        F: FnMut(&ScenarioReport),
    {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            if cancel.is_cancelled() {
                tracing::info!(
                    skipped = scenarios.len() - reports.len(),
                    "Cancelled, skipping remaining scenarios"
                );
                break;
            }
            let report = self.run(scenario, cancel).await;
            on_report(&report);
            reports.push(report);
        }
        reports
    }

    /// Execute stages in order; `None` means every stage succeeded
    async fn run_stages(
        &self,
        scenario: &Scenario,
        cancel: &CancelToken,
        records: &mut Vec<StageRecord>,
    ) -> Option<Verdict> {
        for stage in scenario.stages() {
            let (attempts, result) = self.run_stage(stage, cancel).await;
            let outcome = result.outcome.clone();
            records.push(StageRecord::new(stage.kind, &stage.invocation, attempts, result));

            if outcome.success() {
                continue;
            }

            return Some(match outcome {
                ExitOutcome::FailedToStart { failure } if failure.is_infrastructure() => {
                    Verdict::Infrastructure {
                        stage: stage.kind,
                        reason: failure.to_string(),
                    }
                }
                ExitOutcome::WaitFailed { reason } => Verdict::Infrastructure {
                    stage: stage.kind,
                    reason,
                },
                outcome => Verdict::StageFailed {
                    stage: stage.kind,
                    outcome,
                },
            });
        }
        None
    }

    /// Execute one stage, retrying per policy
    async fn run_stage(&self, stage: &Stage, cancel: &CancelToken) -> (u32, ExecutionResult) {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return (attempt, cancelled_before_start());
            }

            tracing::info!(stage = %stage.kind, attempt, command = %stage.invocation, "Running stage");
            let result = self.runner.execute(&stage.invocation, cancel).await;
            tracing::debug!(stage = %stage.kind, outcome = %result.outcome, pid = ?result.pid, "Stage finished");

            if !self.retry.should_retry(stage.kind, &result, attempt) {
                return (attempt, result);
            }

            tracing::warn!(
                stage = %stage.kind,
                attempt,
                outcome = %result.outcome,
                "Stage failed, retrying in {}ms",
                self.retry.delay.as_millis()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.retry.delay) => {}
                _ = cancel.cancelled() => return (attempt, result),
            }
            attempt += 1;
        }
    }
}

fn cancelled_before_start() -> ExecutionResult {
    ExecutionResult {
        outcome: ExitOutcome::Cancelled,
        pid: None,
        duration: Duration::ZERO,
        output_tail: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{Invocation, LaunchFailure};
    use crate::scenario::params::{BuildConfiguration, ScenarioParams, TemplateKind, ToolchainVariant};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    type Behavior = Box<dyn Fn(StageKind, u32) -> ExitOutcome + Send + Sync>;
    type AfterStage = Box<dyn Fn(StageKind, &Path) + Send + Sync>;

    /// Runner that mimics the toolchain on the filesystem without spawning
    struct FakeRunner {
        behavior: Behavior,
        write_artifact: bool,
        after_stage: Option<AfterStage>,
        calls: Mutex<Vec<(StageKind, String, String)>>,
    }

    impl FakeRunner {
        fn new(behavior: impl Fn(StageKind, u32) -> ExitOutcome + Send + Sync + 'static) -> Self {
            Self {
                behavior: Box::new(behavior),
                write_artifact: true,
                after_stage: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn succeeding() -> Self {
            Self::new(|_, _| ExitOutcome::Completed { code: 0 })
        }

        fn without_artifact(mut self) -> Self {
            self.write_artifact = false;
            self
        }

        /// Touch the working directory once a stage has done its own work
        fn after_stage(mut self, hook: impl Fn(StageKind, &Path) + Send + Sync + 'static) -> Self {
            self.after_stage = Some(Box::new(hook));
            self
        }

        fn stages(&self) -> Vec<StageKind> {
            self.calls.lock().unwrap().iter().map(|c| c.0).collect()
        }

        fn calls(&self) -> Vec<(StageKind, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn stage_of(invocation: &Invocation) -> StageKind {
        match invocation.args() {
            "restore" => StageKind::Restore,
            "build" => StageKind::Build,
            args if args.starts_with("new ") => StageKind::Scaffold,
            _ => StageKind::Publish,
        }
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn execute(&self, invocation: &Invocation, _cancel: &CancelToken) -> ExecutionResult {
            let stage = stage_of(invocation);
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((
                    stage,
                    invocation.program().to_string(),
                    invocation.args().to_string(),
                ));
                calls.iter().filter(|c| c.0 == stage).count() as u32
            };

            let dir = invocation.working_dir();
            if invocation.creates_dir() {
                std::fs::create_dir_all(dir).unwrap();
            }
            let outcome = (self.behavior)(stage, attempt);
            if stage == StageKind::Publish && outcome.success() && self.write_artifact {
                let publish_url = invocation
                    .args()
                    .split_whitespace()
                    .find_map(|a| a.strip_prefix("/p:PublishUrl="))
                    .unwrap();
                let out = dir.join(publish_url);
                std::fs::create_dir_all(&out).unwrap();
                std::fs::write(out.join("web.config"), "<configuration />").unwrap();
            }
            if let Some(hook) = &self.after_stage {
                hook(stage, dir);
            }

            ExecutionResult {
                outcome,
                pid: Some(4242),
                duration: Duration::from_millis(1),
                output_tail: Vec::new(),
            }
        }
    }

    fn scenario(root: &Path, params: &ScenarioParams) -> Scenario {
        let mut config = Config::default();
        config.workspace.root = Some(root.to_path_buf());
        Scenario::from_params(params, &config).unwrap()
    }

    fn release_native() -> ScenarioParams {
        ScenarioParams::new(TemplateKind::Web, BuildConfiguration::Release)
            .toolchain(ToolchainVariant::Native)
    }

    #[tokio::test]
    async fn test_all_stages_and_artifact_pass() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::succeeding());

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(report.passed(), "verdict: {}", report.verdict);
        assert_eq!(orchestrator.runner().stages(), StageKind::ORDER.to_vec());
        assert_eq!(report.stages.len(), 4);
        assert_eq!(report.cleanup, CleanupOutcome::Removed);
        assert!(!scenario.working_dir().exists());

        let publish = &orchestrator.runner().calls()[3];
        assert_eq!(publish.1, "msbuild");
        assert!(publish.2.contains("/p:Configuration=Release"));
    }

    #[tokio::test]
    async fn test_restore_failure_skips_build_and_publish() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::new(|stage, _| match stage {
            StageKind::Restore => ExitOutcome::Completed { code: 1 },
            _ => ExitOutcome::Completed { code: 0 },
        }));

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert_eq!(
            report.verdict,
            Verdict::StageFailed {
                stage: StageKind::Restore,
                outcome: ExitOutcome::Completed { code: 1 },
            }
        );
        assert_eq!(
            orchestrator.runner().stages(),
            vec![StageKind::Scaffold, StageKind::Restore]
        );
        assert_eq!(report.cleanup, CleanupOutcome::Removed);
        assert!(!scenario.working_dir().exists());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_verification_failure() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::succeeding().without_artifact());

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        match &report.verdict {
            Verdict::VerificationFailed { missing } => {
                assert_eq!(
                    missing,
                    &vec![Path::new("bin").join("Release").join("PublishOutput").join("web.config")]
                );
            }
            other => panic!("expected verification failure, got {:?}", other),
        }
        assert_eq!(report.stages.len(), 4);
    }

    #[tokio::test]
    async fn test_infrastructure_failure_is_distinct() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::new(|stage, _| match stage {
            StageKind::Scaffold => ExitOutcome::FailedToStart {
                failure: LaunchFailure::DirectoryCreation("read-only file system".into()),
            },
            _ => ExitOutcome::Completed { code: 0 },
        }));

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(matches!(
            report.verdict,
            Verdict::Infrastructure {
                stage: StageKind::Scaffold,
                ..
            }
        ));
        assert_eq!(orchestrator.runner().stages(), vec![StageKind::Scaffold]);
    }

    #[tokio::test]
    async fn test_lost_process_is_infrastructure() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::new(|stage, _| match stage {
            StageKind::Build => ExitOutcome::WaitFailed {
                reason: "No child processes".into(),
            },
            _ => ExitOutcome::Completed { code: 0 },
        }));

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert_eq!(
            report.verdict,
            Verdict::Infrastructure {
                stage: StageKind::Build,
                reason: "No child processes".into(),
            }
        );
        assert_eq!(
            orchestrator.runner().stages(),
            vec![StageKind::Scaffold, StageKind::Restore, StageKind::Build]
        );
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_verification_verdict() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let runner = FakeRunner::succeeding()
            .without_artifact()
            .after_stage(|stage, dir| {
                if stage == StageKind::Scaffold {
                    std::fs::remove_dir_all(dir).unwrap();
                    std::fs::write(dir, "not a directory").unwrap();
                }
            });
        let orchestrator = Orchestrator::new(runner);

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(
            matches!(report.verdict, Verdict::VerificationFailed { .. }),
            "verdict: {}",
            report.verdict
        );
        assert!(matches!(report.cleanup, CleanupOutcome::Failed(_)));
        assert!(scenario.working_dir().is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_failure_keeps_passed_verdict() {
        use std::os::unix::fs::PermissionsExt;

        // Directory permissions do not bind root.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let runner = FakeRunner::succeeding().after_stage(|stage, dir| {
            if stage == StageKind::Publish {
                let parent = dir.parent().unwrap();
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o555)).unwrap();
            }
        });
        let orchestrator = Orchestrator::new(runner);

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;
        std::fs::set_permissions(root.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(report.passed(), "verdict: {}", report.verdict);
        assert!(matches!(report.cleanup, CleanupOutcome::Failed(_)));
        assert!(scenario.working_dir().exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_stage_failure() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::new(|stage, _| match stage {
            StageKind::Publish => ExitOutcome::FailedToStart {
                failure: LaunchFailure::ProgramNotFound("msbuild".into()),
            },
            _ => ExitOutcome::Completed { code: 0 },
        }));

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(matches!(
            report.verdict,
            Verdict::StageFailed {
                stage: StageKind::Publish,
                outcome: ExitOutcome::FailedToStart { .. },
            }
        ));
    }

    #[tokio::test]
    async fn test_keep_on_failure_leaves_directory() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::new(|stage, _| match stage {
            StageKind::Build => ExitOutcome::Completed { code: 1 },
            _ => ExitOutcome::Completed { code: 0 },
        }))
        .keep_on_failure(true);

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(!report.passed());
        assert_eq!(report.cleanup, CleanupOutcome::Kept);
        assert!(scenario.working_dir().exists());
    }

    #[tokio::test]
    async fn test_keep_on_failure_still_cleans_passing_scenario() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::succeeding()).keep_on_failure(true);

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(report.passed());
        assert_eq!(report.cleanup, CleanupOutcome::Removed);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::new(|stage, attempt| match (stage, attempt) {
            (StageKind::Restore, 1) => ExitOutcome::Completed { code: 1 },
            _ => ExitOutcome::Completed { code: 0 },
        }));

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(!report.passed());
        assert_eq!(report.stages[1].attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_restore_failure() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::new(|stage, attempt| match (stage, attempt) {
            (StageKind::Restore, 1) => ExitOutcome::Completed { code: 1 },
            _ => ExitOutcome::Completed { code: 0 },
        }))
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1), vec![StageKind::Restore]));

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(report.passed(), "verdict: {}", report.verdict);
        assert_eq!(report.stages[1].stage, StageKind::Restore);
        assert_eq!(report.stages[1].attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_ignores_other_stages_and_launch_failures() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::new(|stage, _| match stage {
            StageKind::Restore => ExitOutcome::FailedToStart {
                failure: LaunchFailure::ProgramNotFound("dotnet".into()),
            },
            _ => ExitOutcome::Completed { code: 0 },
        }))
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1), vec![StageKind::Restore]));

        let report = orchestrator.run(&scenario, &CancelToken::new()).await;

        assert!(!report.passed());
        assert_eq!(report.stages[1].attempts, 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_issues_no_stage() {
        let root = tempfile::tempdir().unwrap();
        let scenario = scenario(root.path(), &release_native());
        let orchestrator = Orchestrator::new(FakeRunner::succeeding());
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = orchestrator.run(&scenario, &cancel).await;

        assert!(orchestrator.runner().stages().is_empty());
        assert_eq!(
            report.verdict,
            Verdict::StageFailed {
                stage: StageKind::Scaffold,
                outcome: ExitOutcome::Cancelled,
            }
        );
        assert_eq!(report.cleanup, CleanupOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_run_all_uses_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let params = release_native();
        let scenarios = vec![scenario(root.path(), &params), scenario(root.path(), &params)];
        let orchestrator = Orchestrator::new(FakeRunner::succeeding());

        let mut seen = 0;
        let reports = orchestrator
            .run_all(&scenarios, &CancelToken::new(), |_| seen += 1)
            .await;

        assert_eq!(reports.len(), 2);
        assert_eq!(seen, 2);
        assert!(reports.iter().all(|r| r.passed()));
        assert_ne!(reports[0].working_dir, reports[1].working_dir);
    }

    #[tokio::test]
    async fn test_run_all_stops_when_cancelled() {
        let root = tempfile::tempdir().unwrap();
        let params = release_native();
        let scenarios = vec![scenario(root.path(), &params), scenario(root.path(), &params)];
        let orchestrator = Orchestrator::new(FakeRunner::succeeding());
        let cancel = CancelToken::new();
        cancel.cancel();

        let reports = orchestrator.run_all(&scenarios, &cancel, |_| {}).await;
        assert!(reports.is_empty());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig::default());
        let failed = ExecutionResult {
            outcome: ExitOutcome::Completed { code: 1 },
            pid: Some(1),
            duration: Duration::ZERO,
            output_tail: Vec::new(),
        };
        assert!(!policy.should_retry(StageKind::Restore, &failed, 1));

        let config = RetryConfig {
            max_attempts: 2,
            delay_ms: 0,
            stages: vec![StageKind::Restore],
        };
        let policy = RetryPolicy::from_config(&config);
        assert!(policy.should_retry(StageKind::Restore, &failed, 1));
        assert!(!policy.should_retry(StageKind::Restore, &failed, 2));
        assert!(!policy.should_retry(StageKind::Build, &failed, 1));
    }
}
