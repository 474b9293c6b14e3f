//! Run stage: hand the built binary to the system under test and collect
//! the behavior program it emits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rotor_sandbox::{CommandSpec, SandboxLimits, Termination};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::build_driver::BuildArtifact;
use crate::config::SubjectConfig;
use crate::corpus::BenchmarkCase;

/// Where the representation lands in the case work directory.
pub const TRANSLATED_FILE: &str = "translated.bvp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Completed,
    Timeout,
    Crashed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationResult {
    pub case_id: String,
    /// Set only when the status is `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representation: Option<PathBuf>,
    pub log: String,
    pub status: TranslationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_reason: Option<String>,
    pub duration_ms: u64,
}

impl TranslationResult {
    pub fn completed(case_id: &str, representation: PathBuf, log: String, duration: Duration) -> Self {
        Self {
            case_id: case_id.to_string(),
            representation: Some(representation),
            log,
            status: TranslationStatus::Completed,
            exit_code: Some(0),
            signal: None,
            crash_reason: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn timed_out(case_id: &str, log: String, duration: Duration) -> Self {
        Self {
            case_id: case_id.to_string(),
            representation: None,
            log,
            status: TranslationStatus::Timeout,
            exit_code: None,
            signal: None,
            crash_reason: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn crashed(case_id: &str, reason: impl Into<String>, log: String, duration: Duration) -> Self {
        Self {
            case_id: case_id.to_string(),
            representation: None,
            log,
            status: TranslationStatus::Crashed,
            exit_code: None,
            signal: None,
            crash_reason: Some(reason.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn summary(&self) -> String {
        match self.status {
            TranslationStatus::Completed => "completed".to_string(),
            TranslationStatus::Timeout => format!("timed out after {} ms", self.duration_ms),
            TranslationStatus::Crashed => self
                .crash_reason
                .clone()
                .unwrap_or_else(|| "crashed".to_string()),
        }
    }
}

/// Port: runs the system under test on one binary.
pub trait SubjectExecutor: Send + Sync {
    fn run(&self, case: &BenchmarkCase, artifact: &BuildArtifact, work_dir: &Path) -> TranslationResult;
}

/// Substitute `{binary}`, `{output}` and `{case}` in one argument.
pub fn expand_template(template: &str, binary: &Path, output: &Path, case_id: &str) -> String {
    template
        .replace("{binary}", &binary.display().to_string())
        .replace("{output}", &output.display().to_string())
        .replace("{case}", case_id)
}

/// Runs the configured subject command under the sandbox.
#[derive(Debug, Clone)]
pub struct ProcessSubject {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    cpu_secs: u64,
    memory_mb: u64,
    allow_degraded: bool,
}

impl ProcessSubject {
    pub fn new(config: &SubjectConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            cpu_secs: config.cpu_secs,
            memory_mb: config.memory_mb,
            allow_degraded: config.allow_degraded,
        }
    }

    /// Whether the subject writes the representation itself.
    pub fn writes_output_file(&self) -> bool {
        self.args.iter().any(|arg| arg.contains("{output}"))
    }

    pub fn command_for(&self, case: &BenchmarkCase, binary: &Path, output: &Path) -> CommandSpec {
        CommandSpec::new(&self.command).args(
            self.args
                .iter()
                .map(|arg| expand_template(arg, binary, output, &case.id)),
        )
    }

    fn limits_for(&self, case: &BenchmarkCase) -> SandboxLimits {
        SandboxLimits {
            wall_timeout: case
                .timeouts
                .run_secs
                .map(Duration::from_secs)
                .unwrap_or(self.timeout),
            cpu_secs: self.cpu_secs,
            memory_mb: self.memory_mb,
            allow_degraded: self.allow_degraded,
            ..SandboxLimits::default()
        }
    }
}

fn has_content(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

impl SubjectExecutor for ProcessSubject {
    fn run(&self, case: &BenchmarkCase, artifact: &BuildArtifact, work_dir: &Path) -> TranslationResult {
        let output = work_dir.join(TRANSLATED_FILE);
        let _ = std::fs::remove_file(&output);
        let spec = self.command_for(case, &artifact.binary, &output);
        debug!(case = %case.id, command = %spec.display(), "running subject");

        let outcome = match rotor_sandbox::run(&spec, &self.limits_for(case)) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(case = %case.id, error = %err, "subject did not run");
                return TranslationResult::crashed(&case.id, err.to_string(), String::new(), Duration::ZERO);
            }
        };
        let elapsed = outcome.elapsed;
        let to_stdout = !self.writes_output_file();
        let log = if to_stdout {
            outcome.stderr_lossy()
        } else {
            outcome.combined_log()
        };

        let result = match outcome.termination {
            Termination::TimedOut | Termination::CpuBudgetExceeded { .. } => {
                TranslationResult::timed_out(&case.id, log, elapsed)
            }
            Termination::MemoryBudgetExceeded { .. } => {
                TranslationResult::crashed(&case.id, outcome.termination.to_string(), log, elapsed)
            }
            Termination::Signaled(signal) => {
                let mut result =
                    TranslationResult::crashed(&case.id, outcome.termination.to_string(), log, elapsed);
                result.signal = Some(signal);
                result
            }
            Termination::Exited(code) if code != 0 => {
                let mut result =
                    TranslationResult::crashed(&case.id, outcome.termination.to_string(), log, elapsed);
                result.exit_code = Some(code);
                result
            }
            Termination::Exited(_) => {
                if to_stdout && !outcome.stdout.is_empty() {
                    if let Err(err) = std::fs::write(&output, &outcome.stdout) {
                        return TranslationResult::crashed(
                            &case.id,
                            format!("cannot store representation: {err}"),
                            log,
                            elapsed,
                        );
                    }
                }
                if outcome.stdout_truncated && to_stdout {
                    TranslationResult::crashed(&case.id, "representation exceeds the output limit", log, elapsed)
                } else if has_content(&output) {
                    TranslationResult::completed(&case.id, output, log, elapsed)
                } else {
                    let mut result =
                        TranslationResult::crashed(&case.id, "no representation produced", log, elapsed);
                    result.exit_code = Some(0);
                    result
                }
            }
        };
        info!(
            case = %case.id,
            status = ?result.status,
            duration_ms = result.duration_ms,
            "subject finished"
        );
        result
    }
}
