//! Build stage: compile a case's source with the cross toolchain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rotor_sandbox::{CommandSpec, SandboxLimits, Termination};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ToolchainConfig;
use crate::corpus::BenchmarkCase;
use crate::fingerprint::sha256_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildFailure {
    Timeout,
    ExitCode,
    Signal,
    Spawn,
    MissingOutput,
}

/// Result of building one case. Failures are data, never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub case_id: String,
    pub binary: PathBuf,
    /// Compiler stdout followed by stderr.
    pub log: String,
    pub status: BuildStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<BuildFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_sha256: Option<String>,
}

impl BuildArtifact {
    pub fn succeeded(case_id: &str, binary: PathBuf, log: String, duration: Duration) -> Self {
        let binary_sha256 = sha256_file(&binary).ok();
        Self {
            case_id: case_id.to_string(),
            binary,
            log,
            status: BuildStatus::Success,
            failure: None,
            exit_code: Some(0),
            duration_ms: duration.as_millis() as u64,
            binary_sha256,
        }
    }

    pub fn failed(case_id: &str, binary: PathBuf, failure: BuildFailure, log: String, duration: Duration) -> Self {
        Self {
            case_id: case_id.to_string(),
            binary,
            log,
            status: BuildStatus::Failure,
            failure: Some(failure),
            exit_code: None,
            duration_ms: duration.as_millis() as u64,
            binary_sha256: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }

    /// One-line reason for a failed build.
    pub fn failure_reason(&self) -> String {
        match (self.failure, self.exit_code) {
            (None, _) => "built".to_string(),
            (Some(BuildFailure::ExitCode), Some(code)) => format!("compiler exited with code {code}"),
            (Some(BuildFailure::Timeout), _) => "compiler timed out".to_string(),
            (Some(BuildFailure::Signal), _) => "compiler was terminated by a signal".to_string(),
            (Some(BuildFailure::Spawn), _) => "compiler could not be started".to_string(),
            (Some(BuildFailure::MissingOutput), _) => "compiler produced no binary".to_string(),
            (Some(BuildFailure::ExitCode), None) => "compiler failed".to_string(),
        }
    }
}

/// Port: turns a case into a binary.
pub trait Builder: Send + Sync {
    fn build(&self, case: &BenchmarkCase, work_dir: &Path) -> BuildArtifact;
}

/// Runs the configured cross compiler under the sandbox.
#[derive(Debug, Clone)]
pub struct CrossCompiler {
    compiler: String,
    flags: Vec<String>,
    timeout: Duration,
}

impl CrossCompiler {
    pub fn new(config: &ToolchainConfig) -> Self {
        Self {
            compiler: config.compiler.clone(),
            flags: config.flags.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn output_path(case: &BenchmarkCase, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{}.elf", case.stem()))
    }

    /// `<compiler> <toolchain flags> <case cflags> -o <output> <source>`
    pub fn command_for(&self, case: &BenchmarkCase, output: &Path) -> CommandSpec {
        CommandSpec::new(&self.compiler)
            .args(self.flags.iter().cloned())
            .args(case.cflags.iter().cloned())
            .arg("-o")
            .arg(output.display().to_string())
            .arg(case.source.display().to_string())
    }

    fn timeout_for(&self, case: &BenchmarkCase) -> Duration {
        case.timeouts
            .build_secs
            .map(Duration::from_secs)
            .unwrap_or(self.timeout)
    }
}

impl Builder for CrossCompiler {
    fn build(&self, case: &BenchmarkCase, work_dir: &Path) -> BuildArtifact {
        let output = Self::output_path(case, work_dir);
        // A stale binary from an earlier run must not mask a failed build.
        let _ = std::fs::remove_file(&output);
        let spec = self.command_for(case, &output);
        let limits = SandboxLimits::with_timeout(self.timeout_for(case));
        debug!(case = %case.id, command = %spec.display(), "building");

        let outcome = match rotor_sandbox::run(&spec, &limits) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(case = %case.id, error = %err, "compiler did not run");
                return BuildArtifact::failed(&case.id, output, BuildFailure::Spawn, err.to_string(), Duration::ZERO);
            }
        };
        let log = outcome.combined_log();
        let artifact = match outcome.termination {
            Termination::Exited(0) if output.is_file() => {
                BuildArtifact::succeeded(&case.id, output, log, outcome.elapsed)
            }
            Termination::Exited(0) => {
                BuildArtifact::failed(&case.id, output, BuildFailure::MissingOutput, log, outcome.elapsed)
            }
            Termination::Exited(code) => {
                let mut artifact =
                    BuildArtifact::failed(&case.id, output, BuildFailure::ExitCode, log, outcome.elapsed);
                artifact.exit_code = Some(code);
                artifact
            }
            Termination::Signaled(_) => {
                BuildArtifact::failed(&case.id, output, BuildFailure::Signal, log, outcome.elapsed)
            }
            Termination::TimedOut
            | Termination::CpuBudgetExceeded { .. }
            | Termination::MemoryBudgetExceeded { .. } => {
                BuildArtifact::failed(&case.id, output, BuildFailure::Timeout, log, outcome.elapsed)
            }
        };
        info!(
            case = %case.id,
            status = ?artifact.status,
            duration_ms = artifact.duration_ms,
            "build finished"
        );
        artifact
    }
}
