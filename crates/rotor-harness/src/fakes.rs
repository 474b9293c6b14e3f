//! Scripted implementations of the pipeline ports, for contract checks
//! and tests that must not depend on a cross toolchain, the subject, or
//! an external solver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rotor_smt::query::SmtQuery;

use crate::build_driver::{BuildArtifact, BuildFailure, Builder};
use crate::corpus::{load_case, BenchmarkCase, DESCRIPTOR_FILE};
use crate::equivalence::{Decider, DeciderError, Decision};
use crate::error::MalformedCaseError;
use crate::subject::{SubjectExecutor, TranslationResult, TRANSLATED_FILE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildScript {
    Succeed,
    Fail(BuildFailure),
}

/// Writes a placeholder binary, or fails as scripted.
#[derive(Debug, Clone)]
pub struct ScriptedBuilder {
    default: BuildScript,
    per_case: HashMap<String, BuildScript>,
}

impl Default for ScriptedBuilder {
    fn default() -> Self {
        Self {
            default: BuildScript::Succeed,
            per_case: HashMap::new(),
        }
    }
}

impl ScriptedBuilder {
    pub fn with_case(mut self, case_id: &str, script: BuildScript) -> Self {
        self.per_case.insert(case_id.to_string(), script);
        self
    }
}

impl Builder for ScriptedBuilder {
    fn build(&self, case: &BenchmarkCase, work_dir: &Path) -> BuildArtifact {
        let binary = work_dir.join(format!("{}.elf", case.stem()));
        match self.per_case.get(&case.id).unwrap_or(&self.default) {
            BuildScript::Succeed => match std::fs::write(&binary, case.source_sha256.as_bytes()) {
                Ok(()) => BuildArtifact::succeeded(&case.id, binary, String::new(), Duration::ZERO),
                Err(err) => {
                    BuildArtifact::failed(&case.id, binary, BuildFailure::MissingOutput, err.to_string(), Duration::ZERO)
                }
            },
            BuildScript::Fail(failure) => {
                let mut artifact =
                    BuildArtifact::failed(&case.id, binary, *failure, "scripted failure".into(), Duration::ZERO);
                if *failure == BuildFailure::ExitCode {
                    artifact.exit_code = Some(1);
                }
                artifact
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectScript {
    /// Emit the case's reference program unchanged.
    EmitReference,
    /// Emit this `.bvp` text.
    Emit(String),
    Timeout,
    Crash(String),
}

/// Emits a representation, or times out or crashes, as scripted.
#[derive(Debug, Clone)]
pub struct ScriptedSubject {
    default: SubjectScript,
    per_case: HashMap<String, SubjectScript>,
}

impl Default for ScriptedSubject {
    fn default() -> Self {
        Self {
            default: SubjectScript::EmitReference,
            per_case: HashMap::new(),
        }
    }
}

impl ScriptedSubject {
    pub fn with_case(mut self, case_id: &str, script: SubjectScript) -> Self {
        self.per_case.insert(case_id.to_string(), script);
        self
    }
}

impl SubjectExecutor for ScriptedSubject {
    fn run(&self, case: &BenchmarkCase, _artifact: &BuildArtifact, work_dir: &Path) -> TranslationResult {
        let output = work_dir.join(TRANSLATED_FILE);
        let text = match self.per_case.get(&case.id).unwrap_or(&self.default) {
            SubjectScript::EmitReference => case.reference.to_bvp(),
            SubjectScript::Emit(text) => text.clone(),
            SubjectScript::Timeout => {
                return TranslationResult::timed_out(&case.id, String::new(), Duration::ZERO);
            }
            SubjectScript::Crash(reason) => {
                return TranslationResult::crashed(&case.id, reason.clone(), String::new(), Duration::ZERO);
            }
        };
        match std::fs::write(&output, text) {
            Ok(()) => TranslationResult::completed(&case.id, output, String::new(), Duration::ZERO),
            Err(err) => TranslationResult::crashed(&case.id, err.to_string(), String::new(), Duration::ZERO),
        }
    }
}

/// Gives the same answer to every query and counts the calls.
#[derive(Debug)]
pub struct ScriptedDecider {
    answer: Result<Decision, String>,
    calls: AtomicUsize,
}

impl ScriptedDecider {
    pub fn answering(decision: Decision) -> Self {
        Self {
            answer: Ok(decision),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            answer: Err(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decider for ScriptedDecider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&self, _query: &SmtQuery, _timeout: Duration, _dump_dir: Option<&Path>) -> Result<Decision, DeciderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(DeciderError::Other)
    }
}

/// Write a minimal case (C stub, reference program, descriptor) at
/// `root/<id>`.
pub fn write_case(root: &Path, case_id: &str, reference: &str) -> std::io::Result<PathBuf> {
    let dir = root.join(case_id);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("main.c"), format!("/* {case_id} */\nint main(void) {{ return 0; }}\n"))?;
    std::fs::write(dir.join("reference.bvp"), reference)?;
    std::fs::write(
        dir.join(DESCRIPTOR_FILE),
        "source = \"main.c\"\nreference = \"reference.bvp\"\n",
    )?;
    Ok(dir)
}

/// [`write_case`], then load it.
pub fn case_fixture(root: &Path, case_id: &str, reference: &str) -> Result<BenchmarkCase, MalformedCaseError> {
    let dir = write_case(root, case_id, reference).map_err(|err| MalformedCaseError {
        case_id: case_id.to_string(),
        reason: err.to_string(),
    })?;
    load_case(case_id, &dir)
}
