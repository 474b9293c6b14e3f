//! Unit mode: contract checks of each component against synthetic
//! fixtures, without the cross toolchain or the system under test.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rotor_smt::query::SmtQuery;
use rotor_smt::sorts::SmtSort;
use rotor_smt::terms::SmtTerm;
use rotor_smt::SolverError;
use serde::Serialize;
use tracing::{info, warn};

use crate::build_driver::{BuildFailure, Builder};
use crate::config::{HarnessConfig, SolverBackend, SolverConfig, SubjectConfig};
use crate::corpus::{Corpus, DESCRIPTOR_FILE};
use crate::equivalence::{
    CheckRequest, Decider, DeciderError, Decision, EquivalenceChecker, EquivalenceOutcome, SolverDecider,
};
use crate::error::{HarnessFault, Stage};
use crate::fakes::{case_fixture, write_case, BuildScript, ScriptedBuilder, ScriptedDecider, ScriptedSubject, SubjectScript};
use crate::orchestrator::{Classification, Orchestrator, Pipeline};
use crate::report::{write_file, RunVerdict, REPORT_SCHEMA_VERSION};
use crate::subject::{ProcessSubject, SubjectExecutor, TranslationStatus};

pub const UNIT_REPORT_FILE: &str = "unit-report.json";

const INC: &str = "program inc\ninput x : bv8\noutput r : bv8 = (bvadd x #x01)\n";
const INC_REWRITE: &str = "program inc\ninput x : bv8\noutput r : bv8 = (bvsub x #xff)\n";
const INC_FLIPPED: &str = "program inc\ninput x : bv8\noutput r : bv8 = (bvxor (bvadd x #x01) #x01)\n";
const INC_WIDE: &str = "program inc\ninput x : bv16\noutput r : bv16 = (bvadd x #x0001)\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitCheck {
    pub component: String,
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub schema_version: u32,
    pub mode: String,
    pub overall: RunVerdict,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub checks: Vec<UnitCheck>,
}

impl UnitReport {
    fn new(checks: Vec<UnitCheck>) -> Self {
        let count = |status| checks.iter().filter(|c| c.status == status).count();
        let (passed, failed, skipped) = (
            count(CheckStatus::Passed),
            count(CheckStatus::Failed),
            count(CheckStatus::Skipped),
        );
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            mode: "unit".to_string(),
            overall: if failed == 0 { RunVerdict::Pass } else { RunVerdict::Fail },
            passed,
            failed,
            skipped,
            checks,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.overall.exit_code()
    }

    pub fn to_json(&self) -> Result<String, HarnessFault> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn render_summary_text(&self) -> String {
        let mut out = String::new();
        for check in &self.checks {
            let label = match check.status {
                CheckStatus::Passed => "PASS",
                CheckStatus::Failed => "FAIL",
                CheckStatus::Skipped => "SKIP",
            };
            let _ = writeln!(out, "[{label}] {} :: {} ({})", check.component, check.name, check.detail);
        }
        let _ = writeln!(
            out,
            "\n{} passed, {} failed, {} skipped; overall: {}",
            self.passed,
            self.failed,
            self.skipped,
            self.overall.as_str()
        );
        out
    }

    /// Write `unit-report.json` below `report_dir`.
    pub fn write(&self, report_dir: &Path) -> Result<PathBuf, HarnessFault> {
        std::fs::create_dir_all(report_dir).map_err(|source| HarnessFault::Directory {
            path: report_dir.display().to_string(),
            source,
        })?;
        let path = report_dir.join(UNIT_REPORT_FILE);
        write_file(&path, &self.to_json()?)?;
        Ok(path)
    }
}

enum CheckOutcome {
    Pass(String),
    Fail(String),
    Skip(String),
}

impl From<Result<String, String>> for CheckOutcome {
    fn from(result: Result<String, String>) -> Self {
        match result {
            Ok(detail) => CheckOutcome::Pass(detail),
            Err(detail) => CheckOutcome::Fail(detail),
        }
    }
}

struct Fixture<'a> {
    root: &'a Path,
    config: &'a HarnessConfig,
}

impl Fixture<'_> {
    /// A fresh directory per check.
    fn dir(&self, name: &str) -> Result<PathBuf, String> {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| format!("cannot create fixture directory: {e}"))?;
        Ok(dir)
    }
}

type CheckFn = fn(&Fixture<'_>) -> CheckOutcome;

const CHECKS: &[(&str, &str, CheckFn)] = &[
    ("corpus", "discovers cases and reports malformed ones", corpus_loader),
    ("ir", "printing and reloading keeps the definition", program_round_trip),
    ("checker", "identical programs need no solver call", identical_programs),
    ("checker", "a flipped output bit is inequivalent", flipped_bit),
    ("checker", "an equivalent rewrite is proved", equivalent_rewrite),
    ("checker", "interface mismatches are inequivalent", interface_mismatch),
    ("checker", "unknown and solver failures stay distinct", unknown_versus_error),
    ("pipeline", "a failed build skips run and check", failed_build),
    ("pipeline", "a subject timeout is inconclusive", subject_timeout),
    ("orchestrator", "classifications are stable across runs", idempotent_runs),
    ("sandbox", "a sleeping subject is killed at its deadline", sleeping_subject),
    ("decider", "the configured backend refutes x != x", configured_backend),
];

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

fn request(case_id: &str) -> CheckRequest<'_> {
    CheckRequest {
        case_id,
        timeout: Duration::from_secs(10),
        dump_dir: None,
    }
}

fn program(source: &str) -> Result<rotor_ir::BehaviorProgram, String> {
    rotor_ir::load(source, "fixture.bvp").map_err(|e| e.to_string())
}

fn exhaustive_checker() -> EquivalenceChecker {
    let config = SolverConfig {
        backend: SolverBackend::Exhaustive,
        ..SolverConfig::default()
    };
    EquivalenceChecker::new(Arc::new(SolverDecider::new(&config)), Duration::from_secs(10))
}

fn corpus_loader(fixture: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let root = fixture.dir("corpus-loader")?;
        let io = |e: std::io::Error| e.to_string();
        write_case(&root, "good", INC).map_err(io)?;
        let bad = write_case(&root, "bad", INC).map_err(io)?;
        std::fs::write(bad.join(DESCRIPTOR_FILE), "source = \"main.c\"\n").map_err(io)?;
        let corpus = Corpus::open(&root).map_err(|e| e.to_string())?;
        let (cases, errors) = corpus.load_all();
        ensure(cases.len() == 1 && cases[0].id == "good", || format!("loaded {} cases", cases.len()))?;
        ensure(errors.len() == 1 && errors[0].case_id == "bad", || format!("{errors:?}"))?;
        Ok(format!("1 case, 1 load error: {}", errors[0].reason))
    };
    run().into()
}

fn program_round_trip(_: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let original = program(INC_FLIPPED)?;
        let reloaded = program(&original.to_bvp())?;
        ensure(original == reloaded, || "reloaded program differs".to_string())?;
        Ok("definition preserved".to_string())
    };
    run().into()
}

fn identical_programs(_: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let decider = Arc::new(ScriptedDecider::failing("solver must not be called"));
        let checker = EquivalenceChecker::new(decider.clone(), Duration::from_secs(1));
        let verdict = checker.check(&program(INC)?, &program(INC)?, &request("identical"));
        ensure(verdict.outcome == EquivalenceOutcome::Equivalent, || verdict.detail.clone())?;
        ensure(decider.calls() == 0, || format!("{} solver calls", decider.calls()))?;
        Ok(verdict.detail)
    };
    run().into()
}

fn flipped_bit(_: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let verdict = exhaustive_checker().check(&program(INC)?, &program(INC_FLIPPED)?, &request("flipped"));
        ensure(verdict.outcome == EquivalenceOutcome::Inequivalent, || verdict.detail.clone())?;
        let cex = verdict.counterexample.as_ref().ok_or("no counterexample")?;
        ensure(!cex.outputs.is_empty(), || "counterexample without differing outputs".to_string())?;
        Ok(verdict.detail)
    };
    run().into()
}

fn equivalent_rewrite(_: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let verdict = exhaustive_checker().check(&program(INC)?, &program(INC_REWRITE)?, &request("rewrite"));
        ensure(verdict.outcome == EquivalenceOutcome::Equivalent, || verdict.detail.clone())?;
        Ok(verdict.detail)
    };
    run().into()
}

fn interface_mismatch(_: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let verdict = exhaustive_checker().check(&program(INC)?, &program(INC_WIDE)?, &request("mismatch"));
        ensure(verdict.outcome == EquivalenceOutcome::Inequivalent, || verdict.detail.clone())?;
        ensure(verdict.counterexample.is_none(), || "unexpected counterexample".to_string())?;
        Ok(verdict.detail)
    };
    run().into()
}

fn unknown_versus_error(_: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let (original, translated) = (program(INC)?, program(INC_REWRITE)?);
        let unknown = EquivalenceChecker::new(
            Arc::new(ScriptedDecider::answering(Decision::Unknown("timeout".into()))),
            Duration::from_secs(1),
        )
        .check(&original, &translated, &request("unknown"));
        ensure(unknown.outcome == EquivalenceOutcome::Unknown, || format!("{:?}", unknown.outcome))?;
        let error = EquivalenceChecker::new(Arc::new(ScriptedDecider::failing("crashed")), Duration::from_secs(1))
            .check(&original, &translated, &request("error"));
        ensure(error.outcome == EquivalenceOutcome::Error, || format!("{:?}", error.outcome))?;
        Ok("unknown and error".to_string())
    };
    run().into()
}

fn scripted_pipeline(builder: ScriptedBuilder, subject: ScriptedSubject) -> Pipeline {
    Pipeline::new(Arc::new(builder), Arc::new(subject), exhaustive_checker())
}

fn failed_build(fixture: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let dir = fixture.dir("failed-build")?;
        let case = case_fixture(&dir, "c", INC).map_err(|e| e.to_string())?;
        let record = scripted_pipeline(
            ScriptedBuilder::default().with_case("c", BuildScript::Fail(BuildFailure::ExitCode)),
            ScriptedSubject::default(),
        )
        .process(&case, &dir);
        ensure(record.classification == Classification::BuildFailed, || record.classification.to_string())?;
        let skip = record.skip.ok_or("no skip record")?;
        ensure(skip.stage == Stage::Build && skip.skipped == [Stage::Run, Stage::Check], || {
            format!("{skip:?}")
        })?;
        Ok(skip.reason)
    };
    run().into()
}

fn subject_timeout(fixture: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let dir = fixture.dir("subject-timeout")?;
        let case = case_fixture(&dir, "c", INC).map_err(|e| e.to_string())?;
        let record = scripted_pipeline(
            ScriptedBuilder::default(),
            ScriptedSubject::default().with_case("c", SubjectScript::Timeout),
        )
        .process(&case, &dir);
        ensure(record.classification == Classification::RunTimeout, || record.classification.to_string())?;
        ensure(record.classification.is_inconclusive(), || "not inconclusive".to_string())?;
        Ok(record.classification.to_string())
    };
    run().into()
}

fn idempotent_runs(fixture: &Fixture<'_>) -> CheckOutcome {
    let run = || -> Result<String, String> {
        let dir = fixture.dir("idempotent")?;
        let corpus = dir.join("corpus");
        for id in ["a", "b", "c"] {
            write_case(&corpus, id, INC).map_err(|e| e.to_string())?;
        }
        let config = HarnessConfig {
            corpus,
            work_dir: dir.join("work"),
            workers: 2,
            ..HarnessConfig::default()
        };
        let orchestrator = Orchestrator::new(
            config,
            scripted_pipeline(
                ScriptedBuilder::default(),
                ScriptedSubject::default()
                    .with_case("b", SubjectScript::Emit(INC_FLIPPED.to_string()))
                    .with_case("c", SubjectScript::Timeout),
            ),
        );
        let first = orchestrator.run_integration().map_err(|e| e.to_string())?;
        let second = orchestrator.run_integration().map_err(|e| e.to_string())?;
        let outcomes: Vec<Classification> = first.records.iter().map(|r| r.classification).collect();
        ensure(
            outcomes == [Classification::Equivalent, Classification::Inequivalent, Classification::RunTimeout],
            || format!("{outcomes:?}"),
        )?;
        ensure(first.outcome_fingerprint() == second.outcome_fingerprint(), || {
            "fingerprints differ between runs".to_string()
        })?;
        Ok(format!("fingerprint {}", &first.outcome_fingerprint()[..12]))
    };
    run().into()
}

fn sleeping_subject(fixture: &Fixture<'_>) -> CheckOutcome {
    if !cfg!(unix) {
        return CheckOutcome::Skip("needs a POSIX shell".to_string());
    }
    let run = || -> Result<String, String> {
        let dir = fixture.dir("sleeping-subject")?;
        let mut case = case_fixture(&dir, "c", INC).map_err(|e| e.to_string())?;
        case.timeouts.run_secs = Some(1);
        let subject = ProcessSubject::new(&SubjectConfig {
            command: "sh".into(),
            args: vec!["-c".into(), "sleep 30".into()],
            // Only the deadline is under test.
            allow_degraded: true,
            ..SubjectConfig::default()
        });
        let artifact = ScriptedBuilder::default().build(&case, &dir);
        let result = subject.run(&case, &artifact, &dir);
        ensure(result.status == TranslationStatus::Timeout, || format!("{:?}", result.status))?;
        Ok(format!("killed after {} ms", result.duration_ms))
    };
    run().into()
}

fn configured_backend(fixture: &Fixture<'_>) -> CheckOutcome {
    let solver = &fixture.config.solver;
    let mut query = SmtQuery::new();
    query.declare_input("in_x", SmtSort::bv(8));
    query.assert(SmtTerm::var("in_x").distinct(SmtTerm::var("in_x")));
    let timeout = Duration::from_secs(solver.timeout_secs.min(30));
    match SolverDecider::new(solver).decide(&query, timeout, None) {
        Ok(Decision::Unsat) => CheckOutcome::Pass(format!("{} answered unsat", solver.backend)),
        Ok(other) => CheckOutcome::Fail(format!("{} answered {other:?}", solver.backend)),
        Err(DeciderError::Solver(SolverError::Sandbox(err))) if err.is_spawn_failure() => {
            CheckOutcome::Skip(format!("solver `{}` is not available", solver.command()))
        }
        Err(err) => CheckOutcome::Fail(err.to_string()),
    }
}

/// Run every contract check. Only fixture setup problems are faults.
pub fn run_unit_suite(config: &HarnessConfig) -> Result<UnitReport, HarnessFault> {
    let scratch = tempfile::Builder::new()
        .prefix("rotor-unit-")
        .tempdir()
        .map_err(|source| HarnessFault::Directory {
            path: std::env::temp_dir().display().to_string(),
            source,
        })?;
    let fixture = Fixture {
        root: scratch.path(),
        config,
    };
    let mut checks = Vec::with_capacity(CHECKS.len());
    for (component, name, check) in CHECKS {
        let started = Instant::now();
        let (status, detail) = match check(&fixture) {
            CheckOutcome::Pass(detail) => (CheckStatus::Passed, detail),
            CheckOutcome::Fail(detail) => {
                warn!(component, check = name, detail = %detail, "unit check failed");
                (CheckStatus::Failed, detail)
            }
            CheckOutcome::Skip(detail) => (CheckStatus::Skipped, detail),
        };
        checks.push(UnitCheck {
            component: component.to_string(),
            name: name.to_string(),
            status,
            detail,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
    let report = UnitReport::new(checks);
    info!(passed = report.passed, failed = report.failed, skipped = report.skipped, "unit suite finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_checks_pass_with_the_exhaustive_backend() {
        let mut config = HarnessConfig::default();
        config.solver.backend = SolverBackend::Exhaustive;
        let report = run_unit_suite(&config).unwrap();
        let failures: Vec<_> = report.checks.iter().filter(|c| c.status == CheckStatus::Failed).collect();
        assert!(failures.is_empty(), "{failures:#?}");
        assert_eq!(report.checks.len(), CHECKS.len());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn missing_solver_is_skipped_not_failed() {
        let mut config = HarnessConfig::default();
        config.solver.command = Some("/nonexistent/rotor-solver".into());
        let report = run_unit_suite(&config).unwrap();
        let backend = report.checks.iter().find(|c| c.component == "decider").unwrap();
        assert_eq!(backend.status, CheckStatus::Skipped);
    }

    #[test]
    fn unit_report_is_written_as_json() {
        let report = UnitReport::new(vec![UnitCheck {
            component: "ir".into(),
            name: "round trip".into(),
            status: CheckStatus::Failed,
            detail: "differs".into(),
            duration_ms: 1,
        }]);
        assert_eq!(report.exit_code(), 1);
        assert!(report.render_summary_text().contains("[FAIL] ir :: round trip (differs)"));
        let dir = tempfile::tempdir().unwrap();
        let path = report.write(dir.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["mode"], "unit");
        assert_eq!(value["failed"], 1);
    }
}
