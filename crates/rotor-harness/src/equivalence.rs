//! Check stage: decide whether the emitted program behaves like the
//! reference one.
//!
//! Outcome mapping:
//! - no parseable representation, solver failure, or a model that does not
//!   actually separate the programs: `error`
//! - identical definitions or an UNSAT miter: `equivalent`
//! - an interface mismatch or a confirmed SAT model: `inequivalent`
//! - solver timeout or `unknown`: `unknown`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rotor_ir::miter::{compare_outputs, equivalence_query, model_inputs, OutputDiff};
use rotor_ir::BehaviorProgram;
use rotor_smt::backends::btormc::Btor2ModelChecker;
use rotor_smt::backends::exhaustive::ExhaustiveSolver;
use rotor_smt::backends::smtlib_process::SmtLibProcessSolver;
use rotor_smt::backends::ProcessSolverConfig;
use rotor_smt::eval::{Env, Value};
use rotor_smt::query::SmtQuery;
use rotor_smt::solver::{SatResult, SmtSolver};
use rotor_smt::SolverError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{SolverBackend, SolverConfig};
use crate::corpus::BenchmarkCase;
use crate::replay::ReplayEvidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EquivalenceOutcome {
    Equivalent,
    Inequivalent,
    Unknown,
    Error,
}

/// One input of a counterexample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CexInput {
    pub name: String,
    pub sort: String,
    /// Decimal value; `true`/`false` for booleans.
    pub value: String,
}

/// Inputs on which the programs disagree, with the disagreeing outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counterexample {
    pub inputs: Vec<CexInput>,
    pub outputs: Vec<OutputDiff>,
    #[serde(skip)]
    pub values: Env,
}

impl Counterexample {
    fn new(program: &BehaviorProgram, values: Env, outputs: Vec<OutputDiff>) -> Self {
        let inputs = program
            .inputs
            .iter()
            .map(|(name, sort)| {
                let value = values.get(name).copied().unwrap_or(Value::zero(*sort));
                CexInput {
                    name: name.clone(),
                    sort: sort.to_string(),
                    value: match value {
                        Value::Bool(b) => b.to_string(),
                        Value::Bv { bits, .. } => bits.to_string(),
                    },
                }
            })
            .collect();
        Self {
            inputs,
            outputs,
            values,
        }
    }

    /// `x=3, y=255`
    pub fn describe_inputs(&self) -> String {
        self.inputs
            .iter()
            .map(|input| format!("{}={}", input.name, input.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquivalenceVerdict {
    pub case_id: String,
    pub outcome: EquivalenceOutcome,
    pub solver_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<Counterexample>,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayEvidence>,
}

impl EquivalenceVerdict {
    fn new(case_id: &str, outcome: EquivalenceOutcome, detail: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            case_id: case_id.to_string(),
            outcome,
            solver_ms: elapsed.as_millis() as u64,
            counterexample: None,
            detail: detail.into(),
            replay: None,
        }
    }
}

/// What a decision procedure said about a miter query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Unsat,
    /// Values for the query's input symbols.
    Sat(Env),
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum DeciderError {
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("{0}")]
    Other(String),
}

/// Port: decides a miter query within `timeout`.
///
/// With `dump_dir`, the backend keeps the query it generated there.
pub trait Decider: Send + Sync {
    fn name(&self) -> &str;

    fn decide(&self, query: &SmtQuery, timeout: Duration, dump_dir: Option<&Path>) -> Result<Decision, DeciderError>;
}

/// The configured solver backend.
#[derive(Debug, Clone)]
pub struct SolverDecider {
    config: SolverConfig,
}

impl SolverDecider {
    pub fn new(config: &SolverConfig) -> Self {
        Self { config: config.clone() }
    }

    fn process_config(&self, timeout: Duration, query_path: Option<PathBuf>) -> ProcessSolverConfig {
        let mut process = ProcessSolverConfig::new(self.config.command(), timeout);
        process.args = self.config.args.clone();
        process.memory_mb = self.config.memory_mb;
        process.query_path = query_path;
        process
    }
}

fn solve<S: SmtSolver<Error = SolverError>>(mut solver: S, query: &SmtQuery) -> Result<Decision, DeciderError> {
    let (result, model) = solver.solve_query(query)?;
    Ok(match result {
        SatResult::Unsat => Decision::Unsat,
        SatResult::Sat => Decision::Sat(model.map(|m| m.to_env()).unwrap_or_default()),
        SatResult::Unknown(reason) => Decision::Unknown(reason),
    })
}

impl Decider for SolverDecider {
    fn name(&self) -> &str {
        self.config.backend.as_str()
    }

    fn decide(&self, query: &SmtQuery, timeout: Duration, dump_dir: Option<&Path>) -> Result<Decision, DeciderError> {
        match self.config.backend {
            SolverBackend::Smtlib => {
                let path = dump_dir.map(|dir| dir.join("query.smt2"));
                solve(SmtLibProcessSolver::new(self.process_config(timeout, path)), query)
            }
            SolverBackend::Btor2 => {
                let path = dump_dir.map(|dir| dir.join("query.btor2"));
                let mut process = self.process_config(timeout, path);
                let mut args = vec!["-kmax".to_string(), self.config.kmax.to_string()];
                args.append(&mut process.args);
                process.args = args;
                solve(Btor2ModelChecker::new(process), query)
            }
            SolverBackend::Exhaustive => solve(ExhaustiveSolver::new(self.config.exhaustive_bits, timeout), query),
        }
    }
}

/// Parameters of one check.
#[derive(Debug, Clone)]
pub struct CheckRequest<'a> {
    pub case_id: &'a str,
    pub timeout: Duration,
    pub dump_dir: Option<&'a Path>,
}

/// Builds miter queries and interprets the decider's answer.
#[derive(Clone)]
pub struct EquivalenceChecker {
    decider: Arc<dyn Decider>,
    timeout: Duration,
    dump_queries: bool,
}

impl EquivalenceChecker {
    pub fn new(decider: Arc<dyn Decider>, timeout: Duration) -> Self {
        Self {
            decider,
            timeout,
            dump_queries: false,
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(
            Arc::new(SolverDecider::new(config)),
            Duration::from_secs(config.timeout_secs),
        )
        .with_dump_queries(config.dump_queries)
    }

    pub fn with_dump_queries(mut self, dump: bool) -> Self {
        self.dump_queries = dump;
        self
    }

    pub fn decider_name(&self) -> &str {
        self.decider.name()
    }

    /// The request for `case`, honoring its solver timeout override.
    pub fn request_for<'a>(&self, case: &'a BenchmarkCase, work_dir: &'a Path) -> CheckRequest<'a> {
        CheckRequest {
            case_id: &case.id,
            timeout: case
                .timeouts
                .solver_secs
                .map(Duration::from_secs)
                .unwrap_or(self.timeout),
            dump_dir: self.dump_queries.then_some(work_dir),
        }
    }

    /// Load the emitted representation and check it against `original`.
    pub fn check_file(&self, original: &BehaviorProgram, translated: &Path, request: &CheckRequest<'_>) -> EquivalenceVerdict {
        match rotor_ir::load_file(translated) {
            Ok(program) => self.check(original, &program, request),
            Err(err) => {
                debug!(case = %request.case_id, error = %err, "representation rejected");
                EquivalenceVerdict::new(
                    request.case_id,
                    EquivalenceOutcome::Error,
                    format!("unparseable representation: {err}"),
                    Duration::ZERO,
                )
            }
        }
    }

    pub fn check(&self, original: &BehaviorProgram, translated: &BehaviorProgram, request: &CheckRequest<'_>) -> EquivalenceVerdict {
        let case_id = request.case_id;
        if original.same_definition(translated) {
            return EquivalenceVerdict::new(
                case_id,
                EquivalenceOutcome::Equivalent,
                "identical definitions",
                Duration::ZERO,
            );
        }
        let query = match equivalence_query(original, translated) {
            Ok(query) => query,
            Err(mismatch) => {
                return EquivalenceVerdict::new(
                    case_id,
                    EquivalenceOutcome::Inequivalent,
                    mismatch.to_string(),
                    Duration::ZERO,
                );
            }
        };

        let started = Instant::now();
        let decision = self.decider.decide(&query, request.timeout, request.dump_dir);
        let elapsed = started.elapsed();
        let verdict = match decision {
            Ok(Decision::Unsat) => EquivalenceVerdict::new(
                case_id,
                EquivalenceOutcome::Equivalent,
                "no input distinguishes the outputs",
                elapsed,
            ),
            Ok(Decision::Unknown(reason)) => {
                EquivalenceVerdict::new(case_id, EquivalenceOutcome::Unknown, reason, elapsed)
            }
            Ok(Decision::Sat(model)) => {
                let inputs = model_inputs(original, &model);
                match compare_outputs(original, translated, &inputs) {
                    Ok(diffs) if diffs.is_empty() => EquivalenceVerdict::new(
                        case_id,
                        EquivalenceOutcome::Error,
                        "solver model does not separate the programs",
                        elapsed,
                    ),
                    Ok(diffs) => {
                        let cex = Counterexample::new(original, inputs, diffs);
                        let detail = format!(
                            "outputs differ at {}: {}",
                            cex.describe_inputs(),
                            cex.outputs
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join("; ")
                        );
                        let mut verdict =
                            EquivalenceVerdict::new(case_id, EquivalenceOutcome::Inequivalent, detail, elapsed);
                        verdict.counterexample = Some(cex);
                        verdict
                    }
                    Err(err) => EquivalenceVerdict::new(
                        case_id,
                        EquivalenceOutcome::Error,
                        format!("cannot evaluate solver model: {err}"),
                        elapsed,
                    ),
                }
            }
            Err(err) => EquivalenceVerdict::new(
                case_id,
                EquivalenceOutcome::Error,
                format!("{} backend failed: {err}", self.decider.name()),
                elapsed,
            ),
        };
        info!(
            case = %case_id,
            backend = self.decider.name(),
            outcome = ?verdict.outcome,
            solver_ms = verdict.solver_ms,
            "check finished"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedDecider;
    use proptest::prelude::*;

    const INC: &str = "program inc\ninput x : bv8\noutput r : bv8 = (bvadd x #x01)\n";
    const INC_REWRITE: &str = "program inc\ninput x : bv8\noutput r : bv8 = (bvsub x #xff)\n";
    const INC_BROKEN: &str = "program inc\ninput x : bv8\noutput r : bv8 = (bvxor (bvadd x #x01) #x04)\n";

    fn program(src: &str) -> BehaviorProgram {
        rotor_ir::load(src, "t.bvp").unwrap()
    }

    fn request() -> CheckRequest<'static> {
        CheckRequest {
            case_id: "alu/inc",
            timeout: Duration::from_secs(5),
            dump_dir: None,
        }
    }

    fn exhaustive() -> EquivalenceChecker {
        let config = SolverConfig {
            backend: SolverBackend::Exhaustive,
            ..SolverConfig::default()
        };
        EquivalenceChecker::from_config(&config)
    }

    #[test]
    fn identical_programs_skip_the_solver() {
        let decider = Arc::new(ScriptedDecider::failing("must not be called"));
        let checker = EquivalenceChecker::new(decider.clone(), Duration::from_secs(1));
        let verdict = checker.check(&program(INC), &program(INC), &request());
        assert_eq!(verdict.outcome, EquivalenceOutcome::Equivalent);
        assert_eq!(decider.calls(), 0);
    }

    #[test]
    fn exhaustive_backend_proves_a_rewrite() {
        let verdict = exhaustive().check(&program(INC), &program(INC_REWRITE), &request());
        assert_eq!(verdict.outcome, EquivalenceOutcome::Equivalent, "{}", verdict.detail);
        assert!(verdict.counterexample.is_none());
    }

    #[test]
    fn exhaustive_backend_finds_a_counterexample() {
        let verdict = exhaustive().check(&program(INC), &program(INC_BROKEN), &request());
        assert_eq!(verdict.outcome, EquivalenceOutcome::Inequivalent);
        let cex = verdict.counterexample.unwrap();
        assert_eq!(cex.inputs.len(), 1);
        assert_eq!(cex.inputs[0].name, "x");
        assert_eq!(cex.inputs[0].sort, "bv8");
        assert_eq!(cex.outputs.len(), 1);
        assert_eq!(cex.outputs[0].name, "r");
        assert!(verdict.detail.starts_with("outputs differ at x="));
    }

    #[test]
    fn interface_mismatch_is_inequivalent_without_a_query() {
        let decider = Arc::new(ScriptedDecider::failing("must not be called"));
        let checker = EquivalenceChecker::new(decider.clone(), Duration::from_secs(1));
        let translated = program("program inc\ninput x : bv16\noutput r : bv16 = x\n");
        let verdict = checker.check(&program(INC), &translated, &request());
        assert_eq!(verdict.outcome, EquivalenceOutcome::Inequivalent);
        assert!(verdict.counterexample.is_none());
        assert!(verdict.detail.contains("inputs differ"));
        assert_eq!(decider.calls(), 0);
    }

    #[test]
    fn unknown_and_failures_map_to_inconclusive_and_error() {
        let unknown = EquivalenceChecker::new(
            Arc::new(ScriptedDecider::answering(Decision::Unknown("timeout".into()))),
            Duration::from_secs(1),
        );
        let verdict = unknown.check(&program(INC), &program(INC_REWRITE), &request());
        assert_eq!(verdict.outcome, EquivalenceOutcome::Unknown);
        assert_eq!(verdict.detail, "timeout");

        let failing = EquivalenceChecker::new(Arc::new(ScriptedDecider::failing("solver crashed")), Duration::from_secs(1));
        let verdict = failing.check(&program(INC), &program(INC_REWRITE), &request());
        assert_eq!(verdict.outcome, EquivalenceOutcome::Error);
        assert!(verdict.detail.contains("solver crashed"));
    }

    #[test]
    fn spurious_models_are_errors() {
        // x = 0 does not separate `x + 1` from `x - 255`.
        let mut model = Env::new();
        model.insert("in_x".into(), Value::bv(0, 8));
        let checker = EquivalenceChecker::new(
            Arc::new(ScriptedDecider::answering(Decision::Sat(model))),
            Duration::from_secs(1),
        );
        let verdict = checker.check(&program(INC), &program(INC_REWRITE), &request());
        assert_eq!(verdict.outcome, EquivalenceOutcome::Error);
    }

    #[test]
    fn unparseable_representation_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translated.bvp");
        std::fs::write(&path, "program broken\noutput r : bv8 = (bvadd y\n").unwrap();
        let verdict = exhaustive().check_file(&program(INC), &path, &request());
        assert_eq!(verdict.outcome, EquivalenceOutcome::Error);
        assert!(verdict.detail.starts_with("unparseable representation"));
    }

    #[test]
    fn case_override_and_dump_dir_shape_the_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut case = crate::fakes::case_fixture(dir.path(), "alu/inc", INC).unwrap();
        case.timeouts.solver_secs = Some(7);
        let checker = exhaustive().with_dump_queries(true);
        let request = checker.request_for(&case, dir.path());
        assert_eq!(request.timeout, Duration::from_secs(7));
        assert_eq!(request.dump_dir, Some(dir.path()));
    }

    /// Small bv8 expressions over `x` and `y`.
    fn bv8_expr() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            Just("x".to_string()),
            Just("y".to_string()),
            any::<u8>().prop_map(|v| format!("#x{v:02x}")),
        ];
        leaf.prop_recursive(3, 12, 2, |inner| {
            prop_oneof![
                (
                    prop::sample::select(vec!["bvadd", "bvsub", "bvmul", "bvand", "bvor", "bvxor", "bvshl"]),
                    inner.clone(),
                    inner.clone()
                )
                    .prop_map(|(op, a, b)| format!("({op} {a} {b})")),
                inner.prop_map(|a| format!("(bvnot {a})")),
            ]
        })
    }

    fn generated(body: &str) -> BehaviorProgram {
        program(&format!("program gen\ninput x : bv8\ninput y : bv8\noutput r : bv8 = {body}\n"))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn every_program_is_equivalent_to_itself(body in bv8_expr()) {
            let p = generated(&body);
            let verdict = exhaustive().check(&p, &p, &request());
            prop_assert_eq!(verdict.outcome, EquivalenceOutcome::Equivalent);

            // Same function, different definition: decided by the backend.
            let twice_flipped = generated(&format!("(bvxor (bvxor {body} #x01) #x01)"));
            let verdict = exhaustive().check(&p, &twice_flipped, &request());
            prop_assert_eq!(verdict.outcome, EquivalenceOutcome::Equivalent, "{}", verdict.detail);
        }

        #[test]
        fn a_flipped_output_bit_is_caught(body in bv8_expr()) {
            let p = generated(&body);
            let flipped = generated(&format!("(bvxor {body} #x01)"));
            let verdict = exhaustive().check(&p, &flipped, &request());
            prop_assert_eq!(verdict.outcome, EquivalenceOutcome::Inequivalent, "{}", verdict.detail);
            let cex = verdict.counterexample.unwrap();
            prop_assert_eq!(cex.inputs.len(), 2);
            prop_assert_eq!(cex.outputs.len(), 1);
            prop_assert_eq!(cex.outputs[0].name.as_str(), "r");
        }
    }
}
