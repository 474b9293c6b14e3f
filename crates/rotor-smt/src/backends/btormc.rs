use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use super::btor2_printer::render_btor2;
use super::witness::parse_witness;
use super::{run_on_query_file, ProcessSolverConfig};
use crate::error::{output_excerpt, SolverError};
use crate::solver::{Model, ModelValue, QueryBuffer, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Decides a query by handing a BTOR2 model to a bounded model checker
/// (`btormc` by default) and reading the counterexample from its witness.
///
/// Empty checker output means the bad state is unreachable (UNSAT).
pub struct Btor2ModelChecker {
    config: ProcessSolverConfig,
    buffer: QueryBuffer,
}

impl Btor2ModelChecker {
    pub fn new(config: ProcessSolverConfig) -> Self {
        Self {
            config,
            buffer: QueryBuffer::default(),
        }
    }

    /// `btormc -kmax <kmax>`; the query is combinational so `kmax = 0` suffices.
    pub fn btormc(kmax: u32, timeout: Duration) -> Self {
        let mut config = ProcessSolverConfig::new("btormc", timeout);
        config.args = vec!["-kmax".to_string(), kmax.to_string()];
        Self::new(config)
    }
}

impl SmtSolver for Btor2ModelChecker {
    type Error = SolverError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), SolverError> {
        self.buffer.declare(name, sort);
        Ok(())
    }

    fn define_var(&mut self, name: &str, sort: &SmtSort, term: &SmtTerm) -> Result<(), SolverError> {
        self.buffer.define(name, sort, term);
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), SolverError> {
        self.buffer.assert(term);
        Ok(())
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), SolverError> {
        let query = self.buffer.query();
        query.validate()?;
        let model_text = render_btor2(query)?;
        let outcome = run_on_query_file(&self.config, &model_text, ".btor2")?;

        if outcome.termination.was_killed() {
            return Ok((SatResult::Unknown(outcome.termination.to_string()), None));
        }
        let stdout = outcome.stdout_lossy();
        if !outcome.termination.is_success() && !stdout.trim_start().starts_with("sat") {
            return Err(SolverError::Crashed {
                command: self.config.command.clone(),
                termination: outcome.termination.to_string(),
                excerpt: output_excerpt(&outcome.combined_log(), 160),
            });
        }
        if stdout.trim().is_empty() {
            debug!("model checker found no reachable bad state");
            return Ok((SatResult::Unsat, None));
        }

        let witness = parse_witness(&stdout)?;
        let frame = witness.frame(0).ok_or_else(|| {
            SolverError::MalformedResponse("witness has no initial frame".into())
        })?;
        // Witness input ids are positions in declaration order.
        let by_position: HashMap<u64, &str> = query
            .inputs
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (i as u64, name.as_str()))
            .collect();
        let mut assigned = HashMap::new();
        for assignment in &frame.inputs {
            if let Some(name) = by_position.get(&assignment.id) {
                let value = assignment.value().ok_or_else(|| {
                    SolverError::MalformedResponse(format!("value of `{name}` exceeds 128 bits"))
                })?;
                assigned.insert(*name, value);
            }
        }

        let mut values = HashMap::new();
        for (name, sort) in var_names {
            // Inputs the checker left out are unconstrained; zero is as good as any.
            let raw = assigned.get(name).copied().unwrap_or(0);
            let value = match sort {
                SmtSort::Bool => ModelValue::Bool(raw & 1 == 1),
                SmtSort::BitVec(width) => ModelValue::BitVec {
                    value: raw,
                    width: *width,
                },
            };
            values.insert(name.to_string(), value);
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::query::SmtQuery;

    fn mock_checker(dir: &std::path::Path, body: &str) -> Btor2ModelChecker {
        let path = dir.join("mock-btormc.sh");
        std::fs::write(&path, format!("{body}\n")).unwrap();
        let mut config = ProcessSolverConfig::new("sh", Duration::from_secs(10));
        config.args = vec![path.display().to_string()];
        Btor2ModelChecker::new(config)
    }

    fn two_input_query() -> SmtQuery {
        let mut query = SmtQuery::new();
        query.declare_input("in_x", SmtSort::BitVec(8));
        query.declare_input("in_b", SmtSort::Bool);
        query.assert(SmtTerm::var("in_b"));
        query
    }

    #[test]
    fn empty_output_is_unsat() {
        let dir = tempfile::tempdir().unwrap();
        let mut checker = mock_checker(dir.path(), "true");
        assert_eq!(checker.solve_query(&two_input_query()).unwrap().0, SatResult::Unsat);
    }

    #[test]
    fn witness_inputs_become_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut checker = mock_checker(
            dir.path(),
            "printf 'sat\\nb0\\n@0\\n0 00000101 in_x@0\\n1 1 in_b@0\\n.\\n'",
        );
        let (result, model) = checker.solve_query(&two_input_query()).unwrap();
        assert_eq!(result, SatResult::Sat);
        let model = model.unwrap();
        assert_eq!(model.get_bv("in_x"), Some(5));
        assert_eq!(model.get_bool("in_b"), Some(true));
    }

    #[test]
    fn omitted_inputs_default_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut checker = mock_checker(dir.path(), "printf 'sat\\nb0\\n@0\\n1 1\\n.\\n'");
        let model = checker.solve_query(&two_input_query()).unwrap().1.unwrap();
        assert_eq!(model.get_bv("in_x"), Some(0));
    }

    #[test]
    fn btor2_file_is_the_last_argument() {
        let dir = tempfile::tempdir().unwrap();
        let mut checker = mock_checker(dir.path(), "grep -q ' bad ' \"$1\" || echo garbage");
        assert_eq!(checker.solve_query(&two_input_query()).unwrap().0, SatResult::Unsat);
    }

    #[test]
    fn malformed_witness_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut checker = mock_checker(dir.path(), "echo garbage");
        assert!(matches!(
            checker.solve_query(&two_input_query()),
            Err(SolverError::Witness(_))
        ));
    }
}
