use std::time::Duration;

use tracing::debug;

use super::smtlib_printer::render_script;
use super::smtlib_response::{parse_check_sat, parse_model};
use super::{run_on_query_file, ProcessSolverConfig};
use crate::error::{output_excerpt, SolverError};
use crate::solver::{Model, QueryBuffer, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// A QF_BV solver driven through an SMT-LIB2 script file
/// (Bitwuzla by default).
///
/// The solver is started once per `check_sat_with_model` with the script path
/// as its last argument, so every decision runs in a fresh process.
pub struct SmtLibProcessSolver {
    config: ProcessSolverConfig,
    buffer: QueryBuffer,
}

impl SmtLibProcessSolver {
    pub fn new(config: ProcessSolverConfig) -> Self {
        Self {
            config,
            buffer: QueryBuffer::default(),
        }
    }

    pub fn bitwuzla(timeout: Duration) -> Self {
        Self::new(ProcessSolverConfig::new("bitwuzla", timeout))
    }

    pub fn config(&self) -> &ProcessSolverConfig {
        &self.config
    }
}

impl SmtSolver for SmtLibProcessSolver {
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
        let names: Vec<&str> = var_names.iter().map(|(name, _)| *name).collect();
        let script = render_script(query, &names);
        let outcome = run_on_query_file(&self.config, &script, ".smt2")?;

        if outcome.termination.was_killed() {
            debug!(termination = %outcome.termination, "solver stopped by sandbox");
            return Ok((SatResult::Unknown(outcome.termination.to_string()), None));
        }

        let stdout = outcome.stdout_lossy();
        // Some solvers exit non-zero (e.g. 10/20) after a valid answer.
        let (result, rest) = match parse_check_sat(&stdout) {
            Ok(parsed) => parsed,
            Err(SolverError::MalformedResponse(_)) if !outcome.termination.is_success() => {
                return Err(SolverError::Crashed {
                    command: self.config.command.clone(),
                    termination: outcome.termination.to_string(),
                    excerpt: output_excerpt(&outcome.combined_log(), 160),
                });
            }
            Err(err) => return Err(err),
        };
        debug!(?result, elapsed_ms = outcome.elapsed.as_millis() as u64, "solver answered");

        match result {
            SatResult::Sat => {
                let model = parse_model(rest, var_names)?;
                Ok((SatResult::Sat, Some(model)))
            }
            other => Ok((other, None)),
        }
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.buffer.clear();
        Ok(())
    }
}
