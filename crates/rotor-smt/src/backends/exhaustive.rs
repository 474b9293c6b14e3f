use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::SolverError;
use crate::eval::{Env, Value};
use crate::solver::{Model, ModelValue, QueryBuffer, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Hard ceiling on the enumeration budget.
pub const MAX_EXHAUSTIVE_BITS: u32 = 32;

const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Decides small queries in-process by trying every input assignment.
///
/// Queries with more than `max_bits` input bits come back `unknown`.
pub struct ExhaustiveSolver {
    max_bits: u32,
    timeout: Duration,
    buffer: QueryBuffer,
}

impl ExhaustiveSolver {
    pub fn new(max_bits: u32, timeout: Duration) -> Self {
        Self {
            max_bits: max_bits.min(MAX_EXHAUSTIVE_BITS),
            timeout,
            buffer: QueryBuffer::default(),
        }
    }
}

/// Spread the low bits of `counter` over the inputs, first input lowest.
fn assignment(inputs: &[(String, SmtSort)], mut counter: u64) -> Env {
    let mut env = Env::with_capacity(inputs.len());
    for (name, sort) in inputs {
        let width = sort.bit_width();
        let raw = counter & ((1u64 << width) - 1);
        counter >>= width;
        env.insert(name.clone(), Value::from_raw(*sort, u128::from(raw)));
    }
    env
}

impl SmtSolver for ExhaustiveSolver {
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
        let bits = query.input_bits();
        if bits > u64::from(self.max_bits) {
            return Ok((
                SatResult::Unknown(format!(
                    "input space of {bits} bits exceeds exhaustive budget of {} bits",
                    self.max_bits
                )),
                None,
            ));
        }

        let started = Instant::now();
        let total = 1u64 << bits;
        for counter in 0..total {
            if counter % DEADLINE_CHECK_INTERVAL == 0 && started.elapsed() >= self.timeout {
                return Ok((
                    SatResult::Unknown(format!(
                        "timeout after {counter} of {total} assignments"
                    )),
                    None,
                ));
            }
            let env = assignment(&query.inputs, counter);
            if query.is_satisfied_by(&env)? {
                debug!(counter, total, "exhaustive search found a model");
                let values = var_names
                    .iter()
                    .filter_map(|(name, _)| {
                        env.get(*name).map(|value| {
                            let model_value = match value {
                                Value::Bool(b) => ModelValue::Bool(*b),
                                Value::Bv { bits, width } => ModelValue::BitVec {
                                    value: *bits,
                                    width: *width,
                                },
                            };
                            (name.to_string(), model_value)
                        })
                    })
                    .collect();
                return Ok((SatResult::Sat, Some(Model { values })));
            }
        }
        Ok((SatResult::Unsat, None))
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SmtQuery;
    use crate::terms::BvCmpOp;

    #[test]
    fn finds_the_unique_model() {
        let mut query = SmtQuery::new();
        query.declare_input("x", SmtSort::BitVec(8));
        query.assert(SmtTerm::var("x").eq(SmtTerm::bv(0x5a, 8)));
        let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(10));
        let (result, model) = solver.solve_query(&query).unwrap();
        assert_eq!(result, SatResult::Sat);
        assert_eq!(model.unwrap().get_bv("x"), Some(0x5a));
    }

    #[test]
    fn proves_doubling_identity() {
        let mut query = SmtQuery::new();
        query.declare_input("x", SmtSort::BitVec(12));
        query.define("a", SmtSort::BitVec(12), SmtTerm::var("x").add(SmtTerm::var("x")));
        query.define("b", SmtSort::BitVec(12), SmtTerm::var("x").shl(SmtTerm::bv(1, 12)));
        query.assert(SmtTerm::var("a").distinct(SmtTerm::var("b")));
        let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(10));
        assert_eq!(solver.check_sat_after_load(&query), SatResult::Unsat);
    }

    #[test]
    fn inputs_are_assigned_independently() {
        let mut query = SmtQuery::new();
        query.declare_input("a", SmtSort::BitVec(4));
        query.declare_input("flag", SmtSort::Bool);
        query.declare_input("b", SmtSort::BitVec(4));
        query.assert(SmtTerm::and(vec![
            SmtTerm::var("flag"),
            SmtTerm::compare(BvCmpOp::Ugt, SmtTerm::var("a"), SmtTerm::bv(13, 4)),
            SmtTerm::var("b").eq(SmtTerm::bv(9, 4)),
        ]));
        let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(10));
        let model = solver.solve_query(&query).unwrap().1.unwrap();
        assert_eq!(model.get_bv("a"), Some(14));
        assert_eq!(model.get_bool("flag"), Some(true));
        assert_eq!(model.get_bv("b"), Some(9));
    }

    #[test]
    fn oversized_space_is_unknown() {
        let mut query = SmtQuery::new();
        query.declare_input("x", SmtSort::BitVec(64));
        query.assert(SmtTerm::bool(true));
        let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(10));
        assert!(matches!(solver.solve_query(&query).unwrap().0, SatResult::Unknown(_)));
    }

    #[test]
    fn zero_timeout_is_unknown() {
        let mut query = SmtQuery::new();
        query.declare_input("x", SmtSort::BitVec(8));
        query.assert(SmtTerm::bool(false));
        let mut solver = ExhaustiveSolver::new(20, Duration::ZERO);
        assert!(matches!(solver.solve_query(&query).unwrap().0, SatResult::Unknown(_)));
    }

    impl ExhaustiveSolver {
        fn check_sat_after_load(&mut self, query: &SmtQuery) -> SatResult {
            self.load_query(query).unwrap();
            self.check_sat().unwrap()
        }
    }
}
