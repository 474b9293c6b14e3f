//! A closed satisfiability problem: free inputs, defined constants in
//! dependency order, and the assertions to satisfy.

use crate::eval::{eval, Env, EvalError, Value};
use crate::sorts::SmtSort;
use crate::terms::{SmtTerm, SortError};

/// A named constant defined by a term over inputs and earlier definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub sort: SmtSort,
    pub term: SmtTerm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtQuery {
    pub inputs: Vec<(String, SmtSort)>,
    pub definitions: Vec<Definition>,
    pub assertions: Vec<SmtTerm>,
}

impl SmtQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_input(&mut self, name: impl Into<String>, sort: SmtSort) {
        self.inputs.push((name.into(), sort));
    }

    pub fn define(&mut self, name: impl Into<String>, sort: SmtSort, term: SmtTerm) {
        self.definitions.push(Definition {
            name: name.into(),
            sort,
            term,
        });
    }

    pub fn assert(&mut self, term: SmtTerm) {
        self.assertions.push(term);
    }

    /// Total number of input bits (the size of the search space in bits).
    pub fn input_bits(&self) -> u64 {
        self.inputs
            .iter()
            .map(|(_, sort)| u64::from(sort.bit_width()))
            .sum()
    }

    pub fn sort_of(&self, name: &str) -> Option<SmtSort> {
        self.inputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
            .or_else(|| {
                self.definitions
                    .iter()
                    .find(|d| d.name == name)
                    .map(|d| d.sort)
            })
    }

    /// Check that every definition only refers to names declared before it,
    /// has its declared sort, and that every assertion is boolean.
    pub fn validate(&self) -> Result<(), SortError> {
        let mut known: std::collections::HashMap<&str, SmtSort> = std::collections::HashMap::new();
        for (name, sort) in &self.inputs {
            if !sort.is_valid() {
                return Err(SortError(format!("input `{name}` has invalid sort {sort}")));
            }
            if known.insert(name.as_str(), *sort).is_some() {
                return Err(SortError(format!("`{name}` declared twice")));
            }
        }
        for def in &self.definitions {
            let scope = |n: &str| known.get(n).copied();
            let inferred = def.term.infer_sort(&scope)?;
            if inferred != def.sort {
                return Err(SortError(format!(
                    "`{}` declared {} but defined as {inferred}",
                    def.name, def.sort
                )));
            }
            if known.insert(def.name.as_str(), def.sort).is_some() {
                return Err(SortError(format!("`{}` declared twice", def.name)));
            }
        }
        let scope = |n: &str| known.get(n).copied();
        for assertion in &self.assertions {
            if assertion.infer_sort(&scope)? != SmtSort::Bool {
                return Err(SortError("assertion is not boolean".into()));
            }
        }
        Ok(())
    }

    /// Evaluate all definitions under the given input values. Missing
    /// inputs default to zero.
    pub fn evaluate_definitions(&self, inputs: &Env) -> Result<Env, EvalError> {
        let mut env = Env::with_capacity(self.inputs.len() + self.definitions.len());
        for (name, sort) in &self.inputs {
            let value = inputs.get(name).copied().unwrap_or(Value::zero(*sort));
            env.insert(name.clone(), value);
        }
        for def in &self.definitions {
            let value = eval(&def.term, &env)?;
            env.insert(def.name.clone(), value);
        }
        Ok(env)
    }

    /// Whether every assertion holds under the given inputs.
    pub fn is_satisfied_by(&self, inputs: &Env) -> Result<bool, EvalError> {
        let env = self.evaluate_definitions(inputs)?;
        for assertion in &self.assertions {
            match eval(assertion, &env)? {
                Value::Bool(true) => {}
                Value::Bool(false) => return Ok(false),
                Value::Bv { .. } => return Err(EvalError::IllSorted { op: "assert" }),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling_query() -> SmtQuery {
        let mut q = SmtQuery::new();
        q.declare_input("x", SmtSort::BitVec(8));
        q.define("a", SmtSort::BitVec(8), SmtTerm::var("x").add(SmtTerm::var("x")));
        q.define("b", SmtSort::BitVec(8), SmtTerm::var("x").shl(SmtTerm::bv(1, 8)));
        q.assert(SmtTerm::var("a").distinct(SmtTerm::var("b")));
        q
    }

    #[test]
    fn validates_well_formed_query() {
        let q = doubling_query();
        assert_eq!(q.validate(), Ok(()));
        assert_eq!(q.input_bits(), 8);
        assert_eq!(q.sort_of("a"), Some(SmtSort::BitVec(8)));
    }

    #[test]
    fn rejects_forward_references_and_sort_lies() {
        let mut q = SmtQuery::new();
        q.declare_input("x", SmtSort::BitVec(8));
        q.define("a", SmtSort::BitVec(8), SmtTerm::var("b"));
        q.define("b", SmtSort::BitVec(8), SmtTerm::var("x"));
        assert!(q.validate().is_err());

        let mut q = SmtQuery::new();
        q.declare_input("x", SmtSort::BitVec(8));
        q.define("a", SmtSort::Bool, SmtTerm::var("x"));
        assert!(q.validate().is_err());
    }

    #[test]
    fn evaluates_with_zero_default_inputs() {
        let q = doubling_query();
        let env = q.evaluate_definitions(&Env::new()).unwrap();
        assert_eq!(env["a"], Value::bv(0, 8));
        assert!(!q.is_satisfied_by(&Env::new()).unwrap());
    }
}
