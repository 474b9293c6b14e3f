use std::collections::HashMap;

use crate::eval::{Env, Value};
use crate::query::SmtQuery;
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    /// Undecided; the string says why (timeout, resource limit, solver said so).
    Unknown(String),
}

/// A model (variable assignments) extracted from a SAT result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelValue {
    Bool(bool),
    BitVec { value: u128, width: u32 },
}

impl ModelValue {
    pub fn to_value(self) -> Value {
        match self {
            ModelValue::Bool(b) => Value::Bool(b),
            ModelValue::BitVec { value, width } => Value::bv(value, width),
        }
    }
}

impl Model {
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ModelValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_bv(&self, name: &str) -> Option<u128> {
        match self.values.get(name) {
            Some(ModelValue::BitVec { value, .. }) => Some(*value),
            _ => None,
        }
    }

    /// Evaluation environment holding the model's values.
    pub fn to_env(&self) -> Env {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_value()))
            .collect()
    }
}

/// Abstract SMT solver interface.
///
/// Backends are one-shot: they accumulate declarations and assertions and
/// decide them with a single `check_sat_with_model`.
pub trait SmtSolver {
    type Error: std::error::Error;

    /// Declare a new free variable.
    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    /// Define a constant equal to `term`.
    fn define_var(&mut self, name: &str, sort: &SmtSort, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Assert a constraint.
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Check satisfiability and extract a model over `var_names` if SAT.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// Check satisfiability.
    fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
        self.check_sat_with_model(&[]).map(|(result, _)| result)
    }

    /// Drop every declaration and assertion.
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Load a whole query.
    fn load_query(&mut self, query: &SmtQuery) -> Result<(), Self::Error> {
        for (name, sort) in &query.inputs {
            self.declare_var(name, sort)?;
        }
        for def in &query.definitions {
            self.define_var(&def.name, &def.sort, &def.term)?;
        }
        for assertion in &query.assertions {
            self.assert(assertion)?;
        }
        Ok(())
    }

    /// Load `query` and decide it, with a model over its inputs on SAT.
    fn solve_query(&mut self, query: &SmtQuery) -> Result<(SatResult, Option<Model>), Self::Error> {
        self.load_query(query)?;
        let vars: Vec<(&str, &SmtSort)> = query
            .inputs
            .iter()
            .map(|(name, sort)| (name.as_str(), sort))
            .collect();
        self.check_sat_with_model(&vars)
    }
}

/// Declarations and assertions collected by a one-shot backend.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryBuffer {
    query: SmtQuery,
}

impl QueryBuffer {
    pub(crate) fn declare(&mut self, name: &str, sort: &SmtSort) {
        self.query.declare_input(name, *sort);
    }

    pub(crate) fn define(&mut self, name: &str, sort: &SmtSort, term: &SmtTerm) {
        self.query.define(name, *sort, term.clone());
    }

    pub(crate) fn assert(&mut self, term: &SmtTerm) {
        self.query.assert(term.clone());
    }

    pub(crate) fn query(&self) -> &SmtQuery {
        &self.query
    }

    pub(crate) fn clear(&mut self) {
        self.query = SmtQuery::default();
    }
}
