//! Equivalence queries between two behavior programs.
//!
//! The query is satisfiable exactly when some input makes at least one
//! output differ.

use std::fmt;

use indexmap::IndexMap;
use rotor_smt::eval::{Env, EvalError, Value};
use rotor_smt::query::SmtQuery;
use rotor_smt::sorts::SmtSort;
use rotor_smt::terms::SmtTerm;
use serde::Serialize;

use crate::encode::{binding_symbol, declare_inputs, encode_side, input_symbol};
use crate::program::BehaviorProgram;

pub const ORIGINAL_SIDE: &str = "o";
pub const TRANSLATED_SIDE: &str = "t";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfacePart {
    Inputs,
    Outputs,
}

/// How the translated program's interface differs from the original's.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.describe())]
pub struct InterfaceMismatch {
    pub part: InterfacePart,
    /// Present in the original only.
    pub missing: Vec<String>,
    /// Present in the translated program only.
    pub extra: Vec<String>,
    /// `(name, original sort, translated sort)`
    pub resorted: Vec<(String, SmtSort, SmtSort)>,
}

impl InterfaceMismatch {
    fn describe(&self) -> String {
        let part = match self.part {
            InterfacePart::Inputs => "inputs",
            InterfacePart::Outputs => "outputs",
        };
        let mut pieces = Vec::new();
        if !self.missing.is_empty() {
            pieces.push(format!("missing in translation: {}", self.missing.join(", ")));
        }
        if !self.extra.is_empty() {
            pieces.push(format!("only in translation: {}", self.extra.join(", ")));
        }
        for (name, original, translated) in &self.resorted {
            pieces.push(format!("`{name}` is {original} in the original but {translated} in translation"));
        }
        format!("{part} differ: {}", pieces.join("; "))
    }
}

fn compare_interface(
    part: InterfacePart,
    original: &IndexMap<&str, SmtSort>,
    translated: &IndexMap<&str, SmtSort>,
) -> Result<(), InterfaceMismatch> {
    let mut mismatch = InterfaceMismatch {
        part,
        missing: Vec::new(),
        extra: Vec::new(),
        resorted: Vec::new(),
    };
    for (name, sort) in original {
        match translated.get(name) {
            None => mismatch.missing.push(name.to_string()),
            Some(other) if other != sort => mismatch.resorted.push((name.to_string(), *sort, *other)),
            Some(_) => {}
        }
    }
    for name in translated.keys() {
        if !original.contains_key(name) {
            mismatch.extra.push(name.to_string());
        }
    }
    if mismatch.missing.is_empty() && mismatch.extra.is_empty() && mismatch.resorted.is_empty() {
        Ok(())
    } else {
        Err(mismatch)
    }
}

/// Both programs must declare the same inputs and the same outputs, by
/// name and sort. Declaration order does not matter.
pub fn check_interface(original: &BehaviorProgram, translated: &BehaviorProgram) -> Result<(), InterfaceMismatch> {
    fn inputs(p: &BehaviorProgram) -> IndexMap<&str, SmtSort> {
        p.inputs.iter().map(|(n, s)| (n.as_str(), *s)).collect()
    }
    // Inputs first so the more basic mismatch is the one reported.
    compare_interface(InterfacePart::Inputs, &inputs(original), &inputs(translated))?;
    compare_interface(
        InterfacePart::Outputs,
        &original.output_sorts(),
        &translated.output_sorts(),
    )
}

/// Build the miter query: shared inputs, both sides' bindings, and the
/// disjunction of `distinct` over the outputs in the original's order.
pub fn equivalence_query(
    original: &BehaviorProgram,
    translated: &BehaviorProgram,
) -> Result<SmtQuery, InterfaceMismatch> {
    check_interface(original, translated)?;
    let mut query = SmtQuery::new();
    declare_inputs(original, &mut query);
    encode_side(original, ORIGINAL_SIDE, &mut query);
    encode_side(translated, TRANSLATED_SIDE, &mut query);
    let differs = original
        .outputs()
        .map(|out| {
            SmtTerm::var(binding_symbol(ORIGINAL_SIDE, &out.name))
                .distinct(SmtTerm::var(binding_symbol(TRANSLATED_SIDE, &out.name)))
        })
        .collect();
    query.assert(SmtTerm::or(differs));
    Ok(query)
}

/// Map a model over the query's input symbols back to program inputs.
/// Inputs the model leaves out are zero.
pub fn model_inputs(program: &BehaviorProgram, model: &Env) -> Env {
    program
        .inputs
        .iter()
        .map(|(name, sort)| {
            let value = model
                .get(&input_symbol(name))
                .copied()
                .filter(|v| v.sort() == *sort)
                .unwrap_or(Value::zero(*sort));
            (name.clone(), value)
        })
        .collect()
}

/// One output on which the programs disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDiff {
    pub name: String,
    pub original: String,
    pub translated: String,
}

impl fmt::Display for OutputDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} vs {}", self.name, self.original, self.translated)
    }
}

/// Evaluate both programs at `inputs` and list the differing outputs in
/// the original's order. Empty means they agree at this point.
pub fn compare_outputs(
    original: &BehaviorProgram,
    translated: &BehaviorProgram,
    inputs: &Env,
) -> Result<Vec<OutputDiff>, EvalError> {
    let left = original.evaluate(inputs)?;
    let right = translated.evaluate(inputs)?;
    let mut diffs = Vec::new();
    for (name, value) in &left {
        let other = right.get(name).ok_or_else(|| EvalError::Unbound(name.clone()))?;
        if value != other {
            diffs.push(OutputDiff {
                name: name.clone(),
                original: value.to_string(),
                translated: other.to_string(),
            });
        }
    }
    Ok(diffs)
}
