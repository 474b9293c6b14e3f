//! Encoding of behavior programs into solver constants.
//!
//! Inputs become shared constants `in_<name>`. Bindings become defined
//! constants `<side>_<name>`, so two programs with overlapping binding
//! names can live in one query.

use rotor_smt::query::SmtQuery;
use rotor_smt::terms::SmtTerm;

use crate::program::BehaviorProgram;

pub const INPUT_PREFIX: &str = "in_";

pub fn input_symbol(name: &str) -> String {
    format!("{INPUT_PREFIX}{name}")
}

pub fn binding_symbol(side: &str, name: &str) -> String {
    format!("{side}_{name}")
}

/// Rebuild `term` with every variable renamed by `rename`.
pub fn rename_vars<F>(term: &SmtTerm, rename: &F) -> SmtTerm
where
    F: Fn(&str) -> String,
{
    let go = |t: &SmtTerm| Box::new(rename_vars(t, rename));
    match term {
        SmtTerm::Var(name) => SmtTerm::Var(rename(name)),
        SmtTerm::BoolLit(_) | SmtTerm::BvLit { .. } => term.clone(),
        SmtTerm::Not(a) => SmtTerm::Not(go(a)),
        SmtTerm::And(ts) => SmtTerm::And(ts.iter().map(|t| rename_vars(t, rename)).collect()),
        SmtTerm::Or(ts) => SmtTerm::Or(ts.iter().map(|t| rename_vars(t, rename)).collect()),
        SmtTerm::Xor(a, b) => SmtTerm::Xor(go(a), go(b)),
        SmtTerm::Implies(a, b) => SmtTerm::Implies(go(a), go(b)),
        SmtTerm::Eq(a, b) => SmtTerm::Eq(go(a), go(b)),
        SmtTerm::Distinct(a, b) => SmtTerm::Distinct(go(a), go(b)),
        SmtTerm::Ite(c, a, b) => SmtTerm::Ite(go(c), go(a), go(b)),
        SmtTerm::BvUnary(op, a) => SmtTerm::BvUnary(*op, go(a)),
        SmtTerm::BvBinary(op, a, b) => SmtTerm::BvBinary(*op, go(a), go(b)),
        SmtTerm::BvCompare(op, a, b) => SmtTerm::BvCompare(*op, go(a), go(b)),
        SmtTerm::Extract { hi, lo, arg } => SmtTerm::Extract {
            hi: *hi,
            lo: *lo,
            arg: go(arg),
        },
        SmtTerm::Concat(a, b) => SmtTerm::Concat(go(a), go(b)),
        SmtTerm::ZeroExtend { by, arg } => SmtTerm::ZeroExtend { by: *by, arg: go(arg) },
        SmtTerm::SignExtend { by, arg } => SmtTerm::SignExtend { by: *by, arg: go(arg) },
    }
}

/// Append `program`'s bindings to `query` as definitions under `side`.
///
/// The inputs are not declared here; the caller declares them once for
/// both sides.
pub fn encode_side(program: &BehaviorProgram, side: &str, query: &mut SmtQuery) {
    let rename = |name: &str| {
        if program.inputs.contains_key(name) {
            input_symbol(name)
        } else {
            binding_symbol(side, name)
        }
    };
    for binding in &program.bindings {
        query.define(
            binding_symbol(side, &binding.name),
            binding.sort,
            rename_vars(&binding.term, &rename),
        );
    }
}

/// Declare `program`'s inputs in `query` under their shared symbols.
pub fn declare_inputs(program: &BehaviorProgram, query: &mut SmtQuery) {
    for (name, sort) in &program.inputs {
        query.declare_input(input_symbol(name), *sort);
    }
}
