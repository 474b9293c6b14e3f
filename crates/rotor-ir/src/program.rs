//! Checked behavior programs.

use std::fmt;

use indexmap::IndexMap;
use rotor_smt::eval::{eval, Env, EvalError, Value};
use rotor_smt::sorts::SmtSort;
use rotor_smt::terms::SmtTerm;

use crate::ops::OpKind;

/// A `let` or `output` binding. Its term refers to inputs and earlier
/// bindings by their source names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    pub sort: SmtSort,
    pub term: SmtTerm,
    pub is_output: bool,
}

/// A straight-line bit-vector program: inputs, then bindings in
/// dependency order. Every name is declared exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorProgram {
    pub name: String,
    pub inputs: IndexMap<String, SmtSort>,
    pub bindings: Vec<Binding>,
}

impl BehaviorProgram {
    /// Output bindings in declaration order.
    pub fn outputs(&self) -> impl Iterator<Item = &Binding> + '_ {
        self.bindings.iter().filter(|b| b.is_output)
    }

    pub fn output_sorts(&self) -> IndexMap<&str, SmtSort> {
        self.outputs().map(|b| (b.name.as_str(), b.sort)).collect()
    }

    /// Whether both programs declare the same inputs and bindings.
    /// The program name is not part of the definition.
    pub fn same_definition(&self, other: &BehaviorProgram) -> bool {
        self.inputs.len() == other.inputs.len()
            && self.inputs.iter().zip(&other.inputs).all(|(a, b)| a == b)
            && self.bindings == other.bindings
    }

    /// Evaluate the program; returns the outputs in declaration order.
    pub fn evaluate(&self, inputs: &Env) -> Result<IndexMap<String, Value>, EvalError> {
        let mut env = Env::with_capacity(self.inputs.len() + self.bindings.len());
        for (name, sort) in &self.inputs {
            let value = inputs
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::Unbound(name.clone()))?;
            if value.sort() != *sort {
                return Err(EvalError::IllSorted { op: "input" });
            }
            env.insert(name.clone(), value);
        }
        let mut outputs = IndexMap::new();
        for binding in &self.bindings {
            let value = eval(&binding.term, &env)?;
            if binding.is_output {
                outputs.insert(binding.name.clone(), value);
            }
            env.insert(binding.name.clone(), value);
        }
        Ok(outputs)
    }

    /// Render as `.bvp` source.
    pub fn to_bvp(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BehaviorProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "program {}", self.name)?;
        for (name, sort) in &self.inputs {
            writeln!(f, "input {name} : {sort}")?;
        }
        for binding in &self.bindings {
            let keyword = if binding.is_output { "output" } else { "let" };
            let mut expr = String::new();
            write_term(&binding.term, &mut expr);
            writeln!(f, "{keyword} {} : {} = {expr}", binding.name, binding.sort)?;
        }
        Ok(())
    }
}

fn write_literal(value: u128, width: u32, out: &mut String) {
    if width % 4 == 0 {
        out.push_str(&format!("#x{:0w$x}", value, w = (width / 4) as usize));
    } else {
        out.push_str(&format!("#b{:0w$b}", value, w = width as usize));
    }
}

fn write_app(op: &str, indices: &[u32], args: &[&SmtTerm], out: &mut String) {
    out.push('(');
    out.push_str(op);
    for index in indices {
        out.push(' ');
        out.push_str(&index.to_string());
    }
    for arg in args {
        out.push(' ');
        write_term(arg, out);
    }
    out.push(')');
}

fn write_term(term: &SmtTerm, out: &mut String) {
    match term {
        SmtTerm::Var(name) => out.push_str(name),
        SmtTerm::BoolLit(b) => out.push_str(if *b { "true" } else { "false" }),
        SmtTerm::BvLit { value, width } => write_literal(*value, *width, out),
        SmtTerm::Not(a) => write_app(OpKind::Not.name(), &[], &[&**a], out),
        SmtTerm::And(terms) | SmtTerm::Or(terms) => {
            let op = if matches!(term, SmtTerm::And(_)) { OpKind::And } else { OpKind::Or };
            let args: Vec<&SmtTerm> = terms.iter().collect();
            write_app(op.name(), &[], &args, out);
        }
        SmtTerm::Xor(a, b) => write_app(OpKind::Xor.name(), &[], &[&**a, &**b], out),
        SmtTerm::Implies(a, b) => write_app(OpKind::Implies.name(), &[], &[&**a, &**b], out),
        SmtTerm::Eq(a, b) => write_app(OpKind::Eq.name(), &[], &[&**a, &**b], out),
        SmtTerm::Distinct(a, b) => write_app(OpKind::Distinct.name(), &[], &[&**a, &**b], out),
        SmtTerm::Ite(c, a, b) => write_app(OpKind::Ite.name(), &[], &[&**c, &**a, &**b], out),
        SmtTerm::BvUnary(op, a) => write_app(op.smtlib_name(), &[], &[&**a], out),
        SmtTerm::BvBinary(op, a, b) => write_app(op.smtlib_name(), &[], &[&**a, &**b], out),
        SmtTerm::BvCompare(op, a, b) => write_app(op.smtlib_name(), &[], &[&**a, &**b], out),
        SmtTerm::Extract { hi, lo, arg } => write_app(OpKind::Extract.name(), &[*hi, *lo], &[&**arg], out),
        SmtTerm::Concat(a, b) => write_app(OpKind::Concat.name(), &[], &[&**a, &**b], out),
        SmtTerm::ZeroExtend { by, arg } => write_app(OpKind::ZeroExtend.name(), &[*by], &[&**arg], out),
        SmtTerm::SignExtend { by, arg } => write_app(OpKind::SignExtend.name(), &[*by], &[&**arg], out),
    }
}
