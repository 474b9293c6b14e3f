//! Rendering of an [`SmtQuery`] as a BTOR2 model whose single bad-state
//! property holds exactly when all assertions hold in the initial step.
//!
//! Booleans are 1-bit bit-vectors. Inputs are emitted first, in query order,
//! so the witness input ids line up with `query.inputs`.

use std::collections::HashMap;

use crate::query::SmtQuery;
use crate::terms::{BvBinOp, BvCmpOp, BvUnOp, SmtTerm, SortError};

fn binary_op(op: BvBinOp) -> &'static str {
    match op {
        BvBinOp::Add => "add",
        BvBinOp::Sub => "sub",
        BvBinOp::Mul => "mul",
        BvBinOp::Udiv => "udiv",
        BvBinOp::Urem => "urem",
        BvBinOp::Sdiv => "sdiv",
        BvBinOp::Srem => "srem",
        BvBinOp::And => "and",
        BvBinOp::Or => "or",
        BvBinOp::Xor => "xor",
        BvBinOp::Shl => "sll",
        BvBinOp::Lshr => "srl",
        BvBinOp::Ashr => "sra",
    }
}

fn compare_op(op: BvCmpOp) -> &'static str {
    match op {
        BvCmpOp::Ult => "ult",
        BvCmpOp::Ule => "ulte",
        BvCmpOp::Ugt => "ugt",
        BvCmpOp::Uge => "ugte",
        BvCmpOp::Slt => "slt",
        BvCmpOp::Sle => "slte",
        BvCmpOp::Sgt => "sgt",
        BvCmpOp::Sge => "sgte",
    }
}

#[derive(Default)]
struct Emitter {
    lines: Vec<String>,
    next_id: u64,
    sorts: HashMap<u32, u64>,
    names: HashMap<String, (u64, u32)>,
}

impl Emitter {
    fn fresh(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn sort(&mut self, width: u32) -> u64 {
        if let Some(sid) = self.sorts.get(&width) {
            return *sid;
        }
        let sid = self.fresh();
        self.lines.push(format!("{sid} sort bitvec {width}"));
        self.sorts.insert(width, sid);
        sid
    }

    fn node(&mut self, op: &str, width: u32, args: &[String]) -> u64 {
        let sid = self.sort(width);
        let nid = self.fresh();
        let mut line = format!("{nid} {op} {sid}");
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.lines.push(line);
        nid
    }

    fn constant(&mut self, value: u128, width: u32) -> u64 {
        let bits = format!("{:0w$b}", value, w = width as usize);
        self.node("const", width, &[bits])
    }

    fn fold(&mut self, op: &str, unit: bool, terms: &[SmtTerm]) -> Result<(u64, u32), SortError> {
        let mut acc: Option<u64> = None;
        for term in terms {
            let (nid, width) = self.emit(term)?;
            expect_width(width, 1, op)?;
            acc = Some(match acc {
                None => nid,
                Some(prev) => self.node(op, 1, &[prev.to_string(), nid.to_string()]),
            });
        }
        Ok((acc.unwrap_or_else(|| self.constant(u128::from(unit), 1)), 1))
    }

    fn emit(&mut self, term: &SmtTerm) -> Result<(u64, u32), SortError> {
        let pair = |a: u64, b: u64| [a.to_string(), b.to_string()];
        match term {
            SmtTerm::Var(name) => self
                .names
                .get(name)
                .copied()
                .ok_or_else(|| SortError(format!("unbound variable `{name}`"))),
            SmtTerm::BoolLit(b) => Ok((self.constant(u128::from(*b), 1), 1)),
            SmtTerm::BvLit { value, width } => Ok((self.constant(*value, *width), *width)),
            SmtTerm::Not(inner) | SmtTerm::BvUnary(BvUnOp::Not, inner) => {
                let (a, w) = self.emit(inner)?;
                Ok((self.node("not", w, &[a.to_string()]), w))
            }
            SmtTerm::BvUnary(BvUnOp::Neg, inner) => {
                let (a, w) = self.emit(inner)?;
                Ok((self.node("neg", w, &[a.to_string()]), w))
            }
            SmtTerm::And(terms) => self.fold("and", true, terms),
            SmtTerm::Or(terms) => self.fold("or", false, terms),
            SmtTerm::Xor(lhs, rhs) | SmtTerm::Implies(lhs, rhs) => {
                let op = if matches!(term, SmtTerm::Xor(..)) { "xor" } else { "implies" };
                let (a, wa) = self.emit(lhs)?;
                let (b, wb) = self.emit(rhs)?;
                expect_width(wa, 1, op)?;
                expect_width(wb, 1, op)?;
                Ok((self.node(op, 1, &pair(a, b)), 1))
            }
            SmtTerm::Eq(lhs, rhs) | SmtTerm::Distinct(lhs, rhs) => {
                let op = if matches!(term, SmtTerm::Eq(..)) { "eq" } else { "neq" };
                let (a, wa) = self.emit(lhs)?;
                let (b, wb) = self.emit(rhs)?;
                expect_width(wb, wa, op)?;
                Ok((self.node(op, 1, &pair(a, b)), 1))
            }
            SmtTerm::Ite(cond, then, els) => {
                let (c, wc) = self.emit(cond)?;
                expect_width(wc, 1, "ite")?;
                let (a, wa) = self.emit(then)?;
                let (b, wb) = self.emit(els)?;
                expect_width(wb, wa, "ite")?;
                Ok((
                    self.node("ite", wa, &[c.to_string(), a.to_string(), b.to_string()]),
                    wa,
                ))
            }
            SmtTerm::BvBinary(op, lhs, rhs) => {
                let name = binary_op(*op);
                let (a, wa) = self.emit(lhs)?;
                let (b, wb) = self.emit(rhs)?;
                expect_width(wb, wa, name)?;
                Ok((self.node(name, wa, &pair(a, b)), wa))
            }
            SmtTerm::BvCompare(op, lhs, rhs) => {
                let name = compare_op(*op);
                let (a, wa) = self.emit(lhs)?;
                let (b, wb) = self.emit(rhs)?;
                expect_width(wb, wa, name)?;
                Ok((self.node(name, 1, &pair(a, b)), 1))
            }
            SmtTerm::Extract { hi, lo, arg } => {
                let (a, w) = self.emit(arg)?;
                if lo > hi || *hi >= w {
                    return Err(SortError(format!("slice [{hi}:{lo}] out of range for bv{w}")));
                }
                let width = hi - lo + 1;
                Ok((
                    self.node("slice", width, &[a.to_string(), hi.to_string(), lo.to_string()]),
                    width,
                ))
            }
            SmtTerm::Concat(high, low) => {
                let (a, wa) = self.emit(high)?;
                let (b, wb) = self.emit(low)?;
                Ok((self.node("concat", wa + wb, &pair(a, b)), wa + wb))
            }
            SmtTerm::ZeroExtend { by, arg } | SmtTerm::SignExtend { by, arg } => {
                let op = if matches!(term, SmtTerm::ZeroExtend { .. }) { "uext" } else { "sext" };
                let (a, w) = self.emit(arg)?;
                Ok((self.node(op, w + by, &[a.to_string(), by.to_string()]), w + by))
            }
        }
    }
}

fn expect_width(found: u32, expected: u32, op: &str) -> Result<(), SortError> {
    if found != expected {
        return Err(SortError(format!(
            "`{op}` expects width {expected}, found {found}"
        )));
    }
    Ok(())
}

/// Render `query` as BTOR2 text.
pub fn render_btor2(query: &SmtQuery) -> Result<String, SortError> {
    let mut emitter = Emitter::default();
    for (name, sort) in &query.inputs {
        let width = sort.bit_width();
        let sid = emitter.sort(width);
        let nid = emitter.fresh();
        emitter.lines.push(format!("{nid} input {sid} {name}"));
        emitter.names.insert(name.clone(), (nid, width));
    }
    for def in &query.definitions {
        let (nid, width) = emitter.emit(&def.term)?;
        expect_width(width, def.sort.bit_width(), &def.name)?;
        emitter.names.insert(def.name.clone(), (nid, width));
    }
    let (bad, _) = emitter.fold("and", true, &query.assertions)?;
    let nid = emitter.fresh();
    emitter.lines.push(format!("{nid} bad {bad}"));

    let mut text = emitter.lines.join("\n");
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorts::SmtSort;

    #[test]
    fn renders_inputs_definitions_and_bad() {
        let mut query = SmtQuery::new();
        query.declare_input("in_x", SmtSort::BitVec(8));
        query.define("o_r", SmtSort::BitVec(8), SmtTerm::var("in_x").add(SmtTerm::bv(1, 8)));
        query.assert(SmtTerm::var("o_r").distinct(SmtTerm::var("in_x")));
        let text = render_btor2(&query).unwrap();
        assert_eq!(
            text,
            "1 sort bitvec 8\n\
             2 input 1 in_x\n\
             3 const 1 00000001\n\
             4 add 1 2 3\n\
             5 sort bitvec 1\n\
             6 neq 5 4 2\n\
             7 bad 6\n"
        );
    }

    #[test]
    fn booleans_are_one_bit_and_indexed_ops_carry_indices() {
        let mut query = SmtQuery::new();
        query.declare_input("in_b", SmtSort::Bool);
        query.declare_input("in_x", SmtSort::BitVec(4));
        query.assert(SmtTerm::and(vec![
            SmtTerm::var("in_b"),
            SmtTerm::extract(1, 0, SmtTerm::sign_extend(2, SmtTerm::var("in_x")))
                .eq(SmtTerm::bv(3, 2)),
        ]));
        let text = render_btor2(&query).unwrap();
        assert!(text.contains("input 1 in_b"));
        assert!(text.contains("6 sext 5 4 2"), "{text}");
        assert!(text.contains(" slice "));
        assert!(text.lines().last().unwrap().contains(" bad "));
    }

    #[test]
    fn unbound_variable_is_rejected() {
        let mut query = SmtQuery::new();
        query.assert(SmtTerm::var("ghost"));
        assert!(render_btor2(&query).is_err());
    }
}
