//! Operator table for behavior-program applications.

use rotor_smt::terms::{BvBinOp, BvCmpOp, BvUnOp};

/// What an operator name in `(op ...)` stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Not,
    And,
    Or,
    Xor,
    Implies,
    Eq,
    Distinct,
    Ite,
    BvUnary(BvUnOp),
    BvBinary(BvBinOp),
    BvCompare(BvCmpOp),
    Concat,
    /// `(extract hi lo e)`
    Extract,
    /// `(zext n e)`
    ZeroExtend,
    /// `(sext n e)`
    SignExtend,
    /// `(bv value width)`
    Const,
}

/// Number of operands an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }

    pub fn describe(self) -> String {
        let plural = |k: usize| if k == 1 { "operand" } else { "operands" };
        match self {
            Arity::Exactly(k) => format!("{k} {}", plural(k)),
            Arity::AtLeast(k) => format!("at least {k} {}", plural(k)),
        }
    }
}

impl OpKind {
    pub fn lookup(name: &str) -> Option<OpKind> {
        let kind = match name {
            "not" => OpKind::Not,
            "and" => OpKind::And,
            "or" => OpKind::Or,
            "xor" => OpKind::Xor,
            "=>" => OpKind::Implies,
            "=" => OpKind::Eq,
            "distinct" => OpKind::Distinct,
            "ite" => OpKind::Ite,
            "concat" => OpKind::Concat,
            "extract" => OpKind::Extract,
            "zext" => OpKind::ZeroExtend,
            "sext" => OpKind::SignExtend,
            "bv" => OpKind::Const,
            other => {
                if let Some(op) = BvUnOp::ALL.into_iter().find(|op| op.smtlib_name() == other) {
                    OpKind::BvUnary(op)
                } else if let Some(op) = BvBinOp::ALL.into_iter().find(|op| op.smtlib_name() == other) {
                    OpKind::BvBinary(op)
                } else {
                    OpKind::BvCompare(BvCmpOp::ALL.into_iter().find(|op| op.smtlib_name() == other)?)
                }
            }
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Not => "not",
            OpKind::And => "and",
            OpKind::Or => "or",
            OpKind::Xor => "xor",
            OpKind::Implies => "=>",
            OpKind::Eq => "=",
            OpKind::Distinct => "distinct",
            OpKind::Ite => "ite",
            OpKind::BvUnary(op) => op.smtlib_name(),
            OpKind::BvBinary(op) => op.smtlib_name(),
            OpKind::BvCompare(op) => op.smtlib_name(),
            OpKind::Concat => "concat",
            OpKind::Extract => "extract",
            OpKind::ZeroExtend => "zext",
            OpKind::SignExtend => "sext",
            OpKind::Const => "bv",
        }
    }

    /// Count of numeral indices written before the operands.
    pub fn indices(self) -> usize {
        match self {
            OpKind::Extract | OpKind::Const => 2,
            OpKind::ZeroExtend | OpKind::SignExtend => 1,
            _ => 0,
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            OpKind::Const => Arity::Exactly(0),
            OpKind::Not
            | OpKind::BvUnary(_)
            | OpKind::Extract
            | OpKind::ZeroExtend
            | OpKind::SignExtend => Arity::Exactly(1),
            OpKind::And | OpKind::Or => Arity::AtLeast(2),
            OpKind::Ite => Arity::Exactly(3),
            _ => Arity::Exactly(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_bitvector_operator_round_trips_through_its_name() {
        for op in BvBinOp::ALL {
            let kind = OpKind::BvBinary(op);
            assert_eq!(OpKind::lookup(kind.name()), Some(kind));
        }
        for op in BvCmpOp::ALL {
            let kind = OpKind::BvCompare(op);
            assert_eq!(OpKind::lookup(kind.name()), Some(kind));
        }
        for op in BvUnOp::ALL {
            let kind = OpKind::BvUnary(op);
            assert_eq!(OpKind::lookup(kind.name()), Some(kind));
        }
    }

    #[test]
    fn indexed_and_logical_operators() {
        assert_eq!(OpKind::lookup("=>"), Some(OpKind::Implies));
        assert_eq!(OpKind::lookup("extract").map(OpKind::indices), Some(2));
        assert_eq!(OpKind::lookup("zext").map(OpKind::arity), Some(Arity::Exactly(1)));
        assert_eq!(OpKind::lookup("bv").map(OpKind::arity), Some(Arity::Exactly(0)));
        assert_eq!(OpKind::lookup("bvfoo"), None);
    }

    #[test]
    fn arity_descriptions() {
        assert!(Arity::AtLeast(2).accepts(5));
        assert!(!Arity::Exactly(2).accepts(3));
        assert_eq!(Arity::Exactly(1).describe(), "1 operand");
        assert_eq!(Arity::AtLeast(2).describe(), "at least 2 operands");
    }
}
