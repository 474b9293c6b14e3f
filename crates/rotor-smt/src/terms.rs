use crate::sorts::{SmtSort, MAX_BV_WIDTH};

/// Unary bit-vector operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvUnOp {
    Not,
    Neg,
}

/// Binary bit-vector operators whose result has the operands' width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvBinOp {
    Add,
    Sub,
    Mul,
    Udiv,
    Urem,
    Sdiv,
    Srem,
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Ashr,
}

/// Bit-vector predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvCmpOp {
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl BvUnOp {
    pub const ALL: [BvUnOp; 2] = [BvUnOp::Not, BvUnOp::Neg];

    pub fn smtlib_name(self) -> &'static str {
        match self {
            BvUnOp::Not => "bvnot",
            BvUnOp::Neg => "bvneg",
        }
    }
}

impl BvBinOp {
    pub const ALL: [BvBinOp; 13] = [
        BvBinOp::Add,
        BvBinOp::Sub,
        BvBinOp::Mul,
        BvBinOp::Udiv,
        BvBinOp::Urem,
        BvBinOp::Sdiv,
        BvBinOp::Srem,
        BvBinOp::And,
        BvBinOp::Or,
        BvBinOp::Xor,
        BvBinOp::Shl,
        BvBinOp::Lshr,
        BvBinOp::Ashr,
    ];

    pub fn smtlib_name(self) -> &'static str {
        match self {
            BvBinOp::Add => "bvadd",
            BvBinOp::Sub => "bvsub",
            BvBinOp::Mul => "bvmul",
            BvBinOp::Udiv => "bvudiv",
            BvBinOp::Urem => "bvurem",
            BvBinOp::Sdiv => "bvsdiv",
            BvBinOp::Srem => "bvsrem",
            BvBinOp::And => "bvand",
            BvBinOp::Or => "bvor",
            BvBinOp::Xor => "bvxor",
            BvBinOp::Shl => "bvshl",
            BvBinOp::Lshr => "bvlshr",
            BvBinOp::Ashr => "bvashr",
        }
    }
}

impl BvCmpOp {
    pub const ALL: [BvCmpOp; 8] = [
        BvCmpOp::Ult,
        BvCmpOp::Ule,
        BvCmpOp::Ugt,
        BvCmpOp::Uge,
        BvCmpOp::Slt,
        BvCmpOp::Sle,
        BvCmpOp::Sgt,
        BvCmpOp::Sge,
    ];

    pub fn smtlib_name(self) -> &'static str {
        match self {
            BvCmpOp::Ult => "bvult",
            BvCmpOp::Ule => "bvule",
            BvCmpOp::Ugt => "bvugt",
            BvCmpOp::Uge => "bvuge",
            BvCmpOp::Slt => "bvslt",
            BvCmpOp::Sle => "bvsle",
            BvCmpOp::Sgt => "bvsgt",
            BvCmpOp::Sge => "bvsge",
        }
    }
}

/// Abstract SMT term representation, solver-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    BoolLit(bool),
    /// Bit-vector literal; `value` is already truncated to `width` bits.
    BvLit {
        value: u128,
        width: u32,
    },

    // Boolean logic
    Not(Box<SmtTerm>),
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Xor(Box<SmtTerm>, Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    // Polymorphic over Bool / BitVec
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Distinct(Box<SmtTerm>, Box<SmtTerm>),
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),

    // Bit-vectors
    BvUnary(BvUnOp, Box<SmtTerm>),
    BvBinary(BvBinOp, Box<SmtTerm>, Box<SmtTerm>),
    BvCompare(BvCmpOp, Box<SmtTerm>, Box<SmtTerm>),
    Extract {
        hi: u32,
        lo: u32,
        arg: Box<SmtTerm>,
    },
    Concat(Box<SmtTerm>, Box<SmtTerm>),
    ZeroExtend {
        by: u32,
        arg: Box<SmtTerm>,
    },
    SignExtend {
        by: u32,
        arg: Box<SmtTerm>,
    },
}

/// A term whose operands do not fit together.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ill-sorted term: {0}")]
pub struct SortError(pub String);

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    /// Bit-vector literal; `value` is truncated to `width` bits.
    pub fn bv(value: u128, width: u32) -> Self {
        SmtTerm::BvLit {
            value: value & crate::eval::mask(width),
            width,
        }
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        SmtTerm::Implies(Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn distinct(self, other: SmtTerm) -> Self {
        SmtTerm::Distinct(Box::new(self), Box::new(other))
    }

    pub fn ite(cond: SmtTerm, then: SmtTerm, els: SmtTerm) -> Self {
        SmtTerm::Ite(Box::new(cond), Box::new(then), Box::new(els))
    }

    pub fn unary(op: BvUnOp, arg: SmtTerm) -> Self {
        SmtTerm::BvUnary(op, Box::new(arg))
    }

    pub fn binary(op: BvBinOp, lhs: SmtTerm, rhs: SmtTerm) -> Self {
        SmtTerm::BvBinary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn compare(op: BvCmpOp, lhs: SmtTerm, rhs: SmtTerm) -> Self {
        SmtTerm::BvCompare(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::binary(BvBinOp::Add, self, other)
    }

    pub fn shl(self, other: SmtTerm) -> Self {
        SmtTerm::binary(BvBinOp::Shl, self, other)
    }

    pub fn xor(self, other: SmtTerm) -> Self {
        SmtTerm::binary(BvBinOp::Xor, self, other)
    }

    pub fn extract(hi: u32, lo: u32, arg: SmtTerm) -> Self {
        SmtTerm::Extract {
            hi,
            lo,
            arg: Box::new(arg),
        }
    }

    pub fn concat(self, low: SmtTerm) -> Self {
        SmtTerm::Concat(Box::new(self), Box::new(low))
    }

    pub fn zero_extend(by: u32, arg: SmtTerm) -> Self {
        SmtTerm::ZeroExtend {
            by,
            arg: Box::new(arg),
        }
    }

    pub fn sign_extend(by: u32, arg: SmtTerm) -> Self {
        SmtTerm::SignExtend {
            by,
            arg: Box::new(arg),
        }
    }

    /// Infer the sort of this term, resolving variables through `scope`.
    pub fn infer_sort<F>(&self, scope: &F) -> Result<SmtSort, SortError>
    where
        F: Fn(&str) -> Option<SmtSort>,
    {
        let bool_operand = |term: &SmtTerm| -> Result<(), SortError> {
            match term.infer_sort(scope)? {
                SmtSort::Bool => Ok(()),
                other => Err(SortError(format!("expected bool operand, found {other}"))),
            }
        };
        let bv_operand = |term: &SmtTerm| -> Result<u32, SortError> {
            match term.infer_sort(scope)? {
                SmtSort::BitVec(width) => Ok(width),
                SmtSort::Bool => Err(SortError("expected bit-vector operand, found bool".into())),
            }
        };
        let same_width = |lhs: &SmtTerm, rhs: &SmtTerm| -> Result<u32, SortError> {
            let (l, r) = (bv_operand(lhs)?, bv_operand(rhs)?);
            if l != r {
                return Err(SortError(format!("width mismatch: bv{l} vs bv{r}")));
            }
            Ok(l)
        };
        let checked_width = |width: u32| -> Result<SmtSort, SortError> {
            if width == 0 || width > MAX_BV_WIDTH {
                return Err(SortError(format!(
                    "result width {width} outside 1..={MAX_BV_WIDTH}"
                )));
            }
            Ok(SmtSort::BitVec(width))
        };

        match self {
            SmtTerm::Var(name) => {
                scope(name).ok_or_else(|| SortError(format!("unbound variable `{name}`")))
            }
            SmtTerm::BoolLit(_) => Ok(SmtSort::Bool),
            SmtTerm::BvLit { width, .. } => checked_width(*width),
            SmtTerm::Not(inner) => bool_operand(inner).map(|_| SmtSort::Bool),
            SmtTerm::And(terms) | SmtTerm::Or(terms) => {
                for term in terms {
                    bool_operand(term)?;
                }
                Ok(SmtSort::Bool)
            }
            SmtTerm::Xor(lhs, rhs) | SmtTerm::Implies(lhs, rhs) => {
                bool_operand(lhs)?;
                bool_operand(rhs)?;
                Ok(SmtSort::Bool)
            }
            SmtTerm::Eq(lhs, rhs) | SmtTerm::Distinct(lhs, rhs) => {
                let (l, r) = (lhs.infer_sort(scope)?, rhs.infer_sort(scope)?);
                if l != r {
                    return Err(SortError(format!("cannot compare {l} with {r}")));
                }
                Ok(SmtSort::Bool)
            }
            SmtTerm::Ite(cond, then, els) => {
                bool_operand(cond)?;
                let (t, e) = (then.infer_sort(scope)?, els.infer_sort(scope)?);
                if t != e {
                    return Err(SortError(format!("ite branches differ: {t} vs {e}")));
                }
                Ok(t)
            }
            SmtTerm::BvUnary(_, arg) => bv_operand(arg).map(SmtSort::BitVec),
            SmtTerm::BvBinary(_, lhs, rhs) => same_width(lhs, rhs).map(SmtSort::BitVec),
            SmtTerm::BvCompare(_, lhs, rhs) => same_width(lhs, rhs).map(|_| SmtSort::Bool),
            SmtTerm::Extract { hi, lo, arg } => {
                let width = bv_operand(arg)?;
                if lo > hi || *hi >= width {
                    return Err(SortError(format!(
                        "extract [{hi}:{lo}] out of range for bv{width}"
                    )));
                }
                Ok(SmtSort::BitVec(hi - lo + 1))
            }
            SmtTerm::Concat(high, low) => checked_width(bv_operand(high)? + bv_operand(low)?),
            SmtTerm::ZeroExtend { by, arg } | SmtTerm::SignExtend { by, arg } => {
                checked_width(bv_operand(arg)?.saturating_add(*by))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(name: &str) -> Option<SmtSort> {
        match name {
            "x" | "y" => Some(SmtSort::BitVec(32)),
            "b" => Some(SmtSort::Bool),
            _ => None,
        }
    }

    #[test]
    fn literal_is_truncated_to_width() {
        assert_eq!(SmtTerm::bv(0x1ff, 8), SmtTerm::BvLit { value: 0xff, width: 8 });
    }

    #[test]
    fn infers_arithmetic_and_predicates() {
        let sum = SmtTerm::var("x").add(SmtTerm::var("y"));
        assert_eq!(sum.infer_sort(&scope), Ok(SmtSort::BitVec(32)));
        let cmp = SmtTerm::compare(BvCmpOp::Slt, sum, SmtTerm::bv(0, 32));
        assert_eq!(cmp.infer_sort(&scope), Ok(SmtSort::Bool));
    }

    #[test]
    fn infers_width_changing_operators() {
        let ext = SmtTerm::extract(7, 0, SmtTerm::var("x"));
        assert_eq!(ext.infer_sort(&scope), Ok(SmtSort::BitVec(8)));
        let cat = SmtTerm::var("x").concat(SmtTerm::var("y"));
        assert_eq!(cat.infer_sort(&scope), Ok(SmtSort::BitVec(64)));
        let zext = SmtTerm::zero_extend(32, SmtTerm::var("x"));
        assert_eq!(zext.infer_sort(&scope), Ok(SmtSort::BitVec(64)));
    }

    #[test]
    fn rejects_ill_sorted_terms() {
        let mixed = SmtTerm::var("x").add(SmtTerm::bv(1, 8));
        assert!(mixed.infer_sort(&scope).is_err());
        let bad_extract = SmtTerm::extract(32, 0, SmtTerm::var("x"));
        assert!(bad_extract.infer_sort(&scope).is_err());
        let bool_arith = SmtTerm::var("b").add(SmtTerm::var("b"));
        assert!(bool_arith.infer_sort(&scope).is_err());
        let too_wide = SmtTerm::zero_extend(100, SmtTerm::var("x"));
        assert!(too_wide.infer_sort(&scope).is_err());
        assert!(SmtTerm::var("nope").infer_sort(&scope).is_err());
    }
}
