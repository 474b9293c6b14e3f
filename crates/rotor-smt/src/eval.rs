//! Concrete evaluation of [`SmtTerm`]s with SMT-LIB `QF_BV` semantics.
//!
//! Division by zero follows the standard: `bvudiv x 0` is all ones and
//! `bvurem x 0` is `x`; the signed variants are derived from them.

use std::collections::HashMap;

use crate::sorts::SmtSort;
use crate::terms::{BvBinOp, BvCmpOp, BvUnOp, SmtTerm};

/// A concrete value of sort `Bool` or `(_ BitVec width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Bv { bits: u128, width: u32 },
}

impl Value {
    pub fn bv(bits: u128, width: u32) -> Self {
        Value::Bv {
            bits: bits & mask(width),
            width,
        }
    }

    /// The all-zero value of `sort`.
    pub fn zero(sort: SmtSort) -> Self {
        match sort {
            SmtSort::Bool => Value::Bool(false),
            SmtSort::BitVec(width) => Value::Bv { bits: 0, width },
        }
    }

    /// Build a value of `sort` from the low bits of `raw`.
    pub fn from_raw(sort: SmtSort, raw: u128) -> Self {
        match sort {
            SmtSort::Bool => Value::Bool(raw & 1 == 1),
            SmtSort::BitVec(width) => Value::bv(raw, width),
        }
    }

    pub fn sort(&self) -> SmtSort {
        match self {
            Value::Bool(_) => SmtSort::Bool,
            Value::Bv { width, .. } => SmtSort::BitVec(*width),
        }
    }

    /// Raw bits; booleans are 0 or 1.
    pub fn raw(&self) -> u128 {
        match self {
            Value::Bool(b) => u128::from(*b),
            Value::Bv { bits, .. } => *bits,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Bv { .. } => None,
        }
    }

    /// Literal term denoting this value.
    pub fn to_term(&self) -> SmtTerm {
        match self {
            Value::Bool(b) => SmtTerm::BoolLit(*b),
            Value::Bv { bits, width } => SmtTerm::BvLit {
                value: *bits,
                width: *width,
            },
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Bv { bits, width } => write!(f, "{bits}:bv{width}"),
        }
    }
}

/// Variable assignment used during evaluation.
pub type Env = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unbound variable `{0}`")]
    Unbound(String),
    #[error("ill-sorted operands for `{op}`")]
    IllSorted { op: &'static str },
    #[error("extract [{hi}:{lo}] out of range for bv{width}")]
    BadExtract { hi: u32, lo: u32, width: u32 },
    #[error("result width {0} exceeds 128 bits")]
    TooWide(u32),
}

/// Bit mask with the low `width` bits set.
pub fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

fn msb(bits: u128, width: u32) -> bool {
    width > 0 && (bits >> (width - 1)) & 1 == 1
}

fn to_signed(bits: u128, width: u32) -> i128 {
    if width >= 128 {
        return bits as i128;
    }
    if msb(bits, width) {
        (bits | !mask(width)) as i128
    } else {
        bits as i128
    }
}

fn neg(bits: u128, width: u32) -> u128 {
    bits.wrapping_neg() & mask(width)
}

fn udiv(s: u128, t: u128, width: u32) -> u128 {
    if t == 0 {
        mask(width)
    } else {
        s / t
    }
}

fn urem(s: u128, t: u128) -> u128 {
    if t == 0 {
        s
    } else {
        s % t
    }
}

fn shift_amount(t: u128, width: u32) -> Option<u32> {
    (t < u128::from(width)).then_some(t as u32)
}

fn apply_binary(op: BvBinOp, s: u128, t: u128, width: u32) -> u128 {
    let m = mask(width);
    let (ms, mt) = (msb(s, width), msb(t, width));
    let result = match op {
        BvBinOp::Add => s.wrapping_add(t),
        BvBinOp::Sub => s.wrapping_sub(t),
        BvBinOp::Mul => s.wrapping_mul(t),
        BvBinOp::Udiv => udiv(s, t, width),
        BvBinOp::Urem => urem(s, t),
        BvBinOp::Sdiv => match (ms, mt) {
            (false, false) => udiv(s, t, width),
            (true, false) => neg(udiv(neg(s, width), t, width), width),
            (false, true) => neg(udiv(s, neg(t, width), width), width),
            (true, true) => udiv(neg(s, width), neg(t, width), width),
        },
        BvBinOp::Srem => match (ms, mt) {
            (false, false) => urem(s, t),
            (true, false) => neg(urem(neg(s, width), t), width),
            (false, true) => urem(s, neg(t, width)),
            (true, true) => neg(urem(neg(s, width), neg(t, width)), width),
        },
        BvBinOp::And => s & t,
        BvBinOp::Or => s | t,
        BvBinOp::Xor => s ^ t,
        BvBinOp::Shl => shift_amount(t, width).map_or(0, |k| s << k),
        BvBinOp::Lshr => shift_amount(t, width).map_or(0, |k| s >> k),
        BvBinOp::Ashr => match shift_amount(t, width) {
            Some(k) => (to_signed(s, width) >> k) as u128,
            None if ms => m,
            None => 0,
        },
    };
    result & m
}

fn apply_compare(op: BvCmpOp, s: u128, t: u128, width: u32) -> bool {
    let (ss, st) = (to_signed(s, width), to_signed(t, width));
    match op {
        BvCmpOp::Ult => s < t,
        BvCmpOp::Ule => s <= t,
        BvCmpOp::Ugt => s > t,
        BvCmpOp::Uge => s >= t,
        BvCmpOp::Slt => ss < st,
        BvCmpOp::Sle => ss <= st,
        BvCmpOp::Sgt => ss > st,
        BvCmpOp::Sge => ss >= st,
    }
}

fn expect_bool(value: Value, op: &'static str) -> Result<bool, EvalError> {
    value.as_bool().ok_or(EvalError::IllSorted { op })
}

fn expect_bv(value: Value, op: &'static str) -> Result<(u128, u32), EvalError> {
    match value {
        Value::Bv { bits, width } => Ok((bits, width)),
        Value::Bool(_) => Err(EvalError::IllSorted { op }),
    }
}

fn expect_same_bv(lhs: Value, rhs: Value, op: &'static str) -> Result<(u128, u128, u32), EvalError> {
    let (s, ws) = expect_bv(lhs, op)?;
    let (t, wt) = expect_bv(rhs, op)?;
    if ws != wt {
        return Err(EvalError::IllSorted { op });
    }
    Ok((s, t, ws))
}

/// Evaluate `term` under `env`.
pub fn eval(term: &SmtTerm, env: &Env) -> Result<Value, EvalError> {
    match term {
        SmtTerm::Var(name) => env
            .get(name)
            .copied()
            .ok_or_else(|| EvalError::Unbound(name.clone())),
        SmtTerm::BoolLit(b) => Ok(Value::Bool(*b)),
        SmtTerm::BvLit { value, width } => Ok(Value::bv(*value, *width)),
        SmtTerm::Not(inner) => Ok(Value::Bool(!expect_bool(eval(inner, env)?, "not")?)),
        SmtTerm::And(terms) => {
            let mut acc = true;
            for t in terms {
                acc &= expect_bool(eval(t, env)?, "and")?;
            }
            Ok(Value::Bool(acc))
        }
        SmtTerm::Or(terms) => {
            let mut acc = false;
            for t in terms {
                acc |= expect_bool(eval(t, env)?, "or")?;
            }
            Ok(Value::Bool(acc))
        }
        SmtTerm::Xor(lhs, rhs) => Ok(Value::Bool(
            expect_bool(eval(lhs, env)?, "xor")? ^ expect_bool(eval(rhs, env)?, "xor")?,
        )),
        SmtTerm::Implies(lhs, rhs) => Ok(Value::Bool(
            !expect_bool(eval(lhs, env)?, "=>")? || expect_bool(eval(rhs, env)?, "=>")?,
        )),
        SmtTerm::Eq(lhs, rhs) | SmtTerm::Distinct(lhs, rhs) => {
            let (l, r) = (eval(lhs, env)?, eval(rhs, env)?);
            if l.sort() != r.sort() {
                return Err(EvalError::IllSorted { op: "=" });
            }
            let equal = l == r;
            Ok(Value::Bool(if matches!(term, SmtTerm::Eq(..)) {
                equal
            } else {
                !equal
            }))
        }
        SmtTerm::Ite(cond, then, els) => {
            if expect_bool(eval(cond, env)?, "ite")? {
                eval(then, env)
            } else {
                eval(els, env)
            }
        }
        SmtTerm::BvUnary(op, arg) => {
            let (bits, width) = expect_bv(eval(arg, env)?, op.smtlib_name())?;
            let result = match op {
                BvUnOp::Not => !bits,
                BvUnOp::Neg => bits.wrapping_neg(),
            };
            Ok(Value::bv(result, width))
        }
        SmtTerm::BvBinary(op, lhs, rhs) => {
            let (s, t, width) = expect_same_bv(eval(lhs, env)?, eval(rhs, env)?, op.smtlib_name())?;
            Ok(Value::bv(apply_binary(*op, s, t, width), width))
        }
        SmtTerm::BvCompare(op, lhs, rhs) => {
            let (s, t, width) = expect_same_bv(eval(lhs, env)?, eval(rhs, env)?, op.smtlib_name())?;
            Ok(Value::Bool(apply_compare(*op, s, t, width)))
        }
        SmtTerm::Extract { hi, lo, arg } => {
            let (bits, width) = expect_bv(eval(arg, env)?, "extract")?;
            if lo > hi || *hi >= width {
                return Err(EvalError::BadExtract {
                    hi: *hi,
                    lo: *lo,
                    width,
                });
            }
            Ok(Value::bv(bits >> lo, hi - lo + 1))
        }
        SmtTerm::Concat(high, low) => {
            let (h, wh) = expect_bv(eval(high, env)?, "concat")?;
            let (l, wl) = expect_bv(eval(low, env)?, "concat")?;
            let width = wh + wl;
            if width > 128 {
                return Err(EvalError::TooWide(width));
            }
            let shifted = if wl >= 128 { 0 } else { h << wl };
            Ok(Value::bv(shifted | l, width))
        }
        SmtTerm::ZeroExtend { by, arg } => {
            let (bits, width) = expect_bv(eval(arg, env)?, "zero_extend")?;
            let new_width = width.saturating_add(*by);
            if new_width > 128 {
                return Err(EvalError::TooWide(new_width));
            }
            Ok(Value::bv(bits, new_width))
        }
        SmtTerm::SignExtend { by, arg } => {
            let (bits, width) = expect_bv(eval(arg, env)?, "sign_extend")?;
            let new_width = width.saturating_add(*by);
            if new_width > 128 {
                return Err(EvalError::TooWide(new_width));
            }
            Ok(Value::bv(to_signed(bits, width) as u128, new_width))
        }
    }
}
