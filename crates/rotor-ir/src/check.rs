//! Name resolution and sort checking from [`ast::Program`] to
//! [`BehaviorProgram`].
//!
//! The checker does not stop at the first problem. A binding whose
//! expression is ill-sorted still enters scope with its declared sort, so
//! later uses are checked against what the author meant.

use indexmap::IndexMap;
use rotor_smt::sorts::{SmtSort, MAX_BV_WIDTH};
use rotor_smt::terms::SmtTerm;

use crate::ast::{self, Decl, Expr, Span, Spanned};
use crate::errors::{ParseError, ParseErrors, SourceCtx};
use crate::ops::OpKind;
use crate::program::{BehaviorProgram, Binding};

type Scope = IndexMap<String, SmtSort>;

pub(crate) fn check(program: &ast::Program, ctx: &SourceCtx<'_>) -> Result<BehaviorProgram, ParseError> {
    let mut errors = Vec::new();
    let mut scope = Scope::new();
    let mut inputs = IndexMap::new();
    let mut bindings = Vec::new();

    for decl in &program.decls {
        let name = decl.node.name();
        let sort = match &decl.node {
            Decl::Input { sort, .. } | Decl::Let { sort, .. } | Decl::Output { sort, .. } => sort,
        };
        let Some(declared) = sort.node.to_sort() else {
            errors.push(ctx.sort_mismatch(
                format!("bit-vector width must be between 1 and {MAX_BV_WIDTH}"),
                sort.span,
            ));
            continue;
        };
        if scope.contains_key(&name.node) {
            errors.push(ctx.duplicate(&name.node, name.span));
            continue;
        }

        match &decl.node {
            Decl::Input { .. } => {
                inputs.insert(name.node.clone(), declared);
            }
            Decl::Let { expr, .. } | Decl::Output { expr, .. } => match check_expr(expr, &scope, ctx) {
                Ok((term, found)) if found == declared => bindings.push(Binding {
                    name: name.node.clone(),
                    sort: declared,
                    term,
                    is_output: matches!(decl.node, Decl::Output { .. }),
                }),
                Ok((_, found)) => errors.push(ctx.sort_mismatch(
                    format!("`{}` is declared {declared} but its expression has sort {found}", name.node),
                    expr.span,
                )),
                Err(e) => errors.push(e),
            },
        }
        scope.insert(name.node.clone(), declared);
    }

    if !errors.is_empty() {
        return Err(ParseErrors { errors }.into_error());
    }
    if !bindings.iter().any(|b| b.is_output) {
        return Err(ParseError::NoOutputs {
            name: program.name.node.clone(),
        });
    }
    Ok(BehaviorProgram {
        name: program.name.node.clone(),
        inputs,
        bindings,
    })
}

fn check_expr(
    expr: &Spanned<Expr>,
    scope: &Scope,
    ctx: &SourceCtx<'_>,
) -> Result<(SmtTerm, SmtSort), ParseError> {
    match &expr.node {
        Expr::Var(name) => scope
            .get(name)
            .map(|sort| (SmtTerm::var(name.clone()), *sort))
            .ok_or_else(|| ctx.unknown_name(name, expr.span)),
        Expr::BoolLit(b) => Ok((SmtTerm::bool(*b), SmtSort::Bool)),
        Expr::BvLit { value, width } => Ok((SmtTerm::bv(*value, *width), SmtSort::BitVec(*width))),
        Expr::App { op, indices, args } => {
            let kind = OpKind::lookup(&op.node).ok_or_else(|| ctx.unknown_operator(&op.node, op.span))?;
            if indices.len() != kind.indices() {
                return Err(ctx.arity(
                    &op.node,
                    format!("{} numeral indices", kind.indices()),
                    indices.len().to_string(),
                    expr.span,
                ));
            }
            if !kind.arity().accepts(args.len()) {
                return Err(ctx.arity(
                    &op.node,
                    kind.arity().describe(),
                    args.len().to_string(),
                    expr.span,
                ));
            }
            let mut checked = Vec::with_capacity(args.len());
            for arg in args {
                let (term, sort) = check_expr(arg, scope, ctx)?;
                checked.push((term, sort, arg.span));
            }
            let idx: Vec<(u128, Span)> = indices.iter().map(|i| (i.node, i.span)).collect();
            apply(kind, &idx, checked, expr.span, ctx)
        }
    }
}

type Operand = (SmtTerm, SmtSort, Span);

fn apply(
    kind: OpKind,
    indices: &[(u128, Span)],
    args: Vec<Operand>,
    span: Span,
    ctx: &SourceCtx<'_>,
) -> Result<(SmtTerm, SmtSort), ParseError> {
    let name = kind.name();
    let mut args = args.into_iter();

    match kind {
        OpKind::Const => {
            let (value, _) = indices[0];
            let width = index_width(indices[1], ctx)?;
            if width < 128 && value >> width != 0 {
                return Err(ctx.sort_mismatch(
                    format!("value {value} does not fit in bv{width}"),
                    indices[0].1,
                ));
            }
            Ok((SmtTerm::bv(value, width), SmtSort::BitVec(width)))
        }
        OpKind::Not => {
            let a = expect_bool(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            Ok((a.not(), SmtSort::Bool))
        }
        OpKind::And | OpKind::Or => {
            let mut terms = Vec::new();
            for arg in args {
                terms.push(expect_bool(arg, name, ctx)?);
            }
            let term = if kind == OpKind::And {
                SmtTerm::and(terms)
            } else {
                SmtTerm::or(terms)
            };
            Ok((term, SmtSort::Bool))
        }
        OpKind::Xor | OpKind::Implies => {
            let a = expect_bool(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            let b = expect_bool(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            let term = if kind == OpKind::Xor {
                SmtTerm::Xor(Box::new(a), Box::new(b))
            } else {
                a.implies(b)
            };
            Ok((term, SmtSort::Bool))
        }
        OpKind::Eq | OpKind::Distinct => {
            let (a, sa, _) = operand(&mut args, kind, span, ctx)?;
            let (b, sb, span_b) = operand(&mut args, kind, span, ctx)?;
            same_sort(sa, sb, name, span_b, ctx)?;
            let term = if kind == OpKind::Eq { a.eq(b) } else { a.distinct(b) };
            Ok((term, SmtSort::Bool))
        }
        OpKind::Ite => {
            let c = expect_bool(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            let (a, sa, _) = operand(&mut args, kind, span, ctx)?;
            let (b, sb, span_b) = operand(&mut args, kind, span, ctx)?;
            same_sort(sa, sb, name, span_b, ctx)?;
            Ok((SmtTerm::ite(c, a, b), sa))
        }
        OpKind::BvUnary(op) => {
            let (a, w) = expect_bv(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            Ok((SmtTerm::unary(op, a), SmtSort::BitVec(w)))
        }
        OpKind::BvBinary(op) => {
            let (a, wa) = expect_bv(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            let rhs = operand(&mut args, kind, span, ctx)?;
            let rhs_span = rhs.2;
            let (b, wb) = expect_bv(rhs, name, ctx)?;
            same_sort(SmtSort::BitVec(wa), SmtSort::BitVec(wb), name, rhs_span, ctx)?;
            Ok((SmtTerm::binary(op, a, b), SmtSort::BitVec(wa)))
        }
        OpKind::BvCompare(op) => {
            let (a, wa) = expect_bv(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            let rhs = operand(&mut args, kind, span, ctx)?;
            let rhs_span = rhs.2;
            let (b, wb) = expect_bv(rhs, name, ctx)?;
            same_sort(SmtSort::BitVec(wa), SmtSort::BitVec(wb), name, rhs_span, ctx)?;
            Ok((SmtTerm::compare(op, a, b), SmtSort::Bool))
        }
        OpKind::Concat => {
            let (a, wa) = expect_bv(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            let (b, wb) = expect_bv(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            let width = checked_width(u128::from(wa) + u128::from(wb), span, ctx)?;
            Ok((a.concat(b), SmtSort::BitVec(width)))
        }
        OpKind::Extract => {
            let arg = operand(&mut args, kind, span, ctx)?;
            let arg_span = arg.2;
            let (a, w) = expect_bv(arg, name, ctx)?;
            let (hi, lo) = (indices[0].0, indices[1].0);
            if lo > hi || hi >= u128::from(w) {
                return Err(ctx.sort_mismatch(
                    format!("extract {hi} {lo} is out of range for bv{w}"),
                    arg_span,
                ));
            }
            // hi < w <= 128, so both fit u32.
            let (hi, lo) = (hi as u32, lo as u32);
            Ok((SmtTerm::extract(hi, lo, a), SmtSort::BitVec(hi - lo + 1)))
        }
        OpKind::ZeroExtend | OpKind::SignExtend => {
            let (a, w) = expect_bv(operand(&mut args, kind, span, ctx)?, name, ctx)?;
            let by = indices[0].0;
            let width = checked_width(u128::from(w).saturating_add(by), indices[0].1, ctx)?;
            let by = width - w;
            let term = if kind == OpKind::ZeroExtend {
                SmtTerm::zero_extend(by, a)
            } else {
                SmtTerm::sign_extend(by, a)
            };
            Ok((term, SmtSort::BitVec(width)))
        }
    }
}

fn operand(
    args: &mut std::vec::IntoIter<Operand>,
    kind: OpKind,
    span: Span,
    ctx: &SourceCtx<'_>,
) -> Result<Operand, ParseError> {
    args.next()
        .ok_or_else(|| ctx.arity(kind.name(), kind.arity().describe(), "fewer", span))
}

fn index_width((value, span): (u128, Span), ctx: &SourceCtx<'_>) -> Result<u32, ParseError> {
    if value == 0 {
        return Err(ctx.sort_mismatch("bit-vector width must be at least 1", span));
    }
    checked_width(value, span, ctx)
}

fn checked_width(width: u128, span: Span, ctx: &SourceCtx<'_>) -> Result<u32, ParseError> {
    if width > u128::from(MAX_BV_WIDTH) {
        return Err(ctx.sort_mismatch(
            format!("result width {width} exceeds {MAX_BV_WIDTH} bits"),
            span,
        ));
    }
    Ok(width as u32)
}

fn expect_bool((term, sort, span): Operand, op: &str, ctx: &SourceCtx<'_>) -> Result<SmtTerm, ParseError> {
    match sort {
        SmtSort::Bool => Ok(term),
        other => Err(ctx.sort_mismatch(format!("`{op}` expects a bool operand, found {other}"), span)),
    }
}

fn expect_bv((term, sort, span): Operand, op: &str, ctx: &SourceCtx<'_>) -> Result<(SmtTerm, u32), ParseError> {
    match sort {
        SmtSort::BitVec(w) => Ok((term, w)),
        SmtSort::Bool => Err(ctx.sort_mismatch(
            format!("`{op}` expects a bit-vector operand, found bool"),
            span,
        )),
    }
}

fn same_sort(a: SmtSort, b: SmtSort, op: &str, span: Span, ctx: &SourceCtx<'_>) -> Result<(), ParseError> {
    if a != b {
        return Err(ctx.sort_mismatch(
            format!("`{op}` operands must have the same sort, found {a} and {b}"),
            span,
        ));
    }
    Ok(())
}
