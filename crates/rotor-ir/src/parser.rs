#![allow(clippy::result_large_err)]

use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::errors::{ParseError, SourceCtx};

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct BvpParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

fn span_from(pair: &Pair<'_>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

fn spanned_str(pair: &Pair<'_>) -> Spanned<String> {
    Spanned::new(pair.as_str().to_string(), span_from(pair))
}

/// Parse a `.bvp` source file into its untyped syntax tree.
pub fn parse(source: &str, filename: &str) -> Result<Program, ParseError> {
    let ctx = SourceCtx { source, filename };
    let mut pairs = BvpParser::parse(Rule::program, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, p + 1),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        let end = end.min(source.len()).max(start);
        ctx.syntax(format!("{}", e.variant.message()), Span::new(start, end))
    })?;

    let program_pair = pairs
        .next()
        .ok_or_else(|| ctx.syntax("empty input", Span::default()))?;
    let mut name = None;
    let mut decls = Vec::new();
    for pair in program_pair.into_inner() {
        match pair.as_rule() {
            Rule::header => {
                let ident = pair
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::ident)
                    .ok_or_else(|| ctx.syntax("missing program name", Span::default()))?;
                name = Some(spanned_str(&ident));
            }
            Rule::input_decl | Rule::let_decl | Rule::output_decl => {
                decls.push(parse_decl(pair, &ctx)?);
            }
            _ => {}
        }
    }
    let name = name.ok_or_else(|| ctx.syntax("missing `program` header", Span::default()))?;
    Ok(Program { name, decls })
}

fn parse_decl(pair: Pair<'_>, ctx: &SourceCtx<'_>) -> Result<Spanned<Decl>, ParseError> {
    let span = span_from(&pair);
    let rule = pair.as_rule();
    let mut name = None;
    let mut sort = None;
    let mut expr = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = Some(spanned_str(&inner)),
            Rule::sort => sort = Some(parse_sort(inner, ctx)?),
            Rule::expr => expr = Some(parse_expr(inner, ctx)?),
            _ => {}
        }
    }
    let name = name.ok_or_else(|| ctx.syntax("declaration without a name", span))?;
    let sort = sort.ok_or_else(|| ctx.syntax("declaration without a sort", span))?;
    let decl = match (rule, expr) {
        (Rule::input_decl, _) => Decl::Input { name, sort },
        (Rule::let_decl, Some(expr)) => Decl::Let { name, sort, expr },
        (Rule::output_decl, Some(expr)) => Decl::Output { name, sort, expr },
        _ => return Err(ctx.syntax("binding without an expression", span)),
    };
    Ok(Spanned::new(decl, span))
}

fn parse_sort(pair: Pair<'_>, ctx: &SourceCtx<'_>) -> Result<Spanned<SortSyntax>, ParseError> {
    let span = span_from(&pair);
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| ctx.syntax("empty sort", span))?;
    let sort = match inner.as_rule() {
        Rule::bool_sort => SortSyntax::Bool,
        Rule::bv_sort => {
            let width = inner.as_str()[2..]
                .parse::<u64>()
                .map_err(|_| ctx.sort_mismatch("bit-vector width out of range", span))?;
            SortSyntax::BitVec(width)
        }
        other => return Err(ctx.syntax(format!("unexpected {other:?} in sort"), span)),
    };
    Ok(Spanned::new(sort, span))
}

fn parse_expr(pair: Pair<'_>, ctx: &SourceCtx<'_>) -> Result<Spanned<Expr>, ParseError> {
    let span = span_from(&pair);
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| ctx.syntax("empty expression", span))?;
    let expr = match inner.as_rule() {
        Rule::ident => Expr::Var(inner.as_str().to_string()),
        Rule::bool_lit => Expr::BoolLit(inner.as_str() == "true"),
        Rule::hex_lit => parse_literal(&inner.as_str()[2..], 16, span, ctx)?,
        Rule::bin_lit => parse_literal(&inner.as_str()[2..], 2, span, ctx)?,
        Rule::app => {
            let mut op = None;
            let mut indices = Vec::new();
            let mut args = Vec::new();
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::operator => op = Some(spanned_str(&part)),
                    Rule::numeral => {
                        let value = part.as_str().parse::<u128>().map_err(|_| {
                            ctx.syntax("numeral does not fit in 128 bits", span_from(&part))
                        })?;
                        indices.push(Spanned::new(value, span_from(&part)));
                    }
                    Rule::expr => args.push(parse_expr(part, ctx)?),
                    _ => {}
                }
            }
            let op = op.ok_or_else(|| ctx.syntax("application without operator", span))?;
            Expr::App { op, indices, args }
        }
        other => return Err(ctx.syntax(format!("unexpected {other:?} in expression"), span)),
    };
    Ok(Spanned::new(expr, span))
}

fn parse_literal(digits: &str, radix: u32, span: Span, ctx: &SourceCtx<'_>) -> Result<Expr, ParseError> {
    let bits_per_digit = if radix == 16 { 4 } else { 1 };
    let width = digits.len() * bits_per_digit;
    if width > rotor_smt::sorts::MAX_BV_WIDTH as usize {
        return Err(ctx.sort_mismatch(format!("literal is {width} bits wide, limit is 128"), span));
    }
    let value = u128::from_str_radix(digits, radix)
        .map_err(|_| ctx.syntax("malformed literal", span))?;
    Ok(Expr::BvLit {
        value,
        width: width as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALU: &str = "\
; adds one and clamps
program alu_inc
input x : bv8
input enable : bool
let t : bv8 = (bvadd x #x01)
output r : bv8 = (ite enable t x)
output wrapped : bool = (bvult t x) ; overflow flag
";

    #[test]
    fn parses_header_and_declarations_in_order() {
        let program = parse(ALU, "alu.bvp").unwrap();
        assert_eq!(program.name.node, "alu_inc");
        let names: Vec<&str> = program.decls.iter().map(|d| d.node.name().node.as_str()).collect();
        assert_eq!(names, vec!["x", "enable", "t", "r", "wrapped"]);
        assert!(matches!(program.decls[0].node, Decl::Input { .. }));
        assert!(matches!(program.decls[2].node, Decl::Let { .. }));
        assert!(matches!(program.decls[4].node, Decl::Output { .. }));
    }

    #[test]
    fn parses_literals_and_indexed_applications() {
        let src = "program p\ninput x : bv16\noutput r : bv8 = (extract 7 0 (bvor x #b0000000000000001))\n";
        let program = parse(src, "p.bvp").unwrap();
        let Decl::Output { expr, .. } = &program.decls[1].node else {
            panic!("expected output");
        };
        let Expr::App { op, indices, args } = &expr.node else {
            panic!("expected application");
        };
        assert_eq!(op.node, "extract");
        assert_eq!(indices.iter().map(|i| i.node).collect::<Vec<_>>(), vec![7, 0]);
        let Expr::App { args: inner, .. } = &args[0].node else {
            panic!("expected nested application");
        };
        assert_eq!(inner[1].node, Expr::BvLit { value: 1, width: 16 });
    }

    #[test]
    fn keywords_need_a_boundary() {
        let src = "program p\ninput inputs : bool\noutput letter : bool = inputs\n";
        let program = parse(src, "p.bvp").unwrap();
        assert_eq!(program.decls.len(), 2);
        assert_eq!(program.decls[0].node.name().node, "inputs");
    }

    #[test]
    fn syntax_errors_carry_location() {
        let err = parse("program p\ninput x bv8\n", "bad.bvp").unwrap_err();
        match err {
            ParseError::Syntax { span, src, .. } => {
                assert!(span.offset() >= 10, "offset {}", span.offset());
                assert_eq!(src.name(), "bad.bvp");
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
        assert!(parse("", "empty.bvp").is_err());
        assert!(parse("input x : bv8\n", "nohdr.bvp").is_err());
    }

    #[test]
    fn oversized_literal_is_rejected() {
        let src = format!("program p\noutput r : bool = (= #x{0} #x{0})\n", "f".repeat(33));
        assert!(matches!(
            parse(&src, "wide.bvp"),
            Err(ParseError::SortMismatch { .. })
        ));
    }
}
