//! Parsing of SMT-LIB2 solver answers: the `check-sat` token and the
//! `get-value` model that follows it.

use std::collections::HashMap;

use crate::error::{output_excerpt, SolverError};
use crate::solver::{Model, ModelValue, SatResult};
use crate::sorts::SmtSort;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

impl SExpr {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(atom) => Some(atom),
            SExpr::List(_) => None,
        }
    }
}

/// Parse a sequence of s-expressions. Comments run from `;` to end of line.
pub fn parse_sexprs(text: &str) -> Result<Vec<SExpr>, String> {
    let mut stack: Vec<Vec<SExpr>> = vec![Vec::new()];
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '(' => stack.push(Vec::new()),
            ')' => {
                let list = stack.pop().ok_or("unbalanced `)`")?;
                let parent = stack.last_mut().ok_or("unbalanced `)`")?;
                parent.push(SExpr::List(list));
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '|' => {
                let mut atom = String::new();
                loop {
                    match chars.next() {
                        Some('|') => break,
                        Some(c) => atom.push(c),
                        None => return Err("unterminated quoted symbol".into()),
                    }
                }
                push_atom(&mut stack, atom)?;
            }
            '"' => {
                let mut atom = String::from("\"");
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            atom.push('"');
                        }
                        Some('"') => break,
                        Some(c) => atom.push(c),
                        None => return Err("unterminated string literal".into()),
                    }
                }
                atom.push('"');
                push_atom(&mut stack, atom)?;
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '(' | ')' | ';' | '|' | '"') {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                push_atom(&mut stack, atom)?;
            }
        }
    }
    if stack.len() != 1 {
        return Err("unbalanced `(`".into());
    }
    Ok(stack.pop().unwrap_or_default())
}

fn push_atom(stack: &mut [Vec<SExpr>], atom: String) -> Result<(), String> {
    stack
        .last_mut()
        .ok_or_else(|| "empty parser stack".to_string())?
        .push(SExpr::Atom(atom));
    Ok(())
}

/// Split solver stdout into the `check-sat` answer and the remaining text.
///
/// The first meaningful line decides. An `(error ...)` before any answer is
/// a solver error; errors after the answer (e.g. `get-value` on unsat) are
/// left in the remainder.
pub fn parse_check_sat(stdout: &str) -> Result<(SatResult, &str), SolverError> {
    let mut offset = 0;
    for line in stdout.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }
        if trimmed.starts_with("(error") {
            return Err(SolverError::Reported(error_message(trimmed)));
        }
        let result = match trimmed {
            "sat" => SatResult::Sat,
            "unsat" => SatResult::Unsat,
            "unknown" => SatResult::Unknown("solver returned unknown".into()),
            _ => {
                return Err(SolverError::MalformedResponse(format!(
                    "expected one of sat/unsat/unknown, got `{}`",
                    output_excerpt(&stdout[start..], 160)
                )))
            }
        };
        return Ok((result, &stdout[offset..]));
    }
    Err(SolverError::MalformedResponse(
        "expected one of sat/unsat/unknown, got no output".into(),
    ))
}

fn error_message(line: &str) -> String {
    match parse_sexprs(line).ok().as_deref() {
        Some([SExpr::List(items)]) => match items.as_slice() {
            [_, SExpr::Atom(msg)] => msg.trim_matches('"').to_string(),
            _ => line.to_string(),
        },
        _ => line.to_string(),
    }
}

/// Parse one `get-value` value of `sort`.
pub fn parse_value(expr: &SExpr, sort: &SmtSort) -> Option<ModelValue> {
    match (sort, expr) {
        (SmtSort::Bool, SExpr::Atom(atom)) => match atom.as_str() {
            "true" => Some(ModelValue::Bool(true)),
            "false" => Some(ModelValue::Bool(false)),
            _ => None,
        },
        (SmtSort::BitVec(width), SExpr::Atom(atom)) => {
            let value = if let Some(bits) = atom.strip_prefix("#b") {
                (bits.len() == *width as usize).then(|| u128::from_str_radix(bits, 2).ok())??
            } else if let Some(hex) = atom.strip_prefix("#x") {
                (hex.len() * 4 == *width as usize).then(|| u128::from_str_radix(hex, 16).ok())??
            } else {
                return None;
            };
            Some(ModelValue::BitVec {
                value,
                width: *width,
            })
        }
        // (_ bvN w)
        (SmtSort::BitVec(width), SExpr::List(items)) => match items.as_slice() {
            [SExpr::Atom(underscore), SExpr::Atom(lit), SExpr::Atom(w)] if underscore == "_" => {
                let value: u128 = lit.strip_prefix("bv")?.parse().ok()?;
                let parsed_width: u32 = w.parse().ok()?;
                (parsed_width == *width).then_some(ModelValue::BitVec {
                    value,
                    width: *width,
                })
            }
            _ => None,
        },
        _ => None,
    }
}

/// Parse the `get-value` response for `vars` out of the text that follows
/// a `sat` answer.
pub fn parse_model(text: &str, vars: &[(&str, &SmtSort)]) -> Result<Model, SolverError> {
    if vars.is_empty() {
        return Ok(Model::default());
    }
    let exprs = parse_sexprs(text).map_err(SolverError::MalformedResponse)?;
    let sorts: HashMap<&str, &SmtSort> = vars.iter().copied().collect();
    let mut values = HashMap::new();
    for expr in &exprs {
        let SExpr::List(pairs) = expr else {
            continue;
        };
        if let Some(SExpr::Atom(head)) = pairs.first() {
            if head == "error" {
                return Err(SolverError::Reported(error_message(&render(expr))));
            }
        }
        for pair in pairs {
            let SExpr::List(items) = pair else {
                continue;
            };
            let [SExpr::Atom(name), value] = items.as_slice() else {
                continue;
            };
            let Some(sort) = sorts.get(name.as_str()) else {
                continue;
            };
            let parsed = parse_value(value, sort).ok_or_else(|| {
                SolverError::MalformedResponse(format!(
                    "cannot read value of `{name}` as {sort}: `{}`",
                    render(value)
                ))
            })?;
            values.insert(name.clone(), parsed);
        }
    }
    for (name, _) in vars {
        if !values.contains_key(*name) {
            return Err(SolverError::MalformedResponse(format!(
                "model has no value for `{name}`"
            )));
        }
    }
    Ok(Model { values })
}

fn render(expr: &SExpr) -> String {
    match expr {
        SExpr::Atom(atom) => atom.clone(),
        SExpr::List(items) => {
            let inner: Vec<String> = items.iter().map(render).collect();
            format!("({})", inner.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_lists_and_comments() {
        let exprs = parse_sexprs("; hi\n((x #b01) (|odd name| true))").unwrap();
        assert_eq!(exprs.len(), 1);
        let SExpr::List(pairs) = &exprs[0] else {
            panic!("expected list")
        };
        assert_eq!(pairs.len(), 2);
        assert!(parse_sexprs("((x)").is_err());
        assert!(parse_sexprs("x)").is_err());
    }

    #[test]
    fn check_sat_token_comes_first() {
        let (result, rest) = parse_check_sat("sat\n((x #x0a))\n").unwrap();
        assert_eq!(result, SatResult::Sat);
        assert_eq!(rest, "((x #x0a))\n");
        let (result, _) = parse_check_sat("\nunsat\n(error \"model not available\")\n").unwrap();
        assert_eq!(result, SatResult::Unsat);
        assert!(matches!(
            parse_check_sat("unknown\n").unwrap().0,
            SatResult::Unknown(_)
        ));
    }

    #[test]
    fn check_sat_rejects_errors_and_garbage() {
        match parse_check_sat("(error \"line 3: unknown sort\")\n") {
            Err(SolverError::Reported(msg)) => assert_eq!(msg, "line 3: unknown sort"),
            other => panic!("expected reported error, got {other:?}"),
        }
        assert!(matches!(
            parse_check_sat("segfault\n"),
            Err(SolverError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_check_sat(""),
            Err(SolverError::MalformedResponse(_))
        ));
    }

    #[test]
    fn reads_all_bitvector_literal_forms() {
        let sort = SmtSort::BitVec(8);
        let bin = parse_value(&SExpr::Atom("#b00000101".into()), &sort);
        let hex = parse_value(&SExpr::Atom("#x05".into()), &sort);
        let dec = parse_value(
            &SExpr::List(vec![
                SExpr::Atom("_".into()),
                SExpr::Atom("bv5".into()),
                SExpr::Atom("8".into()),
            ]),
            &sort,
        );
        let five = Some(ModelValue::BitVec { value: 5, width: 8 });
        assert_eq!(bin, five);
        assert_eq!(hex, five);
        assert_eq!(dec, five);
        assert_eq!(parse_value(&SExpr::Atom("#x5".into()), &sort), None);
    }

    #[test]
    fn model_requires_every_variable() {
        let x = SmtSort::BitVec(4);
        let b = SmtSort::Bool;
        let model = parse_model("((in_x #b1010) (in_b true))", &[("in_x", &x), ("in_b", &b)]).unwrap();
        assert_eq!(model.get_bv("in_x"), Some(10));
        assert_eq!(model.get_bool("in_b"), Some(true));

        assert!(parse_model("((in_x #b1010))", &[("in_x", &x), ("in_b", &b)]).is_err());
        assert!(parse_model("((in_x #b10))", &[("in_x", &x)]).is_err());
    }

    #[test]
    fn model_per_line_responses_are_merged() {
        let x = SmtSort::BitVec(8);
        let y = SmtSort::BitVec(8);
        let model = parse_model("((x #x01))\n((y #x02))\n", &[("x", &x), ("y", &y)]).unwrap();
        assert_eq!(model.values.len(), 2);
    }
}
