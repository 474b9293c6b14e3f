use crate::query::SmtQuery;
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    match term {
        SmtTerm::Var(name) => symbol(name),
        SmtTerm::BoolLit(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        SmtTerm::BvLit { value, width } => bv_literal(*value, *width),
        SmtTerm::Not(inner) => format!("(not {})", to_smtlib(inner)),
        SmtTerm::And(terms) => nary("and", "true", terms),
        SmtTerm::Or(terms) => nary("or", "false", terms),
        SmtTerm::Xor(lhs, rhs) => format!("(xor {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Implies(lhs, rhs) => format!("(=> {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Eq(lhs, rhs) => format!("(= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Distinct(lhs, rhs) => {
            format!("(distinct {} {})", to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::Ite(cond, then, els) => {
            format!(
                "(ite {} {} {})",
                to_smtlib(cond),
                to_smtlib(then),
                to_smtlib(els)
            )
        }
        SmtTerm::BvUnary(op, arg) => format!("({} {})", op.smtlib_name(), to_smtlib(arg)),
        SmtTerm::BvBinary(op, lhs, rhs) => {
            format!("({} {} {})", op.smtlib_name(), to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::BvCompare(op, lhs, rhs) => {
            format!("({} {} {})", op.smtlib_name(), to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::Extract { hi, lo, arg } => {
            format!("((_ extract {hi} {lo}) {})", to_smtlib(arg))
        }
        SmtTerm::Concat(high, low) => format!("(concat {} {})", to_smtlib(high), to_smtlib(low)),
        SmtTerm::ZeroExtend { by, arg } => format!("((_ zero_extend {by}) {})", to_smtlib(arg)),
        SmtTerm::SignExtend { by, arg } => format!("((_ sign_extend {by}) {})", to_smtlib(arg)),
    }
}

fn nary(op: &str, unit: &str, terms: &[SmtTerm]) -> String {
    match terms {
        [] => unit.to_string(),
        [single] => to_smtlib(single),
        _ => {
            let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
            format!("({op} {})", inner.join(" "))
        }
    }
}

/// Print a sort as SMT-LIB2 format.
pub fn sort_to_smtlib(sort: &SmtSort) -> String {
    match sort {
        SmtSort::Bool => "Bool".to_string(),
        SmtSort::BitVec(width) => format!("(_ BitVec {width})"),
    }
}

/// Hex literal when the width is a multiple of four, binary otherwise.
pub fn bv_literal(value: u128, width: u32) -> String {
    let width = width as usize;
    if width % 4 == 0 {
        format!("#x{:0digits$x}", value, digits = width / 4)
    } else {
        format!("#b{:0width$b}", value, width = width)
    }
}

/// Simple symbols print bare; anything else is `|quoted|`.
pub fn symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{name}|")
    }
}

/// Render a complete `QF_BV` script that checks `query` and, when
/// satisfiable, prints the values of `model_vars`.
pub fn render_script(query: &SmtQuery, model_vars: &[&str]) -> String {
    let mut out = String::new();
    out.push_str("(set-option :produce-models true)\n");
    out.push_str("(set-logic QF_BV)\n");
    for (name, sort) in &query.inputs {
        out.push_str(&format!(
            "(declare-const {} {})\n",
            symbol(name),
            sort_to_smtlib(sort)
        ));
    }
    for def in &query.definitions {
        out.push_str(&format!(
            "(define-fun {} () {} {})\n",
            symbol(&def.name),
            sort_to_smtlib(&def.sort),
            to_smtlib(&def.term)
        ));
    }
    for assertion in &query.assertions {
        out.push_str(&format!("(assert {})\n", to_smtlib(assertion)));
    }
    out.push_str("(check-sat)\n");
    if !model_vars.is_empty() {
        let names: Vec<String> = model_vars.iter().map(|n| symbol(n)).collect();
        out.push_str(&format!("(get-value ({}))\n", names.join(" ")));
    }
    out.push_str("(exit)\n");
    out
}
