#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    #[diagnostic(code(rotor::bvp::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(rotor::bvp::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Unknown name: {name}")]
    #[diagnostic(
        code(rotor::bvp::unknown_name),
        help("names must be declared by an earlier `input` or `let` line")
    )]
    UnknownName {
        name: String,
        #[label("not declared before this use")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Duplicate definition: {name}")]
    #[diagnostic(code(rotor::bvp::duplicate))]
    Duplicate {
        name: String,
        #[label("duplicate")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Unknown operator '{op}'")]
    #[diagnostic(
        code(rotor::bvp::unknown_operator),
        help("operators are SMT-LIB names (bvadd, bvult, ite, =, ...) plus extract, zext, sext, concat and bv")
    )]
    UnknownOperator {
        op: String,
        #[label("unknown operator")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("'{op}' expects {expected}, found {found}")]
    #[diagnostic(code(rotor::bvp::arity))]
    Arity {
        op: String,
        expected: String,
        found: String,
        #[label("wrong number of operands")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Sort mismatch: {message}")]
    #[diagnostic(code(rotor::bvp::sort))]
    SortMismatch {
        message: String,
        #[label("ill-sorted")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Program '{name}' declares no outputs")]
    #[diagnostic(code(rotor::bvp::no_outputs))]
    NoOutputs { name: String },

    #[error("{0}")]
    #[diagnostic(code(rotor::bvp::multiple))]
    MultipleErrors(#[from] ParseErrors),
}

/// Wrapper for collecting multiple semantic errors.
///
/// The checker keeps going after an ill-typed binding (its declared sort is
/// trusted downstream) so one run reports every problem in a file.
#[derive(Debug, Error)]
#[error("{}", format_parse_errors(.errors))]
pub struct ParseErrors {
    pub errors: Vec<ParseError>,
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    if errors.len() == 1 {
        return errors[0].to_string();
    }
    let mut s = format!("{} errors:\n", errors.len());
    for (i, e) in errors.iter().enumerate() {
        s.push_str(&format!("  {}. {}\n", i + 1, e));
    }
    s
}

impl ParseErrors {
    /// Collapse into a single error, unwrapping the one-element case.
    pub fn into_error(mut self) -> ParseError {
        if self.errors.len() == 1 {
            if let Some(only) = self.errors.pop() {
                return only;
            }
        }
        ParseError::MultipleErrors(self)
    }
}

/// Source text and file name attached to every spanned error.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceCtx<'a> {
    pub source: &'a str,
    pub filename: &'a str,
}

impl SourceCtx<'_> {
    fn src(&self) -> miette::NamedSource<String> {
        miette::NamedSource::new(self.filename, self.source.to_owned())
    }

    pub fn syntax(&self, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::Syntax {
            message: message.into(),
            span: source_span(span),
            src: self.src(),
        }
    }

    pub fn unknown_name(&self, name: &str, span: Span) -> ParseError {
        ParseError::UnknownName {
            name: name.to_string(),
            span: source_span(span),
            src: self.src(),
        }
    }

    pub fn duplicate(&self, name: &str, span: Span) -> ParseError {
        ParseError::Duplicate {
            name: name.to_string(),
            span: source_span(span),
            src: self.src(),
        }
    }

    pub fn unknown_operator(&self, op: &str, span: Span) -> ParseError {
        ParseError::UnknownOperator {
            op: op.to_string(),
            span: source_span(span),
            src: self.src(),
        }
    }

    pub fn arity(&self, op: &str, expected: impl Into<String>, found: impl Into<String>, span: Span) -> ParseError {
        ParseError::Arity {
            op: op.to_string(),
            expected: expected.into(),
            found: found.into(),
            span: source_span(span),
            src: self.src(),
        }
    }

    pub fn sort_mismatch(&self, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::SortMismatch {
            message: message.into(),
            span: source_span(span),
            src: self.src(),
        }
    }
}

fn source_span(span: Span) -> miette::SourceSpan {
    (span.start, span.len()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SourceCtx<'static> {
        SourceCtx {
            source: "program p\ninput x : bv8\n",
            filename: "p.bvp",
        }
    }

    #[test]
    fn display_messages_name_the_problem() {
        let ctx = ctx();
        assert_eq!(
            ctx.syntax("unexpected EOF", Span::new(0, 5)).to_string(),
            "Syntax error: unexpected EOF"
        );
        assert_eq!(ctx.unknown_name("y", Span::new(1, 2)).to_string(), "Unknown name: y");
        assert_eq!(
            ctx.arity("bvadd", "2 operands", "1", Span::new(0, 1)).to_string(),
            "'bvadd' expects 2 operands, found 1"
        );
        assert_eq!(
            ParseError::NoOutputs { name: "p".into() }.to_string(),
            "Program 'p' declares no outputs"
        );
    }

    #[test]
    fn spans_become_offset_and_length() {
        match ctx().duplicate("x", Span::new(16, 17)) {
            ParseError::Duplicate { span, src, .. } => {
                assert_eq!(span.offset(), 16);
                assert_eq!(span.len(), 1);
                assert_eq!(src.name(), "p.bvp");
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[test]
    fn multiple_errors_are_numbered_and_single_is_unwrapped() {
        let ctx = ctx();
        let errs = ParseErrors {
            errors: vec![
                ctx.unknown_name("a", Span::new(0, 1)),
                ctx.unknown_name("b", Span::new(2, 3)),
            ],
        };
        let msg = errs.to_string();
        assert!(msg.starts_with("2 errors:\n"));
        assert!(msg.contains("1. Unknown name: a"));
        assert!(msg.contains("2. Unknown name: b"));

        let single = ParseErrors {
            errors: vec![ctx.unknown_name("a", Span::new(0, 1))],
        };
        assert!(matches!(single.into_error(), ParseError::UnknownName { .. }));
    }
}
