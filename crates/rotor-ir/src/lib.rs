#![doc = include_str!("../README.md")]

pub mod ast;
mod check;
pub mod encode;
pub mod errors;
pub mod miter;
pub mod ops;
pub mod parser;
pub mod program;

use std::path::Path;

pub use errors::{LoadError, ParseError};
pub use parser::parse;
pub use program::{BehaviorProgram, Binding};

/// Parse and check a behavior program.
pub fn load(source: &str, filename: &str) -> Result<BehaviorProgram, ParseError> {
    let program = parse(source, filename)?;
    let ctx = errors::SourceCtx { source, filename };
    check::check(&program, &ctx)
}

/// Read, parse and check a `.bvp` file.
pub fn load_file(path: &Path) -> Result<BehaviorProgram, LoadError> {
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(load(&source, &path.display().to_string())?)
}
