use thiserror::Error;

use crate::backends::witness::WitnessError;
use crate::eval::EvalError;
use crate::terms::SortError;

/// Failure to obtain a decision from a backend.
///
/// Timeouts and `unknown` answers are not errors; they come back as
/// [`SatResult::Unknown`](crate::solver::SatResult::Unknown).
#[derive(Debug, Error)]
pub enum SolverError {
    #[error(transparent)]
    Sandbox(#[from] rotor_sandbox::SandboxError),
    #[error("failed to write solver query to {path}: {source}")]
    QueryIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("solver `{command}` {termination} without an answer; output: `{excerpt}`")]
    Crashed {
        command: String,
        termination: String,
        excerpt: String,
    },
    #[error("solver reported an error: {0}")]
    Reported(String),
    #[error("malformed solver output: {0}")]
    MalformedResponse(String),
    #[error("malformed query: {0}")]
    MalformedQuery(#[from] SortError),
    #[error(transparent)]
    Witness(#[from] WitnessError),
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),
}

/// First `max_chars` characters of solver output, newlines escaped.
pub fn output_excerpt(output: &str, max_chars: usize) -> String {
    let mut excerpt: String = output.chars().take(max_chars).collect();
    if output.chars().count() > max_chars {
        excerpt.push_str("...");
    }
    excerpt.replace('\n', "\\n")
}
