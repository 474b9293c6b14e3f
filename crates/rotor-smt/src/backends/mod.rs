//! Decision backends: SMT-LIB2 solver processes, BTOR2 model checkers and
//! in-process enumeration.

pub mod btor2_printer;
pub mod btormc;
pub mod exhaustive;
pub mod smtlib_printer;
pub mod smtlib_process;
pub mod smtlib_response;
pub mod witness;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rotor_sandbox::{CommandSpec, ProcessOutcome, SandboxLimits};
use tracing::debug;

use crate::error::SolverError;

/// How to launch an external decision procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSolverConfig {
    pub command: String,
    /// Arguments placed before the query file path.
    pub args: Vec<String>,
    pub timeout: Duration,
    /// RSS budget in MiB; 0 disables.
    pub memory_mb: u64,
    /// Where to keep the generated query. `None` uses a temporary file that
    /// is removed after the run.
    pub query_path: Option<PathBuf>,
}

impl ProcessSolverConfig {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            timeout,
            memory_mb: 0,
            query_path: None,
        }
    }
}

/// Write `query_text` to the configured (or a temporary) file and run the
/// solver on it.
pub(crate) fn run_on_query_file(
    config: &ProcessSolverConfig,
    query_text: &str,
    suffix: &str,
) -> Result<ProcessOutcome, SolverError> {
    let temp;
    let path: &Path = match &config.query_path {
        Some(path) => {
            std::fs::write(path, query_text).map_err(|source| SolverError::QueryIo {
                path: path.display().to_string(),
                source,
            })?;
            path
        }
        None => {
            temp = write_temp_query(query_text, suffix)?;
            temp.path()
        }
    };

    let spec = CommandSpec::new(&config.command)
        .args(config.args.iter().cloned())
        .arg(path.display().to_string());
    let limits = SandboxLimits {
        wall_timeout: config.timeout,
        memory_mb: config.memory_mb,
        allow_degraded: true,
        ..SandboxLimits::default()
    };
    debug!(command = %spec.display(), "running solver");
    Ok(rotor_sandbox::run(&spec, &limits)?)
}

fn write_temp_query(text: &str, suffix: &str) -> Result<tempfile::NamedTempFile, SolverError> {
    use std::io::Write;
    let io_err = |source| SolverError::QueryIo {
        path: format!("<temporary {suffix}>"),
        source,
    };
    let mut file = tempfile::Builder::new()
        .prefix("rotor-query-")
        .suffix(suffix)
        .tempfile()
        .map_err(io_err)?;
    file.write_all(text.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    Ok(file)
}
