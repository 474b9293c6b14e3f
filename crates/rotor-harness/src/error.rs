use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// A problem with the harness or its environment that aborts the run.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum HarnessFault {
    #[error("cannot read corpus root {path}: {source}")]
    #[diagnostic(code(rotor::fault::corpus_root))]
    CorpusRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot prepare directory {path}: {source}")]
    #[diagnostic(code(rotor::fault::directory))]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write report {path}: {source}")]
    #[diagnostic(code(rotor::fault::report))]
    ReportWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize report: {0}")]
    #[diagnostic(code(rotor::fault::serialize))]
    Serialize(#[from] serde_json::Error),

    #[error("worker panicked while processing case `{case_id}`")]
    #[diagnostic(code(rotor::fault::worker_panic))]
    WorkerPanic { case_id: String },
}

/// A case directory that could not be turned into a benchmark case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("case `{case_id}` is malformed: {reason}")]
pub struct MalformedCaseError {
    pub case_id: String,
    pub reason: String,
}

/// Pipeline stage of a benchmark case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Build,
    Run,
    Check,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Build => "build",
            Stage::Run => "run",
            Stage::Check => "check",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-case failure recorded on the case record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseError {
    pub stage: Stage,
    pub message: String,
}

impl CaseError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage: {}", self.stage, self.message)
    }
}
