#![doc = include_str!("../README.md")]

pub mod build_driver;
pub mod config;
pub mod corpus;
pub mod equivalence;
pub mod error;
pub mod fakes;
pub mod fingerprint;
pub mod orchestrator;
pub mod replay;
pub mod report;
pub mod subject;
pub mod unit_suite;

pub use config::{ConfigError, HarnessConfig, SolverBackend};
pub use corpus::{BenchmarkCase, Corpus};
pub use error::{HarnessFault, MalformedCaseError};
pub use orchestrator::{Classification, Orchestrator, Pipeline};
pub use report::{RunReport, RunVerdict, EXIT_HARNESS_FAULT};
pub use unit_suite::{run_unit_suite, UnitReport};
