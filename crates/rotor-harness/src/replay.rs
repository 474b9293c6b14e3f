//! Replay of counterexamples on the original binary.
//!
//! The binary reads its inputs from stdin in declaration order, each as
//! `ceil(width / 8)` little-endian bytes (booleans take one byte), and
//! prints one `name=<decimal>` line per output. Replay evidence is
//! attached to a verdict but never changes its classification.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use rotor_ir::BehaviorProgram;
use rotor_sandbox::{CommandSpec, SandboxLimits, Termination};
use rotor_smt::eval::{mask, Env, Value};
use serde::Serialize;
use tracing::debug;

use crate::config::ReplayConfig;
use crate::equivalence::Counterexample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    /// The binary agrees with the reference model at the counterexample.
    Confirmed,
    /// The binary disagrees with the reference model.
    Diverged,
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayEvidence {
    pub status: ReplayStatus,
    pub detail: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub observed: IndexMap<String, String>,
}

impl ReplayEvidence {
    fn inconclusive(detail: impl Into<String>) -> Self {
        Self {
            status: ReplayStatus::Inconclusive,
            detail: detail.into(),
            observed: IndexMap::new(),
        }
    }
}

/// Stdin bytes for `values`, following the program's input order.
pub fn encode_inputs(program: &BehaviorProgram, values: &Env) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (name, sort) in &program.inputs {
        let value = values.get(name).copied().unwrap_or(Value::zero(*sort));
        let len = sort.bit_width().div_ceil(8).max(1) as usize;
        bytes.extend_from_slice(&value.raw().to_le_bytes()[..len]);
    }
    bytes
}

/// `name=<decimal>` lines; anything else is ignored. Negative values
/// are read as two's complement.
pub fn parse_observations(stdout: &str) -> IndexMap<String, u128> {
    let mut observed = IndexMap::new();
    for line in stdout.lines() {
        let Some((name, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim();
        let parsed = match value.strip_prefix('-') {
            Some(magnitude) => magnitude.parse::<u128>().ok().map(|m| m.wrapping_neg()),
            None => value.parse::<u128>().ok(),
        };
        if let Some(parsed) = parsed {
            observed.insert(name.trim().to_string(), parsed);
        }
    }
    observed
}

/// Runs the original binary (usually under an emulator) on counterexample
/// inputs.
#[derive(Debug, Clone)]
pub struct Replayer {
    command: Vec<String>,
    timeout: Duration,
}

impl Replayer {
    /// `None` when replay is disabled.
    pub fn from_config(config: &ReplayConfig) -> Option<Self> {
        config.enabled().then(|| Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn command_for(&self, binary: &Path, stdin: Vec<u8>) -> Option<CommandSpec> {
        let binary = binary.display().to_string();
        let mut parts = self.command.iter().map(|part| part.replace("{binary}", &binary));
        let program = parts.next()?;
        Some(CommandSpec::new(program).args(parts).stdin_bytes(stdin))
    }

    pub fn replay(&self, binary: &Path, reference: &BehaviorProgram, cex: &Counterexample) -> ReplayEvidence {
        let expected = match reference.evaluate(&cex.values) {
            Ok(expected) => expected,
            Err(err) => return ReplayEvidence::inconclusive(format!("reference model cannot be evaluated: {err}")),
        };
        let Some(spec) = self.command_for(binary, encode_inputs(reference, &cex.values)) else {
            return ReplayEvidence::inconclusive("no replay command configured");
        };
        debug!(command = %spec.display(), "replaying counterexample");
        let outcome = match rotor_sandbox::run(&spec, &SandboxLimits::with_timeout(self.timeout)) {
            Ok(outcome) => outcome,
            Err(err) => return ReplayEvidence::inconclusive(err.to_string()),
        };
        if outcome.termination != Termination::Exited(0) {
            return ReplayEvidence::inconclusive(format!("binary {}", outcome.termination));
        }

        let observed = parse_observations(&outcome.stdout_lossy());
        let mut evidence = ReplayEvidence {
            status: ReplayStatus::Confirmed,
            detail: "binary agrees with the reference model".to_string(),
            observed: observed
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect(),
        };
        for (name, value) in &expected {
            let Some(seen) = observed.get(name) else {
                evidence.status = ReplayStatus::Inconclusive;
                evidence.detail = format!("binary printed no value for `{name}`");
                return evidence;
            };
            let seen = seen & mask(value.sort().bit_width());
            if seen != value.raw() {
                evidence.status = ReplayStatus::Diverged;
                evidence.detail = format!("binary printed {name}={seen}, reference model gives {}", value.raw());
                return evidence;
            }
        }
        evidence
    }
}
