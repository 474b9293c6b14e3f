//! Layered harness configuration.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. `rotor.toml` in the working directory, or the file given explicitly
//! 3. `ROTOR_*` environment variables, `__` separating sections
//!    (`ROTOR_SOLVER__TIMEOUT_SECS=30` sets `solver.timeout_secs`)
//! 4. Command-line overrides merged by the caller onto [`HarnessConfig::figment`]

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use rotor_smt::backends::exhaustive::MAX_EXHAUSTIVE_BITS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "rotor.toml";
pub const ENV_PREFIX: &str = "ROTOR_";

#[derive(Debug, Error, miette::Diagnostic)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    #[diagnostic(code(rotor::config::figment))]
    Figment(#[from] figment::Error),

    #[error("configuration file {path} does not exist")]
    #[diagnostic(code(rotor::config::missing_file))]
    MissingFile { path: String },

    #[error("invalid configuration value for '{field}': {reason}")]
    #[diagnostic(code(rotor::config::invalid))]
    InvalidValue { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Which decision procedure answers equivalence queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    /// SMT-LIB2 script run by a solver process (Bitwuzla by default).
    Smtlib,
    /// BTOR2 model run by a bounded model checker (btormc by default).
    Btor2,
    /// In-process enumeration of every input.
    Exhaustive,
}

impl SolverBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            SolverBackend::Smtlib => "smtlib",
            SolverBackend::Btor2 => "btor2",
            SolverBackend::Exhaustive => "exhaustive",
        }
    }

    /// Solver executable used when none is configured.
    pub fn default_command(self) -> &'static str {
        match self {
            SolverBackend::Smtlib => "bitwuzla",
            SolverBackend::Btor2 => "btormc",
            SolverBackend::Exhaustive => "",
        }
    }
}

impl fmt::Display for SolverBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "smtlib" => Ok(SolverBackend::Smtlib),
            "btor2" => Ok(SolverBackend::Btor2),
            "exhaustive" => Ok(SolverBackend::Exhaustive),
            other => Err(format!(
                "unknown solver backend '{other}' (expected smtlib, btor2 or exhaustive)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    pub compiler: String,
    /// Placed before each case's own `cflags`.
    pub flags: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: "riscv64-unknown-elf-gcc".into(),
            flags: vec!["-static".into()],
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubjectConfig {
    pub command: String,
    /// Argument templates; `{binary}`, `{output}` and `{case}` are
    /// substituted. Without `{output}` the representation is read from
    /// stdout.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    /// CPU-seconds budget over the subject's process group, 0 disables.
    pub cpu_secs: u64,
    /// RSS budget in MiB over the subject's process group, 0 disables.
    pub memory_mb: u64,
    /// Run without the CPU and memory budgets where they cannot be
    /// monitored (no procfs) instead of failing every case.
    pub allow_degraded: bool,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            command: "rotor".into(),
            args: vec!["{binary}".into()],
            timeout_secs: 120,
            cpu_secs: 120,
            memory_mb: 8192,
            allow_degraded: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub backend: SolverBackend,
    /// Overrides the backend's default executable.
    pub command: Option<String>,
    /// Extra arguments placed before the query file.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub memory_mb: u64,
    /// Input-bit budget of the exhaustive backend.
    pub exhaustive_bits: u32,
    /// `-kmax` passed to the BTOR2 model checker.
    pub kmax: u32,
    /// Keep `query.smt2` / `query.btor2` in each case's work directory.
    pub dump_queries: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverBackend::Smtlib,
            command: None,
            args: Vec::new(),
            timeout_secs: 300,
            memory_mb: 0,
            exhaustive_bits: 20,
            kmax: 1,
            dump_queries: false,
        }
    }
}

impl SolverConfig {
    pub fn command(&self) -> &str {
        self.command
            .as_deref()
            .unwrap_or_else(|| self.backend.default_command())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfig {
    /// Runner for the original binary, e.g. `["qemu-riscv64", "{binary}"]`.
    /// Empty disables replay.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 10,
        }
    }
}

impl ReplayConfig {
    pub fn enabled(&self) -> bool {
        !self.command.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Inconclusive cases (unknown, timeouts) fail the run.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub corpus: PathBuf,
    pub work_dir: PathBuf,
    pub report_dir: PathBuf,
    /// 0 uses the available parallelism.
    pub workers: usize,
    /// Remove the work directory once the report is written.
    pub clean: bool,
    pub toolchain: ToolchainConfig,
    pub subject: SubjectConfig,
    pub solver: SolverConfig,
    pub replay: ReplayConfig,
    pub policy: PolicyConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            corpus: PathBuf::from("corpus"),
            work_dir: PathBuf::from("target/rotor-work"),
            report_dir: PathBuf::from("target/rotor-report"),
            workers: 0,
            clean: false,
            toolchain: ToolchainConfig::default(),
            subject: SubjectConfig::default(),
            solver: SolverConfig::default(),
            replay: ReplayConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Defaults, then the config file, then the environment.
    ///
    /// Without an explicit file, `rotor.toml` in the working directory is
    /// used when present.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        match config_file {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    figment = figment.merge(Toml::file(local));
                }
            }
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: HarnessConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(ConfigError::MissingFile {
                    path: path.display().to_string(),
                });
            }
        }
        Self::from_figment(Self::figment(config_file))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("toolchain.timeout_secs", self.toolchain.timeout_secs),
            ("subject.timeout_secs", self.subject.timeout_secs),
            ("solver.timeout_secs", self.solver.timeout_secs),
            ("replay.timeout_secs", self.replay.timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.toolchain.compiler.trim().is_empty() {
            return Err(invalid("toolchain.compiler", "must be non-empty"));
        }
        if self.subject.command.trim().is_empty() {
            return Err(invalid("subject.command", "must be non-empty"));
        }
        if self.solver.backend != SolverBackend::Exhaustive && self.solver.command().trim().is_empty() {
            return Err(invalid("solver.command", "must be non-empty"));
        }
        if self.solver.exhaustive_bits == 0 || self.solver.exhaustive_bits > MAX_EXHAUSTIVE_BITS {
            return Err(invalid(
                "solver.exhaustive_bits",
                format!(
                    "must be between 1 and {MAX_EXHAUSTIVE_BITS}, got {}",
                    self.solver.exhaustive_bits
                ),
            ));
        }
        if self.replay.command.iter().any(|part| part.trim().is_empty()) {
            return Err(invalid("replay.command", "must not contain empty parts"));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.toolchain.timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.subject.timeout_secs)
    }

    pub fn solver_timeout(&self) -> Duration {
        Duration::from_secs(self.solver.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.build_timeout(), Duration::from_secs(60));
        assert_eq!(config.run_timeout(), Duration::from_secs(120));
        assert_eq!(config.solver.command(), "bitwuzla");
        assert!(!config.replay.enabled());
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn subject_budgets_are_bounded_by_default() {
        let subject = SubjectConfig::default();
        assert!(subject.cpu_secs > 0);
        assert!(subject.memory_mb > 0);
        assert!(!subject.allow_degraded);
    }

    #[test]
    fn file_then_env_then_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "rotor.toml",
                r#"
                    workers = 3
                    [solver]
                    backend = "btor2"
                    timeout_secs = 9
                    [subject]
                    args = ["-c", "{binary}", "-o", "{output}"]
                "#,
            )?;
            jail.set_env("ROTOR_SOLVER__TIMEOUT_SECS", "7");
            jail.set_env("ROTOR_POLICY__STRICT", "true");

            let config = HarnessConfig::load(None).expect("config loads");
            assert_eq!(config.workers, 3);
            assert_eq!(config.solver.backend, SolverBackend::Btor2);
            assert_eq!(config.solver.command(), "btormc");
            assert_eq!(config.solver.timeout_secs, 7);
            assert!(config.policy.strict);
            assert_eq!(config.subject.args.len(), 4);

            let figment = HarnessConfig::figment(None).merge(Serialized::default("solver.timeout_secs", 2));
            let config = HarnessConfig::from_figment(figment).expect("override applies");
            assert_eq!(config.solver.timeout_secs, 2);
            Ok(())
        });
    }

    #[test]
    fn explicit_file_must_exist() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "clean = true\n")?;
            let config = HarnessConfig::load(Some(Path::new("custom.toml"))).expect("loads");
            assert!(config.clean);
            assert!(matches!(
                HarnessConfig::load(Some(Path::new("absent.toml"))),
                Err(ConfigError::MissingFile { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = HarnessConfig::default();
        config.subject.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "subject.timeout_secs"
        ));

        let mut config = HarnessConfig::default();
        config.solver.exhaustive_bits = MAX_EXHAUSTIVE_BITS + 1;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.toolchain.compiler = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_section_keys_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("rotor.toml", "[solver]\ntimeout = 5\n")?;
            assert!(matches!(HarnessConfig::load(None), Err(ConfigError::Figment(_))));
            Ok(())
        });
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("BTOR2".parse::<SolverBackend>(), Ok(SolverBackend::Btor2));
        assert!("z3".parse::<SolverBackend>().is_err());
    }
}
