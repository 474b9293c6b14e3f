//! Drives every case through Build, Run and Check.
//!
//! Each case walks `Pending → Building → Running → Checking → Done`; a
//! failing stage moves it to `Skipped` and records what was not run. The
//! run itself only aborts on a [`HarnessFault`].

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::build_driver::{BuildArtifact, BuildFailure, Builder, CrossCompiler};
use crate::config::HarnessConfig;
use crate::corpus::{BenchmarkCase, Corpus};
use crate::equivalence::{EquivalenceChecker, EquivalenceOutcome, EquivalenceVerdict};
use crate::error::{CaseError, HarnessFault, MalformedCaseError, Stage};
use crate::fingerprint::{sanitize_component, sha256_hex_bytes};
use crate::replay::Replayer;
use crate::report::RunReport;
use crate::subject::{ProcessSubject, SubjectExecutor, TranslationResult, TranslationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Pending,
    Building,
    Running,
    Checking,
    Done,
    Skipped,
}

impl CaseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CaseState::Done | CaseState::Skipped)
    }

    /// The forward chain, plus `Skipped` from any non-terminal state.
    pub fn can_advance_to(self, next: CaseState) -> bool {
        match (self, next) {
            (from, CaseState::Skipped) => !from.is_terminal(),
            (CaseState::Pending, CaseState::Building)
            | (CaseState::Building, CaseState::Running)
            | (CaseState::Running, CaseState::Checking)
            | (CaseState::Checking, CaseState::Done) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Equivalent,
    Inequivalent,
    Unknown,
    Error,
    BuildFailed,
    BuildTimeout,
    RunCrashed,
    RunTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Success,
    Failure,
    Inconclusive,
    Error,
}

impl Classification {
    pub const ALL: [Classification; 8] = [
        Classification::Equivalent,
        Classification::Inequivalent,
        Classification::Unknown,
        Classification::Error,
        Classification::BuildFailed,
        Classification::BuildTimeout,
        Classification::RunCrashed,
        Classification::RunTimeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Equivalent => "equivalent",
            Classification::Inequivalent => "inequivalent",
            Classification::Unknown => "unknown",
            Classification::Error => "error",
            Classification::BuildFailed => "build_failed",
            Classification::BuildTimeout => "build_timeout",
            Classification::RunCrashed => "run_crashed",
            Classification::RunTimeout => "run_timeout",
        }
    }

    pub fn category(self) -> Category {
        match self {
            Classification::Equivalent => Category::Success,
            Classification::Inequivalent => Category::Failure,
            Classification::Unknown | Classification::BuildTimeout | Classification::RunTimeout => {
                Category::Inconclusive
            }
            Classification::Error | Classification::BuildFailed | Classification::RunCrashed => Category::Error,
        }
    }

    /// Fails the run regardless of policy.
    pub fn is_hard_failure(self) -> bool {
        matches!(self.category(), Category::Failure | Category::Error)
    }

    pub fn is_inconclusive(self) -> bool {
        self.category() == Category::Inconclusive
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a case stopped and which stages never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipRecord {
    pub stage: Stage,
    pub reason: String,
    pub skipped: Vec<Stage>,
}

/// Everything the run learned about one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    pub case_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub source_sha256: String,
    pub state: CaseState,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<BuildArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<EquivalenceVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CaseError>,
    pub duration_ms: u64,
}

/// `<work_dir>/<sanitized id>-<id hash prefix>`; the hash keeps ids that
/// sanitize alike (`a/b`, `a.b`) apart.
pub fn case_work_dir(work_root: &Path, case_id: &str) -> PathBuf {
    let digest = sha256_hex_bytes(case_id.as_bytes());
    work_root.join(format!("{}-{}", sanitize_component(case_id), &digest[..8]))
}

/// The three stages wired to their ports.
#[derive(Clone)]
pub struct Pipeline {
    builder: Arc<dyn Builder>,
    subject: Arc<dyn SubjectExecutor>,
    checker: EquivalenceChecker,
    replayer: Option<Replayer>,
}

struct Progress<'a> {
    case_id: &'a str,
    state: CaseState,
}

impl Progress<'_> {
    fn advance(&mut self, next: CaseState) {
        debug_assert!(self.state.can_advance_to(next), "{:?} -> {:?}", self.state, next);
        debug!(case = %self.case_id, from = ?self.state, to = ?next, "case state");
        self.state = next;
    }
}

impl Pipeline {
    pub fn new(builder: Arc<dyn Builder>, subject: Arc<dyn SubjectExecutor>, checker: EquivalenceChecker) -> Self {
        Self {
            builder,
            subject,
            checker,
            replayer: None,
        }
    }

    /// Process adapters for every port, as configured.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            Arc::new(CrossCompiler::new(&config.toolchain)),
            Arc::new(ProcessSubject::new(&config.subject)),
            EquivalenceChecker::from_config(&config.solver),
        )
        .with_replayer(Replayer::from_config(&config.replay))
    }

    pub fn with_replayer(mut self, replayer: Option<Replayer>) -> Self {
        self.replayer = replayer;
        self
    }

    pub fn checker(&self) -> &EquivalenceChecker {
        &self.checker
    }

    /// Run one case to its terminal classification. `work_dir` must exist.
    pub fn process(&self, case: &BenchmarkCase, work_dir: &Path) -> CaseRecord {
        let started = Instant::now();
        let mut progress = Progress {
            case_id: &case.id,
            state: CaseState::Pending,
        };
        let mut record = CaseRecord {
            case_id: case.id.clone(),
            tags: case.tags.clone(),
            source_sha256: case.source_sha256.clone(),
            state: CaseState::Pending,
            classification: Classification::Error,
            artifact: None,
            translation: None,
            verdict: None,
            skip: None,
            error: None,
            duration_ms: 0,
        };
        info!(case = %case.id, "case started");

        progress.advance(CaseState::Building);
        let artifact = self.builder.build(case, work_dir);
        if !artifact.is_success() {
            let classification = if artifact.failure == Some(BuildFailure::Timeout) {
                Classification::BuildTimeout
            } else {
                Classification::BuildFailed
            };
            let reason = artifact.failure_reason();
            record.artifact = Some(artifact);
            return finish_skipped(record, &mut progress, Stage::Build, classification, reason, started);
        }

        progress.advance(CaseState::Running);
        let translation = self.subject.run(case, &artifact, work_dir);
        let binary = artifact.binary.clone();
        record.artifact = Some(artifact);
        let representation = match (translation.status, &translation.representation) {
            (TranslationStatus::Completed, Some(path)) => path.clone(),
            (status, _) => {
                let classification = if status == TranslationStatus::Timeout {
                    Classification::RunTimeout
                } else {
                    Classification::RunCrashed
                };
                let reason = translation.summary();
                record.translation = Some(translation);
                return finish_skipped(record, &mut progress, Stage::Run, classification, reason, started);
            }
        };
        record.translation = Some(translation);

        progress.advance(CaseState::Checking);
        let request = self.checker.request_for(case, work_dir);
        let mut verdict = self.checker.check_file(&case.reference, &representation, &request);
        if let (Some(replayer), Some(cex)) = (&self.replayer, &verdict.counterexample) {
            let evidence = replayer.replay(&binary, &case.reference, cex);
            debug!(case = %case.id, status = ?evidence.status, "replay finished");
            verdict.replay = Some(evidence);
        }
        record.classification = match verdict.outcome {
            EquivalenceOutcome::Equivalent => Classification::Equivalent,
            EquivalenceOutcome::Inequivalent => Classification::Inequivalent,
            EquivalenceOutcome::Unknown => Classification::Unknown,
            EquivalenceOutcome::Error => {
                record.error = Some(CaseError::new(Stage::Check, verdict.detail.clone()));
                Classification::Error
            }
        };
        record.verdict = Some(verdict);
        progress.advance(CaseState::Done);
        record.state = progress.state;
        record.duration_ms = started.elapsed().as_millis() as u64;
        info!(case = %case.id, classification = %record.classification, "case finished");
        record
    }
}

fn finish_skipped(
    mut record: CaseRecord,
    progress: &mut Progress<'_>,
    stage: Stage,
    classification: Classification,
    reason: String,
    started: Instant,
) -> CaseRecord {
    progress.advance(CaseState::Skipped);
    let skipped = [Stage::Build, Stage::Run, Stage::Check]
        .into_iter()
        .skip_while(|s| *s != stage)
        .skip(1)
        .collect();
    warn!(case = %record.case_id, stage = %stage, reason = %reason, "case truncated");
    record.error = Some(CaseError::new(stage, reason.clone()));
    record.skip = Some(SkipRecord { stage, reason, skipped });
    record.classification = classification;
    record.state = progress.state;
    record.duration_ms = started.elapsed().as_millis() as u64;
    info!(case = %record.case_id, classification = %classification, "case finished");
    record
}

/// Runs a corpus through a [`Pipeline`] on a bounded worker pool.
pub struct Orchestrator {
    config: HarnessConfig,
    pipeline: Pipeline,
}

enum WorkerMessage {
    Done(CaseRecord),
    Panicked(usize),
}

impl Orchestrator {
    pub fn new(config: HarnessConfig, pipeline: Pipeline) -> Self {
        Self { config, pipeline }
    }

    pub fn from_config(config: HarnessConfig) -> Self {
        let pipeline = Pipeline::from_config(&config);
        Self::new(config, pipeline)
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Integration mode: the whole corpus through Build, Run and Check.
    pub fn run_integration(&self) -> Result<RunReport, HarnessFault> {
        let corpus = Corpus::open(&self.config.corpus)?;
        info!(root = %corpus.root().display(), cases = corpus.len(), "corpus opened");
        let (cases, load_errors) = corpus.load_all();
        self.run_cases(cases, load_errors)
    }

    /// Process already-loaded cases; records come back sorted by id.
    pub fn run_cases(&self, cases: Vec<BenchmarkCase>, load_errors: Vec<MalformedCaseError>) -> Result<RunReport, HarnessFault> {
        let started = Instant::now();
        let work_root = prepare_dir(&self.config.work_dir)?;
        let mut dirs = Vec::with_capacity(cases.len());
        for case in &cases {
            let dir = case_work_dir(&work_root, &case.id);
            std::fs::create_dir_all(&dir).map_err(|source| HarnessFault::Directory {
                path: dir.display().to_string(),
                source,
            })?;
            dirs.push(dir);
        }

        let workers = self.config.worker_count().clamp(1, cases.len().max(1));
        info!(cases = cases.len(), workers, "run started");
        let mut records = self.run_pool(&cases, &dirs, workers)?;
        records.sort_by(|a, b| a.case_id.cmp(&b.case_id));

        let report = RunReport::new(
            &self.config,
            records,
            load_errors,
            Duration::from_millis(started.elapsed().as_millis() as u64),
        )
        .with_backend(self.pipeline.checker().decider_name());
        info!(
            cases = report.summary.total,
            failures = report.summary.hard_failures(),
            inconclusive = report.summary.inconclusive(),
            "run finished"
        );
        Ok(report)
    }

    /// Write the report files, then drop the work directory under `clean`.
    pub fn publish(&self, report: &RunReport) -> Result<Vec<PathBuf>, HarnessFault> {
        let written = report.write(&self.config.report_dir)?;
        if self.config.clean {
            match std::fs::remove_dir_all(&self.config.work_dir) {
                Ok(()) => debug!(dir = %self.config.work_dir.display(), "work directory removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(HarnessFault::Directory {
                        path: self.config.work_dir.display().to_string(),
                        source,
                    })
                }
            }
        }
        Ok(written)
    }

    fn run_pool(&self, cases: &[BenchmarkCase], dirs: &[PathBuf], workers: usize) -> Result<Vec<CaseRecord>, HarnessFault> {
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();
        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                let pipeline = &self.pipeline;
                scope.spawn(move || loop {
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let Some(case) = cases.get(idx) else {
                        break;
                    };
                    let message = match catch_unwind(AssertUnwindSafe(|| pipeline.process(case, &dirs[idx]))) {
                        Ok(record) => WorkerMessage::Done(record),
                        Err(_) => WorkerMessage::Panicked(idx),
                    };
                    let panicked = matches!(message, WorkerMessage::Panicked(_));
                    if tx.send(message).is_err() || panicked {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut records = Vec::with_capacity(cases.len());
        let mut panicked = None;
        for message in rx {
            match message {
                WorkerMessage::Done(record) => records.push(record),
                WorkerMessage::Panicked(idx) => {
                    panicked.get_or_insert(idx);
                }
            }
        }
        if let Some(idx) = panicked {
            return Err(HarnessFault::WorkerPanic {
                case_id: cases[idx].id.clone(),
            });
        }
        Ok(records)
    }
}

/// Create `dir` and return it as an absolute path, so subprocesses see the
/// same location whatever their working directory.
pub(crate) fn prepare_dir(dir: &Path) -> Result<PathBuf, HarnessFault> {
    let fault = |source: std::io::Error| HarnessFault::Directory {
        path: dir.display().to_string(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(fault)?;
    dir.canonicalize().map_err(fault)
}
