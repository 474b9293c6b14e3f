//! Run reports: `report.json` for machines, `summary.txt` for people.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::config::HarnessConfig;
use crate::error::{HarnessFault, MalformedCaseError};
use crate::fingerprint::sha256_hex_bytes;
use crate::orchestrator::{CaseRecord, Category, Classification};

pub const REPORT_SCHEMA_VERSION: u32 = 1;
pub const REPORT_FILE: &str = "report.json";
pub const SUMMARY_FILE: &str = "summary.txt";

/// Exit status of a run that completed without a harness fault.
pub const EXIT_PASS: i32 = 0;
pub const EXIT_FAIL: i32 = 1;
pub const EXIT_INCONCLUSIVE: i32 = 4;
pub const EXIT_HARNESS_FAULT: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    Pass,
    Fail,
    Inconclusive,
}

impl RunVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            RunVerdict::Pass => "pass",
            RunVerdict::Fail => "fail",
            RunVerdict::Inconclusive => "inconclusive",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            RunVerdict::Pass => EXIT_PASS,
            RunVerdict::Fail => EXIT_FAIL,
            RunVerdict::Inconclusive => EXIT_INCONCLUSIVE,
        }
    }
}

/// Tally per classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub equivalent: usize,
    pub inequivalent: usize,
    pub unknown: usize,
    pub error: usize,
    pub build_failed: usize,
    pub build_timeout: usize,
    pub run_crashed: usize,
    pub run_timeout: usize,
    pub load_errors: usize,
}

impl Summary {
    fn from_records(records: &[CaseRecord], load_errors: usize) -> Self {
        let mut summary = Summary {
            load_errors,
            ..Summary::default()
        };
        for record in records {
            summary.total += 1;
            *summary.slot(record.classification) += 1;
        }
        summary
    }

    fn slot(&mut self, classification: Classification) -> &mut usize {
        match classification {
            Classification::Equivalent => &mut self.equivalent,
            Classification::Inequivalent => &mut self.inequivalent,
            Classification::Unknown => &mut self.unknown,
            Classification::Error => &mut self.error,
            Classification::BuildFailed => &mut self.build_failed,
            Classification::BuildTimeout => &mut self.build_timeout,
            Classification::RunCrashed => &mut self.run_crashed,
            Classification::RunTimeout => &mut self.run_timeout,
        }
    }

    pub fn count(&self, classification: Classification) -> usize {
        match classification {
            Classification::Equivalent => self.equivalent,
            Classification::Inequivalent => self.inequivalent,
            Classification::Unknown => self.unknown,
            Classification::Error => self.error,
            Classification::BuildFailed => self.build_failed,
            Classification::BuildTimeout => self.build_timeout,
            Classification::RunCrashed => self.run_crashed,
            Classification::RunTimeout => self.run_timeout,
        }
    }

    pub fn hard_failures(&self) -> usize {
        self.inequivalent + self.error + self.build_failed + self.run_crashed
    }

    pub fn inconclusive(&self) -> usize {
        self.unknown + self.build_timeout + self.run_timeout
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub mode: String,
    pub corpus: String,
    pub backend: String,
    pub strict: bool,
    pub duration_ms: u64,
    pub overall: RunVerdict,
    pub outcome_fingerprint: String,
    /// Case id to classification, in id order.
    pub outcomes: BTreeMap<String, Classification>,
    pub summary: Summary,
    pub records: Vec<CaseRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub load_errors: Vec<MalformedCaseError>,
}

fn fingerprint_of(records: &[CaseRecord]) -> String {
    let mut material = String::new();
    for record in records {
        let _ = writeln!(material, "{}\t{}", record.case_id, record.classification);
    }
    sha256_hex_bytes(material.as_bytes())
}

impl RunReport {
    /// Sorts `records` by case id and derives the summary.
    pub fn new(
        config: &HarnessConfig,
        mut records: Vec<CaseRecord>,
        mut load_errors: Vec<MalformedCaseError>,
        duration: Duration,
    ) -> Self {
        records.sort_by(|a, b| a.case_id.cmp(&b.case_id));
        load_errors.sort_by(|a, b| a.case_id.cmp(&b.case_id));
        let summary = Summary::from_records(&records, load_errors.len());
        let strict = config.policy.strict;
        let overall = if summary.hard_failures() > 0 || summary.load_errors > 0 {
            RunVerdict::Fail
        } else if strict && summary.inconclusive() > 0 {
            RunVerdict::Inconclusive
        } else {
            RunVerdict::Pass
        };
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            mode: "integration".to_string(),
            corpus: config.corpus.display().to_string(),
            backend: config.solver.backend.as_str().to_string(),
            strict,
            duration_ms: duration.as_millis() as u64,
            overall,
            outcome_fingerprint: fingerprint_of(&records),
            outcomes: records
                .iter()
                .map(|r| (r.case_id.clone(), r.classification))
                .collect(),
            summary,
            records,
            load_errors,
        }
    }

    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_string();
        self
    }

    /// SHA-256 over the `(case id, classification)` pairs. Timings and
    /// logs do not contribute, so repeated runs over an unchanged corpus
    /// agree.
    pub fn outcome_fingerprint(&self) -> &str {
        &self.outcome_fingerprint
    }

    pub fn exit_code(&self) -> i32 {
        self.overall.exit_code()
    }

    pub fn to_json(&self) -> Result<String, HarnessFault> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn render_summary_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "rotor-bench {} run: {} cases, backend {}, {} ms",
            self.mode, self.summary.total, self.backend, self.duration_ms
        );
        for record in &self.records {
            let _ = writeln!(
                out,
                "[{}] {} :: {}{}",
                label(record.classification),
                record.case_id,
                record.classification,
                detail_suffix(record)
            );
        }
        for error in &self.load_errors {
            let _ = writeln!(out, "[LOAD] {} :: {}", error.case_id, error.reason);
        }
        let s = &self.summary;
        out.push('\n');
        let _ = writeln!(out, "Equivalent: {}", s.equivalent);
        let _ = writeln!(
            out,
            "System under test is wrong: {} (inequivalent {}, run_crashed {})",
            s.inequivalent + s.run_crashed,
            s.inequivalent,
            s.run_crashed
        );
        let _ = writeln!(
            out,
            "Harness or environment problem: {} (error {}, build_failed {}, load errors {})",
            s.error + s.build_failed + s.load_errors,
            s.error,
            s.build_failed,
            s.load_errors
        );
        let _ = writeln!(
            out,
            "Inconclusive: {} (unknown {}, build_timeout {}, run_timeout {}){}",
            s.inconclusive(),
            s.unknown,
            s.build_timeout,
            s.run_timeout,
            if self.strict { ", fails the run under --strict" } else { "" }
        );
        let _ = writeln!(out, "Overall: {}", self.overall.as_str());
        let _ = writeln!(out, "Outcome fingerprint: {}", self.outcome_fingerprint);
        out
    }

    /// Write `report.json` and `summary.txt` below `report_dir`.
    pub fn write(&self, report_dir: &Path) -> Result<Vec<PathBuf>, HarnessFault> {
        std::fs::create_dir_all(report_dir).map_err(|source| HarnessFault::Directory {
            path: report_dir.display().to_string(),
            source,
        })?;
        let json_path = report_dir.join(REPORT_FILE);
        write_file(&json_path, &self.to_json()?)?;
        let summary_path = report_dir.join(SUMMARY_FILE);
        write_file(&summary_path, &self.render_summary_text())?;
        Ok(vec![json_path, summary_path])
    }
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), HarnessFault> {
    std::fs::write(path, contents).map_err(|source| HarnessFault::ReportWrite {
        path: path.display().to_string(),
        source,
    })
}

fn label(classification: Classification) -> &'static str {
    match (classification, classification.category()) {
        (_, Category::Success) => "PASS",
        (Classification::Inequivalent | Classification::RunCrashed, _) => "FAIL",
        (_, Category::Inconclusive) => "INCONCLUSIVE",
        _ => "ERROR",
    }
}

fn detail_suffix(record: &CaseRecord) -> String {
    if let Some(skip) = &record.skip {
        return format!(" ({} stage: {})", skip.stage, skip.reason);
    }
    match &record.verdict {
        Some(verdict) if record.classification != Classification::Equivalent => {
            let mut detail = format!(" ({})", verdict.detail);
            if let Some(replay) = &verdict.replay {
                let _ = write!(detail, " [replay {:?}: {}]", replay.status, replay.detail);
            }
            detail
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::orchestrator::{CaseState, SkipRecord};

    fn record(id: &str, classification: Classification) -> CaseRecord {
        CaseRecord {
            case_id: id.to_string(),
            tags: Vec::new(),
            source_sha256: String::new(),
            state: CaseState::Done,
            classification,
            artifact: None,
            translation: None,
            verdict: None,
            skip: None,
            error: None,
            duration_ms: 17,
        }
    }

    fn config(strict: bool) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.policy.strict = strict;
        config
    }

    #[test]
    fn records_are_sorted_and_counted() {
        let report = RunReport::new(
            &config(false),
            vec![
                record("b", Classification::Inequivalent),
                record("a", Classification::Equivalent),
                record("c", Classification::RunTimeout),
            ],
            Vec::new(),
            Duration::from_millis(5),
        );
        assert_eq!(report.records[0].case_id, "a");
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.count(Classification::Inequivalent), 1);
        assert_eq!(report.summary.hard_failures(), 1);
        assert_eq!(report.summary.inconclusive(), 1);
        assert_eq!(report.overall, RunVerdict::Fail);
        assert_eq!(report.exit_code(), EXIT_FAIL);
    }

    #[test]
    fn strict_policy_turns_inconclusive_into_exit_four() {
        let records = || vec![record("a", Classification::Equivalent), record("b", Classification::Unknown)];
        let lenient = RunReport::new(&config(false), records(), Vec::new(), Duration::ZERO);
        assert_eq!(lenient.exit_code(), EXIT_PASS);
        let strict = RunReport::new(&config(true), records(), Vec::new(), Duration::ZERO);
        assert_eq!(strict.exit_code(), EXIT_INCONCLUSIVE);
    }

    #[test]
    fn load_errors_fail_the_run() {
        let report = RunReport::new(
            &config(false),
            vec![record("a", Classification::Equivalent)],
            vec![MalformedCaseError {
                case_id: "broken".into(),
                reason: "invalid case.toml".into(),
            }],
            Duration::ZERO,
        );
        assert_eq!(report.overall, RunVerdict::Fail);
        assert!(report.render_summary_text().contains("[LOAD] broken :: invalid case.toml"));
    }

    #[test]
    fn fingerprint_ignores_timings_and_order() {
        let mut slow = record("a", Classification::Equivalent);
        slow.duration_ms = 9_000;
        let first = RunReport::new(
            &config(false),
            vec![record("b", Classification::Unknown), record("a", Classification::Equivalent)],
            Vec::new(),
            Duration::from_millis(1),
        );
        let second = RunReport::new(
            &config(false),
            vec![slow, record("b", Classification::Unknown)],
            Vec::new(),
            Duration::from_secs(3),
        );
        assert_eq!(first.outcome_fingerprint(), second.outcome_fingerprint());
        let changed = RunReport::new(
            &config(false),
            vec![record("a", Classification::Equivalent), record("b", Classification::Error)],
            Vec::new(),
            Duration::ZERO,
        );
        assert_ne!(first.outcome_fingerprint(), changed.outcome_fingerprint());
    }

    #[test]
    fn summary_text_separates_the_three_groups() {
        let mut crashed = record("c", Classification::RunCrashed);
        crashed.skip = Some(SkipRecord {
            stage: Stage::Run,
            reason: "terminated by signal 11".into(),
            skipped: vec![Stage::Check],
        });
        let report = RunReport::new(
            &config(true),
            vec![
                record("a", Classification::Equivalent),
                record("b", Classification::BuildFailed),
                crashed,
                record("d", Classification::RunTimeout),
            ],
            Vec::new(),
            Duration::ZERO,
        );
        let text = report.render_summary_text();
        assert!(text.contains("[PASS] a :: equivalent"));
        assert!(text.contains("[ERROR] b :: build_failed"));
        assert!(text.contains("[FAIL] c :: run_crashed (run stage: terminated by signal 11)"));
        assert!(text.contains("[INCONCLUSIVE] d :: run_timeout"));
        assert!(text.contains("System under test is wrong: 1"));
        assert!(text.contains("Harness or environment problem: 1"));
        assert!(text.contains("Inconclusive: 1"));
        assert!(text.contains("Overall: fail"));
    }

    #[test]
    fn json_maps_ids_to_outcomes() {
        let report = RunReport::new(
            &config(false),
            vec![record("alu/add", Classification::Equivalent)],
            Vec::new(),
            Duration::ZERO,
        );
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["outcomes"]["alu/add"], "equivalent");
        assert_eq!(value["schema_version"], REPORT_SCHEMA_VERSION);
        assert_eq!(value["summary"]["equivalent"], 1);
        assert!(value.get("load_errors").is_none());

        let dir = tempfile::tempdir().unwrap();
        let written = report.write(&dir.path().join("out")).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.is_file()));
    }
}
