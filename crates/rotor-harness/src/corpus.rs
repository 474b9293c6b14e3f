//! Benchmark corpus discovery and case descriptors.
//!
//! A case is any directory below the corpus root holding a `case.toml`:
//!
//! ```toml
//! source = "main.c"
//! reference = "reference.bvp"
//! cflags = ["-O2"]
//! tags = ["alu"]
//! notes = "free text"
//! [timeouts]
//! build_secs = 30
//! run_secs = 60
//! solver_secs = 120
//! ```

use std::path::{Path, PathBuf};

use rotor_ir::BehaviorProgram;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{HarnessFault, MalformedCaseError};
use crate::fingerprint::sha256_file;

pub const DESCRIPTOR_FILE: &str = "case.toml";

/// Per-case timeout overrides in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutOverrides {
    pub build_secs: Option<u64>,
    pub run_secs: Option<u64>,
    pub solver_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CaseDescriptor {
    source: String,
    reference: String,
    #[serde(default)]
    cflags: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    timeouts: TimeoutOverrides,
}

/// One benchmark: a source program plus the behavior it must have.
#[derive(Debug, Clone)]
pub struct BenchmarkCase {
    /// Case directory relative to the corpus root, `/`-separated.
    pub id: String,
    pub dir: PathBuf,
    pub source: PathBuf,
    pub reference_path: PathBuf,
    pub reference: BehaviorProgram,
    pub cflags: Vec<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub timeouts: TimeoutOverrides,
    pub source_sha256: String,
}

impl BenchmarkCase {
    /// The source file name without extension, used to name build outputs.
    pub fn stem(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "case".to_string())
    }
}

/// The cases found below a corpus root, in id order.
#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    entries: Vec<(String, PathBuf)>,
}

fn case_id(root: &Path, dir: &Path) -> String {
    let parts: Vec<String> = dir
        .strip_prefix(root)
        .unwrap_or(dir)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

impl Corpus {
    /// Discover every case directory below `root`.
    pub fn open(root: &Path) -> Result<Self, HarnessFault> {
        let fault = |source: std::io::Error| HarnessFault::CorpusRoot {
            path: root.display().to_string(),
            source,
        };
        let meta = std::fs::metadata(root).map_err(fault)?;
        if !meta.is_dir() {
            return Err(fault(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }
        std::fs::read_dir(root).map_err(fault)?;

        let mut entries = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable corpus entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && entry.file_name() == DESCRIPTOR_FILE {
                if let Some(dir) = entry.path().parent() {
                    entries.push((case_id(root, dir), dir.to_path_buf()));
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(root = %root.display(), cases = entries.len(), "corpus discovered");
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// Lazily load and validate each case in id order.
    pub fn cases(&self) -> impl Iterator<Item = Result<BenchmarkCase, MalformedCaseError>> + '_ {
        self.entries.iter().map(|(id, dir)| load_case(id, dir))
    }

    /// Every valid case plus the errors for the malformed ones.
    pub fn load_all(&self) -> (Vec<BenchmarkCase>, Vec<MalformedCaseError>) {
        let mut cases = Vec::new();
        let mut errors = Vec::new();
        for result in self.cases() {
            match result {
                Ok(case) => cases.push(case),
                Err(err) => {
                    warn!(case = %err.case_id, reason = %err.reason, "malformed case");
                    errors.push(err);
                }
            }
        }
        (cases, errors)
    }
}

/// Load the case in `dir` under `id`.
pub fn load_case(id: &str, dir: &Path) -> Result<BenchmarkCase, MalformedCaseError> {
    let malformed = |reason: String| MalformedCaseError {
        case_id: id.to_string(),
        reason,
    };
    let descriptor_path = dir.join(DESCRIPTOR_FILE);
    let raw = std::fs::read_to_string(&descriptor_path)
        .map_err(|e| malformed(format!("cannot read {DESCRIPTOR_FILE}: {e}")))?;
    let descriptor: CaseDescriptor =
        toml::from_str(&raw).map_err(|e| malformed(format!("invalid {DESCRIPTOR_FILE}: {}", e.message())))?;

    for (field, value) in [
        ("timeouts.build_secs", descriptor.timeouts.build_secs),
        ("timeouts.run_secs", descriptor.timeouts.run_secs),
        ("timeouts.solver_secs", descriptor.timeouts.solver_secs),
    ] {
        if value == Some(0) {
            return Err(malformed(format!("{field} must be greater than zero")));
        }
    }

    let source = dir.join(&descriptor.source);
    let source_sha256 = sha256_file(&source)
        .map_err(|e| malformed(format!("cannot read source {}: {e}", descriptor.source)))?;

    let reference_path = dir.join(&descriptor.reference);
    let reference = rotor_ir::load_file(&reference_path)
        .map_err(|e| malformed(format!("reference {}: {e}", descriptor.reference)))?;

    Ok(BenchmarkCase {
        id: id.to_string(),
        dir: dir.to_path_buf(),
        source,
        reference_path,
        reference,
        cflags: descriptor.cflags,
        tags: descriptor.tags,
        notes: descriptor.notes,
        timeouts: descriptor.timeouts,
        source_sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const REFERENCE: &str = "program inc\ninput x : bv8\noutput r : bv8 = (bvadd x #x01)\n";

    fn write_case(root: &Path, rel: &str, descriptor: &str) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("main.c"), "int main(void) { return 0; }\n").unwrap();
        fs::write(dir.join("reference.bvp"), REFERENCE).unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), descriptor).unwrap();
        dir
    }

    const MINIMAL: &str = "source = \"main.c\"\nreference = \"reference.bvp\"\n";

    #[test]
    fn discovers_nested_cases_in_id_order() {
        let root = tempfile::tempdir().unwrap();
        write_case(root.path(), "b/two", MINIMAL);
        write_case(root.path(), "a", MINIMAL);
        write_case(root.path(), "b/one", MINIMAL);
        fs::create_dir_all(root.path().join("not-a-case")).unwrap();

        let corpus = Corpus::open(root.path()).unwrap();
        assert_eq!(corpus.ids().collect::<Vec<_>>(), vec!["a", "b/one", "b/two"]);
        let (cases, errors) = corpus.load_all();
        assert!(errors.is_empty());
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].reference.name, "inc");
        assert_eq!(cases[0].source_sha256.len(), 64);
        assert_eq!(cases[0].stem(), "main");
    }

    #[test]
    fn descriptor_fields_and_overrides_are_read() {
        let root = tempfile::tempdir().unwrap();
        write_case(
            root.path(),
            "alu",
            "source = \"main.c\"\nreference = \"reference.bvp\"\ncflags = [\"-O2\"]\ntags = [\"alu\"]\nnotes = \"inc\"\n[timeouts]\nrun_secs = 5\n",
        );
        let corpus = Corpus::open(root.path()).unwrap();
        let case = corpus.cases().next().unwrap().unwrap();
        assert_eq!(case.cflags, vec!["-O2".to_string()]);
        assert_eq!(case.tags, vec!["alu".to_string()]);
        assert_eq!(case.notes.as_deref(), Some("inc"));
        assert_eq!(case.timeouts.run_secs, Some(5));
        assert_eq!(case.timeouts.build_secs, None);
    }

    #[test]
    fn malformed_cases_are_reported_and_loading_continues() {
        let root = tempfile::tempdir().unwrap();
        write_case(root.path(), "good", MINIMAL);
        write_case(root.path(), "unknown-field", "source = \"main.c\"\nreference = \"reference.bvp\"\nflavor = 1\n");
        write_case(root.path(), "missing-source", "source = \"nope.c\"\nreference = \"reference.bvp\"\n");
        write_case(root.path(), "zero-timeout", "source = \"main.c\"\nreference = \"reference.bvp\"\n[timeouts]\nbuild_secs = 0\n");
        let bad_ref = write_case(root.path(), "bad-reference", MINIMAL);
        fs::write(bad_ref.join("reference.bvp"), "program p\noutput r : bv8 = y\n").unwrap();

        let (cases, errors) = Corpus::open(root.path()).unwrap().load_all();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "good");
        let ids: Vec<&str> = errors.iter().map(|e| e.case_id.as_str()).collect();
        assert_eq!(ids, vec!["bad-reference", "missing-source", "unknown-field", "zero-timeout"]);
        assert!(errors[0].reason.contains("Unknown name"));
        assert!(errors[3].reason.contains("build_secs"));
    }

    #[test]
    fn missing_root_is_a_fault() {
        let root = tempfile::tempdir().unwrap();
        let err = Corpus::open(&root.path().join("absent")).unwrap_err();
        assert!(matches!(err, HarnessFault::CorpusRoot { .. }));
    }

    #[test]
    fn descriptor_at_the_root_gets_the_dot_id() {
        let root = tempfile::tempdir().unwrap();
        write_case(root.path(), "", MINIMAL);
        let corpus = Corpus::open(root.path()).unwrap();
        assert_eq!(corpus.ids().collect::<Vec<_>>(), vec!["."]);
    }
}
