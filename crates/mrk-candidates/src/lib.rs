use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Fixed-width UTC stamp embedded in metrics record file names,
/// e.g. `candidate_hgb_20240102T000000Z.json`.
///
/// "Most recent record" is defined by parsing this stamp, never by raw
/// string sort order or file modification time. File names whose suffix does
/// not parse as this format are not valid records and are skipped.
pub const STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One named model's evaluation result, loaded from its newest metrics record.
///
/// Immutable once constructed. `metrics` is the canonical normalized shape:
/// records may store numeric metrics either nested under a `"metrics"` key or
/// flat at the top level, and both normalize here. Non-numeric values are
/// dropped during normalization, so a later lookup of a metric that was
/// present but unparseable behaves exactly like a missing metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub metrics: BTreeMap<String, f64>,
    /// Declared artifact reference. `None` (or empty in the record) is legal
    /// at load time; it only fails if this candidate wins promotion.
    pub artifact: Option<String>,
    /// The metrics record file this candidate was loaded from.
    pub source_path: PathBuf,
}

/// Candidates for one promotion run, in the order their names were requested.
/// That order is the tie-break order during selection.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    /// Build a set directly, preserving the given order. Selection treats
    /// this order as tie-break priority.
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum CandidatesError {
    /// No metrics records exist for any requested candidate name.
    NoCandidatesFound {
        metrics_dir: PathBuf,
        names: Vec<String>,
    },
    /// The metrics directory could not be scanned.
    Scan { dir: PathBuf, source: io::Error },
    /// A selected record could not be read.
    Read { path: PathBuf, source: io::Error },
    /// A selected record is not valid JSON.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for CandidatesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidatesError::NoCandidatesFound { metrics_dir, names } => write!(
                f,
                "no metrics records found under {} for any of {:?}",
                metrics_dir.display(),
                names
            ),
            CandidatesError::Scan { dir, source } => {
                write!(f, "failed to scan metrics dir {}: {source}", dir.display())
            }
            CandidatesError::Read { path, source } => {
                write!(f, "failed to read metrics record {}: {source}", path.display())
            }
            CandidatesError::Parse { path, source } => {
                write!(f, "invalid JSON in metrics record {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for CandidatesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CandidatesError::NoCandidatesFound { .. } => None,
            CandidatesError::Scan { source, .. } => Some(source),
            CandidatesError::Read { source, .. } => Some(source),
            CandidatesError::Parse { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load the newest metrics record for each requested name.
///
/// A name with no valid records is simply absent from the result; only a
/// fully empty result is an error. A record that exists but cannot be read
/// or parsed is fatal: promotion is a high-stakes operation and silently
/// skipping a corrupt newest record could promote stale data.
pub fn load_candidates(
    metrics_dir: &Path,
    names: &[String],
) -> Result<CandidateSet, CandidatesError> {
    let mut candidates = Vec::new();

    for name in names {
        if let Some(path) = latest_record(metrics_dir, name)? {
            candidates.push(read_candidate(name, &path)?);
        }
    }

    if candidates.is_empty() {
        return Err(CandidatesError::NoCandidatesFound {
            metrics_dir: metrics_dir.to_path_buf(),
            names: names.to_vec(),
        });
    }

    Ok(CandidateSet { candidates })
}

/// Newest `{name}_{STAMP}.json` under `dir`, or None.
///
/// Ties on equal stamps (two records in the same second) resolve to the
/// lexicographically greatest file name so the choice is independent of
/// directory iteration order.
fn latest_record(dir: &Path, name: &str) -> Result<Option<PathBuf>, CandidatesError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CandidatesError::Scan {
                dir: dir.to_path_buf(),
                source: e,
            })
        }
    };

    let prefix = format!("{name}_");
    let mut newest: Option<(NaiveDateTime, String, PathBuf)> = None;

    for entry in entries {
        let entry = entry.map_err(|e| CandidatesError::Scan {
            dir: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = file_name.strip_suffix(".json") else {
            continue;
        };
        let Some(stamp_str) = stem.strip_prefix(&prefix) else {
            continue;
        };
        let Ok(stamp) = NaiveDateTime::parse_from_str(stamp_str, STAMP_FORMAT) else {
            continue;
        };

        let replace = match &newest {
            None => true,
            Some((best_stamp, best_name, _)) => {
                (stamp, file_name) > (*best_stamp, best_name.as_str())
            }
        };
        if replace {
            newest = Some((stamp, file_name.to_string(), path));
        }
    }

    Ok(newest.map(|(_, _, path)| path))
}

fn read_candidate(name: &str, path: &Path) -> Result<Candidate, CandidatesError> {
    let raw = fs::read_to_string(path).map_err(|e| CandidatesError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let record: Value = serde_json::from_str(&raw).map_err(|e| CandidatesError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    let artifact = record
        .get("artifact")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(Candidate {
        name: name.to_string(),
        metrics: normalize_metrics(&record),
        artifact,
        source_path: path.to_path_buf(),
    })
}

/// Normalize the two supported record shapes into one metric map.
///
/// When a nested `"metrics"` object is present it takes precedence and the
/// top level is not consulted; otherwise every numeric-convertible top-level
/// value is a metric. Values that cannot convert are dropped.
fn normalize_metrics(record: &Value) -> BTreeMap<String, f64> {
    let source = match record.get("metrics") {
        Some(Value::Object(nested)) => nested,
        _ => match record.as_object() {
            Some(top) => top,
            None => return BTreeMap::new(),
        },
    };

    source
        .iter()
        .filter_map(|(k, v)| numeric(v).map(|n| (k.clone(), n)))
        .collect()
}

/// Numeric conversion matching the permissive record format: JSON numbers,
/// plus strings that parse as floats (some producers stringify scores).
fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
