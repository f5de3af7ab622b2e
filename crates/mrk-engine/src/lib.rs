//! Promotion engine: the single public entry point that sequences candidate
//! loading, selection, and the registry promote transition. No business logic
//! of its own: every sub-component failure propagates as its own named
//! [`PromoteError`] kind so calling tooling can tell "no candidates" from
//! "artifact missing" from "lock contention".

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use mrk_candidates::CandidatesError;
use mrk_config::Config;
use mrk_registry::{PromoteOptions, PromoteStep, Promotion, RegistryError};
use mrk_selector::SelectError;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything one promotion run needs.
#[derive(Debug, Clone)]
pub struct PromotionRequest {
    /// Candidate names to consider, in tie-break priority order.
    pub candidate_names: Vec<String>,
    pub primary_metric: String,
    pub models_dir: PathBuf,
    pub metrics_dir: PathBuf,
    pub registry_dir: PathBuf,
    /// File name of the production alias inside `models_dir`.
    pub alias_name: String,
    pub lock_wait: Duration,
}

impl PromotionRequest {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            candidate_names: cfg.evaluation.candidates.clone(),
            primary_metric: cfg.evaluation.primary_metric.clone(),
            models_dir: cfg.paths.models.clone(),
            metrics_dir: cfg.paths.metrics.clone(),
            registry_dir: cfg.paths.registry_dir(),
            alias_name: cfg.paths.production_alias.clone(),
            lock_wait: Duration::from_millis(cfg.registry.lock_wait_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum PromoteError {
    /// No metrics records exist for any requested candidate name.
    NoCandidatesFound {
        metrics_dir: PathBuf,
        names: Vec<String>,
    },
    /// Selection was handed zero candidates (defense-in-depth).
    EmptyCandidateSet,
    /// The winning candidate's record lacks an artifact reference.
    MissingArtifactReference { candidate: String },
    /// The winner's artifact does not exist in the models directory.
    ArtifactMissing { path: PathBuf },
    /// The registry state file is present but unparseable.
    RegistryCorrupt { path: PathBuf, reason: String },
    /// The registry lock was not acquired within the wait bound.
    RegistryLocked { path: PathBuf, waited: Duration },
    /// A metrics record could not be read or parsed.
    Metrics { path: PathBuf, reason: String },
    Io {
        step: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// Promotion committed but the audit append failed.
    Audit { source: anyhow::Error },
    /// Injected failure (crash-consistency tests only).
    Injected { step: PromoteStep },
}

impl fmt::Display for PromoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromoteError::NoCandidatesFound { metrics_dir, names } => write!(
                f,
                "no metrics records found under {} for any of {:?}",
                metrics_dir.display(),
                names
            ),
            PromoteError::EmptyCandidateSet => write!(f, "candidate set is empty"),
            PromoteError::MissingArtifactReference { candidate } => {
                write!(f, "metrics record for '{candidate}' is missing the 'artifact' field")
            }
            PromoteError::ArtifactMissing { path } => {
                write!(f, "model artifact missing: {}", path.display())
            }
            PromoteError::RegistryCorrupt { path, reason } => {
                write!(f, "registry state {} is corrupt: {reason}", path.display())
            }
            PromoteError::RegistryLocked { path, waited } => write!(
                f,
                "registry lock {} held by another run (gave up after {:?})",
                path.display(),
                waited
            ),
            PromoteError::Metrics { path, reason } => {
                write!(f, "metrics record {} unusable: {reason}", path.display())
            }
            PromoteError::Io { step, path, source } => {
                write!(f, "{step} failed for {}: {source}", path.display())
            }
            PromoteError::Audit { source } => {
                write!(f, "promotion committed but audit append failed: {source}")
            }
            PromoteError::Injected { step } => write!(f, "injected failure after step {step:?}"),
        }
    }
}

impl std::error::Error for PromoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PromoteError::Io { source, .. } => Some(source),
            PromoteError::Audit { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<CandidatesError> for PromoteError {
    fn from(e: CandidatesError) -> Self {
        match e {
            CandidatesError::NoCandidatesFound { metrics_dir, names } => {
                PromoteError::NoCandidatesFound { metrics_dir, names }
            }
            CandidatesError::Scan { dir, source } => PromoteError::Io {
                step: "scan_metrics_dir",
                path: dir,
                source,
            },
            CandidatesError::Read { path, source } => PromoteError::Metrics {
                path,
                reason: source.to_string(),
            },
            CandidatesError::Parse { path, source } => PromoteError::Metrics {
                path,
                reason: source.to_string(),
            },
        }
    }
}

impl From<SelectError> for PromoteError {
    fn from(e: SelectError) -> Self {
        match e {
            SelectError::EmptyCandidateSet => PromoteError::EmptyCandidateSet,
        }
    }
}

impl From<RegistryError> for PromoteError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::MissingArtifactReference { candidate } => {
                PromoteError::MissingArtifactReference { candidate }
            }
            RegistryError::ArtifactMissing { path } => PromoteError::ArtifactMissing { path },
            RegistryError::Corrupt { path, reason } => {
                PromoteError::RegistryCorrupt { path, reason }
            }
            RegistryError::Locked { path, waited } => {
                PromoteError::RegistryLocked { path, waited }
            }
            RegistryError::Injected { step } => PromoteError::Injected { step },
            RegistryError::Io { step, path, source } => PromoteError::Io { step, path, source },
            RegistryError::Audit { source } => PromoteError::Audit { source },
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one promotion: load the newest record per candidate, select the winner
/// by the primary metric, and promote it. Returns the completed promotion
/// (alias path, promotion id, appended entry).
pub fn run(req: &PromotionRequest) -> Result<Promotion, PromoteError> {
    let set = mrk_candidates::load_candidates(&req.metrics_dir, &req.candidate_names)?;
    let selection = mrk_selector::select(&set, &req.primary_metric)?;

    let opts = PromoteOptions {
        lock_wait: req.lock_wait,
        fail_after: None,
    };
    let promotion = mrk_registry::promote_with_options(
        &selection,
        &req.primary_metric,
        &req.models_dir,
        &req.registry_dir,
        &req.alias_name,
        &opts,
    )?;

    Ok(promotion)
}
