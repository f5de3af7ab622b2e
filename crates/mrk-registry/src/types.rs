use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::promote::PromoteStep;
use mrk_artifacts::ArtifactError;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// One immutable promotion record. Field names are the registry file's wire
/// format; existing entries are never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Candidate name that won this promotion.
    pub name: String,
    /// Registry-local file name of the promoted artifact copy.
    pub artifact: String,
    /// Registry-local file name of the metrics snapshot copy.
    pub metrics_file: String,
    pub primary_metric: String,
    pub primary_score: f64,
    pub promoted_at_utc: DateTime<Utc>,
}

/// Persisted registry state.
///
/// `models` is ordered by promotion time (append order is semantically
/// meaningful: "most recent production" is the last entry, not max-by-score).
/// Whenever `models` is non-empty, `production` equals the last entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryState {
    pub models: Vec<RegistryEntry>,
    pub production: Option<RegistryEntry>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum RegistryError {
    /// The winning candidate's record never declared an artifact reference.
    MissingArtifactReference { candidate: String },
    /// The winner's resolved artifact does not exist in the models directory.
    ArtifactMissing { path: PathBuf },
    /// The registry state file exists but does not parse. Never overwritten;
    /// operator intervention is required.
    Corrupt { path: PathBuf, reason: String },
    /// The exclusive registry lock could not be acquired within the wait
    /// bound. Another promotion run may be in flight, or a crashed run left
    /// the lock file behind.
    Locked { path: PathBuf, waited: Duration },
    /// Injected failure from [`crate::PromoteOptions::fail_after`]
    /// (crash-consistency tests only).
    Injected { step: PromoteStep },
    Io {
        step: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// The promotion landed but its audit event could not be appended. The
    /// state file is the source of truth; the audit log needs reconciling.
    Audit { source: anyhow::Error },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::MissingArtifactReference { candidate } => {
                write!(f, "metrics record for '{candidate}' is missing the 'artifact' field")
            }
            RegistryError::ArtifactMissing { path } => {
                write!(f, "model artifact missing: {}", path.display())
            }
            RegistryError::Corrupt { path, reason } => {
                write!(f, "registry state {} is corrupt: {reason}", path.display())
            }
            RegistryError::Locked { path, waited } => write!(
                f,
                "registry lock {} held by another run (gave up after {:?})",
                path.display(),
                waited
            ),
            RegistryError::Injected { step } => {
                write!(f, "injected failure after step {step:?}")
            }
            RegistryError::Io { step, path, source } => {
                write!(f, "{step} failed for {}: {source}", path.display())
            }
            RegistryError::Audit { source } => {
                write!(f, "promotion committed but audit append failed: {source}")
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Io { source, .. } => Some(source),
            RegistryError::Audit { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<ArtifactError> for RegistryError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::Missing { path } => RegistryError::ArtifactMissing { path },
            ArtifactError::Io { step, path, source } => RegistryError::Io { step, path, source },
        }
    }
}
