use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mrk_audit::{AuditLog, AUDIT_LOG_FILE};
use mrk_selector::Selection;

use crate::lock::RegistryLock;
use crate::store::RegistryStore;
use crate::types::{RegistryEntry, RegistryError};

/// Stamp embedded in promotion identifiers (`{candidate}_{stamp}`), matching
/// the metrics-record convention so registry copies sort chronologically.
pub const PROMOTION_STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Durable mutation points of one promotion, in execution order. Used by
/// [`PromoteOptions::fail_after`] to abort immediately after a given step in
/// crash-consistency tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteStep {
    ResolveArtifact,
    CopyArtifact,
    CopyMetrics,
    WriteAlias,
    WriteState,
}

#[derive(Debug, Clone, Copy)]
pub struct PromoteOptions {
    /// Bound on waiting for the registry lock.
    pub lock_wait: Duration,
    /// Test hook: fail right after the named step completes.
    pub fail_after: Option<PromoteStep>,
}

impl Default for PromoteOptions {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(5),
            fail_after: None,
        }
    }
}

/// A completed promotion.
#[derive(Debug, Clone)]
pub struct Promotion {
    /// Stable alias file external servers read for the current model.
    pub alias_path: PathBuf,
    /// Timestamp-qualified identifier of this promotion's registry copies.
    pub promotion_id: String,
    pub entry: RegistryEntry,
}

/// Promote the selection winner with default options.
pub fn promote(
    selection: &Selection,
    primary_metric: &str,
    models_root: &Path,
    registry_root: &Path,
    alias_name: &str,
) -> Result<Promotion, RegistryError> {
    promote_with_options(
        selection,
        primary_metric,
        models_root,
        registry_root,
        alias_name,
        &PromoteOptions::default(),
    )
}

/// Promote the selection winner: copy its artifact and metrics snapshot into
/// the registry, refresh the production alias, and commit the new history
/// entry, with each write landing atomically.
///
/// Failure at any point before the state commit leaves the persisted history
/// and `production` (and the pre-existing alias) unchanged; copies already
/// landed are orphans that nothing references. The registry lock is held
/// across all durable mutations so concurrent runs serialize and the alias
/// bytes can never diverge from the committed `production` entry.
pub fn promote_with_options(
    selection: &Selection,
    primary_metric: &str,
    models_root: &Path,
    registry_root: &Path,
    alias_name: &str,
    opts: &PromoteOptions,
) -> Result<Promotion, RegistryError> {
    let winner = &selection.winner;

    let reference =
        winner
            .artifact
            .as_deref()
            .ok_or_else(|| RegistryError::MissingArtifactReference {
                candidate: winner.name.clone(),
            })?;
    let src_artifact = mrk_artifacts::resolve(reference, models_root)?;
    maybe_fail(opts.fail_after, PromoteStep::ResolveArtifact)?;

    let store = RegistryStore::open(registry_root);
    let _lock = RegistryLock::acquire(registry_root, opts.lock_wait)?;

    // Validate existing state before landing anything, so a corrupt registry
    // aborts with zero orphan copies and is never rewritten.
    let mut state = store.load()?;

    let now = Utc::now();
    let promotion_id = format!("{}_{}", winner.name, now.format(PROMOTION_STAMP_FORMAT));
    let ext = Path::new(reference)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let reg_artifact_name = format!("{promotion_id}.{ext}");
    let reg_metrics_name = format!("{promotion_id}.json");

    let reg_artifact_path =
        mrk_artifacts::copy_atomic(&src_artifact, registry_root, &reg_artifact_name)?;
    maybe_fail(opts.fail_after, PromoteStep::CopyArtifact)?;

    mrk_artifacts::copy_atomic(&winner.source_path, registry_root, &reg_metrics_name)?;
    maybe_fail(opts.fail_after, PromoteStep::CopyMetrics)?;

    let alias_path = mrk_artifacts::copy_atomic(&reg_artifact_path, models_root, alias_name)?;
    maybe_fail(opts.fail_after, PromoteStep::WriteAlias)?;

    let entry = RegistryEntry {
        name: winner.name.clone(),
        artifact: reg_artifact_name,
        metrics_file: reg_metrics_name,
        primary_metric: primary_metric.to_string(),
        primary_score: selection.score,
        promoted_at_utc: now,
    };
    store.append_and_set_production(&mut state, entry.clone())?;
    maybe_fail(opts.fail_after, PromoteStep::WriteState)?;

    append_audit_event(registry_root, &entry)?;

    Ok(Promotion {
        alias_path,
        promotion_id,
        entry,
    })
}

fn append_audit_event(registry_root: &Path, entry: &RegistryEntry) -> Result<(), RegistryError> {
    let payload = serde_json::to_value(entry)
        .map_err(|e| RegistryError::Audit { source: e.into() })?;
    let mut log = AuditLog::open(registry_root.join(AUDIT_LOG_FILE))
        .map_err(|e| RegistryError::Audit { source: e })?;
    log.append("PROMOTE", payload)
        .map_err(|e| RegistryError::Audit { source: e })?;
    Ok(())
}

fn maybe_fail(fail_after: Option<PromoteStep>, step: PromoteStep) -> Result<(), RegistryError> {
    if fail_after == Some(step) {
        return Err(RegistryError::Injected { step });
    }
    Ok(())
}
