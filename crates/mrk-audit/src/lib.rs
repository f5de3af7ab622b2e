use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the promotion audit log inside the registry directory.
pub const AUDIT_LOG_FILE: &str = "audit.jsonl";

/// One promotion decision, as an append-only JSON line.
///
/// Events form a SHA-256 hash chain: `hash_prev` is the previous event's
/// `hash_self`, and `hash_self` covers the event's canonical JSON with
/// `hash_self` cleared. Editing, dropping, or reordering any line breaks
/// verification at that line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only audit writer. JSON Lines, one event per line, always chained.
pub struct AuditLog {
    path: PathBuf,
    last_hash: Option<String>,
    seq: u64,
}

impl AuditLog {
    /// Open the log, creating parent directories if needed. When the log
    /// already exists, chain state (last hash + next sequence number) is
    /// restored from its final line so appends continue the chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create_dir_all {}", parent.display()))?;
        }

        let mut last_hash = None;
        let mut seq = 0u64;
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("read audit log {}", path.display()))?;
            for (i, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let ev: AuditEvent = serde_json::from_str(trimmed)
                    .with_context(|| format!("parse audit event at line {}", i + 1))?;
                last_hash = ev.hash_self;
                seq += 1;
            }
        }

        Ok(Self {
            path,
            last_hash,
            seq,
        })
    }

    /// Append one event and advance the chain.
    pub fn append(&mut self, event_type: &str, payload: Value) -> Result<AuditEvent> {
        let mut ev = AuditEvent {
            seq: self.seq,
            ts_utc: Utc::now(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: self.last_hash.clone(),
            hash_self: None,
        };

        let self_hash = compute_event_hash(&ev)?;
        ev.hash_self = Some(self_hash.clone());

        let line = serde_json::to_string(&ev).context("serialize audit event failed")?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {}", self.path.display()))?;
        f.write_all(line.as_bytes())
            .context("write audit line failed")?;
        f.write_all(b"\n").context("write newline failed")?;
        f.sync_all().context("fsync audit log failed")?;

        self.last_hash = Some(self_hash);
        self.seq += 1;

        Ok(ev)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }
}

/// Chain hash of an event: SHA-256 over its canonical JSON with `hash_self`
/// cleared (to avoid self-reference). Canonical means compact JSON with
/// stable field order: struct fields serialize in declaration order and
/// serde_json map keys are sorted.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;
    let canonical = serde_json::to_string(&clone).context("serialize audit event failed")?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { events: usize },
    Broken { line: usize, reason: String },
}

/// Verify the integrity of an audit log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {}", path.as_ref().display()))?;
    verify_hash_chain_str(&content)
}

/// Verify the integrity of audit log content. Checks, per event: the
/// sequence number is dense from zero, `hash_prev` matches the previous
/// event's `hash_self`, and `hash_self` recomputes from the event content.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: AuditEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit event at line {}", i + 1))?;

        if ev.seq != count as u64 {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!("seq mismatch: expected {}, got {}", count, ev.seq),
            });
        }

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        match &ev.hash_self {
            Some(claimed) => {
                let recomputed = compute_event_hash(&ev)?;
                if *claimed != recomputed {
                    return Ok(VerifyResult::Broken {
                        line: i + 1,
                        reason: format!(
                            "hash_self mismatch: claimed {claimed}, recomputed {recomputed}"
                        ),
                    });
                }
            }
            None => {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: "event has no hash_self".to_string(),
                });
            }
        }

        prev_hash = ev.hash_self.clone();
        count += 1;
    }

    Ok(VerifyResult::Valid { events: count })
}
