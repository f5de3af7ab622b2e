use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::{RegistryEntry, RegistryError, RegistryState};

pub const REGISTRY_STATE_FILE: &str = "model_registry.json";
pub const REGISTRY_LOCK_FILE: &str = "model_registry.lock";

/// The registry's persisted document store.
///
/// This is the only place allowed to read or rewrite the state file, so the
/// atomic-rewrite discipline lives here rather than being scattered across
/// callers. A different backing store (an embedded transactional database,
/// say) would replace this type without changing the promote contract.
pub struct RegistryStore {
    root: PathBuf,
}

impl RegistryStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(REGISTRY_STATE_FILE)
    }

    /// Load the persisted state. A registry that has never promoted is empty,
    /// not an error; a state file that exists but fails to parse is
    /// [`RegistryError::Corrupt`] and must never be repaired by overwriting.
    pub fn load(&self) -> Result<RegistryState, RegistryError> {
        let path = self.state_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(RegistryState::default())
            }
            Err(e) => {
                return Err(RegistryError::Io {
                    step: "read_state",
                    path,
                    source: e,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|e| RegistryError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    /// Append `entry` to the history and designate it production, rewriting
    /// the state file atomically. This is the registry's only mutation and it
    /// is all-or-nothing with respect to readers.
    ///
    /// Callers must hold the [`crate::RegistryLock`] so concurrent runs
    /// cannot interleave their read-modify-write cycles.
    pub fn append_and_set_production(
        &self,
        state: &mut RegistryState,
        entry: RegistryEntry,
    ) -> Result<(), RegistryError> {
        state.models.push(entry.clone());
        state.production = Some(entry);

        let json = serde_json::to_string_pretty(state).map_err(|e| RegistryError::Io {
            step: "serialize_state",
            path: self.state_path(),
            source: io::Error::other(e),
        })?;
        mrk_artifacts::write_atomic(json.as_bytes(), &self.root, REGISTRY_STATE_FILE)?;
        Ok(())
    }
}
