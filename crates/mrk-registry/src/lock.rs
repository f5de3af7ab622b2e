use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::store::REGISTRY_LOCK_FILE;
use crate::types::RegistryError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive advisory lock over the registry's read-modify-write cycle.
///
/// Backed by `create_new` on a lock file in the registry directory, which is
/// atomic on the backing filesystem: exactly one run can create it. Held for
/// the duration of a promotion's durable mutations and released on drop.
///
/// Acquisition polls up to `max_wait` and then fails with
/// [`RegistryError::Locked`] instead of hanging, so a stuck or crashed holder
/// surfaces to the operator (the lock file records the holder's pid).
pub struct RegistryLock {
    path: PathBuf,
}

impl RegistryLock {
    pub fn acquire(registry_root: &Path, max_wait: Duration) -> Result<Self, RegistryError> {
        fs::create_dir_all(registry_root).map_err(|e| RegistryError::Io {
            step: "create_registry_dir",
            path: registry_root.to_path_buf(),
            source: e,
        })?;

        let path = registry_root.join(REGISTRY_LOCK_FILE);
        let start = Instant::now();

        loop {
            match OpenOptions::new().create_new(true).write(true).open(&path) {
                Ok(mut f) => {
                    let _ = write!(f, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if start.elapsed() >= max_wait {
                        return Err(RegistryError::Locked {
                            path,
                            waited: start.elapsed(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(RegistryError::Io {
                        step: "create_lock",
                        path,
                        source: e,
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
