//! Durable promotion registry: an append-only history of promotion decisions
//! plus the single "current production" pointer, with the lock-and-atomic-
//! rewrite discipline concentrated in [`RegistryStore`].

mod lock;
mod promote;
mod store;
mod types;

pub use lock::RegistryLock;
pub use promote::{
    promote, promote_with_options, Promotion, PromoteOptions, PromoteStep, PROMOTION_STAMP_FORMAT,
};
pub use store::{RegistryStore, REGISTRY_LOCK_FILE, REGISTRY_STATE_FILE};
pub use types::{RegistryEntry, RegistryError, RegistryState};
