//! Read-side normalization of legacy data.
//!
//! Plug-in bundles written for earlier platform generations carry role, user
//! and plug-in dicts in an older shape. `NormalizingStore` wraps a backing
//! store and upgrades those dicts on every load, so the rest of the system
//! only ever sees the current shape. Writes pass through unchanged.
//!
//! The transforms are idempotent: normalizing an already-normalized dict is
//! an identity operation.

mod normalize;

pub use normalize::NormalizingStore;
