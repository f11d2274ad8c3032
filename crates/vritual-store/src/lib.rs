//! Vritual Store — the single persistent memory document and its satellites
//!
//! - `store`: single-writer arbiter owning the `MemoryDocument`
//! - `rolling`: bounded last-N JSON logs, one file per monitor
//! - `guard`: validation, snapshots, and drift detection (never repairs)

pub mod guard;
pub mod rolling;
pub mod store;

pub use guard::MemoryGuard;
pub use rolling::RollingLog;
pub use store::{load_document, write_atomic, StateStore, StoreConfig};
