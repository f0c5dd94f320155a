//! NRPTI sync workspace facade.
//!
//! Re-exports the pipeline crates so hosts (and the `nrpti-sync` binary) can
//! depend on a single crate.

pub use bridge_desktop as desktop;
pub use bridge_traits as bridge;
pub use core_records as records;
pub use core_runtime as runtime;
pub use core_sync as sync;
pub use provider_bcmi as bcmi;
