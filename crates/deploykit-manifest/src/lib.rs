//! Shared manifest vocabulary for DeployKit.
//!
//! Everything in this crate is pure data manipulation over
//! [`serde_json::Value`] manifest trees: nested path access, the merge
//! primitives used by the composition engine, the two-way diff used by the
//! reconciliation engine, and the [`ResourceIdentity`] key that locates a
//! live object in a cluster. No I/O happens here.

pub mod canonical;
pub mod diff;
pub mod error;
pub mod identity;
pub mod merge;
pub mod path;

pub use canonical::canonical_json;
pub use diff::diff_for_apply;
pub use error::{ManifestError, ManifestResult};
pub use identity::ResourceIdentity;
pub use merge::{deep_merge, shallow_merge};
pub use path::{ensure_array_mut, ensure_object_mut, get_path, get_path_mut};
