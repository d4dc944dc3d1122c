//! Declarative Reconciliation Engine.
//!
//! Given a desired manifest, decides whether to create or patch the live
//! object, emulating `kubectl apply` semantics: the previously-applied
//! manifest is stored as an annotation on the live object and diffed
//! against the new desired state so that removed fields are explicitly
//! nulled out.
//!
//! - [`ClusterClient`] is the raw HTTP transport to the API server.
//! - [`ResourceTypeResolver`] maps bare resource names to their best
//!   (group, version, kind), with a static fallback table.
//! - [`ReconciliationEngine`] performs the create-or-patch decision.
//! - [`PatchOperationRegistry`] is a fixed catalog of named, kind-scoped
//!   partial mutations that bypass baseline diffing entirely.
//!
//! This crate performs blocking-free async network I/O and nothing else;
//! composition is a separate, pure crate. Failed cluster writes are not
//! retried here, and concurrent writers against the same resource
//! identity are not serialized; both are the caller's responsibility.

pub mod apply;
pub mod client;
pub mod config;
pub mod error;
pub mod ops;
pub mod resolver;

pub use apply::{AppliedAction, ReconciliationEngine, with_baseline_annotation};
pub use client::{ApiResource, ClusterApi, ClusterClient};
pub use config::ClusterConfig;
pub use error::{ReconcileError, ReconcileResult};
pub use ops::{Mutator, OperationSpec, PatchOperationRegistry};
pub use resolver::{ResolvedType, ResourceTypeResolver};

/// Annotation key carrying the last-applied baseline, compatible with
/// `kubectl apply`.
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";
