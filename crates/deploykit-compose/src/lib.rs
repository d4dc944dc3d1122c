//! Profile Composition Engine.
//!
//! Turns a library of independently-authored configuration profiles
//! (containers, volumes, scheduling rules, arbitrary pod-spec additions)
//! into one syntactically valid Kubernetes resource manifest.
//!
//! The pipeline, leaf-first:
//!
//! 1. [`FragmentCompiler`] renders one profile into a manifest sub-tree.
//! 2. [`DependencyResolver`] validates fragment dependency sets and
//!    rejects cycles.
//! 3. [`Composer`] orders fragments, applies per-type merge strategies and
//!    assembles/validates the final manifest.
//! 4. [`RuntimeComposer`] is the top-level entry point: it collects the
//!    enabled profile mappings of a deployment descriptor, always against
//!    the freshest profile data, and applies late runtime overrides.
//!
//! Composition is pure and stateless; failures are collected into
//! [`CompositionResult::errors`] rather than raised, so callers branch on
//! [`CompositionResult::success`].

pub mod composer;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod fragment;
pub mod profile;
pub mod result;
pub mod runtime;

pub use composer::Composer;
pub use dependency::DependencyResolver;
pub use descriptor::{DeploymentDescriptor, ProfileMapping, RuntimeOverrides};
pub use error::{ComposeError, ComposeResult};
pub use fragment::{Fragment, MergeStrategy, ProfileKind};
pub use profile::{
    ContainerProfile, FragmentCompiler, GenericProfile, SchedulingProfile, VolumeProfile,
};
pub use result::{CompositionMetadata, CompositionResult};
pub use runtime::{ProfileSource, ResolvedProfile, RuntimeComposer};
