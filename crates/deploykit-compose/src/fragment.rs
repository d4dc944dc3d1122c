//! Fragments: a single profile's contribution to a composed manifest.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How a fragment's content combines with existing manifest state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Recursive merge: object keys merge, arrays concatenate, scalars
    /// take the later value.
    Deep,
    /// Top-level key replacement.
    Shallow,
    /// Replace the merge target wholesale.
    Override,
    /// Add as a new entry (containers, volumes).
    Append,
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deep" => Ok(Self::Deep),
            "shallow" => Ok(Self::Shallow),
            "override" => Ok(Self::Override),
            "append" => Ok(Self::Append),
            other => Err(format!("unknown merge strategy '{other}'")),
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deep => "deep",
            Self::Shallow => "shallow",
            Self::Override => "override",
            Self::Append => "append",
        };
        f.write_str(s)
    }
}

/// What part of the manifest a fragment targets.
///
/// `Other` carries the profile's kind tag (e.g. `resource`, `probe`,
/// `lifecycle`) which routes deep-merge fragments to their target inside
/// the pod spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Container,
    Volume,
    Scheduling,
    #[serde(untagged)]
    Other(String),
}

impl ProfileKind {
    /// Group index used to process fragments by type: containers first,
    /// then volumes, then scheduling, then everything else.
    pub fn group(&self) -> usize {
        match self {
            Self::Container => 0,
            Self::Volume => 1,
            Self::Scheduling => 2,
            Self::Other(_) => 3,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Container => "container",
            Self::Volume => "volume",
            Self::Scheduling => "scheduling",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One profile's contribution to a composition batch.
///
/// Fragments are created fresh on every composition call and never
/// persisted. `dependencies` reference other fragment ids that must be
/// present in the same batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub profile_id: String,
    pub profile_name: String,
    pub kind: ProfileKind,
    /// Manifest sub-tree contributed by this profile.
    pub content: Value,
    pub strategy: MergeStrategy,
    /// Secondary sort key: higher merges earlier within the same
    /// composition order.
    pub priority: i32,
    /// Primary sort key, ascending.
    pub composition_order: i32,
    pub dependencies: BTreeSet<String>,
    pub enabled: bool,
}

impl Fragment {
    pub fn new(
        profile_id: impl Into<String>,
        profile_name: impl Into<String>,
        kind: ProfileKind,
        content: Value,
        strategy: MergeStrategy,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            profile_name: profile_name.into(),
            kind,
            content,
            strategy,
            priority: 0,
            composition_order: 0,
            dependencies: BTreeSet::new(),
            enabled: true,
        }
    }

    pub fn with_order(mut self, composition_order: i32, priority: i32) -> Self {
        self.composition_order = composition_order;
        self.priority = priority;
        self
    }

    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
