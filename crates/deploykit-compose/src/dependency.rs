//! Fragment dependency validation.
//!
//! A pure pass over a composition batch: every declared dependency must
//! reference a fragment present in the same batch, and the dependency
//! graph must be acyclic. Errors are returned as strings for the composer
//! to collect; nothing here mutates fragments or panics.

use crate::fragment::Fragment;
use std::collections::{HashMap, HashSet};

/// Validates fragment dependency sets and rejects cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Validate `fragments`, returning every dependency error found. An
    /// empty list means the batch is valid.
    pub fn validate(&self, fragments: &[Fragment]) -> Vec<String> {
        let mut errors = Vec::new();

        let present: HashSet<&str> =
            fragments.iter().map(|f| f.profile_id.as_str()).collect();

        for fragment in fragments {
            for dep in &fragment.dependencies {
                if !present.contains(dep.as_str()) {
                    errors.push(format!(
                        "{} depends on missing profile {}",
                        fragment.profile_name, dep
                    ));
                }
            }
        }

        let graph: HashMap<&str, Vec<&str>> = fragments
            .iter()
            .map(|f| {
                (
                    f.profile_id.as_str(),
                    f.dependencies.iter().map(String::as_str).collect(),
                )
            })
            .collect();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: HashSet<&str> = HashSet::new();
        for id in graph.keys() {
            if !visited.contains(id) {
                Self::visit(id, &graph, &mut visited, &mut stack, &mut errors);
            }
        }

        errors
    }

    fn visit<'a>(
        node: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
        errors: &mut Vec<String>,
    ) {
        visited.insert(node);
        stack.insert(node);

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                if stack.contains(dep) {
                    errors.push(format!("circular dependency detected at profile {dep}"));
                } else if !visited.contains(dep) && graph.contains_key(dep) {
                    Self::visit(dep, graph, visited, stack, errors);
                }
            }
        }

        stack.remove(node);
    }
}
