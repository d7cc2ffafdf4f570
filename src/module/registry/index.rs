//! Namespace capability index
//!
//! Maps each namespace to the capabilities registered in it, in
//! registration order, for requirement matching.

use std::collections::HashMap;
use std::sync::Arc;

use crate::module::model::{Capability, Requirement, Revision, RevisionId};

#[derive(Debug, Clone)]
struct IndexedCapability {
    revision: Arc<Revision>,
    index: usize,
}

impl IndexedCapability {
    fn capability(&self) -> Option<&Capability> {
        self.revision.capability(self.index)
    }
}

/// Capability index keyed by namespace
#[derive(Debug, Default)]
pub struct CapabilityIndex {
    namespaces: HashMap<String, Vec<IndexedCapability>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every capability of `revision`
    pub fn add_capabilities(&mut self, revision: &Arc<Revision>) {
        for capability in revision.capabilities(None) {
            self.namespaces
                .entry(capability.namespace().to_string())
                .or_default()
                .push(IndexedCapability {
                    revision: Arc::clone(revision),
                    index: capability.index(),
                });
        }
    }

    /// Unregister every capability of `revision`
    ///
    /// Removing a revision that is not (or no longer) indexed is a no-op.
    pub fn remove_capabilities(&mut self, revision: &Revision) {
        for capability in revision.capabilities(None) {
            let emptied = match self.namespaces.get_mut(capability.namespace()) {
                Some(entries) => {
                    entries.retain(|e| e.revision.id() != revision.id());
                    entries.is_empty()
                }
                None => false,
            };
            if emptied {
                self.namespaces.remove(capability.namespace());
            }
        }
    }

    /// Capabilities in the requirement's namespace that it matches, in
    /// registration order
    ///
    /// Unknown namespaces yield an empty result.
    pub fn find_capabilities(&self, requirement: &Requirement) -> Vec<&Capability> {
        self.namespaces
            .get(requirement.namespace())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(IndexedCapability::capability)
                    .filter(|c| requirement.matches(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any capability of `revision` is indexed
    pub fn contains_revision(&self, revision: RevisionId) -> bool {
        self.namespaces
            .values()
            .any(|entries| entries.iter().any(|e| e.revision.id() == revision))
    }

    /// Number of indexed capabilities
    pub fn len(&self) -> usize {
        self.namespaces.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}
