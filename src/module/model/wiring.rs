//! Wires and per-revision wiring

use crate::module::model::RevisionId;

/// Identity of a capability: owning revision plus declaration index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityRef {
    pub revision: RevisionId,
    pub index: usize,
}

/// Identity of a requirement: owning revision plus declaration index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequirementRef {
    pub revision: RevisionId,
    pub index: usize,
}

/// Directed edge from a consuming requirement to a providing capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Wire {
    pub requirement: RequirementRef,
    pub capability: CapabilityRef,
}

impl Wire {
    pub fn new(requirement: RequirementRef, capability: CapabilityRef) -> Self {
        Self {
            requirement,
            capability,
        }
    }

    /// Revision owning the requirement
    pub fn requirer(&self) -> RevisionId {
        self.requirement.revision
    }

    /// Revision owning the capability
    pub fn provider(&self) -> RevisionId {
        self.capability.revision
    }
}

/// Wires of one resolved revision, both directions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevisionWiring {
    /// Wires whose requirement belongs to this revision
    pub required: Vec<Wire>,
    /// Wires whose capability belongs to this revision
    pub provided: Vec<Wire>,
}

impl RevisionWiring {
    /// Whether a revision other than `owner` is wired to this one
    pub fn has_foreign_consumers(&self, owner: RevisionId) -> bool {
        self.provided.iter().any(|w| w.requirer() != owner)
    }
}
