//! Structured resolution failures

use std::collections::BTreeSet;
use std::fmt;

use crate::module::model::{Requirement, RevisionId};
use crate::module::traits::ModuleId;

/// Why a requirement could not be wired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No capability in the database matches
    NoCandidates,
    /// Matching capabilities exist but their revisions cannot resolve
    CandidatesUnresolvable { providers: Vec<ModuleId> },
    /// Every choice leaves the consumer seeing two providers of a package
    UsesConflict {
        package: String,
        providers: Vec<ModuleId>,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoCandidates => write!(f, "no matching capability"),
            FailureReason::CandidatesUnresolvable { providers } => {
                write!(f, "candidate providers {:?} cannot be resolved", providers)
            }
            FailureReason::UsesConflict { package, providers } => write!(
                f,
                "uses constraint violated for package {} (providers {:?})",
                package, providers
            ),
        }
    }
}

/// One requirement left unwired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRequirement {
    pub module: ModuleId,
    pub revision: RevisionId,
    /// Index of the requirement within its revision
    pub requirement: usize,
    pub namespace: String,
    /// Filter text, if the requirement had one
    pub filter: Option<String>,
    pub reason: FailureReason,
}

impl UnresolvedRequirement {
    pub(crate) fn new(requirement: &Requirement, reason: FailureReason) -> Self {
        Self {
            module: requirement.module(),
            revision: requirement.revision(),
            requirement: requirement.index(),
            namespace: requirement.namespace().to_string(),
            filter: requirement.filter().map(|f| f.to_string()),
            reason,
        }
    }
}

impl fmt::Display for UnresolvedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module {} requires {}", self.module, self.namespace)?;
        if let Some(filter) = &self.filter {
            write!(f, " {}", filter)?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Unresolved requirements of a resolution attempt, one per failed revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub unresolved: Vec<UnresolvedRequirement>,
}

impl ResolutionReport {
    pub fn is_empty(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn len(&self) -> usize {
        self.unresolved.len()
    }

    /// Failed modules in ascending id order
    pub fn modules(&self) -> BTreeSet<ModuleId> {
        self.unresolved.iter().map(|u| u.module).collect()
    }

    pub fn for_module(&self, module: ModuleId) -> impl Iterator<Item = &UnresolvedRequirement> {
        self.unresolved.iter().filter(move |u| u.module == module)
    }
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unresolved requirement(s)", self.unresolved.len())?;
        for (i, entry) in self.unresolved.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, entry)?;
        }
        Ok(())
    }
}
