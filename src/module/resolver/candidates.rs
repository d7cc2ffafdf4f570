//! Candidate population and elimination

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::config::ContainerConfig;
use crate::module::model::{CapabilityRef, Requirement, RequirementRef, RevisionId};
use crate::module::registry::ModuleDatabase;
use crate::module::resolver::report::{FailureReason, UnresolvedRequirement};
use crate::module::traits::ModuleError;

/// Requirement/capability pairs ruled out by earlier attempts
pub(crate) type Exclusions = HashSet<(RequirementRef, CapabilityRef)>;

/// Candidate providers for every requirement of the pending closure
#[derive(Debug, Default)]
pub(crate) struct Candidates {
    /// Unresolved revisions reachable from the triggers
    pub pending: BTreeSet<RevisionId>,
    /// Matching providers per requirement, most preferred first
    pub by_requirement: BTreeMap<RequirementRef, Vec<CapabilityRef>>,
    /// Revisions that cannot resolve, with the first requirement that failed
    pub failed: BTreeMap<RevisionId, UnresolvedRequirement>,
}

impl Candidates {
    /// Build the closure of unresolved revisions from `triggers`
    ///
    /// Provider revisions that are themselves unresolved join the closure;
    /// traversal stops at resolved revisions.
    pub fn populate(
        db: &ModuleDatabase,
        triggers: &[RevisionId],
        excluded: &Exclusions,
    ) -> Result<Self, ModuleError> {
        let mut candidates = Candidates::default();
        let mut queue: VecDeque<RevisionId> = triggers.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if db.is_resolved(id) || candidates.pending.contains(&id) {
                continue;
            }
            let revision = db.revision(id).ok_or_else(|| {
                ModuleError::ContractViolation(format!("revision {} is not tracked", id))
            })?;
            candidates.pending.insert(id);

            for requirement in revision.requirements(None) {
                let mut providers: Vec<_> = db
                    .find_capabilities(requirement)
                    .into_iter()
                    .filter(|c| !excluded.contains(&(requirement.reference(), c.reference())))
                    .collect();
                // Preference: resolved provider, higher version, older revision,
                // declaration order.
                providers.sort_by_key(|c| {
                    (
                        !db.is_resolved(c.revision()),
                        Reverse(c.version().cloned()),
                        c.revision(),
                        c.index(),
                    )
                });
                for provider in &providers {
                    if !db.is_resolved(provider.revision()) {
                        queue.push_back(provider.revision());
                    }
                }
                candidates.by_requirement.insert(
                    requirement.reference(),
                    providers.iter().map(|c| c.reference()).collect(),
                );
            }
        }
        Ok(candidates)
    }

    /// Whether a provider can take part in a wiring of this closure
    pub fn is_viable(&self, db: &ModuleDatabase, provider: RevisionId) -> bool {
        db.is_resolved(provider) || (self.pending.contains(&provider) && !self.failed.contains_key(&provider))
    }

    /// Viable providers of `requirement`, most preferred first
    pub fn viable(&self, db: &ModuleDatabase, requirement: RequirementRef) -> Vec<CapabilityRef> {
        self.by_requirement
            .get(&requirement)
            .map(|providers| {
                providers
                    .iter()
                    .copied()
                    .filter(|c| self.is_viable(db, c.revision))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fail revisions until every survivor has a viable provider for each
    /// requirement that needs one
    ///
    /// A failure invalidates the failed revision as a provider, so this runs
    /// to a fixed point.
    pub fn eliminate(&mut self, db: &ModuleDatabase, config: &ContainerConfig) {
        loop {
            let mut newly_failed = Vec::new();
            for &id in &self.pending {
                if self.failed.contains_key(&id) {
                    continue;
                }
                let Some(revision) = db.revision(id) else {
                    continue;
                };
                for requirement in revision.requirements(None) {
                    if !needs_provider(requirement, config) {
                        continue;
                    }
                    if self.viable(db, requirement.reference()).is_empty() {
                        newly_failed.push((id, self.failure(db, requirement)));
                        break;
                    }
                }
            }
            if newly_failed.is_empty() {
                return;
            }
            self.failed.extend(newly_failed);
        }
    }

    fn failure(&self, db: &ModuleDatabase, requirement: &Requirement) -> UnresolvedRequirement {
        let providers: BTreeSet<_> = self
            .by_requirement
            .get(&requirement.reference())
            .into_iter()
            .flatten()
            .filter_map(|c| db.revision(c.revision).map(|r| r.module()))
            .collect();
        let reason = if providers.is_empty() {
            FailureReason::NoCandidates
        } else {
            FailureReason::CandidatesUnresolvable {
                providers: providers.into_iter().collect(),
            }
        };
        UnresolvedRequirement::new(requirement, reason)
    }
}

/// Whether an unsatisfied requirement blocks its revision
pub(crate) fn needs_provider(requirement: &Requirement, config: &ContainerConfig) -> bool {
    !requirement.is_optional() && !config.policy(requirement.namespace()).allow_zero_wires
}
