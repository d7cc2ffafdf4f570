//! Resolver
//!
//! Computes a wiring for a set of trigger revisions against a snapshot of
//! the module database. The resolver never mutates the database: it returns
//! a [`ResolutionDelta`] that the container applies atomically, tagged with
//! the database generation it was computed at so a stale delta is rejected.
//!
//! Candidate preference, highest first:
//! 1. providers whose revision is already resolved
//! 2. higher `version` attribute (capabilities without one last)
//! 3. lower revision id (older installs)
//! 4. lower capability index within the revision

mod candidates;
mod consistency;
mod order;
pub mod report;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::config::ContainerConfig;
use crate::module::model::{CapabilityRef, Cardinality, RequirementRef, RevisionId, Wire};
use crate::module::registry::ModuleDatabase;
use crate::module::traits::ModuleError;

use candidates::{Candidates, Exclusions};
use consistency::{check_uses, UsesConflict};
pub use report::{FailureReason, ResolutionReport, UnresolvedRequirement};

/// How trigger failures are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Every trigger must resolve, or nothing does
    Mandatory,
    /// Resolve what can be resolved; failures go into the delta's report
    Optional,
}

/// Wiring to apply atomically
#[derive(Debug, Clone, Default)]
pub struct ResolutionDelta {
    /// Newly resolved revisions, providers first
    pub revisions: Vec<RevisionId>,
    /// New wires, all owned by `revisions`
    pub wires: Vec<Wire>,
    /// Database generation the delta was computed at
    pub generation: u64,
    /// Closure members left unresolved (optional mode only)
    pub unresolved: ResolutionReport,
}

impl ResolutionDelta {
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

/// Resolver over a borrowed database snapshot
pub struct Resolver<'a> {
    db: &'a ModuleDatabase,
    config: &'a ContainerConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a ModuleDatabase, config: &'a ContainerConfig) -> Self {
        Self { db, config }
    }

    /// Resolve `triggers` and whatever unresolved providers they need
    ///
    /// Already-resolved triggers are skipped. Only revisions reachable from
    /// surviving triggers through chosen wires are resolved.
    pub fn resolve(&self, triggers: &[RevisionId], mode: ResolveMode) -> Result<ResolutionDelta, ModuleError> {
        let mut excluded = Exclusions::new();
        let mut forced: BTreeMap<RevisionId, UnresolvedRequirement> = BTreeMap::new();
        let mut permutations = 0;

        loop {
            let mut candidates = Candidates::populate(self.db, triggers, &excluded)?;
            for (revision, failure) in &forced {
                if candidates.pending.contains(revision) {
                    candidates.failed.insert(*revision, failure.clone());
                }
            }
            candidates.eliminate(self.db, self.config);

            if mode == ResolveMode::Mandatory && triggers.iter().any(|t| candidates.failed.contains_key(t)) {
                let report = report(&candidates);
                debug!("Resolution failed: {}", report);
                return Err(ModuleError::ResolutionFailed(report));
            }

            let live: Vec<RevisionId> = triggers
                .iter()
                .copied()
                .filter(|t| candidates.pending.contains(t) && !candidates.failed.contains_key(t))
                .collect();
            let (resolved, wires) = self.select(&candidates, &live);

            let Some(conflict) = check_uses(self.db, &wires, &resolved) else {
                let delta = ResolutionDelta {
                    revisions: order::resolution_order(&resolved, &wires),
                    wires,
                    generation: self.db.generation(),
                    unresolved: report(&candidates),
                };
                debug!(
                    "Resolved {} revisions with {} wires at generation {}",
                    delta.revisions.len(),
                    delta.wires.len(),
                    delta.generation
                );
                return Ok(delta);
            };

            if permutations < self.config.resolver.max_permutations {
                if let Some(exclusion) = self.alternative(&candidates, &conflict) {
                    debug!(
                        "Uses conflict on package {} for revision {}, excluding {:?}",
                        conflict.package, conflict.consumer, exclusion
                    );
                    excluded.insert(exclusion);
                    permutations += 1;
                    continue;
                }
            }

            let failure = self.conflict_failure(&conflict)?;
            debug!("Revision {} fails: {}", conflict.consumer, failure);
            forced.insert(conflict.consumer, failure);
        }
    }

    /// Choose wires breadth-first from the live triggers
    fn select(&self, candidates: &Candidates, live: &[RevisionId]) -> (BTreeSet<RevisionId>, Vec<Wire>) {
        let mut resolved = BTreeSet::new();
        let mut wires = Vec::new();
        let mut queue: VecDeque<RevisionId> = live.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !resolved.insert(id) {
                continue;
            }
            let Some(revision) = self.db.revision(id) else {
                continue;
            };
            for requirement in revision.requirements(None) {
                let viable = candidates.viable(self.db, requirement.reference());
                let take = if requirement.cardinality() == Cardinality::Multiple
                    && self.config.policy(requirement.namespace()).multiple
                {
                    viable.len()
                } else {
                    1
                };
                for capability in viable.into_iter().take(take) {
                    wires.push(Wire::new(requirement.reference(), capability));
                    if candidates.pending.contains(&capability.revision) && !resolved.contains(&capability.revision) {
                        queue.push_back(capability.revision);
                    }
                }
            }
        }
        (resolved, wires)
    }

    /// Exclusion that lets a culprit requirement pick another provider
    fn alternative(
        &self,
        candidates: &Candidates,
        conflict: &UsesConflict,
    ) -> Option<(RequirementRef, CapabilityRef)> {
        conflict
            .culprits()
            .find(|wire| candidates.viable(self.db, wire.requirement).len() > 1)
            .map(|wire| (wire.requirement, wire.capability))
    }

    fn conflict_failure(&self, conflict: &UsesConflict) -> Result<UnresolvedRequirement, ModuleError> {
        let culprit = conflict.culprit.requirement;
        let requirement = self
            .db
            .revision(culprit.revision)
            .and_then(|r| r.requirement(culprit.index))
            .ok_or_else(|| {
                ModuleError::ContractViolation(format!("requirement {:?} is not tracked", culprit))
            })?;
        let providers = conflict
            .providers
            .iter()
            .filter_map(|c| self.db.revision(c.revision).map(|r| r.module()))
            .collect();
        Ok(UnresolvedRequirement::new(
            requirement,
            FailureReason::UsesConflict {
                package: conflict.package.clone(),
                providers,
            },
        ))
    }
}

fn report(candidates: &Candidates) -> ResolutionReport {
    ResolutionReport {
        unresolved: candidates.failed.values().cloned().collect(),
    }
}
