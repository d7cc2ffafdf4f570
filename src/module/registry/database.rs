//! Module database
//!
//! The shared graph store: modules, their revisions, the namespace
//! capability index and the current wiring. Every structural mutation goes
//! through here and takes `&mut self`, so callers must hold the container's
//! database write lock. Each mutation bumps the generation counter, which
//! the resolver uses to detect that its snapshot went stale.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error};

use crate::module::instance::Module;
use crate::module::model::{
    Capability, Requirement, Revision, RevisionDescription, RevisionId, RevisionWiring, Wire,
};
use crate::module::registry::index::CapabilityIndex;
use crate::module::resolver::ResolutionDelta;
use crate::module::traits::{ModuleError, ModuleFactory, ModuleId, Settings};

/// Revisions of one module; the last one is current unless uninstalled
#[derive(Debug)]
struct ModuleRevisions {
    module: Arc<Module>,
    revisions: Vec<Arc<Revision>>,
    uninstalled: bool,
}

impl ModuleRevisions {
    fn current(&self) -> Option<&Arc<Revision>> {
        if self.uninstalled {
            None
        } else {
            self.revisions.last()
        }
    }
}

/// Authoritative store for module existence and wiring
pub struct ModuleDatabase {
    factory: Arc<dyn ModuleFactory>,
    /// Installed (not uninstalled) modules by id
    modules: BTreeMap<ModuleId, Arc<Module>>,
    locations: HashMap<String, ModuleId>,
    /// Revisions by owning module, including uninstalled-but-pending ones
    revisions: BTreeMap<ModuleId, ModuleRevisions>,
    revision_index: HashMap<RevisionId, Arc<Revision>>,
    /// Present for every resolved revision
    wirings: HashMap<RevisionId, RevisionWiring>,
    capabilities: CapabilityIndex,
    next_module_id: ModuleId,
    next_revision_id: RevisionId,
    generation: u64,
}

impl ModuleDatabase {
    /// Create an empty database using `factory` to build modules
    pub fn new(factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            factory,
            modules: BTreeMap::new(),
            locations: HashMap::new(),
            revisions: BTreeMap::new(),
            revision_index: HashMap::new(),
            wirings: HashMap::new(),
            capabilities: CapabilityIndex::new(),
            next_module_id: 1,
            next_revision_id: 1,
            generation: 0,
        }
    }

    /// Structural generation; changes on every mutation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    /// Allocate an id and build a module through the factory hook
    ///
    /// The module is not tracked until passed to [`install`](Self::install).
    pub fn create_module(&mut self, location: &str, settings: Settings, start_level: u32) -> Arc<Module> {
        let id = self.next_module_id;
        self.next_module_id += 1;
        Arc::new(self.factory.create_module(location, id, settings, start_level))
    }

    /// Build the system module through the factory hook
    pub fn create_system_module(&self) -> Arc<Module> {
        Arc::new(self.factory.create_system_module())
    }

    /// Track `module` with a first revision built from `description`
    pub fn install(
        &mut self,
        module: Arc<Module>,
        description: &RevisionDescription,
    ) -> Result<Arc<Revision>, ModuleError> {
        if self.revisions.contains_key(&module.id()) || self.locations.contains_key(module.location()) {
            return Err(contract_violation(format!(
                "module {} at {} is already tracked",
                module.id(),
                module.location()
            )));
        }

        let revision = Arc::new(Revision::build(self.next_revision_id, module.id(), description)?);
        self.next_revision_id += 1;

        self.locations.insert(module.location().to_string(), module.id());
        self.modules.insert(module.id(), Arc::clone(&module));
        self.revision_index.insert(revision.id(), Arc::clone(&revision));
        self.add_capabilities(&revision);
        self.revisions.insert(
            module.id(),
            ModuleRevisions {
                module,
                revisions: vec![Arc::clone(&revision)],
                uninstalled: false,
            },
        );
        self.bump();
        Ok(revision)
    }

    /// Register a revision's capabilities in the namespace index
    pub fn add_capabilities(&mut self, revision: &Arc<Revision>) {
        self.capabilities.add_capabilities(revision);
    }

    /// Remove a revision's capabilities from the namespace index (idempotent)
    pub fn remove_capabilities(&mut self, revision: &Revision) {
        self.capabilities.remove_capabilities(revision);
    }

    /// Capabilities matching `requirement`, in registration order
    pub fn find_capabilities(&self, requirement: &Requirement) -> Vec<&Capability> {
        self.capabilities.find_capabilities(requirement)
    }

    pub fn capability_index(&self) -> &CapabilityIndex {
        &self.capabilities
    }

    pub fn module(&self, id: ModuleId) -> Option<&Arc<Module>> {
        self.modules.get(&id)
    }

    pub fn module_by_location(&self, location: &str) -> Option<&Arc<Module>> {
        self.locations.get(location).and_then(|id| self.modules.get(id))
    }

    /// Installed modules in ascending id order
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values()
    }

    /// Whether `id` was handed out and its module has since been uninstalled
    pub fn was_uninstalled(&self, id: ModuleId) -> bool {
        id < self.next_module_id && !self.modules.contains_key(&id)
    }

    /// Installed module, or an uninstalled one whose revisions are still pending
    pub fn tracked_module(&self, id: ModuleId) -> Option<&Arc<Module>> {
        self.revisions
            .get(&id)
            .map(|entry| &entry.module)
            .or_else(|| self.modules.get(&id))
    }

    /// Module owning `revision`, including uninstalled owners of pending revisions
    pub fn owner(&self, revision: RevisionId) -> Option<&Arc<Module>> {
        let module = self.revision_index.get(&revision)?.module();
        self.revisions.get(&module).map(|entry| &entry.module)
    }

    pub fn current_revision(&self, module: ModuleId) -> Option<&Arc<Revision>> {
        self.revisions.get(&module).and_then(ModuleRevisions::current)
    }

    /// All tracked revisions of a module, oldest first
    pub fn revisions(&self, module: ModuleId) -> &[Arc<Revision>] {
        self.revisions
            .get(&module)
            .map(|entry| entry.revisions.as_slice())
            .unwrap_or(&[])
    }

    pub fn revision(&self, id: RevisionId) -> Option<&Arc<Revision>> {
        self.revision_index.get(&id)
    }

    pub fn wiring(&self, revision: RevisionId) -> Option<&RevisionWiring> {
        self.wirings.get(&revision)
    }

    pub fn is_resolved(&self, revision: RevisionId) -> bool {
        self.wirings.contains_key(&revision)
    }

    /// Revisions that are no longer current but still installed
    pub fn removal_pending(&self) -> Vec<Arc<Revision>> {
        let mut pending = Vec::new();
        for entry in self.revisions.values() {
            let keep = if entry.uninstalled {
                entry.revisions.len()
            } else {
                entry.revisions.len().saturating_sub(1)
            };
            pending.extend(entry.revisions.iter().take(keep).cloned());
        }
        pending
    }

    /// Modules owning removal-pending revisions
    pub fn removal_pending_modules(&self) -> Vec<ModuleId> {
        self.removal_pending().iter().map(|r| r.module()).collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// Apply a resolver delta atomically
    ///
    /// Everything is validated before anything is written, so a rejected
    /// delta leaves the graph untouched.
    pub fn apply_wiring(&mut self, delta: &ResolutionDelta) -> Result<(), ModuleError> {
        if delta.generation != self.generation {
            return Err(ModuleError::StaleGraph(format!(
                "delta computed at generation {}, database is at {}",
                delta.generation, self.generation
            )));
        }

        let pending: HashSet<RevisionId> = delta.revisions.iter().copied().collect();
        for &revision in &delta.revisions {
            let owner = self
                .revision_index
                .get(&revision)
                .map(|r| r.module())
                .ok_or_else(|| contract_violation(format!("revision {} is not tracked", revision)))?;
            let is_current = self.current_revision(owner).map(|r| r.id()) == Some(revision);
            if !is_current || self.is_resolved(revision) {
                return Err(contract_violation(format!(
                    "revision {} is not an unresolved current revision",
                    revision
                )));
            }
        }

        let mut seen = HashSet::new();
        for wire in &delta.wires {
            if !pending.contains(&wire.requirer()) {
                return Err(contract_violation(format!(
                    "wire {:?} does not belong to the resolved set",
                    wire
                )));
            }
            let requirement_ok = self
                .revision_index
                .get(&wire.requirer())
                .and_then(|r| r.requirement(wire.requirement.index))
                .is_some();
            let capability_ok = self
                .revision_index
                .get(&wire.provider())
                .and_then(|r| r.capability(wire.capability.index))
                .is_some();
            let provider_ok = self.is_resolved(wire.provider()) || pending.contains(&wire.provider());
            if !requirement_ok || !capability_ok || !provider_ok || !seen.insert(*wire) {
                return Err(contract_violation(format!("invalid wire {:?}", wire)));
            }
        }

        for &revision in &delta.revisions {
            self.wirings.insert(revision, RevisionWiring::default());
        }
        for wire in &delta.wires {
            if let Some(wiring) = self.wirings.get_mut(&wire.requirer()) {
                wiring.required.push(*wire);
            }
            if let Some(wiring) = self.wirings.get_mut(&wire.provider()) {
                wiring.provided.push(*wire);
            }
        }
        self.bump();
        debug!(
            "Applied wiring for {} revisions ({} wires)",
            delta.revisions.len(),
            delta.wires.len()
        );
        Ok(())
    }

    /// Replace a module's current revision
    ///
    /// The old revision stays installed (removal pending) while other
    /// revisions are wired to it; otherwise it is purged immediately.
    pub fn update(
        &mut self,
        module: ModuleId,
        description: &RevisionDescription,
    ) -> Result<Arc<Revision>, ModuleError> {
        let old = self
            .current_revision(module)
            .cloned()
            .ok_or_else(|| contract_violation(format!("module {} is not installed", module)))?;
        let revision = Arc::new(Revision::build(self.next_revision_id, module, description)?);
        self.next_revision_id += 1;

        self.remove_capabilities(&old);
        self.add_capabilities(&revision);
        self.revision_index.insert(revision.id(), Arc::clone(&revision));
        if let Some(entry) = self.revisions.get_mut(&module) {
            entry.revisions.push(Arc::clone(&revision));
        }
        if !self.in_use(old.id()) {
            self.purge_revision(old.id());
        }
        self.bump();
        Ok(revision)
    }

    /// Stop tracking a module; revisions still wired-to stay pending
    pub fn uninstall(&mut self, module: ModuleId) -> Result<(), ModuleError> {
        let current = self
            .current_revision(module)
            .cloned()
            .ok_or_else(|| contract_violation(format!("module {} is not installed", module)))?;

        if let Some(removed) = self.modules.remove(&module) {
            if self.locations.get(removed.location()) == Some(&module) {
                self.locations.remove(removed.location());
            }
        }
        self.remove_capabilities(&current);
        if let Some(entry) = self.revisions.get_mut(&module) {
            entry.uninstalled = true;
        }

        let unused: Vec<RevisionId> = self
            .revisions(module)
            .iter()
            .map(|r| r.id())
            .filter(|id| !self.in_use(*id))
            .collect();
        for revision in unused {
            self.purge_revision(revision);
        }
        self.bump();
        Ok(())
    }

    /// Modules wired to `roots` (transitively, following consumers), roots included
    pub fn dependency_closure(&self, roots: &[ModuleId]) -> BTreeSet<ModuleId> {
        let mut closure = BTreeSet::new();
        let mut queue: Vec<ModuleId> = roots.to_vec();
        while let Some(module) = queue.pop() {
            if !self.revisions.contains_key(&module) || !closure.insert(module) {
                continue;
            }
            for revision in self.revisions(module) {
                let Some(wiring) = self.wirings.get(&revision.id()) else {
                    continue;
                };
                for wire in &wiring.provided {
                    if let Some(consumer) = self.revision_index.get(&wire.requirer()) {
                        queue.push(consumer.module());
                    }
                }
            }
        }
        closure
    }

    /// Unresolve every revision of `modules` and discard stale revisions
    ///
    /// `modules` must be closed under consumers (see
    /// [`dependency_closure`](Self::dependency_closure)). Returns the
    /// installed modules whose current revision lost its wiring.
    pub fn refresh(&mut self, modules: &BTreeSet<ModuleId>) -> Vec<ModuleId> {
        let mut unresolved = Vec::new();
        for &module in modules {
            let ids: Vec<RevisionId> = self.revisions(module).iter().map(|r| r.id()).collect();
            let current = self.current_revision(module).map(|r| r.id());
            for id in ids {
                if self.drop_wiring(id) && Some(id) == current {
                    unresolved.push(module);
                }
            }
        }

        for &module in modules {
            let stale: Vec<RevisionId> = match self.revisions.get(&module) {
                Some(entry) if entry.uninstalled => entry.revisions.iter().map(|r| r.id()).collect(),
                Some(entry) => {
                    let keep = entry.revisions.len().saturating_sub(1);
                    entry.revisions.iter().take(keep).map(|r| r.id()).collect()
                }
                None => Vec::new(),
            };
            for revision in stale {
                self.purge_revision(revision);
            }
        }
        self.bump();
        unresolved
    }

    fn in_use(&self, revision: RevisionId) -> bool {
        self.wirings
            .get(&revision)
            .map(|w| w.has_foreign_consumers(revision))
            .unwrap_or(false)
    }

    /// Remove a revision's wiring and purge the wires on the other ends
    fn drop_wiring(&mut self, revision: RevisionId) -> bool {
        let Some(wiring) = self.wirings.remove(&revision) else {
            return false;
        };
        for wire in &wiring.required {
            if let Some(provider) = self.wirings.get_mut(&wire.provider()) {
                provider.provided.retain(|w| w != wire);
            }
        }
        for wire in &wiring.provided {
            if let Some(consumer) = self.wirings.get_mut(&wire.requirer()) {
                consumer.required.retain(|w| w != wire);
            }
        }
        true
    }

    fn purge_revision(&mut self, revision: RevisionId) {
        let Some(removed) = self.revision_index.remove(&revision) else {
            return;
        };
        self.drop_wiring(revision);
        self.remove_capabilities(&removed);
        let module = removed.module();
        let now_empty = match self.revisions.get_mut(&module) {
            Some(entry) => {
                entry.revisions.retain(|r| r.id() != revision);
                entry.uninstalled && entry.revisions.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.revisions.remove(&module);
        }
        debug!("Purged revision {} of module {}", revision, module);
    }

    /// All wires currently recorded, for consistency checks
    pub fn wires(&self) -> Vec<Wire> {
        let mut wires: Vec<Wire> = self
            .wirings
            .values()
            .flat_map(|w| w.required.iter().copied())
            .collect();
        wires.sort();
        wires
    }
}

fn contract_violation(message: String) -> ModuleError {
    error!("Module database contract violation: {}", message);
    ModuleError::ContractViolation(message)
}
