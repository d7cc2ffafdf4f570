//! Uses-constraint consistency over package space
//!
//! A consumer's package space is every package it exports without importing
//! it, every package it imports, and transitively every package those imports
//! declare they use. A consumer that would see two different providers for
//! one package is inconsistent.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::module::model::{CapabilityRef, RevisionId, Wire, PACKAGE_NAMESPACE};
use crate::module::registry::ModuleDatabase;

/// Two providers of `package` visible to `consumer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UsesConflict {
    pub consumer: RevisionId,
    pub package: String,
    /// Provider already in the package space, then the one that clashed
    pub providers: [CapabilityRef; 2],
    /// Consumer wire that pulled the first provider in; `None` when it is the
    /// consumer's own export
    pub first: Option<Wire>,
    /// Consumer wire that pulled the clashing provider in
    pub culprit: Wire,
}

/// Package wires per revision for a proposed delta on top of the database
struct PackageSpace<'a> {
    db: &'a ModuleDatabase,
    proposed: HashMap<RevisionId, Vec<Wire>>,
}

impl<'a> PackageSpace<'a> {
    fn new(db: &'a ModuleDatabase, wires: &[Wire]) -> Self {
        let mut proposed: HashMap<RevisionId, Vec<Wire>> = HashMap::new();
        for wire in wires {
            proposed.entry(wire.requirer()).or_default().push(*wire);
        }
        Self { db, proposed }
    }

    fn required(&self, revision: RevisionId) -> &[Wire] {
        if let Some(wires) = self.proposed.get(&revision) {
            return wires;
        }
        self.db
            .wiring(revision)
            .map(|w| w.required.as_slice())
            .unwrap_or(&[])
    }

    fn package_of(&self, capability: CapabilityRef) -> Option<&str> {
        self.db
            .revision(capability.revision)?
            .capability(capability.index)?
            .package_name()
    }

    /// Packages imported by `revision`, with the providing capability
    fn imports(&self, revision: RevisionId) -> Vec<(&str, Wire)> {
        self.required(revision)
            .iter()
            .filter_map(|w| self.package_of(w.capability).map(|p| (p, *w)))
            .collect()
    }

    /// Provider of `package` as seen from `revision`: an import wins over
    /// the revision's own export
    fn provider_of(&self, revision: RevisionId, package: &str) -> Option<CapabilityRef> {
        if let Some((_, wire)) = self.imports(revision).into_iter().find(|(p, _)| *p == package) {
            return Some(wire.capability);
        }
        self.db
            .revision(revision)?
            .capabilities(Some(PACKAGE_NAMESPACE))
            .find(|c| c.package_name() == Some(package))
            .map(|c| c.reference())
    }

    fn uses(&self, capability: CapabilityRef) -> Vec<String> {
        self.db
            .revision(capability.revision)
            .and_then(|r| r.capability(capability.index))
            .map(|c| c.uses().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Packages `revision` exports itself
    fn exports(&self, revision: RevisionId) -> Vec<(&str, CapabilityRef)> {
        self.db
            .revision(revision)
            .map(|r| {
                r.capabilities(Some(PACKAGE_NAMESPACE))
                    .filter_map(|c| c.package_name().map(|p| (p, c.reference())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check(&self, consumer: RevisionId) -> Option<UsesConflict> {
        let imports = self.imports(consumer);
        let mut space: BTreeMap<String, (CapabilityRef, Option<Wire>)> = BTreeMap::new();
        for (package, capability) in self.exports(consumer) {
            if !imports.iter().any(|(p, _)| *p == package) {
                space.entry(package.to_string()).or_insert((capability, None));
            }
        }

        let mut stack: Vec<(String, CapabilityRef, Wire)> = imports
            .into_iter()
            .map(|(p, w)| (p.to_string(), w.capability, w))
            .collect();
        stack.reverse();

        while let Some((package, capability, culprit)) = stack.pop() {
            match space.get(&package) {
                Some((existing, _)) if *existing == capability => continue,
                Some((existing, first)) => {
                    return Some(UsesConflict {
                        consumer,
                        package,
                        providers: [*existing, capability],
                        first: *first,
                        culprit,
                    })
                }
                None => {}
            }
            space.insert(package, (capability, Some(culprit)));
            for used in self.uses(capability) {
                if let Some(provider) = self.provider_of(capability.revision, &used) {
                    stack.push((used, provider, culprit));
                }
            }
        }
        None
    }
}

/// First uses conflict among `consumers` under the proposed `wires`
pub(crate) fn check_uses(
    db: &ModuleDatabase,
    wires: &[Wire],
    consumers: &BTreeSet<RevisionId>,
) -> Option<UsesConflict> {
    let space = PackageSpace::new(db, wires);
    consumers.iter().find_map(|&consumer| space.check(consumer))
}

impl UsesConflict {
    /// Consumer wires whose choice could be changed, clashing one first
    pub fn culprits(&self) -> impl Iterator<Item = Wire> {
        std::iter::once(self.culprit).chain(self.first)
    }
}
