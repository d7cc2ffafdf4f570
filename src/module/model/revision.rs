//! Revisions: immutable snapshots of a module's capabilities and requirements

use serde::{Deserialize, Serialize};

use crate::module::model::capability::{Capability, CapabilityDescription};
use crate::module::model::requirement::{Requirement, RequirementDescription};
use crate::module::model::RevisionId;
use crate::module::traits::{ModuleError, ModuleId};

/// Parsed revision content handed to the container by a content provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RevisionDescription {
    #[serde(default)]
    pub capabilities: Vec<CapabilityDescription>,
    #[serde(default)]
    pub requirements: Vec<RequirementDescription>,
    /// Defer activation until `trigger_lazy_activation` when started with
    /// the activation policy
    #[serde(default)]
    pub lazy_activation: bool,
}

impl RevisionDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, capability: CapabilityDescription) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_requirement(mut self, requirement: RequirementDescription) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy_activation = true;
        self
    }

    /// Check the description builds without side effects
    pub fn validate(&self) -> Result<(), ModuleError> {
        Revision::build(0, 0, self).map(|_| ())
    }
}

/// Immutable snapshot of one version of a module's content
///
/// Updates create a new revision with a higher id; a published revision is
/// never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    id: RevisionId,
    module: ModuleId,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    lazy_activation: bool,
}

impl Revision {
    /// Build a revision from a description
    pub fn build(
        id: RevisionId,
        module: ModuleId,
        description: &RevisionDescription,
    ) -> Result<Self, ModuleError> {
        let mut capabilities = Vec::with_capacity(description.capabilities.len());
        for (index, capability) in description.capabilities.iter().enumerate() {
            if capability.namespace.is_empty() {
                return Err(ModuleError::InvalidDescription(
                    "capability namespace cannot be empty".to_string(),
                ));
            }
            capabilities.push(Capability::new(capability, id, module, index));
        }

        let requirements = description
            .requirements
            .iter()
            .enumerate()
            .map(|(index, requirement)| Requirement::new(requirement, id, module, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            module,
            capabilities,
            requirements,
            lazy_activation: description.lazy_activation,
        })
    }

    pub fn id(&self) -> RevisionId {
        self.id
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Capabilities, optionally restricted to one namespace, in declaration order
    pub fn capabilities<'a>(
        &'a self,
        namespace: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Capability> + 'a {
        self.capabilities
            .iter()
            .filter(move |c| namespace.map_or(true, |ns| c.namespace() == ns))
    }

    /// Requirements, optionally restricted to one namespace, in declaration order
    pub fn requirements<'a>(
        &'a self,
        namespace: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Requirement> + 'a {
        self.requirements
            .iter()
            .filter(move |r| namespace.map_or(true, |ns| r.namespace() == ns))
    }

    pub fn capability(&self, index: usize) -> Option<&Capability> {
        self.capabilities.get(index)
    }

    pub fn requirement(&self, index: usize) -> Option<&Requirement> {
        self.requirements.get(index)
    }

    pub fn lazy_activation(&self) -> bool {
        self.lazy_activation
    }
}
