//! Requirements declared by a revision

use semver::VersionReq;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::module::model::attribute::AttributeValue;
use crate::module::model::capability::Capability;
use crate::module::model::filter::Filter;
use crate::module::model::wiring::RequirementRef;
use crate::module::model::{
    RevisionId, CARDINALITY_DIRECTIVE, FILTER_DIRECTIVE, RESOLUTION_DIRECTIVE, VERSION_ATTRIBUTE,
};
use crate::module::traits::{ModuleError, ModuleId};

/// Whether an unsatisfied requirement blocks resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    Mandatory,
    Optional,
}

/// How many wires a requirement asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Multiple,
}

/// Requirement as supplied by the content provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequirementDescription {
    pub namespace: String,
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl RequirementDescription {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn filter(self, filter: impl Into<String>) -> Self {
        self.directive(FILTER_DIRECTIVE, filter)
    }

    pub fn optional(self) -> Self {
        self.directive(RESOLUTION_DIRECTIVE, "optional")
    }

    pub fn multiple(self) -> Self {
        self.directive(CARDINALITY_DIRECTIVE, "multiple")
    }

    pub fn version_range(self, range: impl Into<String>) -> Self {
        self.attribute(VERSION_ATTRIBUTE, AttributeValue::String(range.into()))
    }

    pub fn directive(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(name.into(), value.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A named, filtered need a revision declares against others' capabilities
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    namespace: String,
    directives: BTreeMap<String, String>,
    attributes: BTreeMap<String, AttributeValue>,
    filter: Option<Filter>,
    version_range: Option<VersionReq>,
    resolution: ResolutionPolicy,
    cardinality: Cardinality,
    revision: RevisionId,
    module: ModuleId,
    index: usize,
}

impl Requirement {
    /// Build a requirement, parsing its filter, version range and directives
    pub fn new(
        description: &RequirementDescription,
        revision: RevisionId,
        module: ModuleId,
        index: usize,
    ) -> Result<Self, ModuleError> {
        if description.namespace.is_empty() {
            return Err(ModuleError::InvalidDescription(
                "requirement namespace cannot be empty".to_string(),
            ));
        }

        let filter = description
            .directives
            .get(FILTER_DIRECTIVE)
            .map(|f| Filter::parse(f))
            .transpose()?;

        let version_range = match description.attributes.get(VERSION_ATTRIBUTE) {
            Some(AttributeValue::String(range)) => Some(VersionReq::parse(range).map_err(|e| {
                ModuleError::InvalidDescription(format!("invalid version range {:?}: {}", range, e))
            })?),
            Some(other) => {
                return Err(ModuleError::InvalidDescription(format!(
                    "version range must be a string, got {}",
                    other
                )))
            }
            None => None,
        };

        let resolution = match description.directives.get(RESOLUTION_DIRECTIVE).map(String::as_str) {
            None | Some("mandatory") => ResolutionPolicy::Mandatory,
            Some("optional") => ResolutionPolicy::Optional,
            Some(other) => {
                return Err(ModuleError::InvalidDescription(format!(
                    "unknown resolution directive: {}",
                    other
                )))
            }
        };

        let cardinality = match description.directives.get(CARDINALITY_DIRECTIVE).map(String::as_str) {
            None | Some("single") => Cardinality::Single,
            Some("multiple") => Cardinality::Multiple,
            Some(other) => {
                return Err(ModuleError::InvalidDescription(format!(
                    "unknown cardinality directive: {}",
                    other
                )))
            }
        };

        Ok(Self {
            namespace: description.namespace.clone(),
            directives: description.directives.clone(),
            attributes: description.attributes.clone(),
            filter,
            version_range,
            resolution,
            cardinality,
            revision,
            module,
            index,
        })
    }

    /// Whether `capability` satisfies this requirement
    ///
    /// Namespace equality, the filter (if any), the version range (if any)
    /// and the capability's mandatory attributes must all agree.
    pub fn matches(&self, capability: &Capability) -> bool {
        if self.namespace != capability.namespace() {
            return false;
        }
        if let Some(filter) = &self.filter {
            if !filter.matches(capability.attributes()) {
                return false;
            }
        }
        if let Some(range) = &self.version_range {
            match capability.version() {
                Some(version) if range.matches(version) => {}
                _ => return false,
            }
        }
        let mandatory = capability.mandatory_attributes();
        if !mandatory.is_empty() {
            let mentioned = self
                .filter
                .as_ref()
                .map(Filter::attribute_names)
                .unwrap_or_default();
            if mandatory.iter().any(|attr| !mentioned.contains(attr)) {
                return false;
            }
        }
        true
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn directives(&self) -> &BTreeMap<String, String> {
        &self.directives
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.resolution == ResolutionPolicy::Optional
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn revision(&self) -> RevisionId {
        self.revision
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reference(&self) -> RequirementRef {
        RequirementRef {
            revision: self.revision,
            index: self.index,
        }
    }
}
