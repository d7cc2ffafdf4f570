//! Capabilities offered by a revision

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::module::model::attribute::AttributeValue;
use crate::module::model::wiring::CapabilityRef;
use crate::module::model::{
    RevisionId, MANDATORY_DIRECTIVE, PACKAGE_NAMESPACE, USES_DIRECTIVE, VERSION_ATTRIBUTE,
};
use crate::module::traits::ModuleId;

/// Capability as supplied by the content provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapabilityDescription {
    pub namespace: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
}

impl CapabilityDescription {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn directive(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(name.into(), value.into());
        self
    }
}

/// A named, attributed fact a revision offers
///
/// Immutable; owned by exactly one revision and identified by the
/// revision id plus its position in the revision's capability list.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    namespace: String,
    attributes: BTreeMap<String, AttributeValue>,
    directives: BTreeMap<String, String>,
    revision: RevisionId,
    module: ModuleId,
    index: usize,
}

impl Capability {
    pub(crate) fn new(
        description: &CapabilityDescription,
        revision: RevisionId,
        module: ModuleId,
        index: usize,
    ) -> Self {
        Self {
            namespace: description.namespace.clone(),
            attributes: description.attributes.clone(),
            directives: description.directives.clone(),
            revision,
            module,
            index,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn directives(&self) -> &BTreeMap<String, String> {
        &self.directives
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

    pub fn reference(&self) -> CapabilityRef {
        CapabilityRef {
            revision: self.revision,
            index: self.index,
        }
    }

    pub fn version(&self) -> Option<&Version> {
        self.attributes
            .get(VERSION_ATTRIBUTE)
            .and_then(AttributeValue::as_version)
    }

    /// Package name when this is a package capability
    pub fn package_name(&self) -> Option<&str> {
        if self.namespace != PACKAGE_NAMESPACE {
            return None;
        }
        self.attributes
            .get(PACKAGE_NAMESPACE)
            .and_then(AttributeValue::as_str)
    }

    /// Packages listed in the `uses` directive
    pub fn uses(&self) -> Vec<&str> {
        split_list(self.directives.get(USES_DIRECTIVE))
    }

    /// Attribute names a requirement filter must mention to match
    pub fn mandatory_attributes(&self) -> Vec<&str> {
        split_list(self.directives.get(MANDATORY_DIRECTIVE))
    }
}

fn split_list(value: Option<&String>) -> Vec<&str> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
