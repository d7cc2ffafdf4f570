//! Capability/requirement model
//!
//! Immutable value objects: capabilities, requirements and the revisions
//! that own them, plus the filter language used for matching.

pub mod attribute;
pub mod capability;
pub mod filter;
pub mod requirement;
pub mod revision;
pub mod wiring;

pub use attribute::AttributeValue;
pub use capability::{Capability, CapabilityDescription};
pub use filter::{CompareOp, Filter};
pub use requirement::{Cardinality, Requirement, RequirementDescription, ResolutionPolicy};
pub use revision::{Revision, RevisionDescription};
pub use wiring::{CapabilityRef, RequirementRef, RevisionWiring, Wire};

/// Monotonically increasing revision identifier
pub type RevisionId = u64;

/// Exported packages; the namespace uses-constraints are checked in
pub const PACKAGE_NAMESPACE: &str = "module.package";
/// Services offered to other modules
pub const SERVICE_NAMESPACE: &str = "module.service";

pub const FILTER_DIRECTIVE: &str = "filter";
pub const RESOLUTION_DIRECTIVE: &str = "resolution";
pub const CARDINALITY_DIRECTIVE: &str = "cardinality";
pub const USES_DIRECTIVE: &str = "uses";
pub const MANDATORY_DIRECTIVE: &str = "mandatory";

pub const VERSION_ATTRIBUTE: &str = "version";
