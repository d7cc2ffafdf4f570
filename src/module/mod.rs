//! Module system
//!
//! Tracks installable modules, resolves their requirements against other
//! modules' capabilities and drives each module through its lifecycle.
//!
//! ## Architecture
//!
//! - **Model**: immutable revisions with typed capabilities and requirements
//! - **Registry**: the module database and its capability index
//! - **Resolver**: computes a consistent wiring against a database snapshot
//! - **Container**: applies wirings, runs state transitions, publishes events

pub mod container;
pub mod events;
pub mod factory;
pub mod instance;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod traits;

pub use container::ModuleContainer;
pub use events::{ContainerEvent, EventCollector, EventManager, ListenerId, ModuleEvent};
pub use factory::{DefaultModuleFactory, NoopActivator, SYSTEM_MODULE_LOCATION};
pub use instance::Module;
pub use model::{
    AttributeValue, Capability, CapabilityDescription, Requirement, RequirementDescription, Revision,
    RevisionDescription, Wire,
};
pub use registry::{CapabilityIndex, ModuleDatabase};
pub use resolver::{ResolutionDelta, ResolutionReport, ResolveMode, Resolver};
pub use traits::{
    ContainerEventType, ContentProvider, ModuleActivator, ModuleError, ModuleEventType, ModuleFactory,
    ModuleId, ModuleState, Settings, StartOptions, StopOptions,
};
