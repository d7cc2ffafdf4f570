//! Modwire - dynamic module runtime core
//!
//! Tracks installable modules, each exposing typed capabilities and
//! declaring requirements on other modules' capabilities, computes a
//! consistent wiring between them and drives every module through its
//! lifecycle while publishing ordered events to observers.
//!
//! ## Layers
//!
//! 1. Model (revisions, capabilities, requirements, filters, wires)
//! 2. Module database (capability index, revision tracking, wiring graph)
//! 3. Resolver (candidate selection, uses consistency, ordering)
//! 4. Container (lifecycle state machine, refresh, events) ← ENTRY POINT
//!
//! ## Design Principles
//!
//! 1. **Snapshot Resolution**: the resolver never mutates; its result is
//!    applied atomically or rejected as stale
//! 2. **All-or-Nothing**: a resolution either wires every module it touches
//!    or none of them
//! 3. **Ordered Events**: each module's events follow its state transitions

pub mod config;
pub mod module;
pub mod utils;

// Re-export config module
pub use config::*;

pub use module::{
    ContainerEvent, ModuleContainer, ModuleError, ModuleEvent, ModuleId, ModuleState, RevisionDescription,
};
