//! Module system traits and interfaces
//!
//! Defines the lifecycle states, event types, error taxonomy and the hooks
//! the surrounding runtime plugs into the container.

use async_trait::async_trait;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::module::instance::Module;
use crate::module::model::RevisionDescription;
use crate::module::resolver::ResolutionReport;
use crate::utils::retry::IsRetryable;

/// Unique module identifier (the system module is always 0)
pub type ModuleId = u64;

/// Module lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModuleState {
    /// Installed, current revision not resolved
    Installed = 0,
    /// Current revision resolved, not active
    Resolved = 1,
    /// Waiting for lazy activation
    LazyStarting = 2,
    /// Activator start in progress
    Starting = 3,
    /// Module is running
    Active = 4,
    /// Activator stop in progress
    Stopping = 5,
    /// Terminal state
    Uninstalled = 6,
}

impl ModuleState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ModuleState::Installed,
            1 => ModuleState::Resolved,
            2 => ModuleState::LazyStarting,
            3 => ModuleState::Starting,
            4 => ModuleState::Active,
            5 => ModuleState::Stopping,
            _ => ModuleState::Uninstalled,
        }
    }

    /// Whether the current revision of a module in this state is wired
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            ModuleState::Resolved
                | ModuleState::LazyStarting
                | ModuleState::Starting
                | ModuleState::Active
                | ModuleState::Stopping
        )
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Installed => "INSTALLED",
            ModuleState::Resolved => "RESOLVED",
            ModuleState::LazyStarting => "LAZY_STARTING",
            ModuleState::Starting => "STARTING",
            ModuleState::Active => "ACTIVE",
            ModuleState::Stopping => "STOPPING",
            ModuleState::Uninstalled => "UNINSTALLED",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Persistent per-module settings
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Settings: u8 {
        /// Start the module when the container launches
        const AUTO_START = 0b01;
        /// Honour the revision's lazy activation policy on auto-start
        const USE_ACTIVATION_POLICY = 0b10;
    }
}

bitflags! {
    /// Options for `ModuleContainer::start`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StartOptions: u8 {
        /// Do not record the start in the module settings
        const TRANSIENT = 0b01;
        /// Honour the revision's lazy activation policy
        const USE_ACTIVATION_POLICY = 0b10;
    }
}

bitflags! {
    /// Options for `ModuleContainer::stop`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StopOptions: u8 {
        /// Do not clear the auto-start setting
        const TRANSIENT = 0b01;
    }
}

/// Module event types, published after the transition committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleEventType {
    Installed,
    Resolved,
    LazyActivation,
    Starting,
    Started,
    Stopping,
    Stopped,
    Updated,
    Unresolved,
    Uninstalled,
}

/// Container-level event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerEventType {
    Started,
    Stopped,
    Error,
    Warning,
    Info,
    Refresh,
}

/// Module system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid transition: cannot {operation} module {module} in state {state}")]
    InvalidTransition {
        module: ModuleId,
        state: ModuleState,
        operation: &'static str,
    },

    #[error("Resolution failed: {0}")]
    ResolutionFailed(ResolutionReport),

    #[error("Module graph changed during resolution: {0}")]
    StaleGraph(String),

    #[error("Activator failed for module {module}: {reason}")]
    ActivationFailed { module: ModuleId, reason: String },

    #[error("Internal contract violation: {0}")]
    ContractViolation(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid revision description: {0}")]
    InvalidDescription(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout waiting for module operation")]
    Timeout,
}

impl IsRetryable for ModuleError {
    fn is_retryable(&self) -> bool {
        matches!(self, ModuleError::StaleGraph(_))
    }
}

impl From<toml::de::Error> for ModuleError {
    fn from(e: toml::de::Error) -> Self {
        ModuleError::ConfigError(e.to_string())
    }
}

/// Hook that runs a module's content when it starts and stops
///
/// Executing module content is the embedding runtime's business; the
/// container only drives the state machine around these calls.
#[async_trait]
pub trait ModuleActivator: Send + Sync {
    /// Called in STARTING; an error rolls the module back to RESOLVED
    async fn start(&self, module: &Module) -> anyhow::Result<()>;

    /// Called in STOPPING; the module reaches RESOLVED regardless
    async fn stop(&self, module: &Module) -> anyhow::Result<()>;
}

/// Factory hook supplied at database construction
///
/// Lets the runtime decide how modules (and the distinguished system
/// module) are built without the database depending on it.
pub trait ModuleFactory: Send + Sync {
    /// Create a regular module
    fn create_module(
        &self,
        location: &str,
        id: ModuleId,
        settings: Settings,
        start_level: u32,
    ) -> Module;

    /// Create the system module representing the runtime itself
    fn create_system_module(&self) -> Module;
}

/// Supplies already-parsed revision content for a location
pub trait ContentProvider: Send + Sync {
    fn revision_description(&self, location: &str) -> Result<RevisionDescription, ModuleError>;
}
