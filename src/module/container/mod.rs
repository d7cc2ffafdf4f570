//! Module container
//!
//! Top-level coordinator: owns the module database, runs the resolver,
//! drives module state transitions and publishes events.
//!
//! Locking rules:
//! - the database lock (`RwLock<ModuleDatabase>`) is never held while
//!   waiting for a module's transition lock
//! - operations spanning several modules lock them in ascending module id
//! - events are published while the module's transition lock is held, after
//!   the state change committed, so each module's events are in order

mod lifecycle;
mod structure;

use std::sync::Arc;
use tokio::sync::{MutexGuard, RwLock};
use tracing::{error, info};

use crate::config::ContainerConfig;
use crate::module::events::{ContainerEvent, EventCollector, EventManager, ListenerId, ModuleEvent};
use crate::module::factory::DefaultModuleFactory;
use crate::module::instance::Module;
use crate::module::model::{Capability, Requirement, RequirementDescription, Revision, RevisionDescription, Wire};
use crate::module::registry::ModuleDatabase;
use crate::module::traits::{
    ContainerEventType, ContentProvider, ModuleError, ModuleEventType, ModuleFactory, ModuleId,
    ModuleState,
};
use crate::utils::lock::with_read_lock;
use crate::utils::retry::RetryConfig;

/// Coordinates the module database, resolver and lifecycle
pub struct ModuleContainer {
    config: ContainerConfig,
    database: Arc<RwLock<ModuleDatabase>>,
    events: Arc<EventManager>,
    content: Option<Arc<dyn ContentProvider>>,
    retry: RetryConfig,
}

impl ModuleContainer {
    /// Create a container; the system module is installed from `system_description`
    pub fn new(
        config: ContainerConfig,
        factory: Arc<dyn ModuleFactory>,
        system_description: RevisionDescription,
    ) -> Result<Self, ModuleError> {
        config
            .validate()
            .map_err(|e| ModuleError::ConfigError(e.to_string()))?;

        let mut database = ModuleDatabase::new(factory);
        let system = database.create_system_module();
        if system.id() != 0 {
            return Err(ModuleError::ContractViolation(format!(
                "system module must have id 0, factory produced {}",
                system.id()
            )));
        }
        database.install(system, &system_description)?;

        info!("Module container created");
        Ok(Self::assemble(config, database))
    }

    /// Container with default configuration, factory and an empty system module
    pub fn with_defaults() -> Self {
        let mut database = ModuleDatabase::new(Arc::new(DefaultModuleFactory::new()));
        let system = database.create_system_module();
        if let Err(e) = database.install(system, &RevisionDescription::new()) {
            error!("Failed to install system module: {}", e);
        }
        Self::assemble(ContainerConfig::default(), database)
    }

    fn assemble(config: ContainerConfig, database: ModuleDatabase) -> Self {
        Self {
            events: Arc::new(EventManager::new(&config.events)),
            retry: RetryConfig::resolution(&config.resolver),
            database: Arc::new(RwLock::new(database)),
            content: None,
            config,
        }
    }

    /// Supply revision content for [`install_from`](Self::install_from)
    pub fn with_content_provider(mut self, provider: Arc<dyn ContentProvider>) -> Self {
        self.content = Some(provider);
        self
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Get event manager for subscribing to events
    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    /// Subscribe to module events through a collector
    pub async fn module_event_collector(&self) -> (ListenerId, EventCollector<ModuleEvent>) {
        let (id, receiver) = self.events.subscribe_module_events().await;
        (id, EventCollector::new(receiver, self.config.events.wait_timeout()))
    }

    /// Subscribe to container events through a collector
    pub async fn container_event_collector(&self) -> (ListenerId, EventCollector<ContainerEvent>) {
        let (id, receiver) = self.events.subscribe_container_events().await;
        (id, EventCollector::new(receiver, self.config.events.wait_timeout()))
    }

    pub async fn module(&self, id: ModuleId) -> Option<Arc<Module>> {
        with_read_lock(&self.database, |db| db.module(id).cloned()).await
    }

    pub async fn module_by_location(&self, location: &str) -> Option<Arc<Module>> {
        with_read_lock(&self.database, |db| db.module_by_location(location).cloned()).await
    }

    /// Installed modules in ascending id order
    pub async fn modules(&self) -> Vec<Arc<Module>> {
        with_read_lock(&self.database, |db| db.modules().cloned().collect()).await
    }

    pub async fn system_module(&self) -> Option<Arc<Module>> {
        self.module(0).await
    }

    pub async fn current_revision(&self, id: ModuleId) -> Option<Arc<Revision>> {
        with_read_lock(&self.database, |db| db.current_revision(id).cloned()).await
    }

    /// Every tracked revision of a module, oldest first
    pub async fn revisions(&self, id: ModuleId) -> Vec<Arc<Revision>> {
        with_read_lock(&self.database, |db| db.revisions(id).to_vec()).await
    }

    /// Wires required by the module's current revision
    pub async fn wires(&self, id: ModuleId) -> Vec<Wire> {
        with_read_lock(&self.database, |db| {
            db.current_revision(id)
                .and_then(|r| db.wiring(r.id()))
                .map(|w| w.required.clone())
                .unwrap_or_default()
        })
        .await
    }

    /// Wires provided by the module's revisions to any consumer
    pub async fn consumers(&self, id: ModuleId) -> Vec<Wire> {
        with_read_lock(&self.database, |db| {
            db.revisions(id)
                .iter()
                .filter_map(|r| db.wiring(r.id()))
                .flat_map(|w| w.provided.iter().copied())
                .collect()
        })
        .await
    }

    /// Superseded or uninstalled revisions still wired to
    pub async fn removal_pending(&self) -> Vec<Arc<Revision>> {
        with_read_lock(&self.database, |db| db.removal_pending()).await
    }

    /// Capabilities currently matching `requirement`, in registration order
    pub async fn find_providers(&self, requirement: &RequirementDescription) -> Result<Vec<Capability>, ModuleError> {
        let requirement = Requirement::new(requirement, 0, 0, 0)?;
        Ok(with_read_lock(&self.database, |db| {
            db.find_capabilities(&requirement).into_iter().cloned().collect()
        })
        .await)
    }

    /// Installed module, `InvalidTransition` for an uninstalled one
    async fn module_or_err(&self, id: ModuleId, operation: &'static str) -> Result<Arc<Module>, ModuleError> {
        let (module, uninstalled) =
            with_read_lock(&self.database, |db| (db.module(id).cloned(), db.was_uninstalled(id))).await;
        match module {
            Some(module) => Ok(module),
            None if uninstalled => Err(ModuleError::InvalidTransition {
                module: id,
                state: ModuleState::Uninstalled,
                operation,
            }),
            None => Err(ModuleError::ModuleNotFound(id.to_string())),
        }
    }

    async fn publish(&self, module: &Module, event_type: ModuleEventType) {
        self.events
            .publish_module_event(ModuleEvent::new(module, event_type))
            .await;
    }

    async fn publish_error(&self, module: ModuleId, error: &ModuleError) {
        self.events
            .publish_container_event(
                ContainerEvent::new(ContainerEventType::Error)
                    .with_module(module)
                    .with_error(error.to_string()),
            )
            .await;
    }
}

/// Lock modules in ascending id order
///
/// `modules` must be sorted by id and free of duplicates.
async fn lock_all(modules: &[Arc<Module>]) -> Vec<MutexGuard<'_, ()>> {
    let mut guards = Vec::with_capacity(modules.len());
    for module in modules {
        guards.push(module.lock_transition().await);
    }
    guards
}

fn sorted_unique(mut modules: Vec<Arc<Module>>) -> Vec<Arc<Module>> {
    modules.sort_by_key(|m| m.id());
    modules.dedup_by_key(|m| m.id());
    modules
}

fn invalid_transition(module: &Module, operation: &'static str) -> ModuleError {
    ModuleError::InvalidTransition {
        module: module.id(),
        state: module.state(),
        operation,
    }
}
