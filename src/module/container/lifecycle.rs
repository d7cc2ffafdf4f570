//! Lifecycle operations: resolve, start, stop, launch and shutdown

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::module::container::{invalid_transition, lock_all, sorted_unique, ModuleContainer};
use crate::module::events::ContainerEvent;
use crate::module::instance::Module;
use crate::module::resolver::{ResolutionReport, ResolveMode, Resolver};
use crate::module::traits::{
    ContainerEventType, ModuleError, ModuleEventType, ModuleId, ModuleState, Settings, StartOptions,
    StopOptions,
};
use crate::utils::retry::retry_if_retryable;
use crate::utils::timeout::with_optional_timeout;

impl ModuleContainer {
    /// Resolve the given modules and the providers they need
    ///
    /// All of them resolve or none does. Already-resolved modules are
    /// skipped; resolving nothing new emits no events.
    pub async fn resolve(&self, modules: &[ModuleId]) -> Result<(), ModuleError> {
        for &id in modules {
            let module = self.module_or_err(id, "resolve").await?;
            if module.state() == ModuleState::Uninstalled {
                return Err(invalid_transition(&module, "resolve"));
            }
        }
        self.resolve_with_retry(modules, ResolveMode::Mandatory).await.map(|_| ())
    }

    /// Resolve every installed module that can be resolved
    ///
    /// Returns the requirements that kept the rest unresolved.
    pub async fn resolve_all(&self) -> Result<ResolutionReport, ModuleError> {
        let unresolved: Vec<ModuleId> = self
            .modules()
            .await
            .iter()
            .filter(|m| m.state() == ModuleState::Installed)
            .map(|m| m.id())
            .collect();
        self.resolve_with_retry(&unresolved, ResolveMode::Optional).await
    }

    pub(super) async fn resolve_with_retry(
        &self,
        modules: &[ModuleId],
        mode: ResolveMode,
    ) -> Result<ResolutionReport, ModuleError> {
        let this = self;
        retry_if_retryable(&self.retry, move || this.resolve_once(modules, mode)).await
    }

    /// One resolution attempt: compute under the read lock, lock the
    /// affected modules, then apply under the write lock
    ///
    /// Fails with `StaleGraph` if the database changed in between.
    async fn resolve_once(&self, modules: &[ModuleId], mode: ResolveMode) -> Result<ResolutionReport, ModuleError> {
        let (delta, affected) = {
            let db = self.database.read().await;
            let mut triggers = Vec::with_capacity(modules.len());
            for &id in modules {
                match db.current_revision(id) {
                    Some(revision) => triggers.push(revision.id()),
                    None if mode == ResolveMode::Optional => {
                        debug!("Module {} left before it could be resolved", id)
                    }
                    None if db.was_uninstalled(id) => {
                        return Err(ModuleError::InvalidTransition {
                            module: id,
                            state: ModuleState::Uninstalled,
                            operation: "resolve",
                        })
                    }
                    None => return Err(ModuleError::ModuleNotFound(id.to_string())),
                }
            }
            let delta = Resolver::new(&db, &self.config).resolve(&triggers, mode)?;
            let affected: Vec<Arc<Module>> = delta
                .revisions
                .iter()
                .filter_map(|r| db.owner(*r).cloned())
                .collect();
            (delta, affected)
        };
        if delta.is_empty() {
            return Ok(delta.unresolved);
        }

        let locked = sorted_unique(affected.clone());
        let _guards = lock_all(&locked).await;
        let mut resolved = Vec::with_capacity(affected.len());
        {
            let mut db = self.database.write().await;
            db.apply_wiring(&delta)?;
            for module in &affected {
                if module.state() == ModuleState::Installed {
                    module.set_state(ModuleState::Resolved);
                    resolved.push(module);
                }
            }
        }

        for module in resolved {
            info!("Module {} resolved", module);
            self.publish(module, ModuleEventType::Resolved).await;
        }
        Ok(delta.unresolved)
    }

    /// Start a module, resolving it first if needed
    ///
    /// A concurrent start of the same module either waits for it to become
    /// ACTIVE or finds it ACTIVE; the activator runs once.
    pub async fn start(&self, id: ModuleId, options: StartOptions) -> Result<(), ModuleError> {
        let module = self.module_or_err(id, "start").await?;

        for _ in 0..self.config.resolver.max_attempts {
            match module.state() {
                ModuleState::Uninstalled => return Err(invalid_transition(&module, "start")),
                ModuleState::Installed => self.resolve(&[id]).await?,
                _ => {}
            }

            let _guard = module.lock_transition().await;
            match module.state() {
                ModuleState::Active => {
                    if !options.contains(StartOptions::TRANSIENT) {
                        module.insert_settings(Settings::AUTO_START);
                    }
                    return Ok(());
                }
                ModuleState::Resolved | ModuleState::LazyStarting => {
                    return self.start_locked(&module, options).await;
                }
                // refreshed between resolve and lock
                ModuleState::Installed => continue,
                _ => return Err(invalid_transition(&module, "start")),
            }
        }
        Err(ModuleError::StaleGraph(format!(
            "module {} kept being unresolved while starting",
            id
        )))
    }

    /// Transition lock must be held
    pub(super) async fn start_locked(&self, module: &Module, options: StartOptions) -> Result<(), ModuleError> {
        if !options.contains(StartOptions::TRANSIENT) {
            module.insert_settings(Settings::AUTO_START);
            if options.contains(StartOptions::USE_ACTIVATION_POLICY) {
                module.insert_settings(Settings::USE_ACTIVATION_POLICY);
            } else {
                module.remove_settings(Settings::USE_ACTIVATION_POLICY);
            }
        }

        let lazy = options.contains(StartOptions::USE_ACTIVATION_POLICY)
            && self
                .current_revision(module.id())
                .await
                .map(|r| r.lazy_activation())
                .unwrap_or(false);
        if lazy {
            if module.state() == ModuleState::Resolved {
                module.set_state(ModuleState::LazyStarting);
                debug!("Module {} waiting for lazy activation", module);
                self.publish(module, ModuleEventType::LazyActivation).await;
            }
            return Ok(());
        }

        self.activate(module).await
    }

    /// Complete a lazy start: LAZY_STARTING → STARTING → ACTIVE
    pub async fn trigger_lazy_activation(&self, id: ModuleId) -> Result<(), ModuleError> {
        let module = self.module_or_err(id, "activate").await?;
        let _guard = module.lock_transition().await;
        match module.state() {
            ModuleState::LazyStarting => self.activate(&module).await,
            ModuleState::Active => Ok(()),
            _ => Err(invalid_transition(&module, "activate")),
        }
    }

    /// RESOLVED or LAZY_STARTING → STARTING → ACTIVE, rolling back to
    /// RESOLVED when the activator fails
    async fn activate(&self, module: &Module) -> Result<(), ModuleError> {
        module.set_state(ModuleState::Starting);
        self.publish(module, ModuleEventType::Starting).await;

        match self.call_activator(module, true).await {
            Ok(()) => {
                module.set_state(ModuleState::Active);
                info!("Module {} started", module);
                self.publish(module, ModuleEventType::Started).await;
                Ok(())
            }
            Err(e) => {
                warn!("Module {} failed to start: {}", module, e);
                module.set_state(ModuleState::Stopping);
                self.publish(module, ModuleEventType::Stopping).await;
                module.set_state(ModuleState::Resolved);
                self.publish(module, ModuleEventType::Stopped).await;
                self.publish_error(module.id(), &e).await;
                Err(e)
            }
        }
    }

    /// Stop a module: ACTIVE → STOPPING → RESOLVED
    ///
    /// Stopping a module that is not active only updates its settings.
    pub async fn stop(&self, id: ModuleId, options: StopOptions) -> Result<(), ModuleError> {
        let module = self.module_or_err(id, "stop").await?;
        let _guard = module.lock_transition().await;
        match module.state() {
            ModuleState::Uninstalled => Err(invalid_transition(&module, "stop")),
            ModuleState::Active | ModuleState::LazyStarting => self.stop_locked(&module, options).await,
            _ => {
                if !options.contains(StopOptions::TRANSIENT) {
                    module.remove_settings(Settings::AUTO_START);
                }
                Ok(())
            }
        }
    }

    /// Transition lock must be held and the module ACTIVE or LAZY_STARTING
    ///
    /// The module reaches RESOLVED even if its activator fails; the failure
    /// is reported afterwards.
    pub(super) async fn stop_locked(&self, module: &Module, options: StopOptions) -> Result<(), ModuleError> {
        if !options.contains(StopOptions::TRANSIENT) {
            module.remove_settings(Settings::AUTO_START);
        }

        let was_active = module.state() == ModuleState::Active;
        module.set_state(ModuleState::Stopping);
        self.publish(module, ModuleEventType::Stopping).await;

        let result = if was_active {
            self.call_activator(module, false).await
        } else {
            Ok(())
        };

        module.set_state(ModuleState::Resolved);
        info!("Module {} stopped", module);
        self.publish(module, ModuleEventType::Stopped).await;

        if let Err(e) = &result {
            warn!("Module {} failed to stop cleanly: {}", module, e);
            self.publish_error(module.id(), e).await;
        }
        result
    }

    async fn call_activator(&self, module: &Module, starting: bool) -> Result<(), ModuleError> {
        let activator = Arc::clone(module.activator());
        let call = async {
            if starting {
                activator.start(module).await
            } else {
                activator.stop(module).await
            }
        };
        match with_optional_timeout(call, self.config.lifecycle.activator_timeout()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ModuleError::ActivationFailed {
                module: module.id(),
                reason: format!("{:#}", e),
            }),
            Err(_) => Err(ModuleError::ActivationFailed {
                module: module.id(),
                reason: ModuleError::Timeout.to_string(),
            }),
        }
    }

    /// Start the system module, then every auto-start module in start level
    /// order, and announce the container as started
    pub async fn launch(&self) -> Result<(), ModuleError> {
        info!("Launching module container");
        self.start(0, StartOptions::TRANSIENT).await?;

        let report = self.resolve_all().await?;
        if !report.is_empty() {
            warn!("Modules left unresolved at launch: {}", report);
        }

        let mut auto_start: Vec<Arc<Module>> = self
            .modules()
            .await
            .into_iter()
            .filter(|m| !m.is_system() && m.settings().contains(Settings::AUTO_START))
            .collect();
        auto_start.sort_by_key(|m| (m.start_level(), m.id()));

        for module in auto_start {
            let mut options = StartOptions::TRANSIENT;
            if module.settings().contains(Settings::USE_ACTIVATION_POLICY) {
                options |= StartOptions::USE_ACTIVATION_POLICY;
            }
            match self.start(module.id(), options).await {
                Ok(()) => {}
                // already reported by the activation rollback
                Err(ModuleError::ActivationFailed { .. }) => {}
                Err(e) => {
                    warn!("Failed to start module {}: {}", module, e);
                    self.publish_error(module.id(), &e).await;
                }
            }
        }

        self.events
            .publish_container_event(ContainerEvent::new(ContainerEventType::Started).with_module(0))
            .await;
        info!("Module container launched");
        Ok(())
    }

    /// Stop every active module in reverse start order, then the system
    /// module, and announce the container as stopped
    pub async fn shutdown(&self) -> Result<(), ModuleError> {
        info!("Shutting down module container");

        let mut active: Vec<Arc<Module>> = self
            .modules()
            .await
            .into_iter()
            .filter(|m| !m.is_system() && matches!(m.state(), ModuleState::Active | ModuleState::LazyStarting))
            .collect();
        active.sort_by_key(|m| std::cmp::Reverse((m.start_level(), m.id())));

        for module in active {
            if let Err(e) = self.stop(module.id(), StopOptions::TRANSIENT).await {
                warn!("Error stopping module {}: {}", module, e);
            }
        }
        if let Err(e) = self.stop(0, StopOptions::TRANSIENT).await {
            warn!("Error stopping system module: {}", e);
        }

        self.events
            .publish_container_event(ContainerEvent::new(ContainerEventType::Stopped).with_module(0))
            .await;
        info!("Module container shut down");
        Ok(())
    }
}

/// Restart `modules` after a structural change, ascending start level
pub(super) async fn restart_all(container: &ModuleContainer, mut modules: Vec<Arc<Module>>) {
    modules.sort_by_key(|m| (m.start_level(), m.id()));
    for module in modules {
        let mut options = StartOptions::TRANSIENT;
        if module.settings().contains(Settings::USE_ACTIVATION_POLICY) {
            options |= StartOptions::USE_ACTIVATION_POLICY;
        }
        match container.start(module.id(), options).await {
            Ok(()) | Err(ModuleError::ActivationFailed { .. }) => {}
            Err(e) => {
                warn!("Failed to restart module {}: {}", module, e);
                container.publish_error(module.id(), &e).await;
            }
        }
    }
}
