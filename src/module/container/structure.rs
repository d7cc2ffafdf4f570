//! Structural operations: install, update, uninstall and refresh

use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::module::container::lifecycle::restart_all;
use crate::module::container::{invalid_transition, lock_all, sorted_unique, ModuleContainer};
use crate::module::events::{ContainerEvent, ListenerId};
use crate::module::instance::Module;
use crate::module::model::RevisionDescription;
use crate::module::resolver::{ResolutionReport, ResolveMode};
use crate::module::traits::{
    ContainerEventType, ModuleError, ModuleEventType, ModuleId, ModuleState, Settings, StopOptions,
};
use crate::utils::lock::{with_read_lock, with_write_lock};

impl ModuleContainer {
    /// Install a module at the default start level
    pub async fn install(
        &self,
        location: &str,
        description: &RevisionDescription,
    ) -> Result<Arc<Module>, ModuleError> {
        self.install_at_level(
            location,
            description,
            self.config.lifecycle.default_start_level,
            Settings::empty(),
        )
        .await
    }

    /// Install a module in INSTALLED with an unresolved revision
    ///
    /// Installing at a location that is already installed returns the
    /// existing module and publishes nothing.
    pub async fn install_at_level(
        &self,
        location: &str,
        description: &RevisionDescription,
        start_level: u32,
        settings: Settings,
    ) -> Result<Arc<Module>, ModuleError> {
        description.validate()?;

        let module;
        let _guard;
        {
            let mut db = self.database.write().await;
            if let Some(existing) = db.module_by_location(location) {
                debug!("Module already installed at {}", location);
                return Ok(Arc::clone(existing));
            }
            module = db.create_module(location, settings, start_level);
            // fresh module, nobody else can hold its lock yet
            _guard = module.try_lock_transition();
            db.install(Arc::clone(&module), description)?;
        }

        info!("Installed module {}", module);
        self.publish(&module, ModuleEventType::Installed).await;
        Ok(Arc::clone(&module))
    }

    /// Install a module whose content comes from the configured provider
    pub async fn install_from(&self, location: &str) -> Result<Arc<Module>, ModuleError> {
        if let Some(existing) = self.module_by_location(location).await {
            return Ok(existing);
        }
        let provider = self.content.as_ref().ok_or_else(|| {
            ModuleError::ConfigError(format!("no content provider to install {}", location))
        })?;
        let description = provider.revision_description(location)?;
        self.install(location, &description).await
    }

    /// Replace the current revision of a module
    ///
    /// An active module is stopped first and restarted afterwards; a failed
    /// restart is reported through a container `Error` event only.
    pub async fn update(&self, id: ModuleId, description: &RevisionDescription) -> Result<(), ModuleError> {
        let module = self.module_or_err(id, "update").await?;
        if module.is_system() {
            return Err(invalid_transition(&module, "update"));
        }
        description.validate()?;

        let was_active = {
            let _guard = module.lock_transition().await;
            let state = module.state();
            if state == ModuleState::Uninstalled {
                return Err(invalid_transition(&module, "update"));
            }

            let was_active = matches!(state, ModuleState::Active | ModuleState::LazyStarting);
            if was_active {
                if let Err(e) = self.stop_locked(&module, StopOptions::TRANSIENT).await {
                    warn!("Module {} did not stop cleanly before update: {}", module, e);
                }
            }

            let was_resolved = module.state().is_resolved();
            let revision = with_write_lock(&self.database, |db| db.update(id, description)).await?;

            if was_resolved {
                module.set_state(ModuleState::Installed);
                self.publish(&module, ModuleEventType::Unresolved).await;
            }
            info!("Updated module {} to revision {}", module, revision.id());
            self.publish(&module, ModuleEventType::Updated).await;
            was_active
        };

        if self.config.lifecycle.refresh_on_update {
            self.refresh(&[id], &[]).await?;
        }
        if was_active {
            restart_all(self, vec![module]).await;
        }
        Ok(())
    }

    /// Uninstall a module
    ///
    /// Revisions still wired to by other modules stay removal pending until
    /// those modules are refreshed.
    pub async fn uninstall(&self, id: ModuleId) -> Result<(), ModuleError> {
        let module = self.module_or_err(id, "uninstall").await?;
        if module.is_system() {
            return Err(invalid_transition(&module, "uninstall"));
        }

        let _guard = module.lock_transition().await;
        match module.state() {
            ModuleState::Uninstalled => return Err(invalid_transition(&module, "uninstall")),
            ModuleState::Active | ModuleState::LazyStarting => {
                if let Err(e) = self.stop_locked(&module, StopOptions::TRANSIENT).await {
                    warn!("Module {} did not stop cleanly before uninstall: {}", module, e);
                }
            }
            _ => {}
        }

        let was_resolved = module.state().is_resolved();
        with_write_lock(&self.database, |db| db.uninstall(id)).await?;

        if was_resolved {
            module.set_state(ModuleState::Installed);
            self.publish(&module, ModuleEventType::Unresolved).await;
        }
        module.set_state(ModuleState::Uninstalled);
        info!("Uninstalled module {}", module);
        self.publish(&module, ModuleEventType::Uninstalled).await;
        Ok(())
    }

    /// Unresolve `modules` and everything wired to them, discard stale
    /// revisions, then resolve and restart what is left
    ///
    /// An empty `modules` refreshes every module with removal-pending
    /// revisions. The `Refresh` container event goes to the `notify`
    /// listeners, or to everyone when `notify` is empty.
    pub async fn refresh(
        &self,
        modules: &[ModuleId],
        notify: &[ListenerId],
    ) -> Result<ResolutionReport, ModuleError> {
        let roots: Vec<ModuleId> = if modules.is_empty() {
            with_read_lock(&self.database, |db| db.removal_pending_modules()).await
        } else {
            modules.to_vec()
        };
        for &id in &roots {
            let tracked = with_read_lock(&self.database, |db| db.tracked_module(id).is_some()).await;
            if !tracked {
                return Err(ModuleError::ModuleNotFound(id.to_string()));
            }
        }

        let mut stopped: Vec<Arc<Module>> = Vec::new();
        let mut refreshed = None;
        for attempt in 1..=self.config.resolver.max_attempts.max(1) {
            let affected = sorted_unique(
                with_read_lock(&self.database, |db| {
                    db.dependency_closure(&roots)
                        .iter()
                        .filter_map(|id| db.tracked_module(*id).cloned())
                        .collect()
                })
                .await,
            );
            let _guards = lock_all(&affected).await;

            let mut active: Vec<&Arc<Module>> = affected
                .iter()
                .filter(|m| matches!(m.state(), ModuleState::Active | ModuleState::LazyStarting))
                .collect();
            active.sort_by_key(|m| Reverse((m.start_level(), m.id())));
            for module in active {
                if let Err(e) = self.stop_locked(module, StopOptions::TRANSIENT).await {
                    warn!("Module {} did not stop cleanly during refresh: {}", module, e);
                }
                stopped.push(Arc::clone(module));
            }

            let (closure, unresolved) = {
                let mut db = self.database.write().await;
                let closure = db.dependency_closure(&roots);
                if !closure.iter().all(|id| affected.iter().any(|m| m.id() == *id)) {
                    debug!("Dependency closure changed during refresh (attempt {})", attempt);
                    continue;
                }
                let unresolved = db.refresh(&closure);
                (closure, unresolved)
            };

            for module in affected.iter().filter(|m| unresolved.contains(&m.id())) {
                if module.state().is_resolved() {
                    module.set_state(ModuleState::Installed);
                    self.publish(module, ModuleEventType::Unresolved).await;
                }
            }
            refreshed = Some(closure);
            break;
        }

        let Some(closure) = refreshed else {
            restart_all(self, stopped).await;
            return Err(ModuleError::StaleGraph(
                "dependency closure kept changing during refresh".to_string(),
            ));
        };
        info!("Refreshed {} modules", closure.len());

        self.events
            .publish_container_event(
                ContainerEvent::new(ContainerEventType::Refresh).with_listeners(notify.to_vec()),
            )
            .await;

        let live: Vec<ModuleId> = with_read_lock(&self.database, |db| {
            closure
                .iter()
                .copied()
                .filter(|id| db.module(*id).map(|m| m.state() == ModuleState::Installed).unwrap_or(false))
                .collect()
        })
        .await;
        let report = self.resolve_with_retry(&live, ResolveMode::Optional).await?;

        restart_all(self, stopped).await;
        Ok(report)
    }
}
