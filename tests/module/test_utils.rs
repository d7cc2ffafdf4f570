//! Test utilities for module system testing
//!
//! Provides a recording activator, a container fixture and helpers for
//! building revision descriptions and checking event sequences.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modwire::config::ContainerConfig;
use modwire::module::{
    CapabilityDescription, DefaultModuleFactory, Module, ModuleActivator, ModuleContainer, ModuleEvent,
    ModuleEventType, ModuleId, RequirementDescription, RevisionDescription,
};

/// Activator that records every call and fails on demand
#[derive(Default)]
pub struct RecordingActivator {
    starts: Mutex<Vec<ModuleId>>,
    stops: Mutex<Vec<ModuleId>>,
    failing_starts: Mutex<HashSet<ModuleId>>,
    failing_stops: Mutex<HashSet<ModuleId>>,
    start_delay: Option<Duration>,
}

impl RecordingActivator {
    /// Activator whose start takes `delay`
    pub fn slow(delay: Duration) -> Self {
        Self {
            start_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn fail_start(&self, module: ModuleId) {
        self.failing_starts.lock().unwrap().insert(module);
    }

    pub fn fail_stop(&self, module: ModuleId) {
        self.failing_stops.lock().unwrap().insert(module);
    }

    /// Modules started so far, in call order
    pub fn starts(&self) -> Vec<ModuleId> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<ModuleId> {
        self.stops.lock().unwrap().clone()
    }

    pub fn start_count(&self, module: ModuleId) -> usize {
        self.starts().iter().filter(|id| **id == module).count()
    }
}

#[async_trait]
impl ModuleActivator for RecordingActivator {
    async fn start(&self, module: &Module) -> anyhow::Result<()> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        self.starts.lock().unwrap().push(module.id());
        if self.failing_starts.lock().unwrap().contains(&module.id()) {
            anyhow::bail!("activator refused to start module {}", module.id());
        }
        Ok(())
    }

    async fn stop(&self, module: &Module) -> anyhow::Result<()> {
        self.stops.lock().unwrap().push(module.id());
        if self.failing_stops.lock().unwrap().contains(&module.id()) {
            anyhow::bail!("activator refused to stop module {}", module.id());
        }
        Ok(())
    }
}

/// Test fixture for module container tests
pub struct ContainerFixture {
    pub container: Arc<ModuleContainer>,
    pub activator: Arc<RecordingActivator>,
}

impl ContainerFixture {
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self::with_activator(config, RecordingActivator::default())
    }

    pub fn with_activator(config: ContainerConfig, activator: RecordingActivator) -> Self {
        let activator = Arc::new(activator);
        let factory = DefaultModuleFactory::with_activator(activator.clone());
        let container = ModuleContainer::new(config, Arc::new(factory), RevisionDescription::new()).unwrap();
        Self {
            container: Arc::new(container),
            activator,
        }
    }

    /// Install a module and return its id
    pub async fn install(&self, location: &str, description: RevisionDescription) -> ModuleId {
        self.container.install(location, &description).await.unwrap().id()
    }
}

/// Revision providing `namespace` with `name=<name>`
pub fn provider(namespace: &str, name: &str) -> RevisionDescription {
    RevisionDescription::new().with_capability(CapabilityDescription::new(namespace).attribute("name", name))
}

/// Revision requiring `namespace` matching `filter`
pub fn consumer(namespace: &str, filter: &str) -> RevisionDescription {
    RevisionDescription::new().with_requirement(RequirementDescription::new(namespace).filter(filter))
}

/// Event types published for one module, in order
pub fn event_types(events: &[ModuleEvent], module: ModuleId) -> Vec<ModuleEventType> {
    events
        .iter()
        .filter(|e| e.module == module)
        .map(|e| e.event_type)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observed {
    Installed,
    Resolved,
    LazyStarting,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

/// Whether `types` is a prefix of a valid lifecycle path starting at install
///
/// Nothing may follow `Uninstalled`.
pub fn is_valid_event_sequence(types: &[ModuleEventType]) -> bool {
    use ModuleEventType as T;
    use Observed as S;

    let mut state: Option<Observed> = None;
    for event in types {
        let next = match (state, event) {
            (None, T::Installed) => S::Installed,
            (Some(S::Installed), T::Resolved) => S::Resolved,
            (Some(S::Installed), T::Updated) => S::Installed,
            (Some(S::Resolved), T::Unresolved) => S::Installed,
            (Some(S::Resolved), T::LazyActivation) => S::LazyStarting,
            (Some(S::Resolved | S::LazyStarting), T::Starting) => S::Starting,
            (Some(S::Starting), T::Started) => S::Active,
            (Some(S::Active | S::Starting | S::LazyStarting), T::Stopping) => S::Stopping,
            (Some(S::Stopping), T::Stopped) => S::Resolved,
            (Some(S::Installed), T::Uninstalled) => S::Uninstalled,
            _ => return false,
        };
        state = Some(next);
    }
    true
}
