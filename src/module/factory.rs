//! Default module factory

use async_trait::async_trait;
use std::sync::Arc;

use crate::module::instance::Module;
use crate::module::traits::{ModuleActivator, ModuleFactory, ModuleId, Settings};

/// Location of the system module
pub const SYSTEM_MODULE_LOCATION: &str = "System Module";

/// Activator that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivator;

#[async_trait]
impl ModuleActivator for NoopActivator {
    async fn start(&self, _module: &Module) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _module: &Module) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Factory building plain modules that share one activator
pub struct DefaultModuleFactory {
    activator: Arc<dyn ModuleActivator>,
    system_activator: Arc<dyn ModuleActivator>,
}

impl DefaultModuleFactory {
    pub fn new() -> Self {
        Self::with_activator(Arc::new(NoopActivator))
    }

    pub fn with_activator(activator: Arc<dyn ModuleActivator>) -> Self {
        Self {
            activator,
            system_activator: Arc::new(NoopActivator),
        }
    }

    /// Use a dedicated activator for the system module
    pub fn system_activator(mut self, activator: Arc<dyn ModuleActivator>) -> Self {
        self.system_activator = activator;
        self
    }
}

impl Default for DefaultModuleFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleFactory for DefaultModuleFactory {
    fn create_module(&self, location: &str, id: ModuleId, settings: Settings, start_level: u32) -> Module {
        Module::new(id, location, settings, start_level, Arc::clone(&self.activator))
    }

    fn create_system_module(&self) -> Module {
        Module::system(SYSTEM_MODULE_LOCATION, Arc::clone(&self.system_activator))
    }
}
