//! Module entity
//!
//! A module is identified by id and location, carries its settings and
//! start level, and owns the lock that serializes its state transitions.
//! Revisions live in the module database, not here.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::module::traits::{ModuleActivator, ModuleId, ModuleState, Settings};

/// An installed unit tracked by the container
pub struct Module {
    id: ModuleId,
    location: String,
    start_level: u32,
    system: bool,
    settings: AtomicU8,
    state: AtomicU8,
    activator: Arc<dyn ModuleActivator>,
    /// Held for the whole of a state transition
    transition: Mutex<()>,
}

impl Module {
    /// Create a module in INSTALLED
    pub fn new(
        id: ModuleId,
        location: impl Into<String>,
        settings: Settings,
        start_level: u32,
        activator: Arc<dyn ModuleActivator>,
    ) -> Self {
        Self {
            id,
            location: location.into(),
            start_level,
            system: false,
            settings: AtomicU8::new(settings.bits()),
            state: AtomicU8::new(ModuleState::Installed as u8),
            activator,
            transition: Mutex::new(()),
        }
    }

    /// Create the system module (id 0, start level 0)
    pub fn system(location: impl Into<String>, activator: Arc<dyn ModuleActivator>) -> Self {
        let mut module = Self::new(0, location, Settings::empty(), 0, activator);
        module.system = true;
        module
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn start_level(&self) -> u32 {
        self.start_level
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Current lifecycle state; never blocks
    pub fn state(&self) -> ModuleState {
        ModuleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn settings(&self) -> Settings {
        Settings::from_bits_truncate(self.settings.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ModuleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn insert_settings(&self, settings: Settings) {
        self.settings.fetch_or(settings.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove_settings(&self, settings: Settings) {
        self.settings.fetch_and(!settings.bits(), Ordering::AcqRel);
    }

    pub(crate) fn activator(&self) -> &Arc<dyn ModuleActivator> {
        &self.activator
    }

    /// Acquire the transition lock
    pub(crate) async fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().await
    }

    pub(crate) fn try_lock_transition(&self) -> Option<MutexGuard<'_, ()>> {
        self.transition.try_lock().ok()
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Module {}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("state", &self.state())
            .field("settings", &self.settings())
            .field("start_level", &self.start_level)
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.location, self.id)
    }
}
