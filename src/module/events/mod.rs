//! Module and container events

pub mod collector;
pub mod manager;

pub use collector::EventCollector;
pub use manager::{ContainerEvent, EventManager, ListenerId, ModuleEvent};
