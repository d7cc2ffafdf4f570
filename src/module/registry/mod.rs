//! Module registry
//!
//! The module database and the namespace capability index it maintains.

pub mod database;
pub mod index;

pub use database::ModuleDatabase;
pub use index::CapabilityIndex;
