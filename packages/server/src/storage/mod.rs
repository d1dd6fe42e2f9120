//! Storage backends for the collaborator traits.
//!
//! - [`memory`]: `DashMap`-backed store implementing every store trait
//! - [`fixtures`]: JSON seed data for the in-memory store

pub mod fixtures;
pub mod memory;

pub use fixtures::Fixtures;
pub use memory::InMemoryStore;
