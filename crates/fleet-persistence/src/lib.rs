//! Persistence Port: an append-only event log plus upsertable current-status
//! documents, behind a logical trait with no schema prescribed.

pub mod memory;
pub mod port;

pub use memory::InMemoryPersistence;
pub use port::{FactoryStatusDoc, PersistencePort};
