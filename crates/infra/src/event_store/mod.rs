//! Append-only event store boundary.
//!
//! Stores and loads tenant-scoped event streams without making storage
//! assumptions. The stream for an inventory item doubles as its stock
//! ledger, so append-only here is what makes ledger lines immutable.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
