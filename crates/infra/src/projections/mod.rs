//! Disposable projections over published event envelopes.
//!
//! Projections consume envelopes (at-least-once), keep a per-stream cursor
//! for idempotency, and can always be rebuilt from the event store.

pub mod inventory_stock;
pub mod sales;

pub use inventory_stock::{
    InventoryProjectionError, InventoryReadModel, InventoryStockProjection, MovementEntry,
};
pub use sales::{SaleReadModel, SalesProjection, SalesProjectionError};
