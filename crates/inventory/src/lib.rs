//! Inventory ledger domain module (event-sourced).
//!
//! This crate contains the business rules for the inventory stock ledger,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). A `MovementRecorded` event is a ledger line; on-hand quantity is
//! the fold of the item's event stream, and stock status is derived on read.

pub mod item;
pub mod movement;
pub mod status;

pub use item::{
    CreateItem, DeleteItem, DetailsUpdated, InventoryCommand, InventoryEvent, InventoryItem,
    InventoryItemId, ItemCategory, ItemCreated, ItemDeleted, MovementRecorded, RecordMovement,
    UpdateDetails, total_value,
};
pub use movement::{MovementDirection, MovementReference, MovementType};
pub use status::StockStatus;
