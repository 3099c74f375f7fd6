//! Sales domain module (event-sourced).
//!
//! A sale is a thin record of an outbound transaction against an inventory
//! item. Stock consequences are not decided here: the caller records the
//! corresponding inventory movement first, and only then records the sale.
//! Cancelling a sale likewise restores stock through a RETURN movement.

pub mod sale;

pub use sale::{
    CancelSale, RecordSale, Sale, SaleCancelled, SaleCommand, SaleEvent, SaleId, SaleRecorded,
    SaleStatus,
};
