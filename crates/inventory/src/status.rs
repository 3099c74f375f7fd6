//! Stock-level status, derived from quantity versus the configured minimum.

use serde::{Deserialize, Serialize};

/// Stock-level classification for an inventory item.
///
/// Status is a pure function of `(quantity, min_quantity)` — it is computed
/// on read and never stored, so it can never go stale after a manual edit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// Derive the status for an on-hand quantity and optional minimum threshold.
    ///
    /// `quantity == 0` always wins over the low-stock check: an item with
    /// `min_quantity == Some(0)` and zero on hand is out of stock, not low.
    /// The low-stock rule only applies when a threshold is configured.
    pub fn derive(quantity: i64, min_quantity: Option<i64>) -> Self {
        if quantity == 0 {
            StockStatus::OutOfStock
        } else if min_quantity.is_some_and(|min| quantity <= min) {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StockStatus::InStock => f.write_str("IN_STOCK"),
            StockStatus::LowStock => f.write_str("LOW_STOCK"),
            StockStatus::OutOfStock => f.write_str("OUT_OF_STOCK"),
        }
    }
}
