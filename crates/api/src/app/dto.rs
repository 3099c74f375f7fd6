use chrono::{DateTime, Utc};
use serde::Deserialize;

use farmstock_infra::projections::inventory_stock::{InventoryReadModel, MovementEntry};
use farmstock_infra::projections::sales::SaleReadModel;
use farmstock_inventory::{
    InventoryItem, ItemCategory, MovementRecorded, MovementReference, MovementType,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub category: ItemCategory,
    pub unit: String,
    #[serde(default)]
    pub initial_quantity: i64,
    pub min_quantity: Option<i64>,
    pub unit_cost: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub movement_type: MovementType,
    pub quantity: i64,
    pub notes: Option<String>,
    pub reference: Option<MovementReference>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub min_quantity: Option<i64>,
    pub unit_cost: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordSaleRequest {
    pub item_id: String,
    pub quantity: i64,
    pub unit_price: u64,
    pub buyer: Option<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn inventory_to_json(rm: InventoryReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.item_id.0.to_string(),
        "name": rm.name,
        "category": category_str(rm.category),
        "unit": rm.unit,
        "quantity": rm.quantity,
        "min_quantity": rm.min_quantity,
        "unit_cost": rm.unit_cost,
        "status": rm.status().to_string(),
        "total_value": rm.total_value(),
        "expires_at": rm.expires_at.map(|d| d.to_rfc3339()),
        "batch": rm.batch,
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn movement_to_json(entry: &MovementEntry) -> serde_json::Value {
    serde_json::json!({
        "movement_type": entry.movement_type.as_str(),
        "direction": match entry.movement_type.direction() {
            farmstock_inventory::MovementDirection::Inbound => "IN",
            farmstock_inventory::MovementDirection::Outbound => "OUT",
        },
        "quantity": entry.quantity,
        "previous_quantity": entry.previous_quantity,
        "new_quantity": entry.new_quantity,
        "notes": entry.notes,
        "reference": entry.reference,
        "occurred_at": entry.occurred_at.to_rfc3339(),
    })
}

/// The ledger line just committed, straight from the event payload.
pub fn movement_event_to_json(ev: &MovementRecorded) -> serde_json::Value {
    serde_json::json!({
        "movement_type": ev.movement_type.as_str(),
        "direction": match ev.movement_type.direction() {
            farmstock_inventory::MovementDirection::Inbound => "IN",
            farmstock_inventory::MovementDirection::Outbound => "OUT",
        },
        "quantity": ev.quantity,
        "previous_quantity": ev.previous_quantity,
        "new_quantity": ev.new_quantity,
        "notes": ev.notes,
        "reference": ev.reference,
        "occurred_at": ev.occurred_at.to_rfc3339(),
    })
}

/// Strongly consistent stock snapshot, rehydrated straight from the ledger.
pub fn stock_to_json(item: &InventoryItem, stream_version: u64) -> serde_json::Value {
    serde_json::json!({
        "id": item.id_typed().to_string(),
        "quantity": item.quantity(),
        "status": item.status().to_string(),
        "total_value": item.total_value(),
        "stream_version": stream_version,
    })
}

pub fn sale_to_json(rm: SaleReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.sale_id.0.to_string(),
        "item_id": rm.item_id.0.to_string(),
        "quantity": rm.quantity,
        "unit_price": rm.unit_price,
        "total_amount": rm.total_amount,
        "buyer": rm.buyer,
        "status": format!("{:?}", rm.status).to_lowercase(),
        "recorded_at": rm.recorded_at.to_rfc3339(),
        "cancelled_at": rm.cancelled_at.map(|d| d.to_rfc3339()),
    })
}

fn category_str(category: ItemCategory) -> &'static str {
    match category {
        ItemCategory::Seeds => "seeds",
        ItemCategory::Fertilizer => "fertilizer",
        ItemCategory::Feed => "feed",
        ItemCategory::Pesticide => "pesticide",
        ItemCategory::Equipment => "equipment",
        ItemCategory::Fuel => "fuel",
        ItemCategory::Veterinary => "veterinary",
        ItemCategory::Other => "other",
    }
}
