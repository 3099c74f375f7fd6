use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use farmstock_core::{AggregateId, TenantId};
use farmstock_events::EventEnvelope;
use farmstock_inventory::{
    InventoryEvent, InventoryItemId, ItemCategory, MovementReference, MovementType, StockStatus,
    total_value,
};

use crate::read_model::TenantStore;

/// One ledger line in the read model, in recording order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementEntry {
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub notes: Option<String>,
    pub reference: Option<MovementReference>,
    pub occurred_at: DateTime<Utc>,
}

/// Queryable inventory read model: current item state plus its movement log.
///
/// `status` and `total_value` are not fields here on purpose; they are
/// derived at query time so a stale projection can never misreport them
/// relative to the quantity it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryReadModel {
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: ItemCategory,
    pub unit: String,
    pub quantity: i64,
    pub min_quantity: Option<i64>,
    pub unit_cost: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Chronological ledger (oldest first).
    pub movements: Vec<MovementEntry>,
}

impl InventoryReadModel {
    pub fn status(&self) -> StockStatus {
        StockStatus::derive(self.quantity, self.min_quantity)
    }

    pub fn total_value(&self) -> Option<i64> {
        total_value(self.quantity, self.unit_cost)
    }
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum InventoryProjectionError {
    #[error("failed to deserialize inventory event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Inventory stock projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a
/// tenant-isolated read model. Read models are disposable and rebuildable
/// from the event stream.
#[derive(Debug)]
pub struct InventoryStockProjection<S>
where
    S: TenantStore<InventoryItemId, InventoryReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> InventoryStockProjection<S>
where
    S: TenantStore<InventoryItemId, InventoryReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query read model for one tenant/item.
    pub fn get(&self, tenant_id: TenantId, item_id: &InventoryItemId) -> Option<InventoryReadModel> {
        self.store.get(tenant_id, item_id)
    }

    /// List all items for a tenant.
    pub fn list(&self, tenant_id: TenantId) -> Vec<InventoryReadModel> {
        self.store.list(tenant_id)
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces tenant isolation
    /// - Enforces monotonic sequence per (tenant, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), InventoryProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // Cursor check (per tenant + aggregate stream).
        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                tenant_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(InventoryProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                // First event may arrive at any positive sequence; after that
                // we enforce strict monotonic increments.
                return Err(InventoryProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let inv: InventoryEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| InventoryProjectionError::Deserialize(e.to_string()))?;

            // Validate tenant isolation at the event level.
            let (event_tenant, item_id) = match &inv {
                InventoryEvent::ItemCreated(e) => (e.tenant_id, e.item_id),
                InventoryEvent::MovementRecorded(e) => (e.tenant_id, e.item_id),
                InventoryEvent::DetailsUpdated(e) => (e.tenant_id, e.item_id),
                InventoryEvent::ItemDeleted(e) => (e.tenant_id, e.item_id),
            };

            if event_tenant != tenant_id {
                return Err(InventoryProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if item_id.0 != aggregate_id {
                return Err(InventoryProjectionError::TenantIsolation(
                    "event item_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match inv {
                InventoryEvent::ItemCreated(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.item_id,
                        InventoryReadModel {
                            item_id: e.item_id,
                            name: e.name,
                            category: e.category,
                            unit: e.unit,
                            quantity: e.initial_quantity,
                            min_quantity: e.min_quantity,
                            unit_cost: e.unit_cost,
                            expires_at: e.expires_at,
                            batch: e.batch,
                            created_at: e.occurred_at,
                            updated_at: e.occurred_at,
                            movements: Vec::new(),
                        },
                    );
                }
                InventoryEvent::MovementRecorded(e) => {
                    if let Some(mut rm) = self.store.get(tenant_id, &e.item_id) {
                        rm.quantity = e.new_quantity;
                        rm.updated_at = e.occurred_at;
                        rm.movements.push(MovementEntry {
                            movement_type: e.movement_type,
                            quantity: e.quantity,
                            previous_quantity: e.previous_quantity,
                            new_quantity: e.new_quantity,
                            notes: e.notes,
                            reference: e.reference,
                            occurred_at: e.occurred_at,
                        });
                        self.store.upsert(tenant_id, e.item_id, rm);
                    }
                }
                InventoryEvent::DetailsUpdated(e) => {
                    if let Some(mut rm) = self.store.get(tenant_id, &e.item_id) {
                        if let Some(name) = e.name {
                            rm.name = name;
                        }
                        if let Some(min) = e.min_quantity {
                            rm.min_quantity = Some(min);
                        }
                        if let Some(cost) = e.unit_cost {
                            rm.unit_cost = Some(cost);
                        }
                        if let Some(exp) = e.expires_at {
                            rm.expires_at = Some(exp);
                        }
                        if let Some(batch) = e.batch {
                            rm.batch = Some(batch);
                        }
                        rm.updated_at = e.occurred_at;
                        self.store.upsert(tenant_id, e.item_id, rm);
                    }
                }
                InventoryEvent::ItemDeleted(e) => {
                    self.store.remove(tenant_id, &e.item_id);
                }
            }

            // Advance cursor after successful apply.
            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), InventoryProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Clear read model per tenant before rebuilding.
        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
            }
        }

        // Deterministic replay order: tenant, aggregate, sequence.
        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
