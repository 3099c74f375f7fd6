use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use farmstock_core::{AggregateId, TenantId};
use farmstock_events::EventEnvelope;
use farmstock_inventory::InventoryItemId;
use farmstock_sales::{SaleEvent, SaleId, SaleStatus};

use crate::read_model::TenantStore;

/// Queryable sales read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleReadModel {
    pub sale_id: SaleId,
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub unit_price: u64,
    pub total_amount: u64,
    pub buyer: Option<String>,
    pub status: SaleStatus,
    pub recorded_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum SalesProjectionError {
    #[error("failed to deserialize sale event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Sales projection: one row per sale, cancellation folded in.
#[derive(Debug)]
pub struct SalesProjection<S>
where
    S: TenantStore<SaleId, SaleReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> SalesProjection<S>
where
    S: TenantStore<SaleId, SaleReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, sale_id: &SaleId) -> Option<SaleReadModel> {
        self.store.get(tenant_id, sale_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<SaleReadModel> {
        self.store.list(tenant_id)
    }

    /// Apply a published envelope into the projection (idempotent by cursor).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SalesProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                tenant_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(SalesProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(SalesProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let sale_event: SaleEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| SalesProjectionError::Deserialize(e.to_string()))?;

            let (event_tenant, sale_id) = match &sale_event {
                SaleEvent::SaleRecorded(e) => (e.tenant_id, e.sale_id),
                SaleEvent::SaleCancelled(e) => (e.tenant_id, e.sale_id),
            };

            if event_tenant != tenant_id {
                return Err(SalesProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if sale_id.0 != aggregate_id {
                return Err(SalesProjectionError::TenantIsolation(
                    "event sale_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match sale_event {
                SaleEvent::SaleRecorded(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.sale_id,
                        SaleReadModel {
                            sale_id: e.sale_id,
                            item_id: e.item_id,
                            quantity: e.quantity,
                            unit_price: e.unit_price,
                            total_amount: (e.quantity as u64).saturating_mul(e.unit_price),
                            buyer: e.buyer,
                            status: SaleStatus::Recorded,
                            recorded_at: e.occurred_at,
                            cancelled_at: None,
                        },
                    );
                }
                SaleEvent::SaleCancelled(e) => {
                    if let Some(mut rm) = self.store.get(tenant_id, &e.sale_id) {
                        rm.status = SaleStatus::Cancelled;
                        rm.cancelled_at = Some(e.occurred_at);
                        self.store.upsert(tenant_id, e.sale_id, rm);
                    }
                }
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), SalesProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
            }
        }

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
