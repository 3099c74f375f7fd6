use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use farmstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use farmstock_events::Event;
use farmstock_inventory::InventoryItemId;

/// Sale identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sale lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Recorded,
    Cancelled,
}

/// Aggregate root: Sale.
///
/// Holds the commercial facts of a single outbound transaction. The matching
/// stock decrement lives in the inventory item's ledger, tagged with this
/// sale's id; cancellation is compensated there by a RETURN movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    tenant_id: Option<TenantId>,
    item_id: Option<InventoryItemId>,
    quantity: i64,
    unit_price: u64,
    buyer: Option<String>,
    status: SaleStatus,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            tenant_id: None,
            item_id: None,
            quantity: 0,
            unit_price: 0,
            buyer: None,
            status: SaleStatus::Recorded,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn item_id(&self) -> Option<InventoryItemId> {
        self.item_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn buyer(&self) -> Option<&str> {
        self.buyer.as_deref()
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    /// Total amount in minor currency units.
    pub fn total_amount(&self) -> u64 {
        (self.quantity as u64).saturating_mul(self.unit_price)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, SaleStatus::Cancelled)
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub item_id: InventoryItemId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub buyer: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    CancelSale(CancelSale),
}

/// Event: SaleRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub unit_price: u64,
    pub buyer: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleCancelled.
///
/// Carries `item_id` and `quantity` so a consumer can compensate stock
/// without loading the sale's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCancelled {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    SaleCancelled(SaleCancelled),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sales.sale.recorded",
            SaleEvent::SaleCancelled(_) => "sales.sale.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.occurred_at,
            SaleEvent::SaleCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.tenant_id = Some(e.tenant_id);
                self.item_id = Some(e.item_id);
                self.quantity = e.quantity;
                self.unit_price = e.unit_price;
                self.buyer = e.buyer.clone();
                self.status = SaleStatus::Recorded;
                self.created = true;
            }
            SaleEvent::SaleCancelled(_) => {
                self.status = SaleStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => self.handle_record(cmd),
            SaleCommand::CancelSale(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Sale {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_sale_id(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            buyer: cmd.buyer.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelSale) -> Result<Vec<SaleEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_sale_id(cmd.sale_id)?;

        if self.is_cancelled() {
            return Err(DomainError::invariant("sale is already cancelled"));
        }

        let item_id = self
            .item_id
            .ok_or_else(|| DomainError::invariant("sale has no item"))?;

        Ok(vec![SaleEvent::SaleCancelled(SaleCancelled {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            item_id,
            quantity: self.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmstock_core::AggregateId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_sale_id() -> SaleId {
        SaleId::new(AggregateId::new())
    }

    fn test_item_id() -> InventoryItemId {
        InventoryItemId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn recorded_sale(tenant_id: TenantId, sale_id: SaleId, quantity: i64) -> Sale {
        let mut sale = Sale::empty(sale_id);
        let events = sale
            .handle(&SaleCommand::RecordSale(RecordSale {
                tenant_id,
                sale_id,
                item_id: test_item_id(),
                quantity,
                unit_price: 250,
                buyer: Some("Greenfield co-op".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap();
        sale.apply(&events[0]);
        sale
    }

    #[test]
    fn record_sale_emits_sale_recorded_event() {
        let tenant_id = test_tenant_id();
        let sale_id = test_sale_id();
        let item_id = test_item_id();
        let sale = Sale::empty(sale_id);

        let events = sale
            .handle(&SaleCommand::RecordSale(RecordSale {
                tenant_id,
                sale_id,
                item_id,
                quantity: 4,
                unit_price: 250,
                buyer: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            SaleEvent::SaleRecorded(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.sale_id, sale_id);
                assert_eq!(e.item_id, item_id);
                assert_eq!(e.quantity, 4);
                assert_eq!(e.unit_price, 250);
            }
            _ => panic!("Expected SaleRecorded event"),
        }
    }

    #[test]
    fn total_amount_is_quantity_times_unit_price() {
        let sale = recorded_sale(test_tenant_id(), test_sale_id(), 4);
        assert_eq!(sale.total_amount(), 1000);
    }

    #[test]
    fn cancel_carries_item_and_quantity_for_compensation() {
        let tenant_id = test_tenant_id();
        let sale_id = test_sale_id();
        let mut sale = recorded_sale(tenant_id, sale_id, 4);
        let item_id = sale.item_id().unwrap();

        let events = sale
            .handle(&SaleCommand::CancelSale(CancelSale {
                tenant_id,
                sale_id,
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            SaleEvent::SaleCancelled(e) => {
                assert_eq!(e.item_id, item_id);
                assert_eq!(e.quantity, 4);
            }
            _ => panic!("Expected SaleCancelled event"),
        }

        sale.apply(&events[0]);
        assert_eq!(sale.status(), SaleStatus::Cancelled);
    }

    #[test]
    fn cannot_cancel_twice() {
        let tenant_id = test_tenant_id();
        let sale_id = test_sale_id();
        let mut sale = recorded_sale(tenant_id, sale_id, 2);

        let events = sale
            .handle(&SaleCommand::CancelSale(CancelSale {
                tenant_id,
                sale_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        sale.apply(&events[0]);

        let err = sale
            .handle(&SaleCommand::CancelSale(CancelSale {
                tenant_id,
                sale_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("already cancelled") => {}
            _ => panic!("Expected InvariantViolation for double cancel"),
        }
    }

    #[test]
    fn rejects_non_positive_quantity_and_zero_price() {
        let sale = Sale::empty(test_sale_id());
        let base = RecordSale {
            tenant_id: test_tenant_id(),
            sale_id: test_sale_id(),
            item_id: test_item_id(),
            quantity: 0,
            unit_price: 100,
            buyer: None,
            occurred_at: test_time(),
        };

        assert!(sale.handle(&SaleCommand::RecordSale(base.clone())).is_err());

        let zero_price = RecordSale {
            quantity: 1,
            unit_price: 0,
            ..base
        };
        assert!(sale.handle(&SaleCommand::RecordSale(zero_price)).is_err());
    }

    #[test]
    fn tenant_mismatch_on_cancel_is_rejected() {
        let sale_id = test_sale_id();
        let sale = recorded_sale(test_tenant_id(), sale_id, 2);

        let err = sale
            .handle(&SaleCommand::CancelSale(CancelSale {
                tenant_id: test_tenant_id(),
                sale_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn version_increments_on_apply() {
        let tenant_id = test_tenant_id();
        let sale_id = test_sale_id();
        let mut sale = recorded_sale(tenant_id, sale_id, 2);
        assert_eq!(sale.version(), 1);

        let events = sale
            .handle(&SaleCommand::CancelSale(CancelSale {
                tenant_id,
                sale_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        sale.apply(&events[0]);
        assert_eq!(sale.version(), 2);
    }
}
