use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use farmstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use farmstock_events::Event;

use crate::movement::{MovementDirection, MovementReference, MovementType};
use crate::status::StockStatus;

/// Inventory item identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Farm inventory categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Seeds,
    Fertilizer,
    Feed,
    Pesticide,
    Equipment,
    Fuel,
    Veterinary,
    Other,
}

/// Total inventory value in minor currency units, if a unit cost is known.
///
/// `None` when no unit cost is set or the multiply would overflow.
pub fn total_value(quantity: i64, unit_cost: Option<i64>) -> Option<i64> {
    unit_cost.and_then(|cost| quantity.checked_mul(cost))
}

/// Aggregate root: InventoryItem.
///
/// The item's event stream is its stock ledger: every quantity change is a
/// `MovementRecorded` event carrying before/after snapshots, and the on-hand
/// quantity is the fold of those events. Quantity is written directly only at
/// creation; all later stock changes go through `RecordMovement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    tenant_id: Option<TenantId>,
    name: String,
    category: ItemCategory,
    unit: String,
    quantity: i64,
    min_quantity: Option<i64>,
    unit_cost: Option<i64>,
    expires_at: Option<DateTime<Utc>>,
    batch: Option<String>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            category: ItemCategory::Other,
            unit: String::new(),
            quantity: 0,
            min_quantity: None,
            unit_cost: None,
            expires_at: None,
            batch: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    /// Whether the item exists and has not been deleted.
    pub fn is_live(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn min_quantity(&self) -> Option<i64> {
        self.min_quantity
    }

    pub fn unit_cost(&self) -> Option<i64> {
        self.unit_cost
    }

    /// Derived stock status (never stored).
    pub fn status(&self) -> StockStatus {
        StockStatus::derive(self.quantity, self.min_quantity)
    }

    /// Derived total value (never stored).
    pub fn total_value(&self) -> Option<i64> {
        total_value(self.quantity, self.unit_cost)
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: ItemCategory,
    pub unit: String,
    pub initial_quantity: i64,
    pub min_quantity: Option<i64>,
    pub unit_cost: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement — the single entry point for all stock changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_type: MovementType,
    /// Positive magnitude; direction is implied by `movement_type`.
    pub quantity: i64,
    pub notes: Option<String>,
    pub reference: Option<MovementReference>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails (metadata only — never touches stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub name: Option<String>,
    pub min_quantity: Option<i64>,
    pub unit_cost: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteItem (hard delete by the owner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    RecordMovement(RecordMovement),
    UpdateDetails(UpdateDetails),
    DeleteItem(DeleteItem),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: ItemCategory,
    pub unit: String,
    pub initial_quantity: i64,
    pub min_quantity: Option<i64>,
    pub unit_cost: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementRecorded — one immutable ledger line.
///
/// Invariant: `new_quantity = previous_quantity ± quantity` per the movement
/// type's direction, and `new_quantity >= 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub notes: Option<String>,
    pub reference: Option<MovementReference>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsUpdated {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub name: Option<String>,
    pub min_quantity: Option<i64>,
    pub unit_cost: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub batch: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeleted {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    MovementRecorded(MovementRecorded),
    DetailsUpdated(DetailsUpdated),
    ItemDeleted(ItemDeleted),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::MovementRecorded(_) => "inventory.item.movement_recorded",
            InventoryEvent::DetailsUpdated(_) => "inventory.item.details_updated",
            InventoryEvent::ItemDeleted(_) => "inventory.item.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::MovementRecorded(e) => e.occurred_at,
            InventoryEvent::DetailsUpdated(e) => e.occurred_at,
            InventoryEvent::ItemDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.category = e.category;
                self.unit = e.unit.clone();
                self.quantity = e.initial_quantity;
                self.min_quantity = e.min_quantity;
                self.unit_cost = e.unit_cost;
                self.expires_at = e.expires_at;
                self.batch = e.batch.clone();
                self.created = true;
            }
            InventoryEvent::MovementRecorded(e) => {
                self.quantity = e.new_quantity;
            }
            InventoryEvent::DetailsUpdated(e) => {
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(min) = e.min_quantity {
                    self.min_quantity = Some(min);
                }
                if let Some(cost) = e.unit_cost {
                    self.unit_cost = Some(cost);
                }
                if let Some(exp) = e.expires_at {
                    self.expires_at = Some(exp);
                }
                if let Some(batch) = &e.batch {
                    self.batch = Some(batch.clone());
                }
            }
            InventoryEvent::ItemDeleted(_) => {
                self.deleted = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::RecordMovement(cmd) => self.handle_movement(cmd),
            InventoryCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            InventoryCommand::DeleteItem(cmd) => self.handle_delete(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_item_id(&self, item_id: InventoryItemId) -> Result<(), DomainError> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.initial_quantity < 0 {
            return Err(DomainError::validation("initial quantity cannot be negative"));
        }
        if cmd.min_quantity.is_some_and(|m| m < 0) {
            return Err(DomainError::validation("min quantity cannot be negative"));
        }
        if cmd.unit_cost.is_some_and(|c| c < 0) {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            name: cmd.name.clone(),
            category: cmd.category,
            unit: cmd.unit.clone(),
            initial_quantity: cmd.initial_quantity,
            min_quantity: cmd.min_quantity,
            unit_cost: cmd.unit_cost,
            expires_at: cmd.expires_at,
            batch: cmd.batch.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Decide a stock movement.
    ///
    /// All-or-nothing: any failure here means no event is emitted, so neither
    /// the quantity nor the ledger can change. The insufficient-stock policy
    /// is a hard reject — never clamp to zero, which would falsify the
    /// before/after arithmetic of the ledger line.
    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("movement quantity must be positive"));
        }

        let previous_quantity = self.quantity;
        let new_quantity = match cmd.movement_type.direction() {
            MovementDirection::Inbound => previous_quantity
                .checked_add(cmd.quantity)
                .ok_or_else(|| DomainError::validation("quantity overflow"))?,
            MovementDirection::Outbound => {
                if cmd.quantity > previous_quantity {
                    return Err(DomainError::insufficient_stock(
                        previous_quantity,
                        cmd.quantity,
                    ));
                }
                previous_quantity - cmd.quantity
            }
        };

        Ok(vec![InventoryEvent::MovementRecorded(MovementRecorded {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            movement_type: cmd.movement_type,
            quantity: cmd.quantity,
            previous_quantity,
            new_quantity,
            notes: cmd.notes.clone(),
            reference: cmd.reference,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.min_quantity.is_some_and(|m| m < 0) {
            return Err(DomainError::validation("min quantity cannot be negative"));
        }
        if cmd.unit_cost.is_some_and(|c| c < 0) {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        if cmd.name.is_none()
            && cmd.min_quantity.is_none()
            && cmd.unit_cost.is_none()
            && cmd.expires_at.is_none()
            && cmd.batch.is_none()
        {
            return Err(DomainError::validation("no fields to update"));
        }

        Ok(vec![InventoryEvent::DetailsUpdated(DetailsUpdated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            name: cmd.name.clone(),
            min_quantity: cmd.min_quantity,
            unit_cost: cmd.unit_cost,
            expires_at: cmd.expires_at,
            batch: cmd.batch.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteItem) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_item_id(cmd.item_id)?;

        Ok(vec![InventoryEvent::ItemDeleted(ItemDeleted {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
