use std::sync::Arc;

use farmstock_core::{AggregateId, DomainError, TenantId};
use farmstock_events::{EventBus, EventEnvelope, InMemoryEventBus};
use farmstock_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent},
    projections::{
        inventory_stock::{InventoryReadModel, InventoryStockProjection},
        sales::{SaleReadModel, SalesProjection},
    },
    read_model::InMemoryTenantStore,
};
use farmstock_inventory::InventoryItemId;
use farmstock_sales::SaleId;

#[cfg(feature = "postgres")]
use farmstock_infra::event_store::PostgresEventStore;
#[cfg(feature = "postgres")]
use sqlx::PgPool;

type JsonBus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

type InventoryProjectionHandle =
    Arc<InventoryStockProjection<Arc<InMemoryTenantStore<InventoryItemId, InventoryReadModel>>>>;

type SalesProjectionHandle =
    Arc<SalesProjection<Arc<InMemoryTenantStore<SaleId, SaleReadModel>>>>;

// Type-erased dispatcher for in-memory implementations
type InMemoryDispatcher = CommandDispatcher<Arc<InMemoryEventStore>, JsonBus>;

// Type-erased dispatcher for the persistent event store (bus stays in-process;
// projections are rebuilt from the store on startup)
#[cfg(feature = "postgres")]
type PersistentDispatcher = CommandDispatcher<Arc<PostgresEventStore>, JsonBus>;

#[derive(Clone)]
pub enum AppServices {
    InMemory {
        dispatcher: Arc<InMemoryDispatcher>,
        event_store: Arc<InMemoryEventStore>,
        event_bus: JsonBus,
        inventory_projection: InventoryProjectionHandle,
        sales_projection: SalesProjectionHandle,
    },
    #[cfg(feature = "postgres")]
    Persistent {
        dispatcher: Arc<PersistentDispatcher>,
        event_store: Arc<PostgresEventStore>,
        event_bus: JsonBus,
        inventory_projection: InventoryProjectionHandle,
        sales_projection: SalesProjectionHandle,
    },
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "postgres")]
        {
            return build_persistent_services().await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
            return build_in_memory_services();
        }
    }

    build_in_memory_services()
}

fn build_in_memory_services() -> AppServices {
    // In-memory infra wiring (dev/test): store + bus + projections.
    let store = Arc::new(InMemoryEventStore::new());
    let bus: JsonBus = Arc::new(InMemoryEventBus::new());

    let (inventory_projection, sales_projection) = build_projections();
    spawn_projection_subscriber(&bus, &inventory_projection, &sales_projection);

    let dispatcher: Arc<InMemoryDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
    AppServices::InMemory {
        dispatcher,
        event_store: store,
        event_bus: bus,
        inventory_projection,
        sales_projection,
    }
}

#[cfg(feature = "postgres")]
async fn build_persistent_services() -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    let store = Arc::new(PostgresEventStore::new(pool));
    let bus: JsonBus = Arc::new(InMemoryEventBus::new());

    let (inventory_projection, sales_projection) = build_projections();
    spawn_projection_subscriber(&bus, &inventory_projection, &sales_projection);

    let dispatcher: Arc<PersistentDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
    AppServices::Persistent {
        dispatcher,
        event_store: store,
        event_bus: bus,
        inventory_projection,
        sales_projection,
    }
}

fn build_projections() -> (InventoryProjectionHandle, SalesProjectionHandle) {
    let inventory_store: Arc<InMemoryTenantStore<InventoryItemId, InventoryReadModel>> =
        Arc::new(InMemoryTenantStore::new());
    let inventory_projection: InventoryProjectionHandle =
        Arc::new(InventoryStockProjection::new(inventory_store));

    let sales_store: Arc<InMemoryTenantStore<SaleId, SaleReadModel>> =
        Arc::new(InMemoryTenantStore::new());
    let sales_projection: SalesProjectionHandle = Arc::new(SalesProjection::new(sales_store));

    (inventory_projection, sales_projection)
}

/// Background subscriber: bus -> projections.
///
/// Projections are idempotent by cursor, so delivery is at-least-once and a
/// failed apply is logged and skipped rather than crashing the loop.
fn spawn_projection_subscriber(
    bus: &JsonBus,
    inventory_projection: &InventoryProjectionHandle,
    sales_projection: &SalesProjectionHandle,
) {
    let sub = bus.subscribe();
    let inventory_projection = inventory_projection.clone();
    let sales_projection = sales_projection.clone();
    tokio::task::spawn_blocking(move || {
        loop {
            match sub.recv() {
                Ok(env) => {
                    let at = env.aggregate_type();

                    // Apply to the relevant projection only.
                    let apply_ok = match at {
                        "inventory.item" => inventory_projection
                            .apply_envelope(&env)
                            .map_err(|e| e.to_string()),
                        "sales.sale" => sales_projection
                            .apply_envelope(&env)
                            .map_err(|e| e.to_string()),
                        _ => Ok(()),
                    };

                    if let Err(e) = apply_ok {
                        tracing::warn!("projection apply failed: {e}");
                    }
                }
                Err(_) => break,
            }
        }
    });
}

impl AppServices {
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: farmstock_core::Aggregate<Error = DomainError>,
        A::Event: farmstock_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        match self {
            AppServices::InMemory { dispatcher, .. } => dispatcher.dispatch::<A>(
                tenant_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
            ),
            #[cfg(feature = "postgres")]
            AppServices::Persistent { dispatcher, .. } => dispatcher.dispatch::<A>(
                tenant_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
            ),
        }
    }

    /// Strongly consistent read: rehydrate an aggregate from its stream.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Option<A>, DispatchError>
    where
        A: farmstock_core::Aggregate,
        A::Event: serde::de::DeserializeOwned,
    {
        match self {
            AppServices::InMemory { dispatcher, .. } => {
                dispatcher.load::<A>(tenant_id, aggregate_id, make_aggregate)
            }
            #[cfg(feature = "postgres")]
            AppServices::Persistent { dispatcher, .. } => {
                dispatcher.load::<A>(tenant_id, aggregate_id, make_aggregate)
            }
        }
    }

    /// Strongly consistent raw stream read (ledger inspection).
    pub fn load_raw_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        match self {
            AppServices::InMemory { event_store, .. } => {
                event_store.load_stream(tenant_id, aggregate_id)
            }
            #[cfg(feature = "postgres")]
            AppServices::Persistent { event_store, .. } => {
                event_store.load_stream(tenant_id, aggregate_id)
            }
        }
    }

    pub fn inventory_get(
        &self,
        tenant_id: TenantId,
        item_id: &InventoryItemId,
    ) -> Option<InventoryReadModel> {
        match self {
            AppServices::InMemory {
                inventory_projection,
                ..
            } => inventory_projection.get(tenant_id, item_id),
            #[cfg(feature = "postgres")]
            AppServices::Persistent {
                inventory_projection,
                ..
            } => inventory_projection.get(tenant_id, item_id),
        }
    }

    pub fn inventory_list(&self, tenant_id: TenantId) -> Vec<InventoryReadModel> {
        match self {
            AppServices::InMemory {
                inventory_projection,
                ..
            } => inventory_projection.list(tenant_id),
            #[cfg(feature = "postgres")]
            AppServices::Persistent {
                inventory_projection,
                ..
            } => inventory_projection.list(tenant_id),
        }
    }

    pub fn sales_get(&self, tenant_id: TenantId, sale_id: &SaleId) -> Option<SaleReadModel> {
        match self {
            AppServices::InMemory {
                sales_projection, ..
            } => sales_projection.get(tenant_id, sale_id),
            #[cfg(feature = "postgres")]
            AppServices::Persistent {
                sales_projection, ..
            } => sales_projection.get(tenant_id, sale_id),
        }
    }

    pub fn sales_list(&self, tenant_id: TenantId) -> Vec<SaleReadModel> {
        match self {
            AppServices::InMemory {
                sales_projection, ..
            } => sales_projection.list(tenant_id),
            #[cfg(feature = "postgres")]
            AppServices::Persistent {
                sales_projection, ..
            } => sales_projection.list(tenant_id),
        }
    }
}
