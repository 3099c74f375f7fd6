use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use farmstock_auth::Permission;
use farmstock_core::{AggregateId, AggregateRoot};
use farmstock_inventory::{
    CreateItem, DeleteItem, InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId,
    RecordMovement, UpdateDetails,
};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/items", post(create_item).get(list_items))
        .route(
            "/items/:id",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/items/:id/stock", get(get_item_stock))
        .route(
            "/items/:id/movements",
            post(record_movement).get(list_movements),
        )
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::CreateItemRequest>,
) -> axum::response::Response {
    let agg = AggregateId::new();
    let item_id = InventoryItemId::new(agg);

    let cmd = InventoryCommand::CreateItem(CreateItem {
        tenant_id: tenant.tenant_id(),
        item_id,
        name: body.name,
        category: body.category,
        unit: body.unit,
        initial_quantity: body.initial_quantity,
        min_quantity: body.min_quantity,
        unit_cost: body.unit_cost,
        expires_at: body.expires_at,
        batch: body.batch,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("inventory.items.create")],
    };

    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services.dispatch::<InventoryItem>(
        tenant.tenant_id(),
        agg,
        "inventory.item",
        cmd_auth.inner,
        |_tenant_id, aggregate_id| InventoryItem::empty(InventoryItemId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordMovementRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id");
        }
    };

    let item_id = InventoryItemId::new(agg);

    let cmd = InventoryCommand::RecordMovement(RecordMovement {
        tenant_id: tenant.tenant_id(),
        item_id,
        movement_type: body.movement_type,
        quantity: body.quantity,
        notes: body.notes,
        reference: body.reference,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("inventory.items.record_movement")],
    };

    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services.dispatch::<InventoryItem>(
        tenant.tenant_id(),
        agg,
        "inventory.item",
        cmd_auth.inner,
        |_tenant_id, aggregate_id| InventoryItem::empty(InventoryItemId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let stream_version = committed.last().map(|e| e.sequence_number).unwrap_or(0);
    let recorded = committed.iter().find_map(|stored| {
        match serde_json::from_value::<InventoryEvent>(stored.payload.clone()) {
            Ok(InventoryEvent::MovementRecorded(m)) => Some(m),
            _ => None,
        }
    });

    // Strong read so the caller gets the updated quantity and derived
    // status/value without a second request.
    let item = match services.load::<InventoryItem>(tenant.tenant_id(), agg, |_tenant_id, id| {
        InventoryItem::empty(InventoryItemId::new(id))
    }) {
        Ok(Some(item)) => item,
        Ok(None) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "read_error",
                "item not readable after append",
            );
        }
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "item": dto::stock_to_json(&item, stream_version),
            "movement": recorded.as_ref().map(dto::movement_event_to_json),
        })),
    )
        .into_response()
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateItemRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id");
        }
    };

    let item_id = InventoryItemId::new(agg);

    let cmd = InventoryCommand::UpdateDetails(UpdateDetails {
        tenant_id: tenant.tenant_id(),
        item_id,
        name: body.name,
        min_quantity: body.min_quantity,
        unit_cost: body.unit_cost,
        expires_at: body.expires_at,
        batch: body.batch,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("inventory.items.update")],
    };

    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services.dispatch::<InventoryItem>(
        tenant.tenant_id(),
        agg,
        "inventory.item",
        cmd_auth.inner,
        |_tenant_id, aggregate_id| InventoryItem::empty(InventoryItemId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id");
        }
    };

    let item_id = InventoryItemId::new(agg);

    let cmd = InventoryCommand::DeleteItem(DeleteItem {
        tenant_id: tenant.tenant_id(),
        item_id,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("inventory.items.delete")],
    };

    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    if let Err(e) = services.dispatch::<InventoryItem>(
        tenant.tenant_id(),
        agg,
        "inventory.item",
        cmd_auth.inner,
        |_tenant_id, aggregate_id| InventoryItem::empty(InventoryItemId::new(aggregate_id)),
    ) {
        return errors::dispatch_error_to_response(e);
    }

    StatusCode::NO_CONTENT.into_response()
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id");
        }
    };

    let item_id = InventoryItemId::new(agg);
    match services.inventory_get(tenant.tenant_id(), &item_id) {
        Some(rm) => (StatusCode::OK, Json(dto::inventory_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let items = services
        .inventory_list(tenant.tenant_id())
        .into_iter()
        .map(dto::inventory_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

/// Strongly consistent stock read: folds the item's ledger instead of
/// consulting the (eventually consistent) projection.
pub async fn get_item_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id");
        }
    };

    let loaded = services.load::<InventoryItem>(tenant.tenant_id(), agg, |_tenant_id, aggregate_id| {
        InventoryItem::empty(InventoryItemId::new(aggregate_id))
    });

    match loaded {
        Ok(Some(item)) if item.is_live() => {
            let version = item.version();
            (StatusCode::OK, Json(dto::stock_to_json(&item, version))).into_response()
        }
        Ok(_) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id");
        }
    };

    let item_id = InventoryItemId::new(agg);
    match services.inventory_get(tenant.tenant_id(), &item_id) {
        Some(rm) => {
            // Newest first; the read model stores ledger order.
            let movements = rm
                .movements
                .iter()
                .rev()
                .map(dto::movement_to_json)
                .collect::<Vec<_>>();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "item_id": agg.to_string(),
                    "movements": movements,
                })),
            )
                .into_response()
        }
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
    }
}
