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
use farmstock_core::AggregateId;
use farmstock_inventory::{
    InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId, MovementReference,
    MovementType, RecordMovement,
};
use farmstock_sales::{CancelSale, RecordSale, Sale, SaleCommand, SaleId};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_sale).get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/cancel", post(cancel_sale))
}

/// Record a sale: decrement stock first, then write the sale record.
///
/// The stock movement is the guard. If the item has insufficient stock the
/// movement is rejected, nothing is appended anywhere, and the sale is never
/// recorded. Once the movement commits, the sale record follows, linked by
/// the sale id carried in the movement's reference.
pub async fn record_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RecordSaleRequest>,
) -> axum::response::Response {
    let item_agg: AggregateId = match body.item_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id");
        }
    };
    let item_id = InventoryItemId::new(item_agg);

    // Reject malformed sales before touching stock; the movement commits
    // first and must not run for a request the sale aggregate would refuse.
    if body.quantity <= 0 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "quantity must be positive",
        );
    }
    if body.unit_price == 0 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "unit_price must be positive",
        );
    }

    let sale_agg = AggregateId::new();
    let sale_id = SaleId::new(sale_agg);
    let occurred_at = Utc::now();

    let movement_cmd = InventoryCommand::RecordMovement(RecordMovement {
        tenant_id: tenant.tenant_id(),
        item_id,
        movement_type: MovementType::Sale,
        quantity: body.quantity,
        notes: Some(format!("Sold {} units (sale {})", body.quantity, sale_agg)),
        reference: Some(MovementReference::Sale { sale_id: sale_agg }),
        occurred_at,
    });

    let sale_cmd = SaleCommand::RecordSale(RecordSale {
        tenant_id: tenant.tenant_id(),
        sale_id,
        item_id,
        quantity: body.quantity,
        unit_price: body.unit_price,
        buyer: body.buyer,
        occurred_at,
    });

    let cmd_auth = CmdAuth {
        inner: sale_cmd,
        required: vec![Permission::new("sales.record")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    // Stock decrement first. Rejection here (insufficient stock, unknown
    // item) means no sale is written.
    if let Err(e) = services.dispatch::<InventoryItem>(
        tenant.tenant_id(),
        item_agg,
        "inventory.item",
        movement_cmd,
        |_tenant_id, aggregate_id| InventoryItem::empty(InventoryItemId::new(aggregate_id)),
    ) {
        return errors::dispatch_error_to_response(e);
    }

    let committed = match services.dispatch::<Sale>(
        tenant.tenant_id(),
        sale_agg,
        "sales.sale",
        cmd_auth.inner,
        |_tenant_id, aggregate_id| Sale::empty(SaleId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": sale_agg.to_string(),
            "item_id": item_agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

/// Cancel a sale and restore the sold quantity via a RETURN movement.
///
/// The cancellation and the compensating movement are two separate appends,
/// so the handler is written to be re-drivable: if the RETURN fails after the
/// cancel committed (item stream conflict, item deleted), the cancellation is
/// acknowledged with `stock_restored: false` and a retry of this endpoint
/// reaches the repair path instead of being rejected as already cancelled.
/// The item's ledger is checked for an existing line referencing this
/// cancellation before the RETURN is dispatched, so the restore is applied at
/// most once.
pub async fn cancel_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let sale_agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid sale id");
        }
    };
    let sale_id = SaleId::new(sale_agg);

    let cmd = SaleCommand::CancelSale(CancelSale {
        tenant_id: tenant.tenant_id(),
        sale_id,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("sales.cancel")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    // Strong read first. The sale carries the item id and quantity needed
    // for the compensating movement, and its status decides whether this is
    // a fresh cancellation or a repair of a lost restore.
    let sale = match services.load::<Sale>(tenant.tenant_id(), sale_agg, |_tenant_id, aid| {
        Sale::empty(SaleId::new(aid))
    }) {
        Ok(Some(s)) => s,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "sale not found"),
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let Some(item_id) = sale.item_id() else {
        return errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "read_error",
            "sale has no item",
        );
    };
    let quantity = sale.quantity();

    if !sale.is_cancelled() {
        if let Err(e) = services.dispatch::<Sale>(
            tenant.tenant_id(),
            sale_agg,
            "sales.sale",
            cmd_auth.inner,
            |_tenant_id, aggregate_id| Sale::empty(SaleId::new(aggregate_id)),
        ) {
            // A concurrent canceller may have won the race; if the sale is
            // cancelled now, fall through to the restore.
            let now_cancelled = matches!(
                services.load::<Sale>(tenant.tenant_id(), sale_agg, |_tenant_id, aid| {
                    Sale::empty(SaleId::new(aid))
                }),
                Ok(Some(s)) if s.is_cancelled()
            );
            if !now_cancelled {
                return errors::dispatch_error_to_response(e);
            }
        }
    }

    let already_restored = match restore_already_applied(&services, &tenant, item_id, sale_agg) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    if already_restored {
        return cancel_response(sale_agg, item_id, Some(quantity), None);
    }

    let return_cmd = InventoryCommand::RecordMovement(RecordMovement {
        tenant_id: tenant.tenant_id(),
        item_id,
        movement_type: MovementType::Return,
        quantity,
        notes: Some(format!("Restocked {} units from cancelled sale {}", quantity, sale_agg)),
        reference: Some(MovementReference::SaleCancelled { sale_id: sale_agg }),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<InventoryItem>(
        tenant.tenant_id(),
        item_id.0,
        "inventory.item",
        return_cmd,
        |_tenant_id, aggregate_id| InventoryItem::empty(InventoryItemId::new(aggregate_id)),
    ) {
        Ok(_) => cancel_response(sale_agg, item_id, Some(quantity), None),
        // The cancel is durable; report it and surface the restore failure
        // so the caller knows to retry (or that the item is gone).
        Err(e) => cancel_response(sale_agg, item_id, None, Some(e)),
    }
}

/// Scan the item's ledger for a line referencing this cancellation.
fn restore_already_applied(
    services: &AppServices,
    tenant: &crate::context::TenantContext,
    item_id: InventoryItemId,
    sale_agg: AggregateId,
) -> Result<bool, axum::response::Response> {
    let stream = match services.load_raw_stream(tenant.tenant_id(), item_id.0) {
        Ok(s) => s,
        Err(e) => {
            return Err(errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                format!("{e:?}"),
            ));
        }
    };

    for stored in stream {
        if let Ok(InventoryEvent::MovementRecorded(m)) = serde_json::from_value(stored.payload) {
            if matches!(
                m.reference,
                Some(MovementReference::SaleCancelled { sale_id }) if sale_id == sale_agg
            ) {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn cancel_response(
    sale_agg: AggregateId,
    item_id: InventoryItemId,
    restored_quantity: Option<i64>,
    restore_error: Option<farmstock_infra::command_dispatcher::DispatchError>,
) -> axum::response::Response {
    let mut body = serde_json::json!({
        "id": sale_agg.to_string(),
        "item_id": item_id.to_string(),
        "status": "cancelled",
        "stock_restored": restored_quantity.is_some(),
        "restored_quantity": restored_quantity,
    });
    if let Some(e) = restore_error {
        let (_, err_body) = errors::dispatch_error_parts(&e);
        body["restore_error"] = err_body;
    }
    (StatusCode::OK, Json(body)).into_response()
}

pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let sale_agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid sale id");
        }
    };
    let sale_id = SaleId::new(sale_agg);
    match services.sales_get(tenant.tenant_id(), &sale_id) {
        Some(rm) => (StatusCode::OK, Json(dto::sale_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "sale not found"),
    }
}

pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let sales = services
        .sales_list(tenant.tenant_id())
        .into_iter()
        .map(dto::sale_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": sales }))).into_response()
}
