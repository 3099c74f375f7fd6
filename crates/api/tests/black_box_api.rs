use chrono::{Duration as ChronoDuration, Utc};
use farmstock_auth::{JwtClaims, PrincipalId, Role};
use farmstock_core::TenantId;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = farmstock_api::app::build_app(jwt_secret.to_string()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, tenant_id: TenantId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        tenant_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_item(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    body: serde_json::Value,
) -> String {
    let res = client
        .post(format!("{}/inventory/items", base_url))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    created["id"].as_str().unwrap().to_string()
}

async fn get_item_eventually(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    id: &str,
    min_updates: i64,
) -> serde_json::Value {
    // The API is intentionally eventual-consistent (command path vs projection
    // update). Poll briefly until the projection catches up.
    for _ in 0..100 {
        let res = client
            .get(format!("{}/inventory/items/{}", base_url, id))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();

        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            let movements = movement_count(client, base_url, token, id).await;
            if movements >= min_updates {
                return body;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("item did not become visible in projection within timeout");
}

async fn movement_count(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    id: &str,
) -> i64 {
    let res = client
        .get(format!("{}/inventory/items/{}/movements", base_url, id))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    if res.status() != StatusCode::OK {
        return -1;
    }
    let body: serde_json::Value = res.json().await.unwrap();
    body["movements"].as_array().map(|a| a.len() as i64).unwrap_or(0)
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn unauthorized_access_blocked_for_commands() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    // Not admin => permission mapping returns empty => forbidden for commands.
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("viewer")]);

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/inventory/items", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "Layer feed", "category": "feed", "unit": "kg" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn inventory_lifecycle_create_move_query() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();

    let id = create_item(
        &client,
        &srv.base_url,
        &token,
        json!({
            "name": "Wheat seed",
            "category": "seeds",
            "unit": "kg",
            "min_quantity": 20,
            "unit_cost": 150,
        }),
    )
    .await;

    // Purchase 100, use 30.
    let res = client
        .post(format!("{}/inventory/items/{}/movements", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "movement_type": "PURCHASE", "quantity": 100 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/inventory/items/{}/movements", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "movement_type": "USAGE", "quantity": 30, "notes": "spring planting" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // The response carries the updated item and the ledger line itself, so
    // the caller does not need a second (eventually consistent) read.
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["movement"]["direction"], "OUT");
    assert_eq!(body["movement"]["previous_quantity"], 100);
    assert_eq!(body["movement"]["new_quantity"], 70);
    assert_eq!(body["item"]["quantity"], 70);
    assert_eq!(body["item"]["status"], "IN_STOCK");
    assert_eq!(body["item"]["total_value"], 70 * 150);

    // Query (eventually consistent with projection).
    let item = get_item_eventually(&client, &srv.base_url, &token, &id, 2).await;
    assert_eq!(item["name"], "Wheat seed");
    assert_eq!(item["quantity"], 70);
    assert_eq!(item["status"], "IN_STOCK");
    assert_eq!(item["total_value"], 70 * 150);

    // Strong read folds the ledger directly (no polling needed).
    let res = client
        .get(format!("{}/inventory/items/{}/stock", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let stock: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stock["quantity"], 70);
    assert_eq!(stock["stream_version"], 3);
}

#[tokio::test]
async fn insufficient_stock_is_rejected_with_detail() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();

    let id = create_item(
        &client,
        &srv.base_url,
        &token,
        json!({ "name": "Diesel", "category": "fuel", "unit": "l", "initial_quantity": 5 }),
    )
    .await;

    let res = client
        .post(format!("{}/inventory/items/{}/movements", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "movement_type": "USAGE", "quantity": 8 }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 5);
    assert_eq!(body["requested"], 8);

    // Rejection appended nothing: the strong read still sees 5.
    let res = client
        .get(format!("{}/inventory/items/{}/stock", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let stock: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stock["quantity"], 5);
}

#[tokio::test]
async fn status_reflects_min_quantity_and_zero() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();

    let id = create_item(
        &client,
        &srv.base_url,
        &token,
        json!({
            "name": "Calf feed",
            "category": "feed",
            "unit": "kg",
            "initial_quantity": 10,
            "min_quantity": 10,
        }),
    )
    .await;

    // At the threshold: low stock.
    let item = get_item_eventually(&client, &srv.base_url, &token, &id, 0).await;
    assert_eq!(item["status"], "LOW_STOCK");

    // Drain to zero: out of stock wins over low stock.
    let res = client
        .post(format!("{}/inventory/items/{}/movements", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "movement_type": "USAGE", "quantity": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let item = get_item_eventually(&client, &srv.base_url, &token, &id, 1).await;
    assert_eq!(item["quantity"], 0);
    assert_eq!(item["status"], "OUT_OF_STOCK");
}

#[tokio::test]
async fn sale_decrements_stock_and_cancellation_restores_it() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();

    let id = create_item(
        &client,
        &srv.base_url,
        &token,
        json!({ "name": "Eggs", "category": "other", "unit": "dozen", "initial_quantity": 50 }),
    )
    .await;

    // Record a sale of 20.
    let res = client
        .post(format!("{}/sales", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "item_id": id, "quantity": 20, "unit_price": 450, "buyer": "Marktstand" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let sale: serde_json::Value = res.json().await.unwrap();
    let sale_id = sale["id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/inventory/items/{}/stock", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let stock: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stock["quantity"], 30);

    // A sale beyond the remaining stock is rejected and never recorded.
    let res = client
        .post(format!("{}/sales", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "item_id": id, "quantity": 31, "unit_price": 450 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Cancel: stock returns, the sale is marked cancelled.
    let res = client
        .post(format!("{}/sales/{}/cancel", srv.base_url, sale_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["restored_quantity"], 20);
    assert_eq!(body["stock_restored"], true);

    let res = client
        .get(format!("{}/inventory/items/{}/stock", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let stock: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stock["quantity"], 50);

    // Cancelling again acknowledges the cancellation without restocking a
    // second time.
    let res = client
        .post(format!("{}/sales/{}/cancel", srv.base_url, sale_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["restored_quantity"], 20);

    let res = client
        .get(format!("{}/inventory/items/{}/stock", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let stock: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stock["quantity"], 50);

    // The ledger lists newest first, with generated notes on both the sale
    // decrement and the restock.
    for _ in 0..100 {
        if movement_count(&client, &srv.base_url, &token, &id).await >= 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let res = client
        .get(format!("{}/inventory/items/{}/movements", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let ledger: serde_json::Value = res.json().await.unwrap();
    let movements = ledger["movements"].as_array().unwrap();
    assert_eq!(movements[0]["movement_type"], "RETURN");
    assert!(movements[0]["notes"].as_str().unwrap().starts_with("Restocked"));
    assert_eq!(movements[1]["movement_type"], "SALE");
    assert!(movements[1]["notes"].as_str().unwrap().starts_with("Sold"));
}

#[tokio::test]
async fn cancelling_a_sale_of_a_deleted_item_still_cancels_the_sale() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();

    let id = create_item(
        &client,
        &srv.base_url,
        &token,
        json!({ "name": "Pumpkins", "category": "other", "unit": "piece", "initial_quantity": 10 }),
    )
    .await;

    let res = client
        .post(format!("{}/sales", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "item_id": id, "quantity": 4, "unit_price": 300 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let sale: serde_json::Value = res.json().await.unwrap();
    let sale_id = sale["id"].as_str().unwrap().to_string();

    let res = client
        .delete(format!("{}/inventory/items/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // The cancellation still commits; the restore cannot apply to a deleted
    // item and the response says so instead of pretending the cancel failed.
    let res = client
        .post(format!("{}/sales/{}/cancel", srv.base_url, sale_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["stock_restored"], false);
    assert_eq!(body["restore_error"]["error"], "not_found");

    // Retrying reaches the same repair path rather than a hard rejection.
    let res = client
        .post(format!("{}/sales/{}/cancel", srv.base_url, sale_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["stock_restored"], false);

    // The sale itself ends up cancelled.
    for _ in 0..100 {
        let res = client
            .get(format!("{}/sales/{}", srv.base_url, sale_id))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        if res.status() == StatusCode::OK {
            let sale: serde_json::Value = res.json().await.unwrap();
            if sale["status"] == "cancelled" {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("sale was not marked cancelled in the read model within timeout");
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_tenant_reads_and_writes() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant1 = TenantId::new();
    let tenant2 = TenantId::new();
    let token1 = mint_jwt(jwt_secret, tenant1, vec![Role::new("admin")]);
    let token2 = mint_jwt(jwt_secret, tenant2, vec![Role::new("admin")]);

    let client = reqwest::Client::new();

    let id = create_item(
        &client,
        &srv.base_url,
        &token1,
        json!({ "name": "Hay bales", "category": "feed", "unit": "bale", "initial_quantity": 40 }),
    )
    .await;

    // Tenant2 cannot read it (projection lookup is tenant-scoped).
    let res = client
        .get(format!("{}/inventory/items/{}", srv.base_url, id))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Tenant2 cannot move its stock either (dispatch happens under tenant2's
    // context, where the stream does not exist).
    let res = client
        .post(format!("{}/inventory/items/{}/movements", srv.base_url, id))
        .bearer_auth(&token2)
        .json(&json!({ "movement_type": "USAGE", "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
