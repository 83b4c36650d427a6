use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = stockpilot_api::app::build_app();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/api", addr);

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

const WAREHOUSE_HEADER: &str = "X-Warehouse-Id";

async fn track_product(
    client: &reqwest::Client,
    base_url: &str,
    warehouse: &str,
    product_id: Uuid,
    initial_stock: i64,
) {
    let res = client
        .post(format!("{}/inventory/products", base_url))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({
            "product_id": product_id,
            "location": "A-01-01",
            "initial_stock": initial_stock,
            "minimum_stock_level": 5,
            "maximum_stock_level": 500,
            "reorder_point": 10,
            "unit_cost": 2.5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

async fn place_order(
    client: &reqwest::Client,
    base_url: &str,
    warehouse: &str,
    product_id: Uuid,
    quantity: i64,
) -> reqwest::Response {
    client
        .post(format!("{}/orders", base_url))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({
            "customer_id": Uuid::now_v7(),
            "lines": [{ "product_id": product_id, "quantity": quantity, "unit_price": 19.99 }],
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn warehouse_header_is_required() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/orders", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{}/orders", srv.base_url))
        .header(WAREHOUSE_HEADER, "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_needs_no_warehouse_context() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn placing_an_order_reserves_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();
    let product_id = Uuid::now_v7();

    track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;

    let res = place_order(&client, &srv.base_url, &warehouse, product_id, 2).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["success"].as_bool().unwrap());
    assert_eq!(body["data"]["order_number"].as_str().unwrap(), "ORD-000001");

    let res = client
        .get(format!("{}/inventory/products/{}", srv.base_url, product_id))
        .header(WAREHOUSE_HEADER, &warehouse)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["reserved_stock"].as_i64().unwrap(), 2);
    assert_eq!(body["data"]["available_stock"].as_i64().unwrap(), 38);
}

#[tokio::test]
async fn order_exceeding_available_stock_fails_atomically() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();
    let product_id = Uuid::now_v7();

    track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;

    let res = place_order(&client, &srv.base_url, &warehouse, product_id, 41).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The failed placement must not leave a partial reservation behind.
    let res = client
        .get(format!("{}/inventory/products/{}", srv.base_url, product_id))
        .header(WAREHOUSE_HEADER, &warehouse)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["reserved_stock"].as_i64().unwrap(), 0);

    let res = client
        .get(format!("{}/orders", srv.base_url))
        .header(WAREHOUSE_HEADER, &warehouse)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_an_order_releases_its_reservations() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();
    let product_id = Uuid::now_v7();

    track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;
    let res = place_order(&client, &srv.base_url, &warehouse, product_id, 5).await;
    let body: serde_json::Value = res.json().await.unwrap();
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/orders/{}/cancel", srv.base_url, order_id))
        .header(WAREHOUSE_HEADER, &warehouse)
        .json(&json!({ "reason": "customer changed their mind" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/inventory/products/{}", srv.base_url, product_id))
        .header(WAREHOUSE_HEADER, &warehouse)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["reserved_stock"].as_i64().unwrap(), 0);
    assert_eq!(body["data"]["available_stock"].as_i64().unwrap(), 40);
}

#[tokio::test]
async fn orders_are_invisible_to_other_warehouses() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();
    let other_warehouse = Uuid::now_v7().to_string();
    let product_id = Uuid::now_v7();

    track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;
    let res = place_order(&client, &srv.base_url, &warehouse, product_id, 1).await;
    let body: serde_json::Value = res.json().await.unwrap();
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/orders/{}", srv.base_url, order_id))
        .header(WAREHOUSE_HEADER, &other_warehouse)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pick_list_requires_a_confirmed_order() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();
    let product_id = Uuid::now_v7();

    track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;
    let res = place_order(&client, &srv.base_url, &warehouse, product_id, 2).await;
    let body: serde_json::Value = res.json().await.unwrap();
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();

    // Still pending: the picking stage gate must reject it.
    let res = client
        .post(format!("{}/picking/pick-lists", srv.base_url))
        .header(WAREHOUSE_HEADER, &warehouse)
        .json(&json!({ "order_id": order_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .patch(format!("{}/orders/{}/status", srv.base_url, order_id))
        .header(WAREHOUSE_HEADER, &warehouse)
        .json(&json!({ "status": "confirmed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/picking/pick-lists", srv.base_url))
        .header(WAREHOUSE_HEADER, &warehouse)
        .json(&json!({ "order_id": order_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["pick_list_number"].as_str().unwrap(), "PL-000001");

    // One pick list per order.
    let res = client
        .post(format!("{}/picking/pick-lists", srv.base_url))
        .header(WAREHOUSE_HEADER, &warehouse)
        .json(&json!({ "order_id": order_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

/// Walk an order from placement to a packed package, returning
/// (order_id, package_id).
async fn pack_order(
    client: &reqwest::Client,
    base_url: &str,
    warehouse: &str,
    product_id: Uuid,
    quantity: i64,
) -> (String, String) {
    let res = place_order(client, base_url, warehouse, product_id, quantity).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();

    let res = client
        .patch(format!("{}/orders/{}/status", base_url, order_id))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({ "status": "confirmed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/picking/pick-lists", base_url))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({ "order_id": order_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let pick_list_id = body["data"]["pick_list_id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/picking/pick-lists/{}/assign", base_url, pick_list_id))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({ "picker": "dana" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/picking/pick-lists/{}/start", base_url, pick_list_id))
        .header(WAREHOUSE_HEADER, warehouse)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/picking/pick-lists/{}/pick", base_url, pick_list_id))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({ "product_id": product_id, "quantity": quantity }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/packing/packages", base_url))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({
            "order_id": order_id,
            "pick_list_id": pick_list_id,
            "dimensions": "30x20x10",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let package_id = body["data"]["package_id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/packing/packages/{}/items", base_url, package_id))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({
            "product_id": product_id,
            "quantity": quantity,
            "unit_weight_kg": 0.5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/packing/packages/{}/packed", base_url, package_id))
        .header(WAREHOUSE_HEADER, warehouse)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    (order_id, package_id)
}

async fn record_passing_inspection(
    client: &reqwest::Client,
    base_url: &str,
    warehouse: &str,
    order_id: &str,
    package_id: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/quality/checks", base_url))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({
            "order_id": order_id,
            "package_id": package_id,
            "inspector": "mara",
            "scores": {
                "packaging": 5, "labeling": 5, "contents": 5,
                "weight_accuracy": 5, "documentation": 5,
            },
            "checks": {
                "package_intact": true, "content_correct": true,
                "weight_accurate": true, "labels_correct": true,
                "hazmat_compliant": true,
            },
        }))
        .send()
        .await
        .unwrap()
}

async fn create_shipment(
    client: &reqwest::Client,
    base_url: &str,
    warehouse: &str,
    order_id: &str,
    package_id: &str,
    tracking_number: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/shipments", base_url))
        .header(WAREHOUSE_HEADER, warehouse)
        .json(&json!({
            "order_id": order_id,
            "package_id": package_id,
            "tracking_number": tracking_number,
            "carrier": "DHL",
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn shipment_requires_an_approved_quality_check() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();
    let product_id = Uuid::now_v7();

    track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;
    let (order_id, package_id) = pack_order(&client, &srv.base_url, &warehouse, product_id, 2).await;

    // Packed but uninspected: the shipment gate must reject it.
    let res = create_shipment(&client, &srv.base_url, &warehouse, &order_id, &package_id, "TRK-001").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = record_passing_inspection(&client, &srv.base_url, &warehouse, &order_id, &package_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["overall_score"].as_f64().unwrap(), 100.0);
    assert_eq!(body["data"]["result"].as_str().unwrap(), "pass");
    assert!(body["data"]["approved_for_shipment"].as_bool().unwrap());

    let res = create_shipment(&client, &srv.base_url, &warehouse, &order_id, &package_id, "TRK-001").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["shipment_number"].as_str().unwrap(), "SHP-000001");
}

#[tokio::test]
async fn reinspecting_an_approved_package_conflicts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();
    let product_id = Uuid::now_v7();

    track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;
    let (order_id, package_id) = pack_order(&client, &srv.base_url, &warehouse, product_id, 2).await;

    let res = record_passing_inspection(&client, &srv.base_url, &warehouse, &order_id, &package_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let check_id = body["data"]["quality_check_id"].as_str().unwrap().to_string();

    // A second inspection for the same package lands on the same check,
    // which is already approved for shipment.
    let res = record_passing_inspection(&client, &srv.base_url, &warehouse, &order_id, &package_id).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .get(format!("{}/quality/checks/{}", srv.base_url, check_id))
        .header(WAREHOUSE_HEADER, &warehouse)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["data"]["approved_for_shipment"].as_bool().unwrap());
}

#[tokio::test]
async fn tracking_numbers_are_unique_across_shipments() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();

    let mut shipped = Vec::new();
    for product_id in [Uuid::now_v7(), Uuid::now_v7()] {
        track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;
        let (order_id, package_id) = pack_order(&client, &srv.base_url, &warehouse, product_id, 1).await;
        let res = record_passing_inspection(&client, &srv.base_url, &warehouse, &order_id, &package_id).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        shipped.push((order_id, package_id));
    }

    let res = create_shipment(&client, &srv.base_url, &warehouse, &shipped[0].0, &shipped[0].1, "TRK-100").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = create_shipment(&client, &srv.base_url, &warehouse, &shipped[1].0, &shipped[1].1, "TRK-100").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = create_shipment(&client, &srv.base_url, &warehouse, &shipped[1].0, &shipped[1].1, "TRK-200").await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn a_tracking_number_has_at_most_one_open_exception() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let warehouse = Uuid::now_v7().to_string();
    let product_id = Uuid::now_v7();

    track_product(&client, &srv.base_url, &warehouse, product_id, 40).await;
    let (order_id, package_id) = pack_order(&client, &srv.base_url, &warehouse, product_id, 1).await;
    let res = record_passing_inspection(&client, &srv.base_url, &warehouse, &order_id, &package_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = create_shipment(&client, &srv.base_url, &warehouse, &order_id, &package_id, "TRK-300").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let open = json!({
        "tracking_number": "TRK-300",
        "exception_type": "damaged",
        "severity": "high",
        "priority": "normal",
        "description": "carton crushed in transit",
    });

    let res = client
        .post(format!("{}/exceptions", srv.base_url))
        .header(WAREHOUSE_HEADER, &warehouse)
        .json(&open)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{}/exceptions", srv.base_url))
        .header(WAREHOUSE_HEADER, &warehouse)
        .json(&open)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
