//! Scenario: marketplace HTTP source against a mock server.
//!
//! Covers per-category endpoints, ascending sort, date and id filters,
//! offset pagination, auth header, and non-2xx handling.

use httpmock::prelude::*;
use psc_marketplace::MarketplaceClient;
use psc_reconcile::OrderSource;
use psc_schemas::{Checkpoint, OrderCategory, OrderState};
use serde_json::json;

const KEY: &str = "test-api-key";

fn client(server: &MockServer, page_size: u32) -> MarketplaceClient {
    MarketplaceClient::with_options(server.base_url(), KEY.to_string(), page_size, 5).unwrap()
}

#[tokio::test]
async fn product_listing_since_checkpoint_paginates() {
    let server = MockServer::start_async().await;

    let page0 = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/orders")
                .header("Authorization", KEY)
                .query_param("sort", "dateCreated")
                .query_param("order", "asc")
                .query_param("start_date", "2024-03-01T00:00:00Z")
                .query_param("max", "2")
                .query_param("offset", "0");
            then.status(200).json_body(json!({
                "orders": [
                    {"order_id": "P1", "created_date": "2024-03-01T00:00:00Z", "order_state": "SHIPPED"},
                    {"order_id": "P2", "created_date": "2024-03-02T00:00:00Z", "order_state": "REFUSED"}
                ],
                "total_count": 3
            }));
        })
        .await;
    let page1 = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/orders")
                .query_param("offset", "2");
            then.status(200).json_body(json!({
                "orders": [
                    {"order_id": "P3", "created_date": "2024-03-03T00:00:00Z", "order_state": "CLOSED"}
                ],
                "total_count": 3
            }));
        })
        .await;

    let since = Checkpoint::parse("2024-03-01T00:00:00Z").unwrap();
    let orders = client(&server, 2)
        .list_orders_since(OrderCategory::Product, &since)
        .await
        .unwrap();

    page0.assert_async().await;
    page1.assert_async().await;

    let ids: Vec<_> = orders.iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(ids, vec!["P1", "P2", "P3"]);
    assert_eq!(orders[1].state, OrderState::Refused);
    assert!(orders.iter().all(|o| o.category == OrderCategory::Product));
}

#[tokio::test]
async fn service_listing_uses_mms_endpoint_and_data_envelope() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/mms/orders")
                .query_param("date_created_start", "2024-05-01T08:30:00Z");
            then.status(200).json_body(json!({
                "data": [
                    {"id": "S1", "date_created": "2024-05-01T09:00:00Z", "state": "ORDER_ACCEPTED"}
                ],
                "total_count": 1
            }));
        })
        .await;

    let since = Checkpoint::parse("2024-05-01T08:30:00Z").unwrap();
    let orders = client(&server, 100)
        .list_orders_since(OrderCategory::Service, &since)
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, "S1");
    assert!(orders[0].state.is_payable());
}

#[tokio::test]
async fn empty_page_stops_pagination() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/orders");
            then.status(200).json_body(json!({"orders": []}));
        })
        .await;

    let orders = client(&server, 10)
        .list_orders(OrderCategory::Product)
        .await
        .unwrap();

    assert!(orders.is_empty());
    m.assert_hits_async(1).await;
}

#[tokio::test]
async fn product_id_lookup_is_comma_joined_and_omits_missing() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/orders")
                .query_param("order_ids", "A,B,C");
            then.status(200).json_body(json!({
                "orders": [
                    {"order_id": "A", "created_date": "2024-01-01T00:00:00Z", "order_state": "SHIPPED"},
                    {"order_id": "C", "created_date": "2024-01-02T00:00:00Z", "order_state": "RECEIVED"}
                ],
                "total_count": 2
            }));
        })
        .await;

    let ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    let found = client(&server, 100)
        .list_orders_by_id(OrderCategory::Product, &ids)
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(found.len(), 2);
    assert!(found.contains_key("A"));
    assert!(!found.contains_key("B"));
}

#[tokio::test]
async fn service_id_lookup_repeats_parameter() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/mms/orders")
                .query_param("order_id", "S1")
                .query_param("order_id", "S2");
            then.status(200).json_body(json!({
                "data": [
                    {"id": "S2", "date_created": "2024-01-02T00:00:00Z", "state": "SHIPPED"}
                ],
                "total_count": 1
            }));
        })
        .await;

    let ids = vec!["S1".to_string(), "S2".to_string()];
    let found = client(&server, 100)
        .list_orders_by_id(OrderCategory::Service, &ids)
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(found.keys().collect::<Vec<_>>(), vec!["S2"]);
}

#[tokio::test]
async fn empty_id_lookup_makes_no_request() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(500);
        })
        .await;

    let found = client(&server, 100)
        .list_orders_by_id(OrderCategory::Product, &[])
        .await
        .unwrap();

    assert!(found.is_empty());
    m.assert_hits_async(0).await;
}

#[tokio::test]
async fn non_success_status_is_an_error_with_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/mms/orders");
            then.status(401).body("invalid api key");
        })
        .await;

    let err = client(&server, 100)
        .list_orders(OrderCategory::Service)
        .await
        .unwrap_err();

    let msg = format!("{err:#}");
    assert!(msg.contains("status=401"), "{msg}");
    assert!(msg.contains("invalid api key"), "{msg}");
}
