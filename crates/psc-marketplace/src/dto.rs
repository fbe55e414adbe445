use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use psc_schemas::{Order, OrderCategory, OrderState};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
struct ProductOrderDto {
    order_id: String,
    created_date: String,
    order_state: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceOrderDto {
    id: String,
    date_created: String,
    state: String,
}

/// One decoded listing page.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total_count: Option<u64>,
}

fn parse_created(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("marketplace date parse failed: {raw}"))?
        .with_timezone(&Utc))
}

/// Decode a listing body. Products come under `orders`, services under `data`.
pub fn decode_page(category: OrderCategory, body: Value) -> Result<OrderPage> {
    let total_count = body.get("total_count").and_then(Value::as_u64);

    let orders = match category {
        OrderCategory::Product => {
            let items: Vec<ProductOrderDto> = match body.get("orders") {
                Some(v) => serde_json::from_value(v.clone())
                    .context("marketplace product orders decode failed")?,
                None => Vec::new(),
            };
            items
                .into_iter()
                .map(|o| {
                    Ok(Order::new(
                        o.order_id,
                        category,
                        parse_created(&o.created_date)?,
                        OrderState::parse(&o.order_state),
                    ))
                })
                .collect::<Result<Vec<_>>>()?
        }
        OrderCategory::Service => {
            let items: Vec<ServiceOrderDto> = match body.get("data") {
                Some(v) => serde_json::from_value(v.clone())
                    .context("marketplace service orders decode failed")?,
                None => Vec::new(),
            };
            items
                .into_iter()
                .map(|o| {
                    Ok(Order::new(
                        o.id,
                        category,
                        parse_created(&o.date_created)?,
                        OrderState::parse(&o.state),
                    ))
                })
                .collect::<Result<Vec<_>>>()?
        }
    };

    Ok(OrderPage {
        orders,
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_page_decodes() {
        let page = decode_page(
            OrderCategory::Product,
            json!({
                "orders": [
                    {"order_id": "P-1", "created_date": "2024-03-01T10:00:00Z", "order_state": "SHIPPED"}
                ],
                "total_count": 1
            }),
        )
        .unwrap();
        assert_eq!(page.total_count, Some(1));
        assert_eq!(page.orders[0].order_id, "P-1");
        assert_eq!(page.orders[0].state, OrderState::Shipped);
        assert_eq!(page.orders[0].category, OrderCategory::Product);
    }

    #[test]
    fn service_page_decodes_with_offset_dates() {
        let page = decode_page(
            OrderCategory::Service,
            json!({
                "data": [
                    {"id": "S-1", "date_created": "2024-03-01T12:00:00+02:00", "state": "ORDER_ACCEPTED"}
                ]
            }),
        )
        .unwrap();
        assert_eq!(page.total_count, None);
        assert_eq!(page.orders[0].created_at_utc.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(page.orders[0].state, OrderState::Accepted);
    }

    #[test]
    fn bad_date_is_an_error() {
        let err = decode_page(
            OrderCategory::Product,
            json!({"orders": [{"order_id": "X", "created_date": "yesterday", "order_state": "SHIPPED"}]}),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("yesterday"));
    }

    #[test]
    fn missing_envelope_is_an_empty_page() {
        let page = decode_page(OrderCategory::Service, json!({"total_count": 0})).unwrap();
        assert!(page.orders.is_empty());
    }
}
