//! psc-marketplace
//!
//! HTTP [`OrderSource`] over the marketplace REST API.
//!
//! Listings are requested oldest first (`sort=dateCreated&order=asc`) and
//! paginated with `max`/`offset` until `total_count` is reached or a page
//! comes back empty.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use psc_reconcile::OrderSource;
use psc_schemas::{Checkpoint, Order, OrderCategory};
use serde_json::Value;
use tracing::debug;

mod dto;
mod endpoints;

pub use dto::{decode_page, OrderPage};
pub use endpoints::{endpoint_for, Endpoint, IdFilter};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound on the error body echoed into error messages.
const ERROR_BODY_SNIPPET: usize = 200;

/// Marketplace order client.
///
/// API key is resolved by the caller and passed in; it is never logged.
#[derive(Clone)]
pub struct MarketplaceClient {
    base_url: String,
    api_key: String,
    page_size: u32,
    http: reqwest::Client,
}

impl std::fmt::Debug for MarketplaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl MarketplaceClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        Self::with_options(base_url, api_key, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_options(
        base_url: String,
        api_key: String,
        page_size: u32,
        timeout_secs: u64,
    ) -> Result<Self> {
        if page_size == 0 {
            bail!("marketplace page size must be > 0");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("marketplace http client build failed")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            page_size,
            http,
        })
    }

    /// Fetch every page of a listing with `filters` applied.
    async fn fetch_all(
        &self,
        category: OrderCategory,
        filters: &[(String, String)],
    ) -> Result<Vec<Order>> {
        let ep = endpoint_for(category);
        let url = format!("{}{}", self.base_url, ep.path);
        let mut out: Vec<Order> = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut query: Vec<(String, String)> = filters.to_vec();
            query.push(("sort".to_string(), "dateCreated".to_string()));
            query.push(("order".to_string(), "asc".to_string()));
            query.push(("max".to_string(), self.page_size.to_string()));
            query.push(("offset".to_string(), offset.to_string()));

            let resp = self
                .http
                .get(&url)
                .header(reqwest::header::AUTHORIZATION, self.api_key.as_str())
                .query(&query)
                .send()
                .await
                .with_context(|| format!("marketplace request failed: {}", ep.path))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "marketplace http error status={} path={} body={}",
                    status.as_u16(),
                    ep.path,
                    snippet(&body)
                );
            }

            let body: Value = resp
                .json()
                .await
                .context("marketplace response json decode failed")?;
            let page = decode_page(category, body)?;
            let received = page.orders.len() as u64;
            out.extend(page.orders);
            offset += received;

            debug!(
                category = %category,
                offset,
                received,
                total = ?page.total_count,
                "marketplace page fetched"
            );

            if received == 0 {
                break;
            }
            match page.total_count {
                Some(total) if offset >= total => break,
                None if received < u64::from(self.page_size) => break,
                _ => {}
            }
        }

        // stable: equal timestamps keep marketplace order
        out.sort_by_key(|o| o.created_at_utc);
        Ok(out)
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_SNIPPET) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[async_trait::async_trait]
impl OrderSource for MarketplaceClient {
    fn name(&self) -> &'static str {
        "marketplace"
    }

    async fn list_orders(&self, category: OrderCategory) -> Result<Vec<Order>> {
        self.fetch_all(category, &[]).await
    }

    async fn list_orders_since(
        &self,
        category: OrderCategory,
        since: &Checkpoint,
    ) -> Result<Vec<Order>> {
        let ep = endpoint_for(category);
        let filters = vec![(ep.date_filter.to_string(), since.to_rfc3339())];
        self.fetch_all(category, &filters).await
    }

    async fn list_orders_by_id(
        &self,
        category: OrderCategory,
        order_ids: &[String],
    ) -> Result<BTreeMap<String, Order>> {
        if order_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let ep = endpoint_for(category);
        let filters = ep.id_filter.encode(order_ids);
        let orders = self.fetch_all(category, &filters).await?;

        Ok(orders
            .into_iter()
            .filter(|o| order_ids.contains(&o.order_id))
            .map(|o| (o.order_id.clone(), o))
            .collect())
    }
}
