use anyhow::{bail, Context, Result};
use psc_schemas::OrderCategory;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BACKLOG_CHUNK_SIZE: usize = 10;
pub const DEFAULT_API_KEY_ENV: &str = "PSC_MARKETPLACE_API_KEY";

/// Typed connector configuration.
///
/// Every section is optional in YAML except `marketplace.base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub marketplace: MarketplaceSection,
    #[serde(default)]
    pub payment_split: PaymentSplitSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceSection {
    pub base_url: String,
    /// Name of the env var holding the API key. Never the key itself.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSplitSection {
    #[serde(default)]
    pub product: CategoryToggle,
    #[serde(default)]
    pub service: CategoryToggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryToggle {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for CategoryToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_backlog_chunk_size")]
    pub backlog_chunk_size: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            backlog_chunk_size: DEFAULT_BACKLOG_CHUNK_SIZE,
        }
    }
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_enabled() -> bool {
    true
}

fn default_backlog_chunk_size() -> usize {
    DEFAULT_BACKLOG_CHUNK_SIZE
}

impl ConnectorConfig {
    /// Deserialize and validate the merged config document.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: ConnectorConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: connector config does not match schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.marketplace.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!(
                "CONFIG_INVALID: marketplace.base_url must be an http(s) URL, got '{}'",
                url
            );
        }
        if self.marketplace.api_key_env.trim().is_empty() {
            bail!("CONFIG_INVALID: marketplace.api_key_env must name an env var");
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.marketplace.page_size) {
            bail!(
                "CONFIG_INVALID: marketplace.page_size must be in 1..={}, got {}",
                MAX_PAGE_SIZE,
                self.marketplace.page_size
            );
        }
        if self.marketplace.timeout_secs == 0 {
            bail!("CONFIG_INVALID: marketplace.timeout_secs must be > 0");
        }
        if self.dispatch.backlog_chunk_size == 0 {
            bail!("CONFIG_INVALID: dispatch.backlog_chunk_size must be > 0");
        }
        Ok(())
    }

    /// Categories to run, in fixed order (PRODUCT before SERVICE).
    pub fn enabled_categories(&self) -> Vec<OrderCategory> {
        OrderCategory::ALL
            .into_iter()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }

    pub fn is_enabled(&self, category: OrderCategory) -> bool {
        match category {
            OrderCategory::Product => self.payment_split.product.enabled,
            OrderCategory::Service => self.payment_split.service.enabled,
        }
    }
}
