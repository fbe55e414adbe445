//! Command handler modules for psc-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod checkpoint;
pub mod db;
pub mod dispatch;
pub mod transfer;

use anyhow::{Context, Result};
use psc_config::{report_unused_keys, LoadedConfig, UnusedKeyPolicy};
use psc_schemas::OrderCategory;
use uuid::Uuid;

/// Unused keys listed on stderr are capped at this many.
const UNUSED_KEYS_SHOWN: usize = 50;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    psc_config::load_layered_yaml(&path_refs)
}

/// Parse `--category` values, preserving order. Duplicates are left for the
/// engine to collapse.
pub fn parse_categories(raw: &[String]) -> Result<Vec<OrderCategory>> {
    raw.iter()
        .map(|c| {
            OrderCategory::parse(c)
                .with_context(|| format!("invalid --category '{}'. expected PRODUCT | SERVICE", c))
        })
        .collect()
}

pub fn parse_category(raw: &str) -> Result<OrderCategory> {
    OrderCategory::parse(raw)
        .with_context(|| format!("invalid --category '{}'. expected PRODUCT | SERVICE", raw))
}

pub fn parse_transfer_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).context("invalid transfer id uuid")
}

/// Print the unused-key report to stderr. Fails under `UnusedKeyPolicy::Fail`.
pub fn check_unused_keys(loaded: &LoadedConfig, policy: UnusedKeyPolicy) -> Result<()> {
    let report = report_unused_keys(&loaded.config_json, policy)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS unused_leaf_keys={}",
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(UNUSED_KEYS_SHOWN) {
            eprintln!("  unused={}", p);
        }
        let extra = report
            .unused_leaf_pointers
            .len()
            .saturating_sub(UNUSED_KEYS_SHOWN);
        if extra > 0 {
            eprintln!("  ... and {} more", extra);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config-hash
// ---------------------------------------------------------------------------

pub fn config_hash(paths: &[String]) -> Result<()> {
    let loaded = load_config(paths)?;
    check_unused_keys(&loaded, UnusedKeyPolicy::Warn)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_parse_case_insensitively_in_order() {
        let raw = vec!["service".to_string(), "PRODUCT".to_string()];
        assert_eq!(
            parse_categories(&raw).unwrap(),
            vec![OrderCategory::Service, OrderCategory::Product]
        );
    }

    #[test]
    fn unknown_category_names_the_flag() {
        let err = parse_categories(&["bundle".to_string()]).unwrap_err();
        assert!(format!("{err:#}").contains("--category 'bundle'"));
    }

    #[test]
    fn transfer_id_must_be_a_uuid() {
        assert!(parse_transfer_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_transfer_id(&format!(" {id} ")).unwrap(), id);
    }
}
