//! Scenario: config hash stability.
//!
//! GREEN when:
//! - identical inputs hash identically;
//! - key order inside YAML does not change the hash;
//! - different values hash differently;
//! - files on disk hash the same as the equivalent strings.

use psc_config::{load_layered_yaml, load_layered_yaml_from_strings};
use std::io::Write;

const BASE_YAML: &str = r#"
marketplace:
  base_url: "https://marketplace.example.com"
  api_key_env: "PSC_MARKETPLACE_API_KEY"
  page_size: 100
payment_split:
  product:
    enabled: true
  service:
    enabled: true
"#;

const BASE_YAML_REORDERED: &str = r#"
payment_split:
  service:
    enabled: true
  product:
    enabled: true
marketplace:
  page_size: 100
  api_key_env: "PSC_MARKETPLACE_API_KEY"
  base_url: "https://marketplace.example.com"
"#;

const OVERLAY_YAML: &str = r#"
marketplace:
  page_size: 50
payment_split:
  service:
    enabled: false
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64, "hex-encoded sha256");
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();

    assert_eq!(
        original.config_hash, reordered.config_hash,
        "reordering keys in YAML must not change the hash"
    );
}

#[test]
fn overlay_changes_hash_and_values() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();

    assert_ne!(base.config_hash, layered.config_hash);

    let cfg = layered.connector().unwrap();
    assert_eq!(cfg.marketplace.page_size, 50);
    assert_eq!(cfg.marketplace.base_url, "https://marketplace.example.com");
    assert!(!cfg.payment_split.service.enabled);
    assert!(cfg.payment_split.product.enabled);
}

#[test]
fn layer_order_matters() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[OVERLAY_YAML, BASE_YAML]).unwrap();
    assert_ne!(a.config_hash, b.config_hash, "later layers override earlier");
}

#[test]
fn empty_overlay_is_a_no_op() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, ""]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn files_hash_like_strings() {
    let dir = tempfile::tempdir().unwrap();
    let base_path = dir.path().join("base.yaml");
    let overlay_path = dir.path().join("prod.yaml");
    std::fs::File::create(&base_path)
        .unwrap()
        .write_all(BASE_YAML.as_bytes())
        .unwrap();
    std::fs::File::create(&overlay_path)
        .unwrap()
        .write_all(OVERLAY_YAML.as_bytes())
        .unwrap();

    let from_files = load_layered_yaml(&[
        base_path.to_str().unwrap(),
        overlay_path.to_str().unwrap(),
    ])
    .unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();

    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_file_names_the_path() {
    let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.yaml"));
}
