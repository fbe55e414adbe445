//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (`marketplace.api_key_env`).
//! - Callers invoke [`resolve_secrets`] once at startup and pass the result
//!   into constructors; no other code reads secret env vars.
//! - `Debug` redacts values. Errors name the variable, never its value.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::DEFAULT_API_KEY_ENV;

/// Secrets resolved from the environment. **Values are redacted in `Debug`.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Env var the key was read from.
    pub marketplace_api_key_env: String,
    pub marketplace_api_key: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("marketplace_api_key_env", &self.marketplace_api_key_env)
            .field("marketplace_api_key", &"<REDACTED>")
            .finish()
    }
}

/// Non-empty trimmed string at `pointer`, if any.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Unset and blank are both "missing".
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the marketplace API key named by `/marketplace/api_key_env`
/// (default `PSC_MARKETPLACE_API_KEY`).
///
/// Fails closed with SECRETS_MISSING when the variable is unset or blank.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    let var = read_str_at(config_json, "/marketplace/api_key_env")
        .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());

    let Some(key) = resolve_env(&var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (marketplace api key) is not set or empty",
            var
        );
    };

    Ok(ResolvedSecrets {
        marketplace_api_key_env: var,
        marketplace_api_key: key,
    })
}
