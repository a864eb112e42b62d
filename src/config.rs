//! Environment-driven configuration.
//!
//! Call `dotenvy::dotenv()` before [`SkuConfig::from_env`] to pick up a
//! `.env` file. Every setting has a default, so an empty environment yields
//! an in-memory, per-product registry with barcode rendering enabled.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::barcode::DEFAULT_HEIGHT;
use crate::error::ConfigError;
use crate::registry::{RegistryPolicy, ReservationScope};

/// Database configuration, used when `DATABASE_URL` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuConfig {
    pub bind_addr: String,
    pub database: Option<DatabaseConfig>,
    /// Explicit scope; `None` picks per-product for memory, global for Postgres.
    pub scope: Option<ReservationScope>,
    pub clear_on_generate: bool,
    pub max_attempts: u32,
    pub suffix_len: usize,
    pub barcodes_enabled: bool,
    pub barcode_dir: PathBuf,
    pub barcode_url_prefix: String,
    pub barcode_height: u32,
    pub export_dir: PathBuf,
    pub export_url_prefix: String,
}

impl Default for SkuConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl SkuConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database = get("DATABASE_URL").map(|database_url| DatabaseConfig {
            database_url,
            max_connections: parse_or(&get, "DATABASE_POOL_SIZE", 10),
            connection_timeout: Duration::from_secs(parse_or(&get, "DATABASE_TIMEOUT_SECS", 30)),
        });

        Self {
            bind_addr: get("SKU_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            database,
            scope: get("SKU_SCOPE").and_then(|raw| match raw.parse() {
                Ok(scope) => Some(scope),
                Err(e) => {
                    warn!("Ignoring SKU_SCOPE: {}", e);
                    None
                }
            }),
            clear_on_generate: parse_bool_or(&get, "SKU_CLEAR_ON_GENERATE", false),
            max_attempts: parse_or(&get, "SKU_MAX_ATTEMPTS", 64),
            suffix_len: parse_or(&get, "SKU_SUFFIX_LEN", 4),
            barcodes_enabled: parse_bool_or(&get, "SKU_BARCODES_ENABLED", true),
            barcode_dir: get("SKU_BARCODE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static/barcodes")),
            barcode_url_prefix: get("SKU_BARCODE_URL_PREFIX")
                .unwrap_or_else(|| "/static/barcodes".to_string()),
            barcode_height: parse_or(&get, "SKU_BARCODE_HEIGHT", DEFAULT_HEIGHT),
            export_dir: get("SKU_EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static/exports")),
            export_url_prefix: get("SKU_EXPORT_URL_PREFIX")
                .unwrap_or_else(|| "/static/exports".to_string()),
        }
    }

    /// Drop the database settings when the server falls back to the
    /// in-memory store, so the default scope matches the store in use.
    pub fn use_in_memory_store(&mut self) {
        self.database = None;
    }

    /// Check the settings the router mounts: both URL prefixes must be
    /// absolute, non-root and distinct.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let barcodes = normalize_url_prefix(&self.barcode_url_prefix).map_err(|reason| {
            ConfigError::InvalidUrlPrefix {
                key: "SKU_BARCODE_URL_PREFIX",
                reason,
            }
        })?;
        let exports = normalize_url_prefix(&self.export_url_prefix).map_err(|reason| {
            ConfigError::InvalidUrlPrefix {
                key: "SKU_EXPORT_URL_PREFIX",
                reason,
            }
        })?;
        if self.barcodes_enabled && barcodes == exports {
            return Err(ConfigError::ConflictingUrlPrefixes(barcodes));
        }
        Ok(())
    }

    pub fn effective_scope(&self) -> ReservationScope {
        self.scope.unwrap_or(if self.database.is_some() {
            ReservationScope::Global
        } else {
            ReservationScope::PerProduct
        })
    }

    pub fn registry_policy(&self) -> RegistryPolicy {
        RegistryPolicy {
            scope: self.effective_scope(),
            clear_on_generate: self.clear_on_generate,
            max_attempts: self.max_attempts,
        }
    }
}

/// Trim trailing slashes from a static mount prefix. The result must
/// start with `/` and name at least one path segment.
pub fn normalize_url_prefix(raw: &str) -> Result<String, String> {
    let prefix = raw.trim().trim_end_matches('/');
    if prefix.is_empty() {
        return Err(format!("'{raw}' does not name a path below the root"));
    }
    if !prefix.starts_with('/') {
        return Err(format!("'{raw}' must start with '/'"));
    }
    if prefix.chars().any(char::is_whitespace) {
        return Err(format!("'{raw}' must not contain whitespace"));
    }
    Ok(prefix.to_string())
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: '{}', using default", key, raw);
            default
        }),
        None => default,
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> bool
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            warn!("Invalid boolean for {}: '{}', using default", key, v);
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> SkuConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SkuConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_are_memory_per_product() {
        let cfg = SkuConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:5000");
        assert!(cfg.database.is_none());
        assert_eq!(cfg.effective_scope(), ReservationScope::PerProduct);
        assert!(!cfg.clear_on_generate);
        assert_eq!(cfg.max_attempts, 64);
        assert_eq!(cfg.suffix_len, 4);
        assert!(cfg.barcodes_enabled);
        assert_eq!(cfg.barcode_dir, PathBuf::from("static/barcodes"));
    }

    #[test]
    fn database_url_switches_default_scope_to_global() {
        let cfg = config(&[("DATABASE_URL", "postgresql://localhost/skus")]);
        let db = cfg.database.as_ref().unwrap();
        assert_eq!(db.max_connections, 10);
        assert_eq!(cfg.effective_scope(), ReservationScope::Global);

        let cfg = config(&[
            ("DATABASE_URL", "postgresql://localhost/skus"),
            ("SKU_SCOPE", "product"),
        ]);
        assert_eq!(cfg.effective_scope(), ReservationScope::PerProduct);
    }

    #[test]
    fn parses_policy_overrides() {
        let cfg = config(&[
            ("SKU_CLEAR_ON_GENERATE", "true"),
            ("SKU_MAX_ATTEMPTS", "5"),
            ("SKU_BARCODES_ENABLED", "off"),
        ]);
        let policy = cfg.registry_policy();
        assert!(policy.clear_on_generate);
        assert_eq!(policy.max_attempts, 5);
        assert!(!cfg.barcodes_enabled);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("SKU_MAX_ATTEMPTS", "lots"),
            ("SKU_CLEAR_ON_GENERATE", "maybe"),
            ("SKU_SCOPE", "tenant"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(cfg.max_attempts, 64);
        assert!(!cfg.clear_on_generate);
        assert!(cfg.scope.is_none());
        assert!(cfg.database.is_none());
    }

    #[test]
    fn in_memory_fallback_restores_per_product_scope() {
        let mut cfg = config(&[("DATABASE_URL", "postgresql://localhost/skus")]);
        assert_eq!(cfg.effective_scope(), ReservationScope::Global);

        cfg.use_in_memory_store();
        assert!(cfg.database.is_none());
        assert_eq!(cfg.registry_policy().scope, ReservationScope::PerProduct);

        let mut cfg = config(&[
            ("DATABASE_URL", "postgresql://localhost/skus"),
            ("SKU_SCOPE", "global"),
        ]);
        cfg.use_in_memory_store();
        assert_eq!(cfg.effective_scope(), ReservationScope::Global);
    }

    // ── URL prefixes ─────────────────────────────────────────────

    #[test]
    fn normalize_url_prefix_trims_and_rejects_root() {
        assert_eq!(normalize_url_prefix("/static/barcodes/").unwrap(), "/static/barcodes");
        assert_eq!(normalize_url_prefix(" /b ").unwrap(), "/b");
        assert!(normalize_url_prefix("/").is_err());
        assert!(normalize_url_prefix("//").is_err());
        assert!(normalize_url_prefix("").is_err());
        assert!(normalize_url_prefix("static/barcodes").is_err());
        assert!(normalize_url_prefix("/static files").is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert_eq!(SkuConfig::default().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_root_barcode_prefix() {
        let cfg = config(&[("SKU_BARCODE_URL_PREFIX", "/")]);
        match cfg.validate().unwrap_err() {
            ConfigError::InvalidUrlPrefix { key, .. } => assert_eq!(key, "SKU_BARCODE_URL_PREFIX"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_rejects_shared_prefixes() {
        let cfg = config(&[
            ("SKU_BARCODE_URL_PREFIX", "/static/"),
            ("SKU_EXPORT_URL_PREFIX", "/static"),
        ]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ConflictingUrlPrefixes("/static".into()))
        );

        // Only the export directory is mounted when barcodes are off.
        let cfg = config(&[
            ("SKU_BARCODE_URL_PREFIX", "/static"),
            ("SKU_EXPORT_URL_PREFIX", "/static"),
            ("SKU_BARCODES_ENABLED", "false"),
        ]);
        assert_eq!(cfg.validate(), Ok(()));
    }
}
