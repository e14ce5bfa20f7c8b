//! File-backed `TenantConfigStore`: loads the global document from
//! `PALISADE_CONFIG_PATH` once at startup, with path-traversal and
//! size-limit safeguards, plus an in-memory map of tenant overlays
//! optionally loaded from a directory of per-tenant JSON files.

use ahash::HashMap as AHashMap;
use log::{debug, warn};
use palisade_core::gateway::TenantConfigStore;
use palisade_core::models::config::{GlobalConfig, TenantOverlay};
use std::fs;
use std::path::Path;

const MAX_CONFIG_SIZE: u64 = 10 * 1024 * 1024;

/// Loads and validates the global configuration document from the file
/// system: the path must exist, resolve inside the current working
/// directory, and be no larger than 10MB.
pub fn load_global_config() -> Result<GlobalConfig, Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("PALISADE_CONFIG_PATH").unwrap_or_else(|_| "./config.json".to_string());
    load_global_config_from(&config_path)
}

fn load_global_config_from(config_path: &str) -> Result<GlobalConfig, Box<dyn std::error::Error>> {
    debug!("loading configuration from: {}", config_path);

    let path = Path::new(config_path);
    if !path.exists() {
        return Err(format!("cannot resolve config path '{}'", config_path).into());
    }

    let canonical_path = path
        .canonicalize()
        .map_err(|e| format!("cannot resolve config path '{}': {}", config_path, e))?;
    let current_dir = std::env::current_dir()
        .map_err(|e| format!("cannot get current directory: {}", e))?;
    if !canonical_path.starts_with(&current_dir) {
        warn!("config path '{}' is outside the working directory", config_path);
        return Err("config path outside working directory".into());
    }

    let metadata = fs::metadata(&canonical_path)
        .map_err(|e| format!("cannot read config file metadata: {}", e))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(format!(
            "config file too large: {} bytes (max: {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        )
        .into());
    }

    let raw = fs::read_to_string(&canonical_path)
        .map_err(|e| format!("cannot read config file: {}", e))?;
    let global: GlobalConfig =
        serde_json::from_str(&raw).map_err(|e| format!("invalid JSON: {}", e))?;

    debug!(
        "loaded configuration with {} backends, {} routes",
        global.backend_services.len(),
        global.routes.len()
    );
    Ok(global)
}

/// Loads one [`TenantOverlay`] per `<tenant-id>.json` file in `dir`. Missing
/// or unreadable directories yield an empty map rather than an error — per-
/// tenant overlays are optional.
pub fn load_tenant_overlays(dir: &str) -> AHashMap<String, TenantOverlay> {
    let mut overlays = AHashMap::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return overlays,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let tenant_id = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };
        match fs::read_to_string(&path).ok().and_then(|raw| serde_json::from_str(&raw).ok()) {
            Some(overlay) => {
                overlays.insert(tenant_id, overlay);
            }
            None => warn!("skipping unreadable tenant overlay: {}", path.display()),
        }
    }
    overlays
}

/// A `TenantConfigStore` backed by configuration read once at process
/// startup. Runtime mutations made through `GatewayModule`'s `add_backend`/
/// `add_backend_route`/etc. live only in the module's in-memory
/// `GlobalConfig`; this store is consulted again whenever a tenant
/// dispatcher is rebuilt, to pick up that tenant's overlay.
pub struct FileTenantConfigStore {
    global: GlobalConfig,
    overlays: AHashMap<String, TenantOverlay>,
}

impl FileTenantConfigStore {
    pub fn new(global: GlobalConfig, overlays: AHashMap<String, TenantOverlay>) -> Self {
        Self { global, overlays }
    }
}

impl TenantConfigStore for FileTenantConfigStore {
    fn global_config(&self) -> GlobalConfig {
        self.global.clone()
    }

    fn tenant_overlay(&self, tenant_id: &str) -> Option<TenantOverlay> {
        self.overlays.get(tenant_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_global_config_rejects_missing_file() {
        let err = load_global_config_from("./does-not-exist.json").unwrap_err();
        assert!(err.to_string().contains("cannot resolve config path"));
    }

    #[test]
    fn load_global_config_parses_a_minimal_document() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let path = dir.path().join("config.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{"backend_services": {{}}, "routes": {{}}}}"#).unwrap();

        let global = load_global_config_from(path.to_str().unwrap()).unwrap();
        assert!(global.backend_services.is_empty());
    }

    #[test]
    fn load_global_config_rejects_oversized_file() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let path = dir.path().join("config.json");
        let mut file = fs::File::create(&path).unwrap();
        let padding = "x".repeat((MAX_CONFIG_SIZE as usize) + 1);
        write!(file, r#"{{"padding": "{}"}}"#, padding).unwrap();

        let err = load_global_config_from(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn load_tenant_overlays_returns_empty_map_for_missing_directory() {
        let overlays = load_tenant_overlays("./does-not-exist-dir");
        assert!(overlays.is_empty());
    }

    #[test]
    fn load_tenant_overlays_reads_one_file_per_tenant() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let path = dir.path().join("acme.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{"require_tenant_id": true}}"#).unwrap();

        let overlays = load_tenant_overlays(dir.path().to_str().unwrap());
        assert!(overlays.get("acme").unwrap().require_tenant_id);
    }
}
