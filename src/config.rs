use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Whether renditions can be read through the repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RenditionCapability { None, Read }

/// Join support advertised to clients. Execution of joins is not available in any mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinCapability { None, InnerOnly, InnerAndOuter }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Capabilities {
    pub multifiling: bool,
    pub unfiling: bool,
    pub version_specific_filing: bool,
    pub get_descendants: bool,
    pub get_folder_tree: bool,
    pub all_versions_searchable: bool,
    pub renditions: RenditionCapability,
    pub join: JoinCapability,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            multifiling: true,
            unfiling: true,
            version_specific_filing: false,
            get_descendants: true,
            get_folder_tree: true,
            all_versions_searchable: true,
            renditions: RenditionCapability::None,
            join: JoinCapability::None,
        }
    }
}

/// Index synchronizer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub enabled: bool,
    /// Feed extracted content stream text into the full-text body
    pub extract_content: bool,
    pub max_extracted_chars: usize,
    /// Capacity of the failure log kept by the synchronizer
    pub max_failures_kept: usize,
    pub supports_wildcards: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extract_content: true,
            max_extracted_chars: 1024 * 1024,
            max_failures_kept: 256,
            supports_wildcards: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    pub repository_id: String,
    pub repository_name: String,
    pub description: String,
    /// Principal recorded as creator when a draft carries none
    pub default_principal: String,
    /// Number of stripes in the per-object mutation lock table
    pub lock_stripes: usize,
    pub capabilities: Capabilities,
    pub index: IndexConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            repository_id: "folio".to_string(),
            repository_name: "folio content repository".to_string(),
            description: String::new(),
            default_principal: "system".to_string(),
            lock_stripes: 64,
            capabilities: Capabilities::default(),
            index: IndexConfig::default(),
        }
    }
}

/// Partial settings layered over a base config; every field left `None` keeps the base value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverlay {
    pub repository_id: Option<String>,
    pub repository_name: Option<String>,
    pub default_principal: Option<String>,
    pub multifiling: Option<bool>,
    pub unfiling: Option<bool>,
    pub index_enabled: Option<bool>,
    pub extract_content: Option<bool>,
    pub supports_wildcards: Option<bool>,
}

impl ConfigOverlay {
    /// Read `FOLIO_*` variables through `lookup`. Unparseable booleans are ignored.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let flag = |k: &str| lookup(k).and_then(|v| parse_bool(&v));
        Self {
            repository_id: lookup("FOLIO_REPOSITORY_ID"),
            repository_name: lookup("FOLIO_REPOSITORY_NAME"),
            default_principal: lookup("FOLIO_DEFAULT_PRINCIPAL"),
            multifiling: flag("FOLIO_MULTIFILING"),
            unfiling: flag("FOLIO_UNFILING"),
            index_enabled: flag("FOLIO_INDEX_ENABLED"),
            extract_content: flag("FOLIO_INDEX_EXTRACT_CONTENT"),
            supports_wildcards: flag("FOLIO_INDEX_WILDCARDS"),
        }
    }

    pub fn from_env() -> Self { Self::from_lookup(|k| std::env::var(k).ok()) }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl RepositoryConfig {
    /// Base config overlaid by `overlay`; overlay wins wherever it is set.
    pub fn from_layers(base: &RepositoryConfig, overlay: &ConfigOverlay) -> Self {
        let mut cfg = base.clone();
        if let Some(v) = &overlay.repository_id { cfg.repository_id = v.clone(); }
        if let Some(v) = &overlay.repository_name { cfg.repository_name = v.clone(); }
        if let Some(v) = &overlay.default_principal { cfg.default_principal = v.clone(); }
        if let Some(v) = overlay.multifiling { cfg.capabilities.multifiling = v; }
        if let Some(v) = overlay.unfiling { cfg.capabilities.unfiling = v; }
        if let Some(v) = overlay.index_enabled { cfg.index.enabled = v; }
        if let Some(v) = overlay.extract_content { cfg.index.extract_content = v; }
        if let Some(v) = overlay.supports_wildcards { cfg.index.supports_wildcards = v; }
        cfg
    }

    /// Load JSON settings from `path` when given and present, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(p) = path else { return Ok(Self::default()); };
        if !p.exists() {
            tracing::debug!(target: "folio::config", "config file {} not found; using defaults", p.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(p).with_context(|| format!("reading config {}", p.display()))?;
        let cfg: RepositoryConfig = serde_json::from_str(&text).with_context(|| format!("parsing config {}", p.display()))?;
        if cfg.lock_stripes == 0 { anyhow::bail!("lock_stripes must be at least 1"); }
        Ok(cfg)
    }

    /// File settings (if any) with `FOLIO_*` environment overrides applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = Self::load_or_default(path)?;
        Ok(Self::from_layers(&base, &ConfigOverlay::from_env()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RepositoryConfig::load_or_default(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(cfg, RepositoryConfig::default());
        assert!(cfg.capabilities.multifiling);
        assert_eq!(cfg.default_principal, "system");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"repository_name":"docs","capabilities":{{"unfiling":false}},"index":{{"supports_wildcards":false}}}}"#).unwrap();
        let cfg = RepositoryConfig::load_or_default(Some(f.path())).unwrap();
        assert_eq!(cfg.repository_name, "docs");
        assert!(!cfg.capabilities.unfiling);
        assert!(cfg.capabilities.multifiling);
        assert!(!cfg.index.supports_wildcards);
        assert!(cfg.index.enabled);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{not json").unwrap();
        let err = RepositoryConfig::load_or_default(Some(f.path())).unwrap_err();
        assert!(err.to_string().contains("parsing config"));
    }

    #[test]
    fn overlay_wins_where_set() {
        let env: HashMap<&str, &str> = [("FOLIO_REPOSITORY_ID", "r2"), ("FOLIO_MULTIFILING", "off"), ("FOLIO_UNFILING", "maybe")].into_iter().collect();
        let overlay = ConfigOverlay::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        let cfg = RepositoryConfig::from_layers(&RepositoryConfig::default(), &overlay);
        assert_eq!(cfg.repository_id, "r2");
        assert!(!cfg.capabilities.multifiling);
        // unparseable flag leaves the base value
        assert!(cfg.capabilities.unfiling);
    }
}
