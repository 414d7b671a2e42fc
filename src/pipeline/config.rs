//! Extraction configuration
//!
//! Loaded from a JSON file. Every field is optional:
//!
//! ```json
//! {
//!   "stores": ["replychains", "people"],
//!   "do_not_filter": false,
//!   "max_depth": 256,
//!   "max_nodes": 1048576
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::idb::StoreFilter;
use crate::observability::{log_event_with_fields, Event};
use crate::v8::{ResolveLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES};

use super::errors::{PipelineError, PipelineResult};

/// Object stores that hold the messaging client's evidence.
pub const TEAMS_OBJECT_STORES: [&str; 4] = ["replychains", "conversations", "people", "buddylist"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Store allow-list (default: all four recognised stores)
    #[serde(default = "default_stores")]
    pub stores: Vec<String>,

    /// Emit every store, ignoring `stores`
    #[serde(default)]
    pub do_not_filter: bool,

    /// Nesting limit for V8 values
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Node budget for one value's resolved tree
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
}

fn default_stores() -> Vec<String> {
    TEAMS_OBJECT_STORES.iter().map(|s| s.to_string()).collect()
}
fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}
fn default_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stores: default_stores(),
            do_not_filter: false,
            max_depth: default_max_depth(),
            max_nodes: default_max_nodes(),
        }
    }
}

impl PipelineConfig {
    /// Every store, unfiltered.
    pub fn unfiltered() -> Self {
        Self {
            do_not_filter: true,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::config_unreadable(path.display(), e))?;

        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| PipelineError::config_invalid(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        let path_str = path.display().to_string();
        let stores = if config.do_not_filter {
            "*".to_string()
        } else {
            config.stores.join(",")
        };
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", path_str.as_str()), ("stores", stores.as_str())],
        );

        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.max_depth == 0 {
            return Err(PipelineError::config_invalid("max_depth must be > 0"));
        }
        if self.max_nodes == 0 {
            return Err(PipelineError::config_invalid("max_nodes must be > 0"));
        }

        if self.do_not_filter {
            return Ok(());
        }

        if self.stores.is_empty() {
            return Err(PipelineError::config_invalid(
                "stores must not be empty unless do_not_filter is set",
            ));
        }

        for store in &self.stores {
            if !TEAMS_OBJECT_STORES.contains(&store.as_str()) {
                return Err(PipelineError::config_invalid(format!(
                    "Unknown store: '{}'. Expected one of: {}",
                    store,
                    TEAMS_OBJECT_STORES.join(", ")
                )));
            }
        }

        Ok(())
    }

    pub fn resolve_limits(&self) -> ResolveLimits {
        ResolveLimits {
            max_depth: self.max_depth,
            max_nodes: self.max_nodes,
        }
    }

    pub fn store_filter(&self) -> StoreFilter {
        if self.do_not_filter {
            StoreFilter::All
        } else {
            StoreFilter::only(self.stores.iter().cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let file = write_config("{}");
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.max_depth, 256);
        assert_eq!(config.max_nodes, 1 << 20);
        assert_eq!(config.stores.len(), 4);
    }

    #[test]
    fn test_partial_config() {
        let file = write_config(r#"{"stores": ["people"], "max_depth": 32}"#);
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.stores, vec!["people".to_string()]);
        assert_eq!(config.max_depth, 32);
        assert_eq!(config.store_filter(), StoreFilter::only(["people"]));
    }

    #[test]
    fn test_unknown_store_rejected() {
        let file = write_config(r#"{"stores": ["calendar"]}"#);
        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert!(err.message().contains("calendar"));
    }

    #[test]
    fn test_empty_allow_list() {
        let config = PipelineConfig {
            stores: vec![],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            stores: vec![],
            do_not_filter: true,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.store_filter(), StoreFilter::All);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = PipelineConfig {
            max_depth: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            max_nodes: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_limits() {
        let file = write_config(r#"{"max_depth": 16, "max_nodes": 500}"#);
        let limits = PipelineConfig::load(file.path()).unwrap().resolve_limits();
        assert_eq!(
            limits,
            ResolveLimits {
                max_depth: 16,
                max_nodes: 500
            }
        );
    }

    #[test]
    fn test_malformed_json() {
        let file = write_config("{stores: }");
        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert!(err.message().contains("Invalid config JSON"));
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/idbx.json")).unwrap_err();
        assert_eq!(err.message(), "failed to read config");
    }
}
