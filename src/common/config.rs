//! Configuration file handling and adapter discovery

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Debug adapter configurations
    #[serde(default)]
    pub adapters: HashMap<String, AdapterConfig>,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Adapter kind for specialized launch argument handling
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// lldb-dap (LLVM debugger)
    #[default]
    LldbDap,
    /// debugpy (Python debugger)
    Debugpy,
    /// CodeLLDB (VSCode extension)
    Codelldb,
    /// Generic DAP adapter (no special handling)
    Generic,
}

/// Configuration for a debug adapter
#[derive(Debug, Deserialize, Clone)]
pub struct AdapterConfig {
    /// Path to the adapter executable
    pub path: PathBuf,

    /// Additional arguments to pass to the adapter
    #[serde(default)]
    pub args: Vec<String>,

    /// Adapter kind for specialized handling
    #[serde(default)]
    pub kind: AdapterKind,
}

/// Default settings
#[derive(Debug, Deserialize)]
pub struct Defaults {
    /// Default adapter to use
    #[serde(default = "default_adapter")]
    pub adapter: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
        }
    }
}

fn default_adapter() -> String {
    "lldb-dap".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Timeout for the DAP initialize handshake (initialize request
    /// through the `initialized` event)
    #[serde(default = "default_dap_initialize")]
    pub dap_initialize_secs: u64,

    /// Timeout for general DAP requests
    #[serde(default = "default_dap_request")]
    pub dap_request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dap_initialize_secs: default_dap_initialize(),
            dap_request_secs: default_dap_request(),
        }
    }
}

fn default_dap_initialize() -> u64 {
    10
}
fn default_dap_request() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return toml::from_str(&content)
                    .map_err(|e| super::Error::ConfigParse(e.to_string()));
            }
        }
        Ok(Self::default())
    }

    /// Resolve adapter configuration by name
    ///
    /// Checks an explicit `[adapters.<name>]` table entry first, then
    /// falls back to a `PATH` search, inferring the adapter kind from
    /// the binary name.
    pub fn get_adapter(&self, name: &str) -> Option<AdapterConfig> {
        if let Some(config) = self.adapters.get(name) {
            return Some(config.clone());
        }

        which::which(name).ok().map(|path| {
            let kind = match name {
                "lldb-dap" | "lldb-vscode" => AdapterKind::LldbDap,
                "debugpy" | "debugpy-adapter" => AdapterKind::Debugpy,
                "codelldb" => AdapterKind::Codelldb,
                _ => AdapterKind::Generic,
            };
            AdapterConfig {
                path,
                args: Vec::new(),
                kind,
            }
        })
    }
}

/// Resolves an adapter name to a concrete executable + argv, the minimal
/// slice of adapter discovery a runnable console actually needs: no
/// download/install pipeline, just config lookup then a `PATH` search.
pub struct AdapterRegistry;

impl AdapterRegistry {
    pub fn resolve(name: &str, config: &Config) -> Result<AdapterConfig> {
        config.get_adapter(name).ok_or_else(|| {
            super::Error::adapter_not_found(name, &["[adapters] table", "$PATH"])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_lldb_dap_default() {
        let config = Config::default();
        assert_eq!(config.defaults.adapter, "lldb-dap");
        assert_eq!(config.timeouts.dap_request_secs, 30);
    }

    #[test]
    fn registry_reports_adapter_not_found_with_search_paths() {
        let config = Config::default();
        let err = AdapterRegistry::resolve("definitely-not-a-real-adapter", &config).unwrap_err();
        assert!(matches!(err, super::super::Error::AdapterNotFound { .. }));
    }

    #[test]
    fn explicit_adapter_config_wins_over_path_search() {
        let mut config = Config::default();
        config.adapters.insert(
            "custom".to_string(),
            AdapterConfig {
                path: PathBuf::from("/opt/adapters/custom"),
                args: vec!["--stdio".to_string()],
                kind: AdapterKind::Generic,
            },
        );

        let resolved = config.get_adapter("custom").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/opt/adapters/custom"));
        assert_eq!(resolved.args, vec!["--stdio".to_string()]);
    }
}
