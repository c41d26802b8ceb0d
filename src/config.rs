use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Entra ID tenant (default: "common")
    #[serde(default = "default_tenant")]
    pub tenant: String,
    /// Public client application used for the device code flow
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// SharePoint Online tenant URL, e.g. https://contoso.sharepoint.com
    #[serde(default)]
    pub spo_url: String,
}

fn default_tenant() -> String {
    "common".to_string()
}

fn default_client_id() -> String {
    "31359c7f-bd7e-475c-86db-fdb8c937548e".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tenant: default_tenant(),
            client_id: default_client_id(),
            spo_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format
    #[serde(default = "default_format")]
    pub default_format: String,
    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Ask the user to pick when a name matches several objects
    #[serde(default = "default_true")]
    pub prompt: bool,
    /// Ask for confirmation before destructive operations
    #[serde(default = "default_true")]
    pub confirm: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            prompt: default_true(),
            confirm: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

impl Config {
    /// Get the project directories
    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "m365-cli", "m365-cli")
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs().context("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the cache directory
    pub fn cache_dir() -> Result<PathBuf> {
        let dirs = Self::project_dirs().context("Could not determine cache directory")?;
        Ok(dirs.cache_dir().to_path_buf())
    }

    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))
        } else {
            Ok(Self::default())
        }
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.auth.tenant, "common");
        assert_eq!(config.auth.client_id, "31359c7f-bd7e-475c-86db-fdb8c937548e");
        assert_eq!(config.output.default_format, "json");
        assert!(config.behavior.prompt);
        assert!(config.behavior.confirm);
        assert_eq!(config.api.timeout, 30);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
[auth]
tenant = "contoso.onmicrosoft.com"
spo_url = "https://contoso.sharepoint.com"

[behavior]
prompt = false
"#,
        )
        .unwrap();
        assert_eq!(config.auth.tenant, "contoso.onmicrosoft.com");
        assert_eq!(config.auth.spo_url, "https://contoso.sharepoint.com");
        assert_eq!(config.auth.client_id, "31359c7f-bd7e-475c-86db-fdb8c937548e");
        assert!(!config.behavior.prompt);
        assert!(config.behavior.confirm);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::parse("[auth\ntenant=").is_err());
    }
}
