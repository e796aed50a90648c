//! CLI configuration loading and merging.
//!
//! Configuration precedence:
//! 1. CLI flags
//! 2. Environment variables (`TANDEM_*`)
//! 3. Local config file (`./.tandemrc`)
//! 4. Global config file (`~/.tandem/config.toml`)
//! 5. Defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tandem_control::ControlPlaneConfig;
use tandem_control::config::{ENV_ACCOUNT_ID, ENV_BASE_URL, ENV_INFERENCE_URL};

/// Values read from the TOML config files.
///
/// The API key is never read from a file; it comes from `TANDEM_API_KEY`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub inference_url: Option<String>,

    /// Default base model for trainers and deployments.
    #[serde(default)]
    pub base_model: Option<String>,

    #[serde(default)]
    pub log_level: Option<String>,

    /// Headers added to every control-plane request.
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Output format preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Always print JSON, as if `--json` were passed.
    #[serde(default)]
    pub json: bool,
}

/// Flags that override file and environment values.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub account_id: Option<String>,
    pub base_url: Option<String>,
}

impl CliConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }

    pub fn default_global_path() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".tandem").join("config.toml")
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".tandemrc")
    }

    /// Loads the global then the local config file. Missing files are skipped;
    /// a file that exists but does not parse is an error.
    pub fn discover_and_load() -> anyhow::Result<Self> {
        Self::load_layers(&[Self::default_global_path(), Self::default_local_path()])
    }

    /// Merges the files at `paths` in order, later files winning.
    pub fn load_layers(paths: &[PathBuf]) -> anyhow::Result<Self> {
        let mut config = Self::default();
        for path in paths.iter().filter(|p| p.exists()) {
            config.merge(&Self::load_from_file(path)?);
        }
        Ok(config)
    }

    /// Values from `other` override values in `self` when set.
    pub fn merge(&mut self, other: &Self) {
        if other.account_id.is_some() {
            self.account_id.clone_from(&other.account_id);
        }
        if other.base_url.is_some() {
            self.base_url.clone_from(&other.base_url);
        }
        if other.inference_url.is_some() {
            self.inference_url.clone_from(&other.inference_url);
        }
        if other.base_model.is_some() {
            self.base_model.clone_from(&other.base_model);
        }
        if other.log_level.is_some() {
            self.log_level.clone_from(&other.log_level);
        }
        self.extra_headers.extend(other.extra_headers.clone());
        if other.output.json {
            self.output.json = true;
        }
    }

    /// Builds the control-plane configuration from the process environment.
    pub fn control_plane_config(&self, overrides: &Overrides) -> anyhow::Result<ControlPlaneConfig> {
        self.control_plane_config_with(|key| std::env::var(key).ok(), overrides)
    }

    /// Same as [`control_plane_config`](Self::control_plane_config) with a
    /// custom environment source.
    pub fn control_plane_config_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> anyhow::Result<ControlPlaneConfig> {
        let lookup = |key: &str| {
            let from_flag = match key {
                ENV_ACCOUNT_ID => overrides.account_id.clone(),
                ENV_BASE_URL => overrides.base_url.clone(),
                _ => None,
            };
            let from_file = || match key {
                ENV_ACCOUNT_ID => self.account_id.clone(),
                ENV_BASE_URL => self.base_url.clone(),
                ENV_INFERENCE_URL => self.inference_url.clone(),
                _ => None,
            };
            from_flag.or_else(|| env(key)).or_else(from_file)
        };

        let mut config = ControlPlaneConfig::from_lookup(lookup)?;
        for (name, value) in &self.extra_headers {
            config.extra_headers.entry(name.clone()).or_insert_with(|| value.clone());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
account_id = "acme"
base_url = "https://control.example.com"
base_model = "qwen3-8b"
log_level = "debug"

[extra_headers]
x-gateway = "abc"

[output]
json = true
"#,
        )
        .unwrap();

        let config = CliConfig::load_from_file(&path).unwrap();
        assert_eq!(config.account_id.as_deref(), Some("acme"));
        assert_eq!(config.base_url.as_deref(), Some("https://control.example.com"));
        assert_eq!(config.base_model.as_deref(), Some("qwen3-8b"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.extra_headers.get("x-gateway").map(String::as_str), Some("abc"));
        assert!(config.output.json);
    }

    #[test]
    fn test_local_overrides_global() {
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("config.toml");
        let local = temp_dir.path().join(".tandemrc");
        std::fs::write(&global, "account_id = \"global\"\nbase_model = \"m1\"\n").unwrap();
        std::fs::write(&local, "account_id = \"local\"\n").unwrap();

        let config = CliConfig::load_layers(&[global, local, temp_dir.path().join("missing.toml")]).unwrap();
        assert_eq!(config.account_id.as_deref(), Some("local"));
        assert_eq!(config.base_model.as_deref(), Some("m1"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".tandemrc");
        std::fs::write(&path, "account_id = [").unwrap();

        let err = CliConfig::load_layers(&[path]).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_env_overrides_file_and_flags_override_env() {
        let file = CliConfig {
            account_id: Some("from-file".to_string()),
            base_url: Some("https://file.example.com".to_string()),
            inference_url: Some("https://infer.example.com".to_string()),
            ..Default::default()
        };
        let env = env_from(&[
            ("TANDEM_API_KEY", "key"),
            ("TANDEM_ACCOUNT_ID", "from-env"),
            ("TANDEM_BASE_URL", "https://env.example.com"),
        ]);

        let config = file.control_plane_config_with(&env, &Overrides::default()).unwrap();
        assert_eq!(config.account_id, "from-env");
        assert_eq!(config.base_url, "https://env.example.com");
        assert_eq!(config.inference_url, "https://infer.example.com");

        let flags = Overrides { account_id: Some("from-flag".to_string()), base_url: None };
        let config = file.control_plane_config_with(&env, &flags).unwrap();
        assert_eq!(config.account_id, "from-flag");
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        let file = CliConfig { account_id: Some("acme".to_string()), ..Default::default() };
        let err = file.control_plane_config_with(env_from(&[]), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("TANDEM_API_KEY"));
    }

    #[test]
    fn test_env_headers_win_over_file_headers() {
        let mut file = CliConfig { account_id: Some("acme".to_string()), ..Default::default() };
        file.extra_headers.insert("x-a".to_string(), "file".to_string());
        file.extra_headers.insert("x-b".to_string(), "file".to_string());
        let env = env_from(&[("TANDEM_API_KEY", "key"), ("TANDEM_EXTRA_HEADERS", "x-a=env")]);

        let config = file.control_plane_config_with(env, &Overrides::default()).unwrap();
        assert_eq!(config.extra_headers.get("x-a").map(String::as_str), Some("env"));
        assert_eq!(config.extra_headers.get("x-b").map(String::as_str), Some("file"));
    }
}
