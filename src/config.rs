use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub flow: FlowConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rest_api: RestApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the local store and logs
    pub state: String,
}

/// Screening flow layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Template titles in the order the forms are filled in
    pub form_sequence: Vec<String>,
    /// Route prefix placed before the slugged template title,
    /// `{project}` is replaced with the project id
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

fn default_route_prefix() -> String {
    "/employee/project/{project}/dashboard/screening/".to_string()
}

fn default_form_sequence() -> Vec<String> {
    [
        "Demographic Details",
        "Medical History",
        "Medical Examination",
        "Systemic Examination",
        "ECG Evaluation",
        "ECG",
        "X-Ray Evaluation",
        "COVID-19 Screening",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Primary REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_api_token_env")]
    pub token_env: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_token_env() -> String {
    "CAPTURE_API_TOKEN".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            token_env: default_api_token_env(),
            timeout_secs: default_api_timeout(),
        }
    }
}

/// Secondary store used when the primary API rejects a form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    /// Environment variable holding the anon/service key
    #[serde(default = "default_supabase_key_env")]
    pub key_env: String,
    #[serde(default = "default_supabase_table")]
    pub table: String,
}

fn default_supabase_key_env() -> String {
    "CAPTURE_SUPABASE_KEY".to_string()
}

fn default_supabase_table() -> String {
    "patient_forms".to_string()
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            key_env: default_supabase_key_env(),
            table: default_supabase_table(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether the API server logs to a file (false = stderr)
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_to_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestApiConfig {
    #[serde(default = "default_rest_port")]
    pub port: u16,
}

fn default_rest_port() -> u16 {
    crate::rest::DEFAULT_PORT
}

impl Default for RestApiConfig {
    fn default() -> Self {
        Self {
            port: default_rest_port(),
        }
    }
}

impl Config {
    /// Path to the project-local config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".capture/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so capture works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/clinical-capture/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("clinical-capture").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. CAPTURE__API__BASE_URL
        builder = builder.add_source(
            config::Environment::with_prefix("CAPTURE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .capture/config.toml
    pub fn save(&self) -> Result<()> {
        let config_path = Self::project_config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get path to the local store document
    pub fn store_path(&self) -> PathBuf {
        self.state_path().join("store.json")
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    /// Primary API bearer token, if the configured variable is set
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.api.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }

    /// Secondary store key, if the configured variable is set
    pub fn supabase_key(&self) -> Option<String> {
        std::env::var(&self.supabase.key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                state: ".capture".to_string(),
            },
            flow: FlowConfig {
                form_sequence: default_form_sequence(),
                route_prefix: default_route_prefix(),
            },
            api: ApiConfig::default(),
            supabase: SupabaseConfig::default(),
            logging: LoggingConfig::default(),
            rest_api: RestApiConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_sequence_starts_with_demographics() {
        let config = Config::default();
        assert_eq!(config.flow.form_sequence[0], "Demographic Details");
        assert_eq!(config.flow.form_sequence.len(), 8);
    }

    #[test]
    fn test_store_path_under_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.state = temp_dir.path().to_string_lossy().to_string();

        assert_eq!(config.store_path(), temp_dir.path().join("store.json"));
        assert!(config.logs_path().ends_with("logs"));
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("capture.toml");
        std::fs::write(
            &path,
            r#"
[paths]
state = "/var/lib/capture"

[flow]
form_sequence = ["Demographic Details", "Medical History"]

[api]
base_url = "https://api.example.org"
"#,
        )
        .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.paths.state, "/var/lib/capture");
        assert_eq!(config.flow.form_sequence.len(), 2);
        assert_eq!(config.api.base_url, "https://api.example.org");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.supabase.table, "patient_forms");
    }

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.rest_api.port, config.rest_api.port);
        assert_eq!(parsed.flow.route_prefix, config.flow.route_prefix);
    }
}
