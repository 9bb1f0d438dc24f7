//! Configuration module for the callbridge server
//!
//! This module handles server configuration from two sources: YAML files and
//! environment variables. Environment variables always override YAML values.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use callbridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::cache::PromptCacheConfig;
use crate::core::call_control::HttpCallControlConfig;
use crate::core::conversation::FlowConfig;
use crate::core::speech::HttpSpeechConfig;
use crate::core::transfer::TransferConfig;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use validation::SUPPORTED_SPEECH_RATES;

/// Timeout for telephony provider REST calls.
const TELEPHONY_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration
///
/// Contains everything needed to run the call engine:
/// - Server settings (host, port, public URL, answer mode)
/// - Conversation timing and retry caps
/// - Transfer, hold queue and call-state store lifetimes
/// - Speech, directory and telephony collaborators
/// - Prompt audio cache settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, without trailing slash.
    pub public_url: String,
    /// Answer calls by connecting a media stream; `false` uses gather markup.
    pub voice_media_stream: bool,

    // Conversation flow
    pub flow_max_attempts: u8,
    pub flow_identification_timeout_secs: u64,
    pub flow_menu_timeout_secs: u64,
    pub flow_confirm_timeout_secs: u64,
    pub flow_pin_length: usize,

    // Transfer and hold queue
    pub transfer_default_representative: Option<String>,
    pub transfer_representative_timeout_secs: u64,
    pub transfer_intent_ttl_secs: u64,
    pub transfer_hold_announcement_secs: u64,

    // Call-state store
    pub store_session_ttl_secs: u64,
    pub store_sweep_interval_secs: u64,

    // Speech service
    pub speech_url: String,
    pub speech_api_key: Option<String>,
    pub speech_voice: String,
    pub speech_sample_rate: u32,
    pub speech_timeout_ms: u64,
    pub speech_max_retries: u32,

    // Business-data directory
    pub directory_url: Option<String>,
    pub directory_api_key: Option<String>,
    pub directory_fixture_path: Option<PathBuf>,

    // Telephony provider
    pub telephony_api_url: Option<String>,
    pub telephony_account_id: Option<String>,
    pub telephony_auth_token: Option<String>,

    // Prompt audio cache
    pub cache_max_prompts: u64,
    pub cache_ttl_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            public_url: "http://localhost:3001".to_string(),
            voice_media_stream: true,
            flow_max_attempts: 2,
            flow_identification_timeout_secs: 8,
            flow_menu_timeout_secs: 6,
            flow_confirm_timeout_secs: 6,
            flow_pin_length: 4,
            transfer_default_representative: None,
            transfer_representative_timeout_secs: 20,
            transfer_intent_ttl_secs: 120,
            transfer_hold_announcement_secs: 30,
            store_session_ttl_secs: 900,
            store_sweep_interval_secs: 30,
            speech_url: "http://localhost:8090".to_string(),
            speech_api_key: None,
            speech_voice: "default".to_string(),
            speech_sample_rate: 16_000,
            speech_timeout_ms: 5_000,
            speech_max_retries: 1,
            directory_url: None,
            directory_api_key: None,
            directory_fixture_path: None,
            telephony_api_url: None,
            telephony_account_id: None,
            telephony_auth_token: None,
            cache_max_prompts: 512,
            cache_ttl_seconds: 86_400,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// The merged configuration is validated before it is returned.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // No .env loading here: with an explicit YAML file only real
        // environment variables override it.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute URL of a callback route, e.g. `callback_url("/voice/gather")`.
    pub fn callback_url(&self, path: &str) -> String {
        format!("{}{}", self.public_url, path)
    }

    /// WebSocket URL the provider streams call audio to.
    pub fn media_stream_url(&self) -> String {
        let base = if let Some(rest) = self.public_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.public_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.public_url.clone()
        };
        format!("{base}/media")
    }

    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            max_attempts: self.flow_max_attempts,
            identification_timeout: Duration::from_secs(self.flow_identification_timeout_secs),
            menu_timeout: Duration::from_secs(self.flow_menu_timeout_secs),
            confirm_timeout: Duration::from_secs(self.flow_confirm_timeout_secs),
            pin_length: self.flow_pin_length,
        }
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            default_representative: self.transfer_default_representative.clone(),
            representative_timeout: Duration::from_secs(self.transfer_representative_timeout_secs),
            intent_ttl: Duration::from_secs(self.transfer_intent_ttl_secs),
            hold_announcement_interval: Duration::from_secs(self.transfer_hold_announcement_secs),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.store_session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.store_sweep_interval_secs)
    }

    pub fn speech_config(&self) -> HttpSpeechConfig {
        HttpSpeechConfig {
            base_url: self.speech_url.clone(),
            api_key: self.speech_api_key.clone(),
            voice: self.speech_voice.clone(),
            sample_rate: self.speech_sample_rate,
            timeout: Duration::from_millis(self.speech_timeout_ms),
            max_retries: self.speech_max_retries,
        }
    }

    pub fn cache_config(&self) -> PromptCacheConfig {
        PromptCacheConfig {
            max_entries: self.cache_max_prompts,
            ttl: Duration::from_secs(self.cache_ttl_seconds),
        }
    }

    /// Provider REST settings, when all three are configured.
    pub fn call_control_config(&self) -> Option<HttpCallControlConfig> {
        match (
            &self.telephony_api_url,
            &self.telephony_account_id,
            &self.telephony_auth_token,
        ) {
            (Some(api_url), Some(account_id), Some(auth_token)) => Some(HttpCallControlConfig {
                api_url: api_url.clone(),
                account_id: account_id.clone(),
                auth_token: auth_token.clone(),
                timeout: TELEPHONY_TIMEOUT,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            for var in [
                "HOST",
                "PORT",
                "PUBLIC_URL",
                "VOICE_MEDIA_STREAM",
                "FLOW_MAX_ATTEMPTS",
                "FLOW_MENU_TIMEOUT_SECS",
                "SPEECH_SAMPLE_RATE",
                "DIRECTORY_URL",
                "DIRECTORY_FIXTURE_PATH",
                "TELEPHONY_API_URL",
                "TELEPHONY_ACCOUNT_ID",
                "TELEPHONY_AUTH_TOKEN",
            ] {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_address() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..ServerConfig::default()
        };
        assert_eq!(config.address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_callback_and_stream_urls() {
        let config = ServerConfig {
            public_url: "https://calls.example.com".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.callback_url("/voice/gather"),
            "https://calls.example.com/voice/gather"
        );
        assert_eq!(config.media_stream_url(), "wss://calls.example.com/media");

        let local = ServerConfig::default();
        assert_eq!(local.media_stream_url(), "ws://localhost:3001/media");
    }

    #[test]
    fn test_derived_component_configs() {
        let config = ServerConfig {
            flow_max_attempts: 3,
            flow_menu_timeout_secs: 10,
            transfer_default_representative: Some("+15559870000".to_string()),
            speech_timeout_ms: 2500,
            ..ServerConfig::default()
        };

        let flow = config.flow_config();
        assert_eq!(flow.max_attempts, 3);
        assert_eq!(flow.menu_timeout, Duration::from_secs(10));

        let transfer = config.transfer_config();
        assert_eq!(
            transfer.default_representative,
            Some("+15559870000".to_string())
        );
        assert_eq!(transfer.intent_ttl, Duration::from_secs(120));

        assert_eq!(
            config.speech_config().timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(config.cache_config().max_entries, 512);
        assert!(config.call_control_config().is_none());
    }

    #[test]
    fn test_call_control_config_requires_all_fields() {
        let config = ServerConfig {
            telephony_api_url: Some("https://api.example.com".to_string()),
            telephony_account_id: Some("AC1".to_string()),
            telephony_auth_token: Some("token".to_string()),
            ..ServerConfig::default()
        };
        let control = config.call_control_config().unwrap();
        assert_eq!(control.account_id, "AC1");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.flow_max_attempts, 2);
        assert!(config.voice_media_stream);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_validation_failure() {
        cleanup_env_vars();

        unsafe {
            env::set_var("SPEECH_SAMPLE_RATE", "11025");
        }
        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("SPEECH_SAMPLE_RATE"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_with_env_override() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_url: "https://calls.example.com"

flow:
  menu_timeout_secs: 9
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("FLOW_MENU_TIMEOUT_SECS", "12");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // ENV overrides YAML
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.flow_menu_timeout_secs, 12);
        // YAML value used when no ENV
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_url, "https://calls.example.com");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_with_fixture_directory() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let fixture_path = temp_dir.path().join("directory.json");
        fs::write(&fixture_path, r#"{"employees": []}"#).unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            format!("directory:\n  fixture_path: \"{}\"\n", fixture_path.display()),
        )
        .unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert_eq!(config.directory_fixture_path, Some(fixture_path));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to parse YAML"));
    }
}
