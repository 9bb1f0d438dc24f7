use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   public_url: "https://calls.example.com"
///   media_stream: true
///
/// flow:
///   max_attempts: 2
///   identification_timeout_secs: 8
///   menu_timeout_secs: 6
///   confirm_timeout_secs: 6
///   pin_length: 4
///
/// transfer:
///   default_representative: "+15559870000"
///   representative_timeout_secs: 20
///   intent_ttl_secs: 120
///   hold_announcement_secs: 30
///
/// store:
///   session_ttl_secs: 900
///   sweep_interval_secs: 30
///
/// speech:
///   url: "http://localhost:8090"
///   api_key: "speech-key"
///   voice: "alloy"
///   sample_rate: 16000
///   timeout_ms: 5000
///   max_retries: 1
///
/// directory:
///   url: "https://workforce.example.com/api"
///   api_key: "directory-key"
///   # or, for local runs:
///   # fixture_path: "fixtures/directory.json"
///
/// telephony:
///   api_url: "https://api.telephony.example.com/2010-04-01"
///   account_id: "AC123"
///   auth_token: "token"
///
/// cache:
///   max_prompts: 512
///   ttl_seconds: 86400
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub flow: Option<FlowYaml>,
    pub transfer: Option<TransferYaml>,
    pub store: Option<StoreYaml>,
    pub speech: Option<SpeechYaml>,
    pub directory: Option<DirectoryYaml>,
    pub telephony: Option<TelephonyYaml>,
    pub cache: Option<CacheYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Externally reachable base URL of this server.
    pub public_url: Option<String>,
    /// Answer calls with a media stream (`true`) or with gather markup.
    pub media_stream: Option<bool>,
}

/// Conversation timing from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FlowYaml {
    pub max_attempts: Option<u8>,
    pub identification_timeout_secs: Option<u64>,
    pub menu_timeout_secs: Option<u64>,
    pub confirm_timeout_secs: Option<u64>,
    pub pin_length: Option<usize>,
}

/// Transfer and hold settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TransferYaml {
    pub default_representative: Option<String>,
    pub representative_timeout_secs: Option<u64>,
    pub intent_ttl_secs: Option<u64>,
    pub hold_announcement_secs: Option<u64>,
}

/// Call-state store settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreYaml {
    pub session_ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

/// Speech service settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpeechYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub voice: Option<String>,
    pub sample_rate: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Business-data directory settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DirectoryYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub fixture_path: Option<String>,
}

/// Telephony provider REST API from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TelephonyYaml {
    pub api_url: Option<String>,
    pub account_id: Option<String>,
    pub auth_token: Option<String>,
}

/// Prompt audio cache configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub max_prompts: Option<u64>,
    pub ttl_seconds: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
