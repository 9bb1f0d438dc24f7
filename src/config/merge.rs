use std::path::PathBuf;

use super::ServerConfig;
use super::env::{env_bool, env_parsed, env_string};
use super::yaml::YamlConfig;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
///
/// No validation happens here; callers run [`super::validation::validate_config`]
/// on the result.
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // ENV > YAML > default for strings
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env_string($env_var)
                .or($yaml_value)
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // ENV > YAML for optional strings
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            env_string($env_var).or($yaml_value)
        };
    }

    // ENV > YAML > default for parsed values
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env_parsed($env_var)?.or($yaml_value).unwrap_or($default)
        };
    }

    let server = yaml.server.unwrap_or_default();
    let flow = yaml.flow.unwrap_or_default();
    let transfer = yaml.transfer.unwrap_or_default();
    let store = yaml.store.unwrap_or_default();
    let speech = yaml.speech.unwrap_or_default();
    let directory = yaml.directory.unwrap_or_default();
    let telephony = yaml.telephony.unwrap_or_default();
    let cache = yaml.cache.unwrap_or_default();

    // Server configuration
    let host = get_value!("HOST", server.host, "0.0.0.0");
    let port = get_parsed!("PORT", server.port, 3001);
    let public_url = get_value!(
        "PUBLIC_URL",
        server.public_url,
        format!("http://localhost:{port}")
    );
    let voice_media_stream = env_bool("VOICE_MEDIA_STREAM")?
        .or(server.media_stream)
        .unwrap_or(true);

    // Conversation flow
    let flow_max_attempts = get_parsed!("FLOW_MAX_ATTEMPTS", flow.max_attempts, 2);
    let flow_identification_timeout_secs = get_parsed!(
        "FLOW_IDENTIFICATION_TIMEOUT_SECS",
        flow.identification_timeout_secs,
        8
    );
    let flow_menu_timeout_secs = get_parsed!("FLOW_MENU_TIMEOUT_SECS", flow.menu_timeout_secs, 6);
    let flow_confirm_timeout_secs =
        get_parsed!("FLOW_CONFIRM_TIMEOUT_SECS", flow.confirm_timeout_secs, 6);
    let flow_pin_length = get_parsed!("FLOW_PIN_LENGTH", flow.pin_length, 4);

    // Transfer and hold queue
    let transfer_default_representative = get_optional!(
        "TRANSFER_DEFAULT_REPRESENTATIVE",
        transfer.default_representative
    );
    let transfer_representative_timeout_secs = get_parsed!(
        "TRANSFER_REPRESENTATIVE_TIMEOUT_SECS",
        transfer.representative_timeout_secs,
        20
    );
    let transfer_intent_ttl_secs =
        get_parsed!("TRANSFER_INTENT_TTL_SECS", transfer.intent_ttl_secs, 120);
    let transfer_hold_announcement_secs = get_parsed!(
        "TRANSFER_HOLD_ANNOUNCEMENT_SECS",
        transfer.hold_announcement_secs,
        30
    );

    // Call-state store
    let store_session_ttl_secs =
        get_parsed!("STORE_SESSION_TTL_SECS", store.session_ttl_secs, 900);
    let store_sweep_interval_secs =
        get_parsed!("STORE_SWEEP_INTERVAL_SECS", store.sweep_interval_secs, 30);

    // Speech service
    let speech_url = get_value!("SPEECH_URL", speech.url, "http://localhost:8090");
    let speech_api_key = get_optional!("SPEECH_API_KEY", speech.api_key);
    let speech_voice = get_value!("SPEECH_VOICE", speech.voice, "default");
    let speech_sample_rate = get_parsed!("SPEECH_SAMPLE_RATE", speech.sample_rate, 16_000);
    let speech_timeout_ms = get_parsed!("SPEECH_TIMEOUT_MS", speech.timeout_ms, 5_000);
    let speech_max_retries = get_parsed!("SPEECH_MAX_RETRIES", speech.max_retries, 1);

    // Business-data directory
    let directory_url = get_optional!("DIRECTORY_URL", directory.url);
    let directory_api_key = get_optional!("DIRECTORY_API_KEY", directory.api_key);
    let directory_fixture_path =
        get_optional!("DIRECTORY_FIXTURE_PATH", directory.fixture_path).map(PathBuf::from);

    // Telephony provider
    let telephony_api_url = get_optional!("TELEPHONY_API_URL", telephony.api_url);
    let telephony_account_id = get_optional!("TELEPHONY_ACCOUNT_ID", telephony.account_id);
    let telephony_auth_token = get_optional!("TELEPHONY_AUTH_TOKEN", telephony.auth_token);

    // Prompt audio cache
    let cache_max_prompts = get_parsed!("CACHE_MAX_PROMPTS", cache.max_prompts, 512);
    let cache_ttl_seconds = get_parsed!("CACHE_TTL_SECONDS", cache.ttl_seconds, 86_400);

    Ok(ServerConfig {
        host,
        port,
        public_url: public_url.trim_end_matches('/').to_string(),
        voice_media_stream,
        flow_max_attempts,
        flow_identification_timeout_secs,
        flow_menu_timeout_secs,
        flow_confirm_timeout_secs,
        flow_pin_length,
        transfer_default_representative,
        transfer_representative_timeout_secs,
        transfer_intent_ttl_secs,
        transfer_hold_announcement_secs,
        store_session_ttl_secs,
        store_sweep_interval_secs,
        speech_url,
        speech_api_key,
        speech_voice,
        speech_sample_rate,
        speech_timeout_ms,
        speech_max_retries,
        directory_url,
        directory_api_key,
        directory_fixture_path,
        telephony_api_url,
        telephony_account_id,
        telephony_auth_token,
        cache_max_prompts,
        cache_ttl_seconds,
    })
}
