use url::Url;

use super::ServerConfig;

/// Sample rates the speech service may be configured with.
pub const SUPPORTED_SPEECH_RATES: [u32; 4] = [8_000, 16_000, 24_000, 48_000];

/// Validate the merged configuration
///
/// Checks that:
/// - retry caps and PIN length are at least 1
/// - every timeout and TTL is non-zero
/// - the speech sample rate is supported
/// - at most one directory source is configured
/// - the public URL is an absolute http(s) URL
/// - telephony credentials are either complete or absent
pub fn validate_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.flow_max_attempts == 0 {
        return Err("FLOW_MAX_ATTEMPTS must be at least 1".into());
    }
    if config.flow_pin_length == 0 {
        return Err("FLOW_PIN_LENGTH must be at least 1".into());
    }

    validate_non_zero(&[
        (
            "FLOW_IDENTIFICATION_TIMEOUT_SECS",
            config.flow_identification_timeout_secs,
        ),
        ("FLOW_MENU_TIMEOUT_SECS", config.flow_menu_timeout_secs),
        ("FLOW_CONFIRM_TIMEOUT_SECS", config.flow_confirm_timeout_secs),
        (
            "TRANSFER_REPRESENTATIVE_TIMEOUT_SECS",
            config.transfer_representative_timeout_secs,
        ),
        ("TRANSFER_INTENT_TTL_SECS", config.transfer_intent_ttl_secs),
        (
            "TRANSFER_HOLD_ANNOUNCEMENT_SECS",
            config.transfer_hold_announcement_secs,
        ),
        ("STORE_SESSION_TTL_SECS", config.store_session_ttl_secs),
        ("STORE_SWEEP_INTERVAL_SECS", config.store_sweep_interval_secs),
        ("SPEECH_TIMEOUT_MS", config.speech_timeout_ms),
        ("CACHE_TTL_SECONDS", config.cache_ttl_seconds),
    ])?;

    if !SUPPORTED_SPEECH_RATES.contains(&config.speech_sample_rate) {
        return Err(format!(
            "SPEECH_SAMPLE_RATE must be one of {SUPPORTED_SPEECH_RATES:?}, got {}",
            config.speech_sample_rate
        )
        .into());
    }

    if config.directory_url.is_some() && config.directory_fixture_path.is_some() {
        return Err("Set either DIRECTORY_URL or DIRECTORY_FIXTURE_PATH, not both".into());
    }
    if let Some(path) = &config.directory_fixture_path
        && !path.exists()
    {
        return Err(format!(
            "DIRECTORY_FIXTURE_PATH file does not exist: {}",
            path.display()
        )
        .into());
    }

    validate_public_url(&config.public_url)?;
    validate_telephony(
        &config.telephony_api_url,
        &config.telephony_account_id,
        &config.telephony_auth_token,
    )?;

    Ok(())
}

fn validate_non_zero(values: &[(&str, u64)]) -> Result<(), Box<dyn std::error::Error>> {
    for (name, value) in values {
        if *value == 0 {
            return Err(format!("{name} must be greater than zero").into());
        }
    }
    Ok(())
}

/// The public URL must be absolute http(s); callback and stream URLs derive from it.
pub fn validate_public_url(public_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(public_url).map_err(|e| format!("Invalid PUBLIC_URL '{public_url}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("PUBLIC_URL must use http or https, got '{other}'").into()),
    }
}

/// Telephony API settings are all-or-nothing.
pub fn validate_telephony(
    api_url: &Option<String>,
    account_id: &Option<String>,
    auth_token: &Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let present = [api_url, account_id, auth_token]
        .iter()
        .filter(|value| value.is_some())
        .count();
    if present != 0 && present != 3 {
        return Err(
            "TELEPHONY_API_URL, TELEPHONY_ACCOUNT_ID and TELEPHONY_AUTH_TOKEN must be set together"
                .into(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_valid_default_config() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = ServerConfig {
            flow_max_attempts: 0,
            ..ServerConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("FLOW_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ServerConfig {
            transfer_intent_ttl_secs: 0,
            ..ServerConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("TRANSFER_INTENT_TTL_SECS"));
    }

    #[test]
    fn test_unsupported_sample_rate_rejected() {
        let config = ServerConfig {
            speech_sample_rate: 22_050,
            ..ServerConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_directory_sources_are_exclusive() {
        let fixture = NamedTempFile::new().unwrap();
        let config = ServerConfig {
            directory_url: Some("https://directory.example.com".to_string()),
            directory_fixture_path: Some(fixture.path().to_path_buf()),
            ..ServerConfig::default()
        };
        assert!(validate_config(&config).is_err());

        let config = ServerConfig {
            directory_fixture_path: Some(fixture.path().to_path_buf()),
            ..ServerConfig::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_fixture_rejected() {
        let config = ServerConfig {
            directory_fixture_path: Some(PathBuf::from("/nonexistent/directory.json")),
            ..ServerConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_public_url_scheme() {
        assert!(validate_public_url("https://calls.example.com").is_ok());
        assert!(validate_public_url("ftp://calls.example.com").is_err());
        assert!(validate_public_url("calls.example.com").is_err());
    }

    #[test]
    fn test_partial_telephony_rejected() {
        assert!(validate_telephony(&None, &None, &None).is_ok());
        assert!(
            validate_telephony(
                &Some("https://api.example.com".to_string()),
                &Some("AC1".to_string()),
                &None
            )
            .is_err()
        );
        assert!(
            validate_telephony(
                &Some("https://api.example.com".to_string()),
                &Some("AC1".to_string()),
                &Some("token".to_string())
            )
            .is_ok()
        );
    }
}
