//! Config load validation tests for toolgate-config.
// crates/toolgate-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use toolgate_config::ConfigError;
use toolgate_config::ToolGateConfig;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<ToolGateConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(ToolGateConfig::load(path), "config path exceeds max length")?;
    Ok(())
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(ToolGateConfig::load(path), "config path component too long")?;
    Ok(())
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'a'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(ToolGateConfig::load(file.path()), "config file exceeds size limit")?;
    Ok(())
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(ToolGateConfig::load(file.path()), "config file must be utf-8")?;
    Ok(())
}

#[test]
fn load_rejects_unknown_fields() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = r#"
[auth]
issuer = "https://idp.example.com/realms/agents"
audience = "toolgate"
surprise = true

[exchange]
endpoint = "https://idp.example.com/token"
client_id = "toolgate"
client_secret_env = "TOOLGATE_CLIENT_SECRET"
"#;
    file.write_all(payload.as_bytes()).map_err(|err| err.to_string())?;
    match ToolGateConfig::load(file.path()) {
        Err(ConfigError::Parse(_)) => Ok(()),
        Err(other) => Err(format!("expected parse error, got {other}")),
        Ok(_) => Err("expected parse failure for unknown field".to_string()),
    }
}

#[test]
fn load_accepts_minimal_valid_config() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = r#"
[auth]
issuer = "https://idp.example.com/realms/agents"
audience = "toolgate"

[exchange]
endpoint = "https://idp.example.com/token"
client_id = "toolgate"
client_secret_env = "TOOLGATE_CLIENT_SECRET"
"#;
    file.write_all(payload.as_bytes()).map_err(|err| err.to_string())?;
    let config = ToolGateConfig::load(file.path()).map_err(|err| err.to_string())?;
    if config.access.l1_ttl_secs != 60 {
        return Err("expected default l1 ttl".to_string());
    }
    if config.breaker.failure_threshold != 5 {
        return Err("expected default failure threshold".to_string());
    }
    if !config.bind_is_loopback().map_err(|err| err.to_string())? {
        return Err("expected loopback default bind".to_string());
    }
    Ok(())
}
