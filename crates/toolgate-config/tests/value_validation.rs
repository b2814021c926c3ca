//! Config value validation tests for toolgate-config.
// crates/toolgate-config/tests/value_validation.rs
// =============================================================================
// Module: Config Value Validation Tests
// Description: Validate cross-field constraints across all config sections.
// Purpose: Ensure gateway settings fail closed and enforce limits.
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

use toolgate_config::AccessConfig;
use toolgate_config::AuthConfig;
use toolgate_config::BreakerSection;
use toolgate_config::ConfigError;
use toolgate_config::ExchangeConfig;
use toolgate_config::ExecutionConfig;
use toolgate_config::ServerConfig;
use toolgate_config::StoresConfig;
use toolgate_config::ToolGateConfig;

type TestResult = Result<(), String>;

fn minimal_config() -> ToolGateConfig {
    ToolGateConfig {
        auth: AuthConfig {
            issuer: "https://idp.example.com/realms/agents".to_string(),
            audience: "toolgate".to_string(),
            jwks_url: None,
            leeway_secs: 10,
            identity_cache_ceiling_secs: 300,
        },
        exchange: ExchangeConfig {
            endpoint: "https://idp.example.com/token".to_string(),
            client_id: "toolgate".to_string(),
            client_secret_env: "TOOLGATE_CLIENT_SECRET".to_string(),
            timeout_ms: 10_000,
            safety_buffer_secs: 30,
            cache_ceiling_secs: 300,
        },
        access: AccessConfig::default(),
        breaker: BreakerSection::default(),
        execution: ExecutionConfig::default(),
        server: ServerConfig::default(),
        stores: StoresConfig::default(),
    }
}

fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn minimal_config_validates() -> TestResult {
    minimal_config().validate().map_err(|err| err.to_string())
}

#[test]
fn empty_issuer_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.auth.issuer = "  ".to_string();
    assert_invalid(config.validate(), "auth issuer must not be empty")
}

#[test]
fn oversized_leeway_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.auth.leeway_secs = 120;
    assert_invalid(config.validate(), "auth leeway exceeds 60 second ceiling")
}

#[test]
fn cleartext_exchange_endpoint_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.exchange.endpoint = "http://idp.example.com/token".to_string();
    assert_invalid(config.validate(), "exchange endpoint must use https")
}

#[test]
fn buffer_at_or_above_ceiling_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.exchange.safety_buffer_secs = 300;
    config.exchange.cache_ceiling_secs = 300;
    assert_invalid(config.validate(), "exchange safety buffer must be below cache ceiling")
}

#[test]
fn l1_ttl_above_l2_ttl_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.access.l1_ttl_secs = 600;
    config.access.l2_ttl_secs = 300;
    assert_invalid(config.validate(), "access l1 ttl must not exceed l2 ttl")
}

#[test]
fn zero_breaker_threshold_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.breaker.failure_threshold = 0;
    assert_invalid(config.validate(), "breaker thresholds must be at least 1")
}

#[test]
fn invalid_bind_address_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.server.bind = "not-an-address".to_string();
    assert_invalid(config.validate(), "server bind address invalid")
}

#[test]
fn zero_push_buffer_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.server.push_buffer = 0;
    assert_invalid(config.validate(), "server push buffer must be positive")
}

#[test]
fn jwks_url_must_be_https_when_present() -> TestResult {
    let mut config = minimal_config();
    config.auth.jwks_url = Some("http://idp.example.com/certs".to_string());
    assert_invalid(config.validate(), "auth jwks_url must use https")
}
