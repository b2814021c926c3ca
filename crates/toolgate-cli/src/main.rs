// crates/toolgate-cli/src/main.rs
// ============================================================================
// Module: ToolGate CLI Entry Point
// Description: Command dispatcher for serving and checking the gateway.
// Purpose: Provide a safe, validated path from config file to running server.
// Dependencies: clap, tokio, toolgate-config, toolgate-server
// ============================================================================

//! ## Overview
//! Two commands exist: `serve` assembles the gateway from a validated
//! config (JWKS keys, static store snapshots, HTTP exchange transport) and
//! runs it until interrupted; `check-config` validates a config file and
//! exits. Non-loopback binds are refused unless explicitly overridden via
//! the environment, so a default deployment never listens publicly by
//! accident.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod serve_policy;
mod snapshot;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use toolgate_access::AccessResolver;
use toolgate_access::CatalogResolver;
use toolgate_access::InMemoryPolicyStore;
use toolgate_access::InMemoryToolStore;
use toolgate_access::ResolverConfig;
use toolgate_auth::CredentialExchanger;
use toolgate_auth::ExchangerConfig;
use toolgate_auth::HttpExchangeTransport;
use toolgate_auth::HttpExchangeTransportConfig;
use toolgate_auth::HttpJwksProvider;
use toolgate_auth::IdentityValidator;
use toolgate_auth::JwksProviderConfig;
use toolgate_auth::ValidatorConfig;
use toolgate_config::ToolGateConfig;
use toolgate_core::BreakerConfig;
use toolgate_core::BreakerRegistry;
use toolgate_core::InMemorySharedCache;
use toolgate_core::SystemClock;
use toolgate_exec::ExecutorConfig;
use toolgate_exec::ReqwestTransport;
use toolgate_exec::ToolExecutor;
use toolgate_exec::UpstreamPolicy;
use toolgate_server::BroadcastBus;
use toolgate_server::GatewayOptions;
use toolgate_server::GatewayService;
use toolgate_server::SubscriptionConfig;
use toolgate_server::SubscriptionRegistry;
use toolgate_server::TracingAuditSink;
use url::Url;

use crate::serve_policy::enforce_local_only;
use crate::snapshot::load_catalog_snapshot;
use crate::snapshot::load_policy_snapshot;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures surfaced to the operator.
///
/// # Invariants
/// - Messages never include secrets or token material.
#[derive(Debug, Error)]
enum CliError {
    /// Config loading or validation failed.
    #[error("config error: {0}")]
    Config(String),
    /// Gateway assembly failed.
    #[error("startup error: {0}")]
    Startup(String),
    /// Server runtime failed.
    #[error("server error: {0}")]
    Server(String),
}

// ============================================================================
// SECTION: Command Line
// ============================================================================

/// ToolGate gateway command line.
#[derive(Debug, Parser)]
#[command(name = "toolgate", about = "Multi-tenant tool gateway for AI agents")]
struct Cli {
    /// Command to run.
    #[command(subcommand)]
    command: Command,
}

/// Supported commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run the gateway server.
    Serve {
        /// Config file path.
        #[arg(long, default_value = "toolgate.toml")]
        config: PathBuf,
    },
    /// Validate a config file and exit.
    CheckConfig {
        /// Config file path.
        #[arg(long, default_value = "toolgate.toml")]
        config: PathBuf,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    let outcome = match cli.command {
        Command::Serve {
            config,
        } => serve(&config).await,
        Command::CheckConfig {
            config,
        } => check_config(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "toolgate command failed");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber from the environment filter.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Validates a config file.
fn check_config(path: &PathBuf) -> Result<(), CliError> {
    let config = ToolGateConfig::load(path).map_err(|err| CliError::Config(err.to_string()))?;
    tracing::info!(path = %path.display(), bind = %config.server.bind, "config is valid");
    Ok(())
}

/// Runs the gateway server until interrupted.
async fn serve(path: &PathBuf) -> Result<(), CliError> {
    let config = ToolGateConfig::load(path).map_err(|err| CliError::Config(err.to_string()))?;
    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .map_err(|_| CliError::Config("server bind address invalid".to_string()))?;
    enforce_local_only(bind).map_err(|err| CliError::Startup(err.to_string()))?;

    let service = build_service(&config)?;
    let cancel = CancellationToken::new();
    let listener = service.spawn_invalidation_listener(cancel.clone());
    let maintenance = service.spawn_maintenance(Duration::from_secs(30), cancel.clone());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    let result = toolgate_server::http::serve(service, bind, cancel.clone()).await;
    cancel.cancel();
    listener.abort();
    maintenance.abort();
    result.map_err(|err| CliError::Server(err.to_string()))
}

/// Assembles the gateway service from a validated config.
fn build_service(config: &ToolGateConfig) -> Result<Arc<GatewayService>, CliError> {
    let clock = Arc::new(SystemClock);

    let jwks_url = config
        .auth
        .jwks_url
        .as_ref()
        .ok_or_else(|| CliError::Startup("serve requires auth.jwks_url".to_string()))?;
    let jwks_url =
        Url::parse(jwks_url).map_err(|_| CliError::Startup("auth.jwks_url invalid".to_string()))?;
    let keys = Arc::new(
        HttpJwksProvider::new(
            JwksProviderConfig {
                jwks_url,
                fetch_timeout_ms: 5_000,
                min_refresh_interval_ms: 30_000,
            },
            clock.clone(),
        )
        .map_err(|err| CliError::Startup(err.to_string()))?,
    );
    let validator = Arc::new(IdentityValidator::new(
        ValidatorConfig {
            issuer: config.auth.issuer.clone(),
            audience: config.auth.audience.clone(),
            leeway_secs: config.auth.leeway_secs,
            cache_ceiling_secs: config.auth.identity_cache_ceiling_secs,
        },
        keys,
        clock.clone(),
    ));

    let policy_path = config
        .stores
        .policy_snapshot
        .as_ref()
        .ok_or_else(|| CliError::Startup("serve requires stores.policy_snapshot".to_string()))?;
    let policies =
        load_policy_snapshot(policy_path).map_err(|err| CliError::Startup(err.to_string()))?;
    let policy_store = Arc::new(InMemoryPolicyStore::new(policies));

    let catalog_path = config
        .stores
        .catalog_snapshot
        .as_ref()
        .ok_or_else(|| CliError::Startup("serve requires stores.catalog_snapshot".to_string()))?;
    let catalog_snapshot =
        load_catalog_snapshot(catalog_path).map_err(|err| CliError::Startup(err.to_string()))?;
    let tool_store =
        Arc::new(InMemoryToolStore::new(catalog_snapshot.tools, catalog_snapshot.groups));

    let shared = Arc::new(InMemorySharedCache::new(clock.clone()));
    let resolver = Arc::new(AccessResolver::new(
        ResolverConfig {
            l1_ttl_secs: config.access.l1_ttl_secs,
            l2_ttl_secs: config.access.l2_ttl_secs,
        },
        policy_store,
        shared,
        clock.clone(),
    ));
    let catalog =
        Arc::new(CatalogResolver::new(tool_store, config.access.catalog_ttl_secs, clock.clone()));

    let client_secret = std::env::var(&config.exchange.client_secret_env).map_err(|_| {
        CliError::Startup(format!(
            "environment variable {} is not set",
            config.exchange.client_secret_env
        ))
    })?;
    let exchange_endpoint = Url::parse(&config.exchange.endpoint)
        .map_err(|_| CliError::Startup("exchange endpoint invalid".to_string()))?;
    let exchange_transport = Arc::new(
        HttpExchangeTransport::new(HttpExchangeTransportConfig {
            endpoint: exchange_endpoint,
            client_id: config.exchange.client_id.clone(),
            client_secret,
            timeout_ms: config.exchange.timeout_ms,
        })
        .map_err(|err| CliError::Startup(err.to_string()))?,
    );
    let exchanger = Arc::new(CredentialExchanger::new(
        ExchangerConfig {
            safety_buffer_secs: config.exchange.safety_buffer_secs,
            cache_ceiling_secs: config.exchange.cache_ceiling_secs,
        },
        exchange_transport,
        clock.clone(),
    ));

    let breakers = Arc::new(BreakerRegistry::new(
        BreakerConfig {
            failure_threshold: config.breaker.failure_threshold,
            failure_window_ms: config.breaker.failure_window_secs.saturating_mul(1_000),
            recovery_timeout_ms: config.breaker.recovery_timeout_secs.saturating_mul(1_000),
            success_threshold: config.breaker.success_threshold,
            idle_eviction_ms: config.breaker.idle_eviction_secs.saturating_mul(1_000),
        },
        clock.clone(),
    ));
    let upstream = Arc::new(
        ReqwestTransport::new(UpstreamPolicy {
            allow_http: config.execution.allow_http,
            allowed_hosts: config.execution.allowed_hosts.clone(),
            max_response_bytes: config.execution.max_response_bytes,
        })
        .map_err(|err| CliError::Startup(err.to_string()))?,
    );
    let executor = Arc::new(ToolExecutor::new(
        ExecutorConfig {
            default_timeout_ms: config.execution.default_timeout_ms,
        },
        exchanger,
        breakers.clone(),
        upstream,
    ));

    let subscriptions = Arc::new(SubscriptionRegistry::new(
        SubscriptionConfig {
            ttl_secs: config.server.heartbeat_ttl_secs,
            push_buffer: config.server.push_buffer,
        },
        clock,
    ));

    Ok(Arc::new(GatewayService::new(
        validator,
        resolver,
        catalog,
        executor,
        breakers,
        subscriptions,
        Arc::new(BroadcastBus::default()),
        GatewayOptions {
            audit: Arc::new(TracingAuditSink),
            metrics: Arc::new(toolgate_server::NoopMetrics),
        },
    )))
}
