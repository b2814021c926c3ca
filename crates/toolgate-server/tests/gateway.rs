//! Gateway service integration tests for toolgate-server.
// crates/toolgate-server/tests/gateway.rs
// ============================================================================
// Module: Gateway Integration Tests
// Description: Full-path discovery, invocation, and fan-out over test seams.
// Purpose: Ensure the assembled service enforces the access and push rules.
// ============================================================================

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

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::encode;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use toolgate_access::AccessResolver;
use toolgate_access::CatalogResolver;
use toolgate_access::InMemoryToolStore;
use toolgate_access::ResolverConfig;
use toolgate_auth::CredentialExchanger;
use toolgate_auth::ExchangeError;
use toolgate_auth::ExchangeTransport;
use toolgate_auth::ExchangerConfig;
use toolgate_auth::IdentityValidator;
use toolgate_auth::StaticKeyProvider;
use toolgate_auth::TokenExchangeForm;
use toolgate_auth::TokenExchangeGrantResponse;
use toolgate_auth::ValidatorConfig;
use toolgate_auth::VerificationKey;
use toolgate_contract::CatalogMessage;
use toolgate_contract::ErrorCode;
use toolgate_contract::ExecutionMode;
use toolgate_contract::ExecutionProfile;
use toolgate_contract::GroupSpec;
use toolgate_contract::HttpMethod;
use toolgate_contract::InvocationRequest;
use toolgate_contract::InvocationStatus;
use toolgate_contract::ToolRecord;
use toolgate_contract::ToolSelector;
use toolgate_core::AccessPolicy;
use toolgate_core::AccessScope;
use toolgate_core::BreakerConfig;
use toolgate_core::BreakerRegistry;
use toolgate_core::ClaimMatcher;
use toolgate_core::ClaimOperator;
use toolgate_core::ConnectionId;
use toolgate_core::GatewayEvent;
use toolgate_core::GroupId;
use toolgate_core::InMemorySharedCache;
use toolgate_core::ManualClock;
use toolgate_core::PolicyId;
use toolgate_core::PolicyStore;
use toolgate_core::PolicyStoreError;
use toolgate_core::SourceId;
use toolgate_core::Timestamp;
use toolgate_core::ToolId;
use toolgate_exec::ExecutorConfig;
use toolgate_exec::RenderedRequest;
use toolgate_exec::ToolExecutor;
use toolgate_exec::TransportError;
use toolgate_exec::UpstreamResponse;
use toolgate_exec::UpstreamTransport;
use toolgate_server::BroadcastBus;
use toolgate_server::GatewayOptions;
use toolgate_server::GatewayService;
use toolgate_server::SubscriptionConfig;
use toolgate_server::SubscriptionRegistry;

const SECRET: &[u8] = b"gateway-test-secret";

// ============================================================================
// SECTION: Test Doubles
// ============================================================================

/// Policy store whose snapshot can be swapped mid-test.
struct MutablePolicyStore {
    /// Current policy snapshot.
    policies: RwLock<Vec<AccessPolicy>>,
}

impl MutablePolicyStore {
    fn new(policies: Vec<AccessPolicy>) -> Self {
        Self {
            policies: RwLock::new(policies),
        }
    }

    fn replace(&self, policies: Vec<AccessPolicy>) {
        *self.policies.write().unwrap() = policies;
    }
}

#[async_trait]
impl PolicyStore for MutablePolicyStore {
    async fn active_policies(&self) -> Result<Vec<AccessPolicy>, PolicyStoreError> {
        Ok(self.policies.read().unwrap().clone())
    }
}

/// Exchange stub issuing audience-tagged tokens.
struct StubExchange;

#[async_trait]
impl ExchangeTransport for StubExchange {
    async fn exchange(
        &self,
        form: &TokenExchangeForm,
    ) -> Result<TokenExchangeGrantResponse, ExchangeError> {
        Ok(TokenExchangeGrantResponse {
            access_token: format!("exchanged-for-{}", form.audience),
            expires_in: 600,
        })
    }
}

/// Upstream stub answering every request with a fixed body.
struct FixedUpstream;

#[async_trait]
impl UpstreamTransport for FixedUpstream {
    async fn send(
        &self,
        _request: &RenderedRequest,
        _timeout_ms: i64,
    ) -> Result<UpstreamResponse, TransportError> {
        Ok(UpstreamResponse {
            status: 200,
            body: json!({"ok": true}),
        })
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn unix_now() -> i64 {
    i64::try_from(
        SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or(0),
    )
    .unwrap_or(0)
}

fn bearer_for(roles: &[&str]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("primary".to_string());
    let claims = json!({
        "iss": "https://idp.example.com/realms/agents",
        "aud": "toolgate",
        "sub": "alice",
        "exp": unix_now() + 600,
        "roles": roles,
    });
    encode(&header, &claims, &EncodingKey::from_secret(SECRET)).expect("encode token")
}

fn finance_policy() -> AccessPolicy {
    AccessPolicy {
        policy_id: PolicyId::new("finance"),
        priority: 10,
        enabled: true,
        matchers: vec![ClaimMatcher::new(
            "roles",
            ClaimOperator::Contains,
            json!("finance_user"),
        )],
        allowed_groups: BTreeSet::from([GroupId::new("finance")]),
    }
}

fn tool(tool_id: &str, tag: &str) -> ToolRecord {
    ToolRecord {
        tool_id: ToolId::new(tool_id),
        source_id: SourceId::new("billing-api"),
        name: tool_id.to_string(),
        description: format!("{tool_id} tool"),
        input_schema: json!({"type": "object"}),
        profile: ExecutionProfile {
            mode: ExecutionMode::Sync,
            method: HttpMethod::Get,
            url_template: "https://billing.example.com/run".to_string(),
            header_templates: BTreeMap::new(),
            body_template: None,
            variables: BTreeSet::new(),
            response_mapping: None,
            poll: None,
            timeout_ms: None,
            required_audience: "billing".to_string(),
            required_scopes: Vec::new(),
        },
        enabled: true,
        tags: BTreeSet::from([tag.to_string()]),
    }
}

fn group(group_id: &str, tag: &str) -> GroupSpec {
    GroupSpec {
        group_id: GroupId::new(group_id),
        selectors: vec![ToolSelector {
            source_id: None,
            tags: BTreeSet::from([tag.to_string()]),
        }],
        include: BTreeSet::new(),
        exclude: BTreeSet::new(),
    }
}

struct TestGateway {
    service: Arc<GatewayService>,
    policy_store: Arc<MutablePolicyStore>,
}

fn gateway() -> TestGateway {
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(0)));
    let keys = Arc::new(StaticKeyProvider::new().with_key("primary", VerificationKey {
        key: DecodingKey::from_secret(SECRET),
        algorithm: Algorithm::HS256,
    }));
    let validator = Arc::new(IdentityValidator::new(
        ValidatorConfig {
            issuer: "https://idp.example.com/realms/agents".to_string(),
            audience: "toolgate".to_string(),
            leeway_secs: 10,
            cache_ceiling_secs: 300,
        },
        keys,
        clock.clone(),
    ));
    let policy_store = Arc::new(MutablePolicyStore::new(vec![finance_policy()]));
    let shared = Arc::new(InMemorySharedCache::new(clock.clone()));
    let resolver = Arc::new(AccessResolver::new(
        ResolverConfig::default(),
        policy_store.clone(),
        shared,
        clock.clone(),
    ));
    let tool_store = Arc::new(InMemoryToolStore::new(
        vec![tool("billing.run", "finance"), tool("hr.lookup", "hr")],
        vec![group("finance", "finance"), group("hr", "hr")],
    ));
    let catalog = Arc::new(CatalogResolver::new(tool_store, 120, clock.clone()));
    let exchanger = Arc::new(CredentialExchanger::new(
        ExchangerConfig::default(),
        Arc::new(StubExchange),
        clock.clone(),
    ));
    let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default(), clock.clone()));
    let executor = Arc::new(ToolExecutor::new(
        ExecutorConfig::default(),
        exchanger,
        breakers.clone(),
        Arc::new(FixedUpstream),
    ));
    let subscriptions =
        Arc::new(SubscriptionRegistry::new(SubscriptionConfig::default(), clock));
    let service = Arc::new(GatewayService::new(
        validator,
        resolver,
        catalog,
        executor,
        breakers,
        subscriptions,
        Arc::new(BroadcastBus::default()),
        GatewayOptions::default(),
    ));
    TestGateway {
        service,
        policy_store,
    }
}

// ============================================================================
// SECTION: Discovery and Invocation
// ============================================================================

#[tokio::test]
async fn discovery_returns_only_tools_in_the_access_set() {
    let gateway = gateway();
    let context = gateway.service.discover(&bearer_for(&["finance_user"])).await.unwrap();
    let ids: Vec<&str> = context.tools.iter().map(|tool| tool.tool_id.as_str()).collect();
    assert_eq!(ids, vec!["billing.run"]);
}

#[tokio::test]
async fn invalid_bearer_is_unauthorized() {
    let gateway = gateway();
    let result = gateway
        .service
        .invoke(
            "not-a-token",
            &InvocationRequest {
                tool_id: ToolId::new("billing.run"),
                arguments: json!({}),
            },
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(result.error.unwrap().code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn tool_outside_the_access_set_is_forbidden() {
    let gateway = gateway();
    let result = gateway
        .service
        .invoke(
            &bearer_for(&["finance_user"]),
            &InvocationRequest {
                tool_id: ToolId::new("hr.lookup"),
                arguments: json!({}),
            },
            &CancellationToken::new(),
        )
        .await;
    let error = result.error.unwrap();
    assert_eq!(error.code, ErrorCode::Forbidden);
    assert!(!error.retryable);
}

#[tokio::test]
async fn allowed_tool_executes_end_to_end() {
    let gateway = gateway();
    let result = gateway
        .service
        .invoke(
            &bearer_for(&["finance_user"]),
            &InvocationRequest {
                tool_id: ToolId::new("billing.run"),
                arguments: json!({}),
            },
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(result.status, InvocationStatus::Completed);
    assert_eq!(result.result, Some(json!({"ok": true})));
}

// ============================================================================
// SECTION: Fan-out
// ============================================================================

#[tokio::test]
async fn policy_change_pushes_a_narrowed_catalog_to_subscribers() {
    let gateway = gateway();
    let connection = ConnectionId::new("conn-1");
    let (context, mut receiver) = gateway
        .service
        .subscribe(&bearer_for(&["finance_user"]), &connection)
        .await
        .unwrap();
    assert_eq!(context.tools.len(), 1);

    gateway.policy_store.replace(Vec::new());
    gateway
        .service
        .handle_event(&GatewayEvent::PoliciesChanged {
            scope: AccessScope::Groups(BTreeSet::from([GroupId::new("finance")])),
        })
        .await;

    let message = receiver.recv().await.unwrap();
    match message {
        CatalogMessage::Update {
            tools,
        } => assert!(tools.is_empty()),
        CatalogMessage::Snapshot {
            ..
        } => panic!("expected update push"),
    }
    assert!(gateway.service.subscriptions().identity(&connection).is_some());
}

#[tokio::test]
async fn unrelated_group_change_does_not_push() {
    let gateway = gateway();
    let connection = ConnectionId::new("conn-1");
    let (_context, mut receiver) = gateway
        .service
        .subscribe(&bearer_for(&["finance_user"]), &connection)
        .await
        .unwrap();

    gateway
        .service
        .handle_event(&GatewayEvent::GroupsChanged {
            scope: AccessScope::Groups(BTreeSet::from([GroupId::new("hr")])),
        })
        .await;

    assert!(receiver.try_recv().is_err());
}
