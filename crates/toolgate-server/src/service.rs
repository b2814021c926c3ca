// crates/toolgate-server/src/service.rs
// ============================================================================
// Module: Gateway Service
// Description: End-to-end discovery, invocation, and fan-out orchestration.
// Purpose: Drive the validated, fail-closed path from bearer to tool result.
// Dependencies: tokio, tokio-util, toolgate-*
// ============================================================================

//! ## Overview
//! The service owns the full runtime path. Discovery: validate the bearer,
//! resolve allowed groups, expand them into the merged tool manifest.
//! Invocation: the same prefix, then a membership check on the requested
//! tool, then guarded execution. Subscriptions register with the fan-out
//! registry; the invalidation listener applies bus events to the caches and
//! re-resolves affected connections, pushing updated catalogs.
//! Invariants:
//! - Authentication failures are unauthorized; resolution failures and
//!   out-of-scope tools are forbidden; neither is ever silently narrowed.
//! - Every inbound operation emits exactly one audit event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use toolgate_access::AccessContext;
use toolgate_access::AccessResolver;
use toolgate_access::CatalogResolver;
use toolgate_auth::AuthError;
use toolgate_auth::IdentityValidator;
use toolgate_contract::CatalogMessage;
use toolgate_contract::ErrorCode;
use toolgate_contract::InvocationError;
use toolgate_contract::InvocationRequest;
use toolgate_contract::InvocationResult;
use toolgate_core::BreakerRegistry;
use toolgate_core::ConnectionId;
use toolgate_core::GatewayEvent;
use toolgate_core::GatewayEventBus;
use toolgate_core::Identity;
use toolgate_core::token_fingerprint;
use toolgate_exec::ToolExecutor;

use crate::audit::AuditAction;
use crate::audit::AuditEvent;
use crate::audit::AuditOutcome;
use crate::audit::GatewayAuditSink;
use crate::audit::NoopAuditSink;
use crate::correlation::CorrelationIdGenerator;
use crate::metrics::GatewayMetrics;
use crate::metrics::GatewayOp;
use crate::metrics::NoopMetrics;
use crate::metrics::RequestMetric;
use crate::subscriptions::SubscriptionRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway operation errors for discovery and subscription.
///
/// # Invariants
/// - Variants map one-to-one onto HTTP authentication and authorization
///   statuses.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bearer credential was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
    /// Access resolution failed closed or denied the caller.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Pluggable observability sinks.
pub struct GatewayOptions {
    /// Audit sink for inbound actions.
    pub audit: Arc<dyn GatewayAuditSink>,
    /// Metrics sink for counters and latencies.
    pub metrics: Arc<dyn GatewayMetrics>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            audit: Arc::new(NoopAuditSink),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Assembled gateway runtime.
pub struct GatewayService {
    /// Bearer credential validator.
    validator: Arc<IdentityValidator>,
    /// Three-tier access resolver.
    resolver: Arc<AccessResolver>,
    /// Per-group catalog resolver.
    catalog: Arc<CatalogResolver>,
    /// Guarded tool executor.
    executor: Arc<ToolExecutor>,
    /// Per-upstream breaker registry (owned for maintenance sweeps).
    breakers: Arc<BreakerRegistry>,
    /// Live subscription registry.
    subscriptions: Arc<SubscriptionRegistry>,
    /// Shared invalidation and fan-out bus.
    bus: Arc<dyn GatewayEventBus>,
    /// Audit sink.
    audit: Arc<dyn GatewayAuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn GatewayMetrics>,
    /// Server correlation id generator.
    correlation: CorrelationIdGenerator,
}

impl GatewayService {
    /// Assembles a gateway service from its components.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "Assembly point wires every runtime seam once.")]
    pub fn new(
        validator: Arc<IdentityValidator>,
        resolver: Arc<AccessResolver>,
        catalog: Arc<CatalogResolver>,
        executor: Arc<ToolExecutor>,
        breakers: Arc<BreakerRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
        bus: Arc<dyn GatewayEventBus>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            validator,
            resolver,
            catalog,
            executor,
            breakers,
            subscriptions,
            bus,
            audit: options.audit,
            metrics: options.metrics,
            correlation: CorrelationIdGenerator::new("tg"),
        }
    }

    /// Returns the subscription registry.
    #[must_use]
    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    /// Issues a server correlation id.
    #[must_use]
    pub fn issue_correlation_id(&self) -> String {
        self.correlation.issue()
    }

    /// Resolves the access context for a validated identity.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Forbidden`] when resolution fails closed.
    pub async fn resolve_context(&self, identity: &Identity) -> Result<AccessContext, GatewayError> {
        let resolved = self
            .resolver
            .resolve(identity)
            .await
            .map_err(|err| GatewayError::Forbidden(err.to_string()))?;
        let tools = self
            .catalog
            .resolve_tools(&resolved.group_ids)
            .await
            .map_err(|err| GatewayError::Forbidden(err.to_string()))?;
        Ok(AccessContext {
            group_ids: resolved.group_ids,
            tools,
            tier: resolved.tier,
        })
    }

    /// Lists the tools visible to the bearer.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on authentication or resolution failure.
    pub async fn discover(&self, bearer: &str) -> Result<AccessContext, GatewayError> {
        let started = Instant::now();
        let correlation_id = self.correlation.issue();
        let token = token_fingerprint(bearer);
        let identity = match self.validator.validate(bearer).await {
            Ok(identity) => identity,
            Err(err) => {
                self.audit_denied(&correlation_id, &token, None, AuditAction::Discover, "unauthorized");
                return Err(err.into());
            }
        };
        match self.resolve_context(&identity).await {
            Ok(context) => {
                self.audit.record(AuditEvent {
                    server_correlation_id: correlation_id,
                    unsafe_client_correlation_id: None,
                    token,
                    subject: Some(identity.subject.clone()),
                    action: AuditAction::Discover,
                    tool: None,
                    outcome: AuditOutcome::Ok,
                    error_code: None,
                });
                let metric = RequestMetric {
                    op: GatewayOp::Discover,
                    tool: None,
                    ok: true,
                    error_code: None,
                    tier: Some(context.tier),
                };
                self.metrics.record_request(metric.clone());
                self.metrics.record_latency(metric, started.elapsed());
                Ok(context)
            }
            Err(err) => {
                self.audit_denied(
                    &correlation_id,
                    &token,
                    Some(&identity.subject),
                    AuditAction::Discover,
                    "forbidden",
                );
                Err(err)
            }
        }
    }

    /// Invokes a tool for the bearer.
    ///
    /// Every failure is a structured result; transport-level callers map
    /// `unauthorized`/`forbidden` codes onto their own status lines.
    pub async fn invoke(
        &self,
        bearer: &str,
        request: &InvocationRequest,
        cancel: &CancellationToken,
    ) -> InvocationResult {
        let started = Instant::now();
        let correlation_id = self.correlation.issue();
        let token = token_fingerprint(bearer);

        let identity = match self.validator.validate(bearer).await {
            Ok(identity) => identity,
            Err(err) => {
                self.audit_invoke(&correlation_id, &token, None, request, Some("unauthorized"));
                return InvocationResult::error(InvocationError::new(
                    ErrorCode::Unauthorized,
                    err.to_string(),
                ));
            }
        };

        let context = match self.resolve_context(&identity).await {
            Ok(context) => context,
            Err(err) => {
                self.audit_invoke(
                    &correlation_id,
                    &token,
                    Some(&identity.subject),
                    request,
                    Some("forbidden"),
                );
                return InvocationResult::error(InvocationError::new(
                    ErrorCode::Forbidden,
                    err.to_string(),
                ));
            }
        };
        let Some(tool) = context.tool(&request.tool_id) else {
            self.audit_invoke(
                &correlation_id,
                &token,
                Some(&identity.subject),
                request,
                Some("forbidden"),
            );
            return InvocationResult::error(InvocationError::new(
                ErrorCode::Forbidden,
                format!("tool {} is not in the caller's access set", request.tool_id),
            ));
        };

        let result =
            self.executor.execute(tool, &request.arguments, &identity, bearer, cancel).await;
        let error_code = result.error.as_ref().map(|error| error.code.as_str());
        self.audit_invoke(&correlation_id, &token, Some(&identity.subject), request, error_code);
        let metric = RequestMetric {
            op: GatewayOp::Invoke,
            tool: Some(request.tool_id.clone()),
            ok: error_code.is_none(),
            error_code,
            tier: Some(context.tier),
        };
        self.metrics.record_request(metric.clone());
        self.metrics.record_latency(metric, started.elapsed());
        result
    }

    /// Establishes a subscription, returning the initial context and the
    /// push receiver for subsequent catalog updates.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on authentication or resolution failure.
    pub async fn subscribe(
        &self,
        bearer: &str,
        connection_id: &ConnectionId,
    ) -> Result<
        (AccessContext, tokio::sync::mpsc::Receiver<CatalogMessage>),
        GatewayError,
    > {
        let correlation_id = self.correlation.issue();
        let token = token_fingerprint(bearer);
        let identity = match self.validator.validate(bearer).await {
            Ok(identity) => identity,
            Err(err) => {
                self.audit_denied(&correlation_id, &token, None, AuditAction::Subscribe, "unauthorized");
                return Err(err.into());
            }
        };
        let context = match self.resolve_context(&identity).await {
            Ok(context) => context,
            Err(err) => {
                self.audit_denied(
                    &correlation_id,
                    &token,
                    Some(&identity.subject),
                    AuditAction::Subscribe,
                    "forbidden",
                );
                return Err(err);
            }
        };
        let receiver =
            self.subscriptions.register(connection_id, identity.clone(), context.group_ids.clone());
        self.audit.record(AuditEvent {
            server_correlation_id: correlation_id,
            unsafe_client_correlation_id: None,
            token,
            subject: Some(identity.subject),
            action: AuditAction::Subscribe,
            tool: None,
            outcome: AuditOutcome::Ok,
            error_code: None,
        });
        Ok((context, receiver))
    }

    /// Refreshes a subscription heartbeat.
    #[must_use]
    pub fn heartbeat(&self, connection_id: &ConnectionId) -> bool {
        self.subscriptions.heartbeat(connection_id)
    }

    /// Removes a subscription.
    pub fn unsubscribe(&self, connection_id: &ConnectionId) {
        self.subscriptions.unregister(connection_id);
    }

    /// Publishes an invalidation event to every gateway instance.
    pub fn publish_event(&self, event: GatewayEvent) {
        if let Err(err) = self.bus.publish(event) {
            tracing::warn!(error = %err, "failed to publish gateway event");
        }
    }

    /// Applies one invalidation event: evict caches, re-resolve affected
    /// connections, push updated catalogs.
    ///
    /// Connections whose re-resolution fails are narrowed to an empty tool
    /// list; failing closed beats serving a stale grant.
    pub async fn handle_event(&self, event: &GatewayEvent) {
        let scope = event.scope();
        if let Err(err) = self.resolver.invalidate(scope).await {
            tracing::warn!(error = %err, "shared-tier invalidation failed");
        }
        self.catalog.invalidate(scope);
        for connection_id in self.subscriptions.affected(scope) {
            let Some(identity) = self.subscriptions.identity(&connection_id) else {
                continue;
            };
            match self.resolve_context(&identity).await {
                Ok(context) => {
                    self.subscriptions.update_groups(&connection_id, context.group_ids.clone());
                    self.subscriptions.push(&connection_id, CatalogMessage::Update {
                        tools: context.tools,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        connection = %connection_id,
                        error = %err,
                        "re-resolution failed, narrowing connection to empty catalog"
                    );
                    self.subscriptions.update_groups(&connection_id, BTreeSet::new());
                    self.subscriptions.push(&connection_id, CatalogMessage::Update {
                        tools: Vec::new(),
                    });
                }
            }
        }
    }

    /// Spawns the invalidation listener driving [`Self::handle_event`].
    ///
    /// The task ends when the cancellation token fires; bus lag is survived
    /// by continuing with the next event (affected connections re-resolve
    /// on the following change or TTL expiry).
    pub fn spawn_invalidation_listener(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        let mut receiver = service.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(event) => service.handle_event(&event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "invalidation listener lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Spawns the periodic maintenance task: expired-subscription sweeps
    /// and idle breaker eviction.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(100)));
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let swept = service.subscriptions.sweep_expired();
                        if swept > 0 {
                            tracing::debug!(swept, "expired subscriptions removed");
                        }
                        service.breakers.evict_idle();
                    }
                }
            }
        })
    }

    /// Records a denied audit event.
    fn audit_denied(
        &self,
        correlation_id: &str,
        token: &str,
        subject: Option<&str>,
        action: AuditAction,
        error_code: &'static str,
    ) {
        self.audit.record(AuditEvent {
            server_correlation_id: correlation_id.to_string(),
            unsafe_client_correlation_id: None,
            token: token.to_string(),
            subject: subject.map(str::to_string),
            action,
            tool: None,
            outcome: AuditOutcome::Denied,
            error_code: Some(error_code),
        });
    }

    /// Records an invocation audit event.
    fn audit_invoke(
        &self,
        correlation_id: &str,
        token: &str,
        subject: Option<&str>,
        request: &InvocationRequest,
        error_code: Option<&'static str>,
    ) {
        let outcome = match error_code {
            None => AuditOutcome::Ok,
            Some("unauthorized" | "forbidden") => AuditOutcome::Denied,
            Some(_) => AuditOutcome::Error,
        };
        self.audit.record(AuditEvent {
            server_correlation_id: correlation_id.to_string(),
            unsafe_client_correlation_id: None,
            token: token.to_string(),
            subject: subject.map(str::to_string),
            action: AuditAction::Invoke,
            tool: Some(request.tool_id.clone()),
            outcome,
            error_code,
        });
    }
}
