// crates/toolgate-exec/src/executor.rs
// ============================================================================
// Module: Tool Executor
// Description: Guarded synchronous and async-poll tool execution.
// Purpose: Run one tool call end to end with exchange, breaker, and bounds.
// Dependencies: jsonschema, jsonpath_lib, tokio, tokio-util, toolgate-*
// ============================================================================

//! ## Overview
//! `execute` runs the strict sequence: argument validation → credential
//! exchange → template rendering → breaker admission → upstream call. The
//! async-poll mode drives the state machine Triggered → Polling →
//! {Completed | Failed | Timeout}: every tick first checks the caller's
//! cancellation token, then sleeps the backoff interval, then polls the
//! status endpoint; the loop is hard-bounded by `max_attempts`.
//! Invariants:
//! - No network call before validation and rendering succeed.
//! - The rendered request carries the exchanged credential, never the
//!   caller's bearer token.
//! - Cancellation never records a breaker failure.
//! - All failures map onto the stable invocation error taxonomy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use jsonschema::Draft;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use toolgate_auth::CredentialExchanger;
use toolgate_auth::ExchangeError;
use toolgate_contract::ErrorCode;
use toolgate_contract::ExecutionMode;
use toolgate_contract::ExecutionProfile;
use toolgate_contract::HttpMethod;
use toolgate_contract::InvocationError;
use toolgate_contract::InvocationResult;
use toolgate_contract::PollConfig;
use toolgate_contract::ToolManifestEntry;
use toolgate_core::BreakerDecision;
use toolgate_core::BreakerRegistry;
use toolgate_core::Identity;

use crate::render::RenderError;
use crate::render::RenderedRequest;
use crate::render::render_request;
use crate::render::render_status_url;
use crate::render::upstream_key_for;
use crate::upstream::TransportError;
use crate::upstream::UpstreamResponse;
use crate::upstream::UpstreamTransport;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Executor settings.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Timeout applied when a profile declares none, in milliseconds.
    pub default_timeout_ms: i64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Guarded tool executor.
pub struct ToolExecutor {
    /// Executor settings.
    config: ExecutorConfig,
    /// Credential exchanger for upstream audiences.
    exchanger: Arc<CredentialExchanger>,
    /// Per-upstream breaker registry.
    breakers: Arc<BreakerRegistry>,
    /// Outbound transport.
    transport: Arc<dyn UpstreamTransport>,
}

impl ToolExecutor {
    /// Creates an executor over the given collaborators.
    #[must_use]
    pub fn new(
        config: ExecutorConfig,
        exchanger: Arc<CredentialExchanger>,
        breakers: Arc<BreakerRegistry>,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Self {
        Self {
            config,
            exchanger,
            breakers,
            transport,
        }
    }

    /// Executes one tool call for a validated identity.
    ///
    /// Failures are returned as structured results; this method never
    /// panics and never surfaces a transport error directly.
    pub async fn execute(
        &self,
        tool: &ToolManifestEntry,
        arguments: &Value,
        identity: &Identity,
        caller_credential: &str,
        cancel: &CancellationToken,
    ) -> InvocationResult {
        match self.try_execute(tool, arguments, identity, caller_credential, cancel).await {
            Ok(result) => InvocationResult::completed(result),
            Err(error) => {
                tracing::debug!(
                    tool = %tool.tool_id,
                    code = error.code.as_str(),
                    retryable = error.retryable,
                    "tool execution failed"
                );
                InvocationResult::error(error)
            }
        }
    }

    /// Runs the execution sequence, mapping every failure to a wire error.
    async fn try_execute(
        &self,
        tool: &ToolManifestEntry,
        arguments: &Value,
        identity: &Identity,
        caller_credential: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, InvocationError> {
        if cancel.is_cancelled() {
            return Err(InvocationError::new(ErrorCode::Cancelled, "invocation cancelled"));
        }
        validate_arguments(&tool.input_schema, arguments)?;

        let profile = &tool.profile;
        let credential = self
            .exchanger
            .exchange(
                &identity.subject,
                caller_credential,
                &profile.required_audience,
                &profile.required_scopes,
            )
            .await
            .map_err(exchange_error)?;

        let mut request = render_request(profile, arguments).map_err(render_error)?;
        request
            .headers
            .insert("authorization".to_string(), format!("Bearer {}", credential.access_token));

        if let BreakerDecision::Deny {
            retry_after_ms,
        } = self.breakers.check(&request.upstream)
        {
            return Err(InvocationError::new(
                ErrorCode::CircuitOpen,
                format!("upstream {} is cooling down", request.upstream),
            )
            .with_retry_after(retry_after_ms));
        }

        let timeout_ms = profile.timeout_ms.unwrap_or(self.config.default_timeout_ms);
        match profile.mode {
            ExecutionMode::Sync => {
                let response = self.guarded_send(&request, timeout_ms, cancel).await?;
                let body = self.classify_response(&request, response)?;
                Ok(apply_mapping(profile.response_mapping.as_deref(), body))
            }
            ExecutionMode::AsyncPoll => {
                let poll = profile.poll.as_ref().ok_or_else(|| {
                    InvocationError::new(
                        ErrorCode::Internal,
                        "async profile missing poll configuration",
                    )
                })?;
                self.run_poll_loop(profile, poll, &request, timeout_ms, cancel).await
            }
        }
    }

    /// Drives the Triggered → Polling → terminal state machine.
    async fn run_poll_loop(
        &self,
        profile: &ExecutionProfile,
        poll: &PollConfig,
        trigger: &RenderedRequest,
        timeout_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<Value, InvocationError> {
        let response = self.guarded_send(trigger, timeout_ms, cancel).await?;
        let trigger_body = self.classify_response(trigger, response)?;
        let job_id = extract_path(&trigger_body, &poll.job_id_path)
            .as_ref()
            .map(value_label)
            .ok_or_else(|| {
                InvocationError::new(
                    ErrorCode::Internal,
                    "trigger response missing job identifier",
                )
            })?;
        tracing::debug!(job = %job_id, "async execution triggered, polling");

        let authorization = trigger.headers.get("authorization").cloned();
        for attempt in 0..poll.max_attempts {
            let delay = poll.interval_for_attempt(attempt);
            let sleep = tokio::time::sleep(Duration::from_millis(u64::try_from(delay).unwrap_or(0)));
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(InvocationError::new(
                        ErrorCode::Cancelled,
                        "invocation cancelled while polling",
                    ));
                }
                () = sleep => {}
            }

            let status_request = self.status_request(poll, &job_id, authorization.as_deref())?;
            let response = self.guarded_send(&status_request, timeout_ms, cancel).await?;
            let body = self.classify_response(&status_request, response)?;
            let Some(status) = extract_path(&body, &poll.status_path) else {
                continue;
            };
            let label = value_label(&status);
            if poll.completed_values.contains(&label) {
                let result = match &poll.result_path {
                    Some(path) => extract_path(&body, path).unwrap_or(Value::Null),
                    None => body,
                };
                return Ok(apply_mapping(profile.response_mapping.as_deref(), result));
            }
            if poll.failed_values.contains(&label) {
                return Err(InvocationError::new(
                    ErrorCode::JobFailed,
                    format!("job reported status {label}"),
                ));
            }
        }
        Err(InvocationError::new(
            ErrorCode::PollTimeout,
            format!("job did not complete within {} poll attempts", poll.max_attempts),
        ))
    }

    /// Builds the status request for one poll attempt.
    fn status_request(
        &self,
        poll: &PollConfig,
        job_id: &str,
        authorization: Option<&str>,
    ) -> Result<RenderedRequest, InvocationError> {
        let url = render_status_url(poll, job_id).map_err(render_error)?;
        let upstream = upstream_key_for(&url).map_err(render_error)?;
        let mut headers = BTreeMap::new();
        if let Some(authorization) = authorization {
            headers.insert("authorization".to_string(), authorization.to_string());
        }
        Ok(RenderedRequest {
            method: HttpMethod::Get,
            url,
            headers,
            body: None,
            upstream,
        })
    }

    /// Sends one request under cancellation, mapping transport failures.
    ///
    /// Cancellation aborts without recording any breaker outcome; transport
    /// failures record a breaker failure for the request's upstream.
    async fn guarded_send(
        &self,
        request: &RenderedRequest,
        timeout_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse, InvocationError> {
        let send = self.transport.send(request, timeout_ms);
        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                return Err(InvocationError::new(
                    ErrorCode::Cancelled,
                    "invocation cancelled in flight",
                ));
            }
            outcome = send => outcome,
        };
        match outcome {
            Ok(response) => Ok(response),
            Err(TransportError::Timeout) => {
                self.breakers.record_failure(&request.upstream);
                Err(InvocationError::new(ErrorCode::UpstreamUnavailable, "upstream call timed out"))
            }
            Err(TransportError::Network(message)) => {
                self.breakers.record_failure(&request.upstream);
                Err(InvocationError::new(ErrorCode::UpstreamUnavailable, message))
            }
            Err(TransportError::Policy(message)) => {
                Err(InvocationError::new(ErrorCode::Internal, message))
            }
        }
    }

    /// Classifies an upstream status, recording the breaker outcome.
    ///
    /// 2xx and 4xx both indicate a reachable upstream and count as breaker
    /// successes; anything else counts as a failure.
    fn classify_response(
        &self,
        request: &RenderedRequest,
        response: UpstreamResponse,
    ) -> Result<Value, InvocationError> {
        if response.is_success() {
            self.breakers.record_success(&request.upstream);
            return Ok(response.body);
        }
        if response.is_client_error() {
            self.breakers.record_success(&request.upstream);
            return Err(InvocationError::new(
                ErrorCode::UpstreamRejected,
                format!("upstream returned status {}", response.status),
            ));
        }
        self.breakers.record_failure(&request.upstream);
        Err(InvocationError::new(
            ErrorCode::UpstreamUnavailable,
            format!("upstream returned status {}", response.status),
        ))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates arguments against the tool's input schema.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), InvocationError> {
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| {
            InvocationError::new(ErrorCode::Internal, format!("tool schema invalid: {err}"))
        })?;
    if validator.is_valid(arguments) {
        return Ok(());
    }
    let message = validator
        .iter_errors(arguments)
        .next()
        .map_or_else(|| "arguments failed schema validation".to_string(), |err| err.to_string());
    Err(InvocationError::new(ErrorCode::InvalidArguments, message))
}

/// Maps exchange failures onto wire error codes.
fn exchange_error(err: ExchangeError) -> InvocationError {
    let code = match err {
        ExchangeError::Rejected(_) => ErrorCode::ExchangeRejected,
        ExchangeError::Unreachable(_) => ErrorCode::ExchangeUnreachable,
        ExchangeError::MalformedResponse(_) => ErrorCode::ExchangeMalformed,
    };
    InvocationError::new(code, err.to_string())
}

/// Maps rendering failures onto wire error codes.
fn render_error(err: RenderError) -> InvocationError {
    match err {
        RenderError::UndeclaredVariable(_) => {
            InvocationError::new(ErrorCode::Internal, err.to_string())
        }
        RenderError::MissingArgument(_)
        | RenderError::NonObjectArguments
        | RenderError::UnsupportedValue(_)
        | RenderError::HeaderInjection(_)
        | RenderError::InvalidUrl(_) => {
            InvocationError::new(ErrorCode::InvalidArguments, err.to_string())
        }
    }
}

/// Extracts the first match of a JSON path, when any.
fn extract_path(body: &Value, path: &str) -> Option<Value> {
    jsonpath_lib::select(body, path)
        .ok()
        .and_then(|matches| matches.first().map(|value| (*value).clone()))
}

/// Renders a JSON value as a comparable status label.
fn value_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Applies the optional response mapping to a result body.
fn apply_mapping(mapping: Option<&str>, body: Value) -> Value {
    match mapping {
        Some(path) => extract_path(&body, path).unwrap_or(Value::Null),
        None => body,
    }
}
