// crates/toolgate-exec/src/render.rs
// ============================================================================
// Module: Request Rendering
// Description: Template substitution over declared argument variables only.
// Purpose: Produce concrete upstream requests without expression evaluation.
// Dependencies: serde_json, url, toolgate-contract, toolgate-core
// ============================================================================

//! ## Overview
//! Templates use `{{name}}` placeholders. Rendering substitutes values from
//! the invocation arguments for placeholders whose names appear in the
//! profile's declared variable set; anything else is rejected. There is no
//! expression language and no nested lookup, which is what keeps template
//! injection out of the execution path. URL substitutions are
//! percent-encoded; header substitutions reject control characters; body
//! templates substitute JSON values structurally.
//! Invariants:
//! - An undeclared placeholder is a profile defect and fails rendering.
//! - A declared placeholder without a matching argument fails rendering.
//! - The rendered URL determines the canonical upstream key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde_json::Value;
use thiserror::Error;
use toolgate_contract::ExecutionProfile;
use toolgate_contract::HttpMethod;
use toolgate_contract::PollConfig;
use toolgate_core::UpstreamKey;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Rendering errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; all are terminal.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Template references a variable the profile does not declare.
    #[error("template references undeclared variable: {0}")]
    UndeclaredVariable(String),
    /// A declared variable has no matching argument.
    #[error("missing argument for variable: {0}")]
    MissingArgument(String),
    /// Arguments payload is not a JSON object.
    #[error("arguments must be a json object")]
    NonObjectArguments,
    /// Argument value cannot be substituted into a text context.
    #[error("argument {0} cannot be rendered into a text template")]
    UnsupportedValue(String),
    /// Header value would carry control characters after substitution.
    #[error("rendered header {0} contains control characters")]
    HeaderInjection(String),
    /// Rendered URL failed to parse or used a forbidden scheme.
    #[error("rendered url invalid: {0}")]
    InvalidUrl(String),
}

// ============================================================================
// SECTION: Rendered Request
// ============================================================================

/// Concrete upstream request produced from a profile and arguments.
///
/// # Invariants
/// - `url` is absolute with an http or https scheme.
/// - `upstream` is derived from the rendered URL's scheme, host, and port.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Fully rendered absolute URL.
    pub url: Url,
    /// Rendered headers keyed by header name.
    pub headers: BTreeMap<String, String>,
    /// Rendered JSON body when the profile declares one.
    pub body: Option<Value>,
    /// Canonical upstream key for breaker bookkeeping.
    pub upstream: UpstreamKey,
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the trigger request for a profile.
///
/// # Errors
///
/// Returns [`RenderError`] when arguments or templates are unusable; no
/// partial request is ever produced.
pub fn render_request(
    profile: &ExecutionProfile,
    arguments: &Value,
) -> Result<RenderedRequest, RenderError> {
    let arguments = arguments.as_object().ok_or(RenderError::NonObjectArguments)?;

    let url_text = substitute_text(
        &profile.url_template,
        &profile.variables,
        arguments,
        TextContext::Url,
    )?;
    let url = parse_upstream_url(&url_text)?;

    let mut headers = BTreeMap::new();
    for (name, template) in &profile.header_templates {
        let value =
            substitute_text(template, &profile.variables, arguments, TextContext::Header)?;
        if value.chars().any(char::is_control) {
            return Err(RenderError::HeaderInjection(name.clone()));
        }
        headers.insert(name.clone(), value);
    }

    let body = match &profile.body_template {
        Some(template) => {
            Some(substitute_value(template, &profile.variables, arguments)?)
        }
        None => None,
    };

    let upstream = upstream_key_for(&url)?;
    Ok(RenderedRequest {
        method: profile.method,
        url,
        headers,
        body,
        upstream,
    })
}

/// Renders the status URL for one poll attempt.
///
/// The only variable available here is `job_id`, bound to the identifier
/// extracted from the trigger response.
///
/// # Errors
///
/// Returns [`RenderError`] when the template is unusable.
pub fn render_status_url(poll: &PollConfig, job_id: &str) -> Result<Url, RenderError> {
    let variables = BTreeSet::from(["job_id".to_string()]);
    let mut arguments = serde_json::Map::new();
    arguments.insert("job_id".to_string(), Value::String(job_id.to_string()));
    let url_text =
        substitute_text(&poll.status_url_template, &variables, &arguments, TextContext::Url)?;
    parse_upstream_url(&url_text)
}

/// Derives the canonical upstream key from a rendered URL.
///
/// # Errors
///
/// Returns [`RenderError::InvalidUrl`] when the URL lacks a host or port.
pub fn upstream_key_for(url: &Url) -> Result<UpstreamKey, RenderError> {
    let host = url
        .host_str()
        .ok_or_else(|| RenderError::InvalidUrl("url host required".to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| RenderError::InvalidUrl("url port required".to_string()))?;
    Ok(UpstreamKey::from_parts(url.scheme(), host, port))
}

// ============================================================================
// SECTION: Substitution Helpers
// ============================================================================

/// Text contexts with different escaping rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextContext {
    /// URL path or query position; values are percent-encoded.
    Url,
    /// Header value position; values are used verbatim and checked after.
    Header,
}

/// Substitutes `{{name}}` placeholders in a text template.
fn substitute_text(
    template: &str,
    declared: &BTreeSet<String>,
    arguments: &serde_json::Map<String, Value>,
    context: TextContext,
) -> Result<String, RenderError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            output.push_str(&rest[start..]);
            return Ok(output);
        };
        let name = after[..end].trim();
        let rendered = lookup_text_value(name, declared, arguments)?;
        match context {
            TextContext::Url => percent_encode_into(&rendered, &mut output),
            TextContext::Header => output.push_str(&rendered),
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    Ok(output)
}

/// Resolves one placeholder into its text form.
fn lookup_text_value(
    name: &str,
    declared: &BTreeSet<String>,
    arguments: &serde_json::Map<String, Value>,
) -> Result<String, RenderError> {
    if !declared.contains(name) {
        return Err(RenderError::UndeclaredVariable(name.to_string()));
    }
    let value = arguments.get(name).ok_or_else(|| {
        RenderError::MissingArgument(name.to_string())
    })?;
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            Err(RenderError::UnsupportedValue(name.to_string()))
        }
    }
}

/// Substitutes placeholders inside a JSON body template.
///
/// A string consisting of exactly one placeholder is replaced by the whole
/// argument value, preserving its JSON type; strings with embedded
/// placeholders substitute textually; objects and arrays recurse.
fn substitute_value(
    template: &Value,
    declared: &BTreeSet<String>,
    arguments: &serde_json::Map<String, Value>,
) -> Result<Value, RenderError> {
    match template {
        Value::String(text) => {
            if let Some(name) = exact_placeholder(text) {
                if !declared.contains(name) {
                    return Err(RenderError::UndeclaredVariable(name.to_string()));
                }
                let value = arguments
                    .get(name)
                    .ok_or_else(|| RenderError::MissingArgument(name.to_string()))?;
                Ok(value.clone())
            } else {
                Ok(Value::String(substitute_text(
                    text,
                    declared,
                    arguments,
                    TextContext::Header,
                )?))
            }
        }
        Value::Array(elements) => {
            let mut rendered = Vec::with_capacity(elements.len());
            for element in elements {
                rendered.push(substitute_value(element, declared, arguments)?);
            }
            Ok(Value::Array(rendered))
        }
        Value::Object(fields) => {
            let mut rendered = serde_json::Map::with_capacity(fields.len());
            for (key, value) in fields {
                rendered.insert(key.clone(), substitute_value(value, declared, arguments)?);
            }
            Ok(Value::Object(rendered))
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(template.clone()),
    }
}

/// Returns the variable name when the text is exactly one placeholder.
fn exact_placeholder(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("{{")?.strip_suffix("}}")?;
    let name = inner.trim();
    if name.is_empty() || name.contains("{{") { None } else { Some(name) }
}

/// Percent-encodes a substituted value for URL positions.
///
/// Unreserved characters (RFC 3986) pass through; everything else is
/// encoded, which keeps path and query injection out of rendered URLs.
fn percent_encode_into(value: &str, output: &mut String) {
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                output.push(char::from(byte));
            }
            _ => {
                let _ = write!(output, "%{byte:02X}");
            }
        }
    }
}

/// Parses a rendered URL and enforces the scheme policy.
fn parse_upstream_url(text: &str) -> Result<Url, RenderError> {
    let url = Url::parse(text).map_err(|err| RenderError::InvalidUrl(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RenderError::InvalidUrl(format!("unsupported scheme: {other}")));
        }
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(RenderError::InvalidUrl("url credentials are not allowed".to_string()));
    }
    Ok(url)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
