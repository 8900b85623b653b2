//! batchexecute RPC client with auth-aware retry.

use super::codec;
use crate::auth::TokenAuthority;
use crate::error::{NotebookError, Result};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Additional attempts after the first.
pub const MAX_RETRIES: u32 = 2;

/// First `_reqid` and the step between calls.
pub const REQID_STEP: u64 = 100_000;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Routing hint sent as `source-path`; defaults to `/`.
    pub source_path: Option<String>,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    #[must_use]
    pub fn source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Monotonic `_reqid` generator.
#[derive(Debug)]
pub(crate) struct RequestIds(AtomicU64);

impl RequestIds {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(REQID_STEP))
    }

    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(REQID_STEP, Ordering::Relaxed)
    }
}

/// `f.req=<envelope>&at=<csrf>&`, both url-encoded.
pub fn form_body(envelope: &str, csrf: &str) -> String {
    format!(
        "f.req={}&at={}&",
        urlencoding::encode(envelope),
        urlencoding::encode(csrf)
    )
}

/// `[[[callId, JSON(params), null, "generic"]]]`.
pub fn rpc_envelope(rpc_id: &str, params: &Value) -> String {
    json!([[[rpc_id, params.to_string(), null, "generic"]]]).to_string()
}

fn map_send_error(err: &reqwest::Error, what: &str, timeout: Duration) -> NotebookError {
    if err.is_timeout() {
        NotebookError::timeout(format!(
            "{what} timed out after {}ms",
            timeout.as_millis()
        ))
    } else {
        NotebookError::Unexpected(anyhow::anyhow!("{what} failed: {err}"))
    }
}

/// POST an authenticated form and return the body text of a 2xx response.
///
/// 401/403 invalidates the cached CSRF token and yields an authentication
/// error; other non-2xx statuses are validation errors.
pub(crate) async fn post_form(
    authority: &TokenAuthority,
    url: &str,
    query: &[(&str, String)],
    envelope: &str,
    timeout: Duration,
    what: &str,
) -> Result<String> {
    let csrf = authority.get_csrf_token().await?;
    let headers = authority.get_headers()?;

    let response = authority
        .http()
        .post(url)
        .query(query)
        .headers(headers)
        .body(form_body(envelope, &csrf))
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_send_error(&e, what, timeout))?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        authority.invalidate_csrf();
        return Err(NotebookError::auth(format!(
            "{what} rejected with HTTP {}. Log in again if this persists.",
            status.as_u16()
        )));
    }
    if !status.is_success() {
        return Err(NotebookError::validation(format!(
            "{what} failed with status {}",
            status.as_u16()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| map_send_error(&e, what, timeout))
}

pub struct RpcClient {
    authority: Arc<TokenAuthority>,
    default_timeout: Duration,
    reqids: RequestIds,
}

impl RpcClient {
    pub fn new(authority: Arc<TokenAuthority>, default_timeout: Duration) -> Self {
        Self {
            authority,
            default_timeout,
            reqids: RequestIds::new(),
        }
    }

    pub fn authority(&self) -> &Arc<TokenAuthority> {
        &self.authority
    }

    /// Call `rpc_id` with default options.
    pub async fn call(&self, rpc_id: &str, params: &Value) -> Result<Option<Value>> {
        self.call_with(rpc_id, params, &CallOptions::default()).await
    }

    /// Call `rpc_id`. `Ok(None)` means the response carried no envelope for it.
    pub async fn call_with(
        &self,
        rpc_id: &str,
        params: &Value,
        options: &CallOptions,
    ) -> Result<Option<Value>> {
        let envelope = rpc_envelope(rpc_id, params);
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let source_path = options.source_path.as_deref().unwrap_or("/");

        let mut attempt = 0;
        loop {
            match self.attempt(rpc_id, &envelope, source_path, timeout).await {
                Ok(result) => {
                    if attempt > 0 {
                        tracing::info!(rpc_id, attempt, "RPC recovered after retry");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if matches!(e, NotebookError::Authentication(_)) {
                        self.authority.invalidate_csrf();
                    }
                    if !e.is_retryable() || attempt >= MAX_RETRIES {
                        tracing::error!(rpc_id, attempt, category = e.category(), "RPC failed: {e}");
                        return Err(e);
                    }
                    attempt += 1;
                    tracing::warn!(
                        rpc_id,
                        attempt,
                        max_retries = MAX_RETRIES,
                        "RPC attempt failed, retrying: {e}"
                    );
                }
            }
        }
    }

    async fn attempt(
        &self,
        rpc_id: &str,
        envelope: &str,
        source_path: &str,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        let endpoints = self.authority.endpoints();
        let query = [
            ("rpcids", rpc_id.to_string()),
            ("source-path", source_path.to_string()),
            ("bl", endpoints.build_label.clone()),
            ("hl", endpoints.locale.clone()),
            ("_reqid", self.reqids.next().to_string()),
            ("rt", "c".to_string()),
        ];
        let what = format!("RPC call {rpc_id}");
        let text = post_form(
            &self.authority,
            &endpoints.batchexecute_url(),
            &query,
            envelope,
            timeout,
            &what,
        )
        .await?;
        codec::parse_and_extract(&text, rpc_id)
    }

    /// Drop the cached CSRF token.
    pub fn invalidate_csrf(&self) {
        self.authority.invalidate_csrf();
    }
}
