//! Blocking vendor HTTP transport.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` so a vendor
//! call never blocks the async runtime. Every request carries a fixed
//! global timeout. Responses are classified into [`AdapterError`] kinds:
//!
//! | Outcome | Error |
//! |---|---|
//! | 401, 403 | `Auth` |
//! | 429 | `RateLimited` (with `Retry-After` seconds when sent) |
//! | 5xx, timeout, connection failure | `Transient` |
//! | any other non-2xx | `Vendor` |
//! | 2xx with a body that is not JSON | `InvalidResponse` |

use std::time::Duration;

use serde_json::Value;

use crate::error::AdapterError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// JSON-over-HTTP client bound to one vendor base URL and one set of
/// auth headers.
#[derive(Clone)]
pub struct VendorHttpClient {
    agent: ureq::Agent,
    base_url: String,
    headers: Vec<(String, String)>,
}

impl VendorHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        VendorHttpClient {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, AdapterError> {
        self.send(Method::Get, path, query, None).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, AdapterError> {
        self.send(Method::Post, path, &[], Some(body.clone())).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, AdapterError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let agent = self.agent.clone();
        let headers = self.headers.clone();
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        tracing::debug!(method = method.as_str(), url = %url, "vendor request");

        let log_url = url.clone();
        let result = tokio::task::spawn_blocking(move || {
            let response = match method {
                Method::Get => {
                    let mut request = agent.get(url.as_str());
                    for (name, value) in &headers {
                        request = request.header(name.as_str(), value.as_str());
                    }
                    for (key, value) in &query {
                        request = request.query(key.as_str(), value.as_str());
                    }
                    request.call()
                }
                Method::Post => {
                    let mut request = agent.post(url.as_str());
                    for (name, value) in &headers {
                        request = request.header(name.as_str(), value.as_str());
                    }
                    for (key, value) in &query {
                        request = request.query(key.as_str(), value.as_str());
                    }
                    request.send_json(body.unwrap_or(Value::Null))
                }
            }
            .map_err(classify_transport)?;

            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = response
                .into_body()
                .read_to_string()
                .map_err(classify_transport)?;

            if !(200..300).contains(&status) {
                return Err(classify_status(status, retry_after.as_deref(), &text));
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text)
                .map_err(|e| AdapterError::invalid(format!("response is not JSON: {}", e)))
        })
        .await
        .map_err(|e| AdapterError::Transient {
            message: format!("task join error: {}", e),
        })?;

        if let Err(e) = &result {
            tracing::warn!(method = method.as_str(), url = %log_url, error = %e, "vendor call failed");
        }
        result
    }
}

fn classify_transport(e: ureq::Error) -> AdapterError {
    match &e {
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => AdapterError::Transient {
            message: e.to_string(),
        },
        _ => AdapterError::invalid(e.to_string()),
    }
}

/// Map a non-2xx status to an error kind.
pub fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> AdapterError {
    let message = vendor_message(body);
    match status {
        401 | 403 => AdapterError::Auth { message },
        429 => AdapterError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        500..=599 => AdapterError::Transient {
            message: format!("HTTP {}: {}", status, message),
        },
        _ => AdapterError::Vendor { status, message },
    }
}

/// Pull a human-readable message out of a vendor error body.
///
/// Both reference vendors nest it as `{"error": {"message": ...}}`.
fn vendor_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let nested = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(|m| m.as_str());
    match nested {
        Some(m) => m.to_string(),
        None if body.trim().is_empty() => "(empty body)".to_string(),
        None => body.chars().take(200).collect(),
    }
}
