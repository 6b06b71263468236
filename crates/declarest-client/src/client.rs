//! The HTTP client.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::request::{HttpMethod, RequestSpec};
use crate::response::Response;
use crate::retry::parse_retry_after;

/// A configured HTTP client.
///
/// Verb methods return the captured [`Response`] whatever its status;
/// interpreting a 404 or a 409 is the caller's business. Errors mean the
/// exchange itself failed: configuration, transport, credentials, or
/// cancellation.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
    auth: Authenticator,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(&config)?;
        let auth = Authenticator::new(config.security.clone(), http.clone());
        Ok(Self { config, http, auth })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Creates a resource. The body defaults to `Content-Type:
    /// application/json` unless the caller set one.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        spec: &RequestSpec,
    ) -> Result<Response> {
        self.send(cancel, method, path, spec, true).await
    }

    /// Reads a resource with GET.
    pub async fn read(
        &self,
        cancel: &CancellationToken,
        path: &str,
        spec: &RequestSpec,
    ) -> Result<Response> {
        self.send(cancel, HttpMethod::Get, path, spec, false).await
    }

    /// Updates a resource. The body defaults to `Content-Type:
    /// application/json` unless the caller set one.
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        spec: &RequestSpec,
    ) -> Result<Response> {
        self.send(cancel, method, path, spec, true).await
    }

    /// Deletes a resource, optionally with a body.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        spec: &RequestSpec,
    ) -> Result<Response> {
        self.send(cancel, method, path, spec, false).await
    }

    /// Invokes a one-shot operation endpoint.
    pub async fn operation(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        spec: &RequestSpec,
    ) -> Result<Response> {
        self.send(cancel, method, path, spec, false).await
    }

    /// Reads through an arbitrary method, for APIs that answer lookups to
    /// POST-shaped search endpoints.
    pub async fn read_ds(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        spec: &RequestSpec,
    ) -> Result<Response> {
        self.send(cancel, method, path, spec, false).await
    }

    /// Reads a listing endpoint with GET.
    pub async fn read_lr(
        &self,
        cancel: &CancellationToken,
        path: &str,
        spec: &RequestSpec,
    ) -> Result<Response> {
        self.send(cancel, HttpMethod::Get, path, spec, false).await
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        spec: &RequestSpec,
        default_json: bool,
    ) -> Result<Response> {
        let url = request_url(&self.config, path, &spec.query);
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.send_once(cancel, method, &url, spec, default_json).await;
            let Some(retry) = &self.config.retry else {
                return outcome;
            };
            match &outcome {
                Ok(response)
                    if retry.should_retry_status(response.status()) && attempt < retry.count =>
                {
                    let wait = response
                        .header_value("retry-after")
                        .and_then(parse_retry_after)
                        .unwrap_or_else(|| retry.backoff(attempt));
                    warn!(
                        url = %url,
                        status = response.status(),
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "retrying request after retryable status"
                    );
                    sleep_cancellable(cancel, wait).await?;
                    attempt += 1;
                }
                Err(error) if error.is_transport() && attempt < retry.count => {
                    let wait = retry.backoff(attempt);
                    warn!(
                        url = %url,
                        error = %error,
                        attempt = attempt + 1,
                        "retrying request after transport error"
                    );
                    sleep_cancellable(cancel, wait).await?;
                    attempt += 1;
                }
                _ => return outcome,
            }
        }
    }

    async fn send_once(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        url: &str,
        spec: &RequestSpec,
        default_json: bool,
    ) -> Result<Response> {
        let mut builder = self.http.request(method.into(), url);
        for (name, value) in &spec.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &spec.body {
            builder = encode_body(builder, spec.content_type(), body, default_json)?;
        }
        builder = self.auth.apply(builder).await?;

        debug!(method = %method, url = %url, "sending request");
        let response = tokio::select! {
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = builder.send() => result?,
        };
        let captured = Response::read(response).await?;
        debug!(method = %method, url = %url, status = captured.status(), "received response");
        if captured.status() == 401 {
            self.auth.invalidate().await;
        }
        Ok(captured)
    }
}

fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .user_agent(&config.user_agent)
        .danger_accept_invalid_certs(config.tls.insecure_skip_verify);
    if config.read_timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.read_timeout_secs));
    }
    if let Some(pem) = &config.tls.ca_cert_pem {
        let certificate = reqwest::Certificate::from_pem(pem.as_bytes())
            .map_err(|e| ClientError::InvalidConfig(format!("invalid ca certificate: {e}")))?;
        builder = builder.add_root_certificate(certificate);
    }
    if config.cookie_enabled {
        builder = builder.cookie_store(true);
    }
    builder
        .build()
        .map_err(|e| ClientError::InvalidConfig(format!("failed to build http client: {e}")))
}

/// Builds the final URL. Query values arrive pre-encoded and are appended
/// verbatim rather than run through the encoder a second time.
fn request_url(
    config: &ClientConfig,
    path: &str,
    query: &std::collections::BTreeMap<String, Vec<String>>,
) -> String {
    let mut url = config.url(path);
    if query.is_empty() {
        return url;
    }
    let mut parts = Vec::new();
    for (name, values) in query {
        for value in values {
            parts.push(format!("{name}={value}"));
        }
    }
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&parts.join("&"));
    url
}

fn encode_body(
    builder: reqwest::RequestBuilder,
    content_type: Option<&str>,
    body: &Value,
    default_json: bool,
) -> Result<reqwest::RequestBuilder> {
    match content_type {
        Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
            Ok(builder.form(&form_pairs(body)?))
        }
        Some(_) => Ok(builder.body(serde_json::to_vec(body)?)),
        None if default_json => Ok(builder.json(body)),
        None => Ok(builder.body(serde_json::to_vec(body)?)),
    }
}

/// A form body must be a flat object of scalars.
fn form_pairs(body: &Value) -> Result<Vec<(String, String)>> {
    let Value::Object(map) = body else {
        return Err(ClientError::FormEncode(
            "form bodies must be a json object".to_string(),
        ));
    };
    let mut pairs = Vec::with_capacity(map.len());
    for (name, value) in map {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            Value::Array(_) | Value::Object(_) => {
                return Err(ClientError::FormEncode(format!(
                    "field {name:?} is not a scalar"
                )));
            }
        };
        pairs.push((name.clone(), rendered));
    }
    Ok(pairs)
}

async fn sleep_cancellable(cancel: &CancellationToken, wait: Duration) -> Result<()> {
    tokio::select! {
        () = cancel.cancelled() => Err(ClientError::Cancelled),
        () = tokio::time::sleep(wait) => Ok(()),
    }
}

// ============================================================================
// Tests
// ============================================================================
