//! Attaching credentials to outgoing requests.
//!
//! Static schemes (Basic, Bearer, API keys) are applied directly. The
//! OAuth2 grants go through a cached token: the first request fetches it,
//! later requests reuse it until shortly before expiry, and concurrent
//! refreshes collapse into one token request behind the cache's write
//! lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::security::{ApiKeyLocation, AuthStyle, SecurityConfig};

/// Token expiry is pulled forward so a token is never presented while it
/// is about to lapse in flight.
const EXPIRY_MARGIN_SECS: u64 = 30;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Applies a [`SecurityConfig`] to request builders.
#[derive(Debug, Clone)]
pub struct Authenticator {
    security: SecurityConfig,
    http: reqwest::Client,
    cached: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    #[must_use]
    pub fn new(security: SecurityConfig, http: reqwest::Client) -> Self {
        Self {
            security,
            http,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Attaches credentials to a request, fetching a token first when the
    /// scheme needs one.
    pub async fn apply(&self, mut builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match &self.security {
            SecurityConfig::None => Ok(builder),
            SecurityConfig::Basic { username, password } => {
                Ok(builder.basic_auth(username, Some(password)))
            }
            SecurityConfig::Bearer { token } => Ok(builder.bearer_auth(token)),
            SecurityConfig::ApiKey { keys } => {
                let mut cookies = Vec::new();
                for key in keys {
                    match key.location {
                        ApiKeyLocation::Header => {
                            builder = builder.header(&key.name, &key.value);
                        }
                        ApiKeyLocation::Query => {
                            builder = builder.query(&[(&key.name, &key.value)]);
                        }
                        ApiKeyLocation::Cookie => {
                            cookies.push(format!("{}={}", key.name, key.value));
                        }
                    }
                }
                if !cookies.is_empty() {
                    builder = builder.header(reqwest::header::COOKIE, cookies.join("; "));
                }
                Ok(builder)
            }
            SecurityConfig::Oauth2ClientCredentials { .. }
            | SecurityConfig::Oauth2Password { .. } => {
                let token = self.token().await?;
                Ok(builder.bearer_auth(token))
            }
        }
    }

    /// Drops the cached token so the next request fetches a fresh one.
    /// Called when the remote answers 401 despite a token we thought valid.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        if cached.take().is_some() {
            debug!("dropped cached oauth2 token after an authorization failure");
        }
    }

    async fn token(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(token.access_token.clone());
                }
            }
        }
        // Writer holds the slot for the whole fetch; latecomers block here
        // and then hit the fresh token in the double-check.
        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }
        let fresh = self.fetch_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        match &self.security {
            SecurityConfig::Oauth2ClientCredentials {
                token_url,
                client_id,
                client_secret,
                scopes,
                endpoint_params,
                auth_style,
            } => {
                let mut form = vec![("grant_type".to_string(), "client_credentials".to_string())];
                push_scope(&mut form, scopes);
                push_endpoint_params(&mut form, endpoint_params);
                self.request_token(
                    token_url,
                    form,
                    Some((client_id.as_str(), client_secret.as_str())),
                    *auth_style,
                )
                .await
            }
            SecurityConfig::Oauth2Password {
                token_url,
                username,
                password,
                client_id,
                client_secret,
                scopes,
                auth_style,
            } => {
                let mut form = vec![
                    ("grant_type".to_string(), "password".to_string()),
                    ("username".to_string(), username.clone()),
                    ("password".to_string(), password.clone()),
                ];
                push_scope(&mut form, scopes);
                let credentials = client_id
                    .as_deref()
                    .map(|id| (id, client_secret.as_deref().unwrap_or("")));
                self.request_token(token_url, form, credentials, *auth_style)
                    .await
            }
            _ => Err(ClientError::Auth(
                "security scheme does not issue tokens".to_string(),
            )),
        }
    }

    async fn request_token(
        &self,
        token_url: &str,
        form: Vec<(String, String)>,
        credentials: Option<(&str, &str)>,
        auth_style: AuthStyle,
    ) -> Result<CachedToken> {
        let styles: &[AuthStyle] = match (credentials, auth_style) {
            (None, _) => &[AuthStyle::Params],
            (Some(_), AuthStyle::Auto) => &[AuthStyle::Header, AuthStyle::Params],
            (Some(_), AuthStyle::Header) => &[AuthStyle::Header],
            (Some(_), AuthStyle::Params) => &[AuthStyle::Params],
        };

        let mut last_failure = String::new();
        for (index, style) in styles.iter().enumerate() {
            let mut request_form = form.clone();
            let mut request = self.http.post(token_url);
            if let Some((client_id, client_secret)) = credentials {
                match style {
                    AuthStyle::Header | AuthStyle::Auto => {
                        request = request.basic_auth(client_id, Some(client_secret));
                    }
                    AuthStyle::Params => {
                        request_form.push(("client_id".to_string(), client_id.to_string()));
                        if !client_secret.is_empty() {
                            request_form
                                .push(("client_secret".to_string(), client_secret.to_string()));
                        }
                    }
                }
            }

            let response = request.form(&request_form).send().await.map_err(|e| {
                ClientError::Auth(format!("token request to {token_url} failed: {e}"))
            })?;
            let status = response.status();
            if status.is_success() {
                let payload: TokenResponse = response.json().await.map_err(|e| {
                    ClientError::Auth(format!("token response from {token_url} is not valid: {e}"))
                })?;
                debug!(token_url = %token_url, "obtained oauth2 access token");
                return Ok(CachedToken {
                    access_token: payload.access_token,
                    expires_at: payload.expires_in.map(|secs| {
                        Instant::now() + Duration::from_secs(secs.saturating_sub(EXPIRY_MARGIN_SECS))
                    }),
                });
            }

            let body = response.text().await.unwrap_or_default();
            last_failure = format!("token endpoint {token_url} returned {status}: {body}");
            let may_switch_style =
                matches!(status.as_u16(), 400 | 401) && index + 1 < styles.len();
            if may_switch_style {
                debug!(
                    status = status.as_u16(),
                    "token endpoint rejected client secret in header, retrying in params"
                );
                continue;
            }
            return Err(ClientError::Auth(last_failure));
        }
        Err(ClientError::Auth(last_failure))
    }
}

fn push_scope(form: &mut Vec<(String, String)>, scopes: &[String]) {
    if !scopes.is_empty() {
        form.push(("scope".to_string(), scopes.join(" ")));
    }
}

fn push_endpoint_params(
    form: &mut Vec<(String, String)>,
    endpoint_params: &BTreeMap<String, Vec<String>>,
) {
    for (name, values) in endpoint_params {
        for value in values {
            form.push((name.clone(), value.clone()));
        }
    }
}
