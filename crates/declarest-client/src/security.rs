//! Security schemes applied to outgoing requests.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// How a request proves who it is.
///
/// The variants map onto the usual OpenAPI security schemes: nothing, HTTP
/// Basic, a static bearer token, one or more API keys, or an OAuth2 token
/// fetched through the client-credentials or password grant.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityConfig {
    /// No credentials are attached.
    #[default]
    None,

    /// HTTP Basic on every request.
    Basic { username: String, password: String },

    /// A static `Authorization: Bearer` token.
    Bearer { token: String },

    /// One or more API keys placed in headers, query parameters, or cookies.
    ApiKey { keys: Vec<ApiKeyEntry> },

    /// OAuth2 client-credentials grant; tokens are fetched lazily and cached.
    Oauth2ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: String,
        #[serde(default)]
        scopes: Vec<String>,
        /// Extra form parameters sent to the token endpoint.
        #[serde(default)]
        endpoint_params: BTreeMap<String, Vec<String>>,
        #[serde(default)]
        auth_style: AuthStyle,
    },

    /// OAuth2 resource-owner password grant.
    Oauth2Password {
        token_url: String,
        username: String,
        password: String,
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        client_secret: Option<String>,
        #[serde(default)]
        scopes: Vec<String>,
        #[serde(default)]
        auth_style: AuthStyle,
    },
}

/// Where the OAuth2 client id and secret travel in a token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// Try the Basic header first, then retry once in the form body when
    /// the token endpoint answers 400 or 401.
    #[default]
    Auto,
    /// Always the Basic header.
    Header,
    /// Always form parameters.
    Params,
}

/// A single API key and where to put it.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    /// Header, query parameter, or cookie name.
    pub name: String,
    #[serde(rename = "in", default)]
    pub location: ApiKeyLocation,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
    Cookie,
}

impl SecurityConfig {
    /// Checks the scheme is complete enough to use.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(ClientError::InvalidConfig(msg.to_string()));
        match self {
            SecurityConfig::None | SecurityConfig::Bearer { .. } => Ok(()),
            SecurityConfig::Basic { username, .. } => {
                if username.is_empty() {
                    return fail("basic auth requires a username");
                }
                Ok(())
            }
            SecurityConfig::ApiKey { keys } => {
                if keys.is_empty() {
                    return fail("api_key security requires at least one key");
                }
                if keys.iter().any(|k| k.name.is_empty()) {
                    return fail("api_key entries require a name");
                }
                Ok(())
            }
            SecurityConfig::Oauth2ClientCredentials {
                token_url,
                client_id,
                ..
            } => {
                validate_token_url(token_url)?;
                if client_id.is_empty() {
                    return fail("oauth2 client_credentials requires a client_id");
                }
                Ok(())
            }
            SecurityConfig::Oauth2Password {
                token_url,
                username,
                client_id,
                client_secret,
                ..
            } => {
                validate_token_url(token_url)?;
                if username.is_empty() {
                    return fail("oauth2 password grant requires a username");
                }
                if client_id.is_none() && client_secret.is_some() {
                    return fail("oauth2 password grant has a client_secret but no client_id");
                }
                Ok(())
            }
        }
    }

    /// A copy safe to serialize into diagnostics.
    #[must_use]
    pub fn redacted(&self) -> Self {
        const MASK: &str = "***REDACTED***";
        let mut copy = self.clone();
        match &mut copy {
            SecurityConfig::None => {}
            SecurityConfig::Basic { password, .. } => *password = MASK.to_string(),
            SecurityConfig::Bearer { token } => *token = MASK.to_string(),
            SecurityConfig::ApiKey { keys } => {
                for key in keys {
                    key.value = MASK.to_string();
                }
            }
            SecurityConfig::Oauth2ClientCredentials { client_secret, .. } => {
                *client_secret = MASK.to_string();
            }
            SecurityConfig::Oauth2Password {
                password,
                client_secret,
                ..
            } => {
                *password = MASK.to_string();
                if client_secret.is_some() {
                    *client_secret = Some(MASK.to_string());
                }
            }
        }
        copy
    }
}

fn validate_token_url(token_url: &str) -> Result<()> {
    url::Url::parse(token_url)
        .map_err(|e| ClientError::InvalidConfig(format!("invalid token_url {token_url:?}: {e}")))?;
    Ok(())
}

// Credentials never land in logs through Debug.
impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityConfig::None => f.write_str("None"),
            SecurityConfig::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            SecurityConfig::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
            SecurityConfig::ApiKey { keys } => {
                f.debug_struct("ApiKey").field("keys", keys).finish()
            }
            SecurityConfig::Oauth2ClientCredentials {
                token_url,
                client_id,
                scopes,
                auth_style,
                ..
            } => f
                .debug_struct("Oauth2ClientCredentials")
                .field("token_url", token_url)
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("scopes", scopes)
                .field("auth_style", auth_style)
                .finish(),
            SecurityConfig::Oauth2Password {
                token_url,
                username,
                client_id,
                scopes,
                auth_style,
                ..
            } => f
                .debug_struct("Oauth2Password")
                .field("token_url", token_url)
                .field("username", username)
                .field("password", &"[REDACTED]")
                .field("client_id", client_id)
                .field("scopes", scopes)
                .field("auth_style", auth_style)
                .finish(),
        }
    }
}

impl fmt::Debug for ApiKeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyEntry")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
