//! # declarest client
//!
//! The HTTP layer of declarest.
//!
//! A [`Client`] is built once from a [`ClientConfig`] and shared; it owns
//! the connection pool, the cookie jar, the retry loop, and the credential
//! handling for every security scheme the engine supports (Basic, Bearer,
//! API keys, OAuth2 client-credentials and password grants).
//!
//! Responses come back as fully captured [`Response`] values, status
//! included: this layer never turns a 404 or a 500 into an error, because
//! what a status means depends on the operation being reconciled.
//!
//! ## Example
//!
//! ```no_run
//! use declarest_client::{Client, ClientConfig, RequestSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> declarest_client::Result<()> {
//! let client = Client::new(ClientConfig::new("https://api.example.com/v1"))?;
//! let cancel = CancellationToken::new();
//! let response = client.read(&cancel, "/things/42", &RequestSpec::new()).await?;
//! println!("{} {}", response.status(), response.text());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod security;

// Re-exports
pub use auth::Authenticator;
pub use client::Client;
pub use config::{ClientConfig, TlsConfig};
pub use error::{ClientError, Result};
pub use request::{HttpMethod, RequestSpec};
pub use response::Response;
pub use retry::{parse_retry_after, RetryPolicy};
pub use security::{ApiKeyEntry, ApiKeyLocation, AuthStyle, SecurityConfig};
