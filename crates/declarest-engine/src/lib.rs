//! # declarest engine
//!
//! The reconciliation layer: takes declarative resource definitions and
//! drives them against a remote REST API through the declarest client.
//! Covers the full lifecycle (create, read, update, delete), one-shot
//! operations, long-running-operation polling, precheck gates, and the
//! named-mutex registry that serializes operations on shared remote
//! state.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use declarest_client::{Client, ClientConfig};
//! use declarest_engine::{CreateRequest, Reconciler};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(ClientConfig::new("https://api.example.com"))?;
//! let reconciler = Reconciler::new(Arc::new(client));
//!
//! let request: CreateRequest = serde_json::from_value(json!({
//!     "path": "/things",
//!     "body": {"name": "thing-one"},
//! }))?;
//! let state = reconciler.create(&CancellationToken::new(), &request).await?;
//! println!("created {}", state.id);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod locator;
pub mod mutex;
pub mod pollable;
pub mod precheck;
pub mod reconciler;
pub mod state;

// Re-exports
pub use error::{EngineError, ErrorKind, Result};
pub use locator::ValueLocator;
pub use mutex::{MutexLease, MutexRegistry};
pub use pollable::{PollSpec, Pollable, StatusSentinels};
pub use precheck::{run_prechecks, PrecheckStep};
pub use reconciler::{
    CreateRequest, DeleteRequest, OperationRequest, ReadRequest, Reconciler, UpdateRequest,
};
pub use state::ResourceState;
