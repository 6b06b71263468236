//! # declarest core
//!
//! Pure algorithms shared by the declarest client and engine.
//!
//! This crate has no I/O and no async: it holds the attribute-path grammar
//! used to address nodes inside JSON bodies, the gjson-flavoured query
//! dialect, the `$functions(reference)` template expander, the JSON set
//! algebra behind merge-patch planning, and the response-body normalizer
//! that keeps persisted state drift-free.
//!
//! ## Example
//!
//! ```
//! use declarest_core::Expander;
//! use serde_json::json;
//!
//! let body = json!({"name": "a/b"});
//! let path = Expander::new()
//!     .with_body(&body)
//!     .expand_path("/things/$(body.name)")?;
//! assert_eq!(path, "/things/a%2Fb");
//! # Ok::<(), declarest_core::CoreError>(())
//! ```

pub mod attrpath;
pub mod body;
pub mod error;
pub mod expression;
pub mod jsonset;
pub mod query;

// Re-exports
pub use attrpath::{AttrPath, AttrStep};
pub use error::{CoreError, Result};
pub use expression::Expander;
