//! Criteria-driven configuration tree resolution.
//!
//! One authored document yields different effective configuration per
//! request or process: a declarative tree of forks, filters, ranges, and
//! parameters is resolved against a runtime criteria object (environment,
//! platform, user bucket) into a concrete value, with environment-specific
//! overrides, percentage bucketing, externally bound parameters with type
//! coercion, attached metadata, and deterministic array-merge semantics.
//!
//! # Example
//!
//! ```
//! use canopy::Store;
//! use serde_json::json;
//!
//! let document = json!({
//!     "greeting": {
//!         "$filter": "env",
//!         "production": "hello",
//!         "$default": "howdy"
//!     }
//! });
//!
//! let store = Store::with_document(&document).unwrap();
//! assert_eq!(
//!     store.get_with("/greeting", &json!({"env": "production"})),
//!     Some(json!("hello"))
//! );
//! assert_eq!(store.get("/greeting"), Some(json!("howdy")));
//! ```

pub mod coerce;
pub mod criteria;
pub mod error;
pub mod node;
pub mod resolve;
pub mod store;

pub use error::{Error, Result};
pub use resolve::AppliedFilter;
pub use store::Store;
