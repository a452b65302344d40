//! service-core: shared infrastructure for the document platform services.

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;
