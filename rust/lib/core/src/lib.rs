pub mod config;
pub mod error;
pub mod types;

pub use config::{ServiceConfig, StockLimits};
pub use error::ServiceError;
pub use types::{looks_like_id, new_id, now_rfc3339};
