//! # API Shared
//!
//! Shared utilities and definitions for the intake APIs.
//!
//! Contains:
//! - Request/response types with OpenAPI schemas (`dto` module)
//! - Shared services like `HealthService`
//!
//! Used by `api-rest` and `intake-cli` for common functionality.

pub mod dto;
pub mod health;

pub use dto::*;
pub use health::HealthService;
