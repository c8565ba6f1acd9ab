//! Brivas Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Common domain identifiers (ServerId, TenantId)
//! - Error handling utilities
//! - Environment configuration helpers
//! - Graceful shutdown signal

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::{BrivasError, Result};
pub use service::shutdown_signal;
