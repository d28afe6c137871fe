//! Tempest Core - Shared service infrastructure
//!
//! This crate provides:
//! - The service trait the bridge binaries implement
//! - Lifecycle runtime with signal-driven graceful shutdown
//! - Error handling utilities
//! - Environment configuration helpers

pub mod config;
pub mod error;
pub mod service;

pub use config::{env_lookup, flag_var, optional_var, parse_var, require_var, string_var};
pub use error::{Result, TempestError};
pub use service::{ServiceRuntime, TempestService};
