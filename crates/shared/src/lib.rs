//! Shared types and configuration for Tally.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - The ledger currency and its minor-unit precision
//! - Configuration management

pub mod config;
pub mod types;

pub use config::AppConfig;
