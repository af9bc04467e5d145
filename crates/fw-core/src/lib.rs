//! Core types, errors, and configuration for the folder-watch engine.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`ConfigError`] for construction-time validation failures
//! - Configuration structures ([`WatchConfig`], [`DispatchMode`], [`SettleConfig`])
//! - Domain types ([`DiagramKind`], [`DiagramKinds`], [`WatchId`])
//!
//! # Crate Dependencies
//!
//! ```text
//! fw-cli ──► fw-watcher ──► fw-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    Config, DispatchMode, MirrorConfig, RenameHandling, RenderConfig, SettleConfig, SettleMode,
    WatchConfig,
};
pub use error::ConfigError;
pub use types::{DiagramKind, DiagramKinds, WatchId};
