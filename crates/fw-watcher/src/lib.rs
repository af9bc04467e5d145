//! Debounced watch-and-dispatch engine.
//!
//! This crate observes directory trees for file changes, waits until the
//! changed files are no longer held by a writer, then performs exactly one
//! downstream action per logical change: regenerating artifacts through an
//! external [`Renderer`], or mirroring files into a parallel tree.
//!
//! # Overview
//!
//! - [`ChangeGate`] admits at most one dispatch cycle per watch; excess
//!   notifications are dropped, never queued
//! - [`QuiescencePoller`] and [`SettlePolicy`] wait for writers to finish
//! - [`DispatchPolicy`] maps a change to [`DispatchAction`]s
//! - [`Watch`] ties a root, a glob filter, a `notify` subscription and a
//!   policy together
//! - [`WatchRegistry`] holds any number of independent watches
//!
//! # Architecture
//!
//! ```text
//! OS notification ──► Watch::deliver ──► GlobFilter ──► DispatchPolicy::plan
//!                                                            │
//!                                   Busy (dropped) ◄── ChangeGate
//!                                                            │ Admitted
//!                                                            ▼
//!                           SettlePolicy::wait (QuiescencePoller, cancellable)
//!                                                            │
//!                                                            ▼
//!                       DispatchAction::execute (renderer / filesystem)
//!                                                            │
//!                                                            ▼
//!                                            GatePermit dropped ─► Idle
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! fw-cli ──► fw-watcher ──► fw-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fw_watcher::{RenderError, RenderRequest, WatchRegistry};
//! use fw_core::{RenderConfig, WatchConfig};
//! use camino::Utf8PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let renderer = |request: &RenderRequest| -> Result<Vec<Utf8PathBuf>, RenderError> {
//!         println!("render {} for {}", request.kind, request.source_dir);
//!         Ok(Vec::new())
//!     };
//!
//!     let mut registry = WatchRegistry::new();
//!     registry
//!         .create(WatchConfig::render("./src", RenderConfig::default()), Arc::new(renderer))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod events;
pub mod filter;
pub mod gate;
pub mod registry;
pub mod settle;
pub mod stats;
pub mod watcher;

pub use dispatch::{
    ActionPlan, DispatchAction, DispatchOutcome, DispatchPolicy, MirrorPolicy, NoopRenderer,
    RenderPolicy, RenderRequest, Renderer,
};
pub use error::{DispatchError, RenderError, WatchError};
pub use events::{ChangeEvent, ChangeKind, from_notify};
pub use filter::GlobFilter;
pub use gate::{ChangeGate, GatePermit};
pub use registry::{WatchRegistry, WatchSummary};
pub use settle::{QuiescencePoller, SettleOutcome, SettlePolicy};
pub use stats::{StatsSnapshot, WatchStats};
pub use watcher::{Admission, Watch};
