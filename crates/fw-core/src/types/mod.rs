//! Domain types shared by the watcher engine and its callers.
//!
//! # Module Organization
//!
//! - [`kind`] - Renderer kinds and the selectable kind set
//! - [`id`] - Opaque watch handles
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use fw_core::{DiagramKind, DiagramKinds, WatchId};
//! ```

mod id;
mod kind;

pub use id::WatchId;
pub use kind::{DiagramKind, DiagramKinds};
