//! Change notifications.
//!
//! This module provides [`ChangeEvent`], the transient record a watch receives
//! for every file mutation, and the conversion from raw `notify` events.
//!
//! # Event Flow
//!
//! ```text
//! notify::Event (own thread)
//!        │
//!        ▼
//!  from_notify() ── Access events dropped, non-UTF-8 paths skipped
//!        │
//!        ▼
//!   ChangeEvent ──► Watch::deliver()
//! ```

use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{EventKind, ModifyKind, RenameMode};
use smallvec::SmallVec;

/// What happened to a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The path was created (or moved into the watched tree).
    Created,
    /// The path's contents or metadata changed.
    Modified,
    /// The path was removed (or moved out of the watched tree).
    Deleted,
    /// The path was renamed; `from` is the old path.
    Renamed {
        /// The path before the rename.
        from: Utf8PathBuf,
    },
}

impl ChangeKind {
    /// Returns a short label for logs.
    #[inline]
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed { .. } => "renamed",
        }
    }
}

/// A single file change.
///
/// Produced by the notification layer, consumed once by a watch, never
/// stored.
///
/// # Examples
///
/// ```
/// use fw_watcher::{ChangeEvent, ChangeKind};
/// use camino::Utf8PathBuf;
///
/// let event = ChangeEvent::modified(Utf8PathBuf::from("/src/app/Order.cs"));
/// assert_eq!(event.kind, ChangeKind::Modified);
/// assert_eq!(event.containing_dir().map(|d| d.as_str()), Some("/src/app"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,

    /// The affected path (the new path for renames).
    pub path: Utf8PathBuf,

    /// When the event was received.
    pub timestamp: Instant,
}

impl ChangeEvent {
    /// Creates a new event stamped with the current instant.
    #[inline]
    #[must_use]
    pub fn new(kind: ChangeKind, path: Utf8PathBuf) -> Self {
        Self {
            kind,
            path,
            timestamp: Instant::now(),
        }
    }

    /// Creates a [`ChangeKind::Created`] event.
    #[inline]
    #[must_use]
    pub fn created(path: Utf8PathBuf) -> Self {
        Self::new(ChangeKind::Created, path)
    }

    /// Creates a [`ChangeKind::Modified`] event.
    #[inline]
    #[must_use]
    pub fn modified(path: Utf8PathBuf) -> Self {
        Self::new(ChangeKind::Modified, path)
    }

    /// Creates a [`ChangeKind::Deleted`] event.
    #[inline]
    #[must_use]
    pub fn deleted(path: Utf8PathBuf) -> Self {
        Self::new(ChangeKind::Deleted, path)
    }

    /// Creates a [`ChangeKind::Renamed`] event.
    #[inline]
    #[must_use]
    pub fn renamed(from: Utf8PathBuf, to: Utf8PathBuf) -> Self {
        Self::new(ChangeKind::Renamed { from }, to)
    }

    /// Returns the directory containing the affected path.
    #[inline]
    #[must_use]
    pub fn containing_dir(&self) -> Option<&Utf8Path> {
        self.path.parent()
    }

    /// Returns the file name of the affected path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }
}

/// Converts a raw `notify` event into zero or more change events.
///
/// Access events are dropped: the settle probe opens files for writing, and
/// the resulting close notifications must not start new cycles. Paths that
/// are not valid UTF-8 are logged and skipped.
#[must_use]
pub fn from_notify(event: notify::Event) -> SmallVec<[ChangeEvent; 2]> {
    let mut out = SmallVec::new();

    let kind = match event.kind {
        EventKind::Access(_) => return out,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let mut paths = event.paths.into_iter();
            let (Some(from), Some(to)) = (
                paths.next().and_then(to_utf8),
                paths.next().and_then(to_utf8),
            ) else {
                return out;
            };
            out.push(ChangeEvent::renamed(from, to));
            return out;
        }
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            ChangeKind::Created
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            ChangeKind::Deleted
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => ChangeKind::Modified,
    };

    out.extend(
        event
            .paths
            .into_iter()
            .filter_map(to_utf8)
            .map(|path| ChangeEvent::new(kind.clone(), path)),
    );
    out
}

fn to_utf8(path: std::path::PathBuf) -> Option<Utf8PathBuf> {
    match Utf8PathBuf::try_from(path) {
        Ok(path) => Some(path),
        Err(e) => {
            let invalid_path = e.into_path_buf();
            tracing::warn!(
                path = %invalid_path.display(),
                "Skipping non-UTF-8 path in file event"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, AccessMode, CreateKind, DataChange, RemoveKind};
    use std::path::PathBuf;

    fn raw(kind: EventKind, paths: &[&str]) -> notify::Event {
        paths
            .iter()
            .fold(notify::Event::new(kind), |event, p| event.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_create_and_remove_map_directly() {
        let created = from_notify(raw(EventKind::Create(CreateKind::File), &["/src/a.cs"]));
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, ChangeKind::Created);
        assert_eq!(created[0].path.as_str(), "/src/a.cs");

        let removed = from_notify(raw(EventKind::Remove(RemoveKind::File), &["/src/a.cs"]));
        assert_eq!(removed[0].kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_data_change_is_modified() {
        let events = from_notify(raw(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/src/a.cs"],
        ));
        assert_eq!(events[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_access_events_are_dropped() {
        let events = from_notify(raw(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/src/a.cs"],
        ));
        assert!(events.is_empty());
    }

    #[test]
    fn test_rename_both_carries_old_path() {
        let events = from_notify(raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/src/old.cs", "/src/new.cs"],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            ChangeKind::Renamed {
                from: Utf8PathBuf::from("/src/old.cs")
            }
        );
        assert_eq!(events[0].path.as_str(), "/src/new.cs");
    }

    #[test]
    fn test_rename_halves_become_delete_and_create() {
        let from = from_notify(raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/src/old.cs"],
        ));
        assert_eq!(from[0].kind, ChangeKind::Deleted);

        let to = from_notify(raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/src/new.cs"],
        ));
        assert_eq!(to[0].kind, ChangeKind::Created);
    }

    #[test]
    fn test_event_helpers() {
        let event = ChangeEvent::created(Utf8PathBuf::from("/src/models/Order.cs"));
        assert_eq!(event.file_name(), Some("Order.cs"));
        assert_eq!(event.kind.label(), "created");
        assert_eq!(
            event.containing_dir().map(Utf8Path::as_str),
            Some("/src/models")
        );
    }
}
