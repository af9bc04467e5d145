//! Dispatch policies: what a settled change turns into.
//!
//! A watch carries exactly one [`DispatchPolicy`]. Planning is pure: it maps a
//! [`ChangeEvent`] to a short list of [`DispatchAction`]s without touching the
//! filesystem. Each action is self-contained and is executed on the blocking
//! pool by the watch, against the filesystem or a [`Renderer`].
//!
//! # Units of Work
//!
//! | Policy | Unit | Created / Modified | Deleted |
//! |--------|------|--------------------|---------|
//! | Render | containing directory | (delete artifacts if force) + render per kind | same as modified |
//! | Mirror | single file | copy to target tree | delete mirror if force |
//!
//! Renames follow [`RenameHandling`]: ignored by default, or treated as a
//! removal of the old path plus a creation of the new one.
//!
//! # Examples
//!
//! ```
//! use fw_watcher::{ChangeEvent, DispatchAction, DispatchPolicy};
//! use fw_core::WatchConfig;
//! use camino::Utf8PathBuf;
//!
//! let config = WatchConfig::mirror("/work/src", "/work/backup");
//! let policy = DispatchPolicy::from_config(&config);
//!
//! let actions = policy.plan(&ChangeEvent::created(Utf8PathBuf::from("/work/src/app/Order.cs")));
//! assert_eq!(actions.len(), 1);
//! assert!(matches!(
//!     &actions[0],
//!     DispatchAction::MirrorFile { target, .. } if target.as_str() == "/work/backup/app/Order.cs"
//! ));
//! ```

use std::fmt;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use fw_core::{DiagramKind, DiagramKinds, DispatchMode, RenameHandling, RenderConfig, WatchConfig};
use smallvec::SmallVec;

use crate::error::{DispatchError, RenderError};
use crate::events::{ChangeEvent, ChangeKind};

/// Planned actions for one event. Never more than one per diagram kind plus
/// one deletion.
pub type ActionPlan = SmallVec<[DispatchAction; 4]>;

/// Everything a renderer needs to regenerate one kind of artifact for one
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Directory whose source files are rendered.
    pub source_dir: Utf8PathBuf,
    /// The watch's target directory.
    pub target_dir: Utf8PathBuf,
    /// Directory receiving artifacts (target plus artifact folder).
    pub artifact_dir: Utf8PathBuf,
    /// Diagram kind to produce.
    pub kind: DiagramKind,
    /// Produce a complete diagram spanning the whole tree.
    pub whole_tree: bool,
    /// Overwrite existing artifacts.
    pub force: bool,
}

/// External artifact generator.
///
/// Implementations may perform arbitrary blocking I/O; they are always called
/// from the blocking pool. Any closure with the right signature is a
/// renderer.
pub trait Renderer: Send + Sync + 'static {
    /// Renders one kind of artifact and returns the paths it wrote.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] describing why rendering failed. The error
    /// is logged and counted by the watch; it never stops the watch.
    fn render(&self, request: &RenderRequest) -> Result<Vec<Utf8PathBuf>, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&RenderRequest) -> Result<Vec<Utf8PathBuf>, RenderError> + Send + Sync + 'static,
{
    fn render(&self, request: &RenderRequest) -> Result<Vec<Utf8PathBuf>, RenderError> {
        self(request)
    }
}

/// A renderer that writes nothing. Used by mirror watches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&self, _request: &RenderRequest) -> Result<Vec<Utf8PathBuf>, RenderError> {
        Ok(Vec::new())
    }
}

/// One unit of downstream work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAction {
    /// Delete every file with `extension` directly inside `dir`.
    DeleteArtifacts {
        /// Artifact directory.
        dir: Utf8PathBuf,
        /// Artifact extension, without the dot.
        extension: String,
    },
    /// Ask the renderer to regenerate one kind of artifact.
    RenderArtifacts(RenderRequest),
    /// Copy `source` to `target`.
    MirrorFile {
        /// File in the watched tree.
        source: Utf8PathBuf,
        /// Destination in the target tree.
        target: Utf8PathBuf,
        /// Replace an existing target.
        overwrite: bool,
    },
    /// Remove a mirrored copy.
    DeleteMirror {
        /// Destination in the target tree.
        target: Utf8PathBuf,
    },
}

impl DispatchAction {
    /// Returns a short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::DeleteArtifacts { .. } => "delete-artifacts",
            Self::RenderArtifacts(_) => "render-artifacts",
            Self::MirrorFile { .. } => "mirror-file",
            Self::DeleteMirror { .. } => "delete-mirror",
        }
    }

    /// Executes the action.
    ///
    /// Blocking. Failures are reported in the outcome, never returned or
    /// raised.
    #[must_use]
    pub fn execute(self, renderer: &dyn Renderer) -> DispatchOutcome {
        let result = match &self {
            Self::DeleteArtifacts { dir, extension } => delete_artifacts(dir, extension),
            Self::RenderArtifacts(request) => renderer.render(request).map_err(DispatchError::from),
            Self::MirrorFile {
                source,
                target,
                overwrite,
            } => mirror_file(source, target, *overwrite),
            Self::DeleteMirror { target } => delete_mirror(target),
        };

        match result {
            Ok(artifacts) => DispatchOutcome {
                action: self,
                artifacts,
                error: None,
            },
            Err(error) => DispatchOutcome {
                action: self,
                artifacts: Vec::new(),
                error: Some(error),
            },
        }
    }
}

impl fmt::Display for DispatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteArtifacts { dir, extension } => write!(f, "delete *.{extension} in {dir}"),
            Self::RenderArtifacts(request) => {
                write!(f, "render {} for {}", request.kind, request.source_dir)
            }
            Self::MirrorFile { source, target, .. } => write!(f, "mirror {source} -> {target}"),
            Self::DeleteMirror { target } => write!(f, "delete mirror {target}"),
        }
    }
}

/// Result of executing one [`DispatchAction`]. Logged, then discarded.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// The executed action.
    pub action: DispatchAction,
    /// Paths written or removed.
    pub artifacts: Vec<Utf8PathBuf>,
    /// The failure, if any.
    pub error: Option<DispatchError>,
}

impl DispatchOutcome {
    /// Returns `true` if the action succeeded.
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Regenerates artifacts for the directory containing a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPolicy {
    target_dir: Utf8PathBuf,
    artifact_dir: Utf8PathBuf,
    extension: String,
    kinds: DiagramKinds,
    whole_tree: bool,
    force: bool,
    rename: RenameHandling,
}

impl RenderPolicy {
    /// Builds a render policy writing below `target_dir`.
    #[must_use]
    pub fn new(config: &RenderConfig, target_dir: &Utf8Path, force: bool) -> Self {
        let artifact_dir = if config.artifact_folder.is_empty() {
            target_dir.to_owned()
        } else {
            target_dir.join(&config.artifact_folder)
        };
        Self {
            target_dir: target_dir.to_owned(),
            artifact_dir,
            extension: config.artifact_extension.trim_start_matches('.').to_owned(),
            kinds: config.kinds,
            whole_tree: config.whole_tree,
            force,
            rename: config.rename,
        }
    }

    fn plan(&self, event: &ChangeEvent) -> ActionPlan {
        let mut plan = ActionPlan::new();
        if matches!(event.kind, ChangeKind::Renamed { .. })
            && self.rename == RenameHandling::Ignore
        {
            return plan;
        }
        let Some(source_dir) = event.containing_dir() else {
            return plan;
        };

        if self.force {
            plan.push(DispatchAction::DeleteArtifacts {
                dir: self.artifact_dir.clone(),
                extension: self.extension.clone(),
            });
        }
        for kind in self.kinds.kinds() {
            plan.push(DispatchAction::RenderArtifacts(RenderRequest {
                source_dir: source_dir.to_owned(),
                target_dir: self.target_dir.clone(),
                artifact_dir: self.artifact_dir.clone(),
                kind,
                whole_tree: self.whole_tree,
                force: self.force,
            }));
        }
        plan
    }
}

/// Mirrors single files into a parallel target tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPolicy {
    root: Utf8PathBuf,
    target_dir: Utf8PathBuf,
    force: bool,
    rename: RenameHandling,
}

impl MirrorPolicy {
    /// Builds a mirror policy copying from `root` into `target_dir`.
    #[must_use]
    pub fn new(
        root: &Utf8Path,
        target_dir: &Utf8Path,
        force: bool,
        rename: RenameHandling,
    ) -> Self {
        Self {
            root: root.to_owned(),
            target_dir: target_dir.to_owned(),
            force,
            rename,
        }
    }

    /// Maps a path in the watched tree to its mirror, keeping the relative
    /// path. Returns `None` for paths outside the root.
    #[must_use]
    pub fn mirror_path(&self, path: &Utf8Path) -> Option<Utf8PathBuf> {
        let relative = path.strip_prefix(&self.root).ok()?;
        if relative.as_str().is_empty() {
            return None;
        }
        Some(self.target_dir.join(relative))
    }

    fn plan(&self, event: &ChangeEvent) -> ActionPlan {
        let mut plan = ActionPlan::new();
        match &event.kind {
            ChangeKind::Created | ChangeKind::Modified => self.push_copy(&mut plan, &event.path),
            ChangeKind::Deleted => self.push_delete(&mut plan, &event.path),
            ChangeKind::Renamed { from } => {
                if self.rename == RenameHandling::Replace {
                    self.push_delete(&mut plan, from);
                    self.push_copy(&mut plan, &event.path);
                }
            }
        }
        plan
    }

    fn push_copy(&self, plan: &mut ActionPlan, source: &Utf8Path) {
        match self.mirror_path(source) {
            Some(target) => plan.push(DispatchAction::MirrorFile {
                source: source.to_owned(),
                target,
                overwrite: self.force,
            }),
            None => tracing::trace!(path = %source, "Path outside watch root, not mirrored"),
        }
    }

    fn push_delete(&self, plan: &mut ActionPlan, source: &Utf8Path) {
        if !self.force {
            return;
        }
        if let Some(target) = self.mirror_path(source) {
            plan.push(DispatchAction::DeleteMirror { target });
        }
    }
}

/// The single policy a watch is parameterized with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// Regenerate artifacts per directory.
    Render(RenderPolicy),
    /// Copy single files.
    Mirror(MirrorPolicy),
}

impl DispatchPolicy {
    /// Builds the policy described by a watch configuration.
    ///
    /// Paths are taken as they appear in `config`; the watch passes its
    /// canonicalized configuration.
    #[must_use]
    pub fn from_config(config: &WatchConfig) -> Self {
        match &config.mode {
            DispatchMode::Render(render) => {
                Self::Render(RenderPolicy::new(render, config.target_dir(), config.force))
            }
            DispatchMode::Mirror(mirror) => Self::Mirror(MirrorPolicy::new(
                &config.root,
                config.target_dir(),
                config.force,
                mirror.rename,
            )),
        }
    }

    /// Maps an event to the actions it requires. Pure.
    #[must_use]
    pub fn plan(&self, event: &ChangeEvent) -> ActionPlan {
        match self {
            Self::Render(policy) => policy.plan(event),
            Self::Mirror(policy) => policy.plan(event),
        }
    }

    /// Returns the policy name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Render(_) => "render",
            Self::Mirror(_) => "mirror",
        }
    }
}

/// Removes every `*.extension` file directly inside `dir`.
///
/// Per-file failures are logged and skipped; only an unreadable directory
/// fails the action. A missing directory has nothing to delete.
fn delete_artifacts(dir: &Utf8Path, extension: &str) -> Result<Vec<Utf8PathBuf>, DispatchError> {
    delete_artifacts_with(dir, extension, remove_writable)
}

fn delete_artifacts_with(
    dir: &Utf8Path,
    extension: &str,
    remove: impl Fn(&Utf8Path) -> io::Result<()>,
) -> Result<Vec<Utf8PathBuf>, DispatchError> {
    let entries = match dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(DispatchError::io(dir, err)),
    };

    let mut deleted = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension() != Some(extension) || !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        match remove(path) {
            Ok(()) => deleted.push(path.to_owned()),
            Err(error) => tracing::warn!(path = %path, error = %error, "Failed to delete artifact"),
        }
    }
    Ok(deleted)
}

fn mirror_file(
    source: &Utf8Path,
    target: &Utf8Path,
    overwrite: bool,
) -> Result<Vec<Utf8PathBuf>, DispatchError> {
    if !source.is_file() {
        tracing::debug!(path = %source, "Source vanished before mirroring");
        return Ok(Vec::new());
    }
    let exists = target.exists();
    if exists && !overwrite {
        return Ok(Vec::new());
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| DispatchError::io(parent, e))?;
    }
    if exists {
        clear_readonly(target).map_err(|e| DispatchError::io(target, e))?;
    }
    fs::copy(source, target).map_err(|e| DispatchError::io(target, e))?;
    Ok(vec![target.to_owned()])
}

fn delete_mirror(target: &Utf8Path) -> Result<Vec<Utf8PathBuf>, DispatchError> {
    if !target.is_file() {
        return Ok(Vec::new());
    }
    remove_writable(target).map_err(|e| DispatchError::io(target, e))?;
    Ok(vec![target.to_owned()])
}

fn remove_writable(path: &Utf8Path) -> io::Result<()> {
    clear_readonly(path)?;
    fs::remove_file(path)
}

fn clear_readonly(path: &Utf8Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    if !permissions.readonly() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}
