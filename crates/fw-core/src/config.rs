//! Configuration structures for the folder-watch engine.
//!
//! This module provides configuration types for every watch:
//!
//! - [`WatchConfig`] - One watched root: filter, target, force flag, policy
//! - [`DispatchMode`] - What a watch does once a change has settled
//! - [`SettleConfig`] - How long and how often to wait for writers to finish
//! - [`Config`] - Root configuration listing any number of watches
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a configuration file only has to name the fields it
//! changes. Validation is explicit ([`WatchConfig::validate`]) and happens when
//! a watch is constructed; an invalid configuration never reaches a running
//! watch.

use std::str::FromStr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::DiagramKinds;

/// How renames are turned into dispatch actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameHandling {
    /// Log the rename and do nothing else.
    ///
    /// The create/modify/delete notifications that accompany a rename on
    /// most platforms drive the actual dispatch.
    #[default]
    Ignore,
    /// Treat a rename as removal of the old path followed by creation of
    /// the new one.
    Replace,
}

/// Settings for the render policy.
///
/// # Examples
///
/// ```
/// use fw_core::{DiagramKinds, RenderConfig};
///
/// let config = RenderConfig::default();
/// assert_eq!(config.kinds, DiagramKinds::all());
/// assert_eq!(config.artifact_folder, "diagrams");
/// assert_eq!(config.artifact_extension, "puml");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Renderer kinds regenerated for every settled change.
    pub kinds: DiagramKinds,

    /// Subfolder of the target directory that receives artifacts.
    ///
    /// Empty means artifacts are written directly into the target directory.
    pub artifact_folder: String,

    /// Extension (without the dot) identifying generated artifacts.
    ///
    /// Forced regeneration deletes every file with this extension in the
    /// artifact directory before rendering.
    pub artifact_extension: String,

    /// Ask the renderer for a complete diagram spanning the whole tree.
    pub whole_tree: bool,

    /// How renames are handled.
    pub rename: RenameHandling,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            kinds: DiagramKinds::all(),
            artifact_folder: "diagrams".to_owned(),
            artifact_extension: "puml".to_owned(),
            whole_tree: false,
            rename: RenameHandling::Ignore,
        }
    }
}

/// Settings for the mirror policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// How renames are handled.
    pub rename: RenameHandling,
}

/// What a watch does with a settled change.
///
/// Serialized as an internally tagged object:
///
/// ```
/// use fw_core::DispatchMode;
///
/// let mode: DispatchMode = serde_json::from_str(r#"{"kind": "mirror"}"#).unwrap();
/// assert_eq!(mode.name(), "mirror");
///
/// let unknown = serde_json::from_str::<DispatchMode>(r#"{"kind": "copy"}"#);
/// assert!(unknown.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchMode {
    /// Regenerate artifacts for the containing directory.
    Render(RenderConfig),
    /// Copy the changed file into a parallel target tree.
    Mirror(MirrorConfig),
}

impl DispatchMode {
    /// Returns the mode name as used in configuration and on the command line.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Render(_) => "render",
            Self::Mirror(_) => "mirror",
        }
    }

    /// Returns the rename handling of either policy.
    #[inline]
    #[must_use]
    pub const fn rename(&self) -> RenameHandling {
        match self {
            Self::Render(render) => render.rename,
            Self::Mirror(mirror) => mirror.rename,
        }
    }
}

impl Default for DispatchMode {
    fn default() -> Self {
        Self::Render(RenderConfig::default())
    }
}

impl FromStr for DispatchMode {
    type Err = ConfigError;

    /// Parses a bare mode name into the mode with default settings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "render" => Ok(Self::Render(RenderConfig::default())),
            "mirror" => Ok(Self::Mirror(MirrorConfig::default())),
            other => Err(ConfigError::invalid_option(
                "mode",
                format!("unknown dispatch mode '{other}' (expected 'render' or 'mirror')"),
            )),
        }
    }
}

/// Whether the settle-wait polls for writers at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleMode {
    /// Dispatch immediately without probing for writers.
    Immediate,
    /// Probe the containing directory until no matching file is locked.
    #[default]
    Poll,
}

/// Configuration of the settle-wait that precedes every dispatch.
///
/// # Examples
///
/// ```
/// use fw_core::{SettleConfig, SettleMode};
/// use std::time::Duration;
///
/// let config = SettleConfig::default();
/// assert_eq!(config.mode, SettleMode::Poll);
/// assert_eq!(config.interval(), Duration::from_millis(500));
/// assert_eq!(config.timeout(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    /// Polling or immediate dispatch.
    pub mode: SettleMode,

    /// Delay between two probes, in milliseconds.
    pub interval_ms: u64,

    /// Give up waiting after this many milliseconds. `None` waits until the
    /// watch is stopped.
    pub timeout_ms: Option<u64>,
}

impl SettleConfig {
    /// A configuration that never waits.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            mode: SettleMode::Immediate,
            interval_ms: 500,
            timeout_ms: None,
        }
    }

    /// A polling configuration with the given interval and timeout.
    #[must_use]
    pub const fn poll(interval_ms: u64, timeout_ms: Option<u64>) -> Self {
        Self {
            mode: SettleMode::Poll,
            interval_ms,
            timeout_ms,
        }
    }

    /// Returns the polling interval.
    #[inline]
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns the settle timeout, if any.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self::poll(500, None)
    }
}

/// Configuration of a single watch.
///
/// # Examples
///
/// ```
/// use fw_core::WatchConfig;
///
/// let config = WatchConfig::mirror("/work/src", "/work/backup").with_force(true);
/// assert_eq!(config.filter, "*.cs");
/// assert!(config.recursive);
/// assert_eq!(config.target_dir().as_str(), "/work/backup");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Root directory to watch.
    pub root: Utf8PathBuf,

    /// Glob matched against the file name of every changed path.
    pub filter: String,

    /// Whether subdirectories are watched.
    pub recursive: bool,

    /// Target directory. `None` uses the root itself (render mode only).
    pub target: Option<Utf8PathBuf>,

    /// Overwrite and delete existing output instead of preserving it.
    pub force: bool,

    /// Dispatch policy.
    pub mode: DispatchMode,

    /// Settle-wait policy.
    pub settle: SettleConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::new(),
            filter: "*.cs".to_owned(),
            recursive: true,
            target: None,
            force: false,
            mode: DispatchMode::default(),
            settle: SettleConfig::default(),
        }
    }
}

impl WatchConfig {
    /// Creates a render watch for `root` with default settings.
    #[must_use]
    pub fn render(root: impl Into<Utf8PathBuf>, render: RenderConfig) -> Self {
        Self {
            root: root.into(),
            mode: DispatchMode::Render(render),
            ..Self::default()
        }
    }

    /// Creates a mirror watch copying `root` into `target`.
    #[must_use]
    pub fn mirror(root: impl Into<Utf8PathBuf>, target: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            target: Some(target.into()),
            mode: DispatchMode::Mirror(MirrorConfig::default()),
            ..Self::default()
        }
    }

    /// Sets the glob filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the target directory.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<Utf8PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the force flag.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets the settle policy.
    #[must_use]
    pub fn with_settle(mut self, settle: SettleConfig) -> Self {
        self.settle = settle;
        self
    }

    /// Sets recursive watching.
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Returns the effective target directory.
    #[must_use]
    pub fn target_dir(&self) -> &Utf8Path {
        self.target.as_deref().unwrap_or(self.root.as_path())
    }

    /// Checks everything that can be checked without touching the watched
    /// tree.
    ///
    /// Filesystem checks (does the root exist?) and glob compilation happen
    /// when the watch is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_str().is_empty() {
            return Err(ConfigError::InvalidPath {
                path: self.root.clone(),
                reason: "watch root must not be empty".to_owned(),
            });
        }

        if self.filter.trim().is_empty() {
            return Err(ConfigError::invalid_pattern(
                self.filter.clone(),
                "filter must not be empty",
            ));
        }

        if self.settle.mode == SettleMode::Poll && self.settle.interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "settle.interval_ms",
                "must be positive",
            ));
        }

        match &self.mode {
            DispatchMode::Render(render) => {
                if render.kinds.is_empty() {
                    return Err(ConfigError::invalid_option(
                        "kinds",
                        "at least one diagram kind must be selected",
                    ));
                }
                let extension = render.artifact_extension.trim_start_matches('.');
                if extension.is_empty() {
                    return Err(ConfigError::invalid_option(
                        "artifact_extension",
                        "must not be empty",
                    ));
                }
            }
            DispatchMode::Mirror(_) => {
                let Some(target) = &self.target else {
                    return Err(ConfigError::invalid_option(
                        "target",
                        "mirror watches need a target directory",
                    ));
                };
                // Copies landing inside the root would be observed and mirrored again.
                if target.starts_with(&self.root) {
                    return Err(ConfigError::InvalidPath {
                        path: target.clone(),
                        reason: format!("mirror target lies inside the watched root {}", self.root),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Root configuration listing every watch to start.
///
/// # Examples
///
/// ```
/// use fw_core::Config;
///
/// let config = Config::from_json_str(r#"{
///     "watches": [
///         { "root": "/src", "target": "/out", "mode": { "kind": "mirror" } }
///     ]
/// }"#).unwrap();
/// assert_eq!(config.watches.len(), 1);
/// assert_eq!(config.watches[0].filter, "*.cs");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watches to create, in order.
    pub watches: Vec<WatchConfig>,
}

impl Config {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Validates every watch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watches.iter().try_for_each(WatchConfig::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.filter, "*.cs");
        assert!(config.recursive);
        assert!(!config.force);
        assert_eq!(config.mode.name(), "render");
        assert_eq!(config.settle, SettleConfig::default());
    }

    #[test]
    fn test_target_defaults_to_root() {
        let config = WatchConfig::render("/src", RenderConfig::default());
        assert_eq!(config.target_dir().as_str(), "/src");

        let config = config.with_target("/out");
        assert_eq!(config.target_dir().as_str(), "/out");
    }

    #[test]
    fn test_dispatch_mode_from_str() {
        assert_eq!("render".parse::<DispatchMode>().unwrap().name(), "render");
        assert_eq!("Mirror".parse::<DispatchMode>().unwrap().name(), "mirror");

        let err = "copy".parse::<DispatchMode>().unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"invalid configuration option 'mode': unknown dispatch mode 'copy' (expected 'render' or 'mirror')"
        );
    }

    #[test]
    fn test_validate_rejects_empty_root() {
        let config = WatchConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = WatchConfig::render("/src", RenderConfig::default())
            .with_settle(SettleConfig::poll(0, None));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { option, .. }) if option == "settle.interval_ms"
        ));

        // Immediate mode never polls, so the interval is irrelevant.
        let config = WatchConfig::render("/src", RenderConfig::default()).with_settle(SettleConfig {
            interval_ms: 0,
            ..SettleConfig::immediate()
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_kinds() {
        let render = RenderConfig {
            kinds: DiagramKinds::empty(),
            ..RenderConfig::default()
        };
        let config = WatchConfig::render("/src", render);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_mirror_requires_target_outside_root() {
        let mut config = WatchConfig::mirror("/src", "/out");
        assert!(config.validate().is_ok());

        config.target = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { option, .. }) if option == "target"
        ));

        let nested = WatchConfig::mirror("/src", "/src/backup");
        assert!(matches!(
            nested.validate(),
            Err(ConfigError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"watches": [{"root": "/src", "force": true}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let watch = &config.watches[0];
        assert!(watch.force);
        assert_eq!(watch.filter, "*.cs");
        assert_eq!(watch.mode, DispatchMode::default());
        assert_eq!(watch.settle.interval_ms, 500);
    }

    #[test]
    fn test_config_render_options_round_trip() {
        let json = r#"{
            "watches": [{
                "root": "/src",
                "mode": { "kind": "render", "kinds": "class", "artifact_folder": "" }
            }]
        }"#;
        let config = Config::from_json_str(json).unwrap();
        let DispatchMode::Render(render) = &config.watches[0].mode else {
            panic!("expected render mode");
        };
        assert_eq!(render.kinds, DiagramKinds::CLASS);
        assert!(render.artifact_folder.is_empty());
        assert_eq!(render.artifact_extension, "puml");
    }

    #[test]
    fn test_config_rejects_unknown_mode() {
        let json = r#"{"watches": [{"root": "/src", "mode": {"kind": "copy"}}]}"#;
        assert!(matches!(
            Config::from_json_str(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("watch.json")).unwrap();
        std::fs::write(&path, r#"{"watches": [{"root": "/src"}]}"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.watches.len(), 1);

        let missing = Config::from_json_file(&path.with_file_name("absent.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_settle_serialization() {
        let config = SettleConfig::poll(100, Some(2_000));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"mode":"poll","interval_ms":100,"timeout_ms":2000}"#);
        assert_eq!(config.timeout(), Some(Duration::from_secs(2)));
    }
}
