//! The caller-owned collection of running watches.
//!
//! A [`WatchRegistry`] keeps watches in creation order and hands out
//! [`WatchId`] handles. It holds no lock of its own: watches share nothing,
//! and the registry is mutated only by its owner.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fw_watcher::{NoopRenderer, WatchRegistry};
//! use fw_core::WatchConfig;
//!
//! # async fn example() -> Result<(), fw_watcher::WatchError> {
//! let mut registry = WatchRegistry::new();
//! let id = registry
//!     .create(WatchConfig::mirror("./src", "./backup"), Arc::new(NoopRenderer))
//!     .await?;
//!
//! for summary in registry.list() {
//!     println!("{summary}");
//! }
//!
//! registry.remove(id).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use fw_core::{DispatchMode, WatchConfig, WatchId};
use serde::Serialize;
use tracing::{debug, info};

use crate::dispatch::Renderer;
use crate::error::WatchError;
use crate::stats::StatsSnapshot;
use crate::watcher::Watch;

/// Status line for one watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchSummary {
    /// The watch handle.
    pub id: WatchId,
    /// Canonical root.
    pub root: Utf8PathBuf,
    /// Effective target directory.
    pub target: Utf8PathBuf,
    /// Glob filter.
    pub filter: String,
    /// Force-overwrite flag.
    pub force: bool,
    /// Dispatch mode, with the selected kinds for render watches.
    pub mode: String,
    /// Counters at the time of listing.
    pub stats: StatsSnapshot,
}

impl WatchSummary {
    fn of(watch: &Watch) -> Self {
        let config = watch.config();
        Self {
            id: watch.id(),
            root: config.root.clone(),
            target: config.target_dir().to_owned(),
            filter: config.filter.clone(),
            force: config.force,
            mode: describe_mode(config),
            stats: watch.stats(),
        }
    }
}

fn describe_mode(config: &WatchConfig) -> String {
    match &config.mode {
        DispatchMode::Render(render) => format!("render({})", render.kinds),
        DispatchMode::Mirror(_) => "mirror".to_owned(),
    }
}

impl fmt::Display for WatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}] -> {}", self.id, self.root, self.filter, self.target)?;
        write!(f, " {}", self.mode)?;
        if self.force {
            f.write_str(" force")?;
        }
        Ok(())
    }
}

/// Ordered collection of running watches.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watches: Vec<Watch>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a watch and adds it to the registry.
    ///
    /// # Errors
    ///
    /// Returns the construction error of [`Watch::start`]; nothing is added.
    pub async fn create(
        &mut self,
        config: WatchConfig,
        renderer: Arc<dyn Renderer>,
    ) -> Result<WatchId, WatchError> {
        let watch = Watch::start(config, renderer).await?;
        Ok(self.add(watch))
    }

    /// Adds an already running watch.
    pub fn add(&mut self, watch: Watch) -> WatchId {
        let id = watch.id();
        debug!(watch = %id, "Watch registered");
        self.watches.push(watch);
        id
    }

    /// Stops a watch and removes it.
    ///
    /// Once this returns, the watch will never dispatch again.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::UnknownWatch`] if no watch has this handle.
    pub async fn remove(&mut self, id: WatchId) -> Result<(), WatchError> {
        let index = self
            .watches
            .iter()
            .position(|watch| watch.id() == id)
            .ok_or(WatchError::UnknownWatch(id))?;

        self.watches[index].stop().await;
        self.watches.remove(index);
        debug!(watch = %id, "Watch removed");
        Ok(())
    }

    /// Returns a summary of every watch, in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<WatchSummary> {
        self.watches.iter().map(WatchSummary::of).collect()
    }

    /// Returns the watch with this handle.
    #[must_use]
    pub fn get(&self, id: WatchId) -> Option<&Watch> {
        self.watches.iter().find(|watch| watch.id() == id)
    }

    /// Iterates over the watches in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Watch> {
        self.watches.iter()
    }

    /// Returns the number of watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Returns `true` if no watch is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Stops and removes every watch.
    ///
    /// Returns the final summaries, taken after each watch's in-flight cycle
    /// has finished.
    pub async fn shutdown(&mut self) -> Vec<WatchSummary> {
        let mut summaries = Vec::with_capacity(self.watches.len());
        for watch in &mut self.watches {
            watch.stop().await;
            summaries.push(WatchSummary::of(watch));
        }
        self.watches.clear();
        if !summaries.is_empty() {
            info!(watches = summaries.len(), "All watches stopped");
        }
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{NoopRenderer, RenderRequest};
    use crate::error::RenderError;
    use crate::events::ChangeEvent;
    use crate::watcher::Admission;
    use camino::Utf8Path;
    use fw_core::{DiagramKinds, RenderConfig, SettleConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("Invalid path");
        (dir, path)
    }

    fn render_config(root: &Utf8Path) -> WatchConfig {
        let render = RenderConfig {
            kinds: DiagramKinds::ACTIVITY | DiagramKinds::SEQUENCE,
            ..RenderConfig::default()
        };
        WatchConfig::render(root, render).with_settle(SettleConfig::immediate())
    }

    #[tokio::test]
    async fn test_create_list_remove() {
        let (_guard, dir) = temp_root();
        let (src, out) = (dir.join("src"), dir.join("out"));
        std::fs::create_dir_all(&src).unwrap();

        let mut registry = WatchRegistry::new();
        assert!(registry.is_empty());

        let render = registry
            .create(render_config(&src), Arc::new(NoopRenderer))
            .await
            .unwrap();
        let mirror = registry
            .create(
                WatchConfig::mirror(&src, &out).with_force(true),
                Arc::new(NoopRenderer),
            )
            .await
            .unwrap();
        assert_eq!(registry.len(), 2);

        let summaries = registry.list();
        assert_eq!(summaries[0].id, render);
        assert_eq!(summaries[0].mode, "render(activity|sequence)");
        assert!(!summaries[0].force);
        assert_eq!(summaries[0].target, summaries[0].root);
        assert_eq!(summaries[1].id, mirror);
        assert_eq!(summaries[1].mode, "mirror");
        assert!(summaries[1].force);
        assert!(summaries[1].to_string().ends_with("mirror force"));

        registry.remove(render).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(render).is_none());
        assert!(registry.get(mirror).is_some());

        registry.shutdown().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_handle() {
        let mut registry = WatchRegistry::new();
        let err = registry.remove(WatchId::next()).await.unwrap_err();
        assert!(matches!(err, WatchError::UnknownWatch(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_failed_create_adds_nothing() {
        let (_guard, dir) = temp_root();
        let mut registry = WatchRegistry::new();
        let result = registry
            .create(render_config(&dir.join("absent")), Arc::new(NoopRenderer))
            .await;
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_removed_watch_never_dispatches() {
        let (_guard, dir) = temp_root();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let renderer = move |_: &RenderRequest| -> Result<Vec<Utf8PathBuf>, RenderError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        };

        let mut registry = WatchRegistry::new();
        let id = registry
            .create(render_config(&dir), Arc::new(renderer))
            .await
            .unwrap();
        registry.remove(id).await.unwrap();

        std::fs::write(dir.join("a.cs"), "class A {}").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_reports_cycles_it_waited_for() {
        let (_guard, dir) = temp_root();
        std::fs::write(dir.join("a.cs"), "class A {}").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let renderer = move |_: &RenderRequest| -> Result<Vec<Utf8PathBuf>, RenderError> {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(Vec::new())
        };
        let render = RenderConfig {
            kinds: DiagramKinds::CLASS,
            ..RenderConfig::default()
        };
        let config = WatchConfig::render(&dir, render).with_settle(SettleConfig::immediate());

        let mut registry = WatchRegistry::new();
        let id = registry.create(config, Arc::new(renderer)).await.unwrap();
        let watch = registry.get(id).unwrap();
        let path = watch.root().join("a.cs");
        assert_eq!(watch.deliver(ChangeEvent::modified(path)), Admission::Admitted);

        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(registry.list()[0].stats.completed, 0);

        let summaries = registry.shutdown().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, id);
        assert_eq!((summaries[0].stats.admitted, summaries[0].stats.completed), (1, 1));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_summary_display() {
        let (_guard, dir) = temp_root();
        let mut registry = WatchRegistry::new();
        registry
            .create(
                render_config(&dir).with_filter("*.cs;*.vb"),
                Arc::new(NoopRenderer),
            )
            .await
            .unwrap();

        let summary = &registry.list()[0];
        let expected = format!(
            "{} {} [*.cs;*.vb] -> {} render(activity|sequence)",
            summary.id, summary.root, summary.root
        );
        assert_eq!(summary.to_string(), expected);

        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["force"], false);
        assert_eq!(json["stats"]["admitted"], 0);
        registry.shutdown().await;
    }
}
