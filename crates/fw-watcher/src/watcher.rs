//! A single watch: notification subscription, admission and dispatch cycles.
//!
//! This module provides the [`Watch`] type. A watch owns one `notify`
//! subscription on its root, one [`ChangeGate`] and one [`DispatchPolicy`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    notify thread                                │
//! │  ┌──────────────────┐    ┌────────────────┐    ┌────────────┐   │
//! │  │ RecommendedWatcher│ -> │ from_notify()  │ -> │ deliver()  │   │
//! │  │ (raw events)     │    │ (ChangeEvent)  │    │ filter/gate│   │
//! │  └──────────────────┘    └────────────────┘    └─────┬──────┘   │
//! └──────────────────────────────────────────────────────│──────────┘
//!                                     Admitted: spawn    │  Busy: drop
//!                                                        ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                        │
//! │  ┌──────────────────┐    ┌────────────────┐    ┌────────────┐   │
//! │  │ SettlePolicy     │ -> │ DispatchAction │ -> │ GatePermit │   │
//! │  │ (wait, cancel)   │    │ (spawn_blocking)│   │ (dropped)  │   │
//! │  └──────────────────┘    └────────────────┘    └────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. **Start**: [`Watch::start`] validates the configuration, canonicalizes
//!    the root, compiles the filter and subscribes to notifications.
//! 2. **Cycles**: each admitted notification runs one cycle
//!    (`Idle -> Admitted -> Settling -> Dispatching -> Idle`) on the runtime
//!    captured at start. Notifications arriving while a cycle runs are
//!    dropped.
//! 3. **Stop**: [`Watch::stop`] unsubscribes, interrupts a pending
//!    settle-wait and awaits the in-flight cycle. Dropping a watch
//!    unsubscribes and cancels without waiting.

use std::fmt;
use std::sync::{Arc, Weak};

use camino::{Utf8Path, Utf8PathBuf};
use fw_core::{ConfigError, WatchConfig, WatchId};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{ActionPlan, DispatchPolicy, Renderer};
use crate::error::{DispatchError, WatchError};
use crate::events::{ChangeEvent, ChangeKind, from_notify};
use crate::filter::GlobFilter;
use crate::gate::{ChangeGate, GatePermit};
use crate::settle::{SettleOutcome, SettlePolicy};
use crate::stats::{StatsSnapshot, WatchStats};

/// What a watch did with a delivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Admission {
    /// A dispatch cycle was started.
    Admitted,
    /// A cycle was already running; the notification was dropped.
    Busy,
    /// The path does not match the watch's filter.
    Filtered,
    /// The policy has nothing to do for this event.
    Ignored,
    /// The watch has been stopped.
    Stopped,
}

/// State shared between the watch handle, the notify callback and running
/// cycles.
struct WatchShared {
    id: WatchId,
    config: WatchConfig,
    filter: GlobFilter,
    policy: DispatchPolicy,
    settle: SettlePolicy,
    gate: Arc<ChangeGate>,
    renderer: Arc<dyn Renderer>,
    cancel: CancellationToken,
    stats: WatchStats,
    runtime: Handle,
    /// The latest spawned cycle. Also serializes admission against `stop`.
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl WatchShared {
    fn deliver(self: &Arc<Self>, event: ChangeEvent) -> Admission {
        if !self.filter.matches(&event.path) {
            tracing::trace!(watch = %self.id, path = %event.path, "Event filtered");
            return Admission::Filtered;
        }

        let mut in_flight = self.in_flight.lock();
        if self.cancel.is_cancelled() {
            return Admission::Stopped;
        }

        let plan = self.policy.plan(&event);
        if plan.is_empty() {
            if let ChangeKind::Renamed { from } = &event.kind {
                tracing::info!(watch = %self.id, from = %from, to = %event.path, "File renamed");
            } else {
                tracing::trace!(
                    watch = %self.id,
                    path = %event.path,
                    kind = event.kind.label(),
                    "Nothing to dispatch"
                );
            }
            return Admission::Ignored;
        }

        let Some(permit) = self.gate.try_enter() else {
            self.stats.increment_dropped();
            tracing::debug!(
                watch = %self.id,
                path = %event.path,
                "Dispatch in progress, dropping event"
            );
            return Admission::Busy;
        };

        self.stats.increment_admitted();
        tracing::debug!(
            watch = %self.id,
            path = %event.path,
            kind = event.kind.label(),
            "Change admitted"
        );
        let cycle = Arc::clone(self).run_cycle(event, plan, permit);
        *in_flight = Some(self.runtime.spawn(cycle));
        Admission::Admitted
    }

    async fn run_cycle(self: Arc<Self>, event: ChangeEvent, plan: ActionPlan, permit: GatePermit) {
        let _permit = permit;

        let Some(dir) = event.containing_dir().filter(|dir| dir.is_dir()) else {
            tracing::debug!(watch = %self.id, path = %event.path, "Directory vanished, skipping");
            self.stats.increment_skipped();
            return;
        };

        match self.settle.wait(dir, &self.filter, &self.cancel).await {
            SettleOutcome::Settled => {}
            SettleOutcome::TimedOut => {
                tracing::warn!(
                    watch = %self.id,
                    dir = %dir,
                    "Files still in use, skipping dispatch"
                );
                self.stats.increment_skipped();
                return;
            }
            SettleOutcome::Cancelled => {
                tracing::debug!(watch = %self.id, dir = %dir, "Settle-wait cancelled");
                self.stats.increment_skipped();
                return;
            }
        }

        let mut failed = false;
        let mut interrupted = false;
        for action in plan {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            let description = action.to_string();
            let renderer = Arc::clone(&self.renderer);
            match tokio::task::spawn_blocking(move || action.execute(renderer.as_ref())).await {
                Ok(outcome) => match &outcome.error {
                    None => tracing::debug!(
                        watch = %self.id,
                        action = %outcome.action,
                        artifacts = outcome.artifacts.len(),
                        "Dispatched"
                    ),
                    Some(error) => {
                        failed = true;
                        tracing::warn!(
                            watch = %self.id,
                            action = %outcome.action,
                            error = %error,
                            "Dispatch failed"
                        );
                    }
                },
                Err(join_error) => {
                    failed = true;
                    let error = DispatchError::TaskPanicked(join_error.to_string());
                    tracing::warn!(
                        watch = %self.id,
                        action = %description,
                        error = %error,
                        "Dispatch failed"
                    );
                }
            }
        }

        if failed {
            self.stats.increment_failed();
        } else if interrupted {
            tracing::debug!(watch = %self.id, "Dispatch interrupted by stop");
            self.stats.increment_skipped();
        } else {
            self.stats.increment_completed();
        }
    }
}

/// A watched root with one dispatch policy.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use fw_watcher::{NoopRenderer, Watch};
/// use fw_core::WatchConfig;
///
/// # async fn example() -> Result<(), fw_watcher::WatchError> {
/// let config = WatchConfig::mirror("./src", "./backup").with_force(true);
/// let mut watch = Watch::start(config, Arc::new(NoopRenderer)).await?;
///
/// // ... files under ./src are now mirrored into ./backup ...
///
/// watch.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Watch {
    shared: Arc<WatchShared>,

    /// The notify subscription. `None` for detached watches and after stop.
    watcher: Option<RecommendedWatcher>,
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.shared.id)
            .field("root", &self.shared.config.root)
            .field("mode", &self.shared.policy.name())
            .field("is_busy", &self.is_busy())
            .field("is_stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl Watch {
    /// Starts watching `config.root`.
    ///
    /// # Errors
    ///
    /// - [`WatchError::Config`] if the configuration is invalid or the filter
    ///   does not compile
    /// - [`WatchError::PathNotFound`] if the root does not exist
    /// - [`WatchError::Notify`] if the subscription cannot be made
    /// - [`WatchError::NoRuntime`] outside of a tokio runtime
    #[allow(clippy::unused_async)] // Async for symmetry with stop()
    pub async fn start(
        config: WatchConfig,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, WatchError> {
        let mut watch = Self::detached(config, renderer)?;
        watch.watcher = Some(subscribe(&watch.shared)?);
        tracing::info!(
            watch = %watch.id(),
            root = %watch.root(),
            mode = watch.shared.policy.name(),
            "Watch started"
        );
        Ok(watch)
    }

    /// Builds a watch without a notify subscription.
    ///
    /// Events reach it only through [`deliver`](Self::deliver), which lets
    /// embedders feed notifications from their own source.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start), minus notify failures.
    pub fn detached(config: WatchConfig, renderer: Arc<dyn Renderer>) -> Result<Self, WatchError> {
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        config.validate()?;
        let config = canonicalize(config)?;
        config.validate()?;

        let filter = GlobFilter::new(&config.filter)?;
        let shared = WatchShared {
            id: WatchId::next(),
            policy: DispatchPolicy::from_config(&config),
            settle: SettlePolicy::new(&config.settle),
            filter,
            config,
            gate: Arc::new(ChangeGate::new()),
            renderer,
            cancel: CancellationToken::new(),
            stats: WatchStats::new(),
            runtime,
            in_flight: Mutex::new(None),
        };
        Ok(Self {
            shared: Arc::new(shared),
            watcher: None,
        })
    }

    /// Offers one change notification to the watch.
    ///
    /// Never blocks on a running cycle: a busy watch drops the notification.
    pub fn deliver(&self, event: ChangeEvent) -> Admission {
        self.shared.deliver(event)
    }

    /// Stops the watch.
    ///
    /// Unsubscribes from notifications, interrupts a pending settle-wait and
    /// waits for the in-flight cycle to finish. Later deliveries return
    /// [`Admission::Stopped`]. Calling `stop` twice is harmless.
    pub async fn stop(&mut self) {
        let (was_running, handle) = {
            let mut in_flight = self.shared.in_flight.lock();
            let was_running = !self.shared.cancel.is_cancelled();
            self.shared.cancel.cancel();
            (was_running, in_flight.take())
        };

        self.watcher.take();

        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                tracing::warn!(
                    watch = %self.id(),
                    error = %error,
                    "Dispatch cycle ended abnormally"
                );
            }
        }

        if was_running {
            tracing::info!(
                watch = %self.id(),
                root = %self.root(),
                stats = %self.stats(),
                "Watch stopped"
            );
        }
    }

    /// Returns the watch handle.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WatchId {
        self.shared.id
    }

    /// Returns the validated configuration, with canonical paths.
    #[must_use]
    pub fn config(&self) -> &WatchConfig {
        &self.shared.config
    }

    /// Returns the canonical root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.shared.config.root
    }

    /// Returns the effective target directory.
    #[must_use]
    pub fn target(&self) -> &Utf8Path {
        self.shared.config.target_dir()
    }

    /// Returns the dispatch policy.
    #[must_use]
    pub fn policy(&self) -> &DispatchPolicy {
        &self.shared.policy
    }

    /// Returns `true` while a dispatch cycle is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared.gate.is_busy()
    }

    /// Returns `true` once the watch has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Returns a snapshot of the watch's counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        // The subscription field drops with `self`; cancel lets the
        // in-flight cycle end at its next checkpoint.
        self.shared.cancel.cancel();
    }
}

/// Resolves the root (which must exist) and the target (which may not).
fn canonicalize(mut config: WatchConfig) -> Result<WatchConfig, WatchError> {
    if !config.root.exists() {
        return Err(WatchError::path_not_found(config.root));
    }
    if !config.root.is_dir() {
        return Err(ConfigError::MissingDirectory(config.root).into());
    }
    config.root = config.root.canonicalize_utf8()?;

    if let Some(target) = &config.target {
        config.target = Some(resolve_target(target)?);
    }
    Ok(config)
}

/// Canonicalizes the deepest existing ancestor of `path` and re-joins the
/// missing tail, so symlinks on the way to a not-yet-created target resolve.
fn resolve_target(path: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    let absolute = absolute(path)?;
    match absolute.ancestors().find(|ancestor| ancestor.exists()) {
        Some(existing) => {
            let tail = absolute.strip_prefix(existing).unwrap_or(Utf8Path::new(""));
            let mut resolved = existing.canonicalize_utf8()?;
            if !tail.as_str().is_empty() {
                resolved.push(tail);
            }
            Ok(resolved)
        }
        None => Ok(absolute),
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    let absolute = std::path::absolute(path)?;
    Utf8PathBuf::from_path_buf(absolute).map_err(WatchError::non_utf8_path)
}

fn subscribe(shared: &Arc<WatchShared>) -> Result<RecommendedWatcher, WatchError> {
    let weak: Weak<WatchShared> = Arc::downgrade(shared);
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        match result {
            Ok(event) => {
                for change in from_notify(event) {
                    shared.deliver(change);
                }
            }
            Err(error) => tracing::warn!(watch = %shared.id, error = %error, "Watch error"),
        }
    })?;

    let mode = if shared.config.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(shared.config.root.as_std_path(), mode)?;
    Ok(watcher)
}
