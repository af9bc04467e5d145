//! Settle-wait: waiting until writers have released changed files.
//!
//! Editors and build tools often write a file in several steps. Dispatching
//! on the first notification would render or copy a half-written file, so
//! every cycle first waits for the containing directory to become
//! *quiescent*: no file matching the watch's filter may be held exclusively
//! by another handle.
//!
//! - [`QuiescencePoller`] performs one probe of one directory.
//! - [`SettlePolicy`] repeats the probe with a fixed interval until the
//!   directory settles, an optional timeout expires, or the watch is
//!   stopped.
//!
//! # Probing
//!
//! A file is *in use* when it cannot be opened read+write without sharing.
//! On Windows the open itself uses share mode 0, so any other open handle
//! makes it fail with a sharing violation. Everywhere a non-blocking
//! exclusive lock is attempted on the opened handle as well, which detects
//! writers that hold an advisory lock. Files that disappear or cannot be
//! opened for other reasons (permissions) never hold a directory open.

use std::fs::{File, OpenOptions};
use std::io;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use fw_core::{SettleConfig, SettleMode};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::filter::GlobFilter;

/// One-shot probe for writer activity in a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuiescencePoller;

impl QuiescencePoller {
    /// Returns `true` if no file in `dir` (non-recursive) whose name matches
    /// `filter` is currently held exclusively.
    ///
    /// A directory that does not exist, or cannot be listed, is settled:
    /// there is nothing to wait for.
    ///
    /// # Examples
    ///
    /// ```
    /// use fw_watcher::{GlobFilter, QuiescencePoller};
    /// use camino::Utf8Path;
    ///
    /// let filter = GlobFilter::new("*.cs").unwrap();
    /// assert!(QuiescencePoller::is_settled(Utf8Path::new("/does/not/exist"), &filter));
    /// ```
    #[must_use]
    pub fn is_settled(dir: &Utf8Path, filter: &GlobFilter) -> bool {
        let Ok(entries) = dir.read_dir_utf8() else {
            return true;
        };

        for entry in entries.flatten() {
            if !filter.matches_name(entry.file_name()) {
                continue;
            }
            if entry.file_type().is_ok_and(|t| t.is_file()) && Self::is_file_in_use(entry.path()) {
                tracing::trace!(path = %entry.path(), "File still in use");
                return false;
            }
        }
        true
    }

    /// Returns `true` if `path` is currently held exclusively by another
    /// handle.
    #[must_use]
    pub fn is_file_in_use(path: &Utf8Path) -> bool {
        let file = match open_exclusive(path) {
            Ok(file) => file,
            Err(err) => return is_contention(&err),
        };
        match file.try_lock_exclusive() {
            // The lock is released when `file` is closed.
            Ok(()) => false,
            Err(err) => is_contention(&err),
        }
    }
}

fn open_exclusive(path: &Utf8Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(0);
    }
    options.open(path)
}

fn is_contention(err: &io::Error) -> bool {
    #[cfg(windows)]
    {
        const ERROR_SHARING_VIOLATION: i32 = 32;
        const ERROR_LOCK_VIOLATION: i32 = 33;
        if matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        ) {
            return true;
        }
    }
    let contended = fs2::lock_contended_error();
    (err.raw_os_error().is_some() && err.raw_os_error() == contended.raw_os_error())
        || err.kind() == io::ErrorKind::WouldBlock
}

/// Result of a settle-wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// No matching file is in use; dispatch may proceed.
    Settled,
    /// The timeout expired while files were still in use.
    TimedOut,
    /// The watch was stopped while waiting.
    Cancelled,
}

/// Repeats [`QuiescencePoller`] probes according to a [`SettleConfig`].
///
/// # Examples
///
/// ```
/// use fw_watcher::{GlobFilter, SettleOutcome, SettlePolicy};
/// use fw_core::SettleConfig;
/// use camino::Utf8Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let policy = SettlePolicy::new(&SettleConfig::poll(50, Some(1_000)));
/// let filter = GlobFilter::new("*.cs").unwrap();
/// let cancel = CancellationToken::new();
///
/// let outcome = policy.wait(Utf8Path::new("./src"), &filter, &cancel).await;
/// assert_ne!(outcome, SettleOutcome::Cancelled);
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    mode: SettleMode,
    interval: Duration,
    timeout: Option<Duration>,
}

impl SettlePolicy {
    /// Builds the policy from configuration.
    #[must_use]
    pub fn new(config: &SettleConfig) -> Self {
        Self {
            mode: config.mode,
            interval: config.interval(),
            timeout: config.timeout(),
        }
    }

    /// A policy that never waits.
    #[must_use]
    pub fn immediate() -> Self {
        Self::new(&SettleConfig::immediate())
    }

    /// Waits until `dir` settles, the timeout expires or `cancel` fires.
    ///
    /// Probes run on the blocking pool; between probes the task sleeps
    /// without holding a thread.
    pub async fn wait(
        &self,
        dir: &Utf8Path,
        filter: &GlobFilter,
        cancel: &CancellationToken,
    ) -> SettleOutcome {
        if cancel.is_cancelled() {
            return SettleOutcome::Cancelled;
        }
        if self.mode == SettleMode::Immediate {
            return SettleOutcome::Settled;
        }

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut probes: u32 = 0;

        loop {
            probes += 1;
            if probe(dir.to_owned(), filter.clone()).await {
                if probes > 1 {
                    tracing::debug!(dir = %dir, probes, "Directory settled");
                }
                return SettleOutcome::Settled;
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return SettleOutcome::TimedOut;
            }

            tokio::select! {
                () = cancel.cancelled() => return SettleOutcome::Cancelled,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::new(&SettleConfig::default())
    }
}

async fn probe(dir: Utf8PathBuf, filter: GlobFilter) -> bool {
    match tokio::task::spawn_blocking(move || QuiescencePoller::is_settled(&dir, &filter)).await {
        Ok(settled) => settled,
        Err(error) => {
            tracing::warn!(error = %error, "Settle probe failed, treating directory as settled");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("Invalid path");
        (dir, path)
    }

    fn lock_file(path: &Utf8Path) -> File {
        let holder = File::open(path).expect("Failed to open file");
        holder.lock_exclusive().expect("Failed to lock file");
        holder
    }

    #[test]
    fn test_missing_directory_is_settled() {
        let filter = GlobFilter::new("*.cs").unwrap();
        assert!(QuiescencePoller::is_settled(
            Utf8Path::new("/nonexistent/path/that/does/not/exist"),
            &filter
        ));
    }

    #[test]
    fn test_unlocked_files_are_settled() {
        let (_guard, root) = temp_root();
        fs::write(root.join("a.cs"), "class A {}").unwrap();
        fs::write(root.join("b.cs"), "class B {}").unwrap();

        let filter = GlobFilter::new("*.cs").unwrap();
        assert!(QuiescencePoller::is_settled(&root, &filter));
    }

    #[test]
    fn test_locked_file_is_in_use() {
        let (_guard, root) = temp_root();
        let file = root.join("a.cs");
        fs::write(&file, "class A {}").unwrap();
        let filter = GlobFilter::new("*.cs").unwrap();

        let holder = lock_file(&file);
        assert!(QuiescencePoller::is_file_in_use(&file));
        assert!(!QuiescencePoller::is_settled(&root, &filter));

        drop(holder);
        assert!(!QuiescencePoller::is_file_in_use(&file));
        assert!(QuiescencePoller::is_settled(&root, &filter));
    }

    #[test]
    fn test_locked_file_outside_filter_is_ignored() {
        let (_guard, root) = temp_root();
        let file = root.join("notes.txt");
        fs::write(&file, "draft").unwrap();
        let _holder = lock_file(&file);

        let filter = GlobFilter::new("*.cs").unwrap();
        assert!(QuiescencePoller::is_settled(&root, &filter));
    }

    #[test]
    fn test_probe_is_not_recursive() {
        let (_guard, root) = temp_root();
        fs::create_dir(root.join("nested")).unwrap();
        let file = root.join("nested").join("a.cs");
        fs::write(&file, "class A {}").unwrap();
        let _holder = lock_file(&file);

        let filter = GlobFilter::new("*.cs").unwrap();
        assert!(QuiescencePoller::is_settled(&root, &filter));
        assert!(!QuiescencePoller::is_settled(&root.join("nested"), &filter));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_settles_after_release() {
        let (_guard, root) = temp_root();
        let file = root.join("a.cs");
        fs::write(&file, "class A {}").unwrap();
        let holder = lock_file(&file);

        let release_after = Duration::from_millis(200);
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(release_after);
            drop(holder);
        });

        let policy = SettlePolicy::new(&SettleConfig::poll(20, Some(5_000)));
        let filter = GlobFilter::new("*.cs").unwrap();
        let started = std::time::Instant::now();
        let outcome = policy.wait(&root, &filter, &CancellationToken::new()).await;

        assert_eq!(outcome, SettleOutcome::Settled);
        assert!(started.elapsed() >= release_after);
        releaser.join().unwrap();
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let (_guard, root) = temp_root();
        let file = root.join("a.cs");
        fs::write(&file, "class A {}").unwrap();
        let _holder = lock_file(&file);

        let policy = SettlePolicy::new(&SettleConfig::poll(10, Some(50)));
        let filter = GlobFilter::new("*.cs").unwrap();
        let outcome = policy.wait(&root, &filter, &CancellationToken::new()).await;

        assert_eq!(outcome, SettleOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_is_cancellable() {
        let (_guard, root) = temp_root();
        let file = root.join("a.cs");
        fs::write(&file, "class A {}").unwrap();
        let _holder = lock_file(&file);

        let policy = SettlePolicy::new(&SettleConfig::poll(10, None));
        let filter = GlobFilter::new("*.cs").unwrap();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            policy.wait(&root, &filter, &cancel),
        )
        .await
        .expect("settle-wait ignored cancellation");
        assert_eq!(outcome, SettleOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_immediate_policy_skips_probe() {
        let (_guard, root) = temp_root();
        let file = root.join("a.cs");
        fs::write(&file, "class A {}").unwrap();
        let _holder = lock_file(&file);

        let filter = GlobFilter::new("*.cs").unwrap();
        let outcome = SettlePolicy::immediate()
            .wait(&root, &filter, &CancellationToken::new())
            .await;
        assert_eq!(outcome, SettleOutcome::Settled);
    }
}
