//! CLI entry point for the folder-watch engine.
//!
//! This binary starts one or more watches and keeps them running until it is
//! interrupted.
//!
//! # Usage
//!
//! ```bash
//! folder-watch [OPTIONS] <COMMAND>
//!
//! # Regenerate class and sequence diagrams whenever a C# file settles
//! folder-watch render ./src --kinds class,sequence --renderer ./uml-render
//!
//! # Mirror a source tree, overwriting and deleting copies
//! folder-watch mirror ./src --target ./backup --force
//!
//! # Start every watch listed in a JSON file
//! folder-watch run --config watches.json --renderer ./uml-render
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod renderer;

use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, eyre};
use fw_core::{
    Config, DiagramKind, DiagramKinds, DispatchMode, MirrorConfig, RenameHandling, RenderConfig,
    SettleConfig, WatchConfig,
};
use fw_watcher::{NoopRenderer, Renderer, WatchRegistry, WatchSummary};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::renderer::CommandRenderer;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watches directories and regenerates diagrams or mirrors files once changes
/// settle.
#[derive(Parser)]
#[command(name = "folder-watch", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Print the watch list as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Regenerate diagrams for the directory of every settled change.
    Render {
        #[command(flatten)]
        watch: WatchArgs,

        /// Directory receiving the diagram folder (defaults to the root).
        #[arg(short, long, env = "FOLDER_WATCH_TARGET")]
        target: Option<Utf8PathBuf>,

        /// Diagram kinds to render: `all`, or a list such as `class,sequence`.
        #[arg(short, long, default_value = "all")]
        kinds: DiagramKinds,

        /// Folder below the target that receives diagrams (empty for none).
        #[arg(long, default_value = "diagrams", env = "FOLDER_WATCH_ARTIFACT_FOLDER")]
        artifact_folder: String,

        /// Extension of generated diagrams; forced runs delete these first.
        #[arg(long, default_value = "puml")]
        extension: String,

        /// Ask the renderer for complete diagrams spanning the whole tree.
        #[arg(long)]
        whole_tree: bool,

        /// Renderer program to invoke.
        #[arg(short, long, env = "FOLDER_WATCH_RENDERER")]
        renderer: Utf8PathBuf,
    },

    /// Copy settled changes into a parallel target tree.
    Mirror {
        #[command(flatten)]
        watch: WatchArgs,

        /// Root of the mirror tree.
        #[arg(short, long, env = "FOLDER_WATCH_TARGET")]
        target: Utf8PathBuf,
    },

    /// Start every watch listed in a JSON configuration file.
    Run {
        /// Configuration file.
        #[arg(short, long, env = "FOLDER_WATCH_CONFIG")]
        config: Utf8PathBuf,

        /// Renderer program for render watches.
        #[arg(short, long, env = "FOLDER_WATCH_RENDERER")]
        renderer: Option<Utf8PathBuf>,
    },

    /// List the available diagram kinds.
    ListKinds,
}

/// Options shared by every single-watch command.
#[derive(Args)]
struct WatchArgs {
    /// Directory to watch.
    root: Utf8PathBuf,

    /// File-name glob; separate several with `;`.
    #[arg(short, long, default_value = "*.cs", env = "FOLDER_WATCH_FILTER")]
    filter: String,

    /// Overwrite and delete existing output.
    #[arg(long)]
    force: bool,

    /// Watch the root only, not its subdirectories.
    #[arg(long)]
    no_recursive: bool,

    /// How renames are handled.
    #[arg(long, value_enum, default_value_t = RenameArg::Ignore)]
    rename: RenameArg,

    /// Dispatch without waiting for writers to release files.
    #[arg(long)]
    immediate: bool,

    /// Delay between settle probes, in milliseconds.
    #[arg(long, default_value_t = 500, env = "FOLDER_WATCH_INTERVAL_MS")]
    interval_ms: u64,

    /// Give up waiting for writers after this many milliseconds.
    #[arg(long, env = "FOLDER_WATCH_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
}

/// Rename handling.
#[derive(Clone, Copy, ValueEnum)]
enum RenameArg {
    /// Log renames only.
    Ignore,
    /// Treat a rename as delete plus create.
    Replace,
}

impl From<RenameArg> for RenameHandling {
    fn from(arg: RenameArg) -> Self {
        match arg {
            RenameArg::Ignore => Self::Ignore,
            RenameArg::Replace => Self::Replace,
        }
    }
}

impl WatchArgs {
    fn into_config(self, mode: DispatchMode, target: Option<Utf8PathBuf>) -> WatchConfig {
        let settle = if self.immediate {
            SettleConfig::immediate()
        } else {
            SettleConfig::poll(self.interval_ms, self.timeout_ms)
        };
        WatchConfig {
            root: self.root,
            filter: self.filter,
            recursive: !self.no_recursive,
            target,
            force: self.force,
            mode,
            settle,
        }
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Builds the watch configurations a command asks for.
fn build_configs(command: Commands) -> color_eyre::Result<(Vec<WatchConfig>, Option<Utf8PathBuf>)> {
    match command {
        Commands::Render {
            watch,
            target,
            kinds,
            artifact_folder,
            extension,
            whole_tree,
            renderer,
        } => {
            let render = RenderConfig {
                kinds,
                artifact_folder,
                artifact_extension: extension,
                whole_tree,
                rename: watch.rename.into(),
            };
            let config = watch.into_config(DispatchMode::Render(render), target);
            Ok((vec![config], Some(renderer)))
        }
        Commands::Mirror { watch, target } => {
            let mirror = MirrorConfig {
                rename: watch.rename.into(),
            };
            let config = watch.into_config(DispatchMode::Mirror(mirror), Some(target));
            Ok((vec![config], None))
        }
        Commands::Run { config, renderer } => {
            let loaded = Config::from_json_file(&config)
                .wrap_err_with(|| format!("Failed to load configuration from {config}"))?;
            if loaded.watches.is_empty() {
                return Err(eyre!("No watches configured in {config}"));
            }
            Ok((loaded.watches, renderer))
        }
        Commands::ListKinds => Ok((Vec::new(), None)),
    }
}

/// Picks the renderer shared by every render watch.
fn select_renderer(
    configs: &[WatchConfig],
    program: Option<Utf8PathBuf>,
) -> color_eyre::Result<Arc<dyn Renderer>> {
    let needs_renderer = configs
        .iter()
        .any(|config| matches!(config.mode, DispatchMode::Render(_)));

    match (needs_renderer, program) {
        (true, Some(program)) => Ok(Arc::new(CommandRenderer::new(program))),
        (true, None) => Err(eyre!(
            "Render watches need a renderer program (--renderer or FOLDER_WATCH_RENDERER)"
        )),
        (false, _) => Ok(Arc::new(NoopRenderer)),
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Starts every watch, runs until interrupted, then stops them all.
///
/// A watch that fails to start aborts the command after the watches already
/// started have been stopped.
async fn run_watches(
    configs: Vec<WatchConfig>,
    renderer: Arc<dyn Renderer>,
    json: bool,
) -> color_eyre::Result<()> {
    let mut registry = WatchRegistry::new();

    for config in configs {
        let root = config.root.clone();
        if let Err(error) = registry.create(config, Arc::clone(&renderer)).await {
            registry.shutdown().await;
            return Err(error).wrap_err_with(|| format!("Failed to watch {root}"));
        }
    }

    print_watches(&registry.list(), json)?;
    info!(watches = registry.len(), "Watching for changes, press Ctrl-C to stop");

    wait_for_shutdown().await?;

    let summaries = registry.shutdown().await;
    print_stats(&summaries)?;

    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM on Unix.
async fn wait_for_shutdown() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints the watch list.
fn print_watches(summaries: &[WatchSummary], json: bool) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    if json {
        #[derive(serde::Serialize)]
        struct Report<'a> {
            watches: &'a [WatchSummary],
        }

        let report = serde_json::to_string_pretty(&Report { watches: summaries })
            .map_err(|e| eyre!("Failed to serialize JSON: {}", e))?;
        writeln!(handle, "{report}")?;
        return Ok(());
    }

    writeln!(handle, "Active watches ({}):", summaries.len())?;
    for summary in summaries {
        writeln!(handle, "  {summary}")?;
    }
    Ok(())
}

/// Prints the final per-watch counters.
fn print_stats(summaries: &[WatchSummary]) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for summary in summaries {
        writeln!(
            handle,
            "{} {}: {} notifications ({})",
            summary.id,
            summary.root,
            summary.stats.notifications(),
            summary.stats
        )?;
    }
    Ok(())
}

/// Prints the diagram kinds accepted by `--kinds`.
fn print_kinds() -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for kind in DiagramKind::ALL {
        writeln!(handle, "{kind}")?;
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    if matches!(cli.command, Commands::ListKinds) {
        return print_kinds();
    }

    // 4. Build and start the watches
    let (configs, program) = build_configs(cli.command)?;
    let renderer = select_renderer(&configs, program)?;
    run_watches(configs, renderer, cli.json).await
}
