use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use treewatch::watcher::mask;
use treewatch::{
    MountPoints, Notice, Outcome, Settings, TreeWatcher, WatchError, WatchListener, WatcherConfig,
    logging,
};

#[derive(Parser)]
#[command(name = "treewatch")]
#[command(version, about = "Watch directory trees for changes using inotify")]
struct Cli {
    /// Configuration file (defaults to the nearest .treewatch/settings.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    Config,

    /// Watch paths and print every change as `<MASK>\t<path>`
    Watch {
        /// Directories or files to watch
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Do not descend into subdirectories
        #[arg(long)]
        flat: bool,

        /// Additional mount boundary not to descend into (repeatable)
        #[arg(long = "mount", value_name = "PATH")]
        mounts: Vec<PathBuf>,
    },
}

/// Prints changes to stdout and notices to stderr.
struct PrintListener;

impl WatchListener for PrintListener {
    fn on_change(&mut self, path: &Path, mask: u32) {
        println!("{}\t{}", mask::describe(mask), path.display());
    }

    fn on_notice(&mut self, notice: Notice) {
        tracing::warn!("[cli] {notice}");
        eprintln!("{notice}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(WatchError::from)?;
    settings.validate()?;
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let dir = std::env::current_dir()?;
            let path = Settings::init_config_file(&dir, force).map_err(|e| anyhow!("{e}"))?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Watch {
            roots,
            flat,
            mounts,
        } => watch(&settings.watcher, &roots, !flat && settings.watcher.recursive, mounts),
    }
}

/// Mount boundaries from config, the command line and the mount table.
fn collect_mounts(config: &WatcherConfig, extra: Vec<PathBuf>) -> MountPoints {
    let mut mounts = MountPoints::new(config.mounts.iter().chain(extra.iter()));
    match std::fs::read_to_string(&config.mount_table) {
        Ok(table) => mounts.extend(MountPoints::from_mount_table(
            &table,
            &config.unwatchable_fs_types,
        )),
        Err(e) => tracing::warn!(
            "[cli] cannot read mount table {}: {e}",
            config.mount_table.display()
        ),
    }
    treewatch::debug_event!("cli", "mount boundaries", "{}", mounts.len());
    mounts
}

fn watch(config: &WatcherConfig, roots: &[PathBuf], recursive: bool, extra: Vec<PathBuf>) -> Result<()> {
    let mounts = collect_mounts(config, extra);
    let mut watcher = TreeWatcher::init(config, PrintListener)?;

    let mut watched = 0;
    for root in roots {
        match watcher.watch(root, recursive, &mounts) {
            Outcome::Handle(handle) => {
                watched += 1;
                treewatch::log_event!("cli", "watching", "{} ({handle})", root.display());
            }
            outcome => eprintln!("{}: {outcome}", root.display()),
        }
    }
    if watched == 0 {
        bail!("nothing to watch");
    }
    eprintln!("watching {} directories", watcher.watch_count());

    loop {
        watcher.process_input()?;
    }
}
