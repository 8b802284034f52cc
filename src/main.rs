use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use storekeep::archive::{read_archive_root, read_file_content, walk_archive, write_archive};
use storekeep::listing::ListingBody;
use storekeep::perm::Permission;
use storekeep::store::rebuild_index;
use storekeep::{Result, Store, StoreConfig};

#[derive(Parser)]
#[command(name = "storekeep", version = "1.0.0", about = "Content-addressed, deduplicating archival store")]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive the paths read (one per line) from stdin, writing the
    /// archive handle to stdout
    Archive,
    /// Extract every file named in an archive handle
    Extract {
        archive: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Walk the archive and report what would be written without touching disk
        #[arg(long)]
        dry_run: bool,
    },
    /// List the contents of an archive handle
    List { archive: PathBuf },
    /// Scan the arena for integrity problems
    Check,
    /// Rebuild the index from the arena alone, writing it to a new path
    RebuildIndex { new_index: PathBuf },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command, cli.verbose) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

/// Returns `Ok(true)` on a clean run, `Ok(false)` when the command completed
/// but found a problem worth a nonzero exit (only `check` does this; every
/// other command either succeeds fully or fails with `Err`).
fn run(command: Commands, verbosity: u8) -> Result<bool> {
    let config = StoreConfig::from_env().with_verbosity(verbosity);

    match command {
        Commands::Archive => {
            let mut store = Store::open(config, Permission::ReadWrite, true)?;

            let stdin = io::stdin();
            let mut input = Vec::new();
            for line in stdin.lock().lines() {
                let line = line.map_err(|e| storekeep::StoreError::io(Path::new("<stdin>"), e))?;
                if !line.is_empty() {
                    input.push(PathBuf::from(line));
                }
            }

            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let root = write_archive(&mut store, &input, &mut out)?;
            out.flush().map_err(|e| storekeep::StoreError::io(Path::new("<stdout>"), e))?;

            info!(paths = input.len(), root = %root, "archive written");
            Ok(true)
        }

        Commands::Extract { archive, output_dir, dry_run } => {
            let mut store = Store::open(config, Permission::Read, false)?;
            let mut handle =
                BufReader::new(File::open(&archive).map_err(|e| storekeep::StoreError::io(archive.as_path(), e))?);
            let root = read_archive_root(&mut handle)?;

            walk_archive(&mut store, root, |store, record| {
                let target = output_dir.join(&record.path);
                match &record.body {
                    ListingBody::Directory => {
                        println!("  dir     {}", target.display());
                        if !dry_run {
                            std::fs::create_dir_all(&target).map_err(|e| storekeep::StoreError::io(target.as_path(), e))?;
                        }
                    }
                    ListingBody::Symlink { target: link_target } => {
                        println!("  symlink {} -> {}", target.display(), link_target.display());
                        if !dry_run {
                            if let Some(parent) = target.parent() {
                                std::fs::create_dir_all(parent).map_err(|e| storekeep::StoreError::io(parent, e))?;
                            }
                            std::os::unix::fs::symlink(link_target, &target)
                                .map_err(|e| storekeep::StoreError::io(target.as_path(), e))?;
                        }
                    }
                    ListingBody::File { .. } => {
                        let data = read_file_content(store, &record)?;
                        println!("  file    {} ({} B)", target.display(), data.len());
                        if !dry_run {
                            if let Some(parent) = target.parent() {
                                std::fs::create_dir_all(parent).map_err(|e| storekeep::StoreError::io(parent, e))?;
                            }
                            std::fs::write(&target, &data).map_err(|e| storekeep::StoreError::io(target.as_path(), e))?;
                        }
                    }
                }
                Ok(())
            })?;

            Ok(true)
        }

        Commands::List { archive } => {
            let mut store = Store::open(config, Permission::Read, false)?;
            let mut handle =
                BufReader::new(File::open(&archive).map_err(|e| storekeep::StoreError::io(archive.as_path(), e))?);
            let root = read_archive_root(&mut handle)?;

            walk_archive(&mut store, root, |_store, record| {
                let kind = match &record.body {
                    ListingBody::File { .. } => "file",
                    ListingBody::Directory => "dir",
                    ListingBody::Symlink { .. } => "link",
                };
                println!("{:<6} {:o} {}", kind, record.permissions, record.path.display());
                Ok(())
            })?;

            Ok(true)
        }

        Commands::Check => {
            let mut store = Store::open(config, Permission::Read, false)?;
            let report = store.check()?;
            println!("Blocks scanned: {}", report.blocks_scanned);
            if report.is_ok() {
                println!("No problems found.");
                Ok(true)
            } else {
                println!("{} problem(s) found:", report.problems.len());
                for problem in &report.problems {
                    println!("  - {problem}");
                }
                Ok(false)
            }
        }

        Commands::RebuildIndex { new_index } => {
            let configured = config.configured_index_env().map(PathBuf::from);
            rebuild_index(&config.arena_path, &new_index, configured.as_deref(), None)?;
            println!("Index rebuilt -> {}", new_index.display());
            Ok(true)
        }
    }
}
