use std::path::PathBuf;

use abide_core::{
    DEFAULT_SNAPSHOTS_DIR, FileStatus, SnapshotId, SnapshotLocation, SnapshotStore,
    diagnostics::init_tracing,
};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "abide")]
#[command(about = "Inspect snapshot files written by abide assertions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Test working directory holding the snapshot directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[arg(long, default_value = DEFAULT_SNAPSHOTS_DIR)]
    snapshots_dir: String,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List every snapshot with its owning file
    List,
    /// Print the stored value of one snapshot
    Show { id: String },
    /// Decode every snapshot file and fail if any is unreadable
    Check,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_tracing(&cli.log_dir)?;

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("failed to resolve root: {}", cli.root.display()))?;
    let package = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let store =
        SnapshotStore::new(SnapshotLocation::new(root, package).with_dir_name(cli.snapshots_dir));

    match cli.command {
        Commands::List => {
            for record in store.records()? {
                let path = record
                    .path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                println!("{}\t{path}", record.id);
            }
        }
        Commands::Show { id } => {
            let id = SnapshotId::parse(id)?;
            match store.get(&id)? {
                Some(record) => println!("{}", record.value),
                None => bail!("snapshot `{id}` not found"),
            }
        }
        Commands::Check => {
            let outcomes = store.load()?;
            let mut skipped = 0_usize;
            for outcome in outcomes {
                match &outcome.status {
                    FileStatus::Loaded(count) => {
                        println!("ok\t{}\t{count} snapshots", outcome.path.display());
                    }
                    FileStatus::Skipped(reason) => {
                        skipped += 1;
                        println!("skipped\t{}\t{reason}", outcome.path.display());
                    }
                }
            }
            if skipped > 0 {
                bail!("{skipped} snapshot files could not be read");
            }
        }
    }

    Ok(())
}
