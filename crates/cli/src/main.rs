//! # CLI — The `kfs` Command
//!
//! A thin command-line wrapper over the [`btable`] façade. Every subcommand
//! opens the table named by `-d/--dir` (a bare name gets `.kfs` appended),
//! performs one operation, and exits.
//!
//! ## Commands
//!
//! ```text
//! kfs -d store write <key> [path]    Write a file (or stdin) to a key
//! kfs -d store read <key> [path]     Read a key to a file (or stdout)
//! kfs -d store unlink <key>          Delete a blob
//! kfs -d store list <bucket|key>     Enumerate one shard
//! kfs -d store stat [bucket|key]     Per-shard size/free (-h for units)
//! kfs -d store compact               Repair each shard directory
//! ```
//!
//! Keys are 40 lowercase hex characters. Buckets may be named by decimal
//! index (`0..=255`) or by any key that routes to them.
//!
//! Exit code 0 on success, 1 on any error with a single `[error] <message>`
//! line on standard error. Set `RUST_LOG` for diagnostics.

use anyhow::{Context, Result};
use btable::{Btable, BucketSelector, BucketStat, TableOptions};
use clap::{Parser, Subcommand};
use engine::{KvEngine, RocksEngine};
use keys::FileKey;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kfs", version, about = "An embedded sharded blob store")]
struct Cli {
    /// Table directory; ".kfs" is appended when missing.
    #[arg(short = 'd', long = "dir", default_value = "kfs", global = true)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a file (or stdin) to a key.
    Write {
        /// Destination key, 40 lowercase hex characters.
        key: String,
        /// Source file; stdin when omitted.
        path: Option<PathBuf>,
    },
    /// Read a key to a file (or stdout).
    Read {
        key: String,
        /// Destination file; stdout when omitted.
        path: Option<PathBuf>,
    },
    /// Delete a blob.
    Unlink { key: String },
    /// Enumerate the blobs of one shard.
    List {
        /// Shard index (0-255) or a key routed to the shard.
        bucket: String,
    },
    /// Show per-shard size and free space.
    #[command(disable_help_flag = true)]
    Stat {
        /// Shard index or key; all shards when omitted.
        bucket: Option<String>,
        /// Human-readable sizes.
        #[arg(short = 'h', long = "human")]
        human: bool,
    },
    /// Run engine-level repair on each shard directory.
    Compact,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[error] {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Write { key, path } => cmd_write(&cli.dir, &key, path.as_deref()),
        Command::Read { key, path } => cmd_read(&cli.dir, &key, path.as_deref()),
        Command::Unlink { key } => {
            let key = FileKey::parse(&key)?;
            open_table(&cli.dir)?.unlink(&key)?;
            Ok(())
        }
        Command::List { bucket } => cmd_list(&cli.dir, &bucket),
        Command::Stat { bucket, human } => cmd_stat(&cli.dir, bucket.as_deref(), human),
        Command::Compact => cmd_compact(&cli.dir),
    }
}

fn open_table(dir: &Path) -> Result<Btable> {
    Btable::open(dir, TableOptions::default())
        .with_context(|| format!("failed to open table at {}", dir.display()))
}

fn cmd_write(dir: &Path, key: &str, path: Option<&Path>) -> Result<()> {
    let key = FileKey::parse(key)?;
    let table = open_table(dir)?;

    let writer = match path {
        Some(path) => {
            // a known length lets admission run against the full size
            let len = std::fs::metadata(path)
                .with_context(|| format!("cannot stat {}", path.display()))?
                .len();
            let mut src = File::open(path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            let mut writer = table.write_stream(&key, Some(len))?;
            io::copy(&mut src, &mut writer)?;
            writer
        }
        None => {
            let mut writer = table.write_stream(&key, None)?;
            io::copy(&mut io::stdin().lock(), &mut writer)?;
            writer
        }
    };
    writer.finish()?;
    Ok(())
}

fn cmd_read(dir: &Path, key: &str, path: Option<&Path>) -> Result<()> {
    let key = FileKey::parse(key)?;
    let table = open_table(dir)?;
    let mut reader = table.read_stream(&key)?;

    match path {
        Some(path) => {
            let mut dst = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            io::copy(&mut reader, &mut dst)?;
            dst.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            io::copy(&mut reader, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn cmd_list(dir: &Path, bucket: &str) -> Result<()> {
    let selector: BucketSelector = bucket.parse()?;
    let table = open_table(dir)?;
    for entry in table.list(selector)? {
        println!("{} {}", entry.base_key, entry.size);
    }
    Ok(())
}

fn cmd_stat(dir: &Path, bucket: Option<&str>, human: bool) -> Result<()> {
    let table = open_table(dir)?;
    let stats = match bucket {
        Some(b) => vec![table.stat_one(b.parse()?)?],
        None => table.stat()?,
    };
    for stat in stats {
        println!("{}", format_stat(&stat, human));
    }
    Ok(())
}

/// One stat line per shard. The percentage is size-over-free, capped at
/// 100 when the shard is full.
fn format_stat(stat: &BucketStat, human: bool) -> String {
    let perc = if stat.free > 0 {
        (stat.size as f64 / stat.free as f64) * 100.0
    } else {
        100.0
    };
    if human {
        format!(
            "[{:03}] size: {}, free: {} ({:.1}%)",
            stat.index,
            keys::human_size(stat.size),
            keys::human_size(stat.free),
            perc
        )
    } else {
        format!(
            "[{:03}] size: {}, free: {} ({:.1}%)",
            stat.index, stat.size, stat.free, perc
        )
    }
}

fn cmd_compact(dir: &Path) -> Result<()> {
    let root = keys::coerce_table_path(dir);
    let entries = std::fs::read_dir(&root)
        .with_context(|| format!("failed to read table at {}", root.display()))?;

    let mut repaired = 0usize;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(index) = name.to_str().and_then(keys::parse_sbucket_name) else {
            continue; // the reference-id file, among others
        };
        let path = entry.path();
        RocksEngine::repair(&path)
            .with_context(|| format!("repair failed for bucket {index:03}"))?;
        repaired += 1;
    }
    println!("repaired {repaired} bucket(s)");
    Ok(())
}
