mod database;
mod error;
mod ingest;
mod media;
mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::database::query::{ListFilter, MediaEntry, PageRequest, DEFAULT_PER_PAGE};
use crate::database::repo::{Catalog, MediaFile};
use crate::ingest::sweep::{Sweep, SweepReport};
use crate::media::kind::{parse_extension_list, MediaKind};
use crate::media::NativeMetadataReader;
use crate::utils::config::{save_to_env, IndexerConfig};
use crate::utils::paths::resolve_under_root;

#[derive(Parser, Debug)]
#[command(author, version, about = "Index images and videos under a root folder into a tagged catalog", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "media-index.db")]
    db_path: PathBuf,

    /// KEY=VALUE settings file; process environment overrides it.
    #[arg(short, long, default_value = ".env")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sweep over the root.
    Scan(ScanArgs),
    /// Run a sweep every `--every` seconds, one at a time.
    Schedule {
        #[command(flatten)]
        scan: ScanArgs,

        #[arg(long, default_value_t = 3600)]
        every: u64,
    },
    /// List catalog entries as JSON.
    List(ListArgs),
    /// Show one entry by id, checksum or filename.
    Show {
        id: Option<i64>,

        #[arg(long, conflicts_with = "id")]
        checksum: Option<String>,

        #[arg(long, conflicts_with_all = ["id", "checksum"])]
        filename: Option<String>,
    },
    /// Print the absolute location of an entry, refusing paths that escape the root.
    Resolve { id: i64 },
    /// Forget the stored checksum of a path so the next sweep recomputes it.
    Rehash { path: String },
    /// List tags with file counts.
    Tags {
        /// Delete tags no file links to first.
        #[arg(long)]
        prune: bool,
    },
    /// Print the effective configuration.
    Config {
        /// Write it back to the config file.
        #[arg(long)]
        save: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct ScanArgs {
    #[arg(short, long)]
    root: Option<String>,

    /// Extra extensions, separated by commas, pipes or spaces.
    #[arg(short, long)]
    extensions: Option<String>,

    #[arg(short, long)]
    workers: Option<usize>,

    /// Recompute checksums even when one is stored.
    #[arg(long)]
    rehash: bool,

    #[arg(long)]
    progress: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct ListArgs {
    /// image, video or both, comma separated.
    #[arg(long)]
    kind: Option<String>,

    #[arg(long)]
    ext: Option<String>,

    #[arg(long)]
    folder: Option<String>,

    #[arg(long)]
    tags: Option<String>,

    /// Substring of filename or path.
    #[arg(short, long)]
    q: Option<String>,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    run(Cli::parse())
}

/// Only the commands that sweep or resolve paths load the config file.
fn run(cli: Cli) -> Result<()> {
    let load_config = || IndexerConfig::load(&cli.config);

    match cli.command {
        Command::Scan(args) => {
            let mut config = load_config()?;
            apply_scan_args(&mut config, &args);
            let catalog = open_catalog(&cli.db_path)?;
            let report = build_sweep(config, Arc::clone(&catalog), args.progress)?.run();
            info!("Catalog now holds {} files", catalog.count()?);
            print_json(&report)?;
        }
        Command::Schedule { scan, every } => {
            let mut config = load_config()?;
            apply_scan_args(&mut config, &scan);
            let catalog = open_catalog(&cli.db_path)?;
            let interval = Duration::from_secs(every.max(1));
            info!("Sweeping {} every {:?}", config.root, interval);
            loop {
                let sweep = build_sweep(config.clone(), Arc::clone(&catalog), scan.progress)?;
                log_report(&sweep.run());
                thread::sleep(interval);
            }
        }
        Command::List(args) => {
            let catalog = open_catalog(&cli.db_path)?;
            let filter = list_filter(&args)?;
            let page = catalog.list(&filter, PageRequest::new(args.page, args.per_page))?;
            print_json(&page)?;
        }
        Command::Show {
            id,
            checksum,
            filename,
        } => {
            let catalog = open_catalog(&cli.db_path)?;
            let file = match (id, checksum, filename) {
                (Some(id), _, _) => catalog.get(id)?,
                (None, Some(sum), _) => catalog.get_by_checksum(&sum)?,
                (None, None, Some(name)) => catalog.get_by_filename(&name)?,
                (None, None, None) => bail!("pass an id, --checksum or --filename"),
            };
            let file = file.ok_or_else(|| anyhow!("no such media file"))?;
            print_json(&entry(&catalog, file)?)?;
        }
        Command::Resolve { id } => {
            let catalog = open_catalog(&cli.db_path)?;
            let file = catalog.get(id)?.ok_or_else(|| anyhow!("no media file with id {}", id))?;
            let config = load_config()?;
            let root = config.root.trim();
            if root.is_empty() {
                bail!("no media root configured");
            }
            let resolved = resolve_under_root(Path::new(root), &file.path)?;
            println!("{}", resolved.display());
        }
        Command::Rehash { path } => {
            let catalog = open_catalog(&cli.db_path)?;
            if !catalog.clear_checksum(&path)? {
                bail!("no media file at {:?}", path);
            }
            info!("Checksum of {} will be recomputed on the next sweep", path);
        }
        Command::Tags { prune } => {
            let catalog = open_catalog(&cli.db_path)?;
            if prune {
                let removed = catalog.prune_orphan_tags()?;
                info!("Removed {} orphaned tags", removed);
            }
            print_json(&catalog.tag_counts()?)?;
        }
        Command::Config { save } => {
            let config = load_config()?;
            if save {
                save_to_env(&cli.config, &config)?;
                info!("Saved configuration to {:?}", cli.config);
            }
            print_json(&config)?;
        }
    }

    Ok(())
}

fn apply_scan_args(config: &mut IndexerConfig, args: &ScanArgs) {
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if let Some(extensions) = &args.extensions {
        config.extensions = parse_extension_list(extensions);
    }
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    if args.rehash {
        config.rehash_always = true;
    }
}

fn open_catalog(path: &Path) -> Result<Arc<Catalog>> {
    let catalog = Catalog::open(path).with_context(|| format!("Failed to open catalog {:?}", path))?;
    Ok(Arc::new(catalog))
}

fn build_sweep(config: IndexerConfig, catalog: Arc<Catalog>, progress: bool) -> Result<Sweep> {
    let reader = Arc::new(NativeMetadataReader::new(config.ffprobe.clone()));
    let sweep = Sweep::new(config, catalog, reader);
    if !progress {
        return Ok(sweep);
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {pos} files [{elapsed}]")?);
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(sweep.with_progress(bar))
}

fn log_report(report: &SweepReport) {
    if report.succeeded() {
        info!(
            "Scheduled sweep done: {} observed, {} failed",
            report.observed, report.failed
        );
    } else {
        warn!(
            "Scheduled sweep failed: {}",
            report.reason.as_deref().unwrap_or("unknown reason")
        );
    }
}

fn list_filter(args: &ListArgs) -> Result<ListFilter> {
    let kinds = split_list(args.kind.as_deref())
        .into_iter()
        .map(|k| k.parse::<MediaKind>().map_err(|e| anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;

    Ok(ListFilter {
        kinds,
        extensions: split_list(args.ext.as_deref()),
        folders: split_list(args.folder.as_deref()),
        tags: split_list(args.tags.as_deref()),
        query: args.q.clone(),
    })
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn entry(catalog: &Catalog, file: MediaFile) -> Result<MediaEntry> {
    let tags = catalog.tags_for(file.id)?;
    Ok(MediaEntry { file, tags })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_scan_overrides() {
        let cli = Cli::parse_from([
            "media-indexer",
            "--db-path",
            "x.db",
            "scan",
            "--root",
            "/srv/media",
            "--extensions",
            "rmvb|dv",
            "--workers",
            "0",
        ]);
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        let mut config = IndexerConfig::default();
        apply_scan_args(&mut config, &args);
        assert_eq!(config.root, "/srv/media");
        assert_eq!(config.extensions, vec!["rmvb", "dv"]);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_list_filter_from_args() -> Result<()> {
        let cli = Cli::parse_from([
            "media-indexer",
            "list",
            "--kind",
            "image, video",
            "--tags",
            "dog,,park",
            "-q",
            "beach",
        ]);
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        let filter = list_filter(&args)?;
        assert_eq!(filter.kinds, vec![MediaKind::Image, MediaKind::Video]);
        assert_eq!(filter.tags, vec!["dog", "park"]);
        assert_eq!(filter.query.as_deref(), Some("beach"));
        assert_eq!(args.per_page, DEFAULT_PER_PAGE);
        Ok(())
    }

    #[test]
    fn test_read_commands_ignore_a_broken_config_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let env_file = dir.path().join("indexer.env");
        std::fs::write(&env_file, "MEDIA_INDEX_WORKERS=lots\n")?;
        let db = dir.path().join("catalog.db");
        let db_arg = db.to_string_lossy().into_owned();
        let env_arg = env_file.to_string_lossy().into_owned();

        for command in [vec!["list"], vec!["tags"]] {
            let mut argv = vec!["media-indexer", "--db-path", db_arg.as_str(), "--config", env_arg.as_str()];
            argv.extend(command);
            run(Cli::parse_from(argv))?;
        }

        let config_cmd = Cli::parse_from(["media-indexer", "--config", env_arg.as_str(), "config"]);
        assert!(run(config_cmd).is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let cli = Cli::parse_from(["media-indexer", "list", "--kind", "audio"]);
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert!(list_filter(&args).is_err());
    }
}
