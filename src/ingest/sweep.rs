use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::UNIX_EPOCH;

use crossbeam::channel::bounded;
use crossbeam::queue::SegQueue;
use indicatif::ProgressBar;
use rayon::iter::{ParallelBridge, ParallelIterator};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use crate::database::repo::{Catalog, FileAttrs};
use crate::error::ScanError;
use crate::ingest::hasher::{calculate_hash, needs_checksum};
use crate::ingest::scanner::{self, Candidate, WalkOutcome};
use crate::media::kind::{ExtensionFilter, MediaKind};
use crate::media::metadata::{self, normalize_tags, MetadataReader};
use crate::utils::config::IndexerConfig;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepState {
    Idle,
    Validating,
    Walking,
    Pruning,
    Done,
    Failed,
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SweepState::Idle => "idle",
            SweepState::Validating => "validating",
            SweepState::Walking => "walking",
            SweepState::Pruning => "pruning",
            SweepState::Done => "done",
            SweepState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a sweep did. `state` is `Done` or `Failed`; `reason` explains the
/// latter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub state: SweepState,
    pub reason: Option<String>,
    /// Paths that passed the extension filter.
    pub observed: usize,
    pub indexed: usize,
    pub failed: usize,
    pub checksums_computed: usize,
    /// Files indexed without a fresh checksum because hashing failed.
    pub hash_failures: usize,
    pub walk_errors: usize,
    /// `None` when pruning did not run.
    pub pruned: Option<usize>,
}

impl SweepReport {
    fn new() -> Self {
        Self {
            state: SweepState::Idle,
            reason: None,
            observed: 0,
            indexed: 0,
            failed: 0,
            checksums_computed: 0,
            hash_failures: 0,
            walk_errors: 0,
            pruned: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == SweepState::Done
    }
}

#[derive(Default)]
struct Counters {
    indexed: AtomicUsize,
    failed: AtomicUsize,
    checksums: AtomicUsize,
    hash_failures: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChecksumStep {
    Skipped,
    Computed,
    Failed,
}

/// One full pass over the configured root: validate, walk and index every
/// allowed file, then prune rows for files that are gone.
pub struct Sweep {
    config: IndexerConfig,
    catalog: Arc<Catalog>,
    reader: Arc<dyn MetadataReader>,
    progress: Option<ProgressBar>,
}

impl Sweep {
    pub fn new(config: IndexerConfig, catalog: Arc<Catalog>, reader: Arc<dyn MetadataReader>) -> Self {
        Self {
            config,
            catalog,
            reader,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs the sweep to completion. Errors never escape; they end up in
    /// the report and the log.
    pub fn run(&self) -> SweepReport {
        let span = info_span!("sweep", root = %self.config.root);
        let _enter = span.enter();

        let mut report = SweepReport::new();

        transition(&mut report, SweepState::Validating);
        let root = match self.validate() {
            Ok(root) => root,
            Err(e) => {
                warn!("Aborting sweep: {}", e);
                return fail(report, e);
            }
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.walk_and_prune(&root, &mut report)));
        let result = result.unwrap_or_else(|payload| Err(ScanError::Fatal(panic_message(payload))));

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        match result {
            Ok(()) => {
                transition(&mut report, SweepState::Done);
                info!(
                    "Sweep finished; tracked {} files ({} indexed, {} failed, {} checksums, {} pruned)",
                    report.observed,
                    report.indexed,
                    report.failed,
                    report.checksums_computed,
                    report.pruned.unwrap_or(0)
                );
                report
            }
            Err(e) => {
                error!("Sweep failed in state {}: {:?}", report.state, e);
                fail(report, e)
            }
        }
    }

    fn validate(&self) -> Result<PathBuf, ScanError> {
        if !self.config.enabled {
            return Err(ScanError::Configuration("media indexing is disabled".into()));
        }
        let root = self.config.root.trim();
        if root.is_empty() {
            return Err(ScanError::Configuration("root path is blank".into()));
        }
        let root = PathBuf::from(root);
        if !root.is_dir() {
            return Err(ScanError::Configuration(format!(
                "root path {:?} is not a directory",
                root
            )));
        }
        Ok(root)
    }

    fn walk_and_prune(&self, root: &Path, report: &mut SweepReport) -> Result<(), ScanError> {
        transition(report, SweepState::Walking);
        let filter = ExtensionFilter::new(&self.config.extensions);
        info!("Sweep starting at {:?}, {} extensions", root, filter.len());

        let observed = SegQueue::new();
        let counters = Counters::default();
        let outcome = self.walk(root, &filter, &observed, &counters)?;

        report.observed = observed.len();
        report.indexed = counters.indexed.load(Ordering::Relaxed);
        report.failed = counters.failed.load(Ordering::Relaxed);
        report.checksums_computed = counters.checksums.load(Ordering::Relaxed);
        report.hash_failures = counters.hash_failures.load(Ordering::Relaxed);
        report.walk_errors = outcome.errors;
        debug!("Walker handed out {} candidates", outcome.candidates);

        if !outcome.is_complete() {
            warn!(
                "Walk incomplete ({} errors); skipping prune so unvisited files keep their rows",
                outcome.errors
            );
            return Ok(());
        }

        transition(report, SweepState::Pruning);
        let observed: HashSet<String> = std::iter::from_fn(|| observed.pop()).collect();
        let pruned = self.catalog.prune("", &observed)?;
        if pruned > 0 {
            info!("Removed {} entries for files that disappeared", pruned);
        }
        report.pruned = Some(pruned);
        Ok(())
    }

    /// The walker thread feeds a bounded channel; a bounded rayon pool
    /// drains it.
    fn walk(
        &self,
        root: &Path,
        filter: &ExtensionFilter,
        observed: &SegQueue<String>,
        counters: &Counters,
    ) -> Result<WalkOutcome, ScanError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .thread_name(|i| format!("sweep-worker-{}", i))
            .build()
            .map_err(|e| ScanError::Fatal(format!("failed to build worker pool: {}", e)))?;

        let (tx, rx) = bounded::<Candidate>(CHANNEL_CAPACITY);

        thread::scope(|s| {
            let walker = s.spawn(move || scanner::scan_directory(root, filter, tx));

            pool.install(|| {
                rx.into_iter().par_bridge().for_each(|candidate| {
                    // Observed before any I/O: a transient failure below must
                    // not get an existing row pruned.
                    observed.push(candidate.relative.clone());
                    self.index_candidate(&candidate, counters);
                });
            });

            walker
                .join()
                .map_err(|payload| ScanError::Fatal(panic_message(payload)))
        })
    }

    fn index_candidate(&self, candidate: &Candidate, counters: &Counters) {
        match self.index_file(candidate) {
            Ok(step) => {
                counters.indexed.fetch_add(1, Ordering::Relaxed);
                match step {
                    ChecksumStep::Computed => counters.checksums.fetch_add(1, Ordering::Relaxed),
                    ChecksumStep::Failed => counters.hash_failures.fetch_add(1, Ordering::Relaxed),
                    ChecksumStep::Skipped => 0,
                };
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping {}: {}", candidate.relative, e);
            }
        }
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
    }

    /// Stat, hash if needed, extract tags, upsert, relink tags. A failed hash
    /// keeps whatever checksum the row already had.
    fn index_file(&self, candidate: &Candidate) -> Result<ChecksumStep, ScanError> {
        let stat = fs::metadata(&candidate.path).map_err(|e| ScanError::file(&candidate.path, e))?;
        let kind = MediaKind::from_extension(&candidate.extension);

        let existing = self.catalog.find_by_path(&candidate.relative)?;
        let (checksum, step) = if needs_checksum(existing.as_ref(), self.config.rehash_always) {
            match calculate_hash(&candidate.path) {
                Ok(sum) => (Some(sum), ChecksumStep::Computed),
                Err(e) => {
                    warn!("Checksum failed for {}: {}", candidate.relative, e);
                    (None, ChecksumStep::Failed)
                }
            }
        } else {
            (None, ChecksumStep::Skipped)
        };

        let keywords = metadata::extract(self.reader.as_ref(), &candidate.path, kind);
        let tags = normalize_tags(&keywords);

        let attrs = FileAttrs {
            filename: candidate.filename.clone(),
            extension: candidate.extension.clone(),
            kind,
            size: stat.len(),
            checksum,
            raw_keywords: (!keywords.is_empty()).then(|| keywords.join("|")),
            mtime: stat
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
        };

        let file = self.catalog.upsert(&candidate.relative, &attrs)?;
        self.catalog.replace_tags(file.id, &tags)?;
        debug!("Indexed {} as {} with {} tags", file.path, kind, tags.len());
        Ok(step)
    }
}

fn transition(report: &mut SweepReport, next: SweepState) {
    debug!("Sweep state {} -> {}", report.state, next);
    report.state = next;
}

fn fail(mut report: SweepReport, e: ScanError) -> SweepReport {
    transition(&mut report, SweepState::Failed);
    report.reason = Some(e.to_string());
    report
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::metadata::{MetadataFields, MetadataValue};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves canned metadata by filename and counts reads.
    #[derive(Default)]
    struct FakeReader {
        fields: HashMap<String, MetadataFields>,
        reads: Mutex<usize>,
    }

    impl FakeReader {
        fn with(mut self, filename: &str, name: &str, value: MetadataValue) -> Self {
            self.fields
                .entry(filename.to_string())
                .or_default()
                .push(name, value);
            self
        }
    }

    impl MetadataReader for FakeReader {
        fn read(&self, path: &Path, _kind: MediaKind) -> Result<MetadataFields, ScanError> {
            if let Ok(mut reads) = self.reads.lock() {
                *reads += 1;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            self.fields.get(name).cloned().ok_or_else(|| ScanError::MetadataRead {
                path: path.to_path_buf(),
                reason: "no metadata".into(),
            })
        }
    }

    fn config(root: &Path) -> IndexerConfig {
        IndexerConfig {
            root: root.to_string_lossy().into_owned(),
            workers: 2,
            ..IndexerConfig::default()
        }
    }

    fn sweep(root: &Path, catalog: &Arc<Catalog>, reader: FakeReader) -> SweepReport {
        Sweep::new(config(root), Arc::clone(catalog), Arc::new(reader)).run()
    }

    fn text(value: &str) -> MetadataValue {
        MetadataValue::Text(value.to_string())
    }

    #[test]
    fn test_scenario_a_images_and_videos_with_keywords() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("a.jpg"), b"jpeg bytes")?;
        fs::write(dir.path().join("b.mp4"), b"mp4 bytes")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);
        let reader = FakeReader::default().with("b.mp4", "keywords", text("dog;park"));

        let report = sweep(dir.path(), &catalog, reader);

        assert_eq!(report.state, SweepState::Done);
        assert_eq!(report.observed, 2);
        assert_eq!(report.indexed, 2);
        assert_eq!(catalog.count()?, 2);

        let a = catalog.find_by_path("a.jpg")?.expect("a.jpg indexed");
        let b = catalog.find_by_path("b.mp4")?.expect("b.mp4 indexed");
        assert_eq!(a.kind, MediaKind::Image);
        assert_eq!(b.kind, MediaKind::Video);
        assert!(catalog.tags_for(a.id)?.is_empty());
        assert_eq!(catalog.tags_for(b.id)?, vec!["dog", "park"]);
        assert_eq!(b.raw_keywords.as_deref(), Some("dog|park"));
        assert_eq!(b.size, 9);
        assert!(a.has_checksum() && b.has_checksum());
        Ok(())
    }

    #[test]
    fn test_scenario_b_deleted_file_is_pruned_and_tag_orphaned() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let c = dir.path().join("c.png");
        fs::write(&c, b"png bytes")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);

        let reader = FakeReader::default().with("c.png", "XPKeywords", text("Lonely"));
        assert!(sweep(dir.path(), &catalog, reader).succeeded());
        assert!(catalog.find_by_path("c.png")?.is_some());

        fs::remove_file(&c)?;
        let report = sweep(dir.path(), &catalog, FakeReader::default());

        assert!(report.succeeded());
        assert_eq!(report.pruned, Some(1));
        assert!(catalog.find_by_path("c.png")?.is_none());
        let tags = catalog.tag_counts()?;
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "lonely");
        assert_eq!(tags[0].files, 0);
        Ok(())
    }

    #[test]
    fn test_scenario_c_blank_root_fails_without_touching_catalog() -> anyhow::Result<()> {
        let catalog = Arc::new(Catalog::open_in_memory()?);
        let reader = Arc::new(FakeReader::default());
        let cfg = IndexerConfig {
            root: "   ".into(),
            ..IndexerConfig::default()
        };

        let report = Sweep::new(cfg, Arc::clone(&catalog), reader.clone()).run();

        assert_eq!(report.state, SweepState::Failed);
        assert!(report.reason.as_deref().is_some_and(|r| r.contains("blank")));
        assert_eq!(report.pruned, None);
        assert_eq!(catalog.count()?, 0);
        assert_eq!(*reader.reads.lock().expect("lock"), 0);
        Ok(())
    }

    #[test]
    fn test_disabled_or_missing_root_is_a_configuration_failure() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let catalog = Arc::new(Catalog::open_in_memory()?);

        let disabled = IndexerConfig {
            enabled: false,
            ..config(dir.path())
        };
        let report = Sweep::new(disabled, Arc::clone(&catalog), Arc::new(FakeReader::default())).run();
        assert_eq!(report.state, SweepState::Failed);

        let missing = config(&dir.path().join("nope"));
        let report = Sweep::new(missing, Arc::clone(&catalog), Arc::new(FakeReader::default())).run();
        assert_eq!(report.state, SweepState::Failed);
        assert!(report.reason.as_deref().is_some_and(|r| r.contains("not a directory")));
        Ok(())
    }

    #[test]
    fn test_resweep_is_unique_and_skips_disallowed_extensions() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("nested/deeper"))?;
        fs::write(dir.path().join("one.PNG"), b"1")?;
        fs::write(dir.path().join("nested/two.mkv"), b"2")?;
        fs::write(dir.path().join("nested/deeper/three.webp"), b"3")?;
        fs::write(dir.path().join("nested/notes.txt"), b"no")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);

        sweep(dir.path(), &catalog, FakeReader::default());
        let report = sweep(dir.path(), &catalog, FakeReader::default());

        assert!(report.succeeded());
        assert_eq!(report.pruned, Some(0));
        assert_eq!(catalog.count()?, 3);
        assert!(catalog.find_by_path("nested/notes.txt")?.is_none());
        let one = catalog.find_by_path("one.PNG")?.expect("indexed");
        assert_eq!(one.kind, MediaKind::Image);
        assert_eq!(one.extension, "png");
        assert_eq!(
            catalog.find_by_path("nested/two.mkv")?.map(|f| f.kind),
            Some(MediaKind::Video)
        );
        Ok(())
    }

    #[test]
    fn test_checksum_is_computed_once_unless_cleared() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("clip.mov");
        fs::write(&file, b"original")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);

        let first = sweep(dir.path(), &catalog, FakeReader::default());
        assert_eq!(first.checksums_computed, 1);
        let original = catalog.find_by_path("clip.mov")?.and_then(|f| f.checksum);

        // Content changes but the stored checksum is trusted; size follows.
        fs::write(&file, b"changed contents")?;
        let second = sweep(dir.path(), &catalog, FakeReader::default());
        assert_eq!(second.checksums_computed, 0);
        let row = catalog.find_by_path("clip.mov")?.expect("indexed");
        assert_eq!(row.checksum, original);
        assert_eq!(row.size, 16);

        catalog.clear_checksum("clip.mov")?;
        let third = sweep(dir.path(), &catalog, FakeReader::default());
        assert_eq!(third.checksums_computed, 1);
        let row = catalog.find_by_path("clip.mov")?.expect("indexed");
        assert_eq!(row.checksum, Some(calculate_hash(&file)?));
        assert_ne!(row.checksum, original);
        Ok(())
    }

    #[test]
    fn test_rehash_always_recomputes() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("clip.mov");
        fs::write(&file, b"original")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);
        sweep(dir.path(), &catalog, FakeReader::default());

        fs::write(&file, b"changed")?;
        let cfg = IndexerConfig {
            rehash_always: true,
            ..config(dir.path())
        };
        let report = Sweep::new(cfg, Arc::clone(&catalog), Arc::new(FakeReader::default())).run();
        assert_eq!(report.checksums_computed, 1);
        let row = catalog.find_by_path("clip.mov")?.expect("indexed");
        assert_eq!(row.checksum, Some(calculate_hash(&file)?));
        Ok(())
    }

    #[test]
    fn test_empty_extraction_keeps_previous_tags() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("d.jpg"), b"d")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);

        let tagged = FakeReader::default().with(
            "d.jpg",
            "Keywords",
            MetadataValue::List(vec!["Sunset".into(), "beach".into(), "OCEAN".into()]),
        );
        sweep(dir.path(), &catalog, tagged);
        let id = catalog.find_by_path("d.jpg")?.expect("indexed").id;
        assert_eq!(catalog.tags_for(id)?, vec!["beach", "ocean", "sunset"]);

        sweep(dir.path(), &catalog, FakeReader::default());
        assert_eq!(catalog.tags_for(id)?, vec!["beach", "ocean", "sunset"]);
        let row = catalog.find_by_path("d.jpg")?.expect("indexed");
        assert_eq!(row.raw_keywords, None);
        Ok(())
    }

    #[test]
    fn test_many_files_across_workers() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        for i in 0..40 {
            let sub = dir.path().join(format!("d{}", i % 5));
            fs::create_dir_all(&sub)?;
            fs::write(sub.join(format!("f{}.jpg", i)), format!("file {}", i))?;
        }
        let catalog = Arc::new(Catalog::open_in_memory()?);
        let cfg = IndexerConfig {
            workers: 4,
            ..config(dir.path())
        };

        let report = Sweep::new(cfg, Arc::clone(&catalog), Arc::new(FakeReader::default())).run();

        assert!(report.succeeded());
        assert_eq!(report.observed, 40);
        assert_eq!(report.indexed, 40);
        assert_eq!(catalog.count()?, 40);
        Ok(())
    }

    #[test]
    fn test_dot_prefixed_files_and_folders_are_indexed() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join(".albums"))?;
        fs::write(dir.path().join(".albums/x.jpg"), b"x")?;
        fs::write(dir.path().join(".dot.png"), b"d")?;
        fs::write(dir.path().join("plain.jpg"), b"p")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);

        let report = sweep(dir.path(), &catalog, FakeReader::default());

        assert!(report.succeeded());
        assert_eq!(report.observed, 3);
        assert_eq!(catalog.count()?, 3);
        assert!(catalog.find_by_path(".albums/x.jpg")?.is_some());
        assert!(catalog.find_by_path(".dot.png")?.is_some());
        Ok(())
    }

    #[test]
    fn test_persistence_failure_skips_one_file_and_keeps_its_row() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("good.jpg"), b"g")?;
        fs::write(dir.path().join("bad.jpg"), b"b")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);
        sweep(dir.path(), &catalog, FakeReader::default());
        let before = catalog.find_by_path("bad.jpg")?.expect("indexed");

        catalog.lock()?.execute_batch(
            "CREATE TRIGGER reject_bad BEFORE UPDATE ON media_files
             WHEN OLD.path = 'bad.jpg'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )?;
        fs::write(dir.path().join("bad.jpg"), b"bigger now")?;
        let report = sweep(dir.path(), &catalog, FakeReader::default());

        assert!(report.succeeded());
        assert_eq!(report.observed, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pruned, Some(0));
        let after = catalog.find_by_path("bad.jpg")?.expect("row kept");
        assert_eq!(after.size, before.size);
        assert_eq!(after.checksum, before.checksum);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_keeps_row_and_checksum() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let file = dir.path().join("locked.jpg");
        fs::write(&file, b"secret")?;
        fs::write(dir.path().join("open.jpg"), b"open")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);
        sweep(dir.path(), &catalog, FakeReader::default());
        let stored = catalog.find_by_path("locked.jpg")?.and_then(|f| f.checksum);
        assert!(stored.is_some());

        fs::set_permissions(&file, fs::Permissions::from_mode(0o000))?;
        if fs::File::open(&file).is_ok() {
            // Permission bits do not bind a privileged user.
            fs::set_permissions(&file, fs::Permissions::from_mode(0o644))?;
            return Ok(());
        }
        let cfg = IndexerConfig {
            rehash_always: true,
            ..config(dir.path())
        };
        let report = Sweep::new(cfg, Arc::clone(&catalog), Arc::new(FakeReader::default())).run();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644))?;

        assert!(report.succeeded());
        assert_eq!(report.hash_failures, 1);
        assert_eq!(report.checksums_computed, 1);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.pruned, Some(0));
        let row = catalog.find_by_path("locked.jpg")?.expect("row kept");
        assert_eq!(row.checksum, stored);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_folder_skips_prune() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let locked = dir.path().join("locked");
        fs::create_dir_all(&locked)?;
        fs::write(locked.join("kept.jpg"), b"k")?;
        fs::write(dir.path().join("gone.jpg"), b"g")?;
        let catalog = Arc::new(Catalog::open_in_memory()?);
        let first = sweep(dir.path(), &catalog, FakeReader::default());
        assert_eq!(first.indexed, 2);

        fs::remove_file(dir.path().join("gone.jpg"))?;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;
            return Ok(());
        }
        let report = sweep(dir.path(), &catalog, FakeReader::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

        assert!(report.succeeded());
        assert!(report.walk_errors >= 1);
        assert_eq!(report.pruned, None);
        assert!(catalog.find_by_path("locked/kept.jpg")?.is_some());
        assert!(catalog.find_by_path("gone.jpg")?.is_some());
        Ok(())
    }
}
