// Orchestrator Module - Walking Targets and Directory Trees
// =======================================================
// Per directory level:
// 1. List and classify entries once (directory, eligible file, ignored)
// 2. In listing order, launch one file task per eligible file on the worker
//    pool and descend into each subdirectory before continuing the scan
// 3. When the level's entries are exhausted, drain exactly one outcome per
//    launched task from the level's channel and report it
//
// The walk keeps its open levels on an explicit stack on the calling
// thread, so tree depth is bounded by the filesystem and not by any thread's
// stack. Worker threads only ever run file tasks.
//
// Sibling failures never cancel each other or the traversal. The fan-out is
// bounded by the pool size, not by the number of files in a directory.

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::vec;
use tracing::{debug, info};

use crate::progress::{self, Reporter};
use crate::task::{self, CredentialContext, Credentials, Mode, Outcome};

/// Tuning knobs for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Maximum number of file tasks running at once
    pub jobs: usize,
    /// Descend into subdirectories of directory targets
    pub recursive: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            recursive: true,
        }
    }
}

/// Aggregate result of a run or of one subtree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Entries that vanished or could not be inspected
    pub skipped: usize,
}

impl RunSummary {
    pub fn merge(&mut self, other: RunSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// True when no file task failed and nothing was skipped
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    fn record(&mut self, outcome: &Outcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

enum Entry {
    Dir(PathBuf),
    File(PathBuf),
}

/// One directory (or the target list) whose entries are being worked
/// through, together with the channel its file tasks report into.
struct Level {
    entries: vec::IntoIter<Entry>,
    tx: Sender<Outcome>,
    rx: Receiver<Outcome>,
    launched: usize,
}

impl Level {
    fn new(entries: Vec<Entry>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            entries: entries.into_iter(),
            tx,
            rx,
            launched: 0,
        }
    }
}

/// Drives file tasks over targets and directory trees in one direction.
pub struct Orchestrator {
    pool: ThreadPool,
    mode: Mode,
    options: Options,
    reporter: Reporter,
}

impl Orchestrator {
    pub fn new(mode: Mode, options: Options, reporter: Reporter) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.jobs.max(1))
            .thread_name(|i| format!("chainvault-worker-{i}"))
            .build()?;
        Ok(Self {
            pool,
            mode,
            options,
            reporter,
        })
    }

    /// Process every target supplied by the caller
    ///
    /// File targets form one batch handled like a directory level;
    /// directory targets are walked in the order given. Targets that do
    /// not exist are reported and counted as skipped.
    pub fn process_targets(&self, ctx: &CredentialContext) -> RunSummary {
        let total: usize = ctx
            .targets()
            .iter()
            .filter_map(|t| progress::count_eligible(t, self.mode, self.options.recursive).ok())
            .sum();
        self.reporter.set_total(total as u64);
        info!(targets = ctx.targets().len(), files = total, "{} started", self.mode.verb());

        let mut summary = RunSummary::default();
        let mut entries = Vec::with_capacity(ctx.targets().len());
        for target in ctx.targets() {
            match fs::metadata(target) {
                Ok(meta) if meta.is_dir() => entries.push(Entry::Dir(target.clone())),
                Ok(meta) if meta.is_file() => {
                    if self.mode.is_eligible(target) {
                        entries.push(Entry::File(target.clone()));
                    } else {
                        debug!(path = %target.display(), "ignored: wrong suffix");
                    }
                }
                Ok(_) => debug!(path = %target.display(), "ignored: not a file or directory"),
                Err(_) => {
                    self.reporter.skipped(self.mode, target, "does not exist");
                    summary.skipped += 1;
                }
            }
        }

        summary.merge(self.walk(Level::new(entries), &ctx.credentials()));
        self.reporter.finish(self.mode, &summary);
        summary
    }

    /// Process one directory and, if recursive, everything below it
    ///
    /// Returns only after every file task launched for this directory and
    /// its subdirectories has finished.
    pub fn process_tree(&self, dir: &Path, creds: &Credentials) -> RunSummary {
        let mut summary = RunSummary::default();
        if let Some(level) = self.open_level(dir, &mut summary) {
            summary.merge(self.walk(level, creds));
        }
        summary
    }

    // Depth-first over an explicit stack: the top level advances one entry
    // at a time, a directory entry pushes a new level, and an exhausted
    // level is drained and popped before its parent continues
    fn walk(&self, root: Level, creds: &Credentials) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut stack = vec![root];

        while let Some(level) = stack.last_mut() {
            match level.entries.next() {
                Some(Entry::File(path)) => {
                    self.launch(level, path, creds);
                }
                Some(Entry::Dir(dir)) => {
                    if let Some(child) = self.open_level(&dir, &mut summary) {
                        stack.push(child);
                    }
                }
                None => {
                    if let Some(done) = stack.pop() {
                        summary.merge(self.drain(done));
                    }
                }
            }
        }

        summary
    }

    // List and classify a directory once; `None` if it cannot be read
    fn open_level(&self, dir: &Path, summary: &mut RunSummary) -> Option<Level> {
        debug!(dir = %dir.display(), "entering directory");

        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(err) => {
                self.reporter
                    .skipped(self.mode, dir, &format!("cannot be opened: {err}"));
                summary.skipped += 1;
                return None;
            }
        };

        let mut entries = Vec::new();
        for entry in listing {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    self.reporter
                        .skipped(self.mode, dir, &format!("has an unreadable entry: {err}"));
                    summary.skipped += 1;
                    continue;
                }
            };
            match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() && self.options.recursive => {
                    entries.push(Entry::Dir(path))
                }
                Ok(meta) if meta.is_file() && self.mode.is_eligible(&path) => {
                    entries.push(Entry::File(path))
                }
                Ok(_) => {}
                Err(_) => {
                    self.reporter.skipped(self.mode, &path, "does not exist");
                    summary.skipped += 1;
                }
            }
        }

        Some(Level::new(entries))
    }

    fn launch(&self, level: &mut Level, path: PathBuf, creds: &Credentials) {
        let tx = level.tx.clone();
        let creds = creds.clone();
        let mode = self.mode;
        level.launched += 1;
        self.pool.spawn(move || {
            let outcome = task::process_file(&path, &creds, mode);
            // The level keeps its receiver until every outcome is drained
            let _ = tx.send(outcome);
        });
    }

    // Eligibility was decided once when the level was opened, so the number
    // of launched tasks and the number of outcomes drained always agree.
    // Each task sends as its last step, so draining all of them is waiting
    // for all of them.
    fn drain(&self, level: Level) -> RunSummary {
        let Level {
            tx, rx, launched, ..
        } = level;
        drop(tx);

        let mut summary = RunSummary::default();
        let mut drained = 0usize;
        for outcome in rx.iter().take(launched) {
            self.reporter.report(self.mode, &outcome);
            summary.record(&outcome);
            drained += 1;
        }
        debug_assert_eq!(drained, launched);

        summary
    }
}
