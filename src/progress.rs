// Progress Module - Console Reporting for File Tasks
// =======================================================
// The reporter owns the progress bar that counts finished file tasks and
// prints one human-readable line per outcome above it. It also provides the
// upfront count of eligible files used to size the bar.
//
// The bar is hidden in quiet mode and in tests; outcome lines still go to
// stdout (successes only when not quiet). Diagnostics for the same events
// are `tracing` events on stderr and are filtered separately.

use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::orchestrator::RunSummary;
use crate::task::{Mode, Outcome};

/// Console reporter shared by every level of a run.
///
/// Cloning is cheap: clones draw on the same bar.
#[derive(Clone)]
pub struct Reporter {
    bar: ProgressBar,
    quiet: bool,
}

impl Reporter {
    /// Create a reporter with a visible progress bar unless `quiet`
    pub fn new(quiet: bool) -> Self {
        if quiet {
            return Self::hidden();
        }

        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files | ETA: {eta} | {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(Duration::from_millis(500));
        Self { bar, quiet }
    }

    /// A reporter with no bar and no success lines
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            quiet: true,
        }
    }

    pub fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }

    /// Print one outcome and advance the bar
    ///
    /// Failures are always printed; successes only when not quiet.
    pub fn report(&self, mode: Mode, outcome: &Outcome) {
        match &outcome.result {
            Ok(output) => {
                if !self.quiet {
                    self.bar.suspend(|| {
                        println!(
                            "- Success {} : {} : result in {}",
                            mode.verb(),
                            outcome.source.display(),
                            output.display()
                        )
                    });
                }
            }
            Err(err) => {
                self.bar
                    .suspend(|| println!("- Failure {} : {err}", mode.verb()));
            }
        }

        if let Some(name) = outcome.source.file_name() {
            self.bar.set_message(name.to_string_lossy().to_string());
        }
        self.bar.inc(1);
    }

    /// An entry that could not be used; never fatal.
    pub fn skipped(&self, mode: Mode, path: &Path, reason: &str) {
        warn!(path = %path.display(), "skipped: {reason}");
        self.bar.suspend(|| {
            println!("- Failure {} : {} {reason}", mode.verb(), path.display())
        });
    }

    /// Clear the bar and print the run totals
    pub fn finish(&self, mode: Mode, summary: &RunSummary) {
        self.bar.finish_and_clear();
        if !self.quiet {
            println!(
                "{} complete! {} succeeded, {} failed, {} skipped in {:.2} seconds",
                mode.verb(),
                summary.succeeded,
                summary.failed,
                summary.skipped,
                self.bar.elapsed().as_secs_f64()
            );
        }
    }
}

/// Count the files under `path` that the given mode would process
///
/// A file path counts as 1 or 0. For a directory, entries that cannot be
/// inspected are ignored; subdirectories are descended only if `recursive`.
/// Directories waiting to be listed sit on a heap stack, so any depth the
/// filesystem allows can be counted.
///
/// Parameters:
/// - path: File or directory to count
/// - mode: Decides which files are eligible
/// - recursive: Whether to include subdirectories
pub fn count_eligible(path: &Path, mode: Mode, recursive: bool) -> Result<usize, io::Error> {
    let metadata = fs::metadata(path)?;
    if metadata.is_file() {
        return Ok(usize::from(mode.is_eligible(path)));
    }

    let mut count = 0;
    let mut pending = vec![path.to_path_buf()];
    let mut top = true;

    while let Some(dir) = pending.pop() {
        // Only the starting directory has to be readable
        let listing = match fs::read_dir(&dir) {
            Ok(listing) => listing,
            Err(err) if top => return Err(err),
            Err(_) => continue,
        };
        top = false;

        for entry in listing {
            let Ok(entry) = entry else { continue };
            let entry_path = entry.path();
            let Ok(metadata) = fs::metadata(&entry_path) else {
                continue;
            };

            if metadata.is_file() && mode.is_eligible(&entry_path) {
                count += 1;
            } else if metadata.is_dir() && recursive {
                pending.push(entry_path);
            }
        }
    }

    Ok(count)
}
