//! Rendering of progress events for the terminal.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use sdo_core::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
    /// Per-file chatter, shown only with `-v`.
    Detail,
}

/// Turn an event into a line of text and its tone.
pub fn render(event: &ProgressEvent) -> (Tone, String) {
    let tone = if event.is_error() {
        Tone::Error
    } else if event.is_warning() {
        Tone::Warning
    } else {
        match event {
            ProgressEvent::ResolutionStarted { .. } | ProgressEvent::RepositoryStarted { .. } => Tone::Info,
            ProgressEvent::Satisfied { .. } | ProgressEvent::PackagingComplete { .. } => Tone::Success,
            _ => Tone::Detail,
        }
    };

    let text = match event {
        ProgressEvent::ResolutionStarted { app_id } => format!("Resolving {}", app_id),
        ProgressEvent::RepositoryStarted { repo, kind } => format!("Searching {} ({})", repo, kind),
        ProgressEvent::BranchNotFound { repo } => format!("{}: no branch for this identifier", repo),
        ProgressEvent::TreeTruncated { repo } => {
            format!("{}: file listing is truncated, missing files are inconclusive", repo)
        }
        ProgressEvent::KeyFileFound { repo, path } => format!("{}: found {}", repo, path),
        ProgressEvent::KeyFileNotFound { repo } => format!("{}: no key.vdf or config.vdf", repo),
        ProgressEvent::KeyFileUnparsable { repo, path, diagnostic } => {
            format!("{}: could not parse {} ({})", repo, path, diagnostic)
        }
        ProgressEvent::KeysExtracted { repo, count } => format!("{}: {} depot keys", repo, count),
        ProgressEvent::FileFetched { repo, path } => format!("{}: fetched {}", repo, path),
        ProgressEvent::FileFetchFailed { repo, path, error } => {
            format!("{}: failed to fetch {}: {}", repo, path, error)
        }
        ProgressEvent::ManifestNameUnrecognized { repo, path } => {
            format!("{}: unrecognized manifest name {}", repo, path)
        }
        ProgressEvent::DepotSkipped { app_id, depot } => {
            format!("{}: depot {:?} is not numeric and was left out of the script", app_id, depot)
        }
        ProgressEvent::RateLimited { repo, reset_at } => match reset_at {
            Some(at) => format!("{}: rate limited until {}", repo, at.format("%H:%M:%S UTC")),
            None => format!("{}: rate limited", repo),
        },
        ProgressEvent::RepositoryFailed { repo, error } => format!("{}: {}", repo, error),
        ProgressEvent::Satisfied { repo, updated_at, .. } => match updated_at {
            Some(date) => format!("Found in {} (list last updated {})", repo, date),
            None => format!("Found in {}", repo),
        },
        ProgressEvent::Exhausted { app_id } => format!("{} was not found in any configured repository", app_id),
        ProgressEvent::PackagingComplete { path } => format!("Saved {}", path.display()),
        ProgressEvent::PackagingFailed { app_id, reason } => format!("Packaging {} failed: {}", app_id, reason),
        ProgressEvent::Cancelled { app_id } => format!("Cancelled {}", app_id),
    };

    (tone, text)
}

/// Prints events to stderr with a spinner while repositories are scanned.
pub struct Reporter {
    spinner: ProgressBar,
    verbose: bool,
}

impl Reporter {
    pub fn new(show_progress: bool, verbose: bool) -> Self {
        let spinner = if show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };

        Self { spinner, verbose }
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }

    fn print(&self, tone: Tone, text: &str) {
        let line = match tone {
            Tone::Info => format!("{}", style(text).cyan()),
            Tone::Success => format!("{}", style(text).green().bold()),
            Tone::Warning => format!("{} {}", style("Warning:").yellow(), text),
            Tone::Error => format!("{} {}", style("Error:").red(), text),
            Tone::Detail => format!("  {}", style(text).dim()),
        };
        self.spinner.suspend(|| eprintln!("{}", line));
    }
}

impl ProgressSink for Reporter {
    fn emit(&self, event: ProgressEvent) {
        let (tone, text) = render(&event);

        match &event {
            ProgressEvent::RepositoryStarted { repo, .. } => self.spinner.set_message(format!("Searching {}", repo)),
            ProgressEvent::Satisfied { .. } => self.spinner.set_message("Packaging"),
            ProgressEvent::PackagingComplete { .. } | ProgressEvent::Exhausted { .. } => self.spinner.set_message(""),
            _ => {}
        }

        if tone == Tone::Detail && !self.verbose {
            return;
        }
        self.print(tone, &text);
    }
}
