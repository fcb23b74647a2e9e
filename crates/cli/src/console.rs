use std::io::{self, Write};
use std::time::Duration;

use cachelift_core::RemoteConfig;
use cachelift_pipeline::{MigrationSummary, ProgressSnapshot};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};

use crate::cli::CliArgs;

struct Colors;

impl Colors {
    const HEADER: Color = Color::Magenta;
    const PROGRESS: Color = Color::Cyan;
    const DONE: Color = Color::Green;
    const DIM: Color = Color::DarkGrey;
}

const SEPARATOR: &str = "   ********************************   ";

/// Operator-facing output on stdout. Diagnostics go through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Console;

impl Console {
    pub fn banner(&self, args: &CliArgs) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("cachelift"),
            ResetColor,
            Print(format!(
                " - loading cache {} from {}\n",
                args.cache,
                args.location.display()
            )),
            SetForegroundColor(Colors::DIM),
            Print(format!(
                "Data directory name: {} | Index directory name: {}\n",
                args.data_dir_name.as_deref().unwrap_or("data"),
                args.index_dir_name.as_deref().unwrap_or("index"),
            )),
            ResetColor,
        )?;
        if args.rebuild_index_only {
            self.info("Skipping remote transfer, only rebuilding the index if required")?;
        }
        stdout.flush()
    }

    pub fn section(&self, title: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("\n{SEPARATOR}\n\n")),
            ResetColor,
            Print(format!("{title}\n")),
        )?;
        stdout.flush()
    }

    pub fn info(&self, msg: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{msg}\n")),
            ResetColor,
        )?;
        stdout.flush()
    }

    pub fn connecting(&self, config: &RemoteConfig) -> io::Result<()> {
        self.section("Connecting to the remote store first, so no time is spent loading data if it is unreachable")?;
        self.info(&format!(
            "Remote: {} (profile {})",
            config.redacted_url(),
            config.profile_label()
        ))
    }

    pub fn store_opened(&self, elapsed: Duration, entries: u64) -> io::Result<()> {
        self.info(&format!(
            "Cache started in {} ms containing {} entries",
            elapsed.as_millis(),
            entries
        ))
    }

    /// Sink for index rebuild progress. Prints nothing when no rebuild ran.
    pub fn index_progress(&self, snapshot: &ProgressSnapshot) {
        if snapshot.completed == 0 {
            return;
        }
        let line = if snapshot.is_final {
            format!("index rebuilt from {} records", snapshot.completed)
        } else {
            format!("indexed {} records", snapshot.completed)
        };
        self.progress_line(&line).ok();
    }

    /// Sink for insert progress: one line per tick.
    pub fn transfer_progress(&self, snapshot: &ProgressSnapshot) {
        if !snapshot.is_final {
            self.progress_line(&snapshot.to_string()).ok();
        }
    }

    fn progress_line(&self, line: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::PROGRESS),
            Print(format!("{line}\n")),
            ResetColor,
        )?;
        stdout.flush()
    }

    pub fn transfer_complete(&self, summary: &MigrationSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DONE),
            Print(format!(
                "Loading complete... loaded {} entries ({} inserted, {} already present) in {} ms\n",
                summary.total_completed,
                summary.inserted,
                summary.already_present,
                summary.elapsed.as_millis()
            )),
            ResetColor,
            SetForegroundColor(Colors::DIM),
            Print(format!("\n{SEPARATOR}\n")),
            ResetColor,
        )?;
        stdout.flush()
    }
}
