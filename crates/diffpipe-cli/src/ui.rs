//! Text rendering for the wizard: panels, tables, status lines, spinner

use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use diffpipe_core::training::{LaunchObserver, LaunchStep};
use diffpipe_core::{DownloadObserver, DownloadOutcome, DownloadPlan};

/// Console output for the wizard
pub struct Ui {
    out: Box<dyn Write>,
    interactive: bool,
}

impl Ui {
    pub fn stdout() -> Self {
        use std::io::IsTerminal;
        let interactive = io::stdout().is_terminal();
        Self {
            out: Box::new(io::stdout()),
            interactive,
        }
    }

    pub fn with_writer(out: Box<dyn Write>) -> Self {
        Self {
            out,
            interactive: false,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn clear(&mut self) -> io::Result<()> {
        if self.interactive {
            crossterm::execute!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        }
        Ok(())
    }

    pub fn blank(&mut self) -> io::Result<()> {
        writeln!(self.out)
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "{}", text.as_ref())
    }

    pub fn success(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "✓ {}", text.as_ref())
    }

    pub fn warn(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "⚠ {}", text.as_ref())
    }

    pub fn error(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "✗ {}", text.as_ref())
    }

    /// Boxed block of text
    pub fn panel(&mut self, lines: &[String]) -> io::Result<()> {
        writeln!(self.out, "{}", render_panel(lines))
    }

    pub fn table(&mut self, title: Option<&str>, columns: &[Column], rows: &[Vec<String>]) -> io::Result<()> {
        writeln!(self.out, "{}", render_table(title, columns, rows))
    }

    /// Spinner for the download, hidden when output is not a terminal
    pub fn download_spinner(&self) -> DownloadSpinner {
        DownloadSpinner::new(self.is_interactive())
    }
}

/// A table column: header and minimum width
pub struct Column {
    pub header: &'static str,
    pub width: usize,
}

impl Column {
    pub const fn new(header: &'static str, width: usize) -> Self {
        Self { header, width }
    }
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

pub fn render_panel(lines: &[String]) -> String {
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let mut out = format!("╭{}╮\n", "─".repeat(width + 2));
    for line in lines {
        out.push_str(&format!("│ {} │\n", pad(line, width)));
    }
    out.push_str(&format!("╰{}╯", "─".repeat(width + 2)));
    out
}

pub fn render_table(title: Option<&str>, columns: &[Column], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|cell| cell.chars().count())
                .chain([c.header.chars().count(), c.width])
                .max()
                .unwrap_or(c.width)
        })
        .collect();

    let rule = |left: &str, mid: &str, right: &str| {
        let parts: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{}{}{}", left, parts.join(mid), right)
    };
    let row = |cells: Vec<&str>| {
        let parts: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, w)| format!(" {} ", pad(cells.get(i).copied().unwrap_or(""), *w)))
            .collect();
        format!("│{}│", parts.join("│"))
    };

    let mut lines = Vec::new();
    if let Some(title) = title {
        let total = widths.iter().map(|w| w + 3).sum::<usize>() + 1;
        let indent = total.saturating_sub(title.chars().count()) / 2;
        lines.push(format!("{}{}", " ".repeat(indent), title));
    }
    lines.push(rule("┌", "┬", "┐"));
    if columns.iter().any(|c| !c.header.is_empty()) {
        lines.push(row(columns.iter().map(|c| c.header).collect()));
        lines.push(rule("├", "┼", "┤"));
    }
    for cells in rows {
        lines.push(row(cells.iter().map(String::as_str).collect()));
    }
    lines.push(rule("└", "┴", "┘"));
    lines.join("\n")
}

/// Drives an indicatif spinner from download events
pub struct DownloadSpinner {
    bar: ProgressBar,
}

impl DownloadSpinner {
    fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        Self { bar }
    }
}

impl DownloadObserver for DownloadSpinner {
    fn started(&mut self, plan: &DownloadPlan) {
        self.bar
            .set_message(format!("Downloading {}...", plan.variant.display_name()));
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn tick(&mut self, elapsed: Duration) {
        self.bar
            .set_message(format!("Downloading... {} elapsed", HumanDuration(elapsed)));
    }

    fn finished(&mut self, _outcome: &DownloadOutcome) {
        self.bar.finish_and_clear();
    }
}

impl LaunchObserver for Ui {
    fn step_started(&mut self, step: &LaunchStep) {
        let _ = self.line(format!("$ {}", step.display_command()));
    }

    fn step_failed(&mut self, step: &LaunchStep, code: Option<i32>) {
        let status = code
            .map(|c| format!("exit code {c}"))
            .unwrap_or_else(|| "could not start".to_string());
        let _ = self.warn(format!("{} failed ({status}), continuing", step.display_command()));
    }

    fn upgrades_done(&mut self) {
        let _ = self.success("Dependencies updated");
        let _ = self.blank();
    }

    fn slow_init(&mut self, wait: Duration) {
        let _ = self.panel(&[
            "⚠ IMPORTANT: Model initialization can take several minutes.".to_string(),
            "⚠ The script may appear to hang - this is NORMAL.".to_string(),
            "⚠ As long as it doesn't exit with error, let it run.".to_string(),
        ]);
        let _ = self.blank();
        let _ = self.line(format!("Waiting {} seconds...", wait.as_secs()));
        let _ = self.blank();
    }

    fn training_started(&mut self) {
        let _ = self.line("Training is starting...");
        let _ = self.blank();
    }
}
