use std::fmt::Display;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Terminal output for the text format. Everything goes to stdout except
/// warnings, failures, and spinners.
pub struct Ui {
    palette: Palette,
    paint: bool,
    spinners: bool,
}

impl Ui {
    pub fn new(theme: Theme) -> Self {
        let stdout_tty = std::io::stdout().is_terminal();
        let paint = stdout_tty && theme != Theme::Plain;

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        let palette = match theme {
            Theme::Plain => Palette::plain(),
            Theme::Light => Palette::light(),
            Theme::Dark | Theme::Auto => Palette::dark(),
        };
        Self {
            palette,
            paint,
            spinners: std::io::stderr().is_terminal(),
        }
    }

    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            if self.paint {
                println!(
                    "  {} {}",
                    self.palette.key.paint(format!("{key:>width$}:")),
                    self.palette.value.paint(value)
                );
            } else {
                println!("  {key:>width$}: {value}");
            }
        }
    }

    /// Numbered entries, one per line.
    pub fn steps<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.heading(title);
        for (n, entry) in entries.into_iter().enumerate() {
            let index = format!("{:>3}.", n + 1);
            if self.paint {
                println!("  {} {entry}", self.palette.bullet.paint(index));
            } else {
                println!("  {index} {entry}");
            }
        }
    }

    /// Bulleted entries on stderr; used for violations.
    pub fn problems<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.fail(title);
        for entry in entries {
            if self.paint {
                eprintln!("  {} {entry}", self.palette.fail.paint("•"));
            } else {
                eprintln!("  - {entry}");
            }
        }
    }

    pub fn success(&self, message: &str) {
        let icon = self.icon(SUCCESS_ICON, self.palette.success);
        println!("{icon} {message}");
    }

    pub fn warn(&self, message: &str) {
        let icon = self.icon(WARNING_ICON, self.palette.warn);
        eprintln!("{icon} {message}");
    }

    pub fn fail(&self, message: &str) {
        let icon = self.icon(FAIL_ICON, self.palette.fail);
        eprintln!("{icon} {message}");
    }

    /// Spinner shown while `label` runs; a dropped guard reports an
    /// interruption.
    pub fn task(&self, label: impl Into<String>) -> TaskGuard<'_> {
        let label = label.into();
        let pb = self.spinners.then(|| {
            let style = ProgressStyle::with_template("{prefix} {spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
            let pb = ProgressBar::new_spinner();
            pb.set_style(style);
            pb.set_prefix(self.icon(PROGRESS_ICON, self.palette.info));
            pb.set_message(label.clone());
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        TaskGuard {
            ui: self,
            label,
            start: Instant::now(),
            finished: false,
            pb,
        }
    }

    fn heading(&self, title: &str) {
        let line = format!("{HEADING_ICON} {title}");
        if self.paint {
            println!("{}", self.palette.heading.paint(line));
        } else {
            println!("{line}");
        }
    }

    fn icon(&self, icon: &str, style: Style) -> String {
        if self.paint {
            style.paint(icon).to_string()
        } else {
            icon.to_owned()
        }
    }
}

pub struct TaskGuard<'a> {
    ui: &'a Ui,
    label: String,
    start: Instant,
    finished: bool,
    pb: Option<ProgressBar>,
}

impl TaskGuard<'_> {
    pub fn finish(mut self) -> Duration {
        self.finished = true;
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
        self.start.elapsed()
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let message = format!(
            "{} interrupted after {}",
            self.label,
            format_duration(self.start.elapsed())
        );
        match self.pb.take() {
            Some(pb) => pb.abandon_with_message(message),
            None => self.ui.warn(&message),
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    if duration.as_secs_f64() >= 1.0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{:.0}ms", duration.as_secs_f64() * 1_000.0)
    }
}

#[derive(Clone, Copy)]
struct Palette {
    heading: Style,
    key: Style,
    value: Style,
    bullet: Style,
    info: Style,
    success: Style,
    warn: Style,
    fail: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Style::new().fg(Color::Purple).bold(),
            key: Style::new().fg(Color::LightBlue).bold(),
            value: Style::new().fg(Color::White),
            bullet: Style::new().fg(Color::LightBlue),
            info: Style::new().fg(Color::LightCyan),
            success: Style::new().fg(Color::LightGreen).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
            fail: Style::new().fg(Color::LightRed).bold(),
        }
    }

    fn light() -> Self {
        Self {
            heading: Style::new().fg(Color::Blue).bold(),
            key: Style::new().fg(Color::Black).bold(),
            value: Style::new().fg(Color::Black),
            bullet: Style::new().fg(Color::Blue),
            info: Style::new().fg(Color::Purple),
            success: Style::new().fg(Color::Green).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
            fail: Style::new().fg(Color::Red).bold(),
        }
    }

    fn plain() -> Self {
        let s = Style::new();
        Self {
            heading: s,
            key: s,
            value: s,
            bullet: s,
            info: s,
            success: s,
            warn: s,
            fail: s,
        }
    }
}

const HEADING_ICON: &str = "▸";
const SUCCESS_ICON: &str = "✔";
const WARNING_ICON: &str = "⚠";
const FAIL_ICON: &str = "✘";
const PROGRESS_ICON: &str = "▶";
