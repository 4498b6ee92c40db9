//! Output formatting module for azrm
//!
//! The `run` command owns stdout: it carries exactly one JSON result record.
//! Human-facing status lines always go to stderr.

use azrm::modules::{ModuleOutput, ModuleStatus};
use colored::Colorize;
use std::io::{self, Write};

/// Colored rendering of a module status
pub fn colored_status(status: ModuleStatus) -> String {
    match status {
        ModuleStatus::Ok => "ok".green().to_string(),
        ModuleStatus::Changed => "changed".yellow().to_string(),
        ModuleStatus::Failed => "failed".red().bold().to_string(),
    }
}

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// Verbosity level
    verbosity: u8,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        if !use_color {
            colored::control::set_override(false);
        }

        Self {
            use_color,
            verbosity,
        }
    }

    /// Print the result record of a module run
    pub fn record(&self, module: &str, output: &ModuleOutput) -> io::Result<()> {
        let rendered = serde_json::to_string_pretty(output).map_err(io::Error::from)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", rendered)?;
        stdout.flush()?;

        if self.verbosity >= 1 {
            eprintln!("{}: [{}]", module, colored_status(output.status()));
        }
        Ok(())
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.use_color {
            println!("\n{}", title.cyan().bold());
            println!("{}", "-".repeat(title.len()).cyan());
        } else {
            println!("\n{}", title);
            println!("{}", "-".repeat(title.len()));
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print a table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        // Calculate column widths
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let header_line = render_row(headers.iter().copied(), &widths);
        if self.use_color {
            println!("{}", header_line.bright_white().bold());
        } else {
            println!("{}", header_line);
        }

        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        if self.use_color {
            println!("{}", sep.join("-+-").bright_black());
        } else {
            println!("{}", sep.join("-+-"));
        }

        for row in rows {
            println!("{}", render_row(row.iter().map(String::as_str), &widths));
        }
    }
}

fn render_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join(" | ")
}
