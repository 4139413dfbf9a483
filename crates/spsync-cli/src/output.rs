//! Terminal output for spsync commands
//!
//! Human output goes to stdout with status marks; problems go to stderr.
//! In JSON mode each command prints a single document on stdout, so the
//! line-oriented methods stay silent except for errors.

use std::io::{self, Write};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    /// A single file or orphan that did not make it
    fn item_failed(&self, path: &str, reason: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output with status marks
pub struct HumanFormatter {
    quiet: bool,
}

impl HumanFormatter {
    fn line(&self, mark: char, message: &str) -> String {
        format!("{mark} {message}")
    }
}

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("{}", self.line('\u{2713}', message));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", self.line('\u{2717}', &format!("Error: {message}")));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", self.line('!', message));
    }
    fn info(&self, message: &str) {
        if !self.quiet {
            println!("  {message}");
        }
    }
    fn item_failed(&self, path: &str, reason: &str) {
        eprintln!("  \u{2717} {path}: {reason}");
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// JSON output; the command prints its document through `print_json`
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, _message: &str) {}
    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({ "success": false, "error": message }));
    }
    fn warn(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn item_failed(&self, _path: &str, _reason: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        let mut out = io::stdout().lock();
        if serde_json::to_writer_pretty(&mut out, value).is_ok() {
            let _ = writeln!(out);
        }
    }
}

pub fn get_formatter(format: OutputFormat, quiet: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter { quiet }),
    }
}
