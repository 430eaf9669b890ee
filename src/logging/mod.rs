//! Logging and output control
//!
//! This module provides the [`Logger`] for controlling output verbosity, formatting sizes and
//! durations, and rendering the single-line transfer progress bar.

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        if !self.quiet {
            println!("\n=== {} ===", title);
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("🐛 DEBUG: {}", message);
        }
    }

    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("📝 {}", message);
        }
    }

    /// Information message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("ℹ️  {}", message);
        }
    }

    /// Success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("✅ {}", message);
        }
    }

    /// Warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("⚠️  WARNING: {}", message);
        }
    }

    /// Error message, printed even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("❌ ERROR: {}", message);
    }

    /// Step information
    pub fn step(&self, message: &str) {
        if !self.quiet {
            println!("▶️  {}", message);
        }
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("   {}", message);
        }
    }

    /// Key-value pair summary display
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        if !self.quiet {
            println!("\n--- {} ---", title);
            for (key, value) in items {
                println!("  {}: {}", key, value);
            }
        }
    }

    /// Format file size in human-readable units
    pub fn format_size(&self, bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }

    /// Format transfer speed in human-readable format
    pub fn format_speed(&self, bytes_per_sec: u64) -> String {
        format!("{}/s", self.format_size(bytes_per_sec))
    }

    /// Redraw the live progress line for a transfer
    pub fn display_live_progress(&self, state: &TransferState) {
        if self.quiet {
            return;
        }

        print!("\r\x1b[K");

        let percentage = state.percentage();
        let bar_width = 30;
        let filled = (((percentage / 100.0) * bar_width as f64) as usize).min(bar_width);
        let bar = format!("[{}{}]", "█".repeat(filled), "░".repeat(bar_width - filled));

        print!(
            "⏳ {} {:.1}% | {} / {} | {}",
            bar,
            percentage,
            self.format_size(state.processed_bytes),
            self.format_size(state.total_bytes),
            self.format_speed(state.current_speed())
        );
        match state.estimated_time_remaining() {
            Some(eta) => print!(" | ETA: {}", self.format_duration(eta)),
            None => print!(" | ETA: calculating..."),
        }

        let _ = io::stdout().flush();
    }
}

/// Byte counters behind the live progress line
#[derive(Debug, Clone)]
pub struct TransferState {
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub start_time: Instant,
}

impl TransferState {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            processed_bytes: 0,
            start_time: Instant::now(),
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.processed_bytes as f64 / self.total_bytes as f64) * 100.0
        }
    }

    pub fn estimated_time_remaining(&self) -> Option<Duration> {
        let elapsed = self.start_time.elapsed();
        if self.processed_bytes == 0 || elapsed.as_secs() == 0 {
            return None;
        }

        let rate = self.processed_bytes as f64 / elapsed.as_secs_f64();
        let remaining = self.total_bytes.saturating_sub(self.processed_bytes);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn current_speed(&self) -> u64 {
        let elapsed = self.start_time.elapsed();
        if elapsed.as_secs() == 0 {
            0
        } else {
            self.processed_bytes / elapsed.as_secs()
        }
    }
}
