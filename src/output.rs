//! Operator-facing output: stylesheet, context, and the reporter port.

use console::Term;
use owo_colors::{OwoColorize as _, Style};

/// Centralized stylesheet for CLI output colors.
#[derive(Default, Clone)]
pub struct Styles {
    /// Success messages (green)
    pub success: Style,
    /// Warning messages (yellow)
    pub warning: Style,
    /// Dimmed/secondary text
    pub dim: Style,
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.dim = Style::new().dimmed();
    }
}

/// Progress events emitted by the orchestrator and its collaborators.
/// Sync trait — no async needed.
pub trait Reporter {
    /// An in-progress step; shown only in verbose runs.
    fn step(&self, message: &str);
    /// A completed milestone.
    fn success(&self, message: &str);
    /// A non-fatal problem worth the operator's attention.
    fn warn(&self, message: &str);
}

/// Reporter that discards everything. For tests and embedding.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn step(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warn(&self, _: &str) {}
}

/// Output context carrying styling, terminal state, and verbosity.
pub struct OutputContext {
    pub styles: Styles,
    pub is_tty: bool,
    pub verbose: bool,
}

impl OutputContext {
    /// Create output context based on CLI flags and environment.
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let use_colors = is_tty && std::env::var("NO_COLOR").is_err();

        let mut styles = Styles::default();
        if use_colors {
            styles.colorize();
        }

        Self {
            styles,
            is_tty,
            verbose,
        }
    }
}

impl Reporter for OutputContext {
    fn step(&self, message: &str) {
        if self.verbose {
            println!("  {} {message}", "·".style(self.styles.dim));
        }
    }

    fn success(&self, message: &str) {
        println!("  {} {message}", "✓".style(self.styles.success));
    }

    fn warn(&self, message: &str) {
        eprintln!("  {} {message}", "⚠".style(self.styles.warning));
    }
}
