//! Collection of non-fatal findings made during a compilation run.
//!
//! Most failures in the front end are fatal and surface as [`crate::Error`]. A few
//! conditions are only worth reporting: plug methods that match no member of their
//! target, wildcard plugs without an assembler, debug-symbol sinks that reject a
//! record. These are pushed into a [`Diagnostics`] container and logged through
//! `tracing` at the matching level, so a run can finish and still tell the caller
//! what it skipped.
//!
//! The container is backed by `boxcar::Vec`, which allows appending through a shared
//! reference. The scanner, the plug index and the layout engine can all hold the same
//! `Arc<Diagnostics>`.
//!
//! # Examples
//!
//! ```rust
//! use cilfront::metadata::diagnostics::{DiagnosticCategory, Diagnostics};
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.warning(
//!     DiagnosticCategory::Plug,
//!     "Invalid plug method! Target method System.Void  Foo.Bar() not found",
//! );
//!
//! assert!(diagnostics.has_warnings());
//! for entry in diagnostics.iter() {
//!     println!("{entry}");
//! }
//! ```

use std::fmt::{self, Write};

/// Severity level of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    /// Informational, nothing was skipped
    Info,
    /// Something was ignored but the run continues
    Warning,
    /// A problem that should have been fatal was downgraded
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Info => write!(f, "INFO"),
            DiagnosticSeverity::Warning => write!(f, "WARN"),
            DiagnosticSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// The subsystem a diagnostic originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    /// Plug method validation
    Plug,
    /// Field plug collection
    PlugField,
    /// Field layout computation
    Layout,
    /// Debug symbol record delivery
    DebugSymbols,
    /// Reachability scanning
    Scanner,
    /// Anything else
    General,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::Plug => write!(f, "Plug"),
            DiagnosticCategory::PlugField => write!(f, "PlugField"),
            DiagnosticCategory::Layout => write!(f, "Layout"),
            DiagnosticCategory::DebugSymbols => write!(f, "DebugSymbols"),
            DiagnosticCategory::Scanner => write!(f, "Scanner"),
            DiagnosticCategory::General => write!(f, "General"),
        }
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// How serious the finding is
    pub severity: DiagnosticSeverity,
    /// Which subsystem reported it
    pub category: DiagnosticCategory,
    /// Human readable description
    pub message: String,
    /// Full name of the type, method or field concerned, if any
    pub item: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic without item context.
    pub fn new(
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            item: None,
        }
    }

    /// Attach the full name of the item the diagnostic is about.
    #[must_use]
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.message)?;

        if let Some(item) = &self.item {
            write!(f, " ({item})")?;
        }

        Ok(())
    }
}

/// Append-only container of [`Diagnostic`] entries.
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Create an empty container
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Record and log an informational entry
    pub fn info(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Info, category, message));
    }

    /// Record and log a warning
    pub fn warning(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Warning,
            category,
            message,
        ));
    }

    /// Record and log an error that did not abort the run
    pub fn error(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Error,
            category,
            message,
        ));
    }

    /// Record and log a prepared entry.
    pub fn push(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            DiagnosticSeverity::Info => {
                tracing::info!(category = %diagnostic.category, "{}", diagnostic.message);
            }
            DiagnosticSeverity::Warning => {
                tracing::warn!(category = %diagnostic.category, "{}", diagnostic.message);
            }
            DiagnosticSeverity::Error => {
                tracing::error!(category = %diagnostic.category, "{}", diagnostic.message);
            }
        }
        self.entries.push(diagnostic);
    }

    /// True if anything was recorded
    pub fn has_any(&self) -> bool {
        self.entries.count() > 0
    }

    /// True if at least one warning was recorded
    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    /// True if at least one error was recorded
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Number of entries
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Number of warnings
    pub fn warning_count(&self) -> usize {
        self.count_severity(DiagnosticSeverity::Warning)
    }

    /// Number of errors
    pub fn error_count(&self) -> usize {
        self.count_severity(DiagnosticSeverity::Error)
    }

    fn count_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.severity == severity)
            .count()
    }

    /// Iterate over all entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// All entries of one category
    pub fn by_category(&self, category: DiagnosticCategory) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.category == category).collect()
    }

    /// Render a multi-line summary of all warnings and errors.
    pub fn summary(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "Diagnostics: {} error(s), {} warning(s), {} total",
            self.error_count(),
            self.warning_count(),
            self.count()
        );

        for diag in self
            .iter()
            .filter(|d| d.severity != DiagnosticSeverity::Info)
        {
            let _ = writeln!(output, "  {diag}");
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::new(
            DiagnosticSeverity::Warning,
            DiagnosticCategory::Plug,
            "Invalid plug method!",
        )
        .with_item("System.Void  Foo.Bar()");

        assert_eq!(
            diag.to_string(),
            "[WARN] Plug: Invalid plug method! (System.Void  Foo.Bar())"
        );
    }

    #[test]
    fn container_counts() {
        let diagnostics = Diagnostics::new();
        assert!(!diagnostics.has_any());

        diagnostics.info(DiagnosticCategory::General, "Info message");
        diagnostics.warning(DiagnosticCategory::Plug, "Warning message");
        diagnostics.error(DiagnosticCategory::Layout, "Error message");

        assert_eq!(diagnostics.count(), 3);
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.error_count(), 1);
        assert!(diagnostics.has_warnings());
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.by_category(DiagnosticCategory::Plug).len(), 1);

        let summary = diagnostics.summary();
        assert!(summary.contains("1 error(s), 1 warning(s), 3 total"));
        assert!(!summary.contains("Info message"));
    }

    #[test]
    fn concurrent_push() {
        let diagnostics = Arc::new(Diagnostics::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let diagnostics = Arc::clone(&diagnostics);
                thread::spawn(move || {
                    for j in 0..10 {
                        diagnostics.warning(DiagnosticCategory::Scanner, format!("{i}:{j}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(diagnostics.count(), 40);
    }
}
