//! Diagnostics collected while synthesizing proxy types.
//!
//! Synthesis is all-or-nothing for structural problems, but several conditions are
//! recovered locally and must still be visible to the caller: default values that
//! were skipped because of known constant defects, coerced defaults, defaults that
//! failed and were dropped, invisible interfaces that were filtered out, and cache
//! activity. These are recorded here rather than printed.
//!
//! The collector is append-only and lock-free ([`boxcar::Vec`]), so the collector
//! module can share one instance across concurrent synthesis calls.
//!
//! # Examples
//!
//! ```rust
//! use cilproxy::metadata::diagnostics::{DiagnosticCategory, Diagnostics};
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.warning(DiagnosticCategory::DefaultValue, "dropped default for 'when'");
//! assert!(diagnostics.has_warnings());
//! println!("{}", diagnostics.summary());
//! ```

use std::fmt::{self, Write};

use crate::metadata::token::Token;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    /// Informational: a recovered condition or a noteworthy event
    Info,
    /// Something was dropped but synthesis continued
    Warning,
    /// A synthesis attempt failed
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

/// Which stage of synthesis produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    /// Interface closure resolution
    Interface,
    /// Member extraction and naming
    Member,
    /// Generic parameter replication
    Generic,
    /// Custom attribute replication
    CustomAttribute,
    /// Default value replication
    DefaultValue,
    /// Type finalization
    Finalization,
    /// Proxy cache activity
    Cache,
    /// Anything else
    General,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::Interface => write!(f, "Interface"),
            DiagnosticCategory::Member => write!(f, "Member"),
            DiagnosticCategory::Generic => write!(f, "Generic"),
            DiagnosticCategory::CustomAttribute => write!(f, "CustomAttribute"),
            DiagnosticCategory::DefaultValue => write!(f, "DefaultValue"),
            DiagnosticCategory::Finalization => write!(f, "Finalization"),
            DiagnosticCategory::Cache => write!(f, "Cache"),
            DiagnosticCategory::General => write!(f, "General"),
        }
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level
    pub severity: DiagnosticSeverity,
    /// Producing stage
    pub category: DiagnosticCategory,
    /// Human-readable description
    pub message: String,
    /// Token of the affected entity, if any
    pub token: Option<Token>,
    /// Full name of the type being synthesized, if any
    pub type_name: Option<String>,
}

impl Diagnostic {
    /// Create a diagnostic without context
    pub fn new(
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            token: None,
            type_name: None,
        }
    }

    /// Attach the token of the affected entity
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    /// Attach the name of the type being synthesized
    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.message)?;

        if let Some(type_name) = &self.type_name {
            write!(f, " (type: {type_name})")?;
        }

        if let Some(token) = self.token {
            write!(f, " (token: {token})")?;
        }

        Ok(())
    }
}

/// Thread-safe, append-only diagnostic collector.
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
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Record an informational entry
    pub fn info(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Info, category, message));
    }

    /// Record a warning
    pub fn warning(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Warning,
            category,
            message,
        ));
    }

    /// Record an error
    pub fn error(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Error,
            category,
            message,
        ));
    }

    /// Record a prepared entry
    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// True if anything was recorded
    pub fn has_any(&self) -> bool {
        self.entries.count() > 0
    }

    /// True if at least one error was recorded
    pub fn has_errors(&self) -> bool {
        self.count_of(DiagnosticSeverity::Error) > 0
    }

    /// True if at least one warning was recorded
    pub fn has_warnings(&self) -> bool {
        self.count_of(DiagnosticSeverity::Warning) > 0
    }

    /// Total number of entries
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Number of entries with the given severity
    pub fn count_of(&self, severity: DiagnosticSeverity) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.severity == severity)
            .count()
    }

    /// Iterate all entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// All entries of one category
    pub fn by_category(&self, category: DiagnosticCategory) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.category == category).collect()
    }

    /// All warnings
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.iter()
            .filter(|d| d.severity == DiagnosticSeverity::Warning)
            .collect()
    }

    /// Render a multi-line report of counts, errors and warnings
    pub fn summary(&self) -> String {
        let mut output = String::new();

        let error_count = self.count_of(DiagnosticSeverity::Error);
        let warning_count = self.count_of(DiagnosticSeverity::Warning);
        let info_count = self.count_of(DiagnosticSeverity::Info);

        let _ = writeln!(
            output,
            "Diagnostics: {error_count} error(s), {warning_count} warning(s), {info_count} info(s)"
        );

        for (title, severity) in [
            ("Errors", DiagnosticSeverity::Error),
            ("Warnings", DiagnosticSeverity::Warning),
        ] {
            if self.count_of(severity) == 0 {
                continue;
            }

            let _ = writeln!(output, "\n{title}:");
            for diag in self.iter().filter(|d| d.severity == severity) {
                let _ = writeln!(output, "  {diag}");
            }
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
