//! Diagnostic accumulator for the parser/resolver/compiler passes (spec
//! §4.2 "error recovery"). One reporter is threaded through all three so a
//! single run can surface every diagnostic it finds, not just the first.

use crate::parser::ast::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub loc: SourceLocation,
}

/// Controls how many diagnostics accumulate before parsing gives up, and
/// whether the first error stops the run outright.
#[derive(Debug, Clone, Copy)]
pub struct ReporterConfig {
    pub max_diagnostics: usize,
    pub stop_on_first_error: bool,
}

impl ReporterConfig {
    pub const fn strict() -> Self {
        ReporterConfig {
            max_diagnostics: 1,
            stop_on_first_error: true,
        }
    }

    pub const fn default_mode() -> Self {
        ReporterConfig {
            max_diagnostics: 100,
            stop_on_first_error: false,
        }
    }

    pub const fn permissive() -> Self {
        ReporterConfig {
            max_diagnostics: usize::MAX,
            stop_on_first_error: false,
        }
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self::default_mode()
    }
}

pub struct Reporter {
    config: ReporterConfig,
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new(config: ReporterConfig) -> Self {
        Reporter {
            config,
            diagnostics: Vec::new(),
        }
    }

    /// Record a diagnostic. Returns `false` once the caller should stop
    /// (strict mode hit an error, or the diagnostic cap was reached).
    pub fn report(&mut self, severity: Severity, message: impl Into<String>, loc: SourceLocation) -> bool {
        if self.diagnostics.len() >= self.config.max_diagnostics {
            return false;
        }
        self.diagnostics.push(Diagnostic {
            severity,
            message: message.into(),
            loc,
        });
        !(self.config.stop_on_first_error && severity == Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn render(&self, mode: RenderMode) -> String {
        match mode {
            RenderMode::Plain => self
                .diagnostics
                .iter()
                .map(|d| d.message.clone())
                .collect::<Vec<_>>()
                .join("\n"),
            RenderMode::Detailed => self
                .diagnostics
                .iter()
                .map(|d| format!("{:?} at {}:{}: {}", d.severity, d.loc.line, d.loc.column, d.message))
                .collect::<Vec<_>>()
                .join("\n"),
            RenderMode::Short => self
                .diagnostics
                .iter()
                .map(|d| format!("{}:{}: {}", d.loc.line, d.loc.column, d.message))
                .collect::<Vec<_>>()
                .join("\n"),
            RenderMode::Json => {
                let entries: Vec<String> = self
                    .diagnostics
                    .iter()
                    .map(|d| {
                        format!(
                            "{{\"severity\":\"{:?}\",\"line\":{},\"column\":{},\"message\":{}}}",
                            d.severity,
                            d.loc.line,
                            d.loc.column,
                            json_string(&d.message)
                        )
                    })
                    .collect();
                format!("[{}]", entries.join(","))
            }
        }
    }
}

fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Plain,
    Detailed,
    Short,
    Json,
}
