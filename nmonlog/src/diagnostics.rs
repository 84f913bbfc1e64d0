/// Diagnostics for anomalies in the input that do not abort the parse.
///
/// Every such anomaly is logged through `tracing` as it is found, and is also recorded in the
/// Dataset so that a client can inspect what was dropped or repaired after the fact.

use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// 1-based line number in the input.
    pub line: u64,

    /// The timestamp token of the record that was open when the anomaly was found, if any.
    pub tick: Option<String>,

    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    /// A line too short or otherwise malformed to be interpreted; the line is dropped.
    InvalidRecord { text: String },

    /// A timestamp record whose time or date could not be parsed; no record is opened.
    InvalidTimestamp { time: String, date: String },

    /// A value that is not a number.  The entire row for the type is dropped.  `column` is 1-based.
    InvalidNumber { type_id: String, column: usize, value: String },

    /// A data row whose timestamp token is not that of the open record; the row is dropped.
    MisplacedRecord { expected: String, found: String },

    /// A data row for a type that was never defined; the row is dropped.
    UndefinedType { type_id: String },

    /// A row with fewer values than its type has fields; it was padded with zeroes.
    ShortRow { type_id: String, expected: usize, found: usize },

    /// A row with more values than its type has fields; the row is dropped.
    LongRow { type_id: String, expected: usize, found: usize },

    /// A transform could not be applied; the untransformed row was kept.
    TransformFailed { transform: &'static str, type_id: String, reason: String },

    /// A type definition without fields; no type is created.
    InvalidTypeDefinition { type_id: String },

    /// A malformed TOP or UARG row; it is dropped and no process is registered.
    InvalidProcessRow { reason: String },

    /// A TOP row seen before the TOP column header; it is dropped.
    MissingTopSchema,

    /// A UARG row for a pid that has no process; it is dropped.
    UnknownUargPid { pid: i32 },

    /// A UARG row that repeats the known command line of its process.  Harmless.
    CommandLineRedefined { pid: i32 },
}

impl DiagnosticKind {
    /// Benign conditions are expected in well-formed files and are logged at low severity.

    pub fn is_benign(&self) -> bool {
        matches!(self, DiagnosticKind::CommandLineRedefined { .. })
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::InvalidRecord { text } => write!(f, "skipping invalid data record '{}'", text),
            DiagnosticKind::InvalidTimestamp { time, date } => {
                write!(f, "could not parse time {}, {}", time, date)
            }
            DiagnosticKind::InvalidNumber { type_id, column, value } => {
                write!(f, "invalid numeric data '{}' for {} in column {}", value, type_id, column)
            }
            DiagnosticKind::MisplacedRecord { expected, found } => {
                write!(f, "misplaced record; expected timestamp {} but got {}", expected, found)
            }
            DiagnosticKind::UndefinedType { type_id } => write!(f, "undefined data type {}", type_id),
            DiagnosticKind::ShortRow { type_id, expected, found } => write!(
                f,
                "DataType {} defines {} fields but there are only {} values; missing values set to 0",
                type_id, expected, found
            ),
            DiagnosticKind::LongRow { type_id, expected, found } => write!(
                f,
                "DataType {} defines {} fields but there are {} values; record dropped",
                type_id, expected, found
            ),
            DiagnosticKind::TransformFailed { transform, type_id, reason } => {
                write!(f, "could not complete transform {} for {}: {}", transform, type_id, reason)
            }
            DiagnosticKind::InvalidTypeDefinition { type_id } => {
                write!(f, "invalid data type definition, no fields defined for data {}", type_id)
            }
            DiagnosticKind::InvalidProcessRow { reason } => write!(f, "invalid process record: {}", reason),
            DiagnosticKind::MissingTopSchema => write!(f, "TOP data before the TOP column header"),
            DiagnosticKind::UnknownUargPid { pid } => {
                write!(f, "misplaced UARG record, no process with pid {} defined yet", pid)
            }
            DiagnosticKind::CommandLineRedefined { pid } => {
                write!(f, "command line for process id {} redefined", pid)
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref tick) = self.tick {
            write!(f, "{}: ", tick)?;
        }
        write!(f, "{} at line {}", self.kind, self.line)
    }
}

/// Collects the diagnostics of one parse run and tracks the current input line.

#[derive(Debug, Default)]
pub(crate) struct Reporter {
    line: u64,
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn set_line(&mut self, line: u64) {
        self.line = line;
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn report(&mut self, tick: Option<&str>, kind: DiagnosticKind) {
        let diagnostic = Diagnostic {
            line: self.line,
            tick: tick.map(|t| t.to_string()),
            kind,
        };
        if diagnostic.kind.is_benign() {
            debug!("{}", diagnostic);
        } else {
            warn!("{}", diagnostic);
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[test]
fn test_diagnostic_display() {
    let mut r = Reporter::default();
    r.set_line(17);
    r.report(
        Some("T0001"),
        DiagnosticKind::InvalidNumber { type_id: "CPU_ALL".to_string(), column: 4, value: "x5".to_string() },
    );
    r.report(None, DiagnosticKind::CommandLineRedefined { pid: 12 });
    let ds = r.into_diagnostics();
    assert!(ds.len() == 2);
    assert!(ds[0].to_string() == "T0001: invalid numeric data 'x5' for CPU_ALL in column 4 at line 17");
    assert!(ds[1].tick.is_none());
    assert!(ds[1].kind.is_benign());
}
