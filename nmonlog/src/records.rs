// The data phase of a parse: everything from the first timestamp line on.
//
// At most one record is open at a time.  A timestamp line seals the open record (runs the
// post-processors over it and appends it to the Dataset) and opens the next one; every data row
// must carry the timestamp token of the open record.  The open record is held in a RecordState
// owned by the caller and passed to each handler.
//
// A line whose second field (third for TOP) is not a timestamp token is not data but a type
// definition, which nmon may write at any point in the file.

use crate::dates::parse_nmon_time_after;
use crate::diagnostics::{DiagnosticKind, Reporter};
use crate::logfile::{ParseError, ParseRun};
use crate::{DataRecord, DataType, TypeKey};

// Types that are never registered, and whose rows are tolerated when no record is open.  AIX
// writes them at the end of the file.
pub(crate) const IGNORED_TYPES: [&str; 4] = ["AVM-IN-MB", "NO-PBUF-COUNT", "NO-PSBUF-COUNT", "NO-JFS2-FSBUF-COUNT"];

// Defining this type mid-stream closes the open record.
const SEALING_TYPE: &str = "NO-JFS2-FSBUF-COUNT";

/// Columns of the raw line (0-based, counting the type id and token) that are not data.

pub(crate) fn skip_columns(type_id: &str) -> &'static [usize] {
    match type_id {
        "RAWLPAR" => &[2, 3],
        "RAWCPUTOTAL" => &[4],
        _ => &[],
    }
}

/// Parse one field value.  An empty field or one that mentions "nan" is 0, "INF" is infinity, and
/// anything else that is not a number is None.

pub(crate) fn parse_value(s: &str) -> Option<f64> {
    if s.is_empty() || s.contains("nan") {
        Some(0.0)
    } else if s == "INF" {
        Some(f64::INFINITY)
    } else {
        s.trim().parse::<f64>().ok()
    }
}

/// Attach `row` to `record` under `ty`.  A short row is padded with zeroes and a long one is
/// dropped, in both cases with a diagnostic.

pub(crate) fn attach_row(ty: &DataType, record: &mut DataRecord, mut row: Vec<f64>, reporter: &mut Reporter) {
    let expected = ty.field_count();
    if row.len() > expected {
        reporter.report(
            Some(record.timestamp()),
            DiagnosticKind::LongRow { type_id: ty.id().to_string(), expected, found: row.len() },
        );
        return;
    }
    if row.len() < expected {
        reporter.report(
            Some(record.timestamp()),
            DiagnosticKind::ShortRow { type_id: ty.id().to_string(), expected, found: row.len() },
        );
        row.resize(expected, 0.0);
    }
    let added = record.add_data(ty, row);
    debug_assert!(added.is_ok());
}

#[derive(Debug)]
pub(crate) enum RecordState {
    NoOpenRecord,
    Open(DataRecord),
}

impl RecordState {
    fn take(&mut self) -> Option<DataRecord> {
        match std::mem::replace(self, RecordState::NoOpenRecord) {
            RecordState::Open(record) => Some(record),
            RecordState::NoOpenRecord => None,
        }
    }
}

impl ParseRun {
    /// Seal the open record, if there is one, and open a record for the timestamp line `values`.
    /// A malformed timestamp line leaves no record open.

    pub(crate) fn timestamp_line(&mut self, state: &mut RecordState, values: &[String]) {
        self.seal(state);
        if values.len() != 4 {
            self.reporter.report(None, DiagnosticKind::InvalidRecord { text: values.join(",") });
            return;
        }
        let previous = self.dataset.records().last().map(|r| r.time());
        match parse_nmon_time_after(&values[2], &values[3], &self.tz, previous) {
            Some(time) => *state = RecordState::Open(DataRecord::new(time, values[1].clone())),
            None => self.reporter.report(
                None,
                DiagnosticKind::InvalidTimestamp { time: values[2].clone(), date: values[3].clone() },
            ),
        }
    }

    /// Run the post-processors over the open record and append it to the Dataset.

    pub(crate) fn seal(&mut self, state: &mut RecordState) {
        if let Some(mut record) = state.take() {
            for processor in &self.post_processors {
                processor.post_process(&mut self.dataset, &mut record);
            }
            self.dataset.add_record(record);
        }
    }

    /// Handle one line of the data phase.  The only errors are the fatal ones.

    pub(crate) fn data_line(&mut self, state: &mut RecordState, values: &[String]) -> Result<(), ParseError> {
        let tag = match values.first() {
            Some(tag) if !tag.is_empty() => tag.as_str(),
            _ => return Ok(()),
        };
        match tag {
            "ZZZZ" => {
                self.timestamp_line(state, values);
                return Ok(());
            }
            "ERROR" => return Ok(()),
            "AAA" => {
                self.metadata_line(values);
                return Ok(());
            }
            _ if tag.starts_with("BBB") => {
                self.system_info.line(values);
                return Ok(());
            }
            _ => {}
        }

        if let RecordState::NoOpenRecord = state {
            if IGNORED_TYPES.contains(&tag) {
                return Ok(());
            }
            return Err(ParseError::NoOpenRecord { line: self.reporter.line() });
        }

        if values.len() < 2 {
            self.reporter.report(current_tick(state), DiagnosticKind::InvalidRecord { text: values.join(",") });
            return Ok(());
        }

        let is_top = tag == "TOP";
        let is_uarg = tag == "UARG";

        // The process schema is fixed by the header.  "Time" would pass for a token below.
        if is_top && values[1] == "+PID" {
            return Ok(());
        }
        let token = values.get(if is_top { 2 } else { 1 }).map(|t| t.as_str()).unwrap_or("");

        if !token.starts_with('T') {
            if !is_top && !is_uarg {
                self.mid_stream_definition(state, values);
            }
            return Ok(());
        }

        let record = match state {
            RecordState::Open(record) => record,
            RecordState::NoOpenRecord => return Ok(()),
        };
        if token != record.timestamp() {
            self.reporter.report(
                Some(record.timestamp()),
                DiagnosticKind::MisplacedRecord { expected: record.timestamp().to_string(), found: token.to_string() },
            );
            return Ok(());
        }

        let platform = self.platform();
        if is_top {
            let cpus = self.declared_cpus();
            self.tracker.top_row(&mut self.dataset, record, values, platform, cpus, &mut self.reporter);
        } else if is_uarg {
            self.tracker.uarg_row(&mut self.dataset, record, values, platform, &mut self.reporter);
        } else {
            match self.dataset.get_type(tag).map(|ty| ty.key()) {
                Some(key) => self.generic_row(key, record, values),
                None => self.reporter.report(
                    Some(record.timestamp()),
                    DiagnosticKind::UndefinedType { type_id: tag.to_string() },
                ),
            }
        }
        Ok(())
    }

    fn mid_stream_definition(&mut self, state: &mut RecordState, values: &[String]) {
        if self.dataset.get_type(&values[0]).is_some() {
            return;
        }
        if values[0] == SEALING_TYPE && values.len() >= 3 {
            self.seal(state);
        }
        self.define_type(values);
    }

    // Parse, transform and attach a row for an ordinary type.  Any bad value drops the whole row.
    fn generic_row(&mut self, key: TypeKey, record: &mut DataRecord, values: &[String]) {
        let ty = self.dataset.type_of(key);
        let skip = skip_columns(ty.id());
        let mut row = Vec::with_capacity(values.len());
        for (ix, value) in values.iter().enumerate().skip(2) {
            if skip.contains(&ix) {
                continue;
            }
            match parse_value(value) {
                Some(v) => row.push(v),
                None => {
                    self.reporter.report(
                        Some(record.timestamp()),
                        DiagnosticKind::InvalidNumber {
                            type_id: ty.id().to_string(),
                            column: ix + 1,
                            value: value.clone(),
                        },
                    );
                    return;
                }
            }
        }

        if let Some(transform) = self.type_transforms.get(&key) {
            // Too long to be raw, and attaching it untransformed would misalign the derived fields.
            let raw_count = transform.raw_field_count(ty);
            if row.len() > raw_count {
                self.reporter.report(
                    Some(record.timestamp()),
                    DiagnosticKind::LongRow { type_id: ty.id().to_string(), expected: raw_count, found: row.len() },
                );
                return;
            }
            match transform.apply(ty, &row) {
                Ok(transformed) => row = transformed,
                Err(e) => self.reporter.report(
                    Some(record.timestamp()),
                    DiagnosticKind::TransformFailed {
                        transform: transform.name(),
                        type_id: ty.id().to_string(),
                        reason: e.to_string(),
                    },
                ),
            }
        }
        attach_row(ty, record, row, &mut self.reporter);
    }
}

fn current_tick(state: &RecordState) -> Option<&str> {
    match state {
        RecordState::Open(record) => Some(record.timestamp()),
        RecordState::NoOpenRecord => None,
    }
}

#[test]
fn test_parse_value() {
    assert!(parse_value("") == Some(0.0));
    assert!(parse_value("-nan") == Some(0.0));
    assert!(parse_value("nan") == Some(0.0));
    assert!(parse_value("INF") == Some(f64::INFINITY));
    assert!(parse_value("12.5") == Some(12.5));
    assert!(parse_value(" 7") == Some(7.0));
    assert!(parse_value("x5.0").is_none());
    assert!(parse_value("1,5").is_none());
}

#[test]
fn test_skip_columns() {
    assert!(skip_columns("RAWLPAR") == [2, 3]);
    assert!(skip_columns("RAWCPUTOTAL") == [4]);
    assert!(skip_columns("LPAR").is_empty());
}

#[test]
fn test_attach_row() {
    use chrono::TimeZone;
    let mut ds = crate::Dataset::new("test");
    let k = ds.add_type("JFSFILE".to_string(), "JFS".to_string(), vec!["/".to_string(), "/home".to_string()]);
    let ty = ds.type_of(k);
    let mut reporter = Reporter::default();
    let mut r = DataRecord::new(chrono::Utc.timestamp_opt(0, 0).unwrap(), "T0001".to_string());

    attach_row(ty, &mut r, vec![1.0, 2.0, 3.0], &mut reporter);
    assert!(!r.has_data(ty));
    attach_row(ty, &mut r, vec![1.0], &mut reporter);
    assert!(r.get_data(ty) == Some(&[1.0, 0.0][..]));

    let kinds = reporter.into_diagnostics().into_iter().map(|d| d.kind).collect::<Vec<_>>();
    assert!(kinds[0] == DiagnosticKind::LongRow { type_id: "JFSFILE".to_string(), expected: 2, found: 3 });
    assert!(kinds[1] == DiagnosticKind::ShortRow { type_id: "JFSFILE".to_string(), expected: 2, found: 1 });
}
