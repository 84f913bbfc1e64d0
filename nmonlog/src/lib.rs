// This library reads nmon performance log files (as written by nmon on Linux and AIX) into an
// in-memory Dataset: a time-ordered sequence of records, each with one row of numbers per data
// type that was measured at that time, plus the process identities seen in the file.
//
// Derived metrics are computed while reading (transforms.rs, postprocess.rs) and same-named
// processes are aggregated when the file has been read (synthesize.rs).  See logfile.rs for an
// overview of the format and the parse.
//
// Malformed input is repaired or dropped where possible.  What was done is logged with `tracing`
// and is also available as a list of diagnostics in the Dataset.

mod dataset;
mod dates;
mod diagnostics;
mod header;
mod logfile;
mod postprocess;
mod processes;
mod records;
mod synthesize;
mod tokenizer;
mod transforms;

// The parsed data and the read-only queries on it.

pub use dataset::{DataRecord, DataType, Dataset, Process, ProcessId, TypeKey, AGGREGATE_PID};

// Parse an nmon file or stream into a Dataset.  Times in the file are local times in a timezone
// given by the caller.

pub use logfile::{parse_logfile, parse_reader, ParseError};

// Anomalies found while parsing that did not abort the parse.

pub use diagnostics::{Diagnostic, DiagnosticKind};

// Timestamps are always UTC.

pub use dates::{gmt_offset_hours, parse_nmon_time, parse_nmon_time_after, Timestamp};

// The derived-metric rules, exposed so that clients can tell which types carry derived fields.

pub use postprocess::PostProcessor;
pub use transforms::{Platform, Transform, TransformPipeline};
