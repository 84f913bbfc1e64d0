// Process identity tracking for the TOP and UARG rows.
//
// nmon writes one TOP row per process per tick, and (when asked to) one UARG row with the full
// command line the first time it sees a process.  A pid can be reused by the OS, and the only
// evidence of reuse in the file is that the name or the command line of the pid changes, so
// the tracker keeps a table from pid to the identity the pid currently denotes and replaces the
// entry when it detects a change.  Superseded identities stay in the Dataset.
//
// The TOP column layout, on Linux:
//
//   TOP,+PID,Time,%CPU,%Usr,%Sys,Size,ResSet,ResText,ResData,ShdLib,MinorFault,MajorFault,Command
//
// and on AIX there is a WLM class column after the command.  A data row has the pid in place of
// "+PID" and the timestamp token in place of "Time".

use crate::diagnostics::{DiagnosticKind, Reporter};
use crate::records::{attach_row, parse_value};
use crate::transforms::Platform;
use crate::{DataRecord, Dataset, ProcessId};

use std::collections::HashMap;
use tracing::debug;

// The synthetic column, and its position in the schema.
const WAIT_FIELD: &str = "%Wait";
const WAIT_INDEX: usize = 3;

#[derive(Debug, Default)]
pub(crate) struct ProcessTracker {
    by_pid: HashMap<i32, ProcessId>,
    top_fields: Option<Vec<String>>,
}

impl ProcessTracker {
    /// Install the process schema from the `TOP,+PID,...` header line.

    pub(crate) fn set_schema(&mut self, values: &[String], platform: Platform, reporter: &mut Reporter) {
        let trailing = platform.top_trailing_columns();
        if values.len() < 6 + trailing {
            reporter.report(None, DiagnosticKind::InvalidTypeDefinition { type_id: "TOP".to_string() });
            return;
        }
        let mut fields = values[3..values.len() - trailing].to_vec();
        fields.insert(WAIT_INDEX, WAIT_FIELD.to_string());
        self.top_fields = Some(fields);
    }

    /// Handle a TOP row for the open record.

    pub(crate) fn top_row(
        &mut self,
        dataset: &mut Dataset,
        record: &mut DataRecord,
        values: &[String],
        platform: Platform,
        declared_cpus: u32,
        reporter: &mut Reporter,
    ) {
        let fields = match self.top_fields {
            Some(ref fields) => fields,
            None => {
                reporter.report(Some(record.timestamp()), DiagnosticKind::MissingTopSchema);
                return;
            }
        };

        let trailing = platform.top_trailing_columns();
        if values.len() < 3 + 3 + trailing {
            reporter.report(
                Some(record.timestamp()),
                DiagnosticKind::InvalidProcessRow { reason: format!("only {} columns in TOP row", values.len()) },
            );
            return;
        }
        let pid = match values[1].trim().parse::<i32>() {
            Ok(pid) => pid,
            Err(_) => {
                reporter.report(
                    Some(record.timestamp()),
                    DiagnosticKind::InvalidProcessRow { reason: format!("invalid pid '{}'", values[1]) },
                );
                return;
            }
        };
        let name_index = values.len() - trailing;
        let name = values[name_index].as_str();

        let mut row = Vec::with_capacity(name_index - 2);
        for (ix, value) in values[3..name_index].iter().enumerate() {
            match parse_value(value) {
                Some(v) => row.push(v),
                None => {
                    reporter.report(
                        Some(record.timestamp()),
                        DiagnosticKind::InvalidNumber {
                            type_id: "TOP".to_string(),
                            column: ix + 4,
                            value: value.clone(),
                        },
                    );
                    return;
                }
            }
        }

        // %CPU - %Usr - %Sys is rounding noise when negative; the deficit goes back into %CPU.
        let mut wait = row[0] - row[1] - row[2];
        if wait < 0.0 {
            row[0] -= wait;
            wait = 0.0;
        }
        row.insert(WAIT_INDEX, wait);

        let now = record.time();
        let process = match self.by_pid.get(&pid).copied() {
            Some(id) if dataset.process(id).name() == name => id,
            previous => {
                if let Some(old) = previous {
                    debug!(
                        "pid {} changed name from {} to {} at {}",
                        pid,
                        dataset.process(old).name(),
                        name,
                        record.timestamp()
                    );
                    dataset.process_mut(old).set_end_time(now);
                    if let Some(ty) = dataset.process_type(old) {
                        record.remove_data(ty);
                    }
                }
                let id = dataset.add_process(pid, name, now, None);
                dataset.add_process_type(id, fields.clone());
                self.by_pid.insert(pid, id);
                id
            }
        };
        dataset.process_mut(process).set_end_time(now);

        let cpus = effective_cpus(dataset, record, declared_cpus);
        if let Some(ty) = dataset.process_type(process) {
            for (field, value) in ty.fields().iter().zip(row.iter_mut()) {
                // Every percentage column is relative to one CPU
                if field.starts_with('%') {
                    *value /= cpus;
                }
            }
            attach_row(ty, record, row, reporter);
        }
    }

    /// Handle a UARG row for the open record.

    pub(crate) fn uarg_row(
        &mut self,
        dataset: &mut Dataset,
        record: &mut DataRecord,
        values: &[String],
        platform: Platform,
        reporter: &mut Reporter,
    ) {
        let command_index = platform.uarg_command_index();
        if values.len() <= command_index {
            reporter.report(
                Some(record.timestamp()),
                DiagnosticKind::InvalidProcessRow { reason: format!("only {} columns in UARG row", values.len()) },
            );
            return;
        }
        let pid = match values[2].trim().parse::<i32>() {
            Ok(pid) => pid,
            Err(_) => {
                reporter.report(
                    Some(record.timestamp()),
                    DiagnosticKind::InvalidProcessRow { reason: format!("invalid pid '{}'", values[2]) },
                );
                return;
            }
        };

        // The command line may itself contain the delimiter.
        let command_line = values[command_index..].join(",");

        let current = match self.by_pid.get(&pid).copied() {
            Some(id) => id,
            None => {
                reporter.report(Some(record.timestamp()), DiagnosticKind::UnknownUargPid { pid });
                return;
            }
        };
        let known = dataset.process(current).command_line().map(|c| c.to_string());
        match known {
            None => dataset.process_mut(current).set_command_line(command_line),
            Some(ref c) if *c == command_line => {
                reporter.report(Some(record.timestamp()), DiagnosticKind::CommandLineRedefined { pid });
            }
            Some(_) => {
                debug!("pid {} changed command line at {}", pid, record.timestamp());
                let now = record.time();
                let name = dataset.process(current).name().to_string();
                dataset.process_mut(current).set_end_time(now);
                let (fields, moved) = match dataset.process_type(current) {
                    Some(ty) => (ty.fields().to_vec(), record.remove_data(ty)),
                    None => (vec![], None),
                };

                let id = dataset.add_process(pid, &name, now, Some(command_line));
                dataset.add_process_type(id, fields);
                self.by_pid.insert(pid, id);

                // UARG follows TOP within a tick, so this tick's row belongs to the new identity.
                if let (Some(row), Some(ty)) = (moved, dataset.process_type(id)) {
                    attach_row(ty, record, row, reporter);
                }
            }
        }
    }
}

// The CPU count to divide by: the CPUs column of CPU_ALL in the same tick if there is one, else the
// count declared in the header.
fn effective_cpus(dataset: &Dataset, record: &DataRecord, declared_cpus: u32) -> f64 {
    dataset
        .get_type("CPU_ALL")
        .and_then(|ty| record.get(ty, "CPUs"))
        .filter(|cpus| *cpus > 0.0)
        .unwrap_or(declared_cpus as f64)
}

#[cfg(test)]
fn split(line: &str) -> Vec<String> {
    line.split(',').map(|f| f.to_string()).collect()
}

#[cfg(test)]
fn setup() -> (ProcessTracker, Dataset, Reporter) {
    let mut tracker = ProcessTracker::default();
    let mut reporter = Reporter::default();
    tracker.set_schema(
        &split("TOP,+PID,Time,%CPU,%Usr,%Sys,Size,ResSet,ResText,ResData,ShdLib,MinorFault,MajorFault,Command"),
        Platform::Linux,
        &mut reporter,
    );
    (tracker, Dataset::new("test"), reporter)
}

#[cfg(test)]
fn tick(n: i64) -> DataRecord {
    use chrono::TimeZone;
    DataRecord::new(chrono::Utc.timestamp_opt(1_700_000_000 + 10 * n, 0).unwrap(), format!("T{:04}", n))
}

#[test]
fn test_top_schema() {
    let (tracker, _, _) = setup();
    let fields = tracker.top_fields.unwrap();
    assert!(fields.len() == 11);
    assert!(fields[..5] == ["%CPU", "%Usr", "%Sys", "%Wait", "Size"]);
    assert!(fields.last().unwrap() == "MajorFault");

    let mut aix = ProcessTracker::default();
    let mut reporter = Reporter::default();
    aix.set_schema(
        &split("TOP,+PID,Time,%CPU,%Usr,%Sys,Threads,Size,ResText,ResData,CharIO,%RAM,Paging,Command,WLMclass"),
        Platform::Aix,
        &mut reporter,
    );
    let fields = aix.top_fields.unwrap();
    assert!(fields.first().unwrap() == "%CPU");
    assert!(fields.last().unwrap() == "Paging");
}

#[test]
fn test_top_row_wait_and_scaling() {
    let (mut tracker, mut ds, mut reporter) = setup();
    let mut r = tick(1);
    tracker.top_row(&mut ds, &mut r, &split("TOP,1234,T0001,30,20,6,4,1000,100,200,0,1.5,0,java"), Platform::Linux, 2, &mut reporter);
    // Rounding noise: %CPU below %Usr + %Sys
    tracker.top_row(&mut ds, &mut r, &split("TOP,4321,T0001,10,6,5,8,10,10,10,0,0,0,bash"), Platform::Linux, 2, &mut reporter);
    assert!(reporter.into_diagnostics().is_empty());

    assert!(ds.processes().len() == 2);
    let java = &ds.processes()[0];
    assert!(java.pid() == 1234 && java.name() == "java");
    let ty = ds.process_type(java.id()).unwrap();
    assert!(r.get_data(ty) == Some(&[15.0, 10.0, 3.0, 2.0, 4.0, 1000.0, 100.0, 200.0, 0.0, 1.5, 0.0][..]));

    let bash = &ds.processes()[1];
    let ty = ds.process_type(bash.id()).unwrap();
    assert!(r.get(ty, "%CPU") == Some(5.5));
    assert!(r.get(ty, "%Wait") == Some(0.0));
}

#[test]
fn test_cpus_from_cpu_all() {
    let (mut tracker, mut ds, mut reporter) = setup();
    let k = ds.add_type("CPU_ALL".to_string(), "CPU Total".to_string(), vec!["User%".to_string(), "CPUs".to_string()]);
    let mut r = tick(1);
    r.add_data(ds.type_of(k), vec![10.0, 4.0]).unwrap();
    tracker.top_row(&mut ds, &mut r, &split("TOP,1,T0001,40,20,20,0,0,0,0,0,0,0,init"), Platform::Linux, 2, &mut reporter);
    let ty = ds.process_type(ds.processes()[0].id()).unwrap();
    assert!(r.get(ty, "%CPU") == Some(10.0));
}

#[test]
fn test_pid_reuse_across_ticks() {
    let (mut tracker, mut ds, mut reporter) = setup();
    let row = split("TOP,77,T0001,1,1,0,0,0,0,0,0,0,0,sshd");
    let mut r1 = tick(1);
    tracker.top_row(&mut ds, &mut r1, &row, Platform::Linux, 1, &mut reporter);
    let mut r2 = tick(2);
    tracker.top_row(&mut ds, &mut r2, &row, Platform::Linux, 1, &mut reporter);

    // Same name: same identity, end time extended
    assert!(ds.processes().len() == 1);
    assert!(ds.processes()[0].end_time() == r2.time());

    let mut r3 = tick(3);
    tracker.top_row(&mut ds, &mut r3, &split("TOP,77,T0003,1,1,0,0,0,0,0,0,0,0,cron"), Platform::Linux, 1, &mut reporter);
    assert!(ds.processes().len() == 2);
    let (old, new) = (&ds.processes()[0], &ds.processes()[1]);
    assert!(old.pid() == 77 && new.pid() == 77);
    assert!(old.end_time() == r3.time());
    assert!(new.start_time() == r3.time());
    assert!(!r3.has_data(ds.process_type(old.id()).unwrap()));
    assert!(r3.has_data(ds.process_type(new.id()).unwrap()));
}

#[test]
fn test_rename_within_tick() {
    let (mut tracker, mut ds, mut reporter) = setup();
    let mut r = tick(1);
    tracker.top_row(&mut ds, &mut r, &split("TOP,99,T0001,2,1,1,0,0,0,0,0,0,0,java"), Platform::Linux, 1, &mut reporter);
    tracker.top_row(&mut ds, &mut r, &split("TOP,99,T0001,4,2,2,0,0,0,0,0,0,0,java2"), Platform::Linux, 1, &mut reporter);

    let procs = ds.processes();
    assert!(procs.len() == 2);
    assert!(procs[0].end_time() == r.time());
    assert!(!r.has_data(ds.process_type(procs[0].id()).unwrap()));
    assert!(r.get(ds.process_type(procs[1].id()).unwrap(), "%CPU") == Some(4.0));
}

#[test]
fn test_bad_top_rows() {
    let mut tracker = ProcessTracker::default();
    let mut ds = Dataset::new("test");
    let mut reporter = Reporter::default();
    let mut r = tick(1);
    let row = split("TOP,5,T0001,1,1,0,0,0,0,0,0,0,0,sh");
    tracker.top_row(&mut ds, &mut r, &row, Platform::Linux, 1, &mut reporter);

    let (mut tracker, _, _) = setup();
    tracker.top_row(&mut ds, &mut r, &split("TOP,x5,T0001,1,1,0,0,0,0,0,0,0,0,sh"), Platform::Linux, 1, &mut reporter);
    tracker.top_row(&mut ds, &mut r, &split("TOP,5,T0001,1,1,sh"), Platform::Linux, 1, &mut reporter);
    tracker.top_row(&mut ds, &mut r, &split("TOP,5,T0001,1,one,0,0,0,0,0,0,0,0,sh"), Platform::Linux, 1, &mut reporter);

    assert!(ds.processes().is_empty());
    let kinds = reporter.into_diagnostics().into_iter().map(|d| d.kind).collect::<Vec<_>>();
    assert!(kinds.len() == 4);
    assert!(kinds[0] == DiagnosticKind::MissingTopSchema);
    assert!(matches!(kinds[1], DiagnosticKind::InvalidProcessRow { .. }));
    assert!(matches!(kinds[2], DiagnosticKind::InvalidProcessRow { .. }));
    assert!(kinds[3] == DiagnosticKind::InvalidNumber { type_id: "TOP".to_string(), column: 5, value: "one".to_string() });
}

#[test]
fn test_uarg() {
    let (mut tracker, mut ds, mut reporter) = setup();
    let mut r = tick(1);
    tracker.top_row(&mut ds, &mut r, &split("TOP,1234,T0001,2,1,1,0,0,0,0,0,0,0,java"), Platform::Linux, 1, &mut reporter);
    tracker.uarg_row(&mut ds, &mut r, &split("UARG,T0001,1234,1,java -cp a.jar,b.jar Main"), Platform::Linux, &mut reporter);
    assert!(ds.processes()[0].command_line() == Some("java -cp a.jar,b.jar Main"));

    tracker.uarg_row(&mut ds, &mut r, &split("UARG,T0001,1234,1,java -cp a.jar,b.jar Main"), Platform::Linux, &mut reporter);
    tracker.uarg_row(&mut ds, &mut r, &split("UARG,T0001,4444,1,sleep 10"), Platform::Linux, &mut reporter);
    tracker.uarg_row(&mut ds, &mut r, &split("UARG,T0001,1234"), Platform::Linux, &mut reporter);
    let kinds = reporter.into_diagnostics().into_iter().map(|d| d.kind).collect::<Vec<_>>();
    assert!(kinds[0] == DiagnosticKind::CommandLineRedefined { pid: 1234 });
    assert!(kinds[1] == DiagnosticKind::UnknownUargPid { pid: 4444 });
    assert!(matches!(kinds[2], DiagnosticKind::InvalidProcessRow { .. }));
    assert!(ds.processes().len() == 1);
}

#[test]
fn test_uarg_identity_change() {
    let (mut tracker, mut ds, mut reporter) = setup();
    let mut r1 = tick(1);
    tracker.top_row(&mut ds, &mut r1, &split("TOP,1234,T0001,2,1,1,0,0,0,0,0,0,0,java"), Platform::Linux, 1, &mut reporter);
    tracker.uarg_row(&mut ds, &mut r1, &split("UARG,T0001,1234,1,java A"), Platform::Linux, &mut reporter);

    let mut r2 = tick(2);
    tracker.top_row(&mut ds, &mut r2, &split("TOP,1234,T0002,6,3,3,0,0,0,0,0,0,0,java"), Platform::Linux, 1, &mut reporter);
    tracker.uarg_row(&mut ds, &mut r2, &split("UARG,T0002,1234,1,java B"), Platform::Linux, &mut reporter);

    let procs = ds.processes();
    assert!(procs.len() == 2);
    assert!(procs[0].end_time() == r2.time());
    assert!(procs[1].command_line() == Some("java B"));
    assert!(procs[1].start_time() == r2.time());

    // The row of the tick moved to the new identity, the earlier tick keeps the old one
    let old_ty = ds.process_type(procs[0].id()).unwrap();
    let new_ty = ds.process_type(procs[1].id()).unwrap();
    assert!(r1.get(old_ty, "%CPU") == Some(2.0));
    assert!(!r2.has_data(old_ty));
    assert!(r2.get(new_ty, "%CPU") == Some(6.0));

    // Later TOP rows for the pid go to the new identity
    let mut r3 = tick(3);
    tracker.top_row(&mut ds, &mut r3, &split("TOP,1234,T0003,8,4,4,0,0,0,0,0,0,0,java"), Platform::Linux, 1, &mut reporter);
    assert!(ds.processes().len() == 2);
    assert!(r3.has_data(ds.process_type(ds.processes()[1].id()).unwrap()));
}

#[test]
fn test_all_percentages_scaled() {
    let mut tracker = ProcessTracker::default();
    let mut ds = Dataset::new("test");
    let mut reporter = Reporter::default();
    tracker.set_schema(
        &split("TOP,+PID,Time,%CPU,%Usr,%Sys,Threads,Size,ResText,ResData,CharIO,%RAM,Paging,Command,WLMclass"),
        Platform::Aix,
        &mut reporter,
    );
    let mut r = tick(1);
    tracker.top_row(&mut ds, &mut r, &split("TOP,4711,T0001,8,6,2,12,100,10,20,0,2.0,0,db2sysc,Unclassified"), Platform::Aix, 4, &mut reporter);
    let ty = ds.process_type(ds.processes()[0].id()).unwrap();
    assert!(r.get(ty, "%CPU") == Some(2.0));
    assert!(r.get(ty, "%RAM") == Some(0.5));
    assert!(r.get(ty, "Size") == Some(100.0));
}

#[test]
fn test_aix_uarg() {
    let mut tracker = ProcessTracker::default();
    let mut ds = Dataset::new("test");
    let mut reporter = Reporter::default();
    tracker.set_schema(
        &split("TOP,+PID,Time,%CPU,%Usr,%Sys,Threads,Size,ResText,ResData,CharIO,%RAM,Paging,Command,WLMclass"),
        Platform::Aix,
        &mut reporter,
    );
    let mut r = tick(1);
    tracker.top_row(&mut ds, &mut r, &split("TOP,4711,T0001,8,6,2,12,100,10,20,0,2.0,0,db2sysc,Unclassified"), Platform::Aix, 1, &mut reporter);
    assert!(ds.processes()[0].name() == "db2sysc");

    // AIX puts five more columns before the command line, which keeps its commas
    tracker.uarg_row(&mut ds, &mut r, &split("UARG,T0001,4711,0,0,0,0,0,db2sysc -a,b"), Platform::Aix, &mut reporter);
    assert!(ds.processes()[0].command_line() == Some("db2sysc -a,b"));

    // Too short for the AIX layout, though long enough for Linux
    tracker.uarg_row(&mut ds, &mut r, &split("UARG,T0001,4711,0,0,0,0,0"), Platform::Aix, &mut reporter);
    let kinds = reporter.into_diagnostics().into_iter().map(|d| d.kind).collect::<Vec<_>>();
    assert!(kinds.len() == 1);
    assert!(matches!(kinds[0], DiagnosticKind::InvalidProcessRow { .. }));
}
