// Parser for the nmon log format.
//
// An nmon file is a sequence of comma-separated lines, each starting with a tag.  In outline:
//
//   AAA,host,web01                                    metadata
//   BBBP,001,/etc/release,"DISTRIB_ID=Ubuntu"         system information
//   CPU_ALL,CPU Total web01,User%,Sys%,...            type definition: id, name, fields
//   TOP,+PID,Time,%CPU,%Usr,%Sys,...,Command          process column layout
//   ZZZZ,T0001,00:00:05,01-JAN-2024                   timestamp: opens a tick
//   CPU_ALL,T0001,10.0,5.0,...                        data row for the tick T0001
//   TOP,1234,T0001,30.0,20.0,6.0,...,java             process row: pid, tick, values, name
//   UARG,T0001,1234,1,java -cp a.jar,b.jar Main       process command line (Linux layout)
//
// The parse has two phases, the header (header.rs) up to the first timestamp line and the data
// phase (records.rs) after it.  Process rows are handled by the tracker in processes.rs.  When
// the input is exhausted the last record is sealed and the same-named processes are aggregated
// (synthesize.rs).
//
// All the state of a parse lives in a ParseRun that is created for one input and consumed when
// the Dataset is produced.
//
// The parse fails only if the input can't be read, if there is no timestamp line at all, or if a
// data row appears when no record is open (which happens after a malformed timestamp line).  All
// other anomalies are repaired or dropped, and recorded as diagnostics.

use crate::dates::gmt_offset_hours;
use crate::diagnostics::Reporter;
use crate::header::SystemInfo;
use crate::processes::ProcessTracker;
use crate::records::RecordState;
use crate::synthesize::aggregate_processes;
use crate::tokenizer::Tokenizer;
use crate::transforms::{Platform, Transform, TransformPipeline};
use crate::{Dataset, PostProcessor, TypeKey};

use chrono::Utc;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not read input: {0}")]
    Csv(#[from] csv::Error),

    #[error("file '{file}' does not appear to have any data records")]
    NoDataRecords { file: String },

    #[error("no open record for the data at line {line}")]
    NoOpenRecord { line: u64 },
}

/// Parse an nmon file, with the local times in the file taken to be in `tz`.
///
/// This returns an error if the file can't be read or has no data, but repairs or drops malformed
/// rows, leaving diagnostics in the Dataset.

pub fn parse_logfile(file_name: &str, tz: Tz) -> Result<Dataset, ParseError> {
    let file = File::open(file_name)?;
    parse_reader(file_name, io::BufReader::new(file), tz)
}

/// Parse nmon data from `input`, which is named `source` in the Dataset and in errors.

pub fn parse_reader<R: io::Read>(source: &str, input: R, tz: Tz) -> Result<Dataset, ParseError> {
    let started = Instant::now();
    let mut tokens = Tokenizer::new(input);
    let mut run = ParseRun::new(source, tz);

    let first = match run.parse_headers(&mut tokens)? {
        Some(line) => line,
        None => {
            return Err(ParseError::NoDataRecords {
                file: source.to_string(),
            })
        }
    };

    let mut state = RecordState::NoOpenRecord;
    run.timestamp_line(&mut state, &first);
    while let Some(values) = tokens.next_line()? {
        run.reporter.set_line(tokens.line());
        run.data_line(&mut state, &values)?;
    }
    run.seal(&mut state);

    let dataset = run.finish();
    debug!("parse complete for {} in {:?}", source, started.elapsed());
    Ok(dataset)
}

/// Fixed at the first type definition.

#[derive(Debug)]
pub(crate) struct Installed {
    pub(crate) platform: Platform,
    pub(crate) pipeline: TransformPipeline,
    pub(crate) cpus: u32,
}

/// The state of one parse.

#[derive(Debug)]
pub(crate) struct ParseRun {
    pub(crate) tz: Tz,
    pub(crate) dataset: Dataset,
    pub(crate) reporter: Reporter,
    pub(crate) installed: Option<Installed>,
    pub(crate) type_transforms: HashMap<TypeKey, Transform>,
    pub(crate) tracker: ProcessTracker,
    pub(crate) system_info: SystemInfo,
    pub(crate) post_processors: Vec<PostProcessor>,
}

impl ParseRun {
    pub(crate) fn new(source: &str, tz: Tz) -> ParseRun {
        let mut dataset = Dataset::new(source);
        let offset = gmt_offset_hours(&tz, Utc::now());
        dataset.set_metadata("parsed_gmt_offset", &format!("{:?}", offset));
        ParseRun {
            tz,
            dataset,
            reporter: Reporter::default(),
            installed: None,
            type_transforms: HashMap::new(),
            tracker: ProcessTracker::default(),
            system_info: SystemInfo::default(),
            post_processors: PostProcessor::default_set(),
        }
    }

    fn finish(self) -> Dataset {
        let ParseRun {
            mut dataset,
            reporter,
            system_info,
            ..
        } = self;
        system_info.publish(&mut dataset);
        dataset.sort_records();
        aggregate_processes(&mut dataset);
        dataset.set_diagnostics(reporter.into_diagnostics());
        dataset
    }
}

#[cfg(test)]
use crate::DiagnosticKind;

#[cfg(test)]
fn parse_str(input: &str) -> Result<Dataset, ParseError> {
    parse_reader("test", input.as_bytes(), chrono_tz::Tz::UTC)
}

#[cfg(test)]
fn kinds(ds: &Dataset) -> Vec<&DiagnosticKind> {
    ds.diagnostics().iter().map(|d| &d.kind).collect()
}

#[test]
fn test_parse_linux() {
    let ds = parse_logfile("../nmon_test_data/linux_basic.nmon", chrono_tz::Tz::UTC).unwrap();
    assert!(ds.source() == "../nmon_test_data/linux_basic.nmon");
    assert!(ds.hostname() == "web01");
    assert!(ds.metadata("OS") == Some("Linux 5.15.0-91-generic"));
    assert!(ds.metadata("ARCH") == Some("x86_64"));
    assert!(ds.metadata("parsed_gmt_offset") == Some("0.0"));
    assert!(ds.metadata("note0").is_none());
    assert!(ds.system_info("/etc/release") == Some("DISTRIB_ID=Ubuntu\nDISTRIB_RELEASE=22.04"));
    assert!(ds.system_info("BBBL") == Some("Node Name,web01\nPartition Number,3\n"));

    let records = ds.records();
    assert!(records.len() == 3);
    assert!(records[0].timestamp() == "T0001");
    assert!(records[0].time().to_rfc3339() == "2024-01-01T00:00:05+00:00");
    assert!(ds.start_time() == Some(records[0].time()));
    assert!(ds.end_time() == Some(records[2].time()));
    assert!(records.windows(2).all(|w| w[0].time() <= w[1].time()));

    // Every row has exactly the field count of its type
    for r in records {
        for key in r.type_keys() {
            let ty = ds.type_of(key);
            assert!(r.get_data(ty).unwrap().len() == ty.field_count());
        }
    }

    let cpu_all = ds.get_type("CPU_ALL").unwrap();
    assert!(cpu_all.name() == "CPU Total");
    assert!(records[0].get_data(cpu_all) == Some(&[10.0, 5.0, 1.0, 84.0, 0.0, 2.0, 15.0][..]));

    let mem = ds.get_type("MEM").unwrap();
    assert!(mem.name() == "Memory MB");
    assert!(mem.field_count() == 19);
    assert!(records[0].get(mem, "memused") == Some(5000.0));
    assert!(records[0].get(mem, "realfree") == Some(5000.0));
    assert!(records[0].get(mem, "realused") == Some(3000.0));
    assert!(records[0].get(mem, "swapused") == Some(48.0));

    let diskbusy = ds.get_type("DISKBUSY").unwrap();
    assert!(records[0].get(diskbusy, "Total") == Some(20.0));

    let net_total = ds.get_type("NET_TOTAL").unwrap();
    assert!(records[0].get_data(net_total) == Some(&[10.0, 20.0, 30.0][..]));
    let packet_total = ds.get_type("NETPACKET_TOTAL").unwrap();
    assert!(records[0].get_data(packet_total) == Some(&[50.0, 60.0, 110.0][..]));
    assert!(ds.get_type("SEA_TOTAL").is_none());

    // Defined mid-stream, with nan and INF values
    let jfs = ds.get_type("JFSFILE").unwrap();
    assert!(!records[0].has_data(jfs));
    assert!(records[1].get_data(jfs) == Some(&[45.5, 0.0][..]));
    assert!(records[2].get(jfs, "/boot") == Some(f64::INFINITY));

    // T0002: a bad CPU001 column drops that row only
    let cpu001 = ds.get_type("CPU001").unwrap();
    assert!(records[0].has_data(cpu001));
    assert!(!records[1].has_data(cpu001));
    assert!(records[1].has_data(cpu_all));

    // T0002: a short MEM row can't be transformed and is padded
    assert!(records[1].get_data(mem).unwrap()[9] == 1.0);
    assert!(records[1].get_data(mem).unwrap()[10..].iter().all(|v| *v == 0.0));

    let ks = kinds(&ds);
    assert!(ks.len() == 4);
    assert!(*ks[0] == DiagnosticKind::InvalidNumber { type_id: "CPU001".to_string(), column: 3, value: "bogus".to_string() });
    assert!(matches!(ks[1], DiagnosticKind::TransformFailed { transform: "LinuxMemoryTransform", .. }));
    assert!(*ks[2] == DiagnosticKind::ShortRow { type_id: "MEM".to_string(), expected: 19, found: 10 });
    assert!(*ks[3] == DiagnosticKind::MisplacedRecord { expected: "T0002".to_string(), found: "T0001".to_string() });
    assert!(ds.diagnostics()[3].tick.as_deref() == Some("T0002"));
}

#[test]
fn test_parse_linux_processes() {
    let ds = parse_logfile("../nmon_test_data/linux_basic.nmon", chrono_tz::Tz::UTC).unwrap();
    let records = ds.records();

    let by_name = ds.processes_by_name();
    assert!(by_name.len() == 2);
    let java = &by_name["java"];
    let bash = &by_name["bash"];
    assert!(java.len() == 3);
    assert!(bash.len() == 1);

    let first = java[0];
    assert!(first.pid() == 1234);
    assert!(first.command_line() == Some("java -Xmx1g -cp a.jar,b.jar Main"));
    let ty = ds.process_type(first.id()).unwrap();
    assert!(ty.id() == "TOP" && ty.name() == "java");
    assert!(ty.fields()[3] == "%Wait");
    assert!(records[0].get_data(ty) == Some(&[15.0, 10.0, 3.0, 2.0, 4.0, 1000.0, 100.0, 200.0, 0.0, 1.5, 0.0][..]));

    let bash_ty = ds.process_type(bash[0].id()).unwrap();
    assert!(records[0].get(bash_ty, "%CPU") == Some(5.5));
    assert!(records[0].get(bash_ty, "%Wait") == Some(0.0));

    // pid 1234 changes command line at T0003: two identities, the T0003 row moved to the new one
    let last = java[2];
    assert!(last.pid() == 1234);
    assert!(last.command_line() == Some("java -Xmx2g Main"));
    assert!(first.end_time() == records[2].time());
    assert!(last.start_time() == records[2].time());
    assert!(!records[2].has_data(ty));
    assert!(records[2].has_data(ds.process_type(last.id()).unwrap()));

    // A second java, pid 5555, at T0002 only
    assert!(java[1].pid() == 5555);
    assert!(java[1].start_time() == records[1].time());
    assert!(java[1].end_time() == records[1].time());

    // The aggregate
    let aggregate = ds.processes().iter().find(|p| p.is_aggregate()).unwrap();
    assert!(aggregate.name() == "java");
    assert!(aggregate.command_line() == Some("all java processes"));
    assert!(aggregate.start_time() == records[0].time());
    assert!(aggregate.end_time() == records[2].time());
    let agg_ty = ds.process_type(aggregate.id()).unwrap();
    assert!(agg_ty.fields().last().unwrap() == "Count");
    assert!(records[0].get(agg_ty, "Count") == Some(1.0));
    assert!(records[1].get_data(agg_ty) == Some(&[24.0, 17.0, 5.0, 2.0, 5.0, 1500.0, 150.0, 260.0, 0.0, 2.0, 0.0, 2.0][..]));
    assert!(records[2].get(agg_ty, "Count") == Some(1.0));
    assert!(ds.processes().len() == 5);
}

#[test]
fn test_aix_bad_column() {
    let ds = parse_str(
        "AAA,host,lpar7\n\
         AAA,AIX,7.2.0.0\n\
         AAA,cpus,4\n\
         CPU_ALL,CPU Total lpar7,User%,Sys%,Wait%,Idle%,Busy,PhysicalCPUs\n\
         LPAR,Logical Partition lpar7,PhysicalCPU,virtualCPUs,logicalCPUs,poolCPUs,entitled\n\
         TOP,%CPU Utilisation\n\
         TOP,+PID,Time,%CPU,%Usr,%Sys,Threads,Size,ResText,ResData,CharIO,%RAM,Paging,Command,WLMclass\n\
         ZZZZ,T0001,10:00:00,15-MAR-2024\n\
         CPU_ALL,T0001,10.0,5.0,x5.0,80.0,0.0,4.0\n\
         LPAR,T0001,0.5,2,8,16,1.0\n\
         TOP,4711,T0001,8.0,6.0,2.0,12,100,10,20,0,1.5,0,db2sysc,Unclassified\n",
    )
    .unwrap();

    let r = &ds.records()[0];
    assert!(r.timestamp() == "T0001");
    assert!(!r.has_data(ds.get_type("CPU_ALL").unwrap()));
    let lpar = ds.get_type("LPAR").unwrap();
    assert!(r.get_data(lpar) == Some(&[0.5, 2.0, 8.0, 16.0, 1.0, 50.0, 3.125][..]));

    let d = &ds.diagnostics()[0];
    assert!(ds.diagnostics().len() == 1);
    assert!(d.tick.as_deref() == Some("T0001"));
    assert!(d.kind == DiagnosticKind::InvalidNumber { type_id: "CPU_ALL".to_string(), column: 5, value: "x5.0".to_string() });

    // No CPU_ALL data in the tick, so the declared 4 CPUs are used
    let db2 = &ds.processes()[0];
    assert!(db2.name() == "db2sysc");
    let ty = ds.process_type(db2.id()).unwrap();
    assert!(ty.fields().last().unwrap() == "Paging");
    assert!(r.get(ty, "%CPU") == Some(2.0));
    assert!(r.get(ty, "%Usr") == Some(1.5));
    assert!(r.get(ty, "%RAM") == Some(0.375));
}

#[test]
fn test_parse_aix() {
    let ds = parse_logfile("../nmon_test_data/aix_basic.nmon", chrono_tz::Tz::UTC).unwrap();
    assert!(ds.hostname() == "lpar7");
    assert!(ds.metadata("AIX") == Some("7.2.5.0"));
    assert!(ds.metadata("cpus") == Some("4"));
    assert!(ds.system_info("BBBL") == Some("lparno,7\nlparname,lpar7\n"));
    assert!(ds.system_info("lsconf") == Some("System Model: IBM 9009-42A\nProcessor Type: PowerPC_POWER9"));

    // Written after the last record, behind the definition that closes it
    assert!(ds.system_info("lsps") == Some("hd6 rootvg 4096MB\npaging00 datavg 2048MB"));
    assert!(ds.get_type("NO-JFS2-FSBUF-COUNT").is_none());

    let records = ds.records();
    assert!(records.len() == 2);
    assert!(records[1].time().to_rfc3339() == "2024-03-15T10:00:10+00:00");

    let cpu_all = ds.get_type("CPU_ALL").unwrap();
    assert!(cpu_all.name() == "CPU Total");
    assert!(records[0].get_data(cpu_all) == Some(&[10.0, 5.0, 1.0, 84.0, 0.0, 0.75, 15.0][..]));
    assert!(records[1].get(cpu_all, "CPU%") == Some(30.0));

    let pcpu = ds.get_type("PCPU_ALL").unwrap();
    assert!(pcpu.fields()[5..] == ["Total", "CPU%"]);
    assert!(records[0].get(pcpu, "Total") == Some(2.0));
    assert!(records[0].get(pcpu, "CPU%") == Some(37.5));
    assert!(records[1].get(pcpu, "CPU%") == Some(75.0));
    let scpu = ds.get_type("SCPU01").unwrap();
    assert!(records[0].get(scpu, "CPU%") == Some(75.0));

    let mem = ds.get_type("MEM").unwrap();
    assert!(mem.field_count() == 8);
    assert!(records[0].get(mem, "Real Used(MB)") == Some(4096.0));
    assert!(records[0].get(mem, "Virtual Used(MB)") == Some(1024.0));

    let lpar = ds.get_type("LPAR").unwrap();
    assert!(records[0].get_data(lpar) == Some(&[0.75, 2.0, 8.0, 16.0, 1.5, 128.0, 10.0, 50.0, 4.6875][..]));
    assert!(records[1].get(lpar, "%Entitlement Used") == Some(100.0));
    assert!(records[1].get(lpar, "%Pool Used") == Some(9.375));

    let diskbusy = ds.get_type("DISKBUSY").unwrap();
    assert!(records[0].get(diskbusy, "Total") == Some(20.0));

    // SEA and SEA1 form one family, SEAPACKET another
    let sea_total = ds.get_type("SEA_TOTAL").unwrap();
    assert!(sea_total.name() == "SEA Total");
    assert!(records[0].get_data(sea_total) == Some(&[220.0, 110.0, 330.0][..]));
    assert!(records[1].get_data(sea_total) == Some(&[300.0, 100.0, 400.0][..]));
    let seapacket_total = ds.get_type("SEAPACKET_TOTAL").unwrap();
    assert!(records[0].get_data(seapacket_total) == Some(&[150.0, 75.0, 225.0][..]));
    assert!(!records[1].has_data(seapacket_total));
    assert!(records[0].get_data(ds.get_type("NET_TOTAL").unwrap()) == Some(&[100.0, 50.0, 150.0][..]));
    assert!(records[0].get_data(ds.get_type("NETPACKET_TOTAL").unwrap()) == Some(&[80.0, 40.0, 120.0][..]));

    // The name is before the WLM class, and every percentage is divided by the 4 CPUs
    let procs = ds.processes();
    assert!(procs.len() == 2);
    let db2 = &procs[0];
    assert!(db2.pid() == 4711 && db2.name() == "db2sysc");
    assert!(db2.command_line() == Some("db2sysc 0,1"));
    assert!(db2.end_time() == records[1].time());
    let ty = ds.process_type(db2.id()).unwrap();
    assert!(ty.fields().len() == 11 && ty.fields().last().unwrap() == "Paging");
    assert!(records[0].get_data(ty) == Some(&[2.0, 1.5, 0.5, 0.0, 12.0, 100.0, 10.0, 20.0, 0.0, 0.5, 0.0][..]));
    assert!(records[1].get(ty, "%CPU") == Some(3.0));

    let java = &procs[1];
    assert!(java.command_line() == Some("java -cp a.jar Main"));
    let ty = ds.process_type(java.id()).unwrap();
    assert!(records[0].get(ty, "%Wait") == Some(0.25));
    assert!(records[0].get(ty, "%RAM") == Some(0.25));
    assert!(!records[1].has_data(ty));

    // The T0002 MEM row has one value too many for the transform
    assert!(!records[1].has_data(mem));
    let ks = kinds(&ds);
    assert!(ks.len() == 1);
    assert!(*ks[0] == DiagnosticKind::LongRow { type_id: "MEM".to_string(), expected: 6, found: 7 });
}

#[test]
fn test_rename_within_tick() {
    let ds = parse_str(
        "AAA,host,h\n\
         CPU_ALL,CPU Total h,User%,Sys%\n\
         TOP,+PID,Time,%CPU,%Usr,%Sys,Size,Command\n\
         ZZZZ,T0001,00:00:00,01-FEB-2024\n\
         TOP,42,T0001,2,1,1,10,java\n\
         TOP,42,T0001,4,2,2,20,java2\n",
    )
    .unwrap();

    let procs = ds.processes();
    assert!(procs.len() == 2);
    let r = &ds.records()[0];
    assert!(procs[0].pid() == 42 && procs[1].pid() == 42);
    assert!(procs[0].end_time() == r.time());
    assert!(!r.has_data(ds.process_type(procs[0].id()).unwrap()));
    assert!(r.get(ds.process_type(procs[1].id()).unwrap(), "Size") == Some(20.0));
}

#[test]
fn test_no_data_records() {
    let err = parse_str("AAA,host,h\nCPU_ALL,CPU Total,User%,Sys%\n").unwrap_err();
    assert!(matches!(err, ParseError::NoDataRecords { .. }));
    assert!(err.to_string() == "file 'test' does not appear to have any data records");

    assert!(matches!(parse_str("").unwrap_err(), ParseError::NoDataRecords { .. }));
    assert!(matches!(
        parse_logfile("../nmon_test_data/no_such_file.nmon", chrono_tz::Tz::UTC).unwrap_err(),
        ParseError::Io(_)
    ));
}

#[test]
fn test_no_open_record() {
    // Rows of ignorable types are fine without a record
    let ds = parse_str(
        "CPU_ALL,CPU Total,User%,Sys%\n\
         ZZZZ,T0001,00:00:00,01-FEB-2024\n\
         CPU_ALL,T0001,1,2\n\
         ZZZZ,T0002,25:00:00,01-FEB-2024\n\
         AVM-IN-MB,T0002,12\n\
         ZZZZ,T0003\n\
         NO-PBUF-COUNT,T0003,1\n",
    )
    .unwrap();
    assert!(ds.records().len() == 1);
    let ks = kinds(&ds);
    assert!(matches!(ks[0], DiagnosticKind::InvalidTimestamp { .. }));
    assert!(matches!(ks[1], DiagnosticKind::InvalidRecord { .. }));

    let err = parse_str(
        "CPU_ALL,CPU Total,User%,Sys%\n\
         ZZZZ,T0001,00:00:00,01-FEB-2024\n\
         CPU_ALL,T0001,1,2\n\
         ZZZZ,T0002,00:00:10,31-FEB-2024\n\
         CPU_ALL,T0002,1,2\n",
    )
    .unwrap_err();
    assert!(matches!(err, ParseError::NoOpenRecord { line: 5 }));
}

#[test]
fn test_sealing_definition() {
    // The NO-JFS2-FSBUF-COUNT definition at the end of an AIX file closes the last record
    let ds = parse_str(
        "AAA,AIX,7.2\n\
         CPU_ALL,CPU Total,User%,Sys%\n\
         ZZZZ,T0001,00:00:00,01-FEB-2024\n\
         CPU_ALL,T0001,1,2\n\
         NO-JFS2-FSBUF-COUNT,No JFS2 fsbuf count,hdisk0\n\
         NO-JFS2-FSBUF-COUNT,T0001,5\n\
         AVM-IN-MB,T0001,100\n\
         BBBP,900,lsps,\"hd6 rootvg\"\n",
    )
    .unwrap();
    assert!(ds.records().len() == 1);
    assert!(ds.get_type("NO-JFS2-FSBUF-COUNT").is_none());
    assert!(ds.records()[0].get(ds.get_type("CPU_ALL").unwrap(), "CPU%") == Some(3.0));
    assert!(ds.system_info("lsps") == Some("hd6 rootvg"));
    assert!(ds.diagnostics().is_empty());
}

#[test]
fn test_undefined_type() {
    let ds = parse_str(
        "CPU_ALL,CPU Total,User%,Sys%\n\
         ZZZZ,T0001,00:00:00,01-FEB-2024\n\
         VM,T0001,1,2\n\
         ERROR,T0001,something went wrong\n\
         X\n",
    )
    .unwrap();
    let ks = kinds(&ds);
    assert!(ks.len() == 2);
    assert!(*ks[0] == DiagnosticKind::UndefinedType { type_id: "VM".to_string() });
    assert!(matches!(ks[1], DiagnosticKind::InvalidRecord { .. }));
    assert!(ds.diagnostics()[0].line == 3);
}

#[test]
fn test_timezone() {
    let ds = parse_reader(
        "test",
        "CPU_ALL,CPU Total,User%,Sys%\nZZZZ,T0001,12:00:00,01-JUL-2024\n".as_bytes(),
        chrono_tz::Europe::Oslo,
    )
    .unwrap();
    assert!(ds.records()[0].time().to_rfc3339() == "2024-07-01T10:00:00+00:00");
}

#[test]
fn test_dst_fold() {
    // Oslo turns the clock back from 03:00 to 02:00 on 27 October 2024
    let ds = parse_reader(
        "test",
        "CPU_ALL,CPU Total,User%,Sys%\n\
         ZZZZ,T0001,02:55:00,27-OCT-2024\n\
         CPU_ALL,T0001,1,2\n\
         ZZZZ,T0002,02:00:00,27-OCT-2024\n\
         CPU_ALL,T0002,1,2\n\
         ZZZZ,T0003,02:05:00,27-OCT-2024\n\
         CPU_ALL,T0003,1,2\n"
            .as_bytes(),
        chrono_tz::Europe::Oslo,
    )
    .unwrap();
    let records = ds.records();
    assert!(records[0].time().to_rfc3339() == "2024-10-27T00:55:00+00:00");
    assert!(records[1].time().to_rfc3339() == "2024-10-27T01:00:00+00:00");
    assert!(records[2].time().to_rfc3339() == "2024-10-27T01:05:00+00:00");
    assert!(ds.start_time() < ds.end_time());
    assert!(ds.diagnostics().is_empty());
}

#[test]
fn test_records_in_time_order() {
    // The clock was stepped back between the samples
    let ds = parse_str(
        "CPU_ALL,CPU Total,User%,Sys%\n\
         ZZZZ,T0001,10:00:10,01-FEB-2024\n\
         CPU_ALL,T0001,1,2\n\
         ZZZZ,T0002,10:00:00,01-FEB-2024\n\
         CPU_ALL,T0002,3,4\n",
    )
    .unwrap();
    let records = ds.records();
    assert!(records[0].timestamp() == "T0002");
    assert!(records[1].timestamp() == "T0001");
    assert!(records[0].get(ds.get_type("CPU_ALL").unwrap(), "CPU%") == Some(7.0));
    assert!(ds.start_time().unwrap().to_rfc3339() == "2024-02-01T10:00:00+00:00");
    assert!(ds.end_time().unwrap().to_rfc3339() == "2024-02-01T10:00:10+00:00");
}

#[test]
fn test_top_schema_mid_stream() {
    let ds = parse_str(
        "AAA,host,h\n\
         CPU_ALL,CPU Total h,User%,Sys%\n\
         TOP,+PID,Time,%CPU,%Usr,%Sys,Size,Command\n\
         ZZZZ,T0001,00:00:00,01-FEB-2024\n\
         TOP,42,T0001,2,1,1,10,java\n\
         TOP,+PID,Time,%CPU,%Usr,%Sys,Threads,Size,ResSet,Command\n\
         ZZZZ,T0002,00:00:10,01-FEB-2024\n\
         TOP,42,T0002,4,2,2,20,java\n",
    )
    .unwrap();

    // The header's schema stays in force
    assert!(ds.processes().len() == 1);
    let ty = ds.process_type(ds.processes()[0].id()).unwrap();
    assert!(ty.fields() == ["%CPU", "%Usr", "%Sys", "%Wait", "Size"]);
    assert!(ds.records()[1].get(ty, "Size") == Some(20.0));
    assert!(ds.diagnostics().is_empty());
}

#[test]
fn test_transformed_long_row() {
    let ds = parse_str(
        "CPU_ALL,CPU Total,User%,Sys%\n\
         ZZZZ,T0001,00:00:00,01-FEB-2024\n\
         CPU_ALL,T0001,1,2,3\n\
         ZZZZ,T0002,00:00:10,01-FEB-2024\n\
         CPU_ALL,T0002,1,2\n",
    )
    .unwrap();

    // Long enough to fill CPU%, but it is not a raw row and is not attached
    let cpu_all = ds.get_type("CPU_ALL").unwrap();
    assert!(!ds.records()[0].has_data(cpu_all));
    assert!(ds.records()[1].get(cpu_all, "CPU%") == Some(3.0));
    let d = &ds.diagnostics()[0];
    assert!(ds.diagnostics().len() == 1);
    assert!(d.tick.as_deref() == Some("T0001"));
    assert!(d.kind == DiagnosticKind::LongRow { type_id: "CPU_ALL".to_string(), expected: 2, found: 3 });
}
