// Summary and metadata printers

use crate::format;
use crate::{format_time, Context, PrintArgs};

use anyhow::Result;
use chrono_tz::Tz;
use nmonlog::{gmt_offset_hours, Dataset};
use std::collections::HashMap;
use std::io::{self, Write};

type SummaryDatum<'a> = &'a Dataset;
type SummaryCtx = Tz;

pub fn print_summary(
    output: &mut dyn io::Write,
    datasets: &[Dataset],
    tz: Tz,
    print_args: &PrintArgs,
) -> Result<()> {
    let mut formatters: HashMap<String, &dyn Fn(&SummaryDatum, SummaryCtx) -> String> = HashMap::new();
    formatters.insert("file".to_string(), &format_file);
    formatters.insert("host".to_string(), &format_host);
    formatters.insert("os".to_string(), &format_os);
    formatters.insert("arch".to_string(), &format_arch);
    formatters.insert("cpus".to_string(), &format_cpus);
    formatters.insert("start".to_string(), &format_start);
    formatters.insert("end".to_string(), &format_end);
    formatters.insert("gmt-offset".to_string(), &format_gmt_offset);
    formatters.insert("records".to_string(), &format_records);
    formatters.insert("types".to_string(), &format_types);
    formatters.insert("processes".to_string(), &format_processes);
    formatters.insert("diagnostics".to_string(), &format_diagnostics);

    let spec = print_args
        .fmt
        .as_deref()
        .unwrap_or("file,host,start,end,records,types,processes,diagnostics");
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others);
    let data = datasets.iter().collect::<Vec<SummaryDatum>>();
    format::format_data(output, &fields, &formatters, &opts, &data, tz)
}

fn format_file(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.source().to_string()
}

fn format_host(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.hostname().to_string()
}

fn format_os(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.metadata("OS").unwrap_or("").to_string()
}

fn format_arch(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.metadata("ARCH").unwrap_or("").to_string()
}

fn format_cpus(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.metadata("cpus").unwrap_or("").to_string()
}

fn format_start(d: &SummaryDatum, tz: SummaryCtx) -> String {
    d.start_time().map(|t| format_time(t, tz)).unwrap_or_default()
}

fn format_end(d: &SummaryDatum, tz: SummaryCtx) -> String {
    d.end_time().map(|t| format_time(t, tz)).unwrap_or_default()
}

// This is the offset of the printing zone, which is also the zone the file was read in.
fn format_gmt_offset(d: &SummaryDatum, tz: SummaryCtx) -> String {
    match d.start_time() {
        Some(t) => format!("{}", gmt_offset_hours(&tz, t)),
        None => "".to_string(),
    }
}

fn format_records(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.records().len().to_string()
}

fn format_types(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.ordinary_types().count().to_string()
}

fn format_processes(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.processes().iter().filter(|p| !p.is_aggregate()).count().to_string()
}

fn format_diagnostics(d: &SummaryDatum, _: SummaryCtx) -> String {
    d.diagnostics().len().to_string()
}

type MetaDatum<'a> = (&'a str, &'a str);

/// Print the metadata of the file as key/value rows, or with `system_info` the system information
/// blocks.  The blocks span many lines, so in fixed-width form each block is printed under a
/// heading of its own.

pub fn print_metadata(
    output: &mut dyn io::Write,
    ctx: Context,
    system_info: bool,
    print_args: &PrintArgs,
) -> Result<()> {
    let mut formatters: HashMap<String, &dyn Fn(&MetaDatum, Context) -> String> = HashMap::new();
    formatters.insert("file".to_string(), &format_meta_file);
    formatters.insert("key".to_string(), &format_meta_key);
    formatters.insert("value".to_string(), &format_meta_value);

    let spec = print_args.fmt.as_deref().unwrap_or("key,value");
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others);

    if !system_info {
        let data = ctx.dataset.metadata_entries().collect::<Vec<MetaDatum>>();
        return format::format_data(output, &fields, &formatters, &opts, &data, ctx);
    }

    let data = ctx.dataset.system_info_entries().collect::<Vec<MetaDatum>>();
    if opts.csv || opts.json {
        return format::format_data(output, &fields, &formatters, &opts, &data, ctx);
    }
    for (key, text) in data {
        writeln!(output, "{}:", key)?;
        for line in text.lines() {
            writeln!(output, "    {}", line)?;
        }
    }
    Ok(())
}

fn format_meta_file(_: &MetaDatum, ctx: Context) -> String {
    ctx.dataset.source().to_string()
}

fn format_meta_key((key, _): &MetaDatum, _: Context) -> String {
    key.to_string()
}

fn format_meta_value((_, value): &MetaDatum, _: Context) -> String {
    value.to_string()
}

#[test]
fn test_print_summary() {
    let ds = nmonlog::parse_logfile("../nmon_test_data/linux_basic.nmon", Tz::UTC).unwrap();
    let print_args = PrintArgs { fmt: Some("csv,header,host,start,end,records,processes".to_string()) };
    let mut out = vec![];
    print_summary(&mut out, &[ds], Tz::UTC, &print_args).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "host,start,end,records,processes\n\
                web01,2024-01-01 00:00:05,2024-01-01 00:00:15,3,4\n"
    );
}

#[test]
fn test_print_metadata() {
    let ds = nmonlog::parse_logfile("../nmon_test_data/linux_basic.nmon", Tz::UTC).unwrap();
    let ctx = Context { dataset: &ds, tz: Tz::UTC };
    let mut out = vec![];
    print_metadata(&mut out, ctx, true, &PrintArgs::default()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("BBBL:\n    Node Name,web01\n    Partition Number,3\n"));
}
