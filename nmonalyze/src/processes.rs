// Process identity printer
//
// One row per process identity.  A pid that was reused shows up once per identity, with disjoint
// lifetimes, and the aggregates synthesized for names with several identities have pid -1.

use crate::format;
use crate::{format_time, Context, ProcessesArgs};

use anyhow::Result;
use nmonlog::Process;
use std::collections::HashMap;
use std::io;

type ProcDatum<'a> = &'a Process;

pub fn print_processes(output: &mut dyn io::Write, ctx: Context, args: &ProcessesArgs) -> Result<()> {
    let mut formatters: HashMap<String, &dyn Fn(&ProcDatum, Context) -> String> = HashMap::new();
    formatters.insert("file".to_string(), &format_file);
    formatters.insert("pid".to_string(), &format_pid);
    formatters.insert("name".to_string(), &format_name);
    formatters.insert("start".to_string(), &format_start);
    formatters.insert("end".to_string(), &format_end);
    formatters.insert("samples".to_string(), &format_samples);
    formatters.insert("cpu-avg".to_string(), &format_cpu_avg);
    formatters.insert("cpu-peak".to_string(), &format_cpu_peak);
    formatters.insert("cmd".to_string(), &format_command);

    let spec = args
        .print_args
        .fmt
        .as_deref()
        .unwrap_or("pid,name,start,end,samples,cpu-avg,cmd");
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others);

    let data = ctx
        .dataset
        .processes()
        .iter()
        .filter(|p| args.name.is_empty() || args.name.iter().any(|n| n == p.name()))
        .filter(|p| args.pid.is_empty() || args.pid.contains(&p.pid()))
        .filter(|p| !(args.no_aggregates && p.is_aggregate()))
        .collect::<Vec<ProcDatum>>();
    format::format_data(output, &fields, &formatters, &opts, &data, ctx)
}

// The %CPU values of the process in the records where it has data.
fn cpu_values(p: &Process, ctx: Context) -> Vec<f64> {
    match ctx.dataset.process_type(p.id()) {
        Some(ty) => ctx
            .dataset
            .records()
            .iter()
            .filter_map(|r| r.get(ty, "%CPU"))
            .collect(),
        None => vec![],
    }
}

fn format_file(_: &ProcDatum, ctx: Context) -> String {
    ctx.dataset.source().to_string()
}

fn format_pid(p: &ProcDatum, _: Context) -> String {
    p.pid().to_string()
}

fn format_name(p: &ProcDatum, _: Context) -> String {
    p.name().to_string()
}

fn format_start(p: &ProcDatum, ctx: Context) -> String {
    format_time(p.start_time(), ctx.tz)
}

fn format_end(p: &ProcDatum, ctx: Context) -> String {
    format_time(p.end_time(), ctx.tz)
}

fn format_samples(p: &ProcDatum, ctx: Context) -> String {
    match ctx.dataset.process_type(p.id()) {
        Some(ty) => ctx.dataset.records().iter().filter(|r| r.has_data(ty)).count().to_string(),
        None => "0".to_string(),
    }
}

fn format_cpu_avg(p: &ProcDatum, ctx: Context) -> String {
    let values = cpu_values(p, ctx);
    if values.is_empty() {
        return "".to_string();
    }
    format!("{:.1}", values.iter().sum::<f64>() / values.len() as f64)
}

fn format_cpu_peak(p: &ProcDatum, ctx: Context) -> String {
    cpu_values(p, ctx)
        .into_iter()
        .reduce(f64::max)
        .map(|v| format!("{:.1}", v))
        .unwrap_or_default()
}

fn format_command(p: &ProcDatum, _: Context) -> String {
    p.command_line().unwrap_or("_unknown_").to_string()
}

#[cfg(test)]
fn test_args(name: &str, fmt: &str) -> ProcessesArgs {
    ProcessesArgs {
        input_args: crate::InputArgs { timezone: chrono_tz::Tz::UTC, logfiles: vec![] },
        name: vec![name.to_string()],
        pid: vec![],
        no_aggregates: false,
        print_args: crate::PrintArgs { fmt: Some(fmt.to_string()) },
        meta_args: crate::MetaArgs { log_level: "warn".to_string(), verbose: false },
    }
}

#[test]
fn test_print_processes() {
    let ds = nmonlog::parse_logfile("../nmon_test_data/linux_basic.nmon", chrono_tz::Tz::UTC).unwrap();
    let ctx = Context { dataset: &ds, tz: chrono_tz::Tz::UTC };

    let mut out = vec![];
    print_processes(&mut out, ctx, &test_args("bash", "csv,pid,name,samples,cmd")).unwrap();
    assert!(String::from_utf8(out).unwrap() == "4321,bash,3,-bash\n");

    // Three java identities (one of them a pid reuse) and their aggregate
    let mut out = vec![];
    print_processes(&mut out, ctx, &test_args("java", "csv,pid")).unwrap();
    let pids = String::from_utf8(out).unwrap();
    assert!(pids.lines().filter(|l| *l == "1234").count() == 2);
    assert!(pids.lines().filter(|l| *l == "5555").count() == 1);
    assert!(pids.lines().filter(|l| *l == "-1").count() == 1);
}
