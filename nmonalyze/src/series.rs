// Time series printer
//
// Prints the rows of one data type, one line per record that has a row for the type.  The field
// names of the type are the field names of the output, so `--fmt` can select among them, in
// addition to `time` and `tick`.

use crate::format;
use crate::{format_time, Context, SeriesArgs};

use anyhow::{bail, Result};
use nmonlog::{DataRecord, DataType};
use std::collections::HashMap;
use std::io;

type SeriesDatum<'a> = &'a DataRecord;

#[derive(Clone, Copy)]
struct SeriesCtx<'a> {
    ctx: Context<'a>,
    ty: &'a DataType,
}

type SeriesFormatter = Box<dyn Fn(&SeriesDatum, SeriesCtx) -> String>;

pub fn print_series(output: &mut dyn io::Write, ctx: Context, args: &SeriesArgs) -> Result<()> {
    let ty = match (&args.type_id, &args.process) {
        (Some(id), _) => match ctx.dataset.get_type(id) {
            Some(ty) => ty,
            None => bail!("No data type {} in {}", id, ctx.dataset.source()),
        },
        (None, Some(name)) => match find_process_type(ctx, name) {
            Some(ty) => ty,
            None => bail!("No process {} in {}", name, ctx.dataset.source()),
        },
        (None, None) => bail!("One of --type and --process is required"),
    };

    let formatters = series_formatters(ty);
    let default_spec = format!("time,{}", ty.fields().join(","));
    let spec = args.print_args.fmt.as_deref().unwrap_or(&default_spec);
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others);

    let data = ctx
        .dataset
        .records()
        .iter()
        .filter(|r| r.has_data(ty))
        .collect::<Vec<SeriesDatum>>();
    format::format_data(output, &fields, &formatters, &opts, &data, SeriesCtx { ctx, ty })
}

// The aggregate if the name has one, otherwise the single identity with the name.
fn find_process_type<'a>(ctx: Context<'a>, name: &str) -> Option<&'a DataType> {
    let processes = ctx.dataset.processes();
    let process = processes
        .iter()
        .find(|p| p.is_aggregate() && p.name() == name)
        .or_else(|| processes.iter().find(|p| p.name() == name))?;
    ctx.dataset.process_type(process.id())
}

fn series_formatters(ty: &DataType) -> HashMap<String, SeriesFormatter> {
    let mut formatters: HashMap<String, SeriesFormatter> = HashMap::new();
    formatters.insert("time".to_string(), Box::new(format_series_time));
    formatters.insert("tick".to_string(), Box::new(format_series_tick));
    for (ix, field) in ty.fields().iter().enumerate() {
        let formatter: SeriesFormatter = Box::new(move |r, c| match r.get_data(c.ty) {
            Some(row) => row[ix].to_string(),
            None => "".to_string(),
        });
        formatters.insert(field.clone(), formatter);
    }
    formatters
}

fn format_series_time(r: &SeriesDatum, c: SeriesCtx) -> String {
    format_time(r.time(), c.ctx.tz)
}

fn format_series_tick(r: &SeriesDatum, _: SeriesCtx) -> String {
    r.timestamp().to_string()
}

#[test]
fn test_print_series() {
    let ds = nmonlog::parse_logfile("../nmon_test_data/linux_basic.nmon", chrono_tz::Tz::UTC).unwrap();
    let ctx = Context { dataset: &ds, tz: chrono_tz::Tz::UTC };
    let args = SeriesArgs {
        input_args: crate::InputArgs { timezone: chrono_tz::Tz::UTC, logfiles: vec![] },
        type_id: Some("CPU_ALL".to_string()),
        process: None,
        print_args: crate::PrintArgs { fmt: Some("csv,tick,User%,CPU%".to_string()) },
        meta_args: crate::MetaArgs { log_level: "warn".to_string(), verbose: false },
    };
    let mut out = vec![];
    print_series(&mut out, ctx, &args).unwrap();
    assert!(String::from_utf8(out).unwrap() == "T0001,10,15\nT0002,12,16\nT0003,8,10\n");

    let args = SeriesArgs { type_id: Some("NOSUCH".to_string()), ..args };
    assert!(print_series(&mut Vec::<u8>::new(), ctx, &args).is_err());
}
