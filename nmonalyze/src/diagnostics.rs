// Diagnostics printer

use crate::format;
use crate::{Context, PrintArgs};

use anyhow::Result;
use nmonlog::Diagnostic;
use std::collections::HashMap;
use std::io;

type DiagDatum<'a> = &'a Diagnostic;

pub fn print_diagnostics(
    output: &mut dyn io::Write,
    ctx: Context,
    no_benign: bool,
    print_args: &PrintArgs,
) -> Result<()> {
    let mut formatters: HashMap<String, &dyn Fn(&DiagDatum, Context) -> String> = HashMap::new();
    formatters.insert("file".to_string(), &format_file);
    formatters.insert("line".to_string(), &format_line);
    formatters.insert("tick".to_string(), &format_tick);
    formatters.insert("benign".to_string(), &format_benign);
    formatters.insert("message".to_string(), &format_message);

    let spec = print_args.fmt.as_deref().unwrap_or("file,line,tick,message");
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others);

    let data = ctx
        .dataset
        .diagnostics()
        .iter()
        .filter(|d| !(no_benign && d.kind.is_benign()))
        .collect::<Vec<DiagDatum>>();
    format::format_data(output, &fields, &formatters, &opts, &data, ctx)
}

fn format_file(_: &DiagDatum, ctx: Context) -> String {
    ctx.dataset.source().to_string()
}

fn format_line(d: &DiagDatum, _: Context) -> String {
    d.line.to_string()
}

fn format_tick(d: &DiagDatum, _: Context) -> String {
    d.tick.clone().unwrap_or_default()
}

fn format_benign(d: &DiagDatum, _: Context) -> String {
    (if d.kind.is_benign() { "yes" } else { "no" }).to_string()
}

fn format_message(d: &DiagDatum, _: Context) -> String {
    d.kind.to_string()
}
