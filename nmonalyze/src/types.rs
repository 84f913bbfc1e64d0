// Data type printer

use crate::format;
use crate::{Context, PrintArgs};

use anyhow::Result;
use nmonlog::DataType;
use std::collections::HashMap;
use std::io;

type TypeDatum<'a> = &'a DataType;

/// Print the ordinary types ordered by id, and with `all` the per-process types after them in
/// creation order.

pub fn print_types(output: &mut dyn io::Write, ctx: Context, all: bool, print_args: &PrintArgs) -> Result<()> {
    let mut formatters: HashMap<String, &dyn Fn(&TypeDatum, Context) -> String> = HashMap::new();
    formatters.insert("file".to_string(), &format_file);
    formatters.insert("id".to_string(), &format_id);
    formatters.insert("name".to_string(), &format_name);
    formatters.insert("process".to_string(), &format_process);
    formatters.insert("count".to_string(), &format_count);
    formatters.insert("fields".to_string(), &format_fields);
    formatters.insert("records".to_string(), &format_records);

    let spec = print_args.fmt.as_deref().unwrap_or("id,name,count,records,fields");
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others);

    let mut data = ctx.dataset.ordinary_types().collect::<Vec<TypeDatum>>();
    if all {
        data.extend(ctx.dataset.types().iter().filter(|ty| ty.process().is_some()));
    }
    format::format_data(output, &fields, &formatters, &opts, &data, ctx)
}

fn format_file(_: &TypeDatum, ctx: Context) -> String {
    ctx.dataset.source().to_string()
}

fn format_id(ty: &TypeDatum, _: Context) -> String {
    ty.id().to_string()
}

fn format_name(ty: &TypeDatum, _: Context) -> String {
    ty.name().to_string()
}

// "pid/name" for a process type, empty otherwise
fn format_process(ty: &TypeDatum, ctx: Context) -> String {
    match ty.process() {
        Some(id) => {
            let p = ctx.dataset.process(id);
            format!("{}/{}", p.pid(), p.name())
        }
        None => "".to_string(),
    }
}

fn format_count(ty: &TypeDatum, _: Context) -> String {
    ty.field_count().to_string()
}

fn format_fields(ty: &TypeDatum, _: Context) -> String {
    ty.fields().join(",")
}

// The number of records with a row for the type.
fn format_records(ty: &TypeDatum, ctx: Context) -> String {
    ctx.dataset
        .records()
        .iter()
        .filter(|r| r.has_data(ty))
        .count()
        .to_string()
}
