// Generic formatting code for a set of data extracted from a data structure to be presented
// columnar, as csv, or as json, with or without a header.
//
// The fields to print and the control words (csv, json, header, noheader) share one
// comma-separated spec, as given by --fmt.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`

pub fn parse_fields<'a, FmtT>(spec: &'a str, formatters: &HashMap<String, FmtT>) -> (Vec<&'a str>, HashSet<&'a str>) {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if !x.is_empty() {
            others.insert(x);
        }
    }
    (fields, others)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub csv: bool,    // csv explicitly requested
    pub json: bool,   // json explicitly requested and not csv
    pub header: bool, // fixed output unless noheader, csv only if header
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csv = others.contains("csv");
    let json = others.contains("json") && !csv;
    // json gets no header, even if one is requested
    let header = (!csv && !json && !others.contains("noheader")) || (csv && others.contains("header"));
    FormatOptions { csv, json, header }
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.

pub fn format_data<DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: &[DataT],
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let fmts = fields
        .iter()
        .filter_map(|kwd| formatters.get(*kwd))
        .collect::<Vec<&FmtT>>();
    let rows = data
        .iter()
        .map(|x| fmts.iter().map(|f| f(x, ctx)).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();

    if opts.csv {
        format_csv(output, fields, opts, &rows)
    } else if opts.json {
        format_json(output, fields, &rows)
    } else {
        format_fixed_width(output, fields, opts, &rows)
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: &[Vec<String>],
) -> Result<()> {
    // The column width is the max across all the entries in the column (including header, if
    // present).
    let mut widths = vec![0; fields.len()];
    if opts.header {
        for (w, kwd) in widths.iter_mut().zip(fields) {
            *w = usize::max(*w, kwd.len());
        }
    }
    for row in rows {
        for (w, val) in widths.iter_mut().zip(row) {
            *w = usize::max(*w, val.len());
        }
    }

    if opts.header {
        write_line(output, &widths, fields.iter().copied())?;
    }
    for row in rows {
        write_line(output, &widths, row.iter().map(|v| v.as_str()))?;
    }
    Ok(())
}

fn write_line<'a>(
    output: &mut dyn io::Write,
    widths: &[usize],
    vals: impl Iterator<Item = &'a str>,
) -> io::Result<()> {
    let mut s = "".to_string();
    for (w, val) in widths.iter().zip(vals) {
        s += format!("{:w$}  ", val, w = *w).as_str();
    }
    output.write_all(s.trim_end().as_bytes())?;
    output.write_all(b"\n")
}

fn format_csv(output: &mut dyn io::Write, fields: &[&str], opts: &FormatOptions, rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    if opts.header {
        writer.write_record(fields)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_json(output: &mut dyn io::Write, fields: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let objects = rows
        .iter()
        .map(|row| {
            let obj = fields
                .iter()
                .zip(row)
                .map(|(kwd, val)| (kwd.to_string(), serde_json::Value::String(val.clone())))
                .collect::<serde_json::Map<String, serde_json::Value>>();
            serde_json::Value::Object(obj)
        })
        .collect::<Vec<serde_json::Value>>();
    serde_json::to_writer(&mut *output, &objects)?;
    output.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
type TestDatum = (&'static str, u32);

#[cfg(test)]
fn test_formatters() -> HashMap<String, &'static dyn Fn(&TestDatum, bool) -> String> {
    fn format_name(x: &TestDatum, _: bool) -> String {
        x.0.to_string()
    }
    fn format_count(x: &TestDatum, double: bool) -> String {
        (if double { 2 * x.1 } else { x.1 }).to_string()
    }
    let mut formatters: HashMap<String, &'static dyn Fn(&TestDatum, bool) -> String> = HashMap::new();
    formatters.insert("name".to_string(), &format_name);
    formatters.insert("count".to_string(), &format_count);
    formatters
}

#[test]
fn test_parse_fields() {
    let formatters = test_formatters();
    let (fields, others) = parse_fields("name,csv,count,header,", &formatters);
    assert!(fields == vec!["name", "count"]);
    assert!(others.len() == 2 && others.contains("csv") && others.contains("header"));

    let opts = standard_options(&others);
    assert!(opts == FormatOptions { csv: true, json: false, header: true });
    let opts = standard_options(&HashSet::from(["json", "header"]));
    assert!(opts == FormatOptions { csv: false, json: true, header: false });
    let opts = standard_options(&HashSet::new());
    assert!(opts == FormatOptions { csv: false, json: false, header: true });
}

#[test]
fn test_format_data() {
    let formatters = test_formatters();
    let data: Vec<TestDatum> = vec![("java", 3), ("a,b", 12)];

    let mut out = vec![];
    let opts = FormatOptions { csv: false, json: false, header: true };
    format_data(&mut out, &["name", "count"], &formatters, &opts, &data, false).unwrap();
    assert!(String::from_utf8(out).unwrap() == "name  count\njava  3\na,b   12\n");

    let mut out = vec![];
    let opts = FormatOptions { csv: true, json: false, header: false };
    format_data(&mut out, &["count", "name"], &formatters, &opts, &data, true).unwrap();
    assert!(String::from_utf8(out).unwrap() == "6,java\n24,\"a,b\"\n");

    let mut out = vec![];
    let opts = FormatOptions { csv: false, json: true, header: false };
    format_data(&mut out, &["name"], &formatters, &opts, &data[..1], false).unwrap();
    assert!(String::from_utf8(out).unwrap() == "[{\"name\":\"java\"}]\n");
}
