// `nmonalyze` -- Inspect nmon performance log files
//
// Every subcommand parses the named files into Datasets with the nmonlog library and prints one
// listing per file: a summary, the metadata, the data types, the process identities, the
// diagnostics, or the time series of one type.  Run with --help for brief help.
//
// Times in nmon files are local times without a zone, so the zone of the machine that wrote the
// file must be given with --timezone if it is not UTC.  Times are printed in the same zone.

mod diagnostics;
mod format;
mod processes;
mod series;
mod summary;
mod types;

use anyhow::{anyhow, bail, Context as _, Result};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use nmonlog::{Dataset, Timestamp};
use std::io;
use std::process;
use std::time;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print one line of summary information per file
    Summary(SummaryArgs),

    /// Print the metadata and system information of each file
    Metadata(MetadataArgs),

    /// Print the data types defined by each file
    Types(TypesArgs),

    /// Print the process identities found in each file
    Processes(ProcessesArgs),

    /// Print the anomalies that were repaired or dropped while parsing
    Diagnostics(DiagnosticsArgs),

    /// Print the values of one data type or process over time
    Series(SeriesArgs),
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct MetadataArgs {
    #[command(flatten)]
    input_args: InputArgs,

    /// Print the system information blocks in full instead of the metadata
    #[arg(long, default_value_t = false)]
    system_info: bool,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct TypesArgs {
    #[command(flatten)]
    input_args: InputArgs,

    /// Include the per-process types (id TOP) in the listing
    #[arg(long, default_value_t = false)]
    all: bool,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct ProcessesArgs {
    #[command(flatten)]
    input_args: InputArgs,

    /// Select processes with this name (repeatable) [default: all]
    #[arg(long)]
    name: Vec<String>,

    /// Select processes with this pid (repeatable) [default: all]
    #[arg(long)]
    pid: Vec<i32>,

    /// Exclude the synthesized per-name aggregates
    #[arg(long, default_value_t = false)]
    no_aggregates: bool,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct DiagnosticsArgs {
    #[command(flatten)]
    input_args: InputArgs,

    /// Omit the diagnostics for expected, harmless conditions
    #[arg(long, default_value_t = false)]
    no_benign: bool,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct SeriesArgs {
    #[command(flatten)]
    input_args: InputArgs,

    /// Print the series of the data type with this id, eg CPU_ALL or NET_TOTAL
    #[arg(long = "type", short = 't', conflicts_with = "process")]
    type_id: Option<String>,

    /// Print the series of the process with this name.  The aggregate is used when there is more
    /// than one process with the name.
    #[arg(long, short = 'p')]
    process: Option<String>,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// The timezone in which the files' times were written, an IANA name [default: UTC]
    #[arg(long, short = 'z', default_value = "UTC", value_parser = parse_timezone)]
    timezone: Tz,

    /// Log file names
    #[arg(required = true)]
    logfiles: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Select fields and format for the output, a comma-separated list of field names and the
    /// words csv, json, header and noheader [default: command dependent]
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug)]
pub struct MetaArgs {
    /// Logging level for messages on stderr; RUST_LOG overrides it
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print statistics about the parse to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

/// The context handed to every field formatter: the Dataset being printed and the zone in which
/// to print times.

#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub dataset: &'a Dataset,
    pub tz: Tz,
}

pub fn format_time(t: Timestamp, tz: Tz) -> String {
    t.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

// The command arg parsers don't need to include the string being parsed because the error generated
// by clap includes that.

fn parse_timezone(s: &str) -> Result<Tz> {
    s.parse::<Tz>().map_err(|_| anyhow!("Unknown timezone"))
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level: {}", level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn main() {
    match nmonalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {:#}", msg);
            process::exit(1);
        }
    }
}

fn nmonalyze() -> Result<()> {
    let cli = Cli::parse();

    let (input_args, meta_args) = match cli.command {
        Commands::Summary(ref args) => (&args.input_args, &args.meta_args),
        Commands::Metadata(ref args) => (&args.input_args, &args.meta_args),
        Commands::Types(ref args) => (&args.input_args, &args.meta_args),
        Commands::Processes(ref args) => (&args.input_args, &args.meta_args),
        Commands::Diagnostics(ref args) => (&args.input_args, &args.meta_args),
        Commands::Series(ref args) => (&args.input_args, &args.meta_args),
    };

    init_logging(&meta_args.log_level)?;

    if let Commands::Series(ref args) = cli.command {
        if args.type_id.is_none() && args.process.is_none() {
            bail!("One of --type and --process is required");
        }
    }

    // Parse every file before printing anything, so that a bad file does not leave partial
    // output behind.

    let datasets = {
        let mut datasets = vec![];
        for file_name in &input_args.logfiles {
            let started = time::Instant::now();
            let dataset = nmonlog::parse_logfile(file_name, input_args.timezone)
                .with_context(|| format!("Reading {}", file_name))?;
            debug!("Parsed {} in {:?}", file_name, started.elapsed());
            if meta_args.verbose {
                eprintln!(
                    "{}: {} records, {} types, {} processes, {} diagnostics in {:?}",
                    file_name,
                    dataset.records().len(),
                    dataset.types().len(),
                    dataset.processes().len(),
                    dataset.diagnostics().len(),
                    started.elapsed()
                );
            }
            datasets.push(dataset);
        }
        datasets
    };

    let mut stdout = io::stdout();
    let output: &mut dyn io::Write = &mut stdout;
    let tz = input_args.timezone;
    match cli.command {
        Commands::Summary(ref args) => summary::print_summary(output, &datasets, tz, &args.print_args),
        Commands::Metadata(ref args) => {
            for dataset in &datasets {
                summary::print_metadata(output, Context { dataset, tz }, args.system_info, &args.print_args)?;
            }
            Ok(())
        }
        Commands::Types(ref args) => {
            for dataset in &datasets {
                types::print_types(output, Context { dataset, tz }, args.all, &args.print_args)?;
            }
            Ok(())
        }
        Commands::Processes(ref args) => {
            for dataset in &datasets {
                processes::print_processes(output, Context { dataset, tz }, args)?;
            }
            Ok(())
        }
        Commands::Diagnostics(ref args) => {
            for dataset in &datasets {
                diagnostics::print_diagnostics(output, Context { dataset, tz }, args.no_benign, &args.print_args)?;
            }
            Ok(())
        }
        Commands::Series(ref args) => {
            for dataset in &datasets {
                series::print_series(output, Context { dataset, tz }, args)?;
            }
            Ok(())
        }
    }
}

#[test]
fn test_parse_timezone() {
    assert!(parse_timezone("UTC").unwrap() == Tz::UTC);
    assert!(parse_timezone("Europe/Oslo").unwrap() == chrono_tz::Europe::Oslo);
    assert!(parse_timezone("Mars/Olympus_Mons").is_err());
}

#[test]
fn test_format_time() {
    use chrono::TimeZone;
    let t = chrono::Utc.with_ymd_and_hms(2023, 7, 1, 10, 0, 5).unwrap();
    assert!(format_time(t, Tz::UTC) == "2023-07-01 10:00:05");
    assert!(format_time(t, chrono_tz::Europe::Oslo) == "2023-07-01 12:00:05");
}

#[test]
fn test_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();

    let cli = Cli::try_parse_from(["nmonalyze", "series", "-z", "Europe/Oslo", "--type", "CPU_ALL", "a.nmon"]).unwrap();
    match cli.command {
        Commands::Series(args) => {
            assert!(args.input_args.timezone == chrono_tz::Europe::Oslo);
            assert!(args.input_args.logfiles == ["a.nmon"]);
            assert!(args.type_id.as_deref() == Some("CPU_ALL"));
            assert!(args.meta_args.log_level == "warn");
        }
        _ => panic!("Expected series"),
    }
    assert!(Cli::try_parse_from(["nmonalyze", "summary"]).is_err());
    assert!(Cli::try_parse_from(["nmonalyze", "summary", "-z", "Nowhere", "a.nmon"]).is_err());
}
