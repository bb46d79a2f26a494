/// `pbsalyze` -- Analyze PBS scheduler, server, mom and accounting logs
///
/// Run with --help for brief help.
///
/// Every analysis command takes a list of log files and directories; a directory is expanded to the
/// daily log files in it.  The --from and --to values are used *both* for skipping daily log files
/// whose names place them outside the window *and* for filtering individual records in the files
/// that are read.
///
/// By default the result is printed as `label: value` lines with nested cycles, jobs or intervals
/// indented below their label.  With `--fmt json` the whole result is printed as a json object.
/// Any other --fmt value prints a table of the nested cycles (sched) or jobs (the other logs), or of
/// the buckets of an interval histogram, with the columns named in the --fmt value; `--fmt help`
/// lists the columns that are available.
///
/// The grep command runs one of the ad hoc searches over any kind of log: a histogram of the
/// records matching --pattern, the times at which consecutive records matched the --sequence
/// patterns, or, with neither, just the records in the --from/--to window.
mod format;
mod report;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pbslog::{AnalysisRequest, FileLogSource, LogKind, Mode, Report};
use rustutils::{read_complex_config, Epoch};
use std::io::{self, Write};
use std::process;
use std::str::FromStr;
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
    /// Print information about the program
    Version,

    /// Reconstruct scheduling cycles from scheduler logs
    Sched(LogCmdArgs),

    /// Print job and node information from server logs
    Server(LogCmdArgs),

    /// Print job information from mom logs
    Mom(LogCmdArgs),

    /// Print job and utilization information from accounting logs
    Accounting(AccountingCmdArgs),

    /// Count, sequence-match or echo the records of any log
    Grep(GrepCmdArgs),
}

#[derive(Args, Debug)]
pub struct LogCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct AccountingCmdArgs {
    /// File containing JSON data describing the nodes of the complex and the jobs running on it,
    /// for utilization [default: none]
    #[arg(long)]
    complex_config: Option<String>,

    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct GrepCmdArgs {
    /// The kind of log to read
    #[arg(long, value_enum, default_value_t = KindArg::Sched)]
    kind: KindArg,

    /// Count records matching this regular expression per interval
    #[arg(long, conflicts_with = "sequence")]
    pattern: Option<String>,

    /// The interval length for --pattern, in seconds
    #[arg(long, default_value_t = 3600.0)]
    interval: f64,

    /// Find consecutive records matching these regular expressions in order (repeatable)
    #[arg(long)]
    sequence: Vec<String>,

    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum KindArg {
    Sched,
    Server,
    Mom,
    Accounting,
}

impl From<KindArg> for LogKind {
    fn from(k: KindArg) -> LogKind {
        match k {
            KindArg::Sched => LogKind::Scheduler,
            KindArg::Server => LogKind::Server,
            KindArg::Mom => LogKind::Mom,
            KindArg::Accounting => LogKind::Accounting,
        }
    }
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Select records by this time and later.  Format can be seconds since the epoch,
    /// YYYY-MM-DD, "YYYY-MM-DD HH:MM:SS", or Nd or Nw signifying N days or weeks ago
    /// [default: the first record]
    #[arg(long, short, value_parser = parse_time_start_of_day)]
    from: Option<Epoch>,

    /// Select records by this time and earlier.  Format as for --from, a bare date means the end
    /// of that day [default: the last record]
    #[arg(long, short, value_parser = parse_time_end_of_day)]
    to: Option<Epoch>,

    /// Log files and directories of log files
    #[arg(required = true)]
    logfiles: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PrintArgs {
    /// Include per-job detail in the output
    #[arg(long, default_value_t = false)]
    show_jobs: bool,

    /// Select output format: json, or fields and controls for a table, or "help" for help
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug)]
pub struct MetaArgs {
    /// Log debug information and print statistics about the input to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

// The command arg parsers don't need to include the string being parsed because the error generated
// by clap includes that.

fn parse_time(s: &str, end_of_day: bool) -> Result<Epoch> {
    if let Some(n) = s.strip_suffix('d') {
        let Ok(k) = u32::from_str(n) else {
            bail!("Invalid date")
        };
        Ok((Local::now() - chrono::Duration::days(k as i64)).timestamp() as Epoch)
    } else if let Some(n) = s.strip_suffix('w') {
        let Ok(k) = u32::from_str(n) else {
            bail!("Invalid date")
        };
        Ok((Local::now() - chrono::Duration::weeks(k as i64)).timestamp() as Epoch)
    } else if let Ok(t) = f64::from_str(s) {
        if !t.is_finite() {
            bail!("Invalid time")
        }
        Ok(t)
    } else if let Some(t) = rustutils::parse_local_datetime(s) {
        if end_of_day && !s.contains(' ') {
            Ok(t + 86399.0)
        } else {
            Ok(t)
        }
    } else {
        bail!("Invalid date syntax")
    }
}

fn parse_time_start_of_day(s: &str) -> Result<Epoch> {
    parse_time(s, false)
}

fn parse_time_end_of_day(s: &str) -> Result<Epoch> {
    parse_time(s, true)
}

fn main() {
    match pbsalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {:#}", msg);
            process::exit(1);
        }
    }
}

fn pbsalyze() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Commands::Version => false,
        Commands::Sched(a) | Commands::Server(a) | Commands::Mom(a) => a.meta_args.verbose,
        Commands::Accounting(a) => a.meta_args.verbose,
        Commands::Grep(a) => a.meta_args.verbose,
    };
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    let mut stdout = io::stdout();
    run_command(cli.command, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

fn run_command(command: Commands, output: &mut dyn io::Write) -> Result<()> {
    let (mut request, print_args, meta_args) = match command {
        Commands::Version => {
            // Syntax:
            //  - components of the version string are space-separated but there are spaces nowhere else
            //  - the keyword "pbsalyze" is always the first component
            //  - every component is keyword(value)
            //  - "version" carries a semver
            writeln!(output, "pbsalyze version({})", env!("CARGO_PKG_VERSION"))?;
            return Ok(());
        }
        Commands::Sched(args) => log_request(LogKind::Scheduler, args),
        Commands::Server(args) => log_request(LogKind::Server, args),
        Commands::Mom(args) => log_request(LogKind::Mom, args),
        Commands::Accounting(args) => {
            let mut request = source_request(LogKind::Accounting, args.source_args);
            if let Some(ref filename) = args.complex_config {
                request.complex = Some(read_complex_config(filename)?);
            }
            (request, args.print_args, args.meta_args)
        }
        Commands::Grep(args) => {
            let mut request = source_request(args.kind.into(), args.source_args);
            request.mode = if let Some(pattern) = args.pattern {
                Mode::Intervals {
                    pattern,
                    frequency: args.interval,
                }
            } else if !args.sequence.is_empty() {
                Mode::Sequence {
                    patterns: args.sequence,
                }
            } else if request.from.is_some() || request.to.is_some() {
                Mode::Echo
            } else {
                bail!("One of --pattern, --sequence, --from or --to is required")
            };
            (request, args.print_args, args.meta_args)
        }
    };

    request.show_jobs = print_args.show_jobs || wants_job_table(request.kind, &print_args);
    let is_echo = request.mode == Mode::Echo;
    debug!("Log files: {:?}", request.paths);

    let analysis = pbslog::run_analysis(&mut FileLogSource::new(), request, output)?;

    if meta_args.verbose {
        let s = &analysis.stats;
        eprintln!("Files read: {}", s.files_read);
        eprintln!("Files skipped: {}", s.files_skipped);
        eprintln!("Lines read: {}", s.lines_read);
        eprintln!("Records in the window: {}", s.records_decoded);
        eprintln!("Records recognized: {}", s.records_recognized);
        for e in &s.errors {
            eprintln!("Error: {e}");
        }
    }

    if is_echo {
        return Ok(());
    }
    print_report(output, &analysis.report, &print_args)
}

fn log_request(kind: LogKind, args: LogCmdArgs) -> (AnalysisRequest, PrintArgs, MetaArgs) {
    (
        source_request(kind, args.source_args),
        args.print_args,
        args.meta_args,
    )
}

fn source_request(kind: LogKind, source_args: SourceArgs) -> AnalysisRequest {
    let mut request = AnalysisRequest::new(kind, source_args.logfiles);
    request.from = source_args.from;
    request.to = source_args.to;
    request
}

// A table is made from the per-job detail for every kind but the scheduler, whose table rows are the
// cycles, which are always present.
fn wants_job_table(kind: LogKind, print_args: &PrintArgs) -> bool {
    kind != LogKind::Scheduler && matches!(print_args.fmt.as_deref(), Some(f) if f != "json")
}

fn print_report(output: &mut dyn io::Write, r: &Report, print_args: &PrintArgs) -> Result<()> {
    match print_args.fmt.as_deref() {
        None => report::dump_text(output, r),
        Some("json") => report::dump_json(output, r),
        Some(fmt) => {
            let rows = report::table_rows(r).map(|(_, rows)| rows).unwrap_or_default();
            let known = report::row_metrics(rows);
            if fmt == "help" {
                format::print_help(&known);
                return Ok(());
            }
            if rows.is_empty() {
                // An empty table is still a table, but we can't tell what columns it would have.
                return Ok(());
            }
            let (fields, others) = format::parse_fields(fmt, &known)?;
            let opts = format::standard_options(&others);
            format::format_rows(output, &fields, &opts, rows)
        }
    }
}

#[cfg(test)]
fn run_args(args: &[&str]) -> Result<String> {
    let mut argv = vec!["pbsalyze"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv)?;
    let mut out = vec![];
    run_command(cli.command, &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn test_parse_time() {
    let midnight = rustutils::parse_local_datetime("2020-04-24").unwrap();
    assert_eq!(parse_time_start_of_day("2020-04-24").unwrap(), midnight);
    assert_eq!(parse_time_end_of_day("2020-04-24").unwrap(), midnight + 86399.0);
    assert_eq!(
        parse_time_end_of_day("2020-04-24 16:00:00").unwrap(),
        midnight + 16.0 * 3600.0
    );
    assert_eq!(parse_time_start_of_day("1587736800").unwrap(), 1587736800.0);
    let now = Local::now().timestamp() as f64;
    let t = parse_time_start_of_day("2d").unwrap();
    assert!((now - 2.0 * 86400.0 - t).abs() < 60.0);
    assert!(parse_time_start_of_day("2020-13-01").is_err());
    assert!(parse_time_start_of_day("xd").is_err());
    assert!(parse_time_start_of_day("inf").is_err());
}

#[test]
fn test_sched_text() {
    let out = run_args(&["sched", "../tests/pbslog/sched_logs"]).unwrap();
    assert!(out.starts_with("num_cycles: 3\n"));
    assert!(out.contains("\ncycles:\n  -\n    cycle: 0\n"));
    assert!(out.contains("sched_versions: 19.1.3\n"));
}

#[test]
fn test_server_table() {
    let out = run_args(&[
        "server",
        "--fmt",
        "csv,job_id,wait_time,run_time",
        "../tests/pbslog/server_logs",
    ])
    .unwrap();
    assert_eq!(out, "123.svr,0:02:03,0:30:00\n124.svr,*skip*,*skip*\n");
}

#[test]
fn test_accounting_json() {
    let out = run_args(&[
        "accounting",
        "--fmt",
        "json",
        "--complex-config",
        "../tests/pbslog/complex.json",
        "../tests/pbslog/accounting",
    ])
    .unwrap();
    let parsed = json::parse(&out).unwrap();
    assert_eq!(parsed["num_malformed_records"], 1);
    assert_eq!(parsed["total_ncpus"], 40);
}

#[test]
fn test_grep() {
    let out = run_args(&[
        "grep",
        "--kind",
        "sched",
        "--from",
        "2020-04-25 08:00:00",
        "../tests/pbslog/sched_logs",
    ])
    .unwrap();
    assert!(out.lines().count() > 0);
    assert!(out.lines().all(|l| l.starts_with("04/25/2020 08:00:0")));

    let out = run_args(&[
        "grep",
        "--pattern",
        "Considering job to run",
        "--interval",
        "43200",
        "--fmt",
        "noheader,count",
        "../tests/pbslog/sched_logs",
    ])
    .unwrap();
    // Buckets start at 04/24 16:00:01 and 04/25 04:00:01
    assert_eq!(out, "4\n2\n");

    assert!(run_args(&["grep", "../tests/pbslog/sched_logs"]).is_err());
    assert!(run_args(&["grep", "--pattern", "(", "../tests/pbslog/sched_logs"]).is_err());
    assert!(run_args(&["mom"]).is_err());
}
