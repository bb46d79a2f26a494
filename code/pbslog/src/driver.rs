/// The driver: read the lines of a set of logs, decode their timestamps, apply the window, and feed
/// the records to the analyzer selected for the request.
///
/// One analyzer sees all the files of a request in order, so state (an open cycle, a running job)
/// carries across log rotation.  Once a record is later than the upper bound of the window the rest
/// of that file is not read; files whose names say they are outside the window are not opened.
///
/// Problems with individual files (cannot open, read error) are logged and recorded in the stats
/// and the analysis continues with the next file, keeping what was learned so far.
use crate::acctlog::{self, AccountingTracker};
use crate::intervals::{IntervalCounter, SequenceMatcher};
use crate::logtree::{find_logfiles, LogSource};
use crate::metrics::Report;
use crate::momlog::MomTracker;
use crate::schedlog::CycleReconstructor;
use crate::serverlog::ServerTracker;
use anyhow::{bail, Result};
use rustutils::{decode_timestamp, ComplexConfig, Epoch};
use std::io;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Scheduler,
    Server,
    Mom,
    Accounting,
}

impl LogKind {
    /// The time of the record on the line, None if the line does not start with a timestamp.

    pub fn record_time(self, line: &str) -> Option<Epoch> {
        match self {
            LogKind::Accounting => acctlog::record_time(line),
            LogKind::Scheduler | LogKind::Server | LogKind::Mom => {
                decode_timestamp(line.split_once(';')?.0)
            }
        }
    }
}

/// A consumer of timestamped log records, one per kind of analysis.

pub trait LogAnalyzer {
    /// Process one record.  Returns true if the record was recognized.

    fn apply(&mut self, t: Epoch, line: &str) -> bool;

    /// Called once after the last record of the last file.

    fn finish(&mut self);

    fn summarize(&self, show_jobs: bool) -> Report;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// The analysis for the kind of log.
    Analyze,

    /// Copy the records in the window to the output.
    Echo,

    /// Histogram of the records matching `pattern` in buckets of `frequency` seconds.
    Intervals { pattern: String, frequency: f64 },

    /// Times at which consecutive records matched `patterns` in order.
    Sequence { patterns: Vec<String> },
}

pub struct AnalysisRequest {
    pub kind: LogKind,
    pub paths: Vec<String>,
    pub from: Option<Epoch>,
    pub to: Option<Epoch>,
    pub mode: Mode,
    pub show_jobs: bool,
    pub complex: Option<ComplexConfig>,
}

impl AnalysisRequest {
    pub fn new(kind: LogKind, paths: Vec<String>) -> AnalysisRequest {
        AnalysisRequest {
            kind,
            paths,
            from: None,
            to: None,
            mode: Mode::Analyze,
            show_jobs: false,
            complex: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverStats {
    pub files_read: usize,
    pub files_skipped: usize,
    pub lines_read: usize,
    pub records_decoded: usize,
    pub records_recognized: usize,
    pub errors: Vec<String>,
}

pub struct Analysis {
    pub report: Report,
    pub stats: DriverStats,
}

// Echo mode is an analyzer too: it recognizes every record in the window.
struct Echo<'a> {
    out: &'a mut dyn io::Write,
    failure: Option<io::Error>,
}

impl<'a> LogAnalyzer for Echo<'a> {
    fn apply(&mut self, _t: Epoch, line: &str) -> bool {
        if self.failure.is_none() {
            if let Err(e) = writeln!(self.out, "{line}") {
                self.failure = Some(e);
            }
        }
        true
    }

    fn finish(&mut self) {}

    fn summarize(&self, _show_jobs: bool) -> Report {
        Report::new()
    }
}

/// Construct the analyzer for a request.  This is where custom patterns are compiled, so errors in
/// them are reported before any log is read.

pub fn make_analyzer(
    kind: LogKind,
    mode: &Mode,
    from: Option<Epoch>,
    complex: Option<ComplexConfig>,
) -> Result<Box<dyn LogAnalyzer>> {
    let analyzer: Box<dyn LogAnalyzer> = match mode {
        Mode::Analyze => match kind {
            LogKind::Scheduler => Box::new(CycleReconstructor::new()?),
            LogKind::Server => Box::new(ServerTracker::new()?),
            LogKind::Mom => Box::new(MomTracker::new()?),
            LogKind::Accounting => Box::new(AccountingTracker::new(from, complex)),
        },
        Mode::Intervals { pattern, frequency } => {
            Box::new(IntervalCounter::new(pattern, *frequency)?)
        }
        Mode::Sequence { patterns } => Box::new(SequenceMatcher::new(patterns)?),
        Mode::Echo => bail!("Echo mode has no analyzer"),
    };
    Ok(analyzer)
}

/// Run the request against the logs supplied by `source`.  Records are echoed to `out` in echo
/// mode; nothing is written to it otherwise.

pub fn run_analysis(
    source: &mut dyn LogSource,
    request: AnalysisRequest,
    out: &mut dyn io::Write,
) -> Result<Analysis> {
    let AnalysisRequest {
        kind,
        paths,
        from,
        to,
        mode,
        show_jobs,
        complex,
    } = request;

    let mut stats = DriverStats::default();
    let found = find_logfiles(source, &paths, from, to);
    stats.files_skipped = found.skipped;
    stats.errors = found.errors;
    let files = found.files;

    if mode == Mode::Echo {
        let mut echo = Echo { out, failure: None };
        scan(source, kind, &files, from, to, &mut echo, &mut stats);
        if let Some(e) = echo.failure {
            return Err(e.into());
        }
        return Ok(Analysis {
            report: Report::new(),
            stats,
        });
    }

    let mut analyzer = make_analyzer(kind, &mode, from, complex)?;
    scan(source, kind, &files, from, to, analyzer.as_mut(), &mut stats);
    analyzer.finish();
    Ok(Analysis {
        report: analyzer.summarize(show_jobs),
        stats,
    })
}

fn scan(
    source: &mut dyn LogSource,
    kind: LogKind,
    files: &[String],
    from: Option<Epoch>,
    to: Option<Epoch>,
    analyzer: &mut dyn LogAnalyzer,
    stats: &mut DriverStats,
) {
    for file in files {
        let lines = match source.lines(file) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("{e:#}");
                stats.errors.push(format!("{e:#}"));
                continue;
            }
        };
        stats.files_read += 1;
        let mut decoded = 0;
        for line in lines {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("{e:#}");
                    stats.errors.push(format!("{e:#}"));
                    break;
                }
            };
            stats.lines_read += 1;
            let Some(t) = kind.record_time(&line) else {
                continue;
            };
            if from.is_some_and(|from| t < from) {
                continue;
            }
            if to.is_some_and(|to| t > to) {
                debug!("Past the end of the window in {file}");
                break;
            }
            decoded += 1;
            if analyzer.apply(t, &line) {
                stats.records_recognized += 1;
            }
        }
        stats.records_decoded += decoded;
        info!("{file}: {decoded} records");
    }
}

#[cfg(test)]
use crate::logtree::FileLogSource;
#[cfg(test)]
use crate::metrics::{Metric, Value};

#[cfg(test)]
fn run(request: AnalysisRequest) -> Analysis {
    let mut src = FileLogSource::new();
    let mut out = vec![];
    run_analysis(&mut src, request, &mut out).unwrap()
}

#[cfg(test)]
fn local(s: &str) -> Epoch {
    rustutils::parse_local_datetime(s).unwrap()
}

#[test]
fn test_record_time() {
    assert_eq!(
        LogKind::Server.record_time("04/24/2020 16:00:00;0008;Server@svr;Job;1.svr;x"),
        Some(local("2020-04-24 16:00:00"))
    );
    assert_eq!(LogKind::Server.record_time("garbage;x"), None);
    assert_eq!(LogKind::Mom.record_time("no separator"), None);
    assert_eq!(
        LogKind::Accounting.record_time("04/24/2020;16:00:00;Q;1.svr;queue=workq"),
        Some(local("2020-04-24 16:00:00"))
    );
}

#[test]
fn test_scheduler_across_rotation() {
    let a = run(AnalysisRequest::new(
        LogKind::Scheduler,
        vec!["../tests/pbslog/sched_logs".to_string()],
    ));
    assert_eq!(a.stats.files_read, 2);
    assert_eq!(a.stats.files_skipped, 0);
    assert!(a.stats.errors.is_empty());
    let r = &a.report;
    assert_eq!(r.count(Metric::NumCycles), Some(3));
    assert_eq!(r.count(Metric::NumJobsRun), Some(3));
    assert_eq!(r.count(Metric::NumJobsConsidered), Some(6));
    assert_eq!(r.count(Metric::NumJobsFailedToRun), Some(1));
    assert_eq!(r.count(Metric::NumJobsCalendared), Some(1));
    assert_eq!(
        r.get(Metric::SchedVersions),
        Some(&Value::List(vec!["19.1.3".to_string()]))
    );

    let cycles = r.get(Metric::Cycles).unwrap().as_reports().unwrap();
    assert_eq!(cycles[0].number(Metric::CycleDuration), Some(10.0));
    assert_eq!(cycles[0].number(Metric::SolverTime), Some(7.5));
    // The cycle that spans midnight is closed by its own end marker in the next file
    assert_eq!(
        cycles[1].number(Metric::CycleEnd),
        Some(local("2020-04-25 00:00:05"))
    );
    assert_eq!(cycles[1].number(Metric::CycleDuration), Some(15.0));
    // The last cycle is closed at the last record
    assert_eq!(
        cycles[2].number(Metric::CycleEnd),
        Some(local("2020-04-25 08:00:09"))
    );
    assert_eq!(r.count(Metric::NumJobsEstimated), Some(1));
}

#[test]
fn test_scheduler_window() {
    let mut req = AnalysisRequest::new(
        LogKind::Scheduler,
        vec!["../tests/pbslog/sched_logs".to_string()],
    );
    req.to = Some(local("2020-04-24 23:00:00"));
    let a = run(req);
    assert_eq!(a.stats.files_read, 1);
    assert_eq!(a.stats.files_skipped, 1);
    assert_eq!(a.report.count(Metric::NumCycles), Some(1));

    let mut req = AnalysisRequest::new(
        LogKind::Scheduler,
        vec!["../tests/pbslog/sched_logs".to_string()],
    );
    req.from = Some(local("2020-04-25 00:00:00"));
    let a = run(req);
    assert_eq!(a.stats.files_read, 1);
    assert_eq!(a.report.count(Metric::NumCycles), Some(1));
    assert_eq!(a.report.count(Metric::NumRecordsOutsideCycles), Some(2));
}

#[test]
fn test_accounting() {
    let a = run(AnalysisRequest::new(
        LogKind::Accounting,
        vec!["../tests/pbslog/accounting/20200424".to_string()],
    ));
    let r = &a.report;
    assert_eq!(r.count(Metric::NumJobsQueued), Some(2));
    assert_eq!(r.count(Metric::NumJobsStarted), Some(2));
    assert_eq!(r.count(Metric::NumJobsEnded), Some(1));
    assert_eq!(r.count(Metric::NumJobsDeleted), Some(1));
    assert_eq!(r.count(Metric::NumLicenseRecords), Some(1));
    assert_eq!(r.count(Metric::NumMalformedRecords), Some(1));
    // 124.svr has no E record and runs to the last record at 17:00:03
    assert_eq!(
        r.number(Metric::CpuSecondsUsed),
        Some(4.0 * 1800.0 + 16.0 * 2403.0)
    );
}

#[test]
fn test_server_and_mom() {
    let a = run(AnalysisRequest::new(
        LogKind::Server,
        vec!["../tests/pbslog/server_logs".to_string()],
    ));
    assert_eq!(a.report.count(Metric::NumJobsQueued), Some(2));
    assert_eq!(a.report.count(Metric::NumNodesUp), Some(2));

    let a = run(AnalysisRequest::new(
        LogKind::Mom,
        vec!["../tests/pbslog/mom_logs".to_string()],
    ));
    assert_eq!(a.report.count(Metric::NumJobsStarted), Some(1));
    assert_eq!(a.report.count(Metric::NumJobsEnded), Some(2));
}

#[test]
fn test_echo() {
    let mut req = AnalysisRequest::new(
        LogKind::Server,
        vec!["../tests/pbslog/server_logs/20200424".to_string()],
    );
    req.mode = Mode::Echo;
    req.from = Some(local("2020-04-24 16:00:00"));
    let mut src = FileLogSource::new();
    let mut out = vec![];
    let a = run_analysis(&mut src, req, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.starts_with("04/24/2020 16:00:03;"));
    assert_eq!(a.stats.records_recognized, 2);
}

#[test]
fn test_missing_file_and_bad_pattern() {
    let mut src = FileLogSource::new();
    let mut out = vec![];
    // The missing path is reported and the good file is still analyzed
    let a = run_analysis(
        &mut src,
        AnalysisRequest::new(
            LogKind::Scheduler,
            vec![
                "../tests/pbslog/sched_logs/20200424".to_string(),
                "../tests/pbslog/nonesuch".to_string(),
            ],
        ),
        &mut out,
    )
    .unwrap();
    assert_eq!(a.stats.files_read, 1);
    assert_eq!(a.stats.errors.len(), 1);
    assert!(a.stats.errors[0].contains("nonesuch"));
    assert_eq!(a.report.count(Metric::NumCycles), Some(2));

    let mut req = AnalysisRequest::new(
        LogKind::Scheduler,
        vec!["../tests/pbslog/sched_logs".to_string()],
    );
    req.mode = Mode::Sequence {
        patterns: vec!["(".to_string()],
    };
    assert!(run_analysis(&mut src, req, &mut out).is_err());
}

#[test]
fn test_intervals_across_files() {
    let mut req = AnalysisRequest::new(
        LogKind::Scheduler,
        vec!["../tests/pbslog/sched_logs".to_string()],
    );
    req.mode = Mode::Intervals {
        pattern: "Starting Scheduling".to_string(),
        frequency: 3600.0,
    };
    let a = run(req);
    assert_eq!(a.report.count(Metric::NumMatches), Some(3));
}
