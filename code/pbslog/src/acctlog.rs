/// Parse the accounting log and compute job statistics and machine utilization.
///
/// An accounting record is `MM/DD/YYYY HH:MM:SS;T;id;attributes` where T is one of Q (queued),
/// S (started), E (ended), D (deleted), A (abort) or L (license) and the attributes are a
/// blank-separated list of key=value pairs; values may be double-quoted to include blanks.  Some
/// installations write the date and time as separate fields, `MM/DD/YYYY;HH:MM:SS;T;...`, and that
/// is accepted too.
///
/// Only the Q, S, E and D attribute lists are decoded.  Of the values only `Resource_List.*` and
/// `resources_used.*` are interpreted as numbers, sizes or durations; the job event times (`qtime`,
/// `start`, `end`, `etime`, `ctime`) are decoded as epoch seconds, and everything else is text.
///
/// Utilization is computed over the window [from, last record], where `from` is the lower bound of
/// the request if there is one and the time of the first record otherwise.  A job that started but
/// did not end inside the window is counted as running until the end of the window.  Jobs that
/// started before the window, and so have no S record in it, are only known if they are listed in
/// the complex description.
use crate::driver::LogAnalyzer;
use crate::metrics::{Metric, Report, StatScale, Value};
use rustutils::{
    decode_accounting_timestamp, decode_timestamp, rate, ComplexConfig, Epoch, SummaryStatistics,
};
use std::collections::HashMap;
use tracing::debug;
use ustr::Ustr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Queued,
    Started,
    Ended,
    Deleted,
    Abort,
    License,
}

impl RecordType {
    fn parse(s: &str) -> Option<RecordType> {
        match s {
            "Q" => Some(RecordType::Queued),
            "S" => Some(RecordType::Started),
            "E" => Some(RecordType::Ended),
            "D" => Some(RecordType::Deleted),
            "A" => Some(RecordType::Abort),
            "L" => Some(RecordType::License),
            _ => None,
        }
    }

    fn has_attributes(self) -> bool {
        matches!(
            self,
            RecordType::Queued | RecordType::Started | RecordType::Ended | RecordType::Deleted
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Kilobytes(u64),
    Seconds(u64),
    Time(Epoch),
    Text(String),
}

impl AttrValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::Int(n) if *n >= 0 => Some(*n as u64),
            AttrValue::Kilobytes(n) | AttrValue::Seconds(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<Epoch> {
        match self {
            AttrValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountingRecord {
    pub time: Epoch,
    pub rtype: RecordType,
    pub id: Ustr,
    pub attrs: HashMap<String, AttrValue>,
}

impl AccountingRecord {
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    fn time_attr(&self, key: &str) -> Option<Epoch> {
        self.get(key).and_then(|v| v.as_time())
    }

    pub fn wait_time(&self) -> Option<f64> {
        Some(self.time_attr("start")? - self.time_attr("qtime")?)
    }

    pub fn run_time(&self) -> Option<f64> {
        if let (Some(s), Some(e)) = (self.time_attr("start"), self.time_attr("end")) {
            return Some(e - s);
        }
        self.get("resources_used.walltime")
            .and_then(|v| v.as_u64())
            .map(|s| s as f64)
    }

    pub fn node_count(&self) -> Option<u64> {
        self.get("Resource_List.nodect").and_then(|v| v.as_u64())
    }

    /// A job that does not say otherwise gets one cpu.

    pub fn cpu_count(&self) -> u64 {
        self.get("Resource_List.ncpus")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
    }
}

#[derive(Debug, PartialEq)]
pub enum ParsedLine {
    NotARecord,
    Malformed,
    Record(AccountingRecord),
}

// Returns the time, type, id and attribute text.
fn split_record(line: &str) -> Option<(Epoch, &str, &str, &str)> {
    let first = line.split(';').next()?;
    if first.contains(' ') {
        let mut fields = line.splitn(4, ';');
        let t = decode_timestamp(fields.next()?)?;
        Some((t, fields.next()?, fields.next()?, fields.next().unwrap_or("")))
    } else {
        let mut fields = line.splitn(5, ';');
        let date = fields.next()?;
        let t = decode_accounting_timestamp(date, fields.next()?)?;
        Some((t, fields.next()?, fields.next()?, fields.next().unwrap_or("")))
    }
}

/// The time of an accounting record, or None if the line is not one.

pub fn record_time(line: &str) -> Option<Epoch> {
    split_record(line).map(|(t, _, _, _)| t)
}

pub fn parse_accounting_line(line: &str) -> ParsedLine {
    let Some((time, rtype, id, attrtext)) = split_record(line) else {
        return ParsedLine::NotARecord;
    };
    let Some(rtype) = RecordType::parse(rtype) else {
        return ParsedLine::NotARecord;
    };
    let mut attrs = HashMap::new();
    if rtype.has_attributes() {
        let Some(tokens) = tokenize(attrtext) else {
            return ParsedLine::Malformed;
        };
        for token in tokens {
            let Some((key, value)) = token.split_once('=') else {
                return ParsedLine::Malformed;
            };
            if key.is_empty() {
                return ParsedLine::Malformed;
            }
            attrs.insert(key.to_string(), decode_value(key, value));
        }
    }
    ParsedLine::Record(AccountingRecord {
        time,
        rtype,
        id: Ustr::from(id),
        attrs,
    })
}

// Split on blanks outside double quotes.  None if a quote is left open.
fn tokenize(s: &str) -> Option<Vec<&str>> {
    let mut tokens = vec![];
    let mut start = None;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => {
                quoted = !quoted;
                start.get_or_insert(i);
            }
            c if c.is_whitespace() && !quoted => {
                if let Some(s0) = start.take() {
                    tokens.push(&s[s0..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if quoted {
        return None;
    }
    if let Some(s0) = start {
        tokens.push(&s[s0..]);
    }
    Some(tokens)
}

fn decode_value(key: &str, value: &str) -> AttrValue {
    let value = value.trim_matches('"');
    match key {
        "qtime" | "start" | "end" | "etime" | "ctime" => {
            if let Ok(n) = value.parse::<i64>() {
                return AttrValue::Time(n as f64);
            }
        }
        _ if key.starts_with("Resource_List.") || key.starts_with("resources_used.") => {
            if let Some(v) = decode_number(value) {
                return v;
            }
        }
        _ => {}
    }
    AttrValue::Text(value.to_string())
}

fn decode_number(value: &str) -> Option<AttrValue> {
    if let Ok(n) = value.parse::<i64>() {
        return Some(AttrValue::Int(n));
    }
    if let Some(secs) = decode_hms(value) {
        return Some(AttrValue::Seconds(secs));
    }
    decode_size(value).map(AttrValue::Kilobytes)
}

fn decode_hms(value: &str) -> Option<u64> {
    let mut fields = value.split(':');
    let h = fields.next()?.parse::<u64>().ok()?;
    let m = fields.next()?.parse::<u64>().ok()?;
    let s = fields.next()?.parse::<u64>().ok()?;
    if fields.next().is_some() || m > 59 || s > 59 {
        return None;
    }
    Some(h * 3600 + m * 60 + s)
}

// Sizes are normalized to kb.  Bytes round up.
fn decode_size(value: &str) -> Option<u64> {
    let lower = value.to_ascii_lowercase();
    let digits = lower.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let n = digits.parse::<u64>().ok()?;
    match &lower[digits.len()..] {
        "b" => Some(n.div_ceil(1024)),
        "kb" => Some(n),
        "mb" => Some(n * 1024),
        "gb" => Some(n * 1024 * 1024),
        "tb" => Some(n * 1024 * 1024 * 1024),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
struct AcctJob {
    queued: Option<Epoch>,
    started: Option<Epoch>,
    ended: Option<Epoch>,
    wait_time: Option<f64>,
    run_time: Option<f64>,
    ncpus: u64,
    nodect: Option<u64>,
}

#[derive(Default)]
pub struct AccountingTracker {
    from: Option<Epoch>,
    complex: Option<ComplexConfig>,
    jobs: HashMap<Ustr, AcctJob>,
    order: Vec<Ustr>,
    queued_times: Vec<Epoch>,
    started_times: Vec<Epoch>,
    ended_times: Vec<Epoch>,
    num_deleted: u64,
    num_abort: u64,
    num_license: u64,
    num_malformed: u64,
    first_time: Option<Epoch>,
    last_time: Option<Epoch>,
}

impl AccountingTracker {
    /// `from` is the lower bound of the analysis window, if any.

    pub fn new(from: Option<Epoch>, complex: Option<ComplexConfig>) -> AccountingTracker {
        AccountingTracker {
            from,
            complex,
            ..Default::default()
        }
    }

    pub fn num_malformed(&self) -> u64 {
        self.num_malformed
    }

    fn job(&mut self, id: Ustr) -> &mut AcctJob {
        if !self.jobs.contains_key(&id) {
            self.order.push(id);
        }
        self.jobs.entry(id).or_insert_with(|| AcctJob {
            ncpus: 1,
            ..Default::default()
        })
    }

    fn record(&mut self, r: AccountingRecord) {
        let t = r.time;
        self.first_time.get_or_insert(t);
        self.last_time = Some(self.last_time.map_or(t, |l| l.max(t)));
        match r.rtype {
            RecordType::Abort => {
                self.num_abort += 1;
                return;
            }
            RecordType::License => {
                self.num_license += 1;
                return;
            }
            RecordType::Deleted => self.num_deleted += 1,
            RecordType::Queued => self.queued_times.push(t),
            RecordType::Started => self.started_times.push(t),
            RecordType::Ended => self.ended_times.push(t),
        }

        let ncpus = r.cpu_count();
        let nodect = r.node_count();
        let wait = r.wait_time();
        let run = r.run_time();
        let qtime = r.time_attr("qtime");
        let start = r.time_attr("start");
        let end = r.time_attr("end");
        let rtype = r.rtype;
        let job = self.job(r.id);
        match rtype {
            RecordType::Queued => {
                job.queued.get_or_insert(t);
            }
            RecordType::Started => {
                job.started = Some(start.unwrap_or(t));
                job.ended = None;
                job.ncpus = ncpus;
                job.nodect = nodect.or(job.nodect);
                if wait.is_some() {
                    job.wait_time = wait;
                }
            }
            RecordType::Ended => {
                if job.started.is_none() {
                    job.started = start;
                }
                job.ended = Some(end.unwrap_or(t));
                job.ncpus = ncpus;
                job.nodect = nodect.or(job.nodect);
                job.wait_time = wait.or(job.wait_time);
                job.run_time = run;
            }
            RecordType::Deleted | RecordType::Abort | RecordType::License => {}
        }
        if job.queued.is_none() {
            job.queued = qtime;
        }
    }

    /// The window the utilization is computed over, if any record was seen.

    pub fn window(&self) -> Option<(Epoch, Epoch)> {
        let end = self.last_time?;
        let start = self.from.or(self.first_time)?;
        Some((start.min(end), end))
    }

    /// Cpu-seconds used inside the window.

    pub fn cpu_seconds(&self) -> f64 {
        let Some((ws, we)) = self.window() else {
            return 0.0;
        };
        let clip = |s: Epoch, e: Epoch| (e.min(we) - s.max(ws)).max(0.0);
        let mut total = 0.0;
        for id in &self.order {
            let job = &self.jobs[id];
            if let Some(s) = job.started {
                total += job.ncpus as f64 * clip(s, job.ended.unwrap_or(we));
            }
        }
        if let Some(cfg) = &self.complex {
            for rj in cfg.running_jobs() {
                if !self.jobs.contains_key(&rj.id) {
                    total += rj.ncpus as f64 * clip(rj.start, we);
                }
            }
        }
        total
    }

    /// Percent of the complex's capacity used inside the window.

    pub fn utilization(&self) -> Option<f64> {
        let cfg = self.complex.as_ref()?;
        let (ws, we) = self.window()?;
        let capacity = cfg.total_ncpus() as f64 * (we - ws);
        if capacity <= 0.0 {
            return None;
        }
        Some(100.0 * self.cpu_seconds() / capacity)
    }
}

impl LogAnalyzer for AccountingTracker {
    fn apply(&mut self, _t: Epoch, line: &str) -> bool {
        match parse_accounting_line(line) {
            ParsedLine::NotARecord => false,
            ParsedLine::Malformed => {
                debug!("Malformed accounting record: {line}");
                self.num_malformed += 1;
                false
            }
            ParsedLine::Record(r) => {
                self.record(r);
                true
            }
        }
    }

    fn finish(&mut self) {}

    fn summarize(&self, show_jobs: bool) -> Report {
        let mut r = Report::new();
        let queued = sorted(&self.queued_times);
        let started = sorted(&self.started_times);
        let ended = sorted(&self.ended_times);
        r.set(Metric::NumJobsQueued, Value::Count(queued.len() as u64));
        r.set(Metric::NumJobsStarted, Value::Count(started.len() as u64));
        r.set(Metric::NumJobsEnded, Value::Count(ended.len() as u64));
        r.set(Metric::NumJobsDeleted, Value::Count(self.num_deleted));
        r.set(Metric::NumAbortRecords, Value::Count(self.num_abort));
        r.set(Metric::NumLicenseRecords, Value::Count(self.num_license));
        r.set(Metric::JobSubmitRate, Value::Rate(rate(&queued)));
        r.set(Metric::JobStartRate, Value::Rate(rate(&started)));
        r.set(Metric::JobEndRate, Value::Rate(rate(&ended)));

        let jobs = self
            .order
            .iter()
            .map(|id| (*id, &self.jobs[id]))
            .collect::<Vec<(Ustr, &AcctJob)>>();
        r.set_opt(
            Metric::WaitTimes,
            job_stats(&jobs, |j| j.wait_time, StatScale::Seconds),
        );
        r.set_opt(
            Metric::RunTimes,
            job_stats(&jobs, |j| j.run_time, StatScale::Seconds),
        );
        r.set_opt(
            Metric::JobNcpus,
            job_stats(&jobs, |j| j.started.map(|_| j.ncpus as f64), StatScale::Plain),
        );
        r.set_opt(
            Metric::JobNodect,
            job_stats(&jobs, |j| j.nodect.map(|n| n as f64), StatScale::Plain),
        );

        r.set(Metric::CpuSecondsUsed, Value::Number(self.cpu_seconds()));
        if let Some(cfg) = &self.complex {
            r.set(Metric::TotalNcpus, Value::Count(cfg.total_ncpus()));
        }
        r.set_opt(Metric::Utilization, self.utilization().map(Value::Percent));
        r.set(Metric::NumMalformedRecords, Value::Count(self.num_malformed));

        if show_jobs {
            let reports = jobs
                .iter()
                .map(|(id, j)| {
                    let mut jr = Report::new();
                    jr.set(Metric::JobId, Value::Text(id.to_string()));
                    jr.set_opt(Metric::Queued, j.queued.map(Value::Time));
                    jr.set_opt(Metric::Started, j.started.map(Value::Time));
                    jr.set_opt(Metric::Ended, j.ended.map(Value::Time));
                    jr.set_opt(Metric::WaitTime, j.wait_time.map(Value::Duration));
                    jr.set_opt(Metric::RunTime, j.run_time.map(Value::Duration));
                    jr.set(Metric::Ncpus, Value::Count(j.ncpus));
                    jr.set_opt(Metric::Nodect, j.nodect.map(Value::Count));
                    jr
                })
                .collect::<Vec<Report>>();
            r.set(Metric::Jobs, Value::Reports(reports));
        }
        r
    }
}

fn sorted(xs: &[Epoch]) -> Vec<Epoch> {
    let mut xs = xs.to_vec();
    xs.sort_by(|a, b| a.total_cmp(b));
    xs
}

fn job_stats(
    jobs: &[(Ustr, &AcctJob)],
    pick: impl Fn(&AcctJob) -> Option<f64>,
    scale: StatScale,
) -> Option<Value> {
    let xs = jobs.iter().filter_map(|(_, j)| pick(*j)).collect::<Vec<f64>>();
    SummaryStatistics::compute(&xs).map(|s| Value::Stats(s, scale))
}

#[test]
fn test_parse_record() {
    let ParsedLine::Record(r) = parse_accounting_line(
        "04/24/2020 10:31:00;E;7.svr;user=alice queue=workq qtime=1587715200 start=1587715260 end=1587717060 Resource_List.ncpus=4 Resource_List.nodect=1 Resource_List.mem=4gb Resource_List.walltime=01:00:00 resources_used.walltime=00:30:00 jobname=\"my job\" Exit_status=0",
    ) else {
        panic!("Not parsed")
    };
    assert_eq!(r.rtype, RecordType::Ended);
    assert_eq!(r.id.as_str(), "7.svr");
    assert_eq!(r.cpu_count(), 4);
    assert_eq!(r.node_count(), Some(1));
    assert_eq!(r.get("Resource_List.mem"), Some(&AttrValue::Kilobytes(4 * 1024 * 1024)));
    assert_eq!(r.get("Resource_List.walltime"), Some(&AttrValue::Seconds(3600)));
    assert_eq!(r.get("Exit_status"), Some(&AttrValue::Text("0".to_string())));
    assert_eq!(r.get("jobname"), Some(&AttrValue::Text("my job".to_string())));
    assert_eq!(r.wait_time(), Some(60.0));
    assert_eq!(r.run_time(), Some(1800.0));

    // Split date and time
    let ParsedLine::Record(r) = parse_accounting_line("04/24/2020;10:00:00;Q;8.svr;queue=workq")
    else {
        panic!("Not parsed")
    };
    assert_eq!(r.rtype, RecordType::Queued);
    assert_eq!(r.cpu_count(), 1);

    assert_eq!(
        parse_accounting_line("04/24/2020 10:00:00;Q;8.svr;queue=workq bogus"),
        ParsedLine::Malformed
    );
    assert_eq!(
        parse_accounting_line("04/24/2020 10:00:00;Q;8.svr;jobname=\"open"),
        ParsedLine::Malformed
    );
    assert_eq!(parse_accounting_line("not a record"), ParsedLine::NotARecord);
    assert_eq!(
        parse_accounting_line("04/24/2020 10:00:00;X;8.svr;a=b"),
        ParsedLine::NotARecord
    );
    // License records are not key=value lists
    assert!(matches!(
        parse_accounting_line("04/24/2020 10:00:00;L;license;floating license hour:0 day:0"),
        ParsedLine::Record(_)
    ));
}

#[test]
fn test_decode_values() {
    assert_eq!(decode_size("100kb"), Some(100));
    assert_eq!(decode_size("2MB"), Some(2048));
    assert_eq!(decode_size("1025b"), Some(2));
    assert_eq!(decode_size("12"), None);
    assert_eq!(decode_size("x"), None);
    assert_eq!(decode_hms("10:00:01"), Some(36001));
    assert_eq!(decode_hms("10:61:01"), None);
    assert_eq!(
        decode_value("resources_used.cput", "00:01:00"),
        AttrValue::Seconds(60)
    );
    assert_eq!(
        decode_value("Resource_List.select", "1:ncpus=4"),
        AttrValue::Text("1:ncpus=4".to_string())
    );
    assert_eq!(
        decode_value("session", "4242"),
        AttrValue::Text("4242".to_string())
    );
}

#[cfg(test)]
fn track(lines: &[&str], from: Option<Epoch>, complex: Option<ComplexConfig>) -> AccountingTracker {
    let mut at = AccountingTracker::new(from, complex);
    for l in lines {
        if let Some(t) = record_time(l) {
            at.apply(t, l);
        }
    }
    at.finish();
    at
}

#[test]
fn test_utilization_open_job() {
    let at = track(
        &[
            "04/24/2020 10:00:00;Q;1.svr;queue=workq",
            "04/24/2020 10:00:00;S;1.svr;Resource_List.ncpus=2",
            "04/24/2020 10:30:00;Q;2.svr;queue=workq",
            "04/24/2020 11:00:00;Q;3.svr;queue=workq",
        ],
        None,
        None,
    );
    // Job 1 never ended; it counts until the last record
    assert_eq!(at.window().map(|(s, e)| e - s), Some(3600.0));
    assert_eq!(at.cpu_seconds(), 2.0 * 3600.0);
    let r = at.summarize(false);
    assert_eq!(r.count(Metric::NumJobsQueued), Some(3));
    assert_eq!(r.count(Metric::NumJobsStarted), Some(1));
    assert_eq!(r.number(Metric::CpuSecondsUsed), Some(7200.0));
    assert!(r.get(Metric::Utilization).is_none());
}

#[test]
fn test_utilization_with_complex() {
    let cfg = rustutils::read_complex_config("../tests/pbslog/complex.json").unwrap();
    let t0 = record_time("04/24/2020 10:00:00;Q;1.svr;a=b").unwrap();
    let at = track(
        &[
            "04/24/2020 10:00:00;Q;1.svr;queue=workq",
            "04/24/2020 10:00:00;S;1.svr;Resource_List.ncpus=8",
            "04/24/2020 10:30:00;E;1.svr;Resource_List.ncpus=8 resources_used.walltime=00:30:00",
            "04/24/2020 10:40:00;Q;2.svr;queue=workq bogus",
            "04/24/2020 11:00:00;D;2.svr;requestor=alice@login",
        ],
        Some(t0),
        Some(cfg),
    );
    assert_eq!(at.num_malformed(), 1);
    // 8 cpus for 1800s, plus job 90.svr from the complex at 4 cpus for the whole hour
    assert_eq!(at.cpu_seconds(), 8.0 * 1800.0 + 4.0 * 3600.0);
    let expected = 100.0 * (8.0 * 1800.0 + 4.0 * 3600.0) / (40.0 * 3600.0);
    assert_eq!(at.utilization(), Some(expected));
    let r = at.summarize(true);
    assert_eq!(r.count(Metric::NumMalformedRecords), Some(1));
    assert_eq!(r.count(Metric::NumJobsDeleted), Some(1));
    assert_eq!(r.count(Metric::TotalNcpus), Some(40));
    let jobs = r.get(Metric::Jobs).unwrap().as_reports().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].number(Metric::RunTime), Some(1800.0));
}
