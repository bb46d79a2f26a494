/// The output of an analysis is a `Report`: an ordered list of (metric, value) pairs, where a value
/// can itself be a list of reports (one per cycle, one per job).  Metrics are identified by a
/// closed enum, and the display label of each metric comes from a single table.
use rustutils::{format_duration, format_epoch, Epoch, Rate, SummaryStatistics};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    // Per cycle
    CycleIndex,
    CycleStart,
    CycleEnd,
    CycleDuration,
    QueryDuration,
    NumJobsConsidered,
    NumJobsRun,
    NumJobsFailedToRun,
    NumJobsCalendared,
    NumPreemptFailures,
    NumPreempted,
    SolverTime,
    Jobs,

    // Per job
    JobId,
    Considered,
    Run,
    Failed,
    Calendared,
    RunDuration,
    CannotRunDuration,
    CalendarDuration,
    PreemptedJobs,
    Queued,
    Started,
    Ended,
    WaitTime,
    RunTime,
    Ncpus,
    Nodect,

    // Scheduler summary
    NumCycles,
    CycleDurations,
    MinCycleStart,
    MaxCycleStart,
    TotalSolverTime,
    TotalCalendarTime,
    JobRunRate,
    SchedVersions,
    NumJobsEstimated,
    TotalDrift,
    MaxDrift,
    EstimateAccuracy,
    NumRecordsOutsideCycles,
    Cycles,

    // Server, mom and accounting summaries
    NumJobsQueued,
    NumJobsReceived,
    NumJobsStarted,
    NumJobsEnded,
    NumJobsDeleted,
    NumAbortRecords,
    NumLicenseRecords,
    JobSubmitRate,
    JobStartRate,
    JobEndRate,
    WaitTimes,
    RunTimes,
    NumNodesUp,
    NodeUpRate,
    ServerVersions,
    MomVersions,
    JobNcpus,
    JobNodect,
    CpuSecondsUsed,
    TotalNcpus,
    Utilization,
    NumMalformedRecords,

    // Ad hoc searches
    NumMatches,
    Intervals,
    IntervalStart,
    IntervalCount,
    NumSequenceMatches,
    SequenceMatchTimes,
}

const METRIC_LABELS: &[(Metric, &str)] = &[
    (Metric::CycleIndex, "cycle"),
    (Metric::CycleStart, "start"),
    (Metric::CycleEnd, "end"),
    (Metric::CycleDuration, "cycle_duration"),
    (Metric::QueryDuration, "query_duration"),
    (Metric::NumJobsConsidered, "num_jobs_considered"),
    (Metric::NumJobsRun, "num_jobs_run"),
    (Metric::NumJobsFailedToRun, "num_jobs_failed_to_run"),
    (Metric::NumJobsCalendared, "num_jobs_calendared"),
    (Metric::NumPreemptFailures, "num_preempt_failures"),
    (Metric::NumPreempted, "num_preempted"),
    (Metric::SolverTime, "solver_time"),
    (Metric::Jobs, "jobs"),
    (Metric::JobId, "job_id"),
    (Metric::Considered, "considered"),
    (Metric::Run, "run"),
    (Metric::Failed, "failed"),
    (Metric::Calendared, "calendared"),
    (Metric::RunDuration, "run_duration"),
    (Metric::CannotRunDuration, "cannot_run_duration"),
    (Metric::CalendarDuration, "calendar_duration"),
    (Metric::PreemptedJobs, "preempted"),
    (Metric::Queued, "queued"),
    (Metric::Started, "started"),
    (Metric::Ended, "ended"),
    (Metric::WaitTime, "wait_time"),
    (Metric::RunTime, "run_time"),
    (Metric::Ncpus, "ncpus"),
    (Metric::Nodect, "nodect"),
    (Metric::NumCycles, "num_cycles"),
    (Metric::CycleDurations, "cycle_durations"),
    (Metric::MinCycleStart, "min_cycle_start"),
    (Metric::MaxCycleStart, "max_cycle_start"),
    (Metric::TotalSolverTime, "total_solver_time"),
    (Metric::TotalCalendarTime, "total_calendar_time"),
    (Metric::JobRunRate, "job_run_rate"),
    (Metric::SchedVersions, "sched_versions"),
    (Metric::NumJobsEstimated, "num_jobs_estimated"),
    (Metric::TotalDrift, "total_drift"),
    (Metric::MaxDrift, "max_drift"),
    (Metric::EstimateAccuracy, "estimate_accuracy"),
    (Metric::NumRecordsOutsideCycles, "num_records_outside_cycles"),
    (Metric::Cycles, "cycles"),
    (Metric::NumJobsQueued, "num_jobs_queued"),
    (Metric::NumJobsReceived, "num_jobs_received"),
    (Metric::NumJobsStarted, "num_jobs_started"),
    (Metric::NumJobsEnded, "num_jobs_ended"),
    (Metric::NumJobsDeleted, "num_jobs_deleted"),
    (Metric::NumAbortRecords, "num_abort_records"),
    (Metric::NumLicenseRecords, "num_license_records"),
    (Metric::JobSubmitRate, "job_submit_rate"),
    (Metric::JobStartRate, "job_start_rate"),
    (Metric::JobEndRate, "job_end_rate"),
    (Metric::WaitTimes, "wait_times"),
    (Metric::RunTimes, "run_times"),
    (Metric::NumNodesUp, "num_nodes_up"),
    (Metric::NodeUpRate, "node_up_rate"),
    (Metric::ServerVersions, "server_versions"),
    (Metric::MomVersions, "mom_versions"),
    (Metric::JobNcpus, "job_ncpus"),
    (Metric::JobNodect, "job_nodect"),
    (Metric::CpuSecondsUsed, "cpu_seconds_used"),
    (Metric::TotalNcpus, "total_ncpus"),
    (Metric::Utilization, "utilization"),
    (Metric::NumMalformedRecords, "num_malformed_records"),
    (Metric::NumMatches, "num_matches"),
    (Metric::Intervals, "intervals"),
    (Metric::IntervalStart, "interval_start"),
    (Metric::IntervalCount, "count"),
    (Metric::NumSequenceMatches, "num_sequence_matches"),
    (Metric::SequenceMatchTimes, "sequence_match_times"),
];

impl Metric {
    pub fn label(self) -> &'static str {
        METRIC_LABELS
            .iter()
            .find(|(m, _)| *m == self)
            .map(|(_, l)| *l)
            .unwrap_or("unlabeled")
    }

    pub fn from_label(label: &str) -> Option<Metric> {
        METRIC_LABELS
            .iter()
            .find(|(_, l)| *l == label)
            .map(|(m, _)| *m)
    }
}

/// How the numbers of a `Value::Stats` should be rendered.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatScale {
    Seconds,
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Count(u64),
    Number(f64),
    Percent(f64),
    Duration(f64),
    Time(Epoch),
    Text(String),
    List(Vec<String>),
    Rate(Rate),
    Stats(SummaryStatistics, StatScale),
    Reports(Vec<Report>),
}

impl Value {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Value::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// The raw number behind a count, number, percentage, duration or time.

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Count(n) => Some(*n as f64),
            Value::Number(x) | Value::Percent(x) | Value::Duration(x) | Value::Time(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_reports(&self) -> Option<&[Report]> {
        match self {
            Value::Reports(rs) => Some(rs),
            _ => None,
        }
    }
}

fn render_number(x: f64, scale: StatScale) -> String {
    match scale {
        StatScale::Seconds => format_duration(x),
        StatScale::Plain => {
            if x.fract() == 0.0 {
                format!("{}", x as i64)
            } else {
                format!("{x:.2}")
            }
        }
    }
}

// Nested reports have no sensible one-line rendering; the dumpers walk them instead.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Count(n) => write!(f, "{n}"),
            Value::Number(x) => write!(f, "{}", render_number(*x, StatScale::Plain)),
            Value::Percent(x) => write!(f, "{x:.2}%"),
            Value::Duration(x) => write!(f, "{}", format_duration(*x)),
            Value::Time(t) => write!(f, "{}", format_epoch(*t)),
            Value::Text(s) => write!(f, "{s}"),
            Value::List(xs) => write!(f, "{}", xs.join(",")),
            Value::Rate(r) => write!(f, "{r}"),
            Value::Stats(s, scale) => write!(
                f,
                "min={} max={} mean={} p25={} p50={} p75={}",
                render_number(s.min, *scale),
                render_number(s.max, *scale),
                render_number(s.mean, *scale),
                render_number(s.p25, *scale),
                render_number(s.p50, *scale),
                render_number(s.p75, *scale)
            ),
            Value::Reports(rs) => write!(f, "[{} entries]", rs.len()),
        }
    }
}

/// An ordered mapping from metric to value.  Insertion order is the output order.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Report {
    entries: Vec<(Metric, Value)>,
}

impl Report {
    pub fn new() -> Report {
        Report { entries: vec![] }
    }

    /// Add or replace.  A replaced entry keeps its position.

    pub fn set(&mut self, metric: Metric, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(m, _)| *m == metric) {
            slot.1 = value;
        } else {
            self.entries.push((metric, value));
        }
    }

    /// Add the value only if there is one.

    pub fn set_opt(&mut self, metric: Metric, value: Option<Value>) {
        if let Some(v) = value {
            self.set(metric, v);
        }
    }

    pub fn get(&self, metric: Metric) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| v)
    }

    pub fn count(&self, metric: Metric) -> Option<u64> {
        self.get(metric).and_then(|v| v.as_count())
    }

    pub fn number(&self, metric: Metric) -> Option<f64> {
        self.get(metric).and_then(|v| v.as_f64())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Metric, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[test]
fn test_labels_are_unique() {
    for (i, (m, l)) in METRIC_LABELS.iter().enumerate() {
        for (n, k) in &METRIC_LABELS[i + 1..] {
            assert!(m != n, "{l} listed twice");
            assert!(l != k, "label {l} used twice");
        }
        assert_eq!(Metric::from_label(l), Some(*m));
    }
    assert_eq!(Metric::NumJobsRun.label(), "num_jobs_run");
    assert_eq!(Metric::CycleDuration.label(), "cycle_duration");
}

#[test]
fn test_report_order() {
    let mut r = Report::new();
    r.set(Metric::NumCycles, Value::Count(2));
    r.set(Metric::JobRunRate, Value::Rate(Rate::Zero));
    r.set(Metric::NumCycles, Value::Count(3));
    r.set_opt(Metric::MinCycleStart, None);
    assert_eq!(r.len(), 2);
    assert_eq!(r.iter().next().unwrap().0, Metric::NumCycles);
    assert_eq!(r.count(Metric::NumCycles), Some(3));
    assert_eq!(r.get(Metric::JobRunRate).unwrap().to_string(), "0");
}

#[test]
fn test_value_display() {
    assert_eq!(Value::Duration(3723.0).to_string(), "1:02:03");
    assert_eq!(Value::Number(4.0).to_string(), "4");
    assert_eq!(Value::Number(4.5).to_string(), "4.50");
    assert_eq!(Value::Percent(12.345).to_string(), "12.35%");
    assert_eq!(
        Value::List(vec!["a".to_string(), "b".to_string()]).to_string(),
        "a,b"
    );
    let s = SummaryStatistics::compute(&[1.0, 3.0]).unwrap();
    assert_eq!(
        Value::Stats(s, StatScale::Plain).to_string(),
        "min=1 max=3 mean=2 p25=1.50 p50=2 p75=2.50"
    );
}
