/// Rebuild the scheduler's cycles from its log.
///
/// A cycle opens on "Starting Scheduling Cycle" and normally closes on "Leaving Scheduling Cycle".
/// The markers are unreliable: the scheduler can be killed or its log rotated mid-cycle (the next
/// start closes the old cycle), an alarm can interrupt the cycle (it closes without attributing the
/// last job's time), or the log can simply end (the cycle closes at the last record we saw).
///
/// Within a cycle each job is "considered" in turn and then run, calendared (made a top job,
/// reserving a future start), or left alone.  The time from consideration to the decision is
/// attributed to the job; the time between considering a job and considering the next one, when
/// the first was neither run nor calendared, is its "cannot run" time.  Together with the calendar
/// time that makes up the solver time of the cycle.
///
/// Array subjobs complicate matters: the array `55[].svr` is considered once but its subjobs
/// `55[2].svr` etc are run (or calendared) individually, so the consideration time of a subjob is
/// taken from its array when the subjob itself was not considered.
use crate::driver::LogAnalyzer;
use crate::metrics::{Metric, Report, StatScale, Value};
use crate::patterns::{array_parent, scheduler_patterns, PatternRegistry, SchedTag};
use anyhow::Result;
use itertools::Itertools;
use rustutils::{decode_ctime, rate, Epoch, SummaryStatistics};
use std::collections::HashMap;
use tracing::debug;
use ustr::Ustr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    End,
    Alarm,
    NextStart,
    EndOfLog,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub start: Epoch,
    pub end: Option<Epoch>,
    pub closed_by: Option<CloseReason>,
    pub query_duration: Option<f64>,
    pub considered: HashMap<Ustr, Epoch>,
    pub considered_order: Vec<Ustr>,
    pub run: HashMap<Ustr, Epoch>,
    pub failed: HashMap<Ustr, Epoch>,
    pub calendared: HashMap<Ustr, Epoch>,
    pub preempted: HashMap<Ustr, Vec<Ustr>>,
    pub run_duration: HashMap<Ustr, f64>,
    pub cannot_run_duration: HashMap<Ustr, f64>,
    pub calendar_duration: HashMap<Ustr, f64>,
    pub num_considered: u64,
    pub num_preempt_failures: u64,
    pub num_preempted: u64,
    pub last_considered_job: Option<Ustr>,
}

impl Cycle {
    pub fn new(start: Epoch) -> Cycle {
        Cycle {
            start,
            end: None,
            closed_by: None,
            query_duration: None,
            considered: HashMap::new(),
            considered_order: vec![],
            run: HashMap::new(),
            failed: HashMap::new(),
            calendared: HashMap::new(),
            preempted: HashMap::new(),
            run_duration: HashMap::new(),
            cannot_run_duration: HashMap::new(),
            calendar_duration: HashMap::new(),
            num_considered: 0,
            num_preempt_failures: 0,
            num_preempted: 0,
            last_considered_job: None,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        Some(self.end? - self.start)
    }

    fn close(&mut self, t: Epoch, reason: CloseReason) {
        self.end = Some(t.max(self.start));
        self.closed_by = Some(reason);
    }

    // Attribute the time since `job` was considered, unless a decision was made for it.
    fn attribute_cannot_run(&mut self, job: Ustr, t: Epoch) {
        if self.run.contains_key(&job) || self.calendared.contains_key(&job) {
            return;
        }
        if let Some(c) = self.considered.get(&job) {
            self.cannot_run_duration.insert(job, t - c);
        }
    }

    fn consider(&mut self, job: Ustr, t: Epoch) {
        self.num_considered += 1;
        self.considered.insert(job, t);
        self.considered_order.push(job);
        // A job considered again right away gets zero, not the gap.
        if let Some(prev) = self.last_considered_job {
            self.attribute_cannot_run(prev, t);
        }
        if self.query_duration.is_none() {
            self.query_duration = Some(t - self.start);
        }
        self.last_considered_job = Some(job);
    }

    fn job_run(&mut self, job: Ustr, t: Epoch) {
        if !self.considered.contains_key(&job) {
            if let Some(parent) = array_parent(&job) {
                if let Some(c) = self.considered.get(&Ustr::from(parent.as_str())).copied() {
                    self.considered.insert(job, c);
                }
            }
        }
        // A rerun after a failed preemption may not have been considered in this cycle.
        if let Some(c) = self.considered.get(&job) {
            self.run_duration.insert(job, t - c);
        }
        self.run.insert(job, t);
    }

    fn calendar(&mut self, job: Ustr, t: Epoch) {
        self.calendared.insert(job, t);
        if let Some(c) = self.considered.get(&job) {
            self.calendar_duration.insert(job, t - c);
        } else if let Some(parent) = array_parent(&job) {
            if let Some(c) = self.considered.get(&Ustr::from(parent.as_str())).copied() {
                self.considered.insert(job, c);
                self.calendar_duration.insert(job, t - c);
            }
        }
    }

    fn preempt(&mut self, victim: Ustr) {
        self.num_preempted += 1;
        if let Some(p) = self.last_considered_job {
            self.preempted.entry(p).or_default().push(victim);
        }
    }

    pub fn total_cannot_run(&self) -> f64 {
        stable_sum(self.cannot_run_duration.values())
    }

    pub fn total_calendar(&self) -> f64 {
        stable_sum(self.calendar_duration.values())
    }

    pub fn solver_time(&self) -> f64 {
        self.total_cannot_run() + self.total_calendar()
    }

    // Jobs in evaluation order, followed by jobs that had a decision but no consideration of their
    // own (subjobs, reruns), by name.
    fn jobs_in_order(&self) -> Vec<Ustr> {
        let mut jobs = self.considered_order.iter().copied().unique().collect::<Vec<Ustr>>();
        let extra = self
            .considered
            .keys()
            .chain(self.run.keys())
            .chain(self.failed.keys())
            .chain(self.calendared.keys())
            .filter(|j| !jobs.contains(*j))
            .copied()
            .unique()
            .sorted_by(|a, b| a.as_str().cmp(b.as_str()))
            .collect::<Vec<Ustr>>();
        jobs.extend(extra);
        jobs
    }

    pub fn summarize(&self, index: usize, show_jobs: bool) -> Report {
        let mut r = Report::new();
        r.set(Metric::CycleIndex, Value::Count(index as u64));
        r.set(Metric::CycleStart, Value::Time(self.start));
        r.set_opt(Metric::CycleEnd, self.end.map(Value::Time));
        r.set_opt(Metric::CycleDuration, self.duration().map(Value::Duration));
        r.set_opt(Metric::QueryDuration, self.query_duration.map(Value::Duration));
        r.set(Metric::NumJobsConsidered, Value::Count(self.num_considered));
        r.set(Metric::NumJobsRun, Value::Count(self.run.len() as u64));
        r.set(Metric::NumJobsFailedToRun, Value::Count(self.failed.len() as u64));
        r.set(Metric::NumJobsCalendared, Value::Count(self.calendared.len() as u64));
        r.set(Metric::NumPreemptFailures, Value::Count(self.num_preempt_failures));
        r.set(Metric::NumPreempted, Value::Count(self.num_preempted));
        r.set(Metric::SolverTime, Value::Duration(self.solver_time()));
        if show_jobs {
            let jobs = self
                .jobs_in_order()
                .into_iter()
                .map(|j| self.summarize_job(j))
                .collect::<Vec<Report>>();
            r.set(Metric::Jobs, Value::Reports(jobs));
        }
        r
    }

    fn summarize_job(&self, job: Ustr) -> Report {
        let mut jr = Report::new();
        jr.set(Metric::JobId, Value::Text(job.to_string()));
        jr.set_opt(Metric::Considered, self.considered.get(&job).map(|t| Value::Time(*t)));
        jr.set_opt(Metric::Run, self.run.get(&job).map(|t| Value::Time(*t)));
        jr.set_opt(Metric::Calendared, self.calendared.get(&job).map(|t| Value::Time(*t)));
        jr.set_opt(Metric::Failed, self.failed.get(&job).map(|t| Value::Time(*t)));
        jr.set_opt(
            Metric::RunDuration,
            self.run_duration.get(&job).map(|d| Value::Duration(*d)),
        );
        jr.set_opt(
            Metric::CannotRunDuration,
            self.cannot_run_duration.get(&job).map(|d| Value::Duration(*d)),
        );
        jr.set_opt(
            Metric::CalendarDuration,
            self.calendar_duration.get(&job).map(|d| Value::Duration(*d)),
        );
        jr.set_opt(
            Metric::PreemptedJobs,
            self.preempted
                .get(&job)
                .map(|ks| Value::List(ks.iter().map(|k| k.to_string()).collect())),
        );
        jr
    }
}

// Summing in hash order would make the low bits depend on the run.
fn stable_sum<'a>(xs: impl Iterator<Item = &'a f64>) -> f64 {
    let mut v = xs.copied().collect::<Vec<f64>>();
    v.sort_by(|a, b| a.total_cmp(b));
    v.iter().sum()
}

/// The estimated start times the scheduler advertised for one job, and when it actually started.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimateHistory {
    pub estimates: Vec<Epoch>,
    pub started: Option<Epoch>,
}

impl EstimateHistory {
    /// The sum of the increases between consecutive estimates.  Improvements do not cancel
    /// slippage.

    pub fn drift(&self) -> f64 {
        self.estimates
            .iter()
            .tuple_windows()
            .map(|(a, b)| (b - a).max(0.0))
            .sum()
    }

    /// Positive when the job started later than last promised.

    pub fn accuracy(&self) -> Option<f64> {
        Some(self.started? - *self.estimates.last()?)
    }
}

pub struct CycleReconstructor {
    patterns: PatternRegistry<SchedTag>,
    cycles: Vec<Cycle>,
    current: Option<Cycle>,
    estimates: HashMap<Ustr, EstimateHistory>,
    estimate_order: Vec<Ustr>,
    versions: Vec<String>,
    last_timestamp: Option<Epoch>,
    num_outside_cycles: u64,
}

impl CycleReconstructor {
    pub fn new() -> Result<CycleReconstructor> {
        Ok(CycleReconstructor {
            patterns: scheduler_patterns()?,
            cycles: vec![],
            current: None,
            estimates: HashMap::new(),
            estimate_order: vec![],
            versions: vec![],
            last_timestamp: None,
            num_outside_cycles: 0,
        })
    }

    /// Closed cycles, in order.  An open cycle is included only after `finish`.

    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    pub fn estimate(&self, job: &str) -> Option<&EstimateHistory> {
        self.estimates.get(&Ustr::from(job))
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    fn close_current(&mut self, t: Epoch, reason: CloseReason) {
        if let Some(mut c) = self.current.take() {
            c.close(t, reason);
            self.cycles.push(c);
        }
    }

    fn record(&mut self, t: Epoch, tag: SchedTag, jobid: Option<&str>, extra: Option<&str>) {
        let job = jobid.map(Ustr::from);

        // Estimates are tracked across cycles.
        match (tag, job) {
            (SchedTag::TopJob, Some(j)) => {
                if let Some(est) = extra.and_then(decode_ctime) {
                    if !self.estimates.contains_key(&j) {
                        self.estimate_order.push(j);
                    }
                    self.estimates.entry(j).or_default().estimates.push(est);
                }
            }
            (SchedTag::JobRun, Some(j)) => {
                if let Some(h) = self.estimates.get_mut(&j) {
                    if h.started.is_none() {
                        h.started = Some(t);
                    }
                }
            }
            _ => {}
        }

        if tag == SchedTag::CycleStart {
            if self.current.is_some() {
                debug!("Cycle without end closed by the next start");
                self.close_current(t, CloseReason::NextStart);
            }
            self.current = Some(Cycle::new(t));
            return;
        }

        let Some(cycle) = self.current.as_mut() else {
            self.num_outside_cycles += 1;
            return;
        };
        match (tag, job) {
            (SchedTag::CycleEnd, _) => {
                if let Some(last) = cycle.last_considered_job {
                    cycle.attribute_cannot_run(last, t);
                }
                self.close_current(t, CloseReason::End);
            }
            (SchedTag::Alarm, _) => {
                self.close_current(t, CloseReason::Alarm);
            }
            (SchedTag::Considering, Some(j)) => cycle.consider(j, t),
            (SchedTag::JobRun, Some(j)) => cycle.job_run(j, t),
            (SchedTag::RunFailure, Some(j)) => {
                cycle.failed.insert(j, t);
            }
            (SchedTag::PreemptFailure, _) => cycle.num_preempt_failures += 1,
            (SchedTag::Preempted, Some(k)) => cycle.preempt(k),
            (SchedTag::TopJob, Some(j)) => cycle.calendar(j, t),
            _ => {}
        }
    }
}

impl LogAnalyzer for CycleReconstructor {
    fn apply(&mut self, t: Epoch, line: &str) -> bool {
        self.last_timestamp = Some(t);
        if let Some(v) = self.patterns.version(line) {
            if !self.versions.iter().any(|x| x == v) {
                self.versions.push(v.to_string());
            }
        }
        let Some(c) = self.patterns.classify(line) else {
            return false;
        };
        self.record(t, c.tag, c.jobid, c.extra);
        true
    }

    fn finish(&mut self) {
        if let (Some(t), true) = (self.last_timestamp, self.current.is_some()) {
            debug!("Log ended inside a cycle, closing it at the last record");
            self.close_current(t, CloseReason::EndOfLog);
        }
    }

    fn summarize(&self, show_jobs: bool) -> Report {
        let mut r = Report::new();
        let cycles = &self.cycles;
        r.set(Metric::NumCycles, Value::Count(cycles.len() as u64));
        r.set(
            Metric::NumJobsRun,
            Value::Count(cycles.iter().map(|c| c.run.len() as u64).sum()),
        );
        r.set(
            Metric::NumJobsConsidered,
            Value::Count(cycles.iter().map(|c| c.num_considered).sum()),
        );
        r.set(
            Metric::NumJobsFailedToRun,
            Value::Count(cycles.iter().map(|c| c.failed.len() as u64).sum()),
        );
        r.set(
            Metric::NumJobsCalendared,
            Value::Count(cycles.iter().map(|c| c.calendared.len() as u64).sum()),
        );
        r.set(
            Metric::NumPreemptFailures,
            Value::Count(cycles.iter().map(|c| c.num_preempt_failures).sum()),
        );
        r.set(
            Metric::NumPreempted,
            Value::Count(cycles.iter().map(|c| c.num_preempted).sum()),
        );

        let durations = cycles
            .iter()
            .filter_map(|c| c.duration().map(|d| (d, c.start)))
            .collect::<Vec<(f64, Epoch)>>();
        let samples = durations.iter().map(|(d, _)| *d).collect::<Vec<f64>>();
        if let Some(stats) = SummaryStatistics::compute(&samples) {
            // First cycle with the extreme duration, for locating it in the log.
            let min_start = durations.iter().find(|(d, _)| *d == stats.min).map(|(_, s)| *s);
            let max_start = durations.iter().find(|(d, _)| *d == stats.max).map(|(_, s)| *s);
            r.set(Metric::CycleDurations, Value::Stats(stats, StatScale::Seconds));
            r.set_opt(Metric::MinCycleStart, min_start.map(Value::Time));
            r.set_opt(Metric::MaxCycleStart, max_start.map(Value::Time));
        }

        r.set(
            Metric::TotalSolverTime,
            Value::Duration(cycles.iter().map(|c| c.solver_time()).sum()),
        );
        r.set(
            Metric::TotalCalendarTime,
            Value::Duration(cycles.iter().map(|c| c.total_calendar()).sum()),
        );
        let mut runs = cycles
            .iter()
            .flat_map(|c| c.run.values().copied())
            .collect::<Vec<Epoch>>();
        runs.sort_by(|a, b| a.total_cmp(b));
        r.set(Metric::JobRunRate, Value::Rate(rate(&runs)));
        r.set(Metric::SchedVersions, Value::List(self.versions.clone()));

        let histories = self
            .estimate_order
            .iter()
            .map(|j| &self.estimates[j])
            .collect::<Vec<&EstimateHistory>>();
        r.set(Metric::NumJobsEstimated, Value::Count(histories.len() as u64));
        if !histories.is_empty() {
            let drifts = histories.iter().map(|h| h.drift()).collect::<Vec<f64>>();
            r.set(Metric::TotalDrift, Value::Duration(drifts.iter().sum()));
            r.set(
                Metric::MaxDrift,
                Value::Duration(drifts.iter().copied().fold(0.0, f64::max)),
            );
            let accuracy = histories.iter().filter_map(|h| h.accuracy()).collect::<Vec<f64>>();
            r.set_opt(
                Metric::EstimateAccuracy,
                SummaryStatistics::compute(&accuracy).map(|s| Value::Stats(s, StatScale::Seconds)),
            );
        }
        r.set(
            Metric::NumRecordsOutsideCycles,
            Value::Count(self.num_outside_cycles),
        );
        r.set(
            Metric::Cycles,
            Value::Reports(
                cycles
                    .iter()
                    .enumerate()
                    .map(|(i, c)| c.summarize(i, show_jobs))
                    .collect(),
            ),
        );
        r
    }
}

#[cfg(test)]
fn reconstruct(lines: &[&str]) -> CycleReconstructor {
    let mut cr = CycleReconstructor::new().unwrap();
    for l in lines {
        let t = rustutils::decode_timestamp(l.split(';').next().unwrap()).unwrap();
        cr.apply(t, l);
    }
    cr.finish();
    cr
}

#[cfg(test)]
fn at(s: &str) -> Epoch {
    rustutils::decode_timestamp(&format!("04/24/2020 {s}")).unwrap()
}

#[test]
fn test_simple_cycle() {
    let cr = reconstruct(&[
        "04/24/2020 16:00:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:00:01;0040;pbs_sched;Job;123.host;Considering job to run",
        "04/24/2020 16:00:04;0040;pbs_sched;Job;123.host;Job run",
        "04/24/2020 16:00:10;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
    ]);
    assert_eq!(cr.cycles().len(), 1);
    let c = &cr.cycles()[0];
    assert_eq!(c.start, at("16:00:00"));
    assert_eq!(c.end, Some(at("16:00:10")));
    assert_eq!(c.closed_by, Some(CloseReason::End));
    assert_eq!(c.num_considered, 1);
    assert_eq!(c.run_duration[&Ustr::from("123.host")], 3.0);
    assert_eq!(c.duration(), Some(10.0));
    assert_eq!(c.query_duration, Some(1.0));
    assert!(c.cannot_run_duration.is_empty());

    let r = cr.summarize(false);
    assert_eq!(r.count(Metric::NumCycles), Some(1));
    assert_eq!(r.count(Metric::NumJobsRun), Some(1));
    let cycles = r.get(Metric::Cycles).unwrap().as_reports().unwrap();
    assert_eq!(cycles[0].number(Metric::CycleDuration), Some(10.0));
    assert!(cycles[0].get(Metric::Jobs).is_none());
}

#[test]
fn test_cannot_run() {
    let cr = reconstruct(&[
        "04/24/2020 16:00:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:00:02;0040;pbs_sched;Job;1.svr;Considering job to run",
        "04/24/2020 16:00:05;0040;pbs_sched;Job;2.svr;Considering job to run",
        "04/24/2020 16:00:06;0040;pbs_sched;Job;2.svr;Job run",
        "04/24/2020 16:00:07;0040;pbs_sched;Job;3.svr;Considering job to run",
        "04/24/2020 16:00:09;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
    ]);
    let c = &cr.cycles()[0];
    assert_eq!(c.cannot_run_duration[&Ustr::from("1.svr")], 3.0);
    assert!(!c.cannot_run_duration.contains_key(&Ustr::from("2.svr")));
    // The last job gets the time up to the end of the cycle
    assert_eq!(c.cannot_run_duration[&Ustr::from("3.svr")], 2.0);
    assert_eq!(c.solver_time(), 5.0);
    assert_eq!(c.query_duration, Some(2.0));
}

#[test]
fn test_considered_twice() {
    let cr = reconstruct(&[
        "04/24/2020 16:00:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:00:01;0040;pbs_sched;Job;1.svr;Considering job to run",
        "04/24/2020 16:00:05;0040;pbs_sched;Job;1.svr;Considering job to run",
        "04/24/2020 16:00:06;0040;pbs_sched;Job;1.svr;Job run",
        "04/24/2020 16:00:09;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
    ]);
    let c = &cr.cycles()[0];
    assert_eq!(c.cannot_run_duration.get(&Ustr::from("1.svr")), Some(&0.0));
    assert_eq!(c.run_duration[&Ustr::from("1.svr")], 1.0);
    assert_eq!(c.num_considered, 2);
    assert_eq!(c.solver_time(), 0.0);
}

#[test]
fn test_subjob_backfill() {
    let cr = reconstruct(&[
        "04/24/2020 16:00:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:00:01;0040;pbs_sched;Job;55[].svr;Considering job to run",
        "04/24/2020 16:00:03;0040;pbs_sched;Job;55[2].svr;Job run",
        "04/24/2020 16:00:04;0040;pbs_sched;Job;55[3].svr;Job is a top job and will run at Fri Apr 24 18:00:00 2020",
        "04/24/2020 16:00:05;0040;pbs_sched;Job;77.svr;Job run",
        "04/24/2020 16:00:06;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
    ]);
    let c = &cr.cycles()[0];
    assert_eq!(c.run_duration[&Ustr::from("55[2].svr")], 2.0);
    assert_eq!(c.considered[&Ustr::from("55[2].svr")], at("16:00:01"));
    assert_eq!(c.calendar_duration[&Ustr::from("55[3].svr")], 3.0);
    // Run without consideration: no duration, but still counted as run
    assert!(!c.run_duration.contains_key(&Ustr::from("77.svr")));
    assert_eq!(c.run.len(), 2);
    assert_eq!(c.num_considered, 1);

    let h = cr.estimate("55[3].svr").unwrap();
    assert_eq!(h.estimates, vec![at("18:00:00")]);
}

#[test]
fn test_end_of_log_and_rotation() {
    let cr = reconstruct(&[
        "04/24/2020 16:00:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:00:01;0040;pbs_sched;Job;1.svr;Considering job to run",
        "04/24/2020 16:10:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:10:01;0040;pbs_sched;Job;1.svr;Considering job to run",
        "04/24/2020 16:10:07;0001;pbs_sched;Svr;Log;some unrelated message",
    ]);
    assert_eq!(cr.cycles().len(), 2);
    assert_eq!(cr.cycles()[0].end, Some(at("16:10:00")));
    assert_eq!(cr.cycles()[0].closed_by, Some(CloseReason::NextStart));
    // No attribution without a clean end
    assert!(cr.cycles()[0].cannot_run_duration.is_empty());
    assert_eq!(cr.cycles()[1].end, Some(at("16:10:07")));
    assert_eq!(cr.cycles()[1].closed_by, Some(CloseReason::EndOfLog));
}

#[test]
fn test_alarm_and_preemption() {
    let cr = reconstruct(&[
        "04/24/2020 16:00:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:00:01;0040;pbs_sched;Job;9.svr;Considering job to run",
        "04/24/2020 16:00:02;0040;pbs_sched;Job;4.svr;Job preempted",
        "04/24/2020 16:00:02;0040;pbs_sched;Job;5.svr;Job preempted",
        "04/24/2020 16:00:03;0040;pbs_sched;Job;6.svr;Failed to preempt job",
        "04/24/2020 16:00:04;0040;pbs_sched;Job;12].svr;Failed to run",
        "04/24/2020 16:00:05;0100;pbs_sched;Svr;Alarm;Alarm received, ending cycle",
        "04/24/2020 16:00:06;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
    ]);
    assert_eq!(cr.cycles().len(), 1);
    let c = &cr.cycles()[0];
    assert_eq!(c.closed_by, Some(CloseReason::Alarm));
    assert_eq!(c.end, Some(at("16:00:05")));
    assert!(c.cannot_run_duration.is_empty());
    assert_eq!(c.num_preempted, 2);
    assert_eq!(c.num_preempt_failures, 1);
    assert_eq!(
        c.preempted[&Ustr::from("9.svr")],
        vec![Ustr::from("4.svr"), Ustr::from("5.svr")]
    );
    assert!(c.failed.contains_key(&Ustr::from("12].svr")));
    let r = cr.summarize(false);
    assert_eq!(r.count(Metric::NumRecordsOutsideCycles), Some(1));
}

#[test]
fn test_deterministic() {
    let lines = [
        "04/24/2020 16:00:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:00:00.250000;0040;pbs_sched;Job;1.svr;Considering job to run",
        "04/24/2020 16:00:00.500000;0040;pbs_sched;Job;2.svr;Considering job to run",
        "04/24/2020 16:00:00.700000;0040;pbs_sched;Job;3.svr;Considering job to run",
        "04/24/2020 16:00:01;0040;pbs_sched;Job;3.svr;Job is a top job",
        "04/24/2020 16:00:01.100000;0040;pbs_sched;Job;4.svr;Considering job to run",
        "04/24/2020 16:00:02;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
    ];
    let a = reconstruct(&lines);
    let b = reconstruct(&lines);
    assert_eq!(a.cycles(), b.cycles());
    assert_eq!(a.summarize(true), b.summarize(true));
}

#[test]
fn test_estimates() {
    let cr = reconstruct(&[
        "04/24/2020 16:00:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:00:01;0040;pbs_sched;Job;8.svr;Considering job to run",
        "04/24/2020 16:00:02;0040;pbs_sched;Job;8.svr;Job is a top job and will run at Fri Apr 24 17:00:00 2020",
        "04/24/2020 16:00:03;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
        "04/24/2020 16:10:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 16:10:01;0040;pbs_sched;Job;8.svr;Considering job to run",
        "04/24/2020 16:10:02;0040;pbs_sched;Job;8.svr;Job is a top job and will run at Fri Apr 24 17:30:00 2020",
        "04/24/2020 16:10:03;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
        "04/24/2020 17:40:00;0080;pbs_sched;Req;;Starting Scheduling Cycle",
        "04/24/2020 17:40:01;0040;pbs_sched;Job;8.svr;Considering job to run",
        "04/24/2020 17:40:02;0040;pbs_sched;Job;8.svr;Job run",
        "04/24/2020 17:40:03;0080;pbs_sched;Req;;Leaving Scheduling Cycle",
    ]);
    let h = cr.estimate("8.svr").unwrap();
    assert_eq!(h.drift(), 1800.0);
    assert_eq!(h.accuracy(), Some(602.0));
    let r = cr.summarize(true);
    assert_eq!(r.count(Metric::NumJobsEstimated), Some(1));
    assert_eq!(r.number(Metric::TotalDrift), Some(1800.0));
    assert_eq!(r.count(Metric::NumJobsCalendared), Some(2));
    let cycles = r.get(Metric::Cycles).unwrap().as_reports().unwrap();
    let jobs = cycles[0].get(Metric::Jobs).unwrap().as_reports().unwrap();
    assert_eq!(jobs[0].number(Metric::CalendarDuration), Some(1.0));
}

#[test]
fn test_versions() {
    let cr = reconstruct(&[
        "04/24/2020 15:59:00;0002;pbs_sched;Svr;Log;pbs_version=19.1.3",
        "04/24/2020 15:59:01;0002;pbs_sched;Svr;Log;pbs_version=19.1.3",
        "04/24/2020 15:59:02;0002;pbs_sched;Svr;Log;pbs_version=2020.1",
    ]);
    assert_eq!(cr.versions(), &["19.1.3".to_string(), "2020.1".to_string()]);
    assert!(cr.cycles().is_empty());
}
