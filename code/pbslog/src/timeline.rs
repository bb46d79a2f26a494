/// Per-job timestamp lists shared by the server and mom trackers.
///
/// A job can be run more than once (requeued, rerun after preemption) and so can end more than
/// once; all events are kept in arrival order.  Jobs are listed in the order they were first seen.
use crate::metrics::{Metric, Report, StatScale, Value};
use rustutils::{rate, Epoch, SummaryStatistics};
use std::collections::HashMap;
use ustr::Ustr;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobTimeline {
    pub queued: Option<Epoch>,
    pub run: Vec<Epoch>,
    pub ended: Vec<Epoch>,
}

impl JobTimeline {
    /// Time from queueing to the first run.

    pub fn wait_time(&self) -> Option<f64> {
        Some(*self.run.first()? - self.queued?)
    }

    /// Time from the most recent run to the last end, if the job ended after it was last run.

    pub fn run_time(&self) -> Option<f64> {
        let started = *self.run.last()?;
        let ended = *self.ended.last()?;
        if ended >= started {
            Some(ended - started)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Timelines {
    jobs: HashMap<Ustr, JobTimeline>,
    order: Vec<Ustr>,
}

impl Timelines {
    pub fn new() -> Timelines {
        Default::default()
    }

    fn entry(&mut self, job: Ustr) -> &mut JobTimeline {
        if !self.jobs.contains_key(&job) {
            self.order.push(job);
        }
        self.jobs.entry(job).or_default()
    }

    /// A job requeued after a run keeps its first queue time.

    pub fn queued(&mut self, job: Ustr, t: Epoch) {
        let tl = self.entry(job);
        if tl.queued.is_none() {
            tl.queued = Some(t);
        }
    }

    pub fn run(&mut self, job: Ustr, t: Epoch) {
        self.entry(job).run.push(t);
    }

    pub fn ended(&mut self, job: Ustr, t: Epoch) {
        self.entry(job).ended.push(t);
    }

    pub fn get(&self, job: &str) -> Option<&JobTimeline> {
        self.jobs.get(&Ustr::from(job))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Jobs in first-seen order.

    pub fn iter(&self) -> impl Iterator<Item = (Ustr, &JobTimeline)> {
        self.order.iter().map(|j| (*j, &self.jobs[j]))
    }

    fn sorted_events(&self, pick: impl Fn(&JobTimeline) -> Vec<Epoch>) -> Vec<Epoch> {
        let mut ts = self.jobs.values().flat_map(pick).collect::<Vec<Epoch>>();
        ts.sort_by(|a, b| a.total_cmp(b));
        ts
    }

    /// The metrics common to the job-level trackers.  `names` supplies the metrics to use for the
    /// count and rate of each of the three event kinds, since the trackers name them differently.

    pub fn summarize(&self, names: &TimelineMetrics, show_jobs: bool) -> Report {
        let mut r = Report::new();
        let queued = self.sorted_events(|j| j.queued.into_iter().collect());
        let run = self.sorted_events(|j| j.run.clone());
        let ended = self.sorted_events(|j| j.ended.clone());

        r.set(names.num_queued, Value::Count(queued.len() as u64));
        r.set(names.num_run, Value::Count(run.len() as u64));
        r.set(Metric::NumJobsEnded, Value::Count(ended.len() as u64));
        r.set(names.queued_rate, Value::Rate(rate(&queued)));
        r.set(names.run_rate, Value::Rate(rate(&run)));
        r.set(Metric::JobEndRate, Value::Rate(rate(&ended)));

        let waits = self.iter().filter_map(|(_, j)| j.wait_time()).collect::<Vec<f64>>();
        let runs = self.iter().filter_map(|(_, j)| j.run_time()).collect::<Vec<f64>>();
        r.set_opt(
            Metric::WaitTimes,
            SummaryStatistics::compute(&waits).map(|s| Value::Stats(s, StatScale::Seconds)),
        );
        r.set_opt(
            Metric::RunTimes,
            SummaryStatistics::compute(&runs).map(|s| Value::Stats(s, StatScale::Seconds)),
        );

        if show_jobs {
            let jobs = self
                .iter()
                .map(|(id, j)| {
                    let mut jr = Report::new();
                    jr.set(Metric::JobId, Value::Text(id.to_string()));
                    jr.set_opt(Metric::Queued, j.queued.map(Value::Time));
                    jr.set_opt(Metric::Started, j.run.first().map(|t| Value::Time(*t)));
                    jr.set_opt(Metric::Ended, j.ended.last().map(|t| Value::Time(*t)));
                    jr.set_opt(Metric::WaitTime, j.wait_time().map(Value::Duration));
                    jr.set_opt(Metric::RunTime, j.run_time().map(Value::Duration));
                    jr
                })
                .collect::<Vec<Report>>();
            r.set(Metric::Jobs, Value::Reports(jobs));
        }
        r
    }
}

/// The metric names a tracker uses for its "queued" and "run" events.

pub struct TimelineMetrics {
    pub num_queued: Metric,
    pub queued_rate: Metric,
    pub num_run: Metric,
    pub run_rate: Metric,
}

#[test]
fn test_timeline() {
    let mut tl = Timelines::new();
    let a = Ustr::from("1.svr");
    let b = Ustr::from("2.svr");
    tl.queued(b, 100.0);
    tl.queued(a, 110.0);
    tl.run(b, 130.0);
    tl.ended(b, 200.0);
    tl.run(b, 300.0);
    tl.ended(b, 350.0);
    tl.queued(b, 299.0);
    tl.run(a, 400.0);

    let jb = tl.get("2.svr").unwrap();
    assert_eq!(jb.queued, Some(100.0));
    assert_eq!(jb.wait_time(), Some(30.0));
    assert_eq!(jb.run_time(), Some(50.0));
    let ja = tl.get("1.svr").unwrap();
    assert_eq!(ja.wait_time(), Some(290.0));
    assert_eq!(ja.run_time(), None);

    let ids = tl.iter().map(|(id, _)| id.to_string()).collect::<Vec<String>>();
    assert_eq!(ids, vec!["2.svr", "1.svr"]);
}

#[test]
fn test_timeline_summary() {
    let mut tl = Timelines::new();
    tl.queued(Ustr::from("1.svr"), 0.0);
    tl.run(Ustr::from("1.svr"), 10.0);
    tl.ended(Ustr::from("1.svr"), 70.0);
    tl.queued(Ustr::from("2.svr"), 5.0);
    tl.run(Ustr::from("2.svr"), 35.0);
    let names = TimelineMetrics {
        num_queued: Metric::NumJobsQueued,
        queued_rate: Metric::JobSubmitRate,
        num_run: Metric::NumJobsRun,
        run_rate: Metric::JobRunRate,
    };
    let r = tl.summarize(&names, true);
    assert_eq!(r.count(Metric::NumJobsQueued), Some(2));
    assert_eq!(r.count(Metric::NumJobsRun), Some(2));
    assert_eq!(r.count(Metric::NumJobsEnded), Some(1));
    let Some(Value::Stats(w, _)) = r.get(Metric::WaitTimes) else {
        panic!("no wait times")
    };
    assert_eq!(w.min, 10.0);
    assert_eq!(w.max, 30.0);
    assert_eq!(w.p50, 20.0);
    let jobs = r.get(Metric::Jobs).unwrap().as_reports().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].number(Metric::RunTime), Some(60.0));
    assert!(jobs[1].get(Metric::RunTime).is_none());
}
