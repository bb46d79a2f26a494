/// Track job arrival, start and end on an execution host from its mom log.
use crate::driver::LogAnalyzer;
use crate::metrics::{Metric, Report, Value};
use crate::patterns::{mom_patterns, MomTag, PatternRegistry};
use crate::timeline::{TimelineMetrics, Timelines};
use anyhow::Result;
use rustutils::Epoch;
use ustr::Ustr;

pub struct MomTracker {
    patterns: PatternRegistry<MomTag>,
    timelines: Timelines,
    versions: Vec<String>,
}

impl MomTracker {
    pub fn new() -> Result<MomTracker> {
        Ok(MomTracker {
            patterns: mom_patterns()?,
            timelines: Timelines::new(),
            versions: vec![],
        })
    }

    pub fn timelines(&self) -> &Timelines {
        &self.timelines
    }
}

impl LogAnalyzer for MomTracker {
    fn apply(&mut self, t: Epoch, line: &str) -> bool {
        if let Some(v) = self.patterns.version(line) {
            if !self.versions.iter().any(|x| x == v) {
                self.versions.push(v.to_string());
            }
        }
        let Some(c) = self.patterns.classify(line) else {
            return false;
        };
        let Some(job) = c.jobid.map(Ustr::from) else {
            return false;
        };
        match c.tag {
            MomTag::Received => self.timelines.queued(job, t),
            MomTag::Started => self.timelines.run(job, t),
            MomTag::Ended => self.timelines.ended(job, t),
        }
        true
    }

    fn finish(&mut self) {}

    fn summarize(&self, show_jobs: bool) -> Report {
        let names = TimelineMetrics {
            num_queued: Metric::NumJobsReceived,
            queued_rate: Metric::JobSubmitRate,
            num_run: Metric::NumJobsStarted,
            run_rate: Metric::JobStartRate,
        };
        let mut r = self.timelines.summarize(&names, show_jobs);
        r.set(Metric::MomVersions, Value::List(self.versions.clone()));
        r
    }
}

#[test]
fn test_mom_tracker() {
    let lines = [
        "04/24/2020 10:01:00;0008;pbs_mom;Job;7.svr;Type 1 request received from root@svr, sock=1",
        "04/24/2020 10:01:01;0008;pbs_mom;Job;7.svr;Started, pid = 4242",
        "04/24/2020 10:31:00;0080;pbs_mom;Job;7.svr;task 00000001 terminated",
        "04/24/2020 10:31:01;0008;pbs_mom;Job;7.svr;Obit sent",
        "04/24/2020 10:31:02;0008;pbs_mom;Job;7.svr;no active tasks",
    ];
    let mut mt = MomTracker::new().unwrap();
    let recognized = lines
        .iter()
        .filter(|l| {
            let t = rustutils::decode_timestamp(&l[..19]).unwrap();
            mt.apply(t, l)
        })
        .count();
    assert_eq!(recognized, 4);
    let j = mt.timelines().get("7.svr").unwrap();
    assert_eq!(j.wait_time(), Some(1.0));
    // The last end event counts
    assert_eq!(j.run_time(), Some(1800.0));
    let r = mt.summarize(true);
    assert_eq!(r.count(Metric::NumJobsReceived), Some(1));
    assert_eq!(r.count(Metric::NumJobsStarted), Some(1));
    assert_eq!(r.count(Metric::NumJobsEnded), Some(2));
}
