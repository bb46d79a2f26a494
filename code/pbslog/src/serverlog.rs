/// Track job queue/run/end events and node state changes in the server log.
use crate::driver::LogAnalyzer;
use crate::metrics::{Metric, Report, Value};
use crate::patterns::{server_patterns, PatternRegistry, ServerTag};
use crate::timeline::{TimelineMetrics, Timelines};
use anyhow::Result;
use rustutils::{rate, Epoch};
use ustr::Ustr;

pub struct ServerTracker {
    patterns: PatternRegistry<ServerTag>,
    timelines: Timelines,
    nodes_up: Vec<(Epoch, String)>,
    versions: Vec<String>,
}

impl ServerTracker {
    pub fn new() -> Result<ServerTracker> {
        Ok(ServerTracker {
            patterns: server_patterns()?,
            timelines: Timelines::new(),
            nodes_up: vec![],
            versions: vec![],
        })
    }

    pub fn timelines(&self) -> &Timelines {
        &self.timelines
    }

    pub fn nodes_up(&self) -> &[(Epoch, String)] {
        &self.nodes_up
    }
}

impl LogAnalyzer for ServerTracker {
    fn apply(&mut self, t: Epoch, line: &str) -> bool {
        if let Some(v) = self.patterns.version(line) {
            if !self.versions.iter().any(|x| x == v) {
                self.versions.push(v.to_string());
            }
        }
        let Some(c) = self.patterns.classify(line) else {
            return false;
        };
        match (c.tag, c.jobid.map(Ustr::from)) {
            (ServerTag::Queued, Some(j)) => self.timelines.queued(j, t),
            (ServerTag::Run, Some(j)) => self.timelines.run(j, t),
            (ServerTag::Ended, Some(j)) => self.timelines.ended(j, t),
            (ServerTag::NodeUp, _) => {
                if let Some(node) = c.extra {
                    self.nodes_up.push((t, node.to_string()));
                }
            }
            _ => {}
        }
        true
    }

    fn finish(&mut self) {}

    fn summarize(&self, show_jobs: bool) -> Report {
        let names = TimelineMetrics {
            num_queued: Metric::NumJobsQueued,
            queued_rate: Metric::JobSubmitRate,
            num_run: Metric::NumJobsRun,
            run_rate: Metric::JobRunRate,
        };
        let mut r = self.timelines.summarize(&names, show_jobs);
        let ups = self.nodes_up.iter().map(|(t, _)| *t).collect::<Vec<Epoch>>();
        r.set(Metric::NumNodesUp, Value::Count(ups.len() as u64));
        r.set(Metric::NodeUpRate, Value::Rate(rate(&ups)));
        r.set(Metric::ServerVersions, Value::List(self.versions.clone()));
        r
    }
}

#[test]
fn test_server_tracker() {
    let lines = [
        "04/24/2020 10:00:00;0100;Server@svr;Job;7.svr;enqueuing into workq, state 1 hop 1",
        "04/24/2020 10:00:00;0100;Server@svr;Job;7.svr;Job Queued at request of alice@login, owner = alice@login, job name = x",
        "04/24/2020 10:00:00;0002;Server@svr;Svr;Log;pbs_version=19.1.3",
        "04/24/2020 10:01:00;0008;Server@svr;Job;7.svr;Job Run at request of Scheduler@svr on exec_vnode (n1:ncpus=4)",
        "04/24/2020 10:02:00;0004;Server@svr;Node;n1;node up",
        "04/24/2020 10:31:00;0010;Server@svr;Job;7.svr;Exit_status=0 resources_used.cpupercent=99",
    ];
    let mut st = ServerTracker::new().unwrap();
    let mut recognized = 0;
    for l in lines {
        let t = rustutils::decode_timestamp(&l[..19]).unwrap();
        if st.apply(t, l) {
            recognized += 1;
        }
    }
    st.finish();
    assert_eq!(recognized, 4);
    let j = st.timelines().get("7.svr").unwrap();
    assert_eq!(j.wait_time(), Some(60.0));
    assert_eq!(j.run_time(), Some(1800.0));
    assert_eq!(st.nodes_up().len(), 1);
    assert_eq!(st.nodes_up()[0].1, "n1");

    let r = st.summarize(false);
    assert_eq!(r.count(Metric::NumJobsQueued), Some(1));
    assert_eq!(r.count(Metric::NumNodesUp), Some(1));
    assert_eq!(
        r.get(Metric::ServerVersions),
        Some(&Value::List(vec!["19.1.3".to_string()]))
    );
    assert!(r.get(Metric::Jobs).is_none());
}
