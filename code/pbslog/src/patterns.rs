/// Line classifiers for the daemon logs (scheduler, server, mom).
///
/// A daemon log record is `MM/DD/YYYY HH:MM:SS[.ffffff];<free text with ; separators>`.  Each log
/// kind has an ordered list of (tag, regex) pairs; the regexes are anchored on the timestamp prefix
/// and the first one that matches decides the tag of the line.  A job id, when the record carries
/// one, is captured as `jobid`; some tags capture an additional `extra` field (the estimated start
/// time of a top job, the name of a node).
///
/// Independently of the tag, a line may announce the version of the daemon that wrote it.  That is
/// checked with a separate regex so that a line can be both, say, a cycle start and a version
/// marker.
use anyhow::{Context, Result};
use regex::Regex;

const TIMESTAMP: &str = r"^\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}(?:\.\d{6})?;";

// A job id, possibly with an array index: 123.svr, 55[2].svr, 55[].svr.
const JOBID: &str = r"(?P<jobid>\d+(?:\[\d*\])?(?:\.[\w\-]+)*)";

// What the scheduler prints when it fails to run a job can be a mangled id, eg with a dangling
// bracket, so take anything plausible.
const LOOSE_JOBID: &str = r"(?P<jobid>[\w\-\.\[\]]+)";

// Everything between the timestamp and the field of interest.
const ANY_FIELDS: &str = r"(?:.*;)?";

const VERSION: &str = r"pbs_version\s*[=:]\s*(?P<version>[\w\.\-]+)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedTag {
    CycleStart,
    CycleEnd,
    Alarm,
    Considering,
    JobRun,
    RunFailure,
    PreemptFailure,
    Preempted,
    TopJob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTag {
    Queued,
    Run,
    Ended,
    NodeUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomTag {
    Received,
    Started,
    Ended,
}

/// The result of classifying a line.  The strings borrow from the line.

#[derive(Debug, PartialEq)]
pub struct Classified<'a, T> {
    pub tag: T,
    pub jobid: Option<&'a str>,
    pub extra: Option<&'a str>,
}

pub struct PatternRegistry<T> {
    matchers: Vec<(T, Regex)>,
    version: Regex,
}

impl<T: Copy> PatternRegistry<T> {
    fn new(suffixes: &[(T, &str)]) -> Result<PatternRegistry<T>> {
        let mut matchers = vec![];
        for (tag, suffix) in suffixes {
            let text = format!("{TIMESTAMP}{suffix}");
            let re = Regex::new(&text).with_context(|| format!("Bad built-in pattern {text}"))?;
            matchers.push((*tag, re));
        }
        let vtext = format!("{TIMESTAMP}.*{VERSION}");
        let version = Regex::new(&vtext).with_context(|| format!("Bad built-in pattern {vtext}"))?;
        Ok(PatternRegistry { matchers, version })
    }

    /// Try the matchers in order, return the first hit.

    pub fn classify<'a>(&self, line: &'a str) -> Option<Classified<'a, T>> {
        for (tag, re) in &self.matchers {
            if let Some(caps) = re.captures(line) {
                return Some(Classified {
                    tag: *tag,
                    jobid: caps.name("jobid").map(|m| m.as_str()),
                    extra: caps.name("extra").map(|m| m.as_str().trim()),
                });
            }
        }
        None
    }

    /// The daemon version announced on the line, if any.

    pub fn version<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.version
            .captures(line)
            .and_then(|caps| caps.name("version"))
            .map(|m| m.as_str())
    }
}

pub fn scheduler_patterns() -> Result<PatternRegistry<SchedTag>> {
    PatternRegistry::new(&[
        (SchedTag::CycleStart, r".*Starting Scheduling"),
        (SchedTag::CycleEnd, r".*Leaving [Ss]cheduling [Cc]ycle"),
        (SchedTag::Alarm, r"(?i).*\balarm\b"),
        (
            SchedTag::Considering,
            &format!("{ANY_FIELDS}{JOBID};Considering job to run"),
        ),
        (SchedTag::JobRun, &format!("{ANY_FIELDS}{JOBID};Job run")),
        (
            SchedTag::RunFailure,
            &format!("{ANY_FIELDS}{LOOSE_JOBID};Failed to run"),
        ),
        (SchedTag::PreemptFailure, r".*Failed to preempt"),
        (SchedTag::Preempted, &format!("{ANY_FIELDS}{JOBID};Job preempted")),
        (
            SchedTag::TopJob,
            &format!("{ANY_FIELDS}{JOBID};Job is a top job(?: and will run at (?P<extra>.+))?"),
        ),
    ])
}

pub fn server_patterns() -> Result<PatternRegistry<ServerTag>> {
    PatternRegistry::new(&[
        (
            ServerTag::Queued,
            &format!("{ANY_FIELDS}{JOBID};Job Queued at request of"),
        ),
        (
            ServerTag::Run,
            &format!("{ANY_FIELDS}{JOBID};Job Run at request of"),
        ),
        (ServerTag::Ended, &format!("{ANY_FIELDS}{JOBID};Exit_status=")),
        (ServerTag::NodeUp, r"(?:.*;)?Node;(?P<extra>[^;]+);node up"),
    ])
}

pub fn mom_patterns() -> Result<PatternRegistry<MomTag>> {
    PatternRegistry::new(&[
        (
            MomTag::Received,
            &format!("{ANY_FIELDS}{JOBID};Type 1 request received"),
        ),
        (MomTag::Started, &format!("{ANY_FIELDS}{JOBID};Started, pid =")),
        (
            MomTag::Ended,
            &format!(r"{ANY_FIELDS}{JOBID};(?:Obit sent|task [0-9a-fA-F]+ terminated)"),
        ),
    ])
}

/// If `id` names a subjob, base[n].rest, return the id of its array job, base[].rest.

pub fn array_parent(id: &str) -> Option<String> {
    let lb = id.find('[')?;
    let rb = lb + id[lb..].find(']')?;
    let index = &id[lb + 1..rb];
    if index.is_empty() || !index.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}[]{}", &id[..lb], &id[rb + 1..]))
}

#[test]
fn test_scheduler_patterns() {
    let reg = scheduler_patterns().unwrap();
    let ts = "04/24/2020 16:00:00.123456";

    let line = format!("{ts};0080;pbs_sched;Req;;Starting Scheduling Cycle");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, SchedTag::CycleStart);
    assert!(c.jobid.is_none());

    let line = format!("{ts};0080;pbs_sched;Req;;Leaving Scheduling Cycle");
    assert_eq!(reg.classify(&line).unwrap().tag, SchedTag::CycleEnd);

    let line = format!("{ts};0040;pbs_sched;Job;123.svr;Considering job to run");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, SchedTag::Considering);
    assert_eq!(c.jobid, Some("123.svr"));

    // The short form, with the job id right after the timestamp
    let c = reg.classify("04/24/2020 16:00:00;123.host;Considering job to run").unwrap();
    assert_eq!(c.jobid, Some("123.host"));

    let line = format!("{ts};0040;pbs_sched;Job;55[2].svr;Job run");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, SchedTag::JobRun);
    assert_eq!(c.jobid, Some("55[2].svr"));

    let line = format!("{ts};0040;pbs_sched;Job;55[].svr;Job run");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.jobid, Some("55[].svr"));

    let line = format!("{ts};0040;pbs_sched;Job;12].svr;Failed to run: resources");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, SchedTag::RunFailure);
    assert_eq!(c.jobid, Some("12].svr"));

    let line = format!("{ts};0040;pbs_sched;Job;7.svr;Failed to preempt job");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, SchedTag::PreemptFailure);

    let line = format!("{ts};0040;pbs_sched;Job;8.svr;Job preempted by suspension");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, SchedTag::Preempted);
    assert_eq!(c.jobid, Some("8.svr"));

    let line = format!(
        "{ts};0040;pbs_sched;Job;9.svr;Job is a top job and will run at Fri Apr 24 18:00:00 2020"
    );
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, SchedTag::TopJob);
    assert_eq!(c.jobid, Some("9.svr"));
    assert_eq!(c.extra, Some("Fri Apr 24 18:00:00 2020"));

    let line = format!("{ts};0040;pbs_sched;Job;9.svr;Job is a top job");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, SchedTag::TopJob);
    assert!(c.extra.is_none());

    let line = format!("{ts};0001;pbs_sched;Svr;pbs_sched;Alarm received");
    assert_eq!(reg.classify(&line).unwrap().tag, SchedTag::Alarm);

    let line = format!("{ts};0040;pbs_sched;Job;9.svr;Something else");
    assert!(reg.classify(&line).is_none());
    assert!(reg.classify("Starting Scheduling Cycle").is_none());
    assert!(reg.classify("bogus;Starting Scheduling Cycle").is_none());
}

#[test]
fn test_version() {
    let reg = scheduler_patterns().unwrap();
    let line = "04/24/2020 16:00:00;0002;pbs_sched;Svr;Log;pbs_version=19.1.3";
    assert_eq!(reg.version(line), Some("19.1.3"));
    assert!(reg.classify(line).is_none());
    assert!(reg.version("04/24/2020 16:00:00;0002;pbs_sched;Svr;Log;hello").is_none());
}

#[test]
fn test_server_and_mom_patterns() {
    let reg = server_patterns().unwrap();
    let ts = "04/24/2020 16:00:00.000001";
    let line = format!("{ts};0100;Server@svr;Job;1.svr;Job Queued at request of u@h, owner = u@h, job name = STDIN, queue = workq");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, ServerTag::Queued);
    assert_eq!(c.jobid, Some("1.svr"));
    let line = format!("{ts};0008;Server@svr;Job;1.svr;Job Run at request of Scheduler@svr on exec_vnode (n1:ncpus=1)");
    assert_eq!(reg.classify(&line).unwrap().tag, ServerTag::Run);
    let line = format!("{ts};0010;Server@svr;Job;1.svr;Exit_status=0 resources_used.cpupercent=0");
    assert_eq!(reg.classify(&line).unwrap().tag, ServerTag::Ended);
    let line = format!("{ts};0004;Server@svr;Node;n1;node up");
    let c = reg.classify(&line).unwrap();
    assert_eq!(c.tag, ServerTag::NodeUp);
    assert_eq!(c.extra, Some("n1"));

    let reg = mom_patterns().unwrap();
    let line = format!("{ts};0008;pbs_mom;Job;2.svr;Type 1 request received from root@svr, sock=1");
    assert_eq!(reg.classify(&line).unwrap().tag, MomTag::Received);
    let line = format!("{ts};0008;pbs_mom;Job;2.svr;Started, pid = 4711");
    assert_eq!(reg.classify(&line).unwrap().tag, MomTag::Started);
    let line = format!("{ts};0008;pbs_mom;Job;2.svr;task 00000001 terminated");
    assert_eq!(reg.classify(&line).unwrap().tag, MomTag::Ended);
    let line = format!("{ts};0008;pbs_mom;Job;2.svr;Obit sent");
    assert_eq!(reg.classify(&line).unwrap().tag, MomTag::Ended);
}

#[test]
fn test_array_parent() {
    assert_eq!(array_parent("55[2].svr").as_deref(), Some("55[].svr"));
    assert_eq!(array_parent("55[2]").as_deref(), Some("55[]"));
    assert!(array_parent("55[].svr").is_none());
    assert!(array_parent("55.svr").is_none());
    assert!(array_parent("55[x].svr").is_none());
}
