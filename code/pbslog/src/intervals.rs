/// Ad hoc searches over any log: histograms of matching lines, and conditional sequences.
///
/// An interval histogram counts the lines matching a pattern in buckets of a fixed number of
/// seconds, starting with the first matching line.  Empty buckets between matches are reported
/// unless there would be more than MAX_FILLED_BUCKETS buckets in all, in which case only the
/// nonempty ones are.
///
/// A conditional sequence is N patterns that must match N consecutive records, in order.  The last
/// N records are kept in a ring buffer and every record is a new chance for the sequence to
/// complete; each completion is reported with the time of its last record.
use crate::driver::LogAnalyzer;
use crate::metrics::{Metric, Report, Value};
use anyhow::{bail, Context, Result};
use regex::Regex;
use rustutils::{Epoch, RingBuffer};
use std::collections::BTreeMap;
use tracing::warn;

const MAX_FILLED_BUCKETS: u64 = 1_000_000;

pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("Invalid pattern '{pattern}'"))
}

pub struct IntervalCounter {
    pattern: Regex,
    frequency: f64,
    first: Option<Epoch>,
    buckets: BTreeMap<u64, u64>,
    num_matches: u64,
}

impl IntervalCounter {
    pub fn new(pattern: &str, frequency: f64) -> Result<IntervalCounter> {
        if frequency.is_nan() || frequency <= 0.0 {
            bail!("The interval must be a positive number of seconds");
        }
        Ok(IntervalCounter {
            pattern: compile_pattern(pattern)?,
            frequency,
            first: None,
            buckets: BTreeMap::new(),
            num_matches: 0,
        })
    }

    /// (bucket start, count) in time order.

    pub fn buckets(&self) -> Vec<(Epoch, u64)> {
        let Some(first) = self.first else {
            return vec![];
        };
        let start = |ix: u64| first + ix as f64 * self.frequency;
        let last = self.buckets.keys().next_back().copied().unwrap_or(0);
        if last >= MAX_FILLED_BUCKETS {
            warn!("Too many intervals, reporting only the nonempty ones");
            return self.buckets.iter().map(|(ix, n)| (start(*ix), *n)).collect();
        }
        (0..=last)
            .map(|ix| (start(ix), self.buckets.get(&ix).copied().unwrap_or(0)))
            .collect()
    }
}

impl LogAnalyzer for IntervalCounter {
    fn apply(&mut self, t: Epoch, line: &str) -> bool {
        if !self.pattern.is_match(line) {
            return false;
        }
        let first = *self.first.get_or_insert(t);
        // Records a little out of order land in the first bucket.
        let ix = ((t - first) / self.frequency).floor().max(0.0) as u64;
        *self.buckets.entry(ix).or_insert(0) += 1;
        self.num_matches += 1;
        true
    }

    fn finish(&mut self) {}

    fn summarize(&self, _show_jobs: bool) -> Report {
        let mut r = Report::new();
        r.set(Metric::NumMatches, Value::Count(self.num_matches));
        let intervals = self
            .buckets()
            .into_iter()
            .map(|(start, n)| {
                let mut b = Report::new();
                b.set(Metric::IntervalStart, Value::Time(start));
                b.set(Metric::IntervalCount, Value::Count(n));
                b
            })
            .collect::<Vec<Report>>();
        r.set(Metric::Intervals, Value::Reports(intervals));
        r
    }
}

pub struct SequenceMatcher {
    patterns: Vec<Regex>,
    window: RingBuffer<String>,
    matches: Vec<Epoch>,
}

impl SequenceMatcher {
    pub fn new(patterns: &[String]) -> Result<SequenceMatcher> {
        if patterns.is_empty() {
            bail!("A sequence needs at least one pattern");
        }
        let patterns = patterns
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<Regex>>>()?;
        let window = RingBuffer::new(patterns.len());
        Ok(SequenceMatcher {
            patterns,
            window,
            matches: vec![],
        })
    }

    pub fn matches(&self) -> &[Epoch] {
        &self.matches
    }
}

impl LogAnalyzer for SequenceMatcher {
    fn apply(&mut self, t: Epoch, line: &str) -> bool {
        self.window.push(line.to_string());
        if !self.window.is_full() {
            return false;
        }
        let all = self
            .window
            .iter()
            .zip(self.patterns.iter())
            .all(|(l, p)| p.is_match(l));
        if all {
            self.matches.push(t);
        }
        all
    }

    fn finish(&mut self) {}

    fn summarize(&self, _show_jobs: bool) -> Report {
        let mut r = Report::new();
        r.set(
            Metric::NumSequenceMatches,
            Value::Count(self.matches.len() as u64),
        );
        r.set(
            Metric::SequenceMatchTimes,
            Value::List(
                self.matches
                    .iter()
                    .map(|t| rustutils::format_epoch(*t))
                    .collect(),
            ),
        );
        r
    }
}

#[test]
fn test_intervals() {
    let mut ic = IntervalCounter::new("Job run", 60.0).unwrap();
    ic.apply(100.0, "x;1.svr;Considering job to run");
    ic.apply(110.0, "x;1.svr;Job run");
    ic.apply(150.0, "x;2.svr;Job run");
    ic.apply(300.0, "x;3.svr;Job run");
    assert_eq!(
        ic.buckets(),
        vec![(110.0, 2), (170.0, 0), (230.0, 0), (290.0, 1)]
    );
    let r = ic.summarize(false);
    assert_eq!(r.count(Metric::NumMatches), Some(3));
    assert_eq!(r.get(Metric::Intervals).unwrap().as_reports().unwrap().len(), 4);
}

#[test]
fn test_tiny_interval() {
    let mut ic = IntervalCounter::new("Job run", 1e-9).unwrap();
    ic.apply(0.0, "x;1.svr;Job run");
    ic.apply(3600.0, "x;2.svr;Job run");
    let b = ic.buckets();
    assert_eq!(b.len(), 2);
    assert_eq!(b[0], (0.0, 1));
    assert_eq!(b[1].1, 1);
    assert!((b[1].0 - 3600.0).abs() < 1e-3);
}

#[test]
fn test_bad_patterns() {
    assert!(IntervalCounter::new("(unclosed", 60.0).is_err());
    assert!(IntervalCounter::new("ok", 0.0).is_err());
    assert!(SequenceMatcher::new(&[]).is_err());
    assert!(SequenceMatcher::new(&["a".to_string(), "[z-a]".to_string()]).is_err());
}

#[test]
fn test_sequence() {
    let mut sm = SequenceMatcher::new(&["Considering".to_string(), "Failed to run".to_string()])
        .unwrap();
    let lines = [
        (1.0, "1.svr;Considering job to run"),
        (2.0, "1.svr;Job run"),
        (3.0, "2.svr;Considering job to run"),
        (4.0, "2.svr;Failed to run"),
        (5.0, "3.svr;Failed to run"),
        (6.0, "4.svr;Considering job to run"),
        (7.0, "4.svr;Failed to run"),
    ];
    for (t, l) in lines {
        sm.apply(t, l);
    }
    assert_eq!(sm.matches(), &[4.0, 7.0]);
    assert_eq!(sm.summarize(false).count(Metric::NumSequenceMatches), Some(2));
}
