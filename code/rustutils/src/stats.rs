/// Summary statistics over finalized numeric samples: percentiles, event rates, and the rendering
/// of durations as elapsed-time text.
use std::fmt;

/// Linear-interpolation percentile.  The sample must already be sorted ascending.  Returns None
/// for the empty sample and for `p` outside [0.0, 1.0].

pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let k = (sorted.len() - 1) as f64 * p;
    let f = k.floor();
    let c = k.ceil();
    if f == c {
        return Some(sorted[k as usize]);
    }
    let d0 = sorted[f as usize] * (c - k);
    let d1 = sorted[c as usize] * (k - f);
    Some(d0 + d1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl RateUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            RateUnit::Second => "s",
            RateUnit::Minute => "min",
            RateUnit::Hour => "hr",
            RateUnit::Day => "day",
        }
    }
}

/// The arrival rate of a set of events.  `Burst` is the degenerate case where all N events
/// happened at the same instant.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rate {
    Zero,
    Burst(usize),
    Frequency(f64, RateUnit),
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rate::Zero => write!(f, "0"),
            Rate::Burst(n) => write!(f, "{n}/s"),
            Rate::Frequency(v, unit) => write!(f, "{:.2}/{}", v, unit.suffix()),
        }
    }
}

const RATE_STEPS: [(f64, RateUnit); 3] = [
    (60.0, RateUnit::Minute),
    (60.0, RateUnit::Hour),
    (24.0, RateUnit::Day),
];

/// Compute the rate of a non-decreasing sequence of event timestamps.  The unit is scaled up from
/// per-second until the value is at least 1 or we run out of units.

pub fn rate(timestamps: &[f64]) -> Rate {
    let n = timestamps.len();
    if n == 0 {
        return Rate::Zero;
    }
    let span = timestamps[n - 1] - timestamps[0];
    if span <= 0.0 {
        return Rate::Burst(n);
    }
    let mut freq = n as f64 / span;
    let mut unit = RateUnit::Second;
    for (factor, next_unit) in RATE_STEPS {
        if freq >= 1.0 {
            break;
        }
        freq *= factor;
        unit = next_unit;
    }
    Rate::Frequency(freq, unit)
}

/// Render seconds as "H:MM:SS", prefixed by "N day(s), " when 24h or more.  A fractional part is
/// shown with microsecond precision when present.  For display only, never parsed back.

pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 {
        return format!("-{}", format_duration(-seconds));
    }
    let micros_total = (seconds * 1_000_000.0).round() as u64;
    let micros = micros_total % 1_000_000;
    let whole = micros_total / 1_000_000;
    let days = whole / 86400;
    let h = (whole % 86400) / 3600;
    let m = (whole % 3600) / 60;
    let s = whole % 60;
    let mut out = String::new();
    if days == 1 {
        out += "1 day, ";
    } else if days > 1 {
        out += &format!("{days} days, ");
    }
    out += &format!("{h}:{m:02}:{s:02}");
    if micros != 0 {
        out += &format!(".{micros:06}");
    }
    out
}

/// Summary of a finalized sample.  Computed once, never updated.

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStatistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

impl SummaryStatistics {
    /// Returns None for an empty sample.  The input need not be sorted.

    pub fn compute(samples: &[f64]) -> Option<SummaryStatistics> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let sum: f64 = sorted.iter().sum();
        Some(SummaryStatistics {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sum / sorted.len() as f64,
            p25: percentile(&sorted, 0.25)?,
            p50: percentile(&sorted, 0.5)?,
            p75: percentile(&sorted, 0.75)?,
        })
    }
}

#[test]
fn test_percentile() {
    assert!(percentile(&[], 0.5).is_none());

    let odd = [1.0, 2.0, 4.0, 8.0, 16.0];
    assert_eq!(percentile(&odd, 0.0), Some(1.0));
    assert_eq!(percentile(&odd, 1.0), Some(16.0));
    assert_eq!(percentile(&odd, 0.5), Some(4.0));
    assert_eq!(percentile(&odd, 0.25), Some(2.0));

    let even = [1.0, 2.0, 4.0, 8.0];
    assert_eq!(percentile(&even, 0.0), Some(1.0));
    assert_eq!(percentile(&even, 1.0), Some(8.0));
    assert_eq!(percentile(&even, 0.5), Some(3.0));
    // k = 0.75, between 1.0 and 2.0
    assert_eq!(percentile(&even, 0.25), Some(1.75));

    assert_eq!(percentile(&[7.0], 0.3), Some(7.0));

    assert!(percentile(&odd, 1.5).is_none());
    assert!(percentile(&odd, -0.1).is_none());
    assert!(percentile(&odd, f64::NAN).is_none());
}

#[test]
fn test_rate() {
    assert_eq!(rate(&[]), Rate::Zero);
    assert_eq!(rate(&[]).to_string(), "0");
    assert_eq!(rate(&[100.0]), Rate::Burst(1));
    assert_eq!(rate(&[100.0]).to_string(), "1/s");
    assert_eq!(rate(&[5.0, 5.0, 5.0]).to_string(), "3/s");

    // 4 events over 2 seconds
    assert_eq!(rate(&[0.0, 1.0, 1.5, 2.0]).to_string(), "2.00/s");
    // 3 events over 60 seconds = 0.05/s = 3/min
    assert_eq!(rate(&[0.0, 30.0, 60.0]).to_string(), "3.00/min");
    // 2 events over 4096 seconds = 1.7578125/hr
    assert_eq!(rate(&[0.0, 4096.0]).to_string(), "1.76/hr");
    // 2 events over 4 days stays below 1 even per day
    assert_eq!(rate(&[0.0, 4.0 * 86400.0]).to_string(), "0.50/day");
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(0.0), "0:00:00");
    assert_eq!(format_duration(59.0), "0:00:59");
    assert_eq!(format_duration(3723.0), "1:02:03");
    assert_eq!(format_duration(1.5), "0:00:01.500000");
    assert_eq!(format_duration(86400.0 + 61.0), "1 day, 0:01:01");
    assert_eq!(format_duration(3.0 * 86400.0), "3 days, 0:00:00");
    assert_eq!(format_duration(-5.0), "-0:00:05");
}

#[test]
fn test_summary_statistics() {
    assert!(SummaryStatistics::compute(&[]).is_none());
    let s = SummaryStatistics::compute(&[4.0, 1.0, 3.0, 2.0]).unwrap();
    assert_eq!(s.count, 4);
    assert_eq!(s.min, 1.0);
    assert_eq!(s.max, 4.0);
    assert_eq!(s.mean, 2.5);
    assert_eq!(s.p50, 2.5);
    assert_eq!(s.p25, 1.75);
    assert_eq!(s.p75, 3.25);
}
