/// Dump a complete report, as indented `label: value` text or as a json object.
///
/// Nested reports (cycles, jobs, intervals) are walked; in the text form each element starts with
/// a `-` line and its entries are indented below it.  In json, counts, numbers, percentages and
/// durations are numbers (durations in seconds), times and rates are the same strings as in the
/// text form, and summary statistics are objects.
use anyhow::Result;
use pbslog::{Metric, Report, Value};
use std::io;

pub fn dump_text(output: &mut dyn io::Write, report: &Report) -> Result<()> {
    dump_text_indented(output, report, 0)
}

fn dump_text_indented(output: &mut dyn io::Write, report: &Report, indent: usize) -> Result<()> {
    let pad = " ".repeat(indent);
    for (m, v) in report.iter() {
        match v {
            Value::Reports(rs) => {
                writeln!(output, "{pad}{}:", m.label())?;
                for r in rs {
                    writeln!(output, "{pad}  -")?;
                    dump_text_indented(output, r, indent + 4)?;
                }
            }
            _ => writeln!(output, "{pad}{}: {v}", m.label())?,
        }
    }
    Ok(())
}

pub fn dump_json(output: &mut dyn io::Write, report: &Report) -> Result<()> {
    output.write_all(json::stringify(report_to_json(report)).as_bytes())?;
    output.write_all(b"\n")?;
    Ok(())
}

fn report_to_json(report: &Report) -> json::JsonValue {
    let mut obj = json::JsonValue::new_object();
    for (m, v) in report.iter() {
        obj[m.label()] = value_to_json(v);
    }
    obj
}

fn value_to_json(v: &Value) -> json::JsonValue {
    match v {
        Value::Count(n) => (*n).into(),
        Value::Number(x) | Value::Percent(x) | Value::Duration(x) => (*x).into(),
        Value::Time(_) | Value::Rate(_) | Value::Text(_) => v.to_string().into(),
        Value::List(xs) => json::JsonValue::Array(xs.iter().map(|x| x.as_str().into()).collect()),
        Value::Stats(s, _) => {
            let mut obj = json::JsonValue::new_object();
            obj["count"] = s.count.into();
            obj["min"] = s.min.into();
            obj["max"] = s.max.into();
            obj["mean"] = s.mean.into();
            obj["p25"] = s.p25.into();
            obj["p50"] = s.p50.into();
            obj["p75"] = s.p75.into();
            obj
        }
        Value::Reports(rs) => json::JsonValue::Array(rs.iter().map(report_to_json).collect()),
    }
}

/// The first list of nested reports in `report`, which is the one a table is made from: cycles
/// for the scheduler, jobs for the other kinds, buckets for interval histograms.

pub fn table_rows(report: &Report) -> Option<(Metric, &[Report])> {
    report.iter().find_map(|(m, v)| v.as_reports().map(|rs| (*m, rs)))
}

/// The metrics present in any of the rows, in order of first appearance.

pub fn row_metrics(rows: &[Report]) -> Vec<Metric> {
    let mut known = vec![];
    for r in rows {
        for (m, _) in r.iter() {
            if !known.contains(m) {
                known.push(*m);
            }
        }
    }
    known
}

#[cfg(test)]
use rustutils::{Rate, SummaryStatistics};

#[cfg(test)]
fn sample_report() -> Report {
    let mut job = Report::new();
    job.set(Metric::JobId, Value::Text("1.svr".to_string()));
    job.set(Metric::WaitTime, Value::Duration(30.0));
    let mut other = Report::new();
    other.set(Metric::JobId, Value::Text("2.svr".to_string()));
    other.set(Metric::RunTime, Value::Duration(3600.0));

    let mut r = Report::new();
    r.set(Metric::NumJobsQueued, Value::Count(2));
    r.set(Metric::JobSubmitRate, Value::Rate(Rate::Zero));
    r.set(Metric::ServerVersions, Value::List(vec!["19.1.3".to_string()]));
    r.set(Metric::Jobs, Value::Reports(vec![job, other]));
    r
}

#[test]
fn test_dump_text() {
    let mut out = vec![];
    dump_text(&mut out, &sample_report()).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "num_jobs_queued: 2
job_submit_rate: 0
server_versions: 19.1.3
jobs:
  -
    job_id: 1.svr
    wait_time: 0:00:30
  -
    job_id: 2.svr
    run_time: 1:00:00
"
    );
}

#[test]
fn test_dump_json() {
    let mut out = vec![];
    let mut r = sample_report();
    let stats = SummaryStatistics::compute(&[1.0, 3.0]).unwrap();
    r.set(Metric::WaitTimes, Value::Stats(stats, pbslog::StatScale::Seconds));
    dump_json(&mut out, &r).unwrap();
    let parsed = json::parse(&String::from_utf8(out).unwrap()).unwrap();
    assert_eq!(parsed["num_jobs_queued"], 2);
    assert_eq!(parsed["job_submit_rate"], "0");
    assert_eq!(parsed["server_versions"][0], "19.1.3");
    assert_eq!(parsed["jobs"].len(), 2);
    assert_eq!(parsed["jobs"][1]["run_time"], 3600.0);
    assert_eq!(parsed["wait_times"]["count"], 2);
    assert_eq!(parsed["wait_times"]["max"], 3.0);
}

#[test]
fn test_table_rows() {
    let r = sample_report();
    let (m, rows) = table_rows(&r).unwrap();
    assert_eq!(m, Metric::Jobs);
    assert_eq!(
        row_metrics(rows),
        vec![Metric::JobId, Metric::WaitTime, Metric::RunTime]
    );
    assert!(table_rows(&Report::new()).is_none());
}
