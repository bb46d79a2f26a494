/// Generic formatting of a list of report rows (cycles, jobs, intervals) to be presented columnar,
/// as csv, or as json, and (except for json) with or without a header and with or without named
/// fields.
///
/// The columns are selected by metric label.  A row that has no value for a selected metric shows
/// `*skip*` in that column; with `nodefaults` such fields are left out of csv and json output.
use anyhow::{bail, Result};
use pbslog::{Metric, Report};
use std::collections::HashSet;
use std::io;

const SKIP: &str = "*skip*";

pub fn print_help(known: &[Metric]) {
    println!("Syntax:\n  --fmt=(field|alias|control),...");
    println!("\nFields:");
    let mut labels = known.iter().map(|m| m.label()).collect::<Vec<&str>>();
    labels.sort();
    for l in labels {
        println!("  {l}");
    }
    println!("\nAliases:\n  all --> every field present in the data");
    println!("\nControl:\n  csv\n  csvnamed\n  fixed\n  json\n  header\n  nodefaults\n  noheader\n  tag:<tagvalue>");
}

/// Return the metrics named in `fmt`, in order, and the set of other strings found in it.  The
/// alias `all`, or a `fmt` with only control words, selects every metric in `known`.

pub fn parse_fields<'a>(fmt: &'a str, known: &[Metric]) -> Result<(Vec<Metric>, HashSet<&'a str>)> {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in fmt.split(',') {
        if x == "all" {
            fields.extend(known.iter().copied());
        } else if let Some(m) = Metric::from_label(x).filter(|m| known.contains(m)) {
            fields.push(m);
        } else if Metric::from_label(x).is_some() {
            bail!("Field {x} is not available here");
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        fields.extend(known.iter().copied());
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

pub struct FormatOptions {
    pub tag: Option<String>,
    pub json: bool,       // json explicitly requested
    pub csv: bool,        // csv or csvnamed explicitly requested
    pub named: bool,      // csvnamed explicitly requested
    pub header: bool,     // fixed+header is the default
    pub nodefaults: bool, // leave out *skip* fields in csv and json
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csvnamed = others.contains("csvnamed");
    let csv = others.contains("csv") || csvnamed;
    let json = others.contains("json") && !csv;
    let nodefaults = others.contains("nodefaults");
    // json gets no header, even if one is requested
    let header = (!csv && !json && !others.contains("noheader")) || (csv && others.contains("header"));
    let tag = others
        .iter()
        .find_map(|x| x.strip_prefix("tag:"))
        .map(|t| t.to_string());
    FormatOptions {
        tag,
        json,
        csv,
        named: csvnamed,
        header,
        nodefaults,
    }
}

/// Apply the selected `fields` to the `rows` and print them as requested by `opts`.

pub fn format_rows(
    output: &mut dyn io::Write,
    fields: &[Metric],
    opts: &FormatOptions,
    rows: &[Report],
) -> Result<()> {
    let cols = fields
        .iter()
        .map(|m| {
            rows.iter()
                .map(|r| match r.get(*m) {
                    Some(v) => v.to_string(),
                    None => SKIP.to_string(),
                })
                .collect::<Vec<String>>()
        })
        .collect::<Vec<Vec<String>>>();
    let names = fields.iter().map(|m| m.label()).collect::<Vec<&str>>();

    if opts.csv {
        format_csv(output, &names, opts, &cols, rows.len())
    } else if opts.json {
        format_json(output, &names, opts, &cols, rows.len())
    } else {
        format_fixed_width(output, &names, opts, &cols, rows.len())
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    names: &[&str],
    opts: &FormatOptions,
    cols: &[Vec<String>],
    nrows: usize,
) -> Result<()> {
    // The column width is the max across all the entries in the column (including header, if
    // present).  If there's a tag, it is printed in the last column.
    let mut widths = cols
        .iter()
        .map(|c| c.iter().map(|s| s.len()).max().unwrap_or(0))
        .collect::<Vec<usize>>();
    if opts.header {
        for (w, name) in widths.iter_mut().zip(names) {
            *w = usize::max(*w, name.len());
        }
    }
    let tag_width = opts.tag.as_ref().map(|t| t.len().max("tag".len()));

    let line = |cells: Vec<&str>| -> String {
        let mut s = String::new();
        for (cell, w) in cells.iter().zip(widths.iter().chain(tag_width.iter())) {
            s += &format!("{:width$}  ", cell, width = *w);
        }
        s.trim_end().to_string() + "\n"
    };

    if opts.header {
        let mut cells = names.to_vec();
        if opts.tag.is_some() {
            cells.push("tag");
        }
        output.write_all(line(cells).as_bytes())?;
    }
    for row in 0..nrows {
        let mut cells = cols.iter().map(|c| c[row].as_str()).collect::<Vec<&str>>();
        if let Some(ref tag) = opts.tag {
            cells.push(tag);
        }
        output.write_all(line(cells).as_bytes())?;
    }
    Ok(())
}

fn format_csv(
    output: &mut dyn io::Write,
    names: &[&str],
    opts: &FormatOptions,
    cols: &[Vec<String>],
    nrows: usize,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);

    if opts.header {
        let mut out_fields = names.iter().map(|n| n.to_string()).collect::<Vec<String>>();
        if opts.tag.is_some() {
            out_fields.push("tag".to_string());
        }
        writer.write_record(out_fields)?;
    }

    for row in 0..nrows {
        let mut out_fields = vec![];
        for (col, name) in names.iter().enumerate() {
            let val = &cols[col][row];
            if opts.nodefaults && val == SKIP {
                continue;
            }
            if opts.named {
                out_fields.push(format!("{name}={val}"));
            } else {
                out_fields.push(val.clone());
            }
        }
        if let Some(ref tag) = opts.tag {
            if opts.named {
                out_fields.push(format!("tag={tag}"));
            } else {
                out_fields.push(tag.clone());
            }
        }
        writer.write_record(out_fields)?;
    }

    writer.flush()?;
    Ok(())
}

fn format_json(
    output: &mut dyn io::Write,
    names: &[&str],
    opts: &FormatOptions,
    cols: &[Vec<String>],
    nrows: usize,
) -> Result<()> {
    let mut objects = json::JsonValue::new_array();
    for row in 0..nrows {
        let mut obj = json::JsonValue::new_object();
        for (col, name) in names.iter().enumerate() {
            let val = &cols[col][row];
            if opts.nodefaults && val == SKIP {
                continue;
            }
            obj[*name] = val.clone().into();
        }
        if let Some(ref tag) = opts.tag {
            obj["tag"] = tag.clone().into();
        }
        objects.push(obj)?;
    }
    output.write_all(json::stringify(objects).as_bytes())?;
    output.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
use pbslog::Value;

#[cfg(test)]
fn sample_rows() -> Vec<Report> {
    let mut a = Report::new();
    a.set(Metric::JobId, Value::Text("1.svr".to_string()));
    a.set(Metric::RunTime, Value::Duration(90.0));
    let mut b = Report::new();
    b.set(Metric::JobId, Value::Text("22.svr".to_string()));
    vec![a, b]
}

#[test]
fn test_parse_fields() {
    let known = [Metric::JobId, Metric::RunTime];
    let (fields, others) = parse_fields("run_time,csv,job_id", &known).unwrap();
    assert_eq!(fields, vec![Metric::RunTime, Metric::JobId]);
    assert!(others.contains("csv"));
    let (fields, _) = parse_fields("json", &known).unwrap();
    assert_eq!(fields, known.to_vec());
    assert!(parse_fields("num_cycles", &known).is_err());
    assert!(parse_fields("csv", &[]).is_err());
}

#[test]
fn test_format_fixed_and_csv() {
    let rows = sample_rows();
    let fields = [Metric::JobId, Metric::RunTime];

    let mut out = vec![];
    let opts = standard_options(&HashSet::new());
    format_rows(&mut out, &fields, &opts, &rows).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "job_id  run_time\n1.svr   0:01:30\n22.svr  *skip*\n"
    );

    let mut out = vec![];
    let opts = standard_options(&HashSet::from(["csvnamed", "nodefaults"]));
    format_rows(&mut out, &fields, &opts, &rows).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "job_id=1.svr,run_time=0:01:30\njob_id=22.svr\n"
    );
}

#[test]
fn test_format_json() {
    let rows = sample_rows();
    let mut out = vec![];
    let opts = standard_options(&HashSet::from(["json", "tag:x"]));
    format_rows(&mut out, &[Metric::JobId], &opts, &rows).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "[{\"job_id\":\"1.svr\",\"tag\":\"x\"},{\"job_id\":\"22.svr\",\"tag\":\"x\"}]\n"
    );
}
