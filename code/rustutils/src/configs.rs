/// Read a description of a PBS complex (its execution nodes, and optionally the jobs that were
/// running on it) from a json file.
///
/// This stands in for querying the live server: the accounting analysis needs the total number of
/// cpus to turn used cpu-seconds into a utilization, and it needs to know about jobs that started
/// before the analysis window and so have no S record inside it.
///
/// File format:
///
/// An object { ... } with the following named fields and value types:
///
///   name - string, optional, the name of the complex
///   nodes - array of objects, required, each with these fields:
///     hostname - string, the host name of the node.  This may be a pattern like c[1-4,7] that
///                expands into multiple host names with the same ncpus
///     ncpus - integer, the number of cpus the node offers to jobs
///   jobs - array of objects, optional, each with these fields:
///     id - string, the job id
///     start - integer, the epoch time at which the job started
///     ncpus - integer, the number of cpus assigned to the job
///
/// Any field name starting with '#' is reserved for arbitrary comments.
use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path;
use ustr::Ustr;

#[derive(Debug, Clone)]
pub struct RunningJob {
    pub id: Ustr,
    pub start: f64,
    pub ncpus: u64,
}

#[derive(Default)]
pub struct ComplexConfig {
    pub name: String,
    nodes: HashMap<String, u64>,
    jobs: Vec<RunningJob>,
}

impl ComplexConfig {
    pub fn total_ncpus(&self) -> u64 {
        self.nodes.values().sum()
    }

    pub fn running_jobs(&self) -> &[RunningJob] {
        &self.jobs
    }
}

/// Since the input is human-generated and has optional fields I've opted to use the generic JSON
/// parser followed by explicit decoding of the fields, rather than a (derived) strongly-typed
/// parser.

pub fn read_complex_config(filename: &str) -> Result<ComplexConfig> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    parse_complex_config(&v)
}

pub fn parse_complex_config(v: &Value) -> Result<ComplexConfig> {
    let mut cfg: ComplexConfig = Default::default();
    let Value::Object(fields) = v else {
        bail!("Expected an object value")
    };
    cfg.name = grab_string_opt(fields, "name")?;
    if let Some(Value::Array(objs)) = fields.get("nodes") {
        for obj in objs {
            let Value::Object(node) = obj else {
                bail!("Expected an object value for a node")
            };
            let hostname = grab_string(node, "hostname")?;
            let ncpus = grab_u64(node, "ncpus")?;
            for host in expand_hostnames(&hostname)? {
                if cfg.nodes.contains_key(&host) {
                    bail!("Node {host} already defined");
                }
                cfg.nodes.insert(host, ncpus);
            }
        }
    } else {
        bail!("The field 'nodes' is required");
    }
    if let Some(jobs) = fields.get("jobs") {
        let Value::Array(objs) = jobs else {
            bail!("Field 'jobs' must be an array")
        };
        for obj in objs {
            let Value::Object(job) = obj else {
                bail!("Expected an object value for a job")
            };
            cfg.jobs.push(RunningJob {
                id: Ustr::from(&grab_string(job, "id")?),
                start: grab_u64(job, "start")? as f64,
                ncpus: grab_u64(job, "ncpus")?,
            });
        }
    }
    Ok(cfg)
}

/// Expand a host name with bracketed ranges, eg "c[1-3,7]-ib" into c1-ib, c2-ib, c3-ib, c7-ib.
/// Multiple bracket groups expand as a cross product.

pub fn expand_hostnames(pattern: &str) -> Result<Vec<String>> {
    let Some(lb) = pattern.find('[') else {
        if pattern.contains(']') {
            bail!("Unbalanced ']' in {pattern}");
        }
        return Ok(vec![pattern.to_string()]);
    };
    let Some(rb) = pattern[lb..].find(']').map(|x| x + lb) else {
        bail!("Unbalanced '[' in {pattern}");
    };
    let prefix = &pattern[..lb];
    let rest = expand_hostnames(&pattern[rb + 1..])?;
    let mut result = vec![];
    for range in pattern[lb + 1..rb].split(',') {
        let (lo, hi) = if let Some((a, b)) = range.split_once('-') {
            (parse_index(a, pattern)?, parse_index(b, pattern)?)
        } else {
            let n = parse_index(range, pattern)?;
            (n, n)
        };
        if lo > hi {
            bail!("Empty range in {pattern}");
        }
        for n in lo..=hi {
            for r in &rest {
                result.push(format!("{prefix}{n}{r}"));
            }
        }
    }
    Ok(result)
}

fn parse_index(s: &str, pattern: &str) -> Result<u64> {
    match s.parse::<u64>() {
        Ok(n) => Ok(n),
        Err(_) => bail!("Bad range element '{s}' in {pattern}"),
    }
}

fn grab_string(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    if let Some(Value::String(s)) = fields.get(name) {
        Ok(s.to_string())
    } else {
        bail!("Field '{name}' must be present and have a string value");
    }
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(s.to_string()),
        Some(_) => bail!("Field '{name}' must have a string value"),
        None => Ok("".to_string()),
    }
}

fn grab_u64(fields: &serde_json::Map<String, Value>, name: &str) -> Result<u64> {
    if let Some(Value::Number(n)) = fields.get(name) {
        if let Some(n) = n.as_u64() {
            return Ok(n);
        }
    }
    bail!("Field '{name}' must be present and have an unsigned integer value")
}

// Basic whitebox test that reading a config file works.  The file is shared with the accounting
// tests in pbslog.

#[test]
fn test_config() {
    let conf = read_complex_config("../tests/pbslog/complex.json").unwrap();
    assert_eq!(conf.name, "testcomplex");
    // n[1-3] expands to three nodes of 8 cpus
    assert_eq!(conf.total_ncpus(), 40);
    assert_eq!(conf.running_jobs().len(), 1);
    assert_eq!(conf.running_jobs()[0].id.as_str(), "90.svr");
    assert_eq!(conf.running_jobs()[0].ncpus, 4);
}

#[test]
fn test_config_errors() {
    let v: Value = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
    assert!(parse_complex_config(&v).is_err());
    let v: Value = serde_json::from_str(r#"{"nodes":[{"hostname":"a"}]}"#).unwrap();
    assert!(parse_complex_config(&v).is_err());
    let v: Value =
        serde_json::from_str(r#"{"nodes":[{"hostname":"a","ncpus":1},{"hostname":"a","ncpus":2}]}"#)
            .unwrap();
    assert!(parse_complex_config(&v).is_err());
    let v: Value = serde_json::from_str(r#"[]"#).unwrap();
    assert!(parse_complex_config(&v).is_err());
}

#[test]
fn test_expand_hostnames() {
    assert_eq!(expand_hostnames("a").unwrap(), vec!["a"]);
    assert_eq!(
        expand_hostnames("c[1-3,7]-ib").unwrap(),
        vec!["c1-ib", "c2-ib", "c3-ib", "c7-ib"]
    );
    assert_eq!(
        expand_hostnames("r[1-2]n[5,6]").unwrap(),
        vec!["r1n5", "r1n6", "r2n5", "r2n6"]
    );
    assert!(expand_hostnames("c[1-").is_err());
    assert!(expand_hostnames("c[3-1]").is_err());
    assert!(expand_hostnames("c[x]").is_err());
}
