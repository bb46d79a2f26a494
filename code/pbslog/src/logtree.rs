/// Enumerate log files for a set of paths and a time window; read lines from them.
///
/// PBS rotates its daemon and accounting logs daily and names each file for its day, YYYYMMDD, in a
/// per-kind directory (server_logs, sched_logs, mom_logs, server_priv/accounting).  A directory
/// argument is expanded to the regular files in it, sorted by name, which puts daily logs in time
/// order.  Files named for a day that lies entirely outside the window are not opened.
///
/// Files named any other way are always read.
use anyhow::{Context, Result};
use rustutils::{day_of_logfile, Epoch};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path;
use tracing::{debug, warn};

/// A supplier of log lines.  The local file system is the only implementation in this crate but
/// the driver does not care where the lines come from.

pub trait LogSource {
    /// All lines of the named log in order.  Lines are decoded lossily from UTF8; an error is
    /// returned if the log cannot be opened, and yielded if reading fails part way.

    fn lines(&mut self, name: &str) -> Result<Box<dyn Iterator<Item = Result<String>>>>;

    /// The (start, end) of the time span covered by the named log, if that is known without
    /// reading it.

    fn day_hint(&self, name: &str) -> Option<(Epoch, Epoch)> {
        let base = path::Path::new(name).file_name()?.to_str()?;
        day_of_logfile(base)
    }
}

#[derive(Default)]
pub struct FileLogSource {}

impl FileLogSource {
    pub fn new() -> FileLogSource {
        FileLogSource {}
    }
}

impl LogSource for FileLogSource {
    fn lines(&mut self, name: &str) -> Result<Box<dyn Iterator<Item = Result<String>>>> {
        let file = File::open(path::Path::new(name)).with_context(|| format!("Opening {name}"))?;
        Ok(Box::new(LossyLines {
            reader: BufReader::new(file),
            name: name.to_string(),
            failed: false,
        }))
    }
}

struct LossyLines {
    reader: BufReader<File>,
    name: String,
    failed: bool,
}

impl Iterator for LossyLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        if self.failed {
            return None;
        }
        let mut buf = vec![];
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                Some(Ok(String::from_utf8_lossy(&buf).into_owned()))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e).with_context(|| format!("Reading {}", self.name)))
            }
        }
    }
}

/// The log files to read, in order, the number of files skipped because of the window, and a
/// message for every path that could not be expanded.

#[derive(Debug, Default, PartialEq)]
pub struct LogFiles {
    pub files: Vec<String>,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Expand `paths` into the list of log files to read.  A path that names neither a file nor a
/// readable directory is reported in the errors and the other paths are still expanded.  Non-UTF8
/// file names in directories are ignored.

pub fn find_logfiles(
    source: &dyn LogSource,
    paths: &[String],
    from: Option<Epoch>,
    to: Option<Epoch>,
) -> LogFiles {
    let mut found = LogFiles::default();
    let mut files = vec![];
    for p in paths {
        let pp = path::Path::new(p);
        if pp.is_dir() {
            let entries = match pp.read_dir().with_context(|| format!("Reading directory {p}")) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("{e:#}");
                    found.errors.push(format!("{e:#}"));
                    continue;
                }
            };
            let mut names = vec![];
            for entry in entries {
                let Ok(entry) = entry else {
                    continue;
                };
                let ep = entry.path();
                if !ep.is_file() {
                    continue;
                }
                if let Some(s) = ep.to_str() {
                    names.push(s.to_string());
                }
            }
            names.sort();
            files.extend(names);
        } else if pp.is_file() {
            files.push(p.clone());
        } else {
            let msg = format!("Not a file or directory: {p}");
            warn!("{msg}");
            found.errors.push(msg);
        }
    }

    for f in files {
        if let Some((start, end)) = source.day_hint(&f) {
            let before = from.is_some_and(|from| end <= from);
            let after = to.is_some_and(|to| start > to);
            if before || after {
                debug!("Skipping {f}, outside the window");
                found.skipped += 1;
                continue;
            }
        }
        found.files.push(f);
    }
    found
}

#[test]
fn test_find_logfiles() {
    let src = FileLogSource::new();
    let dir = "../tests/pbslog/sched_logs".to_string();
    let found = find_logfiles(&src, &[dir.clone()], None, None);
    assert_eq!(found.skipped, 0);
    assert!(found.errors.is_empty());
    assert_eq!(
        found.files,
        vec![
            "../tests/pbslog/sched_logs/20200424".to_string(),
            "../tests/pbslog/sched_logs/20200425".to_string()
        ]
    );

    let from = rustutils::parse_local_datetime("2020-04-25 00:00:01").unwrap();
    let found = find_logfiles(&src, &[dir.clone()], Some(from), None);
    assert_eq!(found.skipped, 1);
    assert_eq!(found.files.len(), 1);
    assert!(found.files[0].ends_with("20200425"));

    let to = rustutils::parse_local_datetime("2020-04-24 23:00:00").unwrap();
    let found = find_logfiles(&src, &[dir.clone()], None, Some(to));
    assert_eq!(found.skipped, 1);
    assert!(found.files[0].ends_with("20200424"));

    // A bad path does not keep the good ones from being found
    let found = find_logfiles(
        &src,
        &["../tests/pbslog/nonesuch".to_string(), dir],
        None,
        None,
    );
    assert_eq!(found.files.len(), 2);
    assert_eq!(found.errors.len(), 1);
    assert!(found.errors[0].contains("nonesuch"));
}

#[test]
fn test_read_lines() {
    let mut src = FileLogSource::new();
    let lines = src
        .lines("../tests/pbslog/sched_logs/20200424")
        .unwrap()
        .collect::<Result<Vec<String>>>()
        .unwrap();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|l| !l.ends_with('\n')));
    assert!(src.lines("../tests/pbslog/nonesuch").is_err());
}
