/// Decoding and rendering of the timestamps found in PBS logs.
///
/// PBS writes local wall-clock time, not UTC, so everything here is interpreted in the time zone of
/// the machine doing the analysis.  That is only right if the analysis runs with the same TZ as the
/// daemons that wrote the logs, but it's what the logs give us.
///
/// Times are carried around as f64 seconds since the Unix epoch.  The fractional part holds the
/// optional microsecond suffix of the scheduler's high-resolution timestamps; 53 bits of mantissa
/// is plenty for that.
///
/// None of the decoders return errors.  A timestamp that does not decode means "this is not a
/// record we recognize", and the caller moves on.
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, TimeZone};

pub type Epoch = f64;

const FMT_SECONDS: &str = "%m/%d/%Y %H:%M:%S";
const FMT_MICROS: &str = "%m/%d/%Y %H:%M:%S%.f";
const FMT_CTIME: &str = "%a %b %d %H:%M:%S %Y";
const FMT_DISPLAY: &str = "%Y-%m-%d %H:%M:%S";

/// Decode "MM/DD/YYYY HH:MM:SS" or "MM/DD/YYYY HH:MM:SS.ffffff".  The layout is selected by the
/// presence of a `.`.

pub fn decode_timestamp(text: &str) -> Option<Epoch> {
    let (fmt, micros) = if text.contains('.') {
        (FMT_MICROS, true)
    } else {
        (FMT_SECONDS, false)
    };
    if micros {
        // The fraction is always exactly six digits when PBS writes it.
        let frac = &text[text.rfind('.')? + 1..];
        if frac.len() != 6 || !frac.bytes().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }
    let naive = NaiveDateTime::parse_from_str(text, fmt).ok()?;
    local_epoch(&naive)
}

/// The accounting log splits date and time into separate fields.

pub fn decode_accounting_timestamp(date: &str, time: &str) -> Option<Epoch> {
    if time.contains('.') {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(&format!("{date} {time}"), FMT_SECONDS).ok()?;
    local_epoch(&naive)
}

/// Decode a ctime(3)-style time, eg "Fri Apr 24 16:00:00 2020", as found in the scheduler's
/// estimated start times.  Runs of blanks (ctime pads the day with a space) are tolerated.

pub fn decode_ctime(text: &str) -> Option<Epoch> {
    let normalized = text.split_whitespace().collect::<Vec<&str>>().join(" ");
    let naive = NaiveDateTime::parse_from_str(&normalized, FMT_CTIME).ok()?;
    local_epoch(&naive)
}

/// PBS names its daily log files YYYYMMDD.  Given such a name, return the local-time bounds
/// [midnight, next midnight) of that day.  Any other name yields None.

pub fn day_of_logfile(name: &str) -> Option<(Epoch, Epoch)> {
    if name.len() != 8 || !name.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let day = NaiveDate::parse_from_str(name, "%Y%m%d").ok()?;
    let start = day.and_hms_opt(0, 0, 0)?;
    let end = start + Duration::days(1);
    Some((local_epoch(&start)?, local_epoch(&end)?))
}

/// Render an epoch as local "YYYY-MM-DD HH:MM:SS", for display only.

pub fn format_epoch(t: Epoch) -> String {
    let secs = t.floor();
    let nanos = ((t - secs) * 1e9).round().min(999_999_999.0) as u32;
    match Local.timestamp_opt(secs as i64, nanos).earliest() {
        Some(dt) => dt.format(FMT_DISPLAY).to_string(),
        None => format!("{t}"),
    }
}

/// Local "YYYY-MM-DD HH:MM:SS" or "YYYY-MM-DD" to epoch, for command line arguments.

pub fn parse_local_datetime(text: &str) -> Option<Epoch> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, FMT_DISPLAY) {
        return local_epoch(&naive);
    }
    let day = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    local_epoch(&day.and_hms_opt(0, 0, 0)?)
}

// A local time that falls in a DST fold resolves to the earlier instant; one that falls in a gap
// does not exist and yields None.
fn local_epoch(naive: &NaiveDateTime) -> Option<Epoch> {
    let dt = Local.from_local_datetime(naive).earliest()?;
    Some(dt.timestamp() as f64 + dt.timestamp_subsec_micros() as f64 / 1_000_000.0)
}

#[cfg(test)]
fn expected_local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Epoch {
    Local
        .with_ymd_and_hms(y, mo, d, h, mi, s)
        .earliest()
        .unwrap()
        .timestamp() as f64
}

#[test]
fn test_decode_timestamp() {
    let t = decode_timestamp("04/24/2020 16:00:05").unwrap();
    assert_eq!(t, expected_local(2020, 4, 24, 16, 0, 5));

    let u = decode_timestamp("04/24/2020 16:00:05.250000").unwrap();
    assert!((u - t - 0.25).abs() < 1e-6);

    // Not six digits of fraction
    assert!(decode_timestamp("04/24/2020 16:00:05.25").is_none());
    // Wrong order of fields
    assert!(decode_timestamp("2020/04/24 16:00:05").is_none());
    assert!(decode_timestamp("garbage").is_none());
    assert!(decode_timestamp("").is_none());
}

#[test]
fn test_decode_accounting_timestamp() {
    let t = decode_accounting_timestamp("01/02/2020", "03:04:05").unwrap();
    assert_eq!(t, expected_local(2020, 1, 2, 3, 4, 5));
    assert!(decode_accounting_timestamp("01/02/2020", "x").is_none());
}

#[test]
fn test_decode_ctime() {
    let t = decode_ctime("Fri Apr 24 16:00:00 2020").unwrap();
    assert_eq!(t, expected_local(2020, 4, 24, 16, 0, 0));
    let u = decode_ctime("Sat May  2 09:30:00 2020").unwrap();
    assert_eq!(u, expected_local(2020, 5, 2, 9, 30, 0));
    assert!(decode_ctime("tomorrow").is_none());
}

#[test]
fn test_day_of_logfile() {
    let (start, end) = day_of_logfile("20200424").unwrap();
    assert_eq!(start, expected_local(2020, 4, 24, 0, 0, 0));
    assert_eq!(end, expected_local(2020, 4, 25, 0, 0, 0));
    assert!(day_of_logfile("2020042").is_none());
    assert!(day_of_logfile("20201340").is_none());
    assert!(day_of_logfile("sched_log").is_none());
}

#[test]
fn test_parse_local_datetime() {
    assert_eq!(
        parse_local_datetime("2020-04-24 16:00:05").unwrap(),
        expected_local(2020, 4, 24, 16, 0, 5)
    );
    assert_eq!(
        parse_local_datetime("2020-04-24").unwrap(),
        expected_local(2020, 4, 24, 0, 0, 0)
    );
    assert!(parse_local_datetime("24.04.2020").is_none());
}
