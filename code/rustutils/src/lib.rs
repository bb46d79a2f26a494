// Misc utilities useful to both pbslog and pbsalyze.

mod configs;
mod dates;
mod ringbuf;
mod stats;

// A description of a PBS complex: nodes and their cpu counts, and jobs known to be running.

pub use configs::ComplexConfig;
pub use configs::RunningJob;

// Read a complex description from a json file.

pub use configs::read_complex_config;

// Expand "c[1-3,7]" style host name patterns.

pub use configs::expand_hostnames;

// Seconds since the epoch, with optional fractional microseconds.

pub use dates::Epoch;

// Decode the leading "MM/DD/YYYY HH:MM:SS[.ffffff]" of a daemon log record in local time.

pub use dates::decode_timestamp;

// Decode the separate date and time fields of an accounting log record.

pub use dates::decode_accounting_timestamp;

// Decode a ctime(3)-style time as found in estimated start times.

pub use dates::decode_ctime;

// The local-time bounds of a day named by a YYYYMMDD log file name.

pub use dates::day_of_logfile;

// Render an epoch as local time for display.

pub use dates::format_epoch;

// Parse "YYYY-MM-DD[ HH:MM:SS]" in local time.

pub use dates::parse_local_datetime;

// A fixed-capacity buffer of the last N items.

pub use ringbuf::RingBuffer;

// Percentile of a sorted sample, with linear interpolation.

pub use stats::percentile;

// Event arrival rate of a sequence of timestamps, and its unit.

pub use stats::rate;
pub use stats::Rate;
pub use stats::RateUnit;

// Seconds as "[N days, ]H:MM:SS[.ffffff]".

pub use stats::format_duration;

// min/max/mean/quartiles of a finalized sample.

pub use stats::SummaryStatistics;
