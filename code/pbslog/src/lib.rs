/// PBS writes its history as append-only text: the scheduler, the server and each execution host's
/// mom write daily daemon logs, and the server also writes an accounting log.  None of these is a
/// machine-readable event stream.  A daemon log *record* is a line that starts with a timestamp and
/// continues with semicolon-separated free text; an accounting record carries a record type, a job
/// id and a list of key=value attributes.
///
/// This library reconstructs the operational history from the logs:
///
/// - From the scheduler log it rebuilds *cycles*, the scheduler's passes over the queued jobs,
///   with the jobs considered, run, calendared and preempted in each and the time spent on each
///   decision.  Cycle boundaries in the log are unreliable and are recovered as well as possible.
///
/// - From the server, mom and accounting logs it builds per-job timelines (queued, run, ended)
///   with wait and run times, node events, and cpu utilization over the analysis window.
///
/// - For any log it can count records matching a pattern per time interval, find sequences of
///   records matching a list of patterns, or just echo the records in a time window.
///
/// The result of an analysis is a `Report`, an ordered mapping from metric to value.
///
/// Records that cannot be understood are skipped: the logs are operator-facing text and a partial
/// result is always better than none.
mod acctlog;
mod driver;
mod intervals;
mod logtree;
mod metrics;
mod momlog;
mod patterns;
mod schedlog;
mod serverlog;
mod timeline;

// The kinds of log we can read, and how to find the time of a record in each.

pub use driver::LogKind;

// What to do with the records: analyze, echo, or one of the ad hoc searches.

pub use driver::Mode;

// A complete request: log kind, files, time window, mode, detail flag, complex description.

pub use driver::AnalysisRequest;

// Run a request against a log source, returning the report and reading statistics.

pub use driver::run_analysis;
pub use driver::Analysis;
pub use driver::DriverStats;

// Construct the analyzer for a kind and mode; the analyzer interface.

pub use driver::make_analyzer;
pub use driver::LogAnalyzer;

// Where log lines come from, and the local file system implementation.

pub use logtree::FileLogSource;
pub use logtree::LogSource;

// Expand files and directories into the list of log files to read for a window.

pub use logtree::find_logfiles;
pub use logtree::LogFiles;

// Metric identifiers, values, and the ordered report.

pub use metrics::Metric;
pub use metrics::Report;
pub use metrics::StatScale;
pub use metrics::Value;

// Line classification for the daemon logs.

pub use patterns::mom_patterns;
pub use patterns::scheduler_patterns;
pub use patterns::server_patterns;
pub use patterns::Classified;
pub use patterns::MomTag;
pub use patterns::PatternRegistry;
pub use patterns::SchedTag;
pub use patterns::ServerTag;

// "55[2].svr" -> "55[].svr".

pub use patterns::array_parent;

// Scheduler cycle reconstruction.

pub use schedlog::CloseReason;
pub use schedlog::Cycle;
pub use schedlog::CycleReconstructor;
pub use schedlog::EstimateHistory;

// Per-job timelines and the server and mom trackers built on them.

pub use momlog::MomTracker;
pub use serverlog::ServerTracker;
pub use timeline::JobTimeline;
pub use timeline::TimelineMetrics;
pub use timeline::Timelines;

// Accounting records and the accounting tracker.

pub use acctlog::parse_accounting_line;
pub use acctlog::AccountingRecord;
pub use acctlog::AccountingTracker;
pub use acctlog::AttrValue;
pub use acctlog::ParsedLine;
pub use acctlog::RecordType;

// Interval histograms and conditional sequences.

pub use intervals::IntervalCounter;
pub use intervals::SequenceMatcher;
