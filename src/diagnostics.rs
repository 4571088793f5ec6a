// Diagnostic channel - driver debug reports
//
// The backend hands every report to a registered handler closure. The
// console handler classifies it, writes one line to stderr (errors) or
// stdout (everything else) and tells the driver whether the triggering
// call should be treated as failed.

use ash::vk;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Closure registered with the backend. Returning true aborts the triggering call.
///
/// Reports can arrive from any driver thread, hence `Send + Sync`.
pub type DiagnosticHandler = Box<dyn Fn(&DiagnosticReport<'_>) -> bool + Send + Sync>;

/// Layer every diagnostics-enabled context requests.
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// One report as delivered by the driver.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticReport<'a> {
    pub flags: vk::DebugReportFlagsEXT,
    pub layer: &'a str,
    pub code: i32,
    pub message: &'a str,
}

/// Severities in priority order. A report may carry several flags;
/// the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Information,
    PerformanceWarning,
    Debug,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Error,
        Severity::Warning,
        Severity::Information,
        Severity::PerformanceWarning,
        Severity::Debug,
    ];

    /// Returns `None` when none of the five recognized flags is set.
    pub fn classify(flags: vk::DebugReportFlagsEXT) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|severity| flags.contains(severity.flag()))
    }

    pub fn flag(self) -> vk::DebugReportFlagsEXT {
        match self {
            Severity::Error => vk::DebugReportFlagsEXT::ERROR,
            Severity::Warning => vk::DebugReportFlagsEXT::WARNING,
            Severity::Information => vk::DebugReportFlagsEXT::INFORMATION,
            Severity::PerformanceWarning => vk::DebugReportFlagsEXT::PERFORMANCE_WARNING,
            Severity::Debug => vk::DebugReportFlagsEXT::DEBUG,
        }
    }

    /// 0 is the most urgent.
    pub fn priority(self) -> u32 {
        self as u32
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Information => "INFORMATION",
            Severity::PerformanceWarning => "PERFORMANCE",
            Severity::Debug => "DEBUG",
        }
    }

    /// Only errors abort the call that triggered the report.
    pub fn aborts_call(self) -> bool {
        self == Severity::Error
    }
}

/// Severities the channel subscribes to.
pub fn report_flags(verbose: bool) -> vk::DebugReportFlagsEXT {
    let flags = vk::DebugReportFlagsEXT::ERROR
        | vk::DebugReportFlagsEXT::WARNING
        | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING;
    if verbose {
        flags | vk::DebugReportFlagsEXT::INFORMATION | vk::DebugReportFlagsEXT::DEBUG
    } else {
        flags
    }
}

pub fn format_report(severity: Severity, report: &DiagnosticReport<'_>) -> String {
    format!(
        ">> {} | layer {} | code {}:\n{}\n",
        severity.label(),
        report.layer,
        report.code,
        report.message
    )
}

/// Writes classified reports to an output/error stream pair and counts them.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
    counts: Mutex<[u64; 5]>,
}

impl ConsoleSink {
    /// Standard output for everything but errors, standard error for errors.
    pub fn stdio() -> Self {
        Self::with_writers(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn with_writers(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
            counts: Mutex::new([0; 5]),
        }
    }

    /// Classify, route and count one report. Returns the abort decision.
    pub fn handle(&self, report: &DiagnosticReport<'_>) -> bool {
        let Some(severity) = Severity::classify(report.flags) else {
            return false;
        };

        self.counts.lock()[severity.priority() as usize] += 1;

        let line = format_report(severity, report);
        let stream = if severity == Severity::Error { &self.err } else { &self.out };
        let mut stream = stream.lock();
        // Nowhere to report a broken stdio from inside a driver callback.
        let _ = stream.write_all(line.as_bytes());
        let _ = stream.flush();

        severity.aborts_call()
    }

    pub fn count(&self, severity: Severity) -> u64 {
        self.counts.lock()[severity.priority() as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.lock().iter().sum()
    }

    /// Log the per-severity tallies.
    pub fn log_summary(&self) {
        let counts = *self.counts.lock();
        log::info!(
            "Diagnostics: {} errors, {} warnings, {} info, {} performance, {} debug",
            counts[0],
            counts[1],
            counts[2],
            counts[3],
            counts[4]
        );
    }
}

/// Handler closure that routes through a shared sink.
pub fn console_handler(sink: Arc<ConsoleSink>) -> DiagnosticHandler {
    Box::new(move |report| sink.handle(report))
}
