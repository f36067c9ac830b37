use crate::backtrace::{Frame, NativeStack, StackSource};
use crate::config::{provision_log_dir, CaptureConfig};
use crate::context::{CaptureScope, LocaleFilter};
use crate::host::{
    default_process_locale, LastErrorSource, NoLastError, NullTranslationHost, ProcessLocale,
    TranslationHost,
};
use crate::locale::{LocaleNeutralizer, LocaleSnapshot};
use crate::normalize::{classify, classify_fatal, is_fatal_code, recover_canonical_message};
use crate::record::{
    render_message, render_trace_block, LogRecord, SourceLocation, EXCEPTION_BACKTRACE_HEADING,
    RECOVERED_BACKTRACE_HEADING,
};
use crate::sink::LogSink;
use crate::writer::DurableLogWriter;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Label written for uncaught exceptions and panics.
pub const UNCAUGHT_EXCEPTION_LABEL: &str = "UNCAUGHT EXCEPTION";

/// What the caller of a handler should do once the record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Not fully handled; let the host's own handling run.
    Continue,
    /// The process is going away; nothing left to propagate to.
    Terminate,
    /// Hand the original fault back to the host's default handling.
    Rethrow,
}

/// An uncaught fault carrying its own location and stack.
#[derive(Debug, Clone)]
pub struct Exception {
    pub message: String,
    pub location: SourceLocation,
    pub trace: Vec<Frame>,
}

impl Exception {
    pub fn new(message: impl Into<String>, location: SourceLocation, trace: Vec<Frame>) -> Self {
        Exception {
            message: message.into(),
            location,
            trace,
        }
    }

    /// Message is the error followed by its `source()` chain.
    pub fn from_error(
        err: &(dyn std::error::Error + 'static),
        location: SourceLocation,
        trace: Vec<Frame>,
    ) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Exception::new(message, location, trace)
    }
}

/// Builder for [`ErrorCapture`]; every collaborator defaults to a null or
/// native implementation.
pub struct CaptureBuilder {
    config: CaptureConfig,
    host: Arc<dyn TranslationHost>,
    process: Arc<dyn ProcessLocale>,
    stack: Arc<dyn StackSource>,
    last_error: Arc<dyn LastErrorSource>,
    sink: Option<Arc<dyn LogSink>>,
}

impl CaptureBuilder {
    pub fn translation_host(mut self, host: Arc<dyn TranslationHost>) -> Self {
        self.host = host;
        self
    }

    pub fn process_locale(mut self, process: Arc<dyn ProcessLocale>) -> Self {
        self.process = process;
        self
    }

    pub fn stack_source(mut self, stack: Arc<dyn StackSource>) -> Self {
        self.stack = stack;
        self
    }

    pub fn last_error_source(mut self, last_error: Arc<dyn LastErrorSource>) -> Self {
        self.last_error = last_error;
        self
    }

    /// Replace the daily file writer.
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Provision the log directory and fix today's log path.
    ///
    /// The path is derived once; a process running past midnight keeps
    /// writing to the file of the day it started.
    pub fn build(self) -> ErrorCapture {
        let config = self.config;
        let log_path = config.log_path_for(Local::now().date_naive());
        let sink = match self.sink {
            Some(sink) => sink,
            None => {
                provision_log_dir(&config.log_dir);
                Arc::new(DurableLogWriter::new(log_path.clone()))
            }
        };
        let neutralizer = LocaleNeutralizer::new(
            self.host,
            self.process,
            config.canonical_locale.clone(),
            config.process_locale_candidates.clone(),
        );
        let filter = LocaleFilter::new(config.canonical_locale.clone())
            .with_error_context_functions(config.error_context_functions.iter().cloned());

        ErrorCapture {
            neutralizer,
            sink,
            stack: self.stack,
            last_error: self.last_error,
            filter,
            log_path,
            max_depth: config.max_depth,
        }
    }
}

/// Captures errors, fatal shutdowns and uncaught exceptions into the
/// daily log. Share it behind an `Arc`.
pub struct ErrorCapture {
    neutralizer: LocaleNeutralizer,
    sink: Arc<dyn LogSink>,
    stack: Arc<dyn StackSource>,
    last_error: Arc<dyn LastErrorSource>,
    filter: LocaleFilter,
    log_path: PathBuf,
    max_depth: u32,
}

impl ErrorCapture {
    pub fn builder(config: CaptureConfig) -> CaptureBuilder {
        CaptureBuilder {
            config,
            host: Arc::new(NullTranslationHost),
            process: default_process_locale(),
            stack: Arc::new(NativeStack),
            last_error: Arc::new(NoLastError),
            sink: None,
        }
    }

    /// Capture with native collaborators and no translation host.
    pub fn new(config: CaptureConfig) -> Self {
        Self::builder(config).build()
    }

    /// Today's log file, as fixed at construction.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// The current call stack, from the configured stack source.
    pub fn current_stack(&self) -> Vec<Frame> {
        self.stack.capture()
    }

    /// Captures allowed to nest on one thread.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Filters for the host's locale and translation hooks.
    pub fn filter(&self) -> &LocaleFilter {
        &self.filter
    }

    /// Non-fatal runtime fault: warnings, notices, recoverable errors.
    ///
    /// Writes one record with the current backtrace inline and always
    /// returns [`Propagation::Continue`].
    pub fn handle_error(
        &self,
        code: i64,
        message: &str,
        file: &str,
        line: Option<u32>,
    ) -> Propagation {
        self.bracket(|| {
            let record = LogRecord {
                timestamp: Local::now(),
                label: classify(code),
                message: recover_canonical_message(message),
                location: SourceLocation::new(file, line),
                backtrace: self.stack.capture(),
            };
            self.sink.append(&record.render());
        });
        Propagation::Continue
    }

    /// Shutdown inspection of the host's last error.
    ///
    /// Writes nothing unless that error is fatal-capable. The backtrace
    /// follows the record as a second, separately stamped block.
    pub fn handle_shutdown(&self) -> Propagation {
        let Some(error) = self.last_error.last_fatal_error() else {
            return Propagation::Terminate;
        };
        if !is_fatal_code(error.severity) {
            trace!(severity = error.severity, "last error is not fatal");
            return Propagation::Terminate;
        }

        self.bracket(|| {
            let record = LogRecord {
                timestamp: Local::now(),
                label: classify_fatal(error.severity),
                message: recover_canonical_message(&error.message),
                location: SourceLocation::new(&error.file, error.line),
                backtrace: self.stack.capture(),
            };
            self.write_split(&record, RECOVERED_BACKTRACE_HEADING);
        });
        Propagation::Terminate
    }

    /// Uncaught exception, logged with the trace it carries.
    ///
    /// Always returns [`Propagation::Rethrow`]: the caller hands the
    /// exception on to the host's default handling.
    pub fn handle_exception(&self, exception: &Exception) -> Propagation {
        self.bracket(|| {
            let record = LogRecord {
                timestamp: Local::now(),
                label: UNCAUGHT_EXCEPTION_LABEL.to_string(),
                message: recover_canonical_message(&exception.message),
                location: exception.location.clone(),
                backtrace: exception.trace.clone(),
            };
            self.write_split(&record, EXCEPTION_BACKTRACE_HEADING);
        });
        Propagation::Rethrow
    }

    /// Log an `Err` as an uncaught exception and hand it back unchanged.
    ///
    /// The location is the caller's; the trace is the stack at this call,
    /// since `E` carries none of its own.
    #[track_caller]
    pub fn observe<T, E>(&self, result: Result<T, E>) -> Result<T, E>
    where
        E: std::error::Error + 'static,
    {
        if let Err(err) = &result {
            let location = SourceLocation::from(std::panic::Location::caller());
            let exception = Exception::from_error(err, location, self.current_stack());
            self.handle_exception(&exception);
        }
        result
    }

    /// Write an application message to the daily log.
    ///
    /// The record is the timestamped message on one line, followed by the
    /// current backtrace when `include_backtrace` is set. Returns `false`
    /// when nothing was written: the sink failed, or a capture is already
    /// running on this thread.
    pub fn log(&self, message: &str, include_backtrace: bool) -> bool {
        self.bracket(|| {
            let frames = if include_backtrace {
                self.stack.capture()
            } else {
                Vec::new()
            };
            self.sink.append(&render_message(&Local::now(), message, &frames))
        })
        .unwrap_or(false)
    }

    /// A guard running [`ErrorCapture::handle_shutdown`] when dropped.
    pub fn shutdown_guard(self: &Arc<Self>) -> ShutdownGuard {
        ShutdownGuard {
            capture: Arc::clone(self),
        }
    }

    fn write_split(&self, record: &LogRecord, heading: &str) {
        self.sink.append(&record.render_head());
        if let Some(block) = render_trace_block(&Local::now(), heading, &record.backtrace) {
            self.sink.append(&block);
        }
    }

    // Every capture marks the thread, forces the canonical locale, writes,
    // then restores the locale and clears the mark. The last two run in
    // `Drop` so a panicking collaborator cannot skip them. Returns `None`,
    // without touching any locale state, when the nesting limit is reached.
    fn bracket<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let Some(_scope) = CaptureScope::enter(self.max_depth) else {
            trace!("capture skipped, already capturing on this thread");
            return None;
        };
        let _neutralized = Neutralized {
            neutralizer: &self.neutralizer,
            snapshot: Some(self.neutralizer.snapshot_and_force_canonical()),
        };
        Some(f())
    }
}

// Restores the locale snapshot on drop, before the scope flag is cleared.
struct Neutralized<'a> {
    neutralizer: &'a LocaleNeutralizer,
    snapshot: Option<LocaleSnapshot>,
}

impl Drop for Neutralized<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.neutralizer.restore(snapshot);
        }
    }
}

/// Runs the shutdown handler when dropped, typically at the end of `main`.
#[must_use = "the shutdown handler runs when the guard is dropped"]
pub struct ShutdownGuard {
    capture: Arc<ErrorCapture>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.capture.handle_shutdown();
    }
}
