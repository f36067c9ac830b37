// End-to-end captures against a real daily log file.

use daily_debug_log::backtrace::{CallType, FixedStack, Frame, StackSource};
use daily_debug_log::host::{
    FatalError, HostCapabilities, NullProcessLocale, SharedLastError, TranslationHost,
};
use daily_debug_log::noop_sink::NoopSink;
use daily_debug_log::normalize::Severity;
use daily_debug_log::record::SourceLocation;
use daily_debug_log::{context, CaptureConfig, ErrorCapture, Exception, Propagation};
use regex::Regex;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn capture_in(dir: &TempDir, stack: Vec<Frame>, last: Arc<SharedLastError>) -> ErrorCapture {
    ErrorCapture::builder(CaptureConfig::new(dir.path().join("logs")))
        .process_locale(Arc::new(NullProcessLocale))
        .stack_source(Arc::new(FixedStack(stack)))
        .last_error_source(last)
        .build()
}

#[test]
fn warning_record_matches_documented_shape() {
    let dir = TempDir::new().unwrap();
    let capture = capture_in(&dir, Vec::new(), Arc::new(SharedLastError::new()));

    let outcome = capture.handle_error(
        Severity::Warning.code(),
        "Undefined variable",
        "/x.php",
        Some(5),
    );
    assert_eq!(outcome, Propagation::Continue);

    let name = capture.log_path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(Regex::new(r"^debug-\d{4}-\d{2}-\d{2}\.log$").unwrap().is_match(&name));

    let contents = fs::read_to_string(capture.log_path()).unwrap();
    let shape = Regex::new(
        r"^\[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\] WARNING\nUndefined variable in /x\.php:5\n\n$",
    )
    .unwrap();
    assert!(shape.is_match(&contents), "unexpected record: {:?}", contents);
}

#[test]
fn records_are_appended_in_order() {
    let dir = TempDir::new().unwrap();
    let frames = vec![Frame::new(0, "bar").at("/a.php", 12).on("Foo", CallType::Instance)];
    let capture = capture_in(&dir, frames, Arc::new(SharedLastError::new()));

    capture.handle_error(Severity::Notice.code(), "first", "/a.php", Some(1));
    capture.handle_error(Severity::Deprecated.code(), "second", "/a.php", Some(2));

    let contents = fs::read_to_string(capture.log_path()).unwrap();
    let first = contents.find("NOTICE\nfirst").unwrap();
    let second = contents.find("DEPRECATED\nsecond").unwrap();
    assert!(first < second);
    assert_eq!(contents.matches("-- Backtrace --\n#0 /a.php:12 -> Foo->bar()\n\n").count(), 2);
}

#[test]
fn application_messages_share_the_daily_log() {
    let dir = TempDir::new().unwrap();
    let frames = vec![Frame::new(0, "import").at("/app/jobs.rs", 30)];
    let capture = capture_in(&dir, frames, Arc::new(SharedLastError::new()));

    assert!(capture.log("import started", false));
    assert!(capture.log("import finished", true));

    let contents = fs::read_to_string(capture.log_path()).unwrap();
    let shape = Regex::new(
        r"^\[[\d\- :]{19}\] import started\n\[[\d\- :]{19}\] import finished\n-- Backtrace --\n#0 /app/jobs\.rs:30 -> import\(\)\n\n$",
    )
    .unwrap();
    assert!(shape.is_match(&contents), "unexpected log: {:?}", contents);
}

#[test]
fn non_fatal_last_error_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let last = Arc::new(SharedLastError::new());
    last.record(FatalError {
        severity: Severity::Notice.code(),
        message: "Undefined index".into(),
        file: "/x.php".into(),
        line: Some(3),
    });
    let capture = capture_in(&dir, Vec::new(), last);

    assert_eq!(capture.handle_shutdown(), Propagation::Terminate);
    assert!(!capture.log_path().exists());
}

#[test]
fn fatal_last_error_writes_record_and_trace() {
    let dir = TempDir::new().unwrap();
    let last = Arc::new(SharedLastError::new());
    last.record(FatalError {
        severity: Severity::CompileError.code(),
        message: "Cannot redeclare helper()".into(),
        file: "C:\\site\\functions.php".into(),
        line: Some(18),
    });
    let capture = capture_in(&dir, vec![Frame::new(0, "shutdown")], last);

    capture.handle_shutdown();
    let contents = fs::read_to_string(capture.log_path()).unwrap();
    let shape = Regex::new(
        r"^\[[^\]]+\] COMPILE_ERROR\nCannot redeclare helper\(\) in C:/site/functions\.php:18\n\n\[[^\]]+\] -- Recovered Backtrace --\n#0 \[internal\]:- -> shutdown\(\)\n\n$",
    )
    .unwrap();
    assert!(shape.is_match(&contents), "unexpected log: {:?}", contents);
}

#[test]
fn exception_record_is_written_in_two_blocks() {
    let dir = TempDir::new().unwrap();
    let capture = capture_in(&dir, Vec::new(), Arc::new(SharedLastError::new()));
    let exception = Exception::new(
        "Division by zero",
        SourceLocation::new("/calc.php", Some(8)),
        vec![
            Frame::new(0, "divide").at("/calc.php", 8).on("Calc", CallType::Static),
            Frame::new(1, "{main}").at("/index.php", 2),
        ],
    );

    assert_eq!(capture.handle_exception(&exception), Propagation::Rethrow);
    let contents = fs::read_to_string(capture.log_path()).unwrap();
    assert!(contents.contains("] UNCAUGHT EXCEPTION\nDivision by zero in /calc.php:8\n\n["));
    assert!(contents.ends_with(
        "] -- Exception Backtrace --\n#0 /calc.php:8 -> Calc::divide()\n#1 /index.php:2 -> {main}()\n\n"
    ));
}

#[test]
fn unwritable_log_directory_is_tolerated() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "").unwrap();

    let capture = ErrorCapture::builder(CaptureConfig::new(blocker.join("logs")))
        .process_locale(Arc::new(NullProcessLocale))
        .stack_source(Arc::new(FixedStack(Vec::new())))
        .build();
    assert_eq!(
        capture.handle_error(Severity::Warning.code(), "lost", "/x.php", Some(1)),
        Propagation::Continue
    );
    assert!(!capture.log_path().exists());
}

/// Host with a two-level locale stack and no text domains.
struct StackHost {
    locale: Mutex<Vec<String>>,
}

impl TranslationHost for StackHost {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            locale_switching: true,
            locale_stack: true,
            text_domains: false,
        }
    }

    fn current_locale(&self) -> String {
        self.locale.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn switch_locale(&self, locale: &str) -> bool {
        self.locale.lock().unwrap().push(locale.to_string());
        true
    }

    fn restore_previous_locale(&self) -> bool {
        let mut stack = self.locale.lock().unwrap();
        if stack.len() > 1 {
            stack.pop();
            true
        } else {
            false
        }
    }
}

struct PanickingStack;

impl StackSource for PanickingStack {
    fn capture(&self) -> Vec<Frame> {
        panic!("stack walk failed");
    }
}

#[test]
fn locale_and_flag_survive_a_panicking_collaborator() {
    let host = Arc::new(StackHost {
        locale: Mutex::new(vec!["ja_JP".to_string()]),
    });
    let capture = ErrorCapture::builder(CaptureConfig::new("/nonexistent"))
        .translation_host(host.clone())
        .process_locale(Arc::new(NullProcessLocale))
        .stack_source(Arc::new(PanickingStack))
        .sink(Arc::new(NoopSink))
        .build();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        capture.handle_error(Severity::Warning.code(), "boom", "/x.php", Some(1));
    }));
    assert!(result.is_err());
    assert_eq!(host.current_locale(), "ja_JP");
    assert!(!context::in_capture());
}
