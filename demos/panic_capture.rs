use std::sync::Arc;

use daily_debug_log::host::{FatalError, SharedLastError};
use daily_debug_log::init::install_panic_hook;
use daily_debug_log::normalize::Severity;
use daily_debug_log::{CaptureConfig, ErrorCapture};

fn main() {
    // Logs go to $DAILY_DEBUG_LOG_DIR, or <content root>/logs.
    let last_error = Arc::new(SharedLastError::new());
    let capture = Arc::new(
        ErrorCapture::builder(CaptureConfig::from_env())
            .last_error_source(last_error.clone())
            .build(),
    );
    println!("writing to {}", capture.log_path().display());

    install_panic_hook(Arc::clone(&capture));
    let _shutdown = capture.shutdown_guard();

    capture.handle_error(
        Severity::UserWarning.code(),
        "stock level below threshold",
        file!(),
        Some(line!()),
    );

    let parsed = capture.observe("12x".parse::<u32>());
    println!("parse result: {:?}", parsed);

    // Picked up by the shutdown guard when `main` returns.
    last_error.record(FatalError {
        severity: Severity::Error.code(),
        message: "worker pool exhausted".to_string(),
        file: file!().to_string(),
        line: Some(line!()),
    });

    let _ = std::panic::catch_unwind(|| {
        panic!("demo panic");
    });
}
