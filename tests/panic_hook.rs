// The panic hook is process-global, so it gets a test binary of its own.

use daily_debug_log::host::NullProcessLocale;
use daily_debug_log::init::install_panic_hook;
use daily_debug_log::{CaptureConfig, ErrorCapture};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn panics_are_logged_and_still_unwind() {
    let dir = TempDir::new().unwrap();
    let capture = Arc::new(
        ErrorCapture::builder(CaptureConfig::new(dir.path()))
            .process_locale(Arc::new(NullProcessLocale))
            .build(),
    );
    install_panic_hook(Arc::clone(&capture));

    let result = std::panic::catch_unwind(|| {
        panic!("inventory count went negative");
    });
    assert!(result.is_err());

    let contents = fs::read_to_string(capture.log_path()).unwrap();
    assert!(contents.contains("] UNCAUGHT EXCEPTION\ninventory count went negative in "));
    assert!(contents.contains("tests/panic_hook.rs:"));
}
