use crate::sink::LogSink;

/// A sink that simply drops all records.
///
/// Useful for measuring the overhead of a capture without any file I/O,
/// and for tests that don't care about persistence.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn append(&self, _text: &str) -> bool {
        true
    }
}
