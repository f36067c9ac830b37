use crate::backtrace::{self, normalize_path, Frame, INTERNAL_FILE, UNKNOWN_LINE};
use chrono::{DateTime, Local};
use std::fmt;

/// `[YYYY-MM-DD HH:MM:SS]`, second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const BACKTRACE_HEADING: &str = "-- Backtrace --";
pub const RECOVERED_BACKTRACE_HEADING: &str = "-- Recovered Backtrace --";
pub const EXCEPTION_BACKTRACE_HEADING: &str = "-- Exception Backtrace --";

/// Where a fault was raised. The file is stored with forward slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<u32>,
}

impl SourceLocation {
    pub fn new(file: &str, line: Option<u32>) -> Self {
        let file = if file.is_empty() {
            INTERNAL_FILE.to_string()
        } else {
            normalize_path(file)
        };
        SourceLocation { file, line }
    }

    pub fn unknown() -> Self {
        SourceLocation {
            file: INTERNAL_FILE.to_string(),
            line: None,
        }
    }
}

impl From<&std::panic::Location<'_>> for SourceLocation {
    fn from(location: &std::panic::Location<'_>) -> Self {
        SourceLocation::new(location.file(), Some(location.line()))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => write!(f, "{}:{}", self.file, UNKNOWN_LINE),
        }
    }
}

/// One captured event, ready to be rendered into the daily log.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub label: String,
    pub message: String,
    pub location: SourceLocation,
    pub backtrace: Vec<Frame>,
}

impl LogRecord {
    /// Header and message block, terminated by a blank line.
    ///
    /// ```text
    /// [2024-05-01 10:00:00] WARNING
    /// Undefined variable in /x.php:5
    ///
    /// ```
    pub fn render_head(&self) -> String {
        format!(
            "{} {}\n{} in {}\n\n",
            stamp(&self.timestamp),
            self.label,
            self.message,
            self.location
        )
    }

    /// Head followed by the backtrace inline, in a single block.
    pub fn render(&self) -> String {
        let mut out = self.render_head();
        if !self.backtrace.is_empty() {
            out.push_str(BACKTRACE_HEADING);
            out.push('\n');
            out.push_str(&backtrace::format(&self.backtrace));
            out.push('\n');
        }
        out
    }
}

/// A separately stamped backtrace block, `None` for an empty stack.
pub fn render_trace_block(
    timestamp: &DateTime<Local>,
    heading: &str,
    frames: &[Frame],
) -> Option<String> {
    if frames.is_empty() {
        return None;
    }
    Some(format!(
        "{} {}\n{}\n",
        stamp(timestamp),
        heading,
        backtrace::format(frames)
    ))
}

/// A free-form message written by the application itself.
///
/// ```text
/// [2024-05-01 10:00:00] cache rebuilt
/// -- Backtrace --
/// #0 ...
///
/// ```
pub fn render_message(timestamp: &DateTime<Local>, message: &str, frames: &[Frame]) -> String {
    let mut out = format!("{} {}\n", stamp(timestamp), message);
    if !frames.is_empty() {
        out.push_str(BACKTRACE_HEADING);
        out.push('\n');
        out.push_str(&backtrace::format(frames));
        out.push('\n');
    }
    out
}

fn stamp(timestamp: &DateTime<Local>) -> String {
    format!("[{}]", timestamp.format(TIMESTAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrace::CallType;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap()
    }

    fn record(backtrace: Vec<Frame>) -> LogRecord {
        LogRecord {
            timestamp: at_noon(),
            label: "WARNING".to_string(),
            message: "Undefined variable".to_string(),
            location: SourceLocation::new("/x.php", Some(5)),
            backtrace,
        }
    }

    #[test]
    fn renders_without_backtrace() {
        assert_eq!(
            record(Vec::new()).render(),
            "[2024-05-01 12:30:05] WARNING\nUndefined variable in /x.php:5\n\n"
        );
    }

    #[test]
    fn renders_backtrace_inline() {
        let frames = vec![Frame::new(0, "bar").at("/a.php", 12).on("Foo", CallType::Instance)];
        assert_eq!(
            record(frames).render(),
            "[2024-05-01 12:30:05] WARNING\nUndefined variable in /x.php:5\n\n\
             -- Backtrace --\n#0 /a.php:12 -> Foo->bar()\n\n"
        );
    }

    #[test]
    fn location_is_normalized() {
        let location = SourceLocation::new("C:\\site\\index.php", None);
        assert_eq!(location.to_string(), "C:/site/index.php:-");
        assert_eq!(SourceLocation::new("", Some(3)).to_string(), "[internal]:3");
    }

    #[test]
    fn trace_block_is_stamped() {
        let frames = vec![Frame::new(0, "main")];
        assert_eq!(
            render_trace_block(&at_noon(), EXCEPTION_BACKTRACE_HEADING, &frames).unwrap(),
            "[2024-05-01 12:30:05] -- Exception Backtrace --\n#0 [internal]:- -> main()\n\n"
        );
        assert!(render_trace_block(&at_noon(), RECOVERED_BACKTRACE_HEADING, &[]).is_none());
    }

    #[test]
    fn message_line_with_optional_backtrace() {
        assert_eq!(
            render_message(&at_noon(), "cache rebuilt", &[]),
            "[2024-05-01 12:30:05] cache rebuilt\n"
        );
        let frames = vec![Frame::new(0, "warm").at("/app/cache.rs", 8)];
        assert_eq!(
            render_message(&at_noon(), "cache rebuilt", &frames),
            "[2024-05-01 12:30:05] cache rebuilt\n-- Backtrace --\n#0 /app/cache.rs:8 -> warm()\n\n"
        );
    }
}
