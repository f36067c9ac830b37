use std::fmt;

/// File placeholder for frames without source information.
pub const INTERNAL_FILE: &str = "[internal]";
/// Line placeholder for frames without a line number.
pub const UNKNOWN_LINE: &str = "-";

/// How a frame's function is attached to its owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallType {
    /// Free function, rendered as an empty string.
    #[default]
    Free,
    /// Associated (static) function, rendered as `::`.
    Static,
    /// Method on an instance, rendered as `->`.
    Instance,
}

impl CallType {
    pub fn as_str(self) -> &'static str {
        match self {
            CallType::Free => "",
            CallType::Static => "::",
            CallType::Instance => "->",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a call stack, index 0 being the innermost call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub index: usize,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub class_name: String,
    pub call_type: CallType,
    pub function: String,
}

impl Frame {
    pub fn new(index: usize, function: impl Into<String>) -> Self {
        Frame {
            index,
            function: function.into(),
            ..Frame::default()
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn on(mut self, class_name: impl Into<String>, call_type: CallType) -> Self {
        self.class_name = class_name.into();
        self.call_type = call_type;
        self
    }
}

impl fmt::Display for Frame {
    /// `#<index> <file>:<line> -> <class><type><function>()`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.as_deref().unwrap_or(INTERNAL_FILE);
        write!(f, "#{} {}:", self.index, file)?;
        match self.line {
            Some(line) => write!(f, "{}", line)?,
            None => f.write_str(UNKNOWN_LINE)?,
        }
        write!(
            f,
            " -> {}{}{}()",
            self.class_name, self.call_type, self.function
        )
    }
}

/// Render frames one per line, in the order given.
///
/// Frames are neither reordered nor deduplicated; an empty slice renders as
/// an empty string.
pub fn format(frames: &[Frame]) -> String {
    let mut out = String::new();
    for frame in frames {
        out.push_str(&frame.to_string());
        out.push('\n');
    }
    out
}

/// Source of "the current call stack" for a capture.
///
/// Hosts that run their own interpreter supply their own frames; native
/// Rust callers use [`NativeStack`].
pub trait StackSource: Send + Sync {
    fn capture(&self) -> Vec<Frame>;
}

/// Captures the Rust call stack through `std::backtrace`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeStack;

impl StackSource for NativeStack {
    fn capture(&self) -> Vec<Frame> {
        let bt = std::backtrace::Backtrace::force_capture();
        parse_std_backtrace(&bt.to_string())
    }
}

/// A stack that always reports the same frames.
#[derive(Clone, Debug, Default)]
pub struct FixedStack(pub Vec<Frame>);

impl StackSource for FixedStack {
    fn capture(&self) -> Vec<Frame> {
        self.0.clone()
    }
}

/// Parse the textual form of a `std::backtrace::Backtrace`.
///
/// Frames produced by the capture machinery itself are dropped and the
/// remaining frames are re-indexed from zero.
pub fn parse_std_backtrace(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                if frame.file.is_none() {
                    let (file, line_no) = split_location(location);
                    frame.file = Some(file);
                    frame.line = line_no;
                }
            }
            continue;
        }

        let Some((index, symbol)) = line.split_once(": ") else {
            continue;
        };
        if index.parse::<usize>().is_err() {
            continue;
        }
        frames.push(frame_from_symbol(symbol));
    }

    let skip = frames
        .iter()
        .take_while(|f| is_capture_machinery(f))
        .count();
    frames
        .into_iter()
        .skip(skip)
        .enumerate()
        .map(|(index, frame)| Frame { index, ..frame })
        .collect()
}

// The last path segment is the function, everything before it the type or
// module. Turbofish arguments and closure/shim markers trailing the
// function are dropped.
fn frame_from_symbol(symbol: &str) -> Frame {
    let mut segments = split_path_segments(symbol);
    while segments.len() > 1 && segments.last().map_or(false, |s| is_path_suffix(s)) {
        segments.pop();
    }
    match segments.split_last() {
        Some((function, owner)) if !owner.is_empty() => Frame {
            class_name: owner.join("::"),
            call_type: CallType::Static,
            function: function.to_string(),
            ..Frame::default()
        },
        _ => Frame {
            function: symbol.to_string(),
            ..Frame::default()
        },
    }
}

// Split at `::` that are outside `<...>` and `{...}`.
fn split_path_segments(symbol: &str) -> Vec<&str> {
    let bytes = symbol.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' | b'{' => depth += 1,
            // `->` inside a generic `fn(..) -> T` does not close anything.
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b'>' | b'}' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                segments.push(&symbol[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(&symbol[start..]);
    segments
}

// `<T>` turbofish, `{{closure}}`, `{closure#0}`, `{shim:vtable#0}`.
fn is_path_suffix(segment: &str) -> bool {
    segment.starts_with('<') || segment.starts_with('{')
}

// "path/to/file.rs:12:5" -> ("path/to/file.rs", Some(12))
fn split_location(location: &str) -> (String, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let col = parts.next();
    let line = parts.next();
    let file = parts.next();
    match (file, line, col) {
        (Some(file), Some(line), Some(_)) if line.parse::<u32>().is_ok() => {
            (normalize_path(file), line.parse().ok())
        }
        _ => (normalize_path(location), None),
    }
}

fn is_capture_machinery(frame: &Frame) -> bool {
    frame.class_name.starts_with("std::backtrace")
        || frame.class_name.starts_with("<daily_debug_log::backtrace::")
        || frame.class_name.starts_with("daily_debug_log::backtrace")
}

/// Normalize a path for logging: backslashes become forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}
