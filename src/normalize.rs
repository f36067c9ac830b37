use std::fmt;

/// Severity of a captured runtime fault.
///
/// Discriminants are the host runtime's bit values, so a "last error"
/// severity can be tested against [`FATAL_MASK`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Parse = 4,
    Notice = 8,
    CoreError = 16,
    CoreWarning = 32,
    CompileError = 64,
    CompileWarning = 128,
    UserError = 256,
    UserWarning = 512,
    UserNotice = 1024,
    Strict = 2048,
    RecoverableError = 4096,
    Deprecated = 8192,
    UserDeprecated = 16384,
}

/// Severities that halt normal execution and can only be seen afterwards.
pub const FATAL_SEVERITIES: [Severity; 5] = [
    Severity::Error,
    Severity::Parse,
    Severity::CoreError,
    Severity::CompileError,
    Severity::RecoverableError,
];

/// Bitmask of [`FATAL_SEVERITIES`].
pub const FATAL_MASK: i64 = Severity::Error as i64
    | Severity::Parse as i64
    | Severity::CoreError as i64
    | Severity::CompileError as i64
    | Severity::RecoverableError as i64;

impl Severity {
    pub const ALL: [Severity; 15] = [
        Severity::Error,
        Severity::Warning,
        Severity::Parse,
        Severity::Notice,
        Severity::CoreError,
        Severity::CoreWarning,
        Severity::CompileError,
        Severity::CompileWarning,
        Severity::UserError,
        Severity::UserWarning,
        Severity::UserNotice,
        Severity::Strict,
        Severity::RecoverableError,
        Severity::Deprecated,
        Severity::UserDeprecated,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    /// Exact lookup; combined bitmasks are not severities.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Parse => "PARSE",
            Severity::Notice => "NOTICE",
            Severity::CoreError => "CORE_ERROR",
            Severity::CoreWarning => "CORE_WARNING",
            Severity::CompileError => "COMPILE_ERROR",
            Severity::CompileWarning => "COMPILE_WARNING",
            Severity::UserError => "USER_ERROR",
            Severity::UserWarning => "USER_WARNING",
            Severity::UserNotice => "USER_NOTICE",
            Severity::Strict => "STRICT",
            Severity::RecoverableError => "RECOVERABLE_ERROR",
            Severity::Deprecated => "DEPRECATED",
            Severity::UserDeprecated => "USER_DEPRECATED",
        }
    }

    pub fn is_fatal(self) -> bool {
        FATAL_SEVERITIES.contains(&self)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Label for a non-fatal capture, `UNKNOWN[<code>]` for unknown codes.
pub fn classify(code: i64) -> String {
    match Severity::from_code(code) {
        Some(severity) => severity.label().to_string(),
        None => format!("UNKNOWN[{}]", code),
    }
}

/// Label for a shutdown capture.
///
/// Only fatal-capable severities keep their name; anything else (including
/// combined bitmasks) renders as `FATAL_ERROR[<code>]`.
pub fn classify_fatal(code: i64) -> String {
    match Severity::from_code(code) {
        Some(severity) if severity.is_fatal() => severity.label().to_string(),
        _ => format!("FATAL_ERROR[{}]", code),
    }
}

/// Whether a "last error" severity should produce a shutdown record.
pub fn is_fatal_code(code: i64) -> bool {
    code & FATAL_MASK != 0
}

/// Best-effort recovery of the canonical-language text of a message.
///
/// Identity on purpose: a translated string cannot be mapped back without
/// a reverse-lookup table. Canonical output relies on the locale being
/// neutralized before the message is produced. A reverse lookup, if one is
/// ever added, belongs here; callers must not assume any translation.
pub fn recover_canonical_message(possibly_translated: &str) -> String {
    possibly_translated.to_string()
}

/// Map a `tracing` level to the severity recorded for it.
pub fn severity_for_level(level: &tracing::Level) -> Option<Severity> {
    match *level {
        tracing::Level::ERROR => Some(Severity::Error),
        tracing::Level::WARN => Some(Severity::Warning),
        tracing::Level::INFO => Some(Severity::Notice),
        _ => None,
    }
}
