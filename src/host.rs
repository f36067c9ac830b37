// Services the embedding application provides to the capture pipeline.
// Every trait here has a null implementation; the pipeline skips a step
// when the host reports the facility as missing.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Which optional facilities a [`TranslationHost`] offers.
///
/// Read once when a [`crate::locale::LocaleNeutralizer`] is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    /// `current_locale` / `switch_locale` are meaningful.
    pub locale_switching: bool,
    /// `restore_previous_locale` pops a locale stack.
    pub locale_stack: bool,
    /// The text-domain operations are meaningful.
    pub text_domains: bool,
}

impl HostCapabilities {
    pub fn none() -> Self {
        Self::default()
    }
}

/// The host application's locale and translation subsystem.
///
/// Methods return `false` when the operation did not take effect; the
/// pipeline treats that as "nothing to do" and moves on.
pub trait TranslationHost: Send + Sync {
    fn capabilities(&self) -> HostCapabilities;

    fn current_locale(&self) -> String;

    fn switch_locale(&self, locale: &str) -> bool;

    /// Pop back to the locale active before the last `switch_locale`.
    fn restore_previous_locale(&self) -> bool {
        false
    }

    /// Loaded text domains, in load order.
    fn loaded_text_domains(&self) -> Vec<String> {
        Vec::new()
    }

    fn unload_text_domain(&self, _domain: &str) -> bool {
        false
    }

    fn load_text_domain(&self, _domain: &str, _file: &Path) -> bool {
        false
    }

    fn is_text_domain_loaded(&self, _domain: &str) -> bool {
        false
    }

    /// Global language directory; `plugins/` below it is searched first.
    fn language_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Language directory shipped with the component owning `domain`.
    fn packaged_language_dir(&self, _domain: &str) -> Option<PathBuf> {
        None
    }
}

/// Host without a translation subsystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTranslationHost;

impl TranslationHost for NullTranslationHost {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::none()
    }

    fn current_locale(&self) -> String {
        String::new()
    }

    fn switch_locale(&self, _locale: &str) -> bool {
        false
    }
}

/// The C-runtime locale (`LC_ALL`), distinct from the host's own locale.
pub trait ProcessLocale: Send + Sync {
    /// Current setting, `None` if it cannot be queried.
    fn get(&self) -> Option<String>;

    /// Try each candidate in order, returning the one that was accepted.
    fn set_first(&self, candidates: &[String]) -> Option<String>;

    /// Put back a value previously returned by [`ProcessLocale::get`].
    fn restore(&self, setting: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullProcessLocale;

impl ProcessLocale for NullProcessLocale {
    fn get(&self) -> Option<String> {
        None
    }

    fn set_first(&self, _candidates: &[String]) -> Option<String> {
        None
    }

    fn restore(&self, _setting: &str) -> bool {
        false
    }
}

/// `LC_ALL` through `setlocale(3)`.
///
/// `setlocale` mutates process-wide state and is not synchronized; captures
/// running concurrently on several threads race on it.
#[cfg(unix)]
#[derive(Clone, Copy, Debug, Default)]
pub struct LibcProcessLocale;

#[cfg(unix)]
impl LibcProcessLocale {
    fn set(&self, name: &str) -> Result<Option<String>, crate::locale::LocaleError> {
        let c_name = std::ffi::CString::new(name)
            .map_err(|_| crate::locale::LocaleError::InvalidName(name.to_string()))?;
        // SAFETY: `c_name` is a valid NUL-terminated string that outlives the
        // call; the returned pointer is copied before any other setlocale call.
        let ptr = unsafe { libc::setlocale(libc::LC_ALL, c_name.as_ptr()) };
        Ok(copy_locale_ptr(ptr))
    }
}

#[cfg(unix)]
fn copy_locale_ptr(ptr: *const libc::c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null results of setlocale point to a NUL-terminated string.
    let value = unsafe { std::ffi::CStr::from_ptr(ptr) };
    Some(value.to_string_lossy().into_owned())
}

#[cfg(unix)]
impl ProcessLocale for LibcProcessLocale {
    fn get(&self) -> Option<String> {
        // SAFETY: a null locale argument only queries the current setting.
        let ptr = unsafe { libc::setlocale(libc::LC_ALL, std::ptr::null()) };
        copy_locale_ptr(ptr)
    }

    fn set_first(&self, candidates: &[String]) -> Option<String> {
        for candidate in candidates {
            match self.set(candidate) {
                Ok(Some(_)) => return Some(candidate.clone()),
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping process locale candidate");
                }
            }
        }
        None
    }

    fn restore(&self, setting: &str) -> bool {
        matches!(self.set(setting), Ok(Some(_)))
    }
}

/// Process locale used when none is configured explicitly.
pub fn default_process_locale() -> std::sync::Arc<dyn ProcessLocale> {
    #[cfg(unix)]
    {
        std::sync::Arc::new(LibcProcessLocale)
    }
    #[cfg(not(unix))]
    {
        std::sync::Arc::new(NullProcessLocale)
    }
}

/// The last fatal error the host observed before shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalError {
    /// Severity bit value, see [`crate::normalize::Severity`].
    pub severity: i64,
    pub message: String,
    pub file: String,
    pub line: Option<u32>,
}

pub trait LastErrorSource: Send + Sync {
    fn last_fatal_error(&self) -> Option<FatalError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoLastError;

impl LastErrorSource for NoLastError {
    fn last_fatal_error(&self) -> Option<FatalError> {
        None
    }
}

/// Thread-safe slot hosts record their most recent error into.
#[derive(Debug, Default)]
pub struct SharedLastError {
    slot: Mutex<Option<FatalError>>,
}

impl SharedLastError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the recorded error.
    pub fn record(&self, error: FatalError) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(error),
            Err(poisoned) => *poisoned.into_inner() = Some(error),
        }
    }

    pub fn clear(&self) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

impl LastErrorSource for SharedLastError {
    fn last_fatal_error(&self) -> Option<FatalError> {
        match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
