// Per-thread "capture in flight" state and the filters that consult it.

use crate::backtrace::Frame;
use std::borrow::Cow;
use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Whether a capture is running on the current thread.
pub fn in_capture() -> bool {
    depth() > 0
}

/// Number of captures currently nested on this thread.
pub fn depth() -> u32 {
    DEPTH.with(|d| d.get())
}

/// Marks the current thread as capturing for as long as it lives.
///
/// The flag is cleared on drop, which includes unwinding out of a
/// capture. The guard cannot be sent to another thread.
#[derive(Debug)]
pub struct CaptureScope {
    _thread_bound: PhantomData<*const ()>,
}

impl CaptureScope {
    /// Enter a capture unless `max_depth` captures are already running
    /// on this thread.
    pub fn enter(max_depth: u32) -> Option<CaptureScope> {
        DEPTH.with(|d| {
            let current = d.get();
            if current >= max_depth {
                return None;
            }
            d.set(current + 1);
            Some(CaptureScope {
                _thread_bound: PhantomData,
            })
        })
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Filters a host calls from its locale and translation hooks.
#[derive(Debug, Clone)]
pub struct LocaleFilter {
    canonical: String,
    error_context_functions: Vec<String>,
}

impl LocaleFilter {
    pub fn new(canonical: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            error_context_functions: Vec::new(),
        }
    }

    /// Functions whose presence on the stack means an error is being
    /// raised, e.g. the host's own `trigger_error`.
    pub fn with_error_context_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_context_functions = names.into_iter().map(Into::into).collect();
        self
    }

    /// Locale the host should use right now.
    pub fn locale<'a>(&'a self, locale: &'a str) -> Cow<'a, str> {
        if in_capture() {
            Cow::Borrowed(self.canonical.as_str())
        } else {
            Cow::Borrowed(locale)
        }
    }

    /// Like [`LocaleFilter::locale`], also forcing the canonical locale
    /// when `frames` pass through an error-raising function.
    pub fn locale_for_stack<'a>(&'a self, locale: &'a str, frames: &[Frame]) -> Cow<'a, str> {
        let raising = frames.iter().any(|f| {
            self.error_context_functions
                .iter()
                .any(|name| *name == f.function)
        });
        if raising {
            Cow::Borrowed(self.canonical.as_str())
        } else {
            self.locale(locale)
        }
    }

    /// Translation the host should return: the untranslated source text
    /// while capturing.
    pub fn translation<'a>(&self, translated: &'a str, original: &'a str) -> &'a str {
        if in_capture() {
            original
        } else {
            translated
        }
    }
}
