use chrono::NaiveDate;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

// Environment variable names read by `CaptureConfig::from_env`. The
// capture types themselves never touch the environment.

/// Explicit log directory.
pub const LOG_DIR_ENV: &str = "DAILY_DEBUG_LOG_DIR";

/// Content root; logs go to `<root>/logs`.
pub const CONTENT_DIR_ENV: &str = "DAILY_DEBUG_LOG_CONTENT_DIR";

/// Canonical locale records are written in.
pub const LOCALE_ENV: &str = "DAILY_DEBUG_LOG_LOCALE";

pub const DEFAULT_CANONICAL_LOCALE: &str = "en_US";
pub const LOG_SUBDIR: &str = "logs";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Error type returned when the log directory cannot be provisioned.
#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("failed to create log directory {path:?}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to relax permissions on {path:?}: {source}")]
    Permissions { path: PathBuf, source: io::Error },
}

/// Settings for an [`crate::capture::ErrorCapture`].
///
/// **Fields**
/// - `log_dir`: directory holding `debug-YYYY-MM-DD.log` files.
/// - `canonical_locale`: locale every record is written in.
/// - `process_locale_candidates`: names tried, in order, for `LC_ALL`;
///   platforms spell the same locale differently.
/// - `error_context_functions`: function names that mark an error being
///   raised, used by [`crate::context::LocaleFilter`].
/// - `max_depth`: captures allowed to nest on one thread, for direct
///   handler calls and `tracing` events alike. With the default of 1 a
///   fault raised while capturing is not captured again.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub log_dir: PathBuf,
    pub canonical_locale: String,
    pub process_locale_candidates: Vec<String>,
    pub error_context_functions: Vec<String>,
    pub max_depth: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            log_dir: fallback_log_dir(),
            canonical_locale: DEFAULT_CANONICAL_LOCALE.to_string(),
            process_locale_candidates: process_locale_candidates(DEFAULT_CANONICAL_LOCALE),
            error_context_functions: Vec::new(),
            max_depth: 1,
        }
    }
}

impl CaptureConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    /// Build from [`LOG_DIR_ENV`], [`CONTENT_DIR_ENV`] and [`LOCALE_ENV`].
    pub fn from_env() -> Self {
        let log_dir = match std::env::var_os(LOG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => match std::env::var_os(CONTENT_DIR_ENV) {
                Some(root) => PathBuf::from(root).join(LOG_SUBDIR),
                None => fallback_log_dir(),
            },
        };
        let canonical = env_or(LOCALE_ENV, DEFAULT_CANONICAL_LOCALE);
        Self {
            log_dir,
            process_locale_candidates: process_locale_candidates(&canonical),
            canonical_locale: canonical,
            ..Self::default()
        }
    }

    /// Path of the log file for `date`.
    pub fn log_path_for(&self, date: NaiveDate) -> PathBuf {
        daily_log_path(&self.log_dir, date)
    }
}

/// `<dir>/debug-YYYY-MM-DD.log`
pub fn daily_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("debug-{}.log", date.format("%Y-%m-%d")))
}

/// Spellings of `canonical` tried for `LC_ALL`.
///
/// `en_US` also gets the Windows name, other locales only the bare and
/// UTF-8 forms.
pub fn process_locale_candidates(canonical: &str) -> Vec<String> {
    let mut candidates = vec![canonical.to_string(), format!("{}.UTF-8", canonical)];
    if canonical == DEFAULT_CANONICAL_LOCALE {
        candidates.push("English_United States.1252".to_string());
    }
    candidates
}

// Two levels above the executable's directory, like a module installed
// under `<root>/<modules>/<name>/`.
fn fallback_log_dir() -> PathBuf {
    let root = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    root.join(LOG_SUBDIR)
}

/// Create `dir` (mode 0755) and relax it to 0755 when it is not writable.
///
/// Failures are logged and swallowed; a missing directory only means
/// records will be dropped later.
pub fn provision_log_dir(dir: &Path) {
    if let Err(err) = try_provision_log_dir(dir) {
        debug!(error = %err, "log directory not provisioned");
    }
}

pub fn try_provision_log_dir(dir: &Path) -> Result<(), ProvisionError> {
    if !dir.exists() {
        create_dir(dir).map_err(|source| ProvisionError::Create {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    if !is_writable(dir) {
        relax_permissions(dir).map_err(|source| ProvisionError::Permissions {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}

#[cfg(not(unix))]
fn create_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn relax_permissions(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn relax_permissions(dir: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(dir)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(dir, perms)
}

#[cfg(unix)]
fn is_writable(dir: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;
    let Ok(c_path) = std::ffi::CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated path for the whole call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(dir: &Path) -> bool {
    fs::metadata(dir)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
