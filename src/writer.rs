use crate::sink::LogSink;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Error type for a single append attempt.
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("failed to open {path:?} for append: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to lock {path:?}: {source}")]
    Lock { path: PathBuf, source: io::Error },

    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Append `text` to `path`, creating the file when absent.
///
/// Tries a plain append first and a locked append second. Returns `false`
/// only when both fail; no error ever escapes.
pub fn append(path: &Path, text: &str) -> bool {
    match try_append(path, text) {
        Ok(()) => true,
        Err(err) => {
            debug!(error = %err, "dropping log record");
            false
        }
    }
}

/// [`append`], reporting why the fallback failed.
pub fn try_append(path: &Path, text: &str) -> Result<(), WriteError> {
    try_append_with(path, text, append_direct)
}

type AppendFn = fn(&Path, &[u8]) -> Result<(), WriteError>;

fn try_append_with(path: &Path, text: &str, primary: AppendFn) -> Result<(), WriteError> {
    match primary(path, text.as_bytes()) {
        Ok(()) => Ok(()),
        Err(err) => {
            debug!(error = %err, "primary append failed, retrying with lock");
            append_locked(path, text.as_bytes())
        }
    }
}

// One write(2) on an O_APPEND descriptor.
fn append_direct(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| WriteError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(bytes).map_err(|source| WriteError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Fallback append that does not rely on `O_APPEND`.
///
/// The file is opened write-only (created with mode 0644 on unix), an
/// exclusive `flock(2)` is taken, the cursor is moved to the end under the
/// lock, and the data is flushed with `fdatasync` before the lock is
/// released.
fn append_locked(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let mut file = open_for_locked_write(path).map_err(|source| WriteError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let _lock = FileLock::exclusive(&file).map_err(|source| WriteError::Lock {
        path: path.to_path_buf(),
        source,
    })?;
    file.seek(SeekFrom::End(0))
        .and_then(|_| file.write_all(bytes))
        .and_then(|()| file.sync_data())
        .map_err(|source| WriteError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(unix)]
fn open_for_locked_write(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .create(true)
        .write(true)
        .mode(0o644)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_locked_write(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).write(true).open(path)
}

/// `flock(2)` guard, released on drop.
struct FileLock {
    #[cfg(unix)]
    fd: std::os::unix::io::RawFd,
}

impl FileLock {
    #[cfg(unix)]
    fn exclusive(file: &File) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a live descriptor owned by `file`, which outlives
        // the guard at every call site.
        let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if rc == 0 {
            Ok(FileLock { fd })
        } else {
            Err(io::Error::last_os_error())
        }
    }

    // No advisory locking primitive is used off unix.
    #[cfg(not(unix))]
    fn exclusive(_file: &File) -> io::Result<Self> {
        Ok(FileLock {})
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            // SAFETY: see `exclusive`; unlocking an open descriptor is benign.
            unsafe {
                libc::flock(self.fd, libc::LOCK_UN);
            }
        }
    }
}

/// [`LogSink`] appending to one file with [`append`].
#[derive(Debug, Clone)]
pub struct DurableLogWriter {
    path: PathBuf,
}

impl DurableLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for DurableLogWriter {
    fn append(&self, text: &str) -> bool {
        append(&self.path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn appends_exact_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("debug.log");

        assert!(append(&path, "first record\n\n"));
        assert!(append(&path, "second record\n\n"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "first record\n\nsecond record\n\n"
        );
    }

    #[test]
    fn locked_fallback_creates_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fallback.log");

        append_locked(&path, b"one\n").unwrap();
        append_locked(&path, b"two\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    fn refuse(path: &Path, _bytes: &[u8]) -> Result<(), WriteError> {
        Err(WriteError::Write {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Unsupported, "append mode rejected"),
        })
    }

    #[test]
    fn failing_primary_falls_back_to_locked_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fallback.log");
        fs::write(&path, "existing\n").unwrap();

        try_append_with(&path, "[2024-05-01 12:30:05] WARNING\nx in /a.rs:1\n\n", refuse).unwrap();
        try_append_with(&path, "second\n", refuse).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "existing\n[2024-05-01 12:30:05] WARNING\nx in /a.rs:1\n\nsecond\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let fresh = dir.path().join("fresh.log");
            try_append_with(&fresh, "one\n", refuse).unwrap();
            let mode = fs::metadata(&fresh).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode & 0o600, 0o600);
            assert_eq!(fs::read_to_string(&fresh).unwrap(), "one\n");
        }
    }

    #[test]
    fn missing_directory_returns_false() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("debug.log");

        assert!(!append(&path, "lost\n"));
        assert!(matches!(
            try_append(&path, "lost\n"),
            Err(WriteError::Open { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn writer_sink_uses_its_path() {
        let dir = TempDir::new().unwrap();
        let writer = DurableLogWriter::new(dir.path().join("sink.log"));
        assert!(writer.append("hello\n"));
        assert_eq!(fs::read_to_string(writer.path()).unwrap(), "hello\n");
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let path = Arc::new(dir.path().join("concurrent.log"));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let path = Arc::clone(&path);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let body = format!("{}-{}", t, i).repeat(40);
                        let record = format!("[start {} {}]\n{}\n[end {} {}]\n\n", t, i, body, t, i);
                        assert!(append(&path, &record));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = fs::read_to_string(path.as_path()).unwrap();
        let records: Vec<&str> = contents.split("\n\n").filter(|r| !r.is_empty()).collect();
        assert_eq!(records.len(), 800);
        for record in records {
            let lines: Vec<&str> = record.lines().collect();
            assert_eq!(lines.len(), 3, "torn record: {:?}", record);
            let id = lines[0].trim_start_matches("[start ").trim_end_matches(']');
            assert_eq!(lines[2], format!("[end {}]", id));
            let (t, i) = id.split_once(' ').unwrap();
            assert_eq!(lines[1], format!("{}-{}", t, i).repeat(40));
        }
    }
}
