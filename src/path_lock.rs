//! Path-scoped lock file
//!
//! A sibling `<file>.lock` created with create-new semantics serialises
//! first-time container creation across threads and processes. The lock is
//! released when the guard drops. A lock left behind by a crashed process has
//! to be removed by hand; contenders give up after the configured timeout.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct PathLock {
    lock_path: PathBuf,
}

impl PathLock {
    /// Lock file path guarding `target`
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Block until the lock for `target` is acquired or `timeout` elapses
    pub fn acquire(target: &Path, timeout: Duration) -> io::Result<Self> {
        let lock_path = Self::lock_path_for(target);
        let deadline = Instant::now() + timeout;
        let mut contended = false;

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    // Owner pid helps when clearing a stale lock by hand
                    let _ = writeln!(file, "{}", std::process::id());
                    if contended {
                        tracing::debug!(lock = %lock_path.display(), "acquired contended lock");
                    }
                    return Ok(Self { lock_path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !contended {
                        tracing::warn!(
                            lock = %lock_path.display(),
                            "container creation in progress elsewhere, waiting"
                        );
                        contended = true;
                    }
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("timed out waiting for lock {}", lock_path.display()),
                        ));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            tracing::warn!(lock = %self.lock_path.display(), error = %e, "failed to release lock");
        }
    }
}
