//! Leadership token
//!
//! A named advisory file lock decides which process is the leader.
//! Holding the exclusive lock is "creation mode": the kernel guarantees
//! at most one holder per path at any instant, and releases the lock
//! when the holder exits, crash included. Everyone else merely attaches
//! (opens the file and observes the lock as contended) and becomes a
//! follower.
//!
//! The lock file is never unlinked: the lock, not the file's existence,
//! is authoritative. A stale file from a crashed process carries no
//! lock and is simply re-locked by the next leader.

use fs2::{lock_contended_error, FileExt};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Outcome of one acquisition attempt.
#[derive(Debug)]
pub enum Acquire {
    /// This process created the token: it is the leader.
    Held(LeadershipToken),
    /// The token is held elsewhere: this process is a follower.
    Attached(TokenRef),
    /// Transient window where neither create nor attach succeeded.
    /// Re-run the whole sequence on the next scheduler tick.
    Retry,
}

/// Exclusive ownership of the token. Dropping it releases the lock and
/// lets the next contender win the election.
#[derive(Debug)]
pub struct LeadershipToken {
    file: File,
    path: PathBuf,
}

impl LeadershipToken {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LeadershipToken {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "releasing leadership token");
        let _ = self.file.unlock();
    }
}

/// A follower's reference to the existing token. Dropping it detaches,
/// which must happen before re-running the election.
#[derive(Debug)]
pub struct TokenRef {
    _file: File,
}

/// Attempt to create or attach to the token at `path`.
pub fn acquire(path: &Path) -> Acquire {
    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
    {
        Ok(file) => file,
        Err(err) => {
            tracing::debug!(path = %path.display(), "token open failed, retrying: {err}");
            return Acquire::Retry;
        }
    };

    match file.try_lock_exclusive() {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "leadership token acquired");
            Acquire::Held(LeadershipToken {
                file,
                path: path.to_path_buf(),
            })
        }
        Err(err) if err.raw_os_error() == lock_contended_error().raw_os_error() => {
            Acquire::Attached(TokenRef { _file: file })
        }
        Err(err) => {
            tracing::debug!(path = %path.display(), "token lock failed, retrying: {err}");
            Acquire::Retry
        }
    }
}
