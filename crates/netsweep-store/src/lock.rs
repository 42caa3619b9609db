//! Advisory cross-process lock on a sibling `.lock` file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use netsweep_protocols::StoreError;
use tokio::time::Instant;

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive `flock` held until dropped.
#[derive(Debug)]
pub struct FileLock {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Lock file guarding `target`.
    pub fn path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Acquire the lock guarding `target`, waiting at most `timeout`.
    pub async fn acquire(target: &Path, timeout: Duration) -> Result<Self, StoreError> {
        let path = Self::path_for(target);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let deadline = Instant::now() + timeout;

        loop {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;

            match Self::try_lock(file, &path)? {
                Some(lock) => return Ok(lock),
                None if Instant::now() >= deadline => return Err(StoreError::LockTimeout(path)),
                None => tokio::time::sleep(RETRY_INTERVAL).await,
            }
        }
    }

    #[cfg(unix)]
    fn try_lock(file: File, path: &Path) -> Result<Option<Self>, StoreError> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(Some(Self {
                _lock: lock,
                path: path.to_path_buf(),
            })),
            Err((_, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, errno)) => Err(StoreError::Io(std::io::Error::from(errno))),
        }
    }

    #[cfg(not(unix))]
    fn try_lock(file: File, path: &Path) -> Result<Option<Self>, StoreError> {
        Ok(Some(Self {
            _file: file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
