// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Data directory locking, shared by `init` and `run`.

use base::{bail_t, format_err_t, ErrorKind};
use nix::fcntl::FlockArg;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd as _;
use std::path::Path;
use tracing::info;

pub mod init;
pub mod run;

const LOCK_FILE_NAME: &str = ".lock";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    Create,
}

/// Holds the data directory's exclusive `flock` for as long as it's alive.
/// Releasing it is just a matter of closing the fd, so there's no explicit
/// `unlock`; keep the returned value alive as long as the store is open.
pub struct DirLock {
    _file: File,
}

/// Locks `<data_dir>/.lock`, creating the directory and the sentinel file
/// first if `mode` is `Create`.
pub fn open_dir(data_dir: &Path, mode: OpenMode) -> Result<DirLock, base::Error> {
    if mode == OpenMode::Create {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| format_err_t!(Internal, "unable to create data dir {}: {e}", data_dir.display()))?;
    } else if !data_dir.is_dir() {
        bail_t!(
            NotFound,
            "data dir {} not found; try running `mediasort init --data-dir {}` first",
            data_dir.display(),
            data_dir.display()
        );
    }

    let lock_path = data_dir.join(LOCK_FILE_NAME);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| format_err_t!(Internal, "unable to open {}: {e}", lock_path.display()))?;

    nix::fcntl::flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock).map_err(|e| {
        format_err_t!(
            Unavailable,
            "unable to get exclusive lock on data dir {}: {e}",
            data_dir.display()
        )
    })?;

    info!(data_dir = %data_dir.display(), "locked data directory");
    Ok(DirLock { _file: file })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dir_error_mentions_init() {
        let tmpdir = tempfile::Builder::new()
            .prefix("mediasort-test")
            .tempdir()
            .unwrap();
        let mut nonexistent_dir = tmpdir.path().to_path_buf();
        nonexistent_dir.push("nonexistent");
        let err = open_dir(&nonexistent_dir, OpenMode::ReadWrite).unwrap_err();
        assert!(
            err.to_string().contains("mediasort init"),
            "unexpected error: {err}"
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn create_mode_makes_the_directory() {
        let tmpdir = tempfile::Builder::new()
            .prefix("mediasort-test")
            .tempdir()
            .unwrap();
        let mut fresh_dir = tmpdir.path().to_path_buf();
        fresh_dir.push("fresh");
        let _lock = open_dir(&fresh_dir, OpenMode::Create).unwrap();
        assert!(fresh_dir.is_dir());
        assert!(fresh_dir.join(LOCK_FILE_NAME).is_file());
    }

    #[test]
    fn second_exclusive_lock_is_rejected() {
        let tmpdir = tempfile::Builder::new()
            .prefix("mediasort-test")
            .tempdir()
            .unwrap();
        let dir = tmpdir.path().to_path_buf();
        let _first = open_dir(&dir, OpenMode::Create).unwrap();
        let second = open_dir(&dir, OpenMode::ReadWrite);
        assert!(second.is_err());
    }
}
