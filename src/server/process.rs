//! PID file, signalling a running server, and dropping root privileges.

use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::signal::{Signal, kill};
use nix::unistd::{Gid, Group, Pid, User, setgid, setuid};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("pid file {path}: {source}")]
    PidFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("pid file {0} does not hold a process id")]
    InvalidPidFile(PathBuf),

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error(transparent)]
    Sys(#[from] nix::errno::Errno),
}

pub fn write_pid_file(path: &Path) -> Result<(), ProcessError> {
    fs::write(path, format!("{}\n", std::process::id())).map_err(|source| ProcessError::PidFile {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_pid_file(path: &Path) -> Result<i32, ProcessError> {
    let content = fs::read_to_string(path).map_err(|source| ProcessError::PidFile {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| ProcessError::InvalidPidFile(path.to_path_buf()))
}

/// Removes the PID file; a file that is already gone is fine.
pub fn remove_pid_file(path: &Path) -> Result<(), ProcessError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ProcessError::PidFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Sends SIGTERM to the process named in the PID file.
pub fn kill_from_pid_file(path: &Path) -> Result<i32, ProcessError> {
    let pid = read_pid_file(path)?;
    kill(Pid::from_raw(pid), Signal::SIGTERM)?;
    Ok(pid)
}

/// Switches to `user` and/or `group`. The group goes first, while we still
/// have the right to change it. A user without an explicit group takes the
/// user's primary group.
pub fn drop_privileges(user: Option<&str>, group: Option<&str>) -> Result<(), ProcessError> {
    let user = user
        .map(|name| {
            User::from_name(name)?.ok_or_else(|| ProcessError::UnknownUser(name.to_string()))
        })
        .transpose()?;

    let gid: Option<Gid> = match group {
        Some(name) => Some(
            Group::from_name(name)?
                .ok_or_else(|| ProcessError::UnknownGroup(name.to_string()))?
                .gid,
        ),
        None => user.as_ref().map(|u| u.gid),
    };

    if let Some(gid) = gid {
        setgid(gid)?;
    }
    if let Some(user) = user {
        setuid(user.uid)?;
        tracing::info!(user = %user.name, uid = %user.uid, "Dropped privileges");
    }
    Ok(())
}
