//! Process-group helpers for the Executor's timeout path (spec §4.2,
//! "Timeout kills the process group").
//!
//! Grounded on `zed-industries-codex`'s `codex-rs/utils/pty/src/process_group.rs`:
//! `set_process_group` runs in `pre_exec` so the spawned shell becomes its
//! own process group leader, and `kill_process_group_by_pid` targets that
//! whole group (covering grandchildren and pipeline stages the shell
//! forked) instead of just the direct child SIGKILL that `kill_on_drop`
//! gives you. On non-Unix platforms these are no-ops.

use std::io;

#[cfg(unix)]
/// Put the calling process into its own process group. Intended for use in
/// `pre_exec` so the child becomes the group leader before `exec`.
pub(crate) fn set_process_group() -> io::Result<()> {
    let result = unsafe { libc::setpgid(0, 0) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
/// No-op on non-Unix platforms.
pub(crate) fn set_process_group() -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
/// Kill the process group for the given PID (best-effort).
pub(crate) fn kill_process_group_by_pid(pid: u32) -> io::Result<()> {
    use std::io::ErrorKind;

    let pid = pid as libc::pid_t;
    let pgid = unsafe { libc::getpgid(pid) };
    if pgid == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::NotFound {
            return Err(err);
        }
        return Ok(());
    }

    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::NotFound {
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(not(unix))]
/// No-op on non-Unix platforms.
pub(crate) fn kill_process_group_by_pid(_pid: u32) -> io::Result<()> {
    Ok(())
}
