//! Safe wrappers for platform-specific unsafe operations.
//!
//! Every `unsafe` block in the crate lives here.

/// Send `SIGKILL` to every process in group `pgid`.
///
/// Returns the OS error when the signal could not be delivered, typically
/// `ESRCH` once the whole group has already exited.
#[cfg(unix)]
pub fn kill_process_group(pgid: u32) -> std::io::Result<()> {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return Err(std::io::Error::from(std::io::ErrorKind::InvalidInput));
    };
    if pgid <= 1 {
        return Err(std::io::Error::from(std::io::ErrorKind::InvalidInput));
    }
    // SAFETY: killpg only delivers a signal; pgid is a positive group id
    // created for a child we spawned.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn kill_process_group(_pgid: u32) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn rejects_init_and_zero_groups() {
        assert!(kill_process_group(0).is_err());
        assert!(kill_process_group(1).is_err());
    }
}
