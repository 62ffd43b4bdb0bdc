use rama::telemetry::tracing;

/// Raise the soft `RLIMIT_NOFILE` limit towards `target`, capped by the hard limit.
///
/// Every in-flight request holds at least one socket, and user tasks are not
/// pooled, so large user counts quickly hit the default soft limit of most systems.
///
/// Returns the soft limit in effect after the call.
pub fn raise_nofile(target: u64) -> std::io::Result<u64> {
    use std::{io, mem};

    // SAFETY: `getrlimit` and `setrlimit` only read from and write to the
    // zero-initialised `rlimit` struct we own for the duration of the call.
    unsafe {
        let mut lim: libc::rlimit = mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        let current = lim.rlim_cur as u64;
        let wanted = target.min(lim.rlim_max as u64);

        if current >= wanted {
            tracing::debug!(
                current,
                wanted,
                "ulimit: current file descriptor limit is already sufficient"
            );
            return Ok(current);
        }

        lim.rlim_cur = wanted as libc::rlim_t;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &lim) != 0 {
            return Err(io::Error::last_os_error());
        }

        tracing::info!(
            previous = current,
            applied = wanted,
            "ulimit: raised file descriptor soft limit"
        );
        Ok(wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_to_zero_keeps_current_limit() {
        let current = raise_nofile(0).unwrap();
        assert!(current > 0);
    }
}
