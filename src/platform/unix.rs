use nix::errno::Errno;
use std::io;
use tokio::process::Command;

/// Prepare a worker command: own process group, so terminal job control
/// signals aimed at the hub do not reach it, and on Linux a parent death
/// signal so the worker never outlives its hub.
pub fn prepare_command(cmd: &mut Command) {
    // SAFETY: the closure only calls async-signal-safe libc functions.
    unsafe {
        cmd.pre_exec(|| {
            if set_process_group() != 0 {
                return Err(io::Error::last_os_error());
            }

            #[cfg(target_os = "linux")]
            {
                if set_parent_death_signal() != 0 {
                    return Err(io::Error::last_os_error());
                }
            }

            Ok(())
        });
    }
}

/// Send a raw signal number, realtime signals included.
pub fn send_signal(pid: u32, signo: libc::c_int) -> Result<(), Errno> {
    let c_pid = pid as libc::pid_t;
    let result = unsafe { libc::kill(c_pid, signo) };
    Errno::result(result).map(drop)
}

/// Encapsulates unsafe setpgid call
unsafe fn set_process_group() -> libc::c_int {
    unsafe { libc::setpgid(0, 0) }
}

/// Encapsulates unsafe prctl call
#[cfg(target_os = "linux")]
unsafe fn set_parent_death_signal() -> libc::c_int {
    unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_zero_reaches_own_process() {
        send_signal(std::process::id(), 0).expect("own process");
    }

    #[test]
    fn signal_zero_to_missing_process_fails() {
        // PIDs are capped well below i32::MAX on every supported kernel.
        let err = send_signal(i32::MAX as u32, 0).expect_err("no such process");
        assert_eq!(err, Errno::ESRCH);
    }
}
