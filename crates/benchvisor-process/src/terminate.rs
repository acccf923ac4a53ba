//! Process termination primitives.

use benchvisor_common::{ProcessError, ProcessResult};

/// Ask a process to stop (SIGTERM).
pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGTERM, "SIGTERM")
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(ProcessError::Unsupported {
            operation: "graceful termination",
        })
    }
}

/// Force kill a process (SIGKILL).
pub fn force_kill(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGKILL, "SIGKILL")
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(ProcessError::Unsupported {
            operation: "forced termination",
        })
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal, name: &'static str) -> ProcessResult<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| ProcessError::signal_failed(pid, name, "PID out of range"))?;
    kill(Pid::from_raw(raw), signal)
        .map_err(|e| ProcessError::signal_failed(pid, name, e.to_string()))
}
