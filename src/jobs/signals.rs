//! Signal Plumbing
//!
//! Keyboard signals in an interactive session are delivered to the
//! foreground process group only:
//! - SIGINT (Ctrl+C) is forwarded to the foreground pgid
//! - SIGTSTP (Ctrl+Z) stops the foreground pgid and flags the executor so
//!   it can move the job to the background
//! - SIGCHLD flags that job statuses may have changed
//!
//! Handlers are async-signal-safe: they only touch atomics and issue
//! `kill`. The shell process itself never dies from a forwarded signal.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use lazy_static::lazy_static;

/// Pgid of the current foreground pipeline (or 0 when none).
pub static FOREGROUND_PGID: AtomicI32 = AtomicI32::new(0);

/// Set when SIGTSTP stopped the foreground job.
pub static SUSPEND_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Set by SIGCHLD; cleared when job statuses are refreshed.
pub static CHILD_STATUS_CHANGED: AtomicBool = AtomicBool::new(false);

/// Install the interactive signal handlers. Safe to call once at startup.
#[cfg(unix)]
pub fn install_handlers() {
    use signal_hook::consts::{SIGCHLD, SIGINT, SIGTSTP};
    use signal_hook::low_level;

    unsafe {
        let _ = low_level::register(SIGINT, || {
            let pgid = FOREGROUND_PGID.load(Ordering::SeqCst);
            if pgid > 0 {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(-pgid),
                    nix::sys::signal::Signal::SIGINT,
                );
            }
        });
        let _ = low_level::register(SIGTSTP, || {
            let pgid = FOREGROUND_PGID.load(Ordering::SeqCst);
            if pgid > 0 {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(-pgid),
                    nix::sys::signal::Signal::SIGSTOP,
                );
                SUSPEND_REQUESTED.store(true, Ordering::SeqCst);
            }
        });
        let _ = low_level::register(SIGCHLD, || {
            CHILD_STATUS_CHANGED.store(true, Ordering::SeqCst);
        });
    }
}

#[cfg(not(unix))]
pub fn install_handlers() {}

/// Record the foreground pgid for the handlers.
pub fn set_foreground_pgid(pgid: i32) {
    FOREGROUND_PGID.store(pgid, Ordering::SeqCst);
}

pub fn clear_foreground_pgid() {
    FOREGROUND_PGID.store(0, Ordering::SeqCst);
}

pub fn foreground_pgid() -> Option<i32> {
    match FOREGROUND_PGID.load(Ordering::SeqCst) {
        0 => None,
        pgid => Some(pgid),
    }
}

/// Check-and-clear the suspend flag.
pub fn take_suspend_request() -> bool {
    SUSPEND_REQUESTED.swap(false, Ordering::SeqCst)
}

/// Check-and-clear the child-status flag.
pub fn take_child_status_change() -> bool {
    CHILD_STATUS_CHANGED.swap(false, Ordering::SeqCst)
}

/// Send a signal to an entire process group.
#[cfg(unix)]
pub fn kill_pgid(pgid: i32, signal: i32) -> Result<(), String> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = Signal::try_from(signal).map_err(|e| e.to_string())?;
    kill(Pid::from_raw(-pgid), signal).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
pub fn kill_pgid(_pgid: i32, _signal: i32) -> Result<(), String> {
    Err("signals are not supported on this platform".to_string())
}

/// Send a signal to a single process.
#[cfg(unix)]
pub fn kill_pid(pid: i32, signal: i32) -> Result<(), String> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = Signal::try_from(signal).map_err(|e| e.to_string())?;
    kill(Pid::from_raw(pid), signal).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
pub fn kill_pid(_pid: i32, _signal: i32) -> Result<(), String> {
    Err("signals are not supported on this platform".to_string())
}

/// Hand the controlling terminal to a process group (foreground start).
/// Best effort: fails harmlessly when stdin is not a tty.
#[cfg(unix)]
pub fn give_terminal_to(pgid: i32) {
    unsafe {
        let _ = libc::tcsetpgrp(0, pgid);
    }
}

#[cfg(not(unix))]
pub fn give_terminal_to(_pgid: i32) {}

/// Reclaim the terminal for the shell after a foreground command ends.
#[cfg(unix)]
pub fn reclaim_terminal() {
    unsafe {
        let shell_pgid = libc::getpgrp();
        let _ = libc::tcsetpgrp(0, shell_pgid);
    }
}

#[cfg(not(unix))]
pub fn reclaim_terminal() {}

lazy_static! {
    /// Signal names the `kill` builtin and `execution.killSignal` accept.
    pub static ref SIGNAL_TABLE: Vec<(&'static str, i32)> = vec![
        ("SIGHUP", 1),
        ("SIGINT", 2),
        ("SIGQUIT", 3),
        ("SIGKILL", 9),
        ("SIGUSR1", 10),
        ("SIGUSR2", 12),
        ("SIGTERM", 15),
        ("SIGCHLD", 17),
        ("SIGCONT", 18),
        ("SIGSTOP", 19),
        ("SIGTSTP", 20),
    ];
}

/// Parse a signal spec: `SIGTERM`, `TERM`, or a number.
pub fn signal_from_name(name: &str) -> Option<i32> {
    if let Ok(number) = name.parse::<i32>() {
        return Some(number);
    }
    let upper = name.to_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    SIGNAL_TABLE
        .iter()
        .find(|(signal_name, _)| *signal_name == full)
        .map(|(_, number)| *number)
}
