//! Scoped suppression of process stdout.
//!
//! Some steps (the OAuth consent flow, Drive lookups) produce console noise
//! the caller never wants to see. While at least one [`QuietStdout`] guard is
//! alive, file descriptor 1 points at the null device. The first guard saves
//! the real descriptor and the last one to drop puts it back, so guards may
//! overlap in any order and across threads. Dropping happens during
//! unwinding too.
//!
//! Stderr is left alone so prompts such as "open this URL" still reach the
//! user. On non-Unix targets the guard does nothing.

use std::io;
#[cfg(unix)]
use std::io::Write;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use std::sync::{Mutex, MutexGuard};

/// Process-wide redirection state shared by all guards.
#[cfg(unix)]
struct Redirect {
    depth: usize,
    saved_fd: libc::c_int,
}

#[cfg(unix)]
static REDIRECT: Mutex<Redirect> = Mutex::new(Redirect {
    depth: 0,
    saved_fd: -1,
});

#[cfg(unix)]
fn redirect_state() -> MutexGuard<'static, Redirect> {
    REDIRECT.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// RAII guard that silences stdout until the last live guard is dropped.
#[derive(Debug)]
#[must_use = "stdout is restored as soon as the guard is dropped"]
pub struct QuietStdout {
    _private: (),
}

#[cfg(unix)]
impl QuietStdout {
    /// Redirects stdout to `/dev/null`, or joins an existing redirection.
    pub fn new() -> io::Result<Self> {
        let mut state = redirect_state();

        if state.depth == 0 {
            io::stdout().flush()?;
            let devnull = std::fs::OpenOptions::new().write(true).open("/dev/null")?;

            // SAFETY: plain descriptor calls on fds we own; errors are checked.
            unsafe {
                let saved_fd = libc::dup(libc::STDOUT_FILENO);
                if saved_fd < 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::dup2(devnull.as_raw_fd(), libc::STDOUT_FILENO) < 0 {
                    let err = io::Error::last_os_error();
                    libc::close(saved_fd);
                    return Err(err);
                }
                state.saved_fd = saved_fd;
            }
        }

        state.depth += 1;
        Ok(Self { _private: () })
    }
}

#[cfg(unix)]
impl Drop for QuietStdout {
    fn drop(&mut self) {
        let mut state = redirect_state();
        state.depth = state.depth.saturating_sub(1);
        if state.depth > 0 {
            return;
        }

        let _ = io::stdout().flush();
        // SAFETY: `saved_fd` came from `dup` when depth left zero and is
        // closed only here, when depth returns to zero.
        unsafe {
            if libc::dup2(state.saved_fd, libc::STDOUT_FILENO) < 0 {
                tracing::warn!("failed to restore stdout: {}", io::Error::last_os_error());
            }
            libc::close(state.saved_fd);
        }
        state.saved_fd = -1;
    }
}

#[cfg(not(unix))]
impl QuietStdout {
    /// No-op outside Unix.
    pub fn new() -> io::Result<Self> {
        Ok(Self { _private: () })
    }
}

/// Runs `f` with stdout silenced.
///
/// Stdout is restored whether `f` returns normally or panics. If the
/// redirection itself cannot be set up, `f` still runs with stdout intact.
pub fn with_quiet_stdout<T>(f: impl FnOnce() -> T) -> T {
    let _guard = match QuietStdout::new() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::debug!("could not silence stdout: {}", e);
            None
        }
    };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    use std::sync::mpsc;
    #[cfg(unix)]
    use std::thread;

    /// Tests that move fd 1 around run one at a time.
    #[cfg(unix)]
    static SERIAL: Mutex<()> = Mutex::new(());

    #[cfg(unix)]
    fn serial() -> MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `(st_dev, st_ino)` of whatever fd 1 currently refers to.
    #[cfg(unix)]
    fn stdout_identity() -> (u64, u64) {
        // SAFETY: fstat writes into a zeroed, properly sized stat buffer.
        unsafe {
            let mut st: libc::stat = std::mem::zeroed();
            assert_eq!(libc::fstat(libc::STDOUT_FILENO, &mut st), 0);
            (st.st_dev as u64, st.st_ino as u64)
        }
    }

    #[test]
    fn closure_value_passes_through() {
        #[cfg(unix)]
        let _serial = serial();
        let value = with_quiet_stdout(|| {
            println!("this line is swallowed");
            42
        });
        assert_eq!(value, 42);
    }

    #[test]
    fn error_results_pass_through() {
        #[cfg(unix)]
        let _serial = serial();
        let result: Result<(), String> = with_quiet_stdout(|| Err("boom".to_string()));
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[cfg(unix)]
    #[test]
    fn nested_guards_restore_original_stdout() {
        let _serial = serial();
        let before = stdout_identity();
        {
            let _outer = QuietStdout::new().unwrap();
            let quiet = stdout_identity();
            {
                let _inner = QuietStdout::new().unwrap();
                assert_eq!(stdout_identity(), quiet);
            }
            assert_eq!(stdout_identity(), quiet);
        }
        assert_eq!(stdout_identity(), before);
    }

    #[cfg(unix)]
    #[test]
    fn overlapping_guards_on_two_threads_restore_stdout() {
        let _serial = serial();
        let before = stdout_identity();

        let (first_ready_tx, first_ready_rx) = mpsc::channel();
        let (second_ready_tx, second_ready_rx) = mpsc::channel();
        let (first_done_tx, first_done_rx) = mpsc::channel();

        // first in, first out: the creator of the redirection drops first
        let first = thread::spawn(move || {
            let guard = QuietStdout::new().unwrap();
            first_ready_tx.send(()).unwrap();
            second_ready_rx.recv().unwrap();
            drop(guard);
            first_done_tx.send(()).unwrap();
        });
        let second = thread::spawn(move || {
            first_ready_rx.recv().unwrap();
            let guard = QuietStdout::new().unwrap();
            second_ready_tx.send(()).unwrap();
            first_done_rx.recv().unwrap();
            drop(guard);
        });

        first.join().unwrap();
        second.join().unwrap();
        assert_eq!(stdout_identity(), before);
    }

    #[cfg(unix)]
    #[test]
    fn restored_after_panic() {
        let _serial = serial();
        let before = stdout_identity();
        let result = std::panic::catch_unwind(|| {
            let _: () = with_quiet_stdout(|| panic!("inside quiet section"));
        });
        assert!(result.is_err());
        assert_eq!(stdout_identity(), before);
    }
}
