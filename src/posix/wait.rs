//! Exit code latch and the reaper
use crate::{
    posix::util::{get_last_error, Pid},
    DestroySignal, Error, ExitCode,
};
use nix::sys::{
    signal::{kill, Signal},
    wait::{waitpid, WaitStatus},
};
use std::{mem::MaybeUninit, sync::Mutex, time::Duration};
use tokio::sync::watch;

/// Exit status as published by the reaper
#[derive(Debug, Copy, Clone)]
pub(crate) enum Reaped {
    Code(ExitCode),
    Failed(i32),
}

impl Reaped {
    fn into_result(self) -> Result<ExitCode, Error> {
        match self {
            Reaped::Code(code) => Ok(code),
            Reaped::Failed(code) => Err(Error::Syscall { code }),
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    term_sent: bool,
    kill_sent: bool,
}

#[derive(Debug)]
struct Inner {
    reaped: Option<Reaped>,
    flags: Flags,
}

/// Shared lifecycle state of one child.
///
/// The mutex orders destroy against the reap, so a signal can never
/// hit a recycled pid. The watch channel is the one-shot exit code
/// latch waiters block on.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    pid: Pid,
    inner: Mutex<Inner>,
    tx: watch::Sender<Option<Reaped>>,
    rx: watch::Receiver<Option<Reaped>>,
}

impl Lifecycle {
    pub(crate) fn new(pid: Pid) -> Lifecycle {
        let (tx, rx) = watch::channel(None);
        Lifecycle {
            pid,
            inner: Mutex::new(Inner {
                reaped: None,
                flags: Flags::default(),
            }),
            tx,
            rx,
        }
    }

    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.inner.lock().unwrap().reaped.is_none()
    }

    pub(crate) fn exit_code(&self) -> Result<ExitCode, Error> {
        match self.inner.lock().unwrap().reaped {
            Some(reaped) => reaped.into_result(),
            None => Err(Error::NotExited),
        }
    }

    pub(crate) async fn wait(&self) -> Result<ExitCode, Error> {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reaped) = *rx.borrow() {
                return reaped.into_result();
            }
            rx.changed().await.map_err(|_| Error::Interrupted)?;
        }
    }

    /// Waits up to `limit`, returning None on expiry. Resolves as
    /// soon as the latch fires, not at the end of the window.
    pub(crate) async fn wait_timeout(&self, limit: Duration) -> Result<Option<ExitCode>, Error> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    /// Sends `signal` once. After exit, or once the same signal was
    /// already sent, this is a no-op.
    pub(crate) fn send_signal(&self, signal: DestroySignal) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if inner.reaped.is_some() {
            return Ok(());
        }
        let sent = match signal {
            DestroySignal::Term => &mut inner.flags.term_sent,
            DestroySignal::Kill => &mut inner.flags.kill_sent,
        };
        if *sent {
            return Ok(());
        }
        *sent = true;
        let raw = match signal {
            DestroySignal::Term => Signal::SIGTERM,
            DestroySignal::Kill => Signal::SIGKILL,
        };
        tracing::debug!(pid = self.pid, signal = ?raw, "destroying child");
        match kill(nix::unistd::Pid::from_raw(self.pid), raw) {
            Ok(()) => Ok(()),
            // child exited between the latch check and the signal
            Err(err) if err.as_errno() == Some(nix::errno::Errno::ESRCH) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Runs on a blocking thread until the child is collected.
    /// All stdio the child wrote before exiting stays readable from
    /// the parent pipe ends, the latch only reports the exit code.
    pub(crate) fn reap(&self) {
        if let Err(code) = wait_exited_nowait(self.pid) {
            tracing::error!(pid = self.pid, code, "observing child exit failed");
            self.publish(Reaped::Failed(code));
            return;
        }
        let reaped = {
            let mut inner = self.inner.lock().unwrap();
            let reaped = collect_status(self.pid);
            inner.reaped = Some(reaped);
            reaped
        };
        tracing::debug!(pid = self.pid, status = ?reaped, "child reaped");
        let _ = self.tx.send(Some(reaped));
    }

    fn publish(&self, reaped: Reaped) {
        self.inner.lock().unwrap().reaped = Some(reaped);
        let _ = self.tx.send(Some(reaped));
    }
}

/// Blocks until the child changed state, without reaping it. The
/// pid stays valid afterwards, the actual reap happens under the
/// lifecycle lock.
fn wait_exited_nowait(pid: Pid) -> Result<(), i32> {
    let mut info = MaybeUninit::<libc::siginfo_t>::zeroed();
    loop {
        let ret = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                info.as_mut_ptr(),
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if ret == 0 {
            return Ok(());
        }
        let code = get_last_error();
        if code != libc::EINTR {
            return Err(code);
        }
    }
}

fn collect_status(pid: Pid) -> Reaped {
    loop {
        match waitpid(nix::unistd::Pid::from_raw(pid), None) {
            Ok(WaitStatus::Exited(_, code)) => return Reaped::Code(ExitCode(code.into())),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Reaped::Code(ExitCode::from_signal(signal as i32))
            }
            Ok(_) => continue,
            Err(err) if err.as_errno() == Some(nix::errno::Errno::EINTR) => continue,
            Err(err) => {
                let code = err.as_errno().map(|e| e as i32).unwrap_or(0);
                tracing::error!(pid, code, "reaping child failed");
                return Reaped::Failed(code);
            }
        }
    }
}
