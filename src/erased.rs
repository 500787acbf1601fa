//! Contains the type-erased API.
//! Useful for trait objects and for backends living outside this
//! crate.
//!
//! # Backend contracts
//! Every backend satisfies the same process contract through these
//! traits:
//!
//! * A Windows backend spawns via `CreateProcessW`, honoring
//!   `windows_hide` (hidden console window) and
//!   `windows_verbatim_arguments` (no quoting), serves pipe ends
//!   with overlapped I/O, uses `TerminateProcess` for
//!   `destroy_forcibly` and a console ctrl event or graceful close
//!   for `destroy`.
//! * A JVM backend wraps `java.lang.ProcessBuilder`, mapping the
//!   null device to `NUL` or `/dev/null` and `Redirect.DISCARD`
//!   where available.
//! * A Node backend wraps `child_process.spawn` with the `shell`,
//!   `windowsHide` and `windowsVerbatimArguments` options. Stdin
//!   writes follow the explicit `write` then `drain` event pair,
//!   a full pipe leaves the write pending instead of failing it.
//!   Readable `data` events feed the line scanner, `close` emits
//!   end of feed.
use crate::{ExitCode, LaunchOptions};
use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Type-erased `ChildProcess`
pub trait ChildProcess: Send + Sync {
    fn pid(&self) -> u32;
    fn is_alive(&self) -> bool;
    fn exit_code(&self) -> anyhow::Result<ExitCode>;
    fn wait_for_exit(&self) -> BoxFuture<'static, anyhow::Result<ExitCode>>;
    fn wait_for_exit_timeout(
        &self,
        limit: Duration,
    ) -> BoxFuture<'static, anyhow::Result<Option<ExitCode>>>;
    fn destroy(&self) -> anyhow::Result<()>;
    fn destroy_forcibly(&self) -> anyhow::Result<()>;
    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Send + Unpin + 'static>>;
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin + 'static>>;
    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin + 'static>>;
}

impl<C: crate::ChildProcess> ChildProcess for C {
    fn pid(&self) -> u32 {
        crate::ChildProcess::pid(self)
    }

    fn is_alive(&self) -> bool {
        crate::ChildProcess::is_alive(self)
    }

    fn exit_code(&self) -> anyhow::Result<ExitCode> {
        crate::ChildProcess::exit_code(self).map_err(Into::into)
    }

    fn wait_for_exit(&self) -> BoxFuture<'static, anyhow::Result<ExitCode>> {
        let wait = crate::ChildProcess::wait_for_exit(self);
        Box::pin(async move { wait.await.map_err(Into::into) })
    }

    fn wait_for_exit_timeout(
        &self,
        limit: Duration,
    ) -> BoxFuture<'static, anyhow::Result<Option<ExitCode>>> {
        let wait = crate::ChildProcess::wait_for_exit(self);
        Box::pin(async move {
            match tokio::time::timeout(limit, wait).await {
                Ok(result) => result.map(Some).map_err(Into::into),
                Err(_elapsed) => Ok(None),
            }
        })
    }

    fn destroy(&self) -> anyhow::Result<()> {
        crate::ChildProcess::destroy(self).map_err(Into::into)
    }

    fn destroy_forcibly(&self) -> anyhow::Result<()> {
        crate::ChildProcess::destroy_forcibly(self).map_err(Into::into)
    }

    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Send + Unpin + 'static>> {
        match crate::ChildProcess::stdin(self) {
            Some(s) => Some(Box::new(s)),
            None => None,
        }
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin + 'static>> {
        match crate::ChildProcess::stdout(self) {
            Some(s) => Some(Box::new(s)),
            None => None,
        }
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin + 'static>> {
        match crate::ChildProcess::stderr(self) {
            Some(s) => Some(Box::new(s)),
            None => None,
        }
    }
}

/// Type-erased `Backend`
pub trait Backend {
    fn spawn(&self, options: LaunchOptions) -> anyhow::Result<Box<dyn ChildProcess>>;
}

impl<B: crate::Backend> Backend for B {
    fn spawn(&self, options: LaunchOptions) -> anyhow::Result<Box<dyn ChildProcess>> {
        let child = <Self as crate::Backend>::spawn(self, options)?;
        Ok(Box::new(child))
    }
}

/// Returns backend instance for the compiling platform
#[cfg(unix)]
pub fn setup() -> anyhow::Result<Box<dyn Backend>> {
    Ok(Box::new(crate::posix::PosixBackend::new()))
}
