/*!
 * This crate provides ability to launch child processes, wire up their
 * standard streams and observe their lifecycle.
 *
 * # Platform support
 * The POSIX backend ships with this crate. Other platforms (Windows,
 * Node, JVM) plug in through the [`ChildProcess`] and [`Backend`]
 * contracts, see the `erased` module.
 *
 * # Runtime
 * Spawning with piped stdio and waiting are built on tokio. `spawn`
 * must be called from within a tokio runtime context.
 */
mod command;
mod error;
mod feed;
mod output;
mod scanner;
mod stdio;

#[cfg(unix)]
pub mod posix;

pub mod erased;

mod check;
pub use check::{check, CheckResult};

pub use command::{Command, LaunchOptions, Shell};
pub use error::Error;
pub use feed::OutputFeedBuffer;
pub use output::{Output, OutputOptions};
pub use scanner::{LineReader, LineScanner};
pub use stdio::{null_device, Stdio, StdioSpec};

#[cfg(unix)]
pub use crate::posix::{PosixBackend, PosixChildProcess, ReadPipe, WritePipe};

use serde::{Deserialize, Serialize};
use std::{error::Error as StdError, fmt::Debug, future::Future};

/// Represents a way of spawning child processes
pub trait Backend: Debug + Send + Sync + 'static {
    type Error: StdError + Send + Sync + 'static;
    type ChildProcess: ChildProcess<Error = Self::Error>;
    fn spawn(&self, options: LaunchOptions) -> Result<Self::ChildProcess, Self::Error>;
}

/// Signal sent by `destroy()`.
///
/// `Term` asks the child to shut down gracefully, `Kill` cannot be
/// caught or ignored. `destroy_forcibly()` always sends `Kill`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum DestroySignal {
    Term,
    Kill,
}

impl Default for DestroySignal {
    fn default() -> Self {
        DestroySignal::Term
    }
}

/// Child process exit code.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ExitCode(pub i64);

impl ExitCode {
    /// By convention program returns this code on success
    pub const OK: ExitCode = ExitCode(0);
    /// Death by signal is reported as `SIGNAL_BASE + signal number`
    pub const SIGNAL_BASE: i64 = 128;
}

impl ExitCode {
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Exit code reported for a child terminated by `signal`
    pub fn from_signal(signal: i32) -> ExitCode {
        ExitCode(Self::SIGNAL_BASE + i64::from(signal))
    }

    /// Signal number if this code reports death by signal
    pub fn signal(self) -> Option<i32> {
        if self.0 > Self::SIGNAL_BASE && self.0 <= Self::SIGNAL_BASE + 64 {
            Some((self.0 - Self::SIGNAL_BASE) as i32)
        } else {
            None
        }
    }
}

/// Represents a running or exited child process.
///
/// Streams are handed out at most once: the first call to `stdin`,
/// `stdout` or `stderr` returns the pipe end if the corresponding
/// stdio item was `Stdio::Pipe`, all subsequent calls return None.
pub trait ChildProcess: Debug + Send + Sync + 'static {
    type Error: StdError + Send + Sync + 'static;
    /// Represents pipe from current process to the child
    type Stdin: tokio::io::AsyncWrite + Send + Unpin + 'static;
    /// Represents pipe from the child to current process
    type Stdout: tokio::io::AsyncRead + Send + Unpin + 'static;
    /// Future for the `wait_for_exit` method. Resolves when the child
    /// has been reaped and the exit code latch is set.
    type WaitFuture: Future<Output = Result<ExitCode, Self::Error>> + Send + 'static;

    /// Process id, stable across the process lifetime
    fn pid(&self) -> u32;

    /// Returns false once the exit code latch has been set
    fn is_alive(&self) -> bool;

    /// Non-blocking exit code query.
    /// Fails if the process has not exited yet.
    fn exit_code(&self) -> Result<ExitCode, Self::Error>;

    /// Returns a future that resolves when the process exits.
    /// May be called any number of times.
    fn wait_for_exit(&self) -> Self::WaitFuture;

    /// Sends the configured destroy signal once.
    /// Returns immediately, no-op after exit.
    fn destroy(&self) -> Result<(), Self::Error>;

    /// Sends SIGKILL (or the platform equivalent) once.
    /// Returns immediately, no-op after exit.
    fn destroy_forcibly(&self) -> Result<(), Self::Error>;

    /// Returns writeable stream, connected to child stdin
    fn stdin(&mut self) -> Option<Self::Stdin>;

    /// Returns readable stream, connected to child stdout
    fn stdout(&mut self) -> Option<Self::Stdout>;

    /// Returns readable stream, connected to child stderr
    fn stderr(&mut self) -> Option<Self::Stdout>;
}
