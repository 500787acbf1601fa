//! POSIX backend: pipe plumbing, the dual spawn strategy and the
//! process handle
pub mod check;
mod fd;
mod path;
mod pipe;
mod spawn;
mod util;
mod wait;

use crate::{
    Backend, ChildProcess, DestroySignal, Error, ExitCode, LaunchOptions, Stdio,
};
use fd::Fd;
use spawn::StdioPlan;
use std::{os::unix::io::AsRawFd, sync::Arc, time::Duration};
use wait::Lifecycle;

pub use pipe::{ReadPipe, WritePipe};

pub struct PosixChildProcess {
    lifecycle: Arc<Lifecycle>,
    destroy_signal: DestroySignal,
    stdin: Option<WritePipe>,
    stdout: Option<ReadPipe>,
    stderr: Option<ReadPipe>,
}

impl std::fmt::Debug for PosixChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PosixChildProcess")
            .field("pid", &self.lifecycle.pid())
            .field("alive", &self.lifecycle.is_alive())
            .finish()
    }
}

impl PosixChildProcess {
    pub fn pid(&self) -> u32 {
        self.lifecycle.pid() as u32
    }

    pub fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    /// Non-blocking exit code query, fails while the child runs
    pub fn exit_code(&self) -> Result<ExitCode, Error> {
        self.lifecycle.exit_code()
    }

    /// Resolves once the child has been reaped
    pub async fn wait(&self) -> Result<ExitCode, Error> {
        self.lifecycle.wait().await
    }

    /// Waits up to `limit`. Returns None on expiry, the code as
    /// soon as the child exits.
    pub async fn wait_timeout(&self, limit: Duration) -> Result<Option<ExitCode>, Error> {
        self.lifecycle.wait_timeout(limit).await
    }

    /// Sends the configured destroy signal once
    pub fn destroy(&self) -> Result<(), Error> {
        self.lifecycle.send_signal(self.destroy_signal)
    }

    /// Sends SIGKILL once
    pub fn destroy_forcibly(&self) -> Result<(), Error> {
        self.lifecycle.send_signal(DestroySignal::Kill)
    }

    pub fn stdin(&mut self) -> Option<WritePipe> {
        self.stdin.take()
    }

    pub fn stdout(&mut self) -> Option<ReadPipe> {
        self.stdout.take()
    }

    pub fn stderr(&mut self) -> Option<ReadPipe> {
        self.stderr.take()
    }
}

impl ChildProcess for PosixChildProcess {
    type Error = Error;
    type Stdin = WritePipe;
    type Stdout = ReadPipe;
    type WaitFuture = futures_util::future::BoxFuture<'static, Result<ExitCode, Error>>;

    fn pid(&self) -> u32 {
        PosixChildProcess::pid(self)
    }

    fn is_alive(&self) -> bool {
        PosixChildProcess::is_alive(self)
    }

    fn exit_code(&self) -> Result<ExitCode, Error> {
        PosixChildProcess::exit_code(self)
    }

    fn wait_for_exit(&self) -> Self::WaitFuture {
        let lifecycle = self.lifecycle.clone();
        Box::pin(async move { lifecycle.wait().await })
    }

    fn destroy(&self) -> Result<(), Error> {
        PosixChildProcess::destroy(self)
    }

    fn destroy_forcibly(&self) -> Result<(), Error> {
        PosixChildProcess::destroy_forcibly(self)
    }

    fn stdin(&mut self) -> Option<WritePipe> {
        self.stdin.take()
    }

    fn stdout(&mut self) -> Option<ReadPipe> {
        self.stdout.take()
    }

    fn stderr(&mut self) -> Option<ReadPipe> {
        self.stderr.take()
    }
}

fn handle_input_io(spec: &Stdio) -> Result<(Option<WritePipe>, Option<Fd>), Error> {
    match spec {
        Stdio::Inherit => Ok((None, None)),
        Stdio::Pipe => {
            let pair = pipe::setup_pipe()?;
            let parent = WritePipe::new(pair.write)?;
            Ok((Some(parent), Some(pair.read)))
        }
        Stdio::File { path, .. } => {
            let file = Fd::open_read(path)?;
            Ok((None, Some(file)))
        }
    }
}

fn handle_output_io(spec: &Stdio) -> Result<(Option<ReadPipe>, Option<Fd>), Error> {
    match spec {
        Stdio::Inherit => Ok((None, None)),
        Stdio::Pipe => {
            let pair = pipe::setup_pipe()?;
            let parent = ReadPipe::new(pair.read)?;
            Ok((Some(parent), Some(pair.write)))
        }
        Stdio::File { path, append } => {
            let file = Fd::open_write(path, *append)?;
            Ok((None, Some(file)))
        }
    }
}

/// Spawns a child according to `options`.
///
/// Must be called within a tokio runtime: parent pipe ends register
/// with the reactor and the reaper runs as a blocking task.
/// Panics when no runtime is available.
#[tracing::instrument(skip(options), fields(program = ?options.program))]
pub fn spawn(options: LaunchOptions) -> Result<PosixChildProcess, Error> {
    let program = path::resolve_program(&options.program)?;
    let (stdin_parent, stdin_child) = handle_input_io(&options.stdio.stdin)?;
    let (stdout_parent, stdout_child) = handle_output_io(&options.stdio.stdout)?;
    let (stderr_parent, stderr_child) = handle_output_io(&options.stdio.stderr)?;

    let mut plan = StdioPlan { dup2: Vec::new() };
    if let Some(fd) = &stdin_child {
        plan.dup2.push((fd.as_raw_fd(), 0));
    }
    if let Some(fd) = &stdout_child {
        plan.dup2.push((fd.as_raw_fd(), 1));
    }
    if let Some(fd) = &stderr_child {
        plan.dup2.push((fd.as_raw_fd(), 2));
    }

    let pid = spawn::spawn_child(&options, &program, &plan)?;

    // the child owns its copies now, release the child-side ends
    drop(stdin_child);
    drop(stdout_child);
    drop(stderr_child);

    let lifecycle = Arc::new(Lifecycle::new(pid));
    let reaper = lifecycle.clone();
    tokio::task::spawn_blocking(move || reaper.reap());
    tracing::debug!(pid, "child started");

    Ok(PosixChildProcess {
        lifecycle,
        destroy_signal: options.destroy_signal,
        stdin: stdin_parent,
        stdout: stdout_parent,
        stderr: stderr_parent,
    })
}

/// Native backend for POSIX platforms
#[derive(Debug, Default)]
pub struct PosixBackend;

impl PosixBackend {
    pub fn new() -> PosixBackend {
        PosixBackend
    }
}

impl Backend for PosixBackend {
    type Error = Error;
    type ChildProcess = PosixChildProcess;

    fn spawn(&self, options: LaunchOptions) -> Result<PosixChildProcess, Error> {
        spawn(options)
    }
}
