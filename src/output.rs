//! Run-to-completion helper: feed stdin, drain stdout and stderr
//! into bounded buffers, wait for exit
use crate::ExitCode;
use std::time::Duration;

const DEFAULT_MAX_SIZE: usize = 1024 * 1024;

/// Options for collecting a command's output
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Bytes written to child stdin before it is closed. The
    /// buffer is zeroed once dispatched.
    pub input: Option<Vec<u8>>,
    /// Ceiling for collected stdout, in bytes
    pub max_stdout_size: usize,
    /// Ceiling for collected stderr, in bytes
    pub max_stderr_size: usize,
    /// Overall deadline. On expiry the child is destroyed and the
    /// result carries no exit code.
    pub timeout: Option<Duration>,
    /// Grace period between the destroy signal and SIGKILL
    pub kill_grace: Duration,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            input: None,
            max_stdout_size: DEFAULT_MAX_SIZE,
            max_stderr_size: DEFAULT_MAX_SIZE,
            timeout: None,
            kill_grace: Duration::from_millis(500),
        }
    }
}

/// Collected result of a completed (or timed out) command
#[derive(Debug, Clone)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    /// None when the run was cut short by the timeout
    pub exit_code: Option<ExitCode>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

#[cfg(unix)]
pub(crate) use imp::run;

#[cfg(unix)]
mod imp {
    use super::{Output, OutputOptions};
    use crate::{
        posix::{self, PosixChildProcess, ReadPipe},
        Error, ExitCode, LaunchOptions, LineReader, OutputFeedBuffer, Stdio, StdioSpec,
    };
    use tokio::io::AsyncWriteExt;

    pub(crate) async fn run(
        mut launch: LaunchOptions,
        options: OutputOptions,
    ) -> Result<Output, Error> {
        // the driver owns all three streams
        launch.stdio = StdioSpec {
            stdin: Stdio::Pipe,
            stdout: Stdio::Pipe,
            stderr: Stdio::Pipe,
        };
        let mut child = posix::spawn(launch)?;
        let mut stdin = child.stdin().ok_or(Error::StreamTaken)?;
        let stdout = child.stdout().ok_or(Error::StreamTaken)?;
        let stderr = child.stderr().ok_or(Error::StreamTaken)?;

        let input = options.input;
        let feed = async move {
            if let Some(mut bytes) = input {
                let written = stdin.write_all(&bytes).await;
                for byte in bytes.iter_mut() {
                    *byte = 0;
                }
                match written {
                    Ok(()) => {}
                    // the child is free to exit without reading
                    Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(err) => return Err(Error::from(err)),
                }
            }
            stdin.shutdown().await.map_err(Error::from)
        };

        let (fed, collected_out, collected_err, exit_code) = tokio::join!(
            feed,
            collect_stream(stdout, options.max_stdout_size),
            collect_stream(stderr, options.max_stderr_size),
            supervise(&child, options.timeout, options.kill_grace),
        );
        fed?;
        let (stdout, stdout_truncated) = collected_out?;
        let (stderr, stderr_truncated) = collected_err?;
        let exit_code = exit_code?;

        Ok(Output {
            stdout,
            stderr,
            exit_code,
            stdout_truncated,
            stderr_truncated,
        })
    }

    async fn collect_stream(
        pipe: ReadPipe,
        max_size: usize,
    ) -> Result<(String, bool), Error> {
        let mut reader = LineReader::new(pipe);
        let mut buffer = OutputFeedBuffer::new(max_size);
        while let Some(line) = reader.next_line().await? {
            buffer.on_line(Some(&line));
        }
        buffer.on_line(None);
        let truncated = buffer.max_size_exceeded();
        Ok((buffer.do_final(), truncated))
    }

    async fn supervise(
        child: &PosixChildProcess,
        timeout: Option<std::time::Duration>,
        kill_grace: std::time::Duration,
    ) -> Result<Option<ExitCode>, Error> {
        let limit = match timeout {
            None => return child.wait().await.map(Some),
            Some(limit) => limit,
        };
        if let Some(code) = child.wait_timeout(limit).await? {
            return Ok(Some(code));
        }
        tracing::debug!(pid = child.pid(), "deadline expired, destroying child");
        child.destroy()?;
        if child.wait_timeout(kill_grace).await?.is_none() {
            child.destroy_forcibly()?;
            child.wait().await?;
        }
        Ok(None)
    }
}
