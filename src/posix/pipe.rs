use crate::{
    posix::{
        fd::Fd,
        util::{cvt_error, get_last_error},
    },
    Error,
};
use futures_util::ready;
use std::{
    io,
    os::unix::io::AsRawFd,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::{unix::AsyncFd, AsyncRead, AsyncWrite, ReadBuf};

/// Both ends of one OS pipe, close-on-exec set on each
pub(crate) struct PipePair {
    pub(crate) read: Fd,
    pub(crate) write: Fd,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn setup_pipe() -> Result<PipePair, Error> {
    unsafe {
        let mut ends = [0; 2];
        if libc::pipe2(ends.as_mut_ptr(), libc::O_CLOEXEC) == -1 {
            return Err(Error::Syscall {
                code: get_last_error(),
            });
        }
        Ok(PipePair {
            read: Fd::new(ends[0]),
            write: Fd::new(ends[1]),
        })
    }
}

/// Darwin has no pipe2. The two-step fallback is not atomic, a
/// concurrent fork elsewhere in the process can observe the ends
/// before close-on-exec is set.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) fn setup_pipe() -> Result<PipePair, Error> {
    unsafe {
        let mut ends = [0; 2];
        if libc::pipe(ends.as_mut_ptr()) == -1 {
            return Err(Error::Syscall {
                code: get_last_error(),
            });
        }
        let pair = PipePair {
            read: Fd::new(ends[0]),
            write: Fd::new(ends[1]),
        };
        pair.read.set_cloexec()?;
        pair.write.set_cloexec()?;
        Ok(pair)
    }
}

fn closed_error() -> io::Error {
    io::Error::from_raw_os_error(libc::EBADF)
}

/// Parent-side read end of a child stdout or stderr pipe
#[derive(Debug)]
pub struct ReadPipe {
    inner: AsyncFd<Fd>,
}

impl ReadPipe {
    pub(crate) fn new(fd: Fd) -> Result<ReadPipe, Error> {
        fd.set_nonblocking()?;
        Ok(ReadPipe {
            inner: AsyncFd::new(fd)?,
        })
    }
}

impl AsyncRead for ReadPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            let mut guard = ready!(this.inner.poll_read_ready(cx))?;
            match guard.try_io(|afd| {
                nix::unistd::read(afd.get_ref().as_raw_fd(), buf.initialize_unfilled())
                    .map_err(cvt_error)
            }) {
                Ok(Ok(count)) => {
                    buf.advance(count);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

/// Parent-side write end of a child stdin pipe.
///
/// Shutting down closes the descriptor so the child observes EOF.
#[derive(Debug)]
pub struct WritePipe {
    inner: Option<AsyncFd<Fd>>,
}

impl WritePipe {
    pub(crate) fn new(fd: Fd) -> Result<WritePipe, Error> {
        fd.set_nonblocking()?;
        Ok(WritePipe {
            inner: Some(AsyncFd::new(fd)?),
        })
    }

}

impl AsyncWrite for WritePipe {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let inner = match this.inner.as_ref() {
            Some(inner) => inner,
            None => return Poll::Ready(Err(closed_error())),
        };
        loop {
            let mut guard = ready!(inner.poll_write_ready(cx))?;
            match guard.try_io(|afd| {
                nix::unistd::write(afd.get_ref().as_raw_fd(), data).map_err(cvt_error)
            }) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // pipe writes are not buffered in the parent
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.inner.take() {
            Some(afd) => Poll::Ready(afd.into_inner().close()),
            // second shutdown is a no-op
            None => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn round_trip_through_both_ends() {
        let pair = setup_pipe().unwrap();
        let mut reader = ReadPipe::new(pair.read).unwrap();
        let mut writer = WritePipe::new(pair.write).unwrap();
        writer.write_all(b"payload").await.unwrap();
        writer.shutdown().await.unwrap();
        let mut got = Vec::new();
        reader.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"payload");
    }

    #[tokio::test]
    async fn write_after_shutdown_fails() {
        let pair = setup_pipe().unwrap();
        let _reader = ReadPipe::new(pair.read).unwrap();
        let mut writer = WritePipe::new(pair.write).unwrap();
        writer.shutdown().await.unwrap();
        let err = writer.write_all(b"x").await.unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[tokio::test]
    async fn reader_sees_eof_after_writer_drop() {
        let pair = setup_pipe().unwrap();
        let mut reader = ReadPipe::new(pair.read).unwrap();
        {
            let mut writer = WritePipe::new(pair.write).unwrap();
            writer.write_all(b"x").await.unwrap();
        }
        let mut got = Vec::new();
        reader.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"x");
    }
}
