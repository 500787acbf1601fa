use crate::{posix::util::cvt_error, Error};
use nix::{
    fcntl::{fcntl, open, FcntlArg, FdFlag, OFlag},
    sys::stat::Mode,
};
use std::{
    io,
    os::unix::prelude::{AsRawFd, RawFd},
    path::Path,
};

/// Represents owned file descriptor.
///
/// The underlying handle is released exactly once, either by an
/// explicit `close` or on drop. A second `close` reports `EBADF`
/// without touching the (possibly recycled) descriptor number.
#[derive(Debug)]
pub(crate) struct Fd {
    inner: RawFd,
    closed: bool,
}

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.inner
    }
}

impl Fd {
    pub(crate) fn new(inner: RawFd) -> Self {
        Fd {
            inner,
            closed: false,
        }
    }

    /// Raw descriptor for syscall use, fails once closed
    pub(crate) fn as_raw(&self) -> io::Result<RawFd> {
        if self.closed {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        Ok(self.inner)
    }

    /// Opens `path` for reading, for child stdin
    pub(crate) fn open_read(path: &Path) -> Result<Self, Error> {
        let raw = open(path, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
            .map_err(|err| Error::Io {
                cause: cvt_error(err),
            })?;
        Ok(Fd::new(raw))
    }

    /// Opens `path` for writing, for child stdout or stderr.
    /// Truncates unless `append` is set.
    pub(crate) fn open_write(path: &Path, append: bool) -> Result<Self, Error> {
        let disposition = if append { OFlag::O_APPEND } else { OFlag::O_TRUNC };
        let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
        let raw = open(
            path,
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_CLOEXEC | disposition,
            mode,
        )
        .map_err(|err| Error::Io {
            cause: cvt_error(err),
        })?;
        Ok(Fd::new(raw))
    }

    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(self.as_raw()?, buf).map_err(cvt_error)
    }

    pub(crate) fn set_nonblocking(&self) -> Result<(), Error> {
        let raw = self.as_raw().map_err(|cause| Error::Io { cause })?;
        let bits = fcntl(raw, FcntlArg::F_GETFL)?;
        let flags = OFlag::from_bits_truncate(bits) | OFlag::O_NONBLOCK;
        fcntl(raw, FcntlArg::F_SETFL(flags))?;
        Ok(())
    }

    #[cfg_attr(any(target_os = "linux", target_os = "android"), allow(dead_code))]
    pub(crate) fn set_cloexec(&self) -> Result<(), Error> {
        let raw = self.as_raw().map_err(|cause| Error::Io { cause })?;
        fcntl(raw, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
        Ok(())
    }

    pub(crate) fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        self.closed = true;
        nix::unistd::close(self.inner).map_err(cvt_error)
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = nix::unistd::close(self.inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let mut fd = Fd::open_read(Path::new("/dev/null")).unwrap();
        assert!(fd.close().is_ok());
        let again = fd.close().unwrap_err();
        assert_eq!(again.raw_os_error(), Some(libc::EBADF));
        assert!(fd.as_raw().is_err());
    }

    #[test]
    fn open_missing_file_reports_io_error() {
        let err = Fd::open_read(Path::new("/definitely/not/here")).unwrap_err();
        match err {
            Error::Io { cause } => {
                assert_eq!(cause.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
