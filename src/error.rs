#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("command not found")]
    CommandNotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("spawn system call failed (error code {})", code)]
    Spawn { code: i32 },
    #[error("child-side {} failed before exec (error code {})", op, code)]
    ChildSetup { op: &'static str, code: i32 },
    #[error("system call failed in undesired fashion (error code {})", code)]
    Syscall { code: i32 },
    #[error("io error")]
    Io {
        #[from]
        cause: std::io::Error,
    },
    #[error("process hasn't exited")]
    NotExited,
    #[error("stream was already taken or was not piped")]
    StreamTaken,
    #[error("invalid argument: {}", what)]
    InvalidArgument { what: &'static str },
    #[error("wait was interrupted")]
    Interrupted,
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        if let Some(errno) = err.as_errno() {
            Error::Syscall { code: errno as i32 }
        } else {
            Error::Syscall { code: 0 }
        }
    }
}
