pub(crate) type Pid = libc::pid_t;

pub(crate) fn get_last_error() -> i32 {
    errno::errno().0
}

pub(crate) fn cvt_error(n: nix::Error) -> std::io::Error {
    match n {
        nix::Error::Sys(sys) => std::io::Error::from_raw_os_error(sys as i32),
        other => std::io::Error::new(std::io::ErrorKind::Other, other),
    }
}
