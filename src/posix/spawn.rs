//! posix_spawn and fork+exec drivers
use crate::{
    posix::{
        check,
        fd::Fd,
        pipe::setup_pipe,
        util::{get_last_error, Pid},
    },
    Error, LaunchOptions,
};
use std::{
    ffi::{CString, OsStr, OsString},
    mem::MaybeUninit,
    os::unix::{ffi::OsStrExt, io::{AsRawFd, RawFd}},
    path::Path,
    ptr,
};

/// dup2 actions executed in the child before exec, sources are
/// closed afterwards
pub(crate) struct StdioPlan {
    pub(crate) dup2: Vec<(RawFd, RawFd)>,
}

// A failing child reports the errno over the status pipe and exits
// with one of these codes. 126 and 127 follow shell conventions.
const EXIT_SETUP: i32 = 125;
const EXIT_CHDIR: i32 = 126;
const EXIT_EXEC: i32 = 127;

const OP_SETUP: u8 = 1;
const OP_CHDIR: u8 = 2;
const OP_EXEC: u8 = 3;

fn to_cstring(s: &OsStr) -> Result<CString, Error> {
    CString::new(s.as_bytes()).map_err(|_| Error::InvalidArgument {
        what: "NUL byte in launch recipe",
    })
}

/// Owned NUL-terminated string array in execv layout
struct CStringArray {
    _items: Vec<CString>,
    ptrs: Vec<*mut libc::c_char>,
}

impl CStringArray {
    fn new(items: Vec<CString>) -> CStringArray {
        let mut ptrs: Vec<*mut libc::c_char> = items
            .iter()
            .map(|s| s.as_ptr() as *mut libc::c_char)
            .collect();
        ptrs.push(ptr::null_mut());
        CStringArray {
            _items: items,
            ptrs,
        }
    }

    fn as_ptr(&self) -> *const *mut libc::c_char {
        self.ptrs.as_ptr()
    }
}

fn make_argv(options: &LaunchOptions) -> Result<CStringArray, Error> {
    let mut items = Vec::with_capacity(options.args.len() + 1);
    items.push(to_cstring(&options.program)?);
    for arg in &options.args {
        items.push(to_cstring(arg)?);
    }
    Ok(CStringArray::new(items))
}

fn make_envp(options: &LaunchOptions) -> Result<CStringArray, Error> {
    let mut items = Vec::with_capacity(options.env.len());
    for (key, value) in &options.env {
        let mut entry = OsString::with_capacity(key.len() + value.len() + 1);
        entry.push(key);
        entry.push("=");
        entry.push(value);
        items.push(to_cstring(&entry)?);
    }
    Ok(CStringArray::new(items))
}

fn spawn_error(code: i32) -> Error {
    match code {
        libc::ENOENT => Error::CommandNotFound,
        libc::EACCES => Error::PermissionDenied,
        _ => Error::Spawn { code },
    }
}

fn cvt_spawn(ret: libc::c_int) -> Result<(), Error> {
    if ret == 0 {
        Ok(())
    } else {
        Err(spawn_error(ret))
    }
}

/// Starts the child for `options` with stdio wired per `plan`.
/// `program` is the resolved executable path.
pub(crate) fn spawn_child(
    options: &LaunchOptions,
    program: &Path,
    plan: &StdioPlan,
) -> Result<Pid, Error> {
    let program_c = to_cstring(program.as_os_str())?;
    let argv = make_argv(options)?;
    let envp = make_envp(options)?;
    let cwd = options
        .cwd
        .as_ref()
        .map(|dir| to_cstring(dir.as_os_str()))
        .transpose()?;

    let via_spawn = options.use_posix_spawn && check::posix_spawn_usable(cwd.is_some());
    tracing::debug!(
        program = ?program,
        strategy = if via_spawn { "posix_spawn" } else { "fork" },
        "starting child"
    );
    if via_spawn {
        unsafe { spawn_via_posix_spawn(&program_c, &argv, &envp, plan, cwd.as_ref()) }
    } else {
        unsafe { spawn_via_fork(&program_c, &argv, &envp, plan, cwd.as_ref()) }
    }
}

unsafe fn spawn_via_posix_spawn(
    path: &CString,
    argv: &CStringArray,
    envp: &CStringArray,
    plan: &StdioPlan,
    cwd: Option<&CString>,
) -> Result<Pid, Error> {
    let mut actions = MaybeUninit::<libc::posix_spawn_file_actions_t>::uninit();
    cvt_spawn(libc::posix_spawn_file_actions_init(actions.as_mut_ptr()))?;
    let mut attr = MaybeUninit::<libc::posix_spawnattr_t>::uninit();
    if let Err(err) = cvt_spawn(libc::posix_spawnattr_init(attr.as_mut_ptr())) {
        libc::posix_spawn_file_actions_destroy(actions.as_mut_ptr());
        return Err(err);
    }
    let result = spawn_prepared(path, argv, envp, plan, cwd, actions.as_mut_ptr(), attr.as_mut_ptr());
    libc::posix_spawn_file_actions_destroy(actions.as_mut_ptr());
    libc::posix_spawnattr_destroy(attr.as_mut_ptr());
    result
}

unsafe fn spawn_prepared(
    path: &CString,
    argv: &CStringArray,
    envp: &CStringArray,
    plan: &StdioPlan,
    cwd: Option<&CString>,
    actions: *mut libc::posix_spawn_file_actions_t,
    attr: *mut libc::posix_spawnattr_t,
) -> Result<Pid, Error> {
    for &(src, dst) in &plan.dup2 {
        cvt_spawn(libc::posix_spawn_file_actions_adddup2(actions, src, dst))?;
    }
    for &(src, _) in &plan.dup2 {
        if src > 2 {
            cvt_spawn(libc::posix_spawn_file_actions_addclose(actions, src))?;
        }
    }
    if let Some(cwd) = cwd {
        // strategy selection guarantees the symbol is present
        let addchdir = match check::addchdir_np() {
            Some(f) => f,
            None => return Err(Error::Spawn { code: libc::ENOSYS }),
        };
        cvt_spawn(addchdir(actions, cwd.as_ptr()))?;
    }

    let mut sigmask = MaybeUninit::<libc::sigset_t>::uninit();
    libc::sigemptyset(sigmask.as_mut_ptr());
    cvt_spawn(libc::posix_spawnattr_setsigmask(attr, sigmask.as_ptr()))?;
    // the runtime ignores SIGPIPE, the child must not inherit that
    let mut sigdefault = MaybeUninit::<libc::sigset_t>::uninit();
    libc::sigemptyset(sigdefault.as_mut_ptr());
    libc::sigaddset(sigdefault.as_mut_ptr(), libc::SIGPIPE);
    cvt_spawn(libc::posix_spawnattr_setsigdefault(attr, sigdefault.as_ptr()))?;
    cvt_spawn(libc::posix_spawnattr_setflags(
        attr,
        (libc::POSIX_SPAWN_SETSIGMASK | libc::POSIX_SPAWN_SETSIGDEF) as libc::c_short,
    ))?;

    let mut pid: Pid = 0;
    cvt_spawn(libc::posix_spawn(
        &mut pid,
        path.as_ptr(),
        actions,
        attr,
        argv.as_ptr(),
        envp.as_ptr(),
    ))?;
    Ok(pid)
}

unsafe fn spawn_via_fork(
    path: &CString,
    argv: &CStringArray,
    envp: &CStringArray,
    plan: &StdioPlan,
    cwd: Option<&CString>,
) -> Result<Pid, Error> {
    let status = setup_pipe()?;
    let status_write = status.write;
    let status_read = status.read;

    let pid = libc::fork();
    if pid < 0 {
        return Err(spawn_error(get_last_error()));
    }
    if pid == 0 {
        // child context: every allocation already happened in the
        // parent, from here on only async-signal-safe calls
        exec_child(path, argv, envp, plan, cwd, status_write.as_raw_fd())
    }
    drop(status_write);
    wait_child_status(pid, &status_read)
}

unsafe fn exec_child(
    path: &CString,
    argv: &CStringArray,
    envp: &CStringArray,
    plan: &StdioPlan,
    cwd: Option<&CString>,
    status_fd: RawFd,
) -> ! {
    let mut mask = MaybeUninit::<libc::sigset_t>::uninit();
    libc::sigemptyset(mask.as_mut_ptr());
    if libc::sigprocmask(libc::SIG_SETMASK, mask.as_ptr(), ptr::null_mut()) == -1 {
        child_fail(status_fd, OP_SETUP, EXIT_SETUP);
    }
    // the runtime ignores SIGPIPE, the child must not inherit that
    if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
        child_fail(status_fd, OP_SETUP, EXIT_SETUP);
    }
    if let Some(cwd) = cwd {
        if libc::chdir(cwd.as_ptr()) == -1 {
            child_fail(status_fd, OP_CHDIR, EXIT_CHDIR);
        }
    }
    for &(src, dst) in &plan.dup2 {
        loop {
            if libc::dup2(src, dst) != -1 {
                break;
            }
            if get_last_error() != libc::EINTR {
                child_fail(status_fd, OP_SETUP, EXIT_SETUP);
            }
        }
    }
    close_extra_fds(status_fd);
    libc::execv(path.as_ptr(), argv.as_ptr() as *const *const libc::c_char);
    child_fail(status_fd, OP_EXEC, EXIT_EXEC)
}

unsafe fn child_fail(status_fd: RawFd, op: u8, code: i32) -> ! {
    let err = get_last_error();
    let mut message = [0u8; 5];
    message[..4].copy_from_slice(&err.to_be_bytes());
    message[4] = op;
    // short pipe writes are atomic, nothing left to do on failure
    libc::write(
        status_fd,
        message.as_ptr() as *const libc::c_void,
        message.len(),
    );
    libc::_exit(code)
}

fn wait_child_status(pid: Pid, status_read: &Fd) -> Result<Pid, Error> {
    let mut message = [0u8; 5];
    let mut filled = 0;
    loop {
        match status_read.read(&mut message[filled..]) {
            Ok(0) => break,
            Ok(count) => {
                filled += count;
                if filled == message.len() {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                reap_failed_child(pid);
                return Err(err.into());
            }
        }
    }
    if filled == 0 {
        // close-on-exec fired, the exec succeeded
        return Ok(pid);
    }
    reap_failed_child(pid);
    if filled < message.len() {
        return Err(Error::ChildSetup {
            op: "status report",
            code: 0,
        });
    }
    let code = i32::from_be_bytes([message[0], message[1], message[2], message[3]]);
    Err(match message[4] {
        OP_EXEC => match code {
            libc::ENOENT => Error::CommandNotFound,
            libc::EACCES => Error::PermissionDenied,
            _ => Error::ChildSetup { op: "exec", code },
        },
        OP_CHDIR => Error::ChildSetup { op: "chdir", code },
        _ => Error::ChildSetup {
            op: "stdio setup",
            code,
        },
    })
}

fn reap_failed_child(pid: Pid) {
    let _ = nix::sys::wait::waitpid(nix::unistd::Pid::from_raw(pid), None);
}

/// Closes every descriptor above the standard three except `keep`.
/// Sweeps leaks that libraries opened without close-on-exec. Runs
/// between fork and exec, only async-signal-safe calls allowed.
unsafe fn close_extra_fds(keep: RawFd) {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        if close_fds_from_proc(keep) {
            return;
        }
    }
    close_fds_bounded(keep);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn close_fds_from_proc(keep: RawFd) -> bool {
    let dir = libc::open(
        b"/proc/self/fd\0".as_ptr() as *const libc::c_char,
        libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
    );
    if dir == -1 {
        return false;
    }
    let mut buf = [0u8; 1024];
    loop {
        let count = libc::syscall(
            libc::SYS_getdents64,
            dir,
            buf.as_mut_ptr(),
            buf.len(),
        );
        if count <= 0 {
            break;
        }
        let mut offset = 0usize;
        while offset < count as usize {
            let entry = buf.as_ptr().add(offset);
            // struct dirent64: d_reclen at 16, d_name at 19
            let reclen = ptr::read_unaligned(entry.add(16) as *const u16) as usize;
            if reclen == 0 {
                break;
            }
            if let Some(fd) = parse_fd_name(entry.add(19)) {
                if fd > 2 && fd != dir as RawFd && fd != keep {
                    libc::close(fd);
                }
            }
            offset += reclen;
        }
    }
    libc::close(dir as RawFd);
    true
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn parse_fd_name(mut name: *const u8) -> Option<RawFd> {
    let mut value: RawFd = 0;
    let mut seen = false;
    loop {
        let byte = *name;
        if byte == 0 {
            break;
        }
        if !byte.is_ascii_digit() {
            // "." and ".." entries
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add(RawFd::from(byte - b'0'))?;
        seen = true;
        name = name.add(1);
    }
    if seen {
        Some(value)
    } else {
        None
    }
}

/// Fallback for platforms without an fd directory: walk the fd
/// table up to the soft limit
unsafe fn close_fds_bounded(keep: RawFd) {
    const SWEEP_CEILING: libc::rlim_t = 65536;
    let mut limit = MaybeUninit::<libc::rlimit>::uninit();
    let ceiling: RawFd = if libc::getrlimit(libc::RLIMIT_NOFILE, limit.as_mut_ptr()) == 0 {
        let cur = limit.assume_init().rlim_cur;
        if cur < SWEEP_CEILING {
            cur as RawFd
        } else {
            SWEEP_CEILING as RawFd
        }
    } else {
        1024
    };
    let mut fd: RawFd = 3;
    while fd < ceiling {
        if fd != keep {
            libc::close(fd);
        }
        fd += 1;
    }
}
