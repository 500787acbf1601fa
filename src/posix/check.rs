//! Platform capability probes
use once_cell::sync::Lazy;

pub(crate) type AddChdirFn = unsafe extern "C" fn(
    actions: *mut libc::posix_spawn_file_actions_t,
    path: *const libc::c_char,
) -> libc::c_int;

// addchdir is too new to link against directly (glibc 2.29, macOS
// 10.15, Android API 34), so it is looked up at runtime.
static ADDCHDIR: Lazy<Option<AddChdirFn>> = Lazy::new(|| unsafe {
    let name = b"posix_spawn_file_actions_addchdir_np\0";
    let sym = libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr() as *const libc::c_char);
    if sym.is_null() {
        None
    } else {
        Some(std::mem::transmute::<*mut libc::c_void, AddChdirFn>(sym))
    }
});

pub(crate) fn addchdir_np() -> Option<AddChdirFn> {
    *ADDCHDIR
}

#[cfg(target_os = "android")]
static API_LEVEL: Lazy<i32> = Lazy::new(|| unsafe {
    // PROP_VALUE_MAX is 92
    let mut value = [0 as libc::c_char; 92];
    let name = b"ro.build.version.sdk\0";
    let len = libc::__system_property_get(
        name.as_ptr() as *const libc::c_char,
        value.as_mut_ptr(),
    );
    if len <= 0 {
        return 0;
    }
    let bytes = std::slice::from_raw_parts(value.as_ptr() as *const u8, len as usize);
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
});

/// Checks whether this platform can serve spawn requests through
/// `posix_spawn`.
pub fn posix_spawn_supported() -> bool {
    posix_spawn_usable(false)
}

pub(crate) fn posix_spawn_usable(needs_chdir: bool) -> bool {
    #[cfg(target_os = "android")]
    {
        let api = *API_LEVEL;
        if api < 28 {
            return false;
        }
        if needs_chdir && api < 34 {
            return false;
        }
    }
    if needs_chdir && addchdir_np().is_none() {
        return false;
    }
    true
}

/// Checks whether pipe ends can be created with close-on-exec
/// atomically.
pub fn pipe2_supported() -> bool {
    cfg!(any(target_os = "linux", target_os = "android"))
}

/// `crate::check()` on POSIX platforms
pub fn check(res: &mut crate::CheckResult) {
    if !crate::null_device().exists() {
        res.error("null device is missing, null redirections cannot be opened");
    }
    if !posix_spawn_supported() {
        res.warning("posix_spawn not usable, children are started with fork+exec");
    }
    if !posix_spawn_usable(true) {
        res.warning(
            "posix_spawn cannot change the working directory here, \
             recipes with a cwd fall back to fork+exec",
        );
    }
    if !pipe2_supported() {
        res.warning("pipe2 not available, pipe creation is not atomic");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_do_not_panic() {
        let _ = posix_spawn_supported();
        let _ = posix_spawn_usable(true);
        let _ = pipe2_supported();
    }
}
