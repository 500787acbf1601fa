use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Platform null device path.
///
/// Detected from the path separator so that backends without an OS
/// name at hand resolve the same canonical path.
pub fn null_device() -> &'static Path {
    if std::path::MAIN_SEPARATOR == '\\' {
        Path::new("NUL")
    } else {
        Path::new("/dev/null")
    }
}

fn is_null_alias(path: &Path) -> bool {
    if path == Path::new("/dev/null") {
        return true;
    }
    path.as_os_str().eq_ignore_ascii_case("nul")
}

/// Configures one standard stream of a child
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub enum Stdio {
    /// Child shares the corresponding stream of the current process
    Inherit,
    /// A pipe is allocated, the parent end is exposed on the process
    /// handle as an async stream
    Pipe,
    /// Stream is connected to a file.
    ///
    /// For stdout and stderr `append = false` truncates the file and
    /// `append = true` opens or creates it for appending. For stdin
    /// the flag is ignored.
    File { path: PathBuf, append: bool },
}

impl Stdio {
    /// File-backed stream. Null device aliases (`/dev/null`, `NUL`)
    /// are normalized to the canonical platform path.
    pub fn file(path: impl Into<PathBuf>, append: bool) -> Stdio {
        let path = path.into();
        if is_null_alias(&path) {
            return Stdio::File {
                path: null_device().to_path_buf(),
                append,
            };
        }
        Stdio::File { path, append }
    }

    /// Stream discarded into the null device
    pub fn null() -> Stdio {
        Stdio::File {
            path: null_device().to_path_buf(),
            append: false,
        }
    }
}

impl Default for Stdio {
    fn default() -> Self {
        Stdio::Inherit
    }
}

/// Specifies how to provide child stdio
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StdioSpec {
    pub stdin: Stdio,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_aliases_normalize() {
        let dev = Stdio::file("/dev/null", false);
        let nul = Stdio::file("NUL", false);
        let lower = Stdio::file("nul", true);
        let want = null_device().to_path_buf();
        assert_eq!(
            dev,
            Stdio::File {
                path: want.clone(),
                append: false
            }
        );
        assert_eq!(
            nul,
            Stdio::File {
                path: want.clone(),
                append: false
            }
        );
        assert_eq!(
            lower,
            Stdio::File {
                path: want,
                append: true
            }
        );
    }

    #[test]
    fn regular_path_kept() {
        let s = Stdio::file("/tmp/out.log", true);
        assert_eq!(
            s,
            Stdio::File {
                path: PathBuf::from("/tmp/out.log"),
                append: true
            }
        );
    }
}
