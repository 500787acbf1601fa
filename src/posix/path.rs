//! `PATH` tokenization and executable lookup
use crate::Error;
use std::{
    ffi::OsStr,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

const PATH_SEPARATOR: u8 = b':';

/// Iterator over `PATH` entries.
///
/// Adjacent, leading and trailing separators yield empty entries
/// which stand for the current directory. Rejoining the entries
/// with the separator reproduces the input.
pub(crate) struct PathIter<'a> {
    rest: Option<&'a [u8]>,
}

impl<'a> PathIter<'a> {
    pub(crate) fn new(path: &'a OsStr) -> Self {
        PathIter {
            rest: Some(path.as_bytes()),
        }
    }
}

impl<'a> Iterator for PathIter<'a> {
    type Item = &'a OsStr;

    fn next(&mut self) -> Option<&'a OsStr> {
        let rest = self.rest?;
        match rest.iter().position(|&b| b == PATH_SEPARATOR) {
            Some(pos) => {
                self.rest = Some(&rest[pos + 1..]);
                Some(OsStr::from_bytes(&rest[..pos]))
            }
            None => {
                self.rest = None;
                Some(OsStr::from_bytes(rest))
            }
        }
    }
}

fn is_executable(path: &Path) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::X_OK).is_ok()
}

/// Resolves `program` to the path handed to exec.
///
/// A program containing a path separator is used as-is, anything
/// else is looked up along `PATH`.
pub(crate) fn resolve_program(program: &OsStr) -> Result<PathBuf, Error> {
    if program.is_empty() {
        return Err(Error::InvalidArgument {
            what: "empty program name",
        });
    }
    if program.as_bytes().contains(&b'/') {
        return Ok(PathBuf::from(program));
    }
    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in PathIter::new(&path) {
        let candidate = if dir.is_empty() {
            PathBuf::from(program)
        } else {
            Path::new(dir).join(program)
        };
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }
    Err(Error::CommandNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn tokens(input: &str) -> Vec<String> {
        PathIter::new(OsStr::new(input))
            .map(|t| t.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn splits_on_separator() {
        assert_eq!(tokens("/bin:/usr/bin"), vec!["/bin", "/usr/bin"]);
    }

    #[test]
    fn empty_entries_survive() {
        assert_eq!(tokens("a::b"), vec!["a", "", "b"]);
        assert_eq!(tokens(":a"), vec!["", "a"]);
        assert_eq!(tokens("a:"), vec!["a", ""]);
        assert_eq!(tokens(""), vec![""]);
    }

    #[test]
    fn rejoining_reproduces_input() {
        for input in &["/bin:/usr/bin", "a::b:", ":", "", "x"] {
            let rejoined = tokens(input).join(":");
            assert_eq!(&rejoined, input);
        }
    }

    #[test]
    fn absolute_program_is_used_as_is() {
        let got = resolve_program(OsStr::new("/bin/definitely-missing")).unwrap();
        assert_eq!(got, PathBuf::from("/bin/definitely-missing"));
    }

    #[test]
    fn lookup_finds_sh() {
        let got = resolve_program(OsStr::new("sh")).unwrap();
        assert!(got.is_absolute());
        assert!(is_executable(&got));
    }

    #[test]
    fn missing_command_is_reported() {
        let missing = OsString::from("subproc-no-such-command-here");
        assert!(matches!(
            resolve_program(&missing),
            Err(Error::CommandNotFound)
        ));
    }

    #[test]
    fn empty_program_is_rejected() {
        assert!(matches!(
            resolve_program(OsStr::new("")),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
