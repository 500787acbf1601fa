use crate::{erased, DestroySignal, Stdio, StdioSpec};
use serde::{Deserialize, Serialize};
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Shell interpretation of the command line.
///
/// Only honored by backends that delegate to a shell (Node). The
/// POSIX launcher passes the command through untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub enum Shell {
    Off,
    Default,
    Program(PathBuf),
}

impl Default for Shell {
    fn default() -> Self {
        Shell::Off
    }
}

/// Frozen launch recipe.
///
/// This type should only be used by Backend implementations.
/// Use `Command` instead.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LaunchOptions {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Ordered environment with unique keys
    pub env: Vec<(OsString, OsString)>,
    pub cwd: Option<PathBuf>,
    pub stdio: StdioSpec,
    pub destroy_signal: DestroySignal,
    pub use_posix_spawn: bool,
    pub shell: Shell,
    pub windows_hide: bool,
    pub windows_verbatim_arguments: bool,
}

/// Child process builder.
///
/// The parent environment is captured once when the builder is
/// created and can be overridden entry by entry afterwards.
#[derive(Debug)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
    stdin: Stdio,
    stdout: Stdio,
    stderr: Stdio,
    destroy_signal: DestroySignal,
    use_posix_spawn: bool,
    shell: Shell,
    windows_hide: bool,
    windows_verbatim_arguments: bool,
}

impl Command {
    pub fn new(program: impl AsRef<OsStr>) -> Command {
        Command {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            env: std::env::vars_os().collect(),
            cwd: None,
            stdin: Stdio::Inherit,
            stdout: Stdio::Inherit,
            stderr: Stdio::Inherit,
            destroy_signal: DestroySignal::Term,
            use_posix_spawn: true,
            shell: Shell::Off,
            windows_hide: true,
            windows_verbatim_arguments: false,
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> &mut Self {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Sets a variable, replacing an existing entry with the same key
    pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Self {
        let key = key.as_ref().to_os_string();
        let value = value.as_ref().to_os_string();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    pub fn envs(
        &mut self,
        items: impl IntoIterator<Item = (impl AsRef<OsStr>, impl AsRef<OsStr>)>,
    ) -> &mut Self {
        for (key, value) in items {
            self.env(key, value);
        }
        self
    }

    pub fn env_remove(&mut self, key: impl AsRef<OsStr>) -> &mut Self {
        let key = key.as_ref();
        self.env.retain(|(k, _)| k != key);
        self
    }

    /// Drops the inherited environment and all overrides
    pub fn env_clear(&mut self) -> &mut Self {
        self.env.clear();
        self
    }

    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.cwd.replace(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdin(&mut self, stdin: Stdio) -> &mut Self {
        self.stdin = stdin;
        self
    }

    pub fn stdout(&mut self, stdout: Stdio) -> &mut Self {
        self.stdout = stdout;
        self
    }

    pub fn stderr(&mut self, stderr: Stdio) -> &mut Self {
        self.stderr = stderr;
        self
    }

    /// Signal sent by `destroy()`, SIGTERM by default
    pub fn destroy_signal(&mut self, signal: DestroySignal) -> &mut Self {
        self.destroy_signal = signal;
        self
    }

    /// Prefer `posix_spawn` over fork+exec where the platform
    /// supports it. Enabled by default.
    pub fn use_posix_spawn(&mut self, enable: bool) -> &mut Self {
        self.use_posix_spawn = enable;
        self
    }

    pub fn shell(&mut self, shell: Shell) -> &mut Self {
        self.shell = shell;
        self
    }

    /// Hide the console window of the child (Windows backends only).
    /// Enabled by default.
    pub fn windows_hide(&mut self, hide: bool) -> &mut Self {
        self.windows_hide = hide;
        self
    }

    /// Skip argument quoting (Windows backends only)
    pub fn windows_verbatim_arguments(&mut self, verbatim: bool) -> &mut Self {
        self.windows_verbatim_arguments = verbatim;
        self
    }

    /// Freezes the builder into a launch recipe
    pub fn build(self) -> LaunchOptions {
        LaunchOptions {
            program: self.program,
            args: self.args,
            env: self.env,
            cwd: self.cwd,
            stdio: StdioSpec {
                stdin: self.stdin,
                stdout: self.stdout,
                stderr: self.stderr,
            },
            destroy_signal: self.destroy_signal,
            use_posix_spawn: self.use_posix_spawn,
            shell: self.shell,
            windows_hide: self.windows_hide,
            windows_verbatim_arguments: self.windows_verbatim_arguments,
        }
    }

    /// Spawns through the native backend for this platform
    #[cfg(unix)]
    pub fn spawn(self) -> Result<crate::posix::PosixChildProcess, crate::Error> {
        crate::posix::spawn(self.build())
    }

    /// Spawns through an explicitly chosen backend
    pub fn spawn_with(
        self,
        backend: &dyn erased::Backend,
    ) -> anyhow::Result<Box<dyn erased::ChildProcess>> {
        erased::Backend::spawn(backend, self.build())
    }

    /// Runs the command to completion, collecting stdout and stderr
    #[cfg(unix)]
    pub async fn output(
        self,
        options: crate::OutputOptions,
    ) -> Result<crate::Output, crate::Error> {
        crate::output::run(self.build(), options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_is_inherited_once() {
        std::env::set_var("SUBPROC_TEST_MARKER", "yes");
        let cmd = Command::new("true");
        std::env::set_var("SUBPROC_TEST_MARKER", "no");
        let options = cmd.build();
        let got = options
            .env
            .iter()
            .find(|(k, _)| k == "SUBPROC_TEST_MARKER")
            .map(|(_, v)| v.clone());
        assert_eq!(got.as_deref(), Some(std::ffi::OsStr::new("yes")));
        std::env::remove_var("SUBPROC_TEST_MARKER");
    }

    #[test]
    fn env_set_replaces_existing_key() {
        let mut cmd = Command::new("true");
        cmd.env_clear();
        cmd.env("KEY", "one");
        cmd.env("KEY", "two");
        cmd.env("OTHER", "x");
        let options = cmd.build();
        assert_eq!(
            options.env,
            vec![
                ("KEY".into(), "two".into()),
                ("OTHER".into(), "x".into()),
            ]
        );
    }

    #[test]
    fn env_remove_and_clear() {
        let mut cmd = Command::new("true");
        cmd.env("A", "1").env("B", "2");
        cmd.env_remove("A");
        assert!(cmd.env.iter().all(|(k, _)| k != "A"));
        cmd.env_clear();
        assert!(cmd.build().env.is_empty());
    }

    #[test]
    fn recipe_defaults() {
        let options = Command::new("prog").build();
        assert_eq!(options.destroy_signal, DestroySignal::Term);
        assert!(options.use_posix_spawn);
        assert_eq!(options.shell, Shell::Off);
        assert!(options.windows_hide);
        assert!(!options.windows_verbatim_arguments);
        assert!(options.cwd.is_none());
        assert!(matches!(options.stdio.stdin, Stdio::Inherit));
    }
}
