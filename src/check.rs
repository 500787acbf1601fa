/// This function checks for platform capability issues.
/// An empty result means every spawn feature is available in its
/// preferred form. Warnings describe fallbacks (fork instead of
/// posix_spawn, non-atomic pipe creation) that the library handles
/// by itself, errors describe configurations spawning cannot work
/// around.
pub fn check(res: &mut CheckResult) {
    #[cfg(unix)]
    {
        crate::posix::check::check(res);
    }
    #[cfg(not(unix))]
    {
        res.error("no native backend on this platform, spawning needs an external backend");
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Severity {
    Warning,
    Error,
}

impl Severity {
    fn tag(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Problems reported by `check` and similar functions, in the
/// order they were recorded.
#[derive(Debug, Default)]
pub struct CheckResult {
    entries: Vec<(Severity, String)>,
}

impl CheckResult {
    /// Creates an empty CheckResult
    pub fn new() -> CheckResult {
        Default::default()
    }
    /// Records an error
    pub(crate) fn error(&mut self, message: &str) {
        self.entries.push((Severity::Error, message.to_string()))
    }
    /// Records a warning
    pub(crate) fn warning(&mut self, message: &str) {
        self.entries.push((Severity::Warning, message.to_string()))
    }
    /// Checks if any errors were reported
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|(sev, _)| *sev == Severity::Error)
    }
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.entries.is_empty() {
            return "OK".fmt(f);
        }
        for (severity, message) in &self.entries {
            writeln!(f, "{}: {}", severity.tag(), message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_prints_ok() {
        let res = CheckResult::new();
        assert_eq!(res.to_string(), "OK");
        assert!(!res.has_errors());
    }

    #[test]
    fn entries_print_one_per_line() {
        let mut res = CheckResult::new();
        res.warning("first");
        res.error("second");
        assert!(res.has_errors());
        let text = res.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["warning: first", "error: second"]);
    }

    #[test]
    fn warnings_alone_are_not_errors() {
        let mut res = CheckResult::new();
        res.warning("only a fallback");
        assert!(!res.has_errors());
    }
}
