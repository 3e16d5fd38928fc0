/// Structured external commands
///
/// Commands are argument vectors handed straight to the process spawner; no
/// shell ever parses them. Secret values are tracked alongside so that the
/// printable form can mask them.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::redact;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub stdin_from: Option<PathBuf>,
    pub stdout_to: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub secrets: Vec<String>,
    /// Overrides the executor's default limit
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Environment variable whose value is a credential
    pub fn secret_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        self.secrets.push(value.clone());
        self.env.push((key.into(), value));
        self
    }

    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.secrets.push(value.into());
        self
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_from = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_to = Some(path.into());
        self
    }

    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.cwd = Some(path.into());
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Mask every known secret in arbitrary tool output
    pub fn redact(&self, text: &str) -> String {
        redact(text, &self.secrets)
    }

    /// Printable, secret-free rendition for logs and error messages
    pub fn display(&self) -> String {
        let mut line = String::new();
        for (key, value) in &self.env {
            line.push_str(&format!("{}={} ", key, value));
        }
        line.push_str(&self.program);
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push_str(&format!("'{}'", arg));
            } else {
                line.push_str(arg);
            }
        }
        if let Some(input) = &self.stdin_from {
            line.push_str(&format!(" < {}", input.display()));
        }
        if let Some(output) = &self.stdout_to {
            line.push_str(&format!(" > {}", output.display()));
        }
        self.redact(&line)
    }

    /// Same command writing to a different file
    pub fn with_output(&self, path: impl Into<PathBuf>) -> Self {
        let mut copy = self.clone();
        copy.stdout_to = Some(path.into());
        copy
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Command(CommandSpec),
    /// In-process file copy (file-based engines)
    CopyFile { from: PathBuf, to: PathBuf },
}

impl Step {
    pub fn display(&self) -> String {
        match self {
            Step::Command(spec) => spec.display(),
            Step::CopyFile { from, to } => format!("copy {} -> {}", from.display(), to.display()),
        }
    }

    /// File this step writes, if any
    pub fn output(&self) -> Option<&PathBuf> {
        match self {
            Step::Command(spec) => spec.stdout_to.as_ref(),
            Step::CopyFile { to, .. } => Some(to),
        }
    }

    /// Same step redirected to another output file
    pub fn retarget(&self, output: impl Into<PathBuf>) -> Step {
        match self {
            Step::Command(spec) => Step::Command(spec.with_output(output)),
            Step::CopyFile { from, .. } => Step::CopyFile {
                from: from.clone(),
                to: output.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Abort,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub label: String,
    pub step: Step,
    pub on_failure: FailurePolicy,
}

impl PlannedStep {
    pub fn abort(label: impl Into<String>, step: Step) -> Self {
        Self {
            label: label.into(),
            step,
            on_failure: FailurePolicy::Abort,
        }
    }

    /// Failure is logged and the sequence moves on
    pub fn tolerate(label: impl Into<String>, step: Step) -> Self {
        Self {
            label: label.into(),
            step,
            on_failure: FailurePolicy::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_masks_secrets() {
        let spec = CommandSpec::new("mysqldump")
            .args(["-h", "db", "-u", "root"])
            .arg("--password=s3cret")
            .secret("s3cret")
            .arg("shop")
            .stdout_to("/dumps/shop.sql");

        let shown = spec.display();
        assert_eq!(shown, "mysqldump -h db -u root --password=**** shop > /dumps/shop.sql");
        assert!(!format!("{}", spec).contains("s3cret"));
    }

    #[test]
    fn test_secret_env_is_masked() {
        let spec = CommandSpec::new("pg_dump").secret_env("PGPASSWORD", "hunter2");
        assert_eq!(spec.display(), "PGPASSWORD=**** pg_dump");
        assert_eq!(spec.redact("auth failed for hunter2"), "auth failed for ****");
    }

    #[test]
    fn test_retarget_keeps_everything_but_output() {
        let step = Step::Command(CommandSpec::new("redis-cli").args(["--rdb", "-"]).stdout_to("/a/x.rdb"));
        let moved = step.retarget("/tmp/x.rdb");
        assert_eq!(moved.output(), Some(&PathBuf::from("/tmp/x.rdb")));
        match moved {
            Step::Command(spec) => assert_eq!(spec.args, vec!["--rdb", "-"]),
            _ => panic!("expected a command"),
        }

        let copy = Step::CopyFile { from: "/data/app.db".into(), to: "/a/app.db".into() };
        assert_eq!(copy.retarget("/tmp/app.db").output(), Some(&PathBuf::from("/tmp/app.db")));
    }
}
