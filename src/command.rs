//! External program invocation.
//!
//! Issuance and trust anchoring both delegate their real work to other
//! programs (`openssl`, `sudo`, `security`). Everything goes through the
//! [`CommandRunner`] capability so the call sites only describe *what* to run
//! and tests can substitute a recording fake.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// One external program invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment. Values may be secrets and are wiped on drop.
    pub env: Vec<(String, Zeroizing<String>)>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), Zeroizing::new(value.to_string())));
        self
    }

    /// Rendered command line for diagnostics. Environment values are omitted.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("cwd", &self.cwd)
            .field("env", &env_keys)
            .finish()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Exit status and captured output of a finished invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Combined stdout/stderr for error reports.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        let mut text = match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        };
        if text.is_empty() {
            text = match self.code {
                Some(code) => format!("(no output, exit status {code})"),
                None => "(no output, terminated by signal)".to_string(),
            };
        }
        text
    }
}

/// Runs external programs and captures their output.
///
/// `Err` means the program could not be started at all; a program that ran
/// and exited non-zero is reported through [`CommandOutput::success`].
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let mut command = tokio::process::Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            command.env(key, value.as_str());
        }

        tracing::debug!(command = %invocation, "running external command");
        let output = command.output().await?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Convert a path to a command-line argument, rejecting non-UTF-8 paths
/// instead of silently mangling them.
pub(crate) fn path_arg(path: &Path) -> Option<String> {
    path.to_str().map(str::to_string)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::{CommandOutput, CommandRunner, Invocation};
    use std::io;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&Invocation) -> io::Result<CommandOutput> + Send + Sync>;

    /// Records every invocation and answers with a scripted handler.
    pub(crate) struct FakeRunner {
        calls: Mutex<Vec<Invocation>>,
        handler: Handler,
    }

    impl FakeRunner {
        pub(crate) fn new(
            handler: impl Fn(&Invocation) -> io::Result<CommandOutput> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                handler: Box::new(handler),
            }
        }

        /// Every invocation succeeds with empty output.
        pub(crate) fn succeeding() -> Self {
            Self::new(|_| Ok(ok()))
        }

        pub(crate) fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().expect("calls lock").clone()
        }

        pub(crate) fn command_lines(&self) -> Vec<String> {
            self.calls().iter().map(Invocation::command_line).collect()
        }
    }

    impl CommandRunner for FakeRunner {
        async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(invocation.clone());
            (self.handler)(invocation)
        }
    }

    pub(crate) fn ok() -> CommandOutput {
        CommandOutput {
            success: true,
            code: Some(0),
            ..CommandOutput::default()
        }
    }

    pub(crate) fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            success: false,
            code: Some(1),
            stderr: stderr.to_string(),
            ..CommandOutput::default()
        }
    }
}
