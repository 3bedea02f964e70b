//! External command execution
//!
//! Strategies never spawn processes directly; they describe the command with a
//! [`CommandSpec`] and hand it to a [`CommandRunner`]. Credentials travel in a
//! per-command [`EnvOverlay`] and never touch the process-wide environment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::DeployError;

/// Environment variables added to a single child process
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// Values may be secrets, only keys are printed.
impl fmt::Debug for EnvOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.vars.keys()).finish()
    }
}

/// A command to run
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: EnvOverlay,
    pub timeout: Duration,
    /// Maximum bytes captured per output stream
    pub output_limit: usize,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: EnvOverlay::new(),
            timeout: Duration::from_secs(120),
            output_limit: 10 * 1024 * 1024,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, env: EnvOverlay) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    /// Program and arguments joined for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stderr, or stdout when stderr is blank
    pub fn error_detail(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Runs external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError>;
}

/// Runs commands as child processes with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, DeployError> {
        debug!("Running `{}` (env: {:?})", spec.display(), spec.env);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            DeployError::UnknownError(format!("Failed to run {}: {}", spec.program, e))
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = spec.output_limit;

        let result = tokio::time::timeout(spec.timeout, async {
            let (stdout, stderr, status) = tokio::join!(
                read_capped(stdout, limit),
                read_capped(stderr, limit),
                child.wait()
            );
            Ok::<_, std::io::Error>(CommandOutput {
                exit_code: status?.code(),
                stdout: stdout?,
                stderr: stderr?,
            })
        })
        .await;

        match result {
            Ok(output) => Ok(output?),
            Err(_) => {
                warn!("`{}` exceeded {:?}, killing it", spec.display(), spec.timeout);
                let _ = child.kill().await;
                Err(DeployError::Timeout(format!(
                    "{} did not finish within {}s",
                    spec.program,
                    spec.timeout.as_secs()
                )))
            }
        }
    }
}

/// Read at most `limit` bytes, then drain the rest so the child never blocks
/// on a full pipe.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(String::new());
    };

    let mut buf = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overlay_debug_hides_values() {
        let env = EnvOverlay::new().with("CLOUDFLARE_API_TOKEN", "super-secret");
        let debug = format!("{:?}", env);
        assert!(debug.contains("CLOUDFLARE_API_TOKEN"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_error_detail_prefers_stderr() {
        let output = CommandOutput {
            exit_code: Some(1),
            stdout: "some output".to_string(),
            stderr: "  permission denied\n".to_string(),
        };
        assert_eq!(output.error_detail(), "permission denied");

        let output = CommandOutput {
            exit_code: Some(1),
            stdout: "only stdout".to_string(),
            stderr: "\n".to_string(),
        };
        assert_eq!(output.error_detail(), "only stdout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_output_and_env() {
        let spec = CommandSpec::new("sh", ["-c", "echo \"$GREETING\"; echo oops >&2; exit 3"])
            .with_env(EnvOverlay::new().with("GREETING", "hello"));
        let output = ProcessRunner.run(&spec).await.unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert!(std::env::var("GREETING").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_caps_output() {
        let spec = CommandSpec::new("sh", ["-c", "yes abcdefgh | head -c 100000"])
            .with_output_limit(1024);
        let output = ProcessRunner.run(&spec).await.unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.len(), 1024);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_times_out() {
        let spec = CommandSpec::new("sleep", ["5"]).with_timeout(Duration::from_millis(100));
        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, DeployError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let spec = CommandSpec::new("definitely-not-a-real-program-xyz", Vec::<String>::new());
        assert!(ProcessRunner.run(&spec).await.is_err());
    }
}
