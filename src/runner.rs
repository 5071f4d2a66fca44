//! Invocation of the external protocol executable.
//!
//! The executable is treated as a black box: it is started with a set of flags, optionally fed
//! a party input file on stdin, and its exit status, stderr and runtime are reported back as an
//! [`Outcome`]. The [`Executor`] trait lets the orchestrator be driven by a fake in tests.
use std::{
    fmt, fs,
    io,
    path::PathBuf,
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use tracing::debug;

/// One blocking call of the protocol executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The executable.
    pub program: PathBuf,
    /// Command line arguments.
    pub args: Vec<String>,
    /// File fed to standard input, if any.
    pub stdin: Option<PathBuf>,
    /// Working directory of the process.
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Returns the value following `flag` in the arguments.
    pub fn flag(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(stdin) = &self.stdin {
            write!(f, " < {}", stdin.display())?;
        }
        Ok(())
    }
}

/// The result of a finished invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Exit code, `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Everything the process wrote to stderr.
    pub stderr: String,
    /// Wall clock time between spawning and exit.
    pub elapsed: Duration,
}

impl Outcome {
    /// The last `max_lines` lines of stderr.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        lines[lines.len().saturating_sub(max_lines)..].join("\n")
    }
}

/// Runs [`Invocation`]s to completion.
pub trait Executor {
    /// Runs `invocation` and blocks until the process exits.
    ///
    /// Returns an error only if the process could not be started or waited for; a process that
    /// fails is reported through [`Outcome::success`].
    fn execute(&mut self, invocation: &Invocation) -> io::Result<Outcome>;
}

/// Spawns the executable as a child process; stdout is inherited, stderr is captured.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&mut self, invocation: &Invocation) -> io::Result<Outcome> {
        let stdin = match &invocation.stdin {
            Some(path) => Stdio::from(fs::File::open(path)?),
            None => Stdio::null(),
        };
        debug!(%invocation, "spawning protocol executable");
        let start = Instant::now();
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(stdin)
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()?;
        let output = child.wait_with_output()?;
        let elapsed = start.elapsed();
        Ok(Outcome {
            exit_code: output.status.code(),
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_lookup() {
        let inv = Invocation {
            program: "msf".into(),
            args: ["-r", "1", "-f", "stats/x.txt"].map(String::from).to_vec(),
            stdin: None,
            working_dir: ".".into(),
        };
        assert_eq!(inv.flag("-f"), Some("stats/x.txt"));
        assert_eq!(inv.flag("-t"), None);
        assert_eq!(inv.to_string(), "msf -r 1 -f stats/x.txt");
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let outcome = Outcome {
            exit_code: Some(1),
            success: false,
            stderr: "a\nb\nc\n".into(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(outcome.stderr_tail(2), "b\nc");
        assert_eq!(outcome.stderr_tail(10), "a\nb\nc");
    }

    #[cfg(unix)]
    #[test]
    fn process_executor_reports_exit_and_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        fs::write(&input, "hello\n").unwrap();
        let inv = Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), "cat >&2; exit 3".into()],
            stdin: Some(input),
            working_dir: dir.path().to_path_buf(),
        };
        let outcome = ProcessExecutor.execute(&inv).unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success);
        assert_eq!(outcome.stderr, "hello\n");
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let inv = Invocation {
            program: "./definitely-not-a-protocol-binary".into(),
            args: vec![],
            stdin: None,
            working_dir: ".".into(),
        };
        assert!(ProcessExecutor.execute(&inv).is_err());
    }
}
