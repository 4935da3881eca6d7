//! Structured external process execution
//!
//! Every external tool the lane drives (the build tool, bloat-o-meter)
//! goes through this module. Invocations carry discrete arguments rather
//! than an interpolated shell string, and results come back with the exit
//! code, captured output, and wall-clock duration.
//!
//! An optional deadline covers hung build tools: the child is polled and
//! killed once the deadline passes.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// How often a deadline-bounded child is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors from process execution
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} exceeded the {limit_seconds}s deadline and was killed")]
    Timeout { program: String, limit_seconds: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for process operations
pub type ProcessResult<T> = Result<T, ProcessError>;

/// A single external invocation, built up fluently.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    deadline: Option<Duration>,
}

impl ProcessRequest {
    /// Create a request for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            deadline: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the child.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Bound the invocation by a wall-clock deadline.
    ///
    /// `None` means wait forever, which is the default.
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run the process to completion and capture its output.
    pub fn run(&self) -> ProcessResult<ProcessOutcome> {
        let started = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Drain both pipes on background threads so a chatty child cannot
        // deadlock against a full pipe while we poll for completion.
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = match self.deadline {
            None => child.wait()?,
            Some(limit) => loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if started.elapsed() > limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProcessError::Timeout {
                        program: self.program.clone(),
                        limit_seconds: limit.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            },
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(ProcessOutcome {
            exit_code: status.code(),
            stdout,
            stderr,
            duration: started.elapsed(),
        })
    }
}

/// Captured result of a finished invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Exit code, `None` when the child died to a signal
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock time from spawn to exit
    pub duration: Duration,
}

impl ProcessOutcome {
    /// True iff the child exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The last `max_lines` lines of stderr, for error reporting.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut reader) = source {
            let _ = reader.read_to_string(&mut buf);
        }
        buf
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_stdout_capture() {
        let outcome = ProcessRequest::new("sh")
            .args(["-c", "echo hello"])
            .run()
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[test]
    fn test_nonzero_exit_code() {
        let outcome = ProcessRequest::new("sh")
            .arg("-c")
            .arg("echo oops >&2; exit 3")
            .run()
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr.trim(), "oops");
    }

    #[test]
    fn test_spawn_failure() {
        let result = ProcessRequest::new("/nonexistent/program-xyz").run();
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[test]
    fn test_deadline_kills_hung_child() {
        let result = ProcessRequest::new("sh")
            .arg("-c")
            .arg("sleep 30")
            .deadline(Some(Duration::from_millis(200)))
            .run();

        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
    }

    #[test]
    fn test_deadline_not_hit() {
        let outcome = ProcessRequest::new("sh")
            .arg("-c")
            .arg("echo fast")
            .deadline(Some(Duration::from_secs(30)))
            .run()
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "fast");
    }

    #[test]
    fn test_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ProcessRequest::new("pwd")
            .current_dir(dir.path())
            .run()
            .unwrap();

        assert!(outcome.success());
        // Compare canonicalized paths; the tempdir may sit behind a symlink.
        let reported = std::fs::canonicalize(outcome.stdout.trim()).unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(reported, expected);
    }

    #[test]
    fn test_stderr_tail() {
        let outcome = ProcessOutcome {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "a\nb\nc\nd".to_string(),
            duration: Duration::ZERO,
        };
        assert_eq!(outcome.stderr_tail(2), "c\nd");
        assert_eq!(outcome.stderr_tail(10), "a\nb\nc\nd");
    }
}
