use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output readers may keep going once the script has exited or been
/// killed. Grandchildren that inherited the pipes can hold them open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Variables that would hand the caller's display to the child.
const DISPLAY_VARS: &[&str] = &["DISPLAY", "WAYLAND_DISPLAY"];

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed starting {program} for {}: {source}", .script.display())]
    Spawn {
        program: String,
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for {}: {source}", .script.display())]
    Wait {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of running a script once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// `None` when the process was killed by a signal or the timeout.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecutionOutcome {
    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Failure log text handed back to the model and written to disk.
    pub fn log_text(&self) -> String {
        let mut stderr = self.stderr.clone();
        if self.timed_out {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str("[genie] execution timed out and was killed\n");
        }
        format!("STDOUT:\n{}\n\nSTDERR:\n{}", self.stdout, stderr)
    }
}

pub trait ScriptExecutor {
    fn run(&self, script: &Path) -> Result<ExecutionOutcome, ExecutorError>;
}

impl<T: ScriptExecutor + ?Sized> ScriptExecutor for &T {
    fn run(&self, script: &Path) -> Result<ExecutionOutcome, ExecutorError> {
        (**self).run(script)
    }
}

/// Runs scripts as `<interpreter> <script>` with headless mode forced and no
/// access to the caller's terminal input or display.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    pub interpreter: String,
    pub headless_env: String,
    pub timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new(interpreter: impl Into<String>, headless_env: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            headless_env: headless_env.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self, script: &Path) -> Command {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .env(&self.headless_env, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for var in DISPLAY_VARS {
            command.env_remove(var);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so a timeout takes down the browser and driver too.
            command.process_group(0);
        }
        command
    }

    fn wait(&self, child: &mut Child, script: &Path) -> Result<(Option<i32>, bool), ExecutorError> {
        let started = Instant::now();
        loop {
            let status = child.try_wait().map_err(|source| ExecutorError::Wait {
                script: script.to_path_buf(),
                source,
            })?;
            if let Some(status) = status {
                return Ok((status.code(), false));
            }

            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    warn!(script = %script.display(), ?limit, "script timed out, killing it");
                    kill_process_group(child);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok((None, true));
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    // The child leads its own group, so its pid is the group id.
    let pgid = child.id() as libc::pid_t;
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        debug!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "failed killing process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_: &Child) {}

/// Output collected by a reader thread, readable even while the thread is
/// still blocked on a pipe.
struct Capture {
    bytes: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Capture {
    fn start<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&bytes);
        thread::spawn(move || {
            if let Some(mut pipe) = pipe {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => match sink.lock() {
                            Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                            Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                        },
                    }
                }
            }
            let _ = tx.send(());
        });
        Self { bytes, done }
    }

    /// Waits for end of output until `deadline`, then returns what arrived.
    fn finish(self, deadline: Instant) -> String {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if self.done.recv_timeout(remaining).is_err() {
            debug!("output pipe still open after grace period, keeping partial output");
        }
        let bytes = match self.bytes.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl ScriptExecutor for ProcessExecutor {
    fn run(&self, script: &Path) -> Result<ExecutionOutcome, ExecutorError> {
        debug!(
            interpreter = %self.interpreter,
            script = %script.display(),
            headless_env = %self.headless_env,
            "executing script"
        );
        let mut child = self
            .command(script)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                program: self.interpreter.clone(),
                script: script.to_path_buf(),
                source,
            })?;

        let stdout = Capture::start(child.stdout.take());
        let stderr = Capture::start(child.stderr.take());
        let (exit_code, timed_out) = self.wait(&mut child, script)?;

        let deadline = Instant::now() + DRAIN_GRACE;
        Ok(ExecutionOutcome {
            exit_code,
            stdout: stdout.finish(deadline),
            stderr: stderr.finish(deadline),
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecutionOutcome, ExecutorError, ProcessExecutor, ScriptExecutor};
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    #[test]
    fn log_text_matches_stdout_stderr_shape() {
        let outcome = ExecutionOutcome {
            exit_code: Some(1),
            stdout: "step 1".to_string(),
            stderr: "Traceback".to_string(),
            timed_out: false,
        };
        assert_eq!(outcome.log_text(), "STDOUT:\nstep 1\n\nSTDERR:\nTraceback");
        assert!(!outcome.succeeded());
        assert!(ExecutionOutcome::with_exit_code(0).succeeded());
        assert!(!ExecutionOutcome::with_exit_code(2).succeeded());
    }

    #[test]
    fn timeout_is_noted_in_log() {
        let outcome = ExecutionOutcome {
            exit_code: None,
            stdout: String::new(),
            stderr: "partial".to_string(),
            timed_out: true,
        };
        assert!(outcome.log_text().ends_with("partial\n[genie] execution timed out and was killed\n"));
    }

    #[test]
    fn missing_interpreter_is_spawn_error() {
        let executor = ProcessExecutor::new("genie-no-such-interpreter", "PLAYWRIGHT_HEADLESS");
        let err = executor
            .run(Path::new("script.py"))
            .expect_err("spawn should fail");
        assert!(matches!(err, ExecutorError::Spawn { .. }));
        assert!(err.to_string().contains("genie-no-such-interpreter"));
    }

    #[cfg(unix)]
    #[test]
    fn captures_streams_exit_code_and_headless_flag() {
        let dir = tempdir().expect("tempdir should work");
        let script = dir.path().join("probe.sh");
        fs::write(
            &script,
            "echo \"headless=$PLAYWRIGHT_HEADLESS display=${DISPLAY:-none}\"\necho oops >&2\nexit 3\n",
        )
        .expect("write should work");

        let outcome = ProcessExecutor::new("sh", "PLAYWRIGHT_HEADLESS")
            .run(&script)
            .expect("run should work");
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout.trim(), "headless=1 display=none");
        assert_eq!(outcome.stderr.trim(), "oops");
        assert!(!outcome.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_succeeds() {
        let dir = tempdir().expect("tempdir should work");
        let script = dir.path().join("ok.sh");
        fs::write(&script, "exit 0\n").expect("write should work");

        let outcome = ProcessExecutor::new("sh", "PLAYWRIGHT_HEADLESS")
            .run(&script)
            .expect("run should work");
        assert!(outcome.succeeded());
    }

    #[cfg(unix)]
    #[test]
    fn slow_script_is_killed_at_timeout() {
        let dir = tempdir().expect("tempdir should work");
        let script = dir.path().join("slow.sh");
        fs::write(&script, "echo started\nexec sleep 30\n").expect("write should work");

        let started = Instant::now();
        let outcome = ProcessExecutor::new("sh", "PLAYWRIGHT_HEADLESS")
            .with_timeout(Duration::from_millis(300))
            .run(&script)
            .expect("run should work");
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(!outcome.succeeded());
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_also_stops_forked_children() {
        let dir = tempdir().expect("tempdir should work");
        let script = dir.path().join("forks.sh");
        fs::write(&script, "echo started\nsleep 6\necho done\n").expect("write should work");

        let started = Instant::now();
        let outcome = ProcessExecutor::new("sh", "PLAYWRIGHT_HEADLESS")
            .with_timeout(Duration::from_millis(300))
            .run(&script)
            .expect("run should work");
        let elapsed = started.elapsed();

        assert!(outcome.timed_out);
        assert!(!outcome.succeeded());
        assert!(elapsed < Duration::from_secs(4), "run took {elapsed:?}");
        assert_eq!(outcome.stdout.trim(), "started");
    }

    #[cfg(unix)]
    #[test]
    fn lingering_background_child_does_not_block_result() {
        let dir = tempdir().expect("tempdir should work");
        let script = dir.path().join("background.sh");
        fs::write(&script, "sleep 6 &\necho finished\nexit 4\n").expect("write should work");

        let started = Instant::now();
        let outcome = ProcessExecutor::new("sh", "PLAYWRIGHT_HEADLESS")
            .run(&script)
            .expect("run should work");

        assert_eq!(outcome.exit_code, Some(4));
        assert!(!outcome.timed_out);
        assert_eq!(outcome.stdout.trim(), "finished");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
