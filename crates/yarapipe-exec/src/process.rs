use crate::error::TimedOut;
use anyhow::{Context, Result, bail};
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Environment variable that overrides the location of `yara`.
pub const YARA_BINARY_ENV: &str = "YARA_BINARY_PATH";
/// Environment variable that overrides the location of `yarac`.
pub const YARAC_BINARY_ENV: &str = "YARAC_BINARY_PATH";

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A native executable that can be run with arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    path: PathBuf,
}

impl Executable {
    /// Wraps a path or a bare program name without checking it; bare names
    /// are looked up on `PATH` when the process is spawned.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Wraps a path that must point at an existing, executable file.
    pub fn at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Executable not found: {}", path.display()))?;
        if !metadata.is_file() {
            bail!("Not a file: {}", path.display());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                bail!("File is not executable: {}", path.display());
            }
        }

        Ok(Self::new(path))
    }

    /// Picks `explicit` if given, then the path in `env_var`, then `name`
    /// on `PATH`.
    pub fn resolve(name: &str, env_var: &str, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::at(path);
        }

        if let Some(path) = std::env::var_os(env_var).filter(|v| !v.is_empty()) {
            return Self::at(&path)
                .with_context(|| format!("{} does not point at a usable executable", env_var));
        }

        Ok(Self::new(name))
    }

    pub fn yara(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve("yara", YARA_BINARY_ENV, explicit)
    }

    pub fn yarac(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve("yarac", YARAC_BINARY_ENV, explicit)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn program_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Runs the executable and hands every output line to the callbacks.
    ///
    /// Lines of each stream arrive in the order the process wrote them. An
    /// error from `on_stdout` kills the process and is returned as-is. When
    /// `timeout` elapses the process is killed and [`TimedOut`] is returned.
    pub fn run_streaming<I, S>(
        &self,
        args: I,
        timeout: Option<Duration>,
        mut on_stdout: impl FnMut(&str) -> Result<()>,
        mut on_stderr: impl FnMut(&str),
    ) -> Result<ExitStatus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.path);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!("running {:?}", cmd);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start {}", self.path.display()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr"))?;

        let (tx, rx) = mpsc::channel();
        pump_lines(stdout, tx.clone(), StreamEvent::Stdout);
        pump_lines(stderr, tx, StreamEvent::Stderr);

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut open_streams = 2;

        while open_streams > 0 {
            let event = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(remaining) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            terminate(&mut child);
                            return Err(self.timed_out(timeout));
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            match event {
                StreamEvent::Stdout(line) => {
                    if let Err(e) = on_stdout(&line) {
                        terminate(&mut child);
                        return Err(e);
                    }
                }
                StreamEvent::Stderr(line) => on_stderr(&line),
                StreamEvent::Closed => open_streams -= 1,
                StreamEvent::Failed(e) => {
                    terminate(&mut child);
                    return Err(e).context(format!("Failed to read output of {}", self.program_name()));
                }
            }
        }

        self.wait(&mut child, deadline, timeout)
    }

    fn wait(
        &self,
        child: &mut Child,
        deadline: Option<Instant>,
        timeout: Option<Duration>,
    ) -> Result<ExitStatus> {
        let Some(deadline) = deadline else {
            return Ok(child.wait()?);
        };

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                terminate(child);
                return Err(self.timed_out(timeout));
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn timed_out(&self, timeout: Option<Duration>) -> anyhow::Error {
        TimedOut {
            program: self.program_name(),
            timeout: timeout.unwrap_or_default(),
        }
        .into()
    }
}

enum StreamEvent {
    Stdout(String),
    Stderr(String),
    Closed,
    Failed(std::io::Error),
}

/// Reads `reader` line by line on its own thread.
///
/// Output is decoded lossily: matched data is arbitrary bytes. Only the line
/// terminator (`\n` or `\r\n`) is removed.
fn pump_lines<R>(reader: R, tx: mpsc::Sender<StreamEvent>, wrap: fn(String) -> StreamEvent)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(wrap(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(StreamEvent::Failed(e));
                    return;
                }
            }
        }

        let _ = tx.send(StreamEvent::Closed);
    });
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
