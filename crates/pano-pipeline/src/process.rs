//! Running the external Hugin tools.
//!
//! Tasks never spawn processes directly. They describe an [`Invocation`]
//! and hand it to a [`ProcessRunner`], so tests can substitute the real
//! binaries with a fake that records calls and scripts outcomes.

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Cooperative cancellation shared by every task of one scheduler generation.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this flag to stop.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
}

impl Invocation {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// File name of the program, for messages.
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.file_name().map_or_else(
            || self.program.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }

    /// Arguments as lossy strings, for logs and assertions.
    #[must_use]
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed by a signal or aborted.
    pub exit_code: Option<i32>,
    /// The process was killed because an abort was requested.
    pub aborted: bool,
    /// Standard output followed by standard error.
    pub output: String,
}

impl ProcessOutput {
    /// A process that exited with `code`.
    #[must_use]
    pub fn exited(code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            aborted: false,
            output: output.into(),
        }
    }

    /// A process that was stopped by an abort request.
    #[must_use]
    pub fn aborted(output: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            aborted: true,
            output: output.into(),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        !self.aborted && self.exit_code == Some(0)
    }
}

/// Executes [`Invocation`]s.
pub trait ProcessRunner: Send + Sync {
    /// Run to completion, or until `abort` is requested.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the process cannot be started.
    fn run(&self, invocation: &Invocation, abort: &AbortFlag) -> io::Result<ProcessOutput>;
}

/// [`ProcessRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone)]
pub struct SystemRunner {
    poll_interval: Duration,
}

impl SystemRunner {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POLL_INTERVAL)
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation, abort: &AbortFlag) -> io::Result<ProcessOutput> {
        debug!(
            program = %invocation.program.display(),
            args = ?invocation.args,
            cwd = %invocation.working_dir.display(),
            "spawning"
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // `make` and `hugin_executor` run the remappers and blenders as
        // their own children; aborting has to reach those too.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command.spawn()?;

        // Both pipes are drained while the tool runs.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout));
        let stderr_reader = thread::spawn(move || read_pipe(stderr));

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if abort.is_requested() {
                kill_tree(&mut child, invocation);
                let _ = child.wait();
                break None;
            }
            thread::sleep(self.poll_interval);
        };

        let mut output = stdout_reader.join().unwrap_or_default();
        output.push_str(&stderr_reader.join().unwrap_or_default());

        Ok(match status {
            Some(status) => ProcessOutput {
                exit_code: status.code(),
                aborted: false,
                output,
            },
            None => ProcessOutput::aborted(output),
        })
    }
}

/// Kill the child and everything it started.
///
/// On Unix the child leads its own process group, which the shell's `kill`
/// signals as a whole. Elsewhere, or if that fails, only the child dies.
fn kill_tree(child: &mut Child, invocation: &Invocation) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = Command::new("sh")
            .args(["-c", "kill -KILL -- \"$0\"", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match killed {
            Ok(status) if status.success() => return,
            Ok(status) => {
                debug!(%status, program = %invocation.program_name(), "process group kill failed");
            }
            Err(error) => {
                debug!(%error, program = %invocation.program_name(), "process group kill failed");
            }
        }
    }
    if let Err(error) = child.kill() {
        warn!(%error, program = %invocation.program_name(), "failed to kill");
    }
}

fn read_pipe(pipe: Option<impl Read>) -> String {
    let mut bytes = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut bytes);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Ask a Hugin tool for its version.
///
/// Runs `<program> --help` and returns the token following the word
/// `version`, e.g. `"2019.2.0.b690dd9b"` from
/// `"autooptimiser version 2019.2.0.b690dd9b"`. Hugin tools print usage on
/// `--help`, sometimes with a non-zero exit code, so the status is ignored.
#[must_use]
pub fn query_version(runner: &dyn ProcessRunner, program: &Path) -> Option<String> {
    let working_dir = std::env::temp_dir();
    let invocation = Invocation::new(program, working_dir).arg("--help");
    let output = runner.run(&invocation, &AbortFlag::new()).ok()?;
    parse_version(&output.output)
}

fn parse_version(text: &str) -> Option<String> {
    let mut words = text.split_whitespace();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("version")
            && let Some(version) = words.next()
            && version.starts_with(|ch: char| ch.is_ascii_digit())
        {
            return Some(version.trim_end_matches([',', ')']).to_owned());
        }
    }
    None
}

/// Major number of a Hugin version string, `2019` for `"2019.2.0"`.
#[must_use]
pub fn version_major(version: &str) -> Option<u32> {
    version
        .split(|ch: char| !ch.is_ascii_digit())
        .next()
        .and_then(|major| major.parse().ok())
}
