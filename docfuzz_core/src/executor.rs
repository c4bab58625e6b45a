//! An [`Engine`] backed by an external testee process.
//!
//! The testee follows the language-agnostic docopt test protocol: it receives the
//! usage doc (on stdin, or as a file), the invocation tokens as its own arguments,
//! and prints either `"user-error"` or a JSON object of parsed results on stdout.

use crate::engine::{Engine, EngineError, HelpHandler};
use crate::testcase::USER_ERROR_LITERAL;
use crate::value::{Opts, opts_from_json};
use serde_json::Value as Json;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Environment variable carrying the `version` argument to the testee.
pub const VERSION_ENV: &str = "DOCFUZZ_VERSION";

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputDelivery {
    /// The usage doc is written to the testee's stdin.
    StdIn,
    /// The usage doc is written to a temporary file; `{}` in the template is replaced
    /// by its path and the result is split on whitespace into leading arguments.
    File(String),
}

#[derive(Debug, Clone)]
pub struct CommandEngineConfig {
    pub command: Vec<String>,
    pub input_delivery: InputDelivery,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessOutput {
    fn describe_exit(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exited with code {code}"),
            (None, Some(signal)) => format!("terminated by signal {signal}"),
            (None, None) => "exited abnormally".to_string(),
        }
    }
}

/// Runs one testee process per parse. Holds only configuration, so a shared
/// reference can serve concurrent evaluations.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    config: CommandEngineConfig,
}

impl CommandEngine {
    pub fn new(config: CommandEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandEngineConfig {
        &self.config
    }

    fn run(&self, doc: &str, argv: &[String], version: &str) -> Result<ProcessOutput, EngineError> {
        let (program, leading_args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| EngineError::Internal("no testee command configured".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(leading_args);
        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }
        cmd.env(VERSION_ENV, version);

        // Dropped at the end of this call, after the child has been waited on.
        let mut _doc_file: Option<tempfile::NamedTempFile> = None;

        match &self.config.input_delivery {
            InputDelivery::StdIn => {
                cmd.stdin(Stdio::piped());
            }
            InputDelivery::File(template) => {
                let mut file = tempfile::NamedTempFile::new().map_err(|e| {
                    EngineError::Internal(format!("failed to create temp file: {e}"))
                })?;
                file.write_all(doc.as_bytes()).map_err(|e| {
                    EngineError::Internal(format!(
                        "failed to write temp file {:?}: {e}",
                        file.path()
                    ))
                })?;
                let path = file.path().to_str().ok_or_else(|| {
                    EngineError::Internal("temp file path is not valid UTF-8".to_string())
                })?;
                for part in template.split_whitespace() {
                    cmd.arg(part.replace("{}", path));
                }
                cmd.stdin(Stdio::null());
                _doc_file = Some(file);
            }
        }

        cmd.args(argv);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            let msg = format!("failed to spawn testee {:?}: {e}", self.config.command);
            warn!(error = %e, command = ?self.config.command, "testee spawn failed");
            EngineError::Internal(msg)
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let writer = if self.config.input_delivery == InputDelivery::StdIn {
            match child.stdin.take() {
                Some(stdin) => Some(feed(stdin, doc.as_bytes().to_vec())),
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EngineError::Internal(
                        "testee stdin was not piped".to_string(),
                    ));
                }
            }
        } else {
            None
        };

        // On timeout the child is killed, which unblocks a pending write with a broken
        // pipe; the writer and readers are left to finish on their own.
        let status = wait_with_timeout(child, self.config.timeout)?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The testee exited without reading the whole doc.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => {
                    return Err(EngineError::Internal(format!(
                        "failed to write doc to testee stdin: {e}"
                    )));
                }
                Err(_) => {
                    return Err(EngineError::Internal(
                        "testee stdin writer panicked".to_string(),
                    ));
                }
            }
        }

        let mut output = ProcessOutput {
            stdout: join_drain(stdout, "stdout")?,
            stderr: join_drain(stderr, "stderr")?,
            exit_code: status.code(),
            signal: None,
        };
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            output.signal = status.signal();
        }
        Ok(output)
    }
}

/// Writes the doc on its own thread so a testee that never reads stdin cannot
/// stall the timeout loop. Dropping the pipe afterwards closes the testee's stdin.
fn feed<W: Write + Send + 'static>(
    mut pipe: W,
    doc: Vec<u8>,
) -> JoinHandle<std::io::Result<()>> {
    thread::spawn(move || pipe.write_all(&doc))
}

fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_drain(
    handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    stream: &str,
) -> Result<Vec<u8>, EngineError> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    match handle.join() {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(e)) => Err(EngineError::Internal(format!(
            "failed to read testee {stream}: {e}"
        ))),
        Err(_) => Err(EngineError::Internal(format!(
            "testee {stream} reader panicked"
        ))),
    }
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ExitStatus, EngineError> {
    let start_time = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start_time.elapsed() > timeout {
                    warn!(timeout_ms = timeout.as_millis() as u64, "testee timed out, killing");
                    if let Err(e) = child.kill() {
                        return Err(EngineError::Internal(format!(
                            "failed to kill timed-out testee: {e}"
                        )));
                    }
                    let _ = child.wait();
                    return Err(EngineError::Internal(format!(
                        "testee timed out after {timeout:?}"
                    )));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(EngineError::Internal(format!(
                    "error waiting for testee: {e}"
                )));
            }
        }
    }
}

/// Maps a finished testee run onto the engine contract.
fn interpret(output: &ProcessOutput) -> Result<Opts, EngineError> {
    let json: Json = match serde_json::from_slice(&output.stdout) {
        Ok(json) => json,
        Err(e) => {
            return Err(EngineError::Internal(format!(
                "testee {} without a JSON result: {e}",
                output.describe_exit()
            )));
        }
    };

    match json {
        Json::String(s) if s == USER_ERROR_LITERAL => Err(EngineError::User(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        Json::Object(fields) => opts_from_json(fields)
            .map_err(|reason| EngineError::Internal(format!("unrepresentable result {reason}"))),
        other => Err(EngineError::Internal(format!(
            "testee printed {other} instead of a result object"
        ))),
    }
}

impl Engine for CommandEngine {
    fn parse(
        &self,
        doc: &str,
        argv: &[String],
        version: &str,
        help: &dyn HelpHandler,
    ) -> Result<Opts, EngineError> {
        let output = self.run(doc, argv, version)?;
        let result = interpret(&output);
        if let Err(e) = &result {
            debug!(error = %e, "testee reported an error");
            help.handle(Some(e), &String::from_utf8_lossy(&output.stderr));
        }
        result
    }
}
