//! Child-process runner used to observe faults from the outside.
//!
//! A fault kills whatever process it runs in, so the only way to check which
//! one fired is to run the harness in a child and look at how it ended.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    Timeout,
    Crash(String),
    Other(String),
}

pub enum InputDelivery {
    StdIn,
    /// Input is written to a temporary file; `{}` in the template is replaced by its path.
    File(String),
}

pub struct CommandExecutorConfig {
    pub command: Vec<String>,
    pub input_delivery: InputDelivery,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub status: ExecutionStatus,
    pub output: ProcessOutput,
}

impl Execution {
    fn failed(status: ExecutionStatus) -> Self {
        Self {
            status,
            output: ProcessOutput::default(),
        }
    }
}

pub struct CommandExecutor {
    config: CommandExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self { config }
    }

    fn wait_with_timeout(
        &self,
        child: &mut Child,
        timeout: Duration,
    ) -> Result<ExitStatus, ExecutionStatus> {
        let start_time = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start_time.elapsed() > timeout {
                        tracing::warn!("target timed out, killing");
                        if let Err(e) = child.kill() {
                            return Err(ExecutionStatus::Other(format!(
                                "Failed to kill timed-out process: {e}",
                            )));
                        }
                        let _ = child.wait();
                        return Err(ExecutionStatus::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    return Err(ExecutionStatus::Other(format!(
                        "Error waiting for child: {e}",
                    )));
                }
            }
        }
    }

    pub fn execute(&self, input: &[u8]) -> Execution {
        let Some((program, args)) = self.config.command.split_first() else {
            return Execution::failed(ExecutionStatus::Other("Empty command".to_string()));
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.envs(self.config.envs.iter().map(|(k, v)| (k, v)));

        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }

        // Held until the child exits so the file outlives it.
        let mut _temp_file: Option<tempfile::NamedTempFile> = None;

        match &self.config.input_delivery {
            InputDelivery::StdIn => {
                cmd.stdin(Stdio::piped());
            }
            InputDelivery::File(arg_template) => {
                let mut named_temp_file = match tempfile::NamedTempFile::new() {
                    Ok(f) => f,
                    Err(e) => {
                        return Execution::failed(ExecutionStatus::Other(format!(
                            "Failed to create temp file: {e}",
                        )));
                    }
                };
                if let Err(e) = named_temp_file.write_all(input).and_then(|_| named_temp_file.flush()) {
                    return Execution::failed(ExecutionStatus::Other(format!(
                        "Failed to write to temp file {:?}: {}",
                        named_temp_file.path(),
                        e
                    )));
                }
                let path_str = named_temp_file.path().to_string_lossy().into_owned();
                cmd.arg(arg_template.replace("{}", &path_str));
                cmd.stdin(Stdio::null());
                _temp_file = Some(named_temp_file);
            }
        }

        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Execution::failed(ExecutionStatus::Other(format!(
                    "Failed to spawn command '{:?}': {}",
                    self.config.command, e
                )));
            }
        };

        let stderr_reader = child.stderr.take().map(spawn_reader);

        if let InputDelivery::StdIn = self.config.input_delivery {
            if let Some(mut child_stdin) = child.stdin.take() {
                // A target that exits without reading its input closes the pipe
                // early; that is not an execution failure.
                if let Err(e) = child_stdin.write_all(input) {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Execution::failed(ExecutionStatus::Other(format!(
                            "Failed to write to stdin: {e}"
                        )));
                    }
                }
            }
        }

        let wait_result = self.wait_with_timeout(&mut child, self.config.timeout);
        let mut output = ProcessOutput {
            stderr: stderr_reader
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default(),
            ..ProcessOutput::default()
        };

        let status = match wait_result {
            Ok(status) => {
                output.exit_code = status.code();
                output.signal = exit_signal(&status);
                if status.success() {
                    ExecutionStatus::Ok
                } else if let Some(code) = output.exit_code {
                    ExecutionStatus::Crash(format!("Exited with code {code}"))
                } else if let Some(signal) = output.signal {
                    ExecutionStatus::Crash(format!("Terminated by signal {signal}"))
                } else {
                    ExecutionStatus::Crash("Exited abnormally".to_string())
                }
            }
            Err(status) => status,
        };

        Execution { status, output }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
