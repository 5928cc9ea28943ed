//! Plugin transport layer
//!
//! Abstracts the pipe to a plugin process for testability:
//! - PluginTransport trait: one request in, one response out
//! - ProcessTransport: a spawned plugin speaking JSON lines on stdin/stdout
//! - MockTransport (in `plugin::mock`): in-process plugin for tests

use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use relforge_plugin::{PluginRequest, PluginResponse};

use crate::config::PluginConfig;

/// How long a plugin may take to exit after its stdin is closed
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Transport trait for plugin communication
pub trait PluginTransport: Send {
    /// Send one request and read its response
    fn round_trip(&mut self, request: &PluginRequest) -> Result<PluginResponse, TransportError>;

    /// Shut the plugin down. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to start plugin command {command:?}: {source}")]
    Spawn { command: String, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response line {line:?}: {message}")]
    Decode { line: String, message: String },

    #[error("plugin closed its output")]
    Closed,

    #[error("plugin exited with {0}")]
    Exited(String),

    #[error("plugin did not exit within {0:?} after its input was closed and was killed")]
    CloseTimeout(Duration),
}

/// A plugin running as a child process
pub struct ProcessTransport {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    close_timeout: Duration,
    closed: bool,
}

impl ProcessTransport {
    /// Spawn the plugin. Stdin and stdout are piped, stderr is inherited so
    /// plugin diagnostics show up in the relforge output.
    pub fn spawn(plugin: &PluginConfig, project_dir: &Path) -> Result<Self, TransportError> {
        let dir = match &plugin.dir {
            Some(dir) => project_dir.join(dir),
            None => project_dir.to_path_buf(),
        };

        let mut child = Command::new(&plugin.command)
            .args(&plugin.args)
            .envs(&plugin.env)
            .current_dir(&dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: plugin.command.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = match child.stdout.take() {
            Some(stdout) => BufReader::new(stdout),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransportError::Closed);
            }
        };

        Ok(Self {
            child,
            stdin,
            stdout,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            closed: false,
        })
    }

    /// Grace period between closing stdin and killing the process
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// OS process id of the plugin
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Wait for exit until the deadline, then kill. `None` means killed.
    fn wait_with_deadline(&mut self) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + self.close_timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }

        // The process may exit between the last poll and the kill
        if let Err(err) = self.child.kill() {
            if err.kind() != io::ErrorKind::InvalidInput {
                return Err(err);
            }
        }
        self.child.wait()?;
        Ok(None)
    }
}

impl PluginTransport for ProcessTransport {
    fn round_trip(&mut self, request: &PluginRequest) -> Result<PluginResponse, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;

        let line = serde_json::to_string(request)?;
        writeln!(stdin, "{}", line)?;
        stdin.flush()?;

        let mut response = String::new();
        if self.stdout.read_line(&mut response)? == 0 {
            return Err(TransportError::Closed);
        }

        serde_json::from_str(response.trim_end()).map_err(|e| TransportError::Decode {
            line: response.trim_end().to_string(),
            message: e.to_string(),
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // EOF on stdin asks the plugin to exit
        drop(self.stdin.take());
        match self.wait_with_deadline()? {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(TransportError::Exited(status.to_string())),
            None => Err(TransportError::CloseTimeout(self.close_timeout)),
        }
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if !self.closed {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use relforge_plugin::Operation;
    use serde_json::json;

    fn shell(script: &str) -> PluginConfig {
        PluginConfig {
            id: "sh".to_string(),
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..Default::default()
        }
    }

    fn request() -> PluginRequest {
        PluginRequest::new(Operation::Heartbeat, "req-1", &json!({"nonce": "n"})).unwrap()
    }

    #[test]
    fn test_spawn_missing_command() {
        let plugin = PluginConfig {
            command: "/definitely/not/a/plugin".to_string(),
            ..Default::default()
        };
        let err = ProcessTransport::spawn(&plugin, Path::new(".")).err().unwrap();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }

    #[test]
    fn test_eof_is_closed() {
        let mut transport = ProcessTransport::spawn(&shell("exit 0"), Path::new(".")).unwrap();
        let err = transport.round_trip(&request()).unwrap_err();
        assert!(matches!(err, TransportError::Closed | TransportError::Io(_)));
    }

    #[test]
    fn test_garbage_line_is_decode_error() {
        let mut transport =
            ProcessTransport::spawn(&shell("read line; echo not-json"), Path::new(".")).unwrap();
        let err = transport.round_trip(&request()).unwrap_err();
        assert!(matches!(err, TransportError::Decode { ref line, .. } if line == "not-json"));
        transport.close().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut transport = ProcessTransport::spawn(&shell("cat > /dev/null"), Path::new(".")).unwrap();
        assert!(transport.pid() > 0);
        transport.close().unwrap();
        transport.close().unwrap();
        assert!(matches!(transport.round_trip(&request()), Err(TransportError::Closed)));
    }

    #[test]
    fn test_close_reports_exit_status() {
        let mut transport =
            ProcessTransport::spawn(&shell("cat > /dev/null; exit 3"), Path::new(".")).unwrap();
        assert!(matches!(transport.close(), Err(TransportError::Exited(_))));
    }

    #[test]
    fn test_close_kills_lingering_plugin() {
        let mut transport = ProcessTransport::spawn(&shell("cat > /dev/null; exec sleep 30"), Path::new("."))
            .unwrap()
            .with_close_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let err = transport.close().unwrap_err();
        assert!(matches!(err, TransportError::CloseTimeout(t) if t == Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(10));

        // Already reaped, nothing left to wait for
        transport.close().unwrap();
    }
}
