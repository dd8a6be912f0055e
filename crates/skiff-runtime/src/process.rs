// SPDX-License-Identifier: MIT
//
// CGI-style subprocess engine.
//
// Mobile builds link the interpreter into the process; desktop development
// builds run it as a child process instead. Request metadata travels in the
// environment, the body on stdin, and stdout is the capture, exactly as an
// embedded engine would produce it.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use skiff_core::error::{Result, SkiffError};
use tracing::debug;

use crate::engine::{Invocation, ScriptEngine};

/// Runs each invocation as `<command> [base_args..] <script> [args..]`.
pub struct ProcessEngine {
    command: PathBuf,
    base_args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            base_args: Vec::new(),
        }
    }

    pub fn with_base_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.base_args = args.into_iter().collect();
        self
    }
}

impl ScriptEngine for ProcessEngine {
    fn run(&mut self, invocation: &Invocation) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.base_args)
            .arg(&invocation.script)
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        debug!(script = %invocation.script.display(), "spawning engine process");
        let mut child = command
            .spawn()
            .map_err(|e| SkiffError::Engine(format!("failed to spawn engine: {e}")))?;

        // The body is written from its own thread while stdout drains here;
        // writing inline would deadlock once the body outgrows the pipe
        // buffer and the child starts emitting output before reading stdin.
        let stdin = child.stdin.take();
        let writer = match invocation.body.clone() {
            Some(body) => stdin.map(|mut stdin| {
                std::thread::spawn(move || stdin.write_all(body.as_bytes()))
            }),
            None => {
                drop(stdin);
                None
            }
        };

        let output = child
            .wait_with_output()
            .map_err(|e| SkiffError::Engine(format!("engine process failed: {e}")))?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The child may exit without reading its stdin; a broken
                // pipe on the body is not a failure of the invocation.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("engine exited before consuming the request body");
                }
                Ok(Err(e)) => {
                    return Err(SkiffError::Engine(format!(
                        "failed to write request body: {e}"
                    )));
                }
                Err(_) => {
                    return Err(SkiffError::Engine("request body writer panicked".into()));
                }
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SkiffError::Engine(format!(
                "engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use skiff_core::{HeaderMap, ShellConfig};

    fn script_fixture(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handler.sh");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn captures_stdout_with_env_and_body() {
        let (dir, script) = script_fixture(
            "printf 'HTTP/1.1 200 OK\\r\\n\\r\\n'\nprintf '%s|' \"$REQUEST_URI\"\ncat\n",
        );
        let config = ShellConfig::default();
        let mut invocation = Invocation::for_request(
            &config,
            dir.path(),
            "POST",
            "/submit",
            None,
            &HeaderMap::new(),
            Some("payload".into()),
        );
        invocation.script = script;

        let mut engine = ProcessEngine::new("sh");
        let out = engine.run(&invocation).unwrap();
        assert_eq!(out, b"HTTP/1.1 200 OK\r\n\r\n/submit|payload");
    }

    #[test]
    fn large_bodies_do_not_stall_the_pipe() {
        // Emits a pipe-buffer's worth of output before touching stdin, so a
        // body writer that blocks the same thread as the stdout reader
        // would wedge here.
        let (dir, script) = script_fixture("head -c 131072 /dev/zero\ncat\n");
        let body = "b".repeat(131072);
        let config = ShellConfig::default();
        let mut invocation = Invocation::for_request(
            &config,
            dir.path(),
            "POST",
            "/upload",
            None,
            &HeaderMap::new(),
            Some(body.clone()),
        );
        invocation.script = script;

        let mut engine = ProcessEngine::new("sh");
        let out = engine.run(&invocation).unwrap();
        assert_eq!(out.len(), 131072 + body.len());
        assert_eq!(&out[131072..], body.as_bytes());
    }

    #[test]
    fn body_is_discarded_cleanly_when_the_engine_ignores_stdin() {
        let (dir, script) = script_fixture("printf 'done'\n");
        let config = ShellConfig::default();
        let mut invocation = Invocation::for_request(
            &config,
            dir.path(),
            "POST",
            "/fire-and-forget",
            None,
            &HeaderMap::new(),
            Some("x".repeat(262144)),
        );
        invocation.script = script;

        let mut engine = ProcessEngine::new("sh");
        let out = engine.run(&invocation).unwrap();
        assert_eq!(out, b"done");
    }

    #[test]
    fn nonzero_exit_is_an_engine_error() {
        let (dir, script) = script_fixture("echo 'boom' >&2\nexit 3\n");
        let config = ShellConfig::default();
        let mut invocation =
            Invocation::for_command(&config, dir.path(), &["migrate"]);
        invocation.script = script;

        let mut engine = ProcessEngine::new("sh");
        let err = engine.run(&invocation).unwrap_err();
        match err {
            SkiffError::Engine(detail) => assert!(detail.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_binary_is_an_engine_error() {
        let mut engine = ProcessEngine::new("/nonexistent/interpreter");
        let invocation = Invocation {
            script: "/tmp/x".into(),
            env: Vec::new(),
            body: None,
            args: Vec::new(),
        };
        assert!(matches!(
            engine.run(&invocation),
            Err(SkiffError::Engine(_))
        ));
    }
}
