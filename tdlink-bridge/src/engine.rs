//! Engine child process.

use crate::config::file::EngineConfig;
use std::process::Stdio;
use tdlink_core::{LineSink, LineSource, line_transport};
use thiserror::Error;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn engine {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("engine {0} has no piped stdio")]
    MissingPipe(&'static str),
}

/// A running engine and both halves of its line transport.
pub struct EngineProcess {
    pub child: Child,
    pub sink: LineSink<ChildStdin>,
    pub source: LineSource<ChildStdout>,
}

/// Start the engine with piped stdin/stdout. The process is killed when
/// the returned [`Child`] is dropped.
pub fn spawn_engine(config: &EngineConfig) -> Result<EngineProcess, EngineError> {
    let mut child = Command::new(&config.command)
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| EngineError::Spawn {
            command: config.command.clone(),
            source,
        })?;

    let stdin = child.stdin.take().ok_or(EngineError::MissingPipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(EngineError::MissingPipe("stdout"))?;
    let (sink, source) = line_transport(stdout, stdin);

    tracing::info!(command = %config.command, pid = ?child.id(), "Engine started");
    Ok(EngineProcess {
        child,
        sink,
        source,
    })
}
