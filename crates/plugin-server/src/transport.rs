//! Transport seam for bringing a plugin host to life.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use crate::error::{Error, Result};

/// How to launch the plugin host binary.
#[derive(Debug, Clone)]
pub struct HostSpawnOptions {
	/// Path to the bootstrap entry point (the plugin host binary).
	pub command: PathBuf,
	/// Extra arguments.
	pub args: Vec<String>,
	/// Extra environment variables.
	pub env: Vec<(String, String)>,
}

impl HostSpawnOptions {
	/// Options launching `command` with no extra arguments or environment.
	#[must_use]
	pub fn new(command: impl Into<PathBuf>) -> Self {
		Self {
			command: command.into(),
			args: Vec::new(),
			env: Vec::new(),
		}
	}
}

/// A live connection to a plugin host.
///
/// `child` is present when the host runs in a real OS process; in-memory
/// transports leave it empty.
pub struct HostConnection {
	/// Messages from the host.
	pub reader: Box<dyn AsyncRead + Send + Unpin>,
	/// Messages to the host.
	pub writer: Box<dyn AsyncWrite + Send + Unpin>,
	/// Process handle, when one exists.
	pub child: Option<Child>,
}

/// Pluggable factory for plugin host connections.
#[async_trait]
pub trait PluginHostTransport: Send + Sync {
	/// Starts a fresh plugin host and returns its connection.
	async fn start(&self) -> Result<HostConnection>;
}

/// Spawns the plugin host binary as a child process.
///
/// Standard io is fixed: stdin/stdout carry the message pipe, stderr is
/// inherited so host logs land in the main process log stream. The child
/// opens no listening sockets; the pipe is its only channel.
pub struct ProcessTransport {
	options: HostSpawnOptions,
}

impl ProcessTransport {
	/// Creates a transport spawning with the given options.
	#[must_use]
	pub fn new(options: HostSpawnOptions) -> Self {
		Self { options }
	}
}

#[async_trait]
impl PluginHostTransport for ProcessTransport {
	async fn start(&self) -> Result<HostConnection> {
		let mut cmd = Command::new(&self.options.command);
		cmd.args(&self.options.args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true);
		for (key, value) in &self.options.env {
			cmd.env(key, value);
		}

		let command = self.options.command.display().to_string();
		let mut child = cmd.spawn().map_err(|e| Error::Spawn {
			command: command.clone(),
			reason: e.to_string(),
		})?;

		let stdin = child.stdin.take().ok_or_else(|| Error::Spawn {
			command: command.clone(),
			reason: "failed to capture stdin".into(),
		})?;
		let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
			command: command.clone(),
			reason: "failed to capture stdout".into(),
		})?;

		tracing::info!(command = %command, "spawned plugin host");
		Ok(HostConnection {
			reader: Box::new(stdout),
			writer: Box::new(stdin),
			child: Some(child),
		})
	}
}
