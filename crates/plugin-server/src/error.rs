//! Plugin-server error taxonomy.

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible plugin-server errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The plugin host process could not be spawned. The manager stays `Idle`.
	#[error("failed to spawn plugin host `{command}`: {reason}")]
	Spawn {
		/// The command that failed to start.
		command: String,
		/// Underlying failure description.
		reason: String,
	},
	/// The plugin host process exited while the manager considered it running.
	#[error("plugin host process exited unexpectedly")]
	ProcessExited,
	/// RPC failure on the host channel.
	#[error(transparent)]
	Rpc(#[from] atelier_rpc::Error),
	/// Container failure during bootstrap resolution.
	#[error(transparent)]
	Container(#[from] atelier_container::Error),
}
