//! RPC error taxonomy.

use crate::envelope::WireError;

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible RPC errors.
///
/// Errors on one call never affect other pending calls on the same channel,
/// except [`Error::ChannelClosed`] which is broadcast to every pending call
/// when the channel dies.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The channel closed (transport EOF, io failure, or peer exit) before the
	/// call completed.
	#[error("channel closed")]
	ChannelClosed,
	/// A call with an explicit deadline did not complete in time.
	#[error("call timed out: {method}")]
	CallTimeout {
		/// Method name of the timed-out call.
		method: String,
	},
	/// The peer replied with an error.
	#[error("remote error: {0}")]
	Remote(WireError),
	/// The peer sent an undecodable message.
	#[error("deserialization failed: {0}")]
	Deserialize(#[from] serde_json::Error),
	/// The peer violated the envelope framing.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// Input/output errors from the underlying transport.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}
