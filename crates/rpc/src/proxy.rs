//! Cloneable call proxies for a remote interface.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};

use crate::channel::Outbound;
use crate::error::{Error, Result};

/// Transparent local proxy for the remote side of a channel.
///
/// Every [`RpcProxy::call`] allocates a fresh correlation id inside the
/// channel loop, writes the request and suspends until the matching reply
/// arrives. Calls made after the channel closed fail immediately with
/// [`Error::ChannelClosed`], without blocking.
#[derive(Debug, Clone)]
pub struct RpcProxy {
	tx: mpsc::UnboundedSender<Outbound>,
}

impl RpcProxy {
	pub(crate) fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
		Self { tx }
	}

	/// Calls a remote method and awaits the correlated reply.
	///
	/// Replies may arrive out of send order; concurrent calls resolve
	/// independently. There is no implicit deadline; a pending call settles
	/// only through a reply or channel closure.
	///
	/// # Errors
	///
	/// [`Error::Remote`] when the peer replies with an error,
	/// [`Error::ChannelClosed`] when the channel dies first.
	pub async fn call(&self, method: impl Into<String>, args: Vec<JsonValue>) -> Result<JsonValue> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.tx
			.send(Outbound::Request {
				method: method.into(),
				args,
				reply: reply_tx,
			})
			.map_err(|_| Error::ChannelClosed)?;
		reply_rx.await.map_err(|_| Error::ChannelClosed)?
	}

	/// Like [`RpcProxy::call`], but gives up after `deadline`.
	///
	/// # Errors
	///
	/// [`Error::CallTimeout`] when no reply arrived in time; otherwise as
	/// [`RpcProxy::call`].
	pub async fn call_with_timeout(
		&self,
		method: impl Into<String>,
		args: Vec<JsonValue>,
		deadline: Duration,
	) -> Result<JsonValue> {
		let method = method.into();
		match tokio::time::timeout(deadline, self.call(method.clone(), args)).await {
			Ok(outcome) => outcome,
			Err(_) => Err(Error::CallTimeout { method }),
		}
	}

	/// Sends a fire-and-forget notification.
	///
	/// # Errors
	///
	/// [`Error::ChannelClosed`] when the channel is gone.
	pub fn notify(&self, method: impl Into<String>, args: Vec<JsonValue>) -> Result<()> {
		self.tx
			.send(Outbound::Notification {
				method: method.into(),
				args,
			})
			.map_err(|_| Error::ChannelClosed)
	}

	/// Whether the channel loop is still accepting messages.
	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}
