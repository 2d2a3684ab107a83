//! The channel message pump.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::codec::{read_envelope, write_envelope};
use crate::envelope::{Envelope, Message, Reply, WireError};
use crate::error::{Error, Result};
use crate::proxy::RpcProxy;
use crate::target::MethodTable;

#[cfg(test)]
mod tests;

/// Outbound traffic queued by proxies, consumed by the pump.
#[derive(Debug)]
pub(crate) enum Outbound {
	Request {
		method: String,
		args: Vec<JsonValue>,
		reply: oneshot::Sender<Result<JsonValue>>,
	},
	Notification {
		method: String,
		args: Vec<JsonValue>,
	},
}

/// Monotonic correlation-id source, one per channel.
#[derive(Debug, Default, Clone, Copy)]
struct CounterIdGen(u64);

impl CounterIdGen {
	fn next(&mut self) -> u64 {
		let id = self.0;
		self.0 += 1;
		id
	}
}

/// A live RPC session pairing a transport with locally exposed targets and a
/// set of pending outbound calls.
///
/// Created unbound; [`RpcChannel::run`] binds it to a transport and drives it
/// until EOF, transport failure, or all proxies dropping. On shutdown every
/// pending call is rejected with [`Error::ChannelClosed`].
pub struct RpcChannel {
	target: Arc<MethodTable>,
	rx: mpsc::UnboundedReceiver<Outbound>,
}

impl RpcChannel {
	/// Creates a channel exposing `target` to the peer, plus the proxy for
	/// issuing outbound calls.
	///
	/// Calls issued before [`RpcChannel::run`] starts are queued and written
	/// once the pump is bound to a transport.
	#[must_use]
	pub fn new(target: MethodTable) -> (Self, RpcProxy) {
		let (tx, rx) = mpsc::unbounded_channel();
		let channel = Self {
			target: Arc::new(target),
			rx,
		};
		(channel, RpcProxy::new(tx))
	}

	/// Drives the channel over the given transport until it closes.
	///
	/// Messages are written in queue order (FIFO per channel); replies to
	/// concurrent outstanding calls may resolve out of order relative to each
	/// other.
	///
	/// # Errors
	///
	/// [`Error::Io`] / [`Error::Deserialize`] / [`Error::Protocol`] from the
	/// transport. A clean peer EOF is not an error.
	pub async fn run(
		self,
		input: impl AsyncRead + Unpin + Send + 'static,
		mut output: impl AsyncWrite + Unpin + Send,
	) -> Result<()> {
		let Self { target, mut rx } = self;
		let mut pending: HashMap<u64, oneshot::Sender<Result<JsonValue>>> = HashMap::new();
		let mut ids = CounterIdGen::default();
		let mut dispatches: JoinSet<Option<Reply>> = JoinSet::new();

		// Reading runs in its own task so that a partially read frame can
		// never be lost to select-arm cancellation.
		let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
		let mut read_task = tokio::spawn(async move {
			let mut reader = BufReader::new(input);
			loop {
				match read_envelope(&mut reader).await {
					Ok(Some(envelope)) => {
						if inbound_tx.send(envelope).is_err() {
							break Ok(());
						}
					}
					Ok(None) => break Ok(()),
					Err(e) => break Err(e),
				}
			}
		});

		let outcome = loop {
			tokio::select! {
				biased;

				Some(done) = dispatches.join_next(), if !dispatches.is_empty() => {
					match done {
						Ok(Some(reply)) => {
							let envelope = Envelope::reply(reply.id, reply.outcome);
							if let Err(e) = write_envelope(&mut output, &envelope).await {
								break Err(e);
							}
						}
						Ok(None) => {}
						Err(e) => tracing::error!(error = %e, "rpc handler task panicked"),
					}
				}

				out = rx.recv() => match out {
					Some(Outbound::Request { method, args, reply }) => {
						// Timed-out callers dropped their receiver; sweep
						// their entries so the map cannot grow unbounded.
						pending.retain(|_, tx| !tx.is_closed());
						let id = ids.next();
						let envelope = Envelope::request(id, method, args);
						match write_envelope(&mut output, &envelope).await {
							Ok(()) => {
								pending.insert(id, reply);
							}
							Err(e) => {
								let _ = reply.send(Err(Error::ChannelClosed));
								break Err(e);
							}
						}
					}
					Some(Outbound::Notification { method, args }) => {
						let envelope = Envelope::notification(method, args);
						if let Err(e) = write_envelope(&mut output, &envelope).await {
							break Err(e);
						}
					}
					// All proxies dropped; nothing can issue calls anymore.
					None => break Ok(()),
				},

				inbound = inbound_rx.recv() => match inbound {
					Some(envelope) => {
						dispatch_inbound(&target, envelope, &mut pending, &mut dispatches);
					}
					// Reader finished: clean EOF or transport failure.
					None => match (&mut read_task).await {
						Ok(read_outcome) => break read_outcome,
						Err(e) => {
							tracing::error!(error = %e, "rpc read task panicked");
							break Ok(());
						}
					},
				},
			}
		};

		read_task.abort();
		dispatches.abort_all();
		for (_, reply) in pending.drain() {
			let _ = reply.send(Err(Error::ChannelClosed));
		}
		rx.close();
		while let Ok(out) = rx.try_recv() {
			if let Outbound::Request { reply, .. } = out {
				let _ = reply.send(Err(Error::ChannelClosed));
			}
		}
		outcome
	}
}

fn dispatch_inbound(
	target: &Arc<MethodTable>,
	envelope: Envelope,
	pending: &mut HashMap<u64, oneshot::Sender<Result<JsonValue>>>,
	dispatches: &mut JoinSet<Option<Reply>>,
) {
	let Some(message) = envelope.classify() else {
		tracing::debug!("dropping malformed envelope");
		return;
	};
	match message {
		Message::Reply(reply) => match pending.remove(&reply.id) {
			Some(tx) => {
				let _ = tx.send(reply.outcome.map_err(Error::Remote));
			}
			// Duplicate or unsolicited reply; correlation ids settle once.
			None => tracing::debug!(id = reply.id, "ignoring reply without pending call"),
		},
		Message::Request(request) => {
			let id = request.id;
			match target.dispatch(&request.method, request.args) {
				Some(handler) => {
					dispatches.spawn(async move { Some(Reply { id, outcome: handler.await }) });
				}
				None => {
					tracing::debug!(method = %request.method, "unknown request method");
					let outcome =
						Err(WireError::new(format!("unknown method `{}`", request.method)));
					dispatches.spawn(async move { Some(Reply { id, outcome }) });
				}
			}
		}
		Message::Notification(notification) => {
			match target.dispatch(&notification.method, notification.args) {
				Some(handler) => {
					dispatches.spawn(async move {
						if let Err(e) = handler.await {
							tracing::warn!(error = %e, "notification handler failed");
						}
						None
					});
				}
				// Per protocol: unmatched notifications are dropped silently.
				None => {
					tracing::trace!(method = %notification.method, "unmatched notification");
				}
			}
		}
	}
}
