//! Hosted plugin process lifecycle manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{Value as JsonValue, json};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

use atelier_rpc::codec::{read_envelope, write_envelope};
use atelier_rpc::{Envelope, Error as RpcError};

use crate::error::{Error, Result};
use crate::server::PluginServerClient;
use crate::transport::PluginHostTransport;

/// Transient lifecycle calls allocate correlation ids downward from
/// `u64::MAX`, keeping clear of ids chosen by the client's own channel in the
/// relayed traffic.
const TRANSIENT_ID_FLOOR: u64 = u64::MAX - u32::MAX as u64;

/// How long a graceful stop call may take before the child is killed anyway.
const STOP_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded wait for the child to die after the kill signal.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Lifecycle state of the managed plugin host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
	/// No live host process.
	Idle,
	/// Spawn in progress.
	Starting,
	/// Host is up and serving.
	Running,
	/// Graceful stop in progress.
	Stopping,
}

/// Outbound traffic to the host: raw client messages relayed verbatim, plus
/// manager-initiated lifecycle calls tracked by the io loop's pending map.
enum HostOutbound {
	Raw(Envelope),
	Call {
		method: String,
		args: Vec<JsonValue>,
		reply: oneshot::Sender<Result<JsonValue>>,
	},
}

struct HostHandle {
	child: Option<Child>,
	pump: tokio::task::JoinHandle<()>,
}

type SharedClient = Arc<RwLock<Option<Arc<dyn PluginServerClient>>>>;

/// Lifecycle manager for at most one live plugin host process.
///
/// Transitions are serialized by an async mutex: a `run_plugin_server` call
/// racing a stop (or another run) waits for the in-flight transition instead
/// of producing a second child.
pub struct HostedPluginSupport {
	transport: Arc<dyn PluginHostTransport>,
	lifecycle: tokio::sync::Mutex<Option<HostHandle>>,
	outbound: RwLock<Option<mpsc::UnboundedSender<HostOutbound>>>,
	state: Arc<Mutex<HostState>>,
	client: SharedClient,
	plugins: Mutex<Vec<String>>,
}

impl HostedPluginSupport {
	/// Creates a manager over the given transport; no process is started yet.
	#[must_use]
	pub fn new(transport: Arc<dyn PluginHostTransport>) -> Self {
		Self {
			transport,
			lifecycle: tokio::sync::Mutex::new(None),
			outbound: RwLock::new(None),
			state: Arc::new(Mutex::new(HostState::Idle)),
			client: Arc::new(RwLock::new(None)),
			plugins: Mutex::new(Vec::new()),
		}
	}

	/// Current lifecycle state. An unexpected child exit shows up as `Idle`.
	#[must_use]
	pub fn state(&self) -> HostState {
		*self.state.lock()
	}

	/// Registers the callback receiving raw host messages. The manager relays
	/// every non-lifecycle inbound message here without interpretation.
	pub fn set_client(&self, client: Arc<dyn PluginServerClient>) {
		*self.client.write() = Some(client);
	}

	/// Ids of plugins loaded into the current host.
	#[must_use]
	pub fn running_plugins(&self) -> Vec<String> {
		self.plugins.lock().clone()
	}

	pub(crate) fn note_plugins(&self, ids: &[String]) {
		let mut plugins = self.plugins.lock();
		for id in ids {
			if !plugins.contains(id) {
				plugins.push(id.clone());
			}
		}
	}

	/// Starts a fresh plugin host, stopping the current one first if any.
	///
	/// # Errors
	///
	/// [`Error::Spawn`] when the transport fails (the manager stays `Idle`),
	/// or the failure of the post-spawn `initialize` call.
	pub async fn run_plugin_server(&self) -> Result<()> {
		let mut lifecycle = self.lifecycle.lock().await;
		if lifecycle.is_some() {
			self.stop_locked(&mut lifecycle).await;
		}
		self.start_locked(&mut lifecycle).await
	}

	/// Starts the host only when none is live; a running host is left alone.
	///
	/// # Errors
	///
	/// As [`HostedPluginSupport::run_plugin_server`].
	pub async fn ensure_running(&self) -> Result<()> {
		let mut lifecycle = self.lifecycle.lock().await;
		let live = self
			.outbound
			.read()
			.as_ref()
			.is_some_and(|tx| !tx.is_closed());
		if lifecycle.is_some() && live {
			return Ok(());
		}
		if lifecycle.is_some() {
			// The child died behind our back; clean up before restarting.
			self.stop_locked(&mut lifecycle).await;
		}
		self.start_locked(&mut lifecycle).await
	}

	/// Gracefully stops the host, then kills the process.
	///
	/// A no-op when no host is running. Otherwise exactly one remote
	/// `stopPlugins` call is issued, and only once it settles (success,
	/// failure, or timeout) is the child force-terminated.
	pub async fn stop_plugin_server(&self) {
		let mut lifecycle = self.lifecycle.lock().await;
		self.stop_locked(&mut lifecycle).await;
	}

	/// Issues a lifecycle call over the transient correlation layer.
	///
	/// # Errors
	///
	/// [`Error::ProcessExited`] when the host died unexpectedly,
	/// [`Error::Rpc`] for channel closure or a remote error reply.
	pub async fn call(&self, method: &str, args: Vec<JsonValue>) -> Result<JsonValue> {
		let tx = self
			.outbound
			.read()
			.clone()
			.ok_or(Error::Rpc(RpcError::ChannelClosed))?;
		if tx.is_closed() {
			return Err(Error::ProcessExited);
		}
		call_on(&tx, method, args).await
	}

	/// Forwards a raw message to the host, without interpretation.
	///
	/// # Errors
	///
	/// [`Error::Rpc`] with [`RpcError::ChannelClosed`] when no host is live.
	pub fn post_message(&self, message: Envelope) -> Result<()> {
		let tx = self
			.outbound
			.read()
			.clone()
			.ok_or(Error::Rpc(RpcError::ChannelClosed))?;
		tx.send(HostOutbound::Raw(message))
			.map_err(|_| Error::Rpc(RpcError::ChannelClosed))
	}

	async fn start_locked(&self, lifecycle: &mut Option<HostHandle>) -> Result<()> {
		*self.state.lock() = HostState::Starting;
		let connection = match self.transport.start().await {
			Ok(connection) => connection,
			Err(e) => {
				*self.state.lock() = HostState::Idle;
				return Err(e);
			}
		};

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let pump = tokio::spawn(run_host_io(
			connection.reader,
			connection.writer,
			outbound_rx,
			self.client.clone(),
			self.state.clone(),
		));
		*lifecycle = Some(HostHandle {
			child: connection.child,
			pump,
		});
		*self.outbound.write() = Some(outbound_tx.clone());
		self.plugins.lock().clear();
		*self.state.lock() = HostState::Running;

		let metadata = json!({
			"name": env!("CARGO_PKG_NAME"),
			"version": env!("CARGO_PKG_VERSION"),
		});
		match call_on(&outbound_tx, "initialize", vec![json!(""), metadata]).await {
			Ok(_) => Ok(()),
			Err(e) => {
				tracing::error!(error = %e, "plugin host initialize failed");
				self.stop_locked(lifecycle).await;
				Err(e)
			}
		}
	}

	async fn stop_locked(&self, lifecycle: &mut Option<HostHandle>) {
		let Some(mut handle) = lifecycle.take() else {
			return;
		};
		*self.state.lock() = HostState::Stopping;
		let outbound = self.outbound.write().take();
		let ids = std::mem::take(&mut *self.plugins.lock());

		// Phase one: ask the host to unload its plugins. The single stop call
		// must settle before the process is killed, so state can be flushed.
		if let Some(tx) = outbound.filter(|tx| !tx.is_closed()) {
			let stop = call_on(&tx, "stopPlugins", vec![json!(""), json!(ids)]);
			match tokio::time::timeout(STOP_CALL_TIMEOUT, stop).await {
				Ok(Ok(_)) => {}
				Ok(Err(e)) => tracing::warn!(error = %e, "stopPlugins failed; killing host anyway"),
				Err(_) => tracing::warn!("stopPlugins timed out; killing host anyway"),
			}
		}

		// Phase two: force-terminate.
		if let Some(child) = handle.child.as_mut() {
			let _ = child.start_kill();
			let _ = tokio::time::timeout(KILL_WAIT, child.wait()).await;
		}
		handle.pump.abort();
		*self.state.lock() = HostState::Idle;
	}
}

async fn call_on(
	tx: &mpsc::UnboundedSender<HostOutbound>,
	method: impl Into<String>,
	args: Vec<JsonValue>,
) -> Result<JsonValue> {
	let (reply_tx, reply_rx) = oneshot::channel();
	tx.send(HostOutbound::Call {
		method: method.into(),
		args,
		reply: reply_tx,
	})
	.map_err(|_| Error::Rpc(RpcError::ChannelClosed))?;
	reply_rx
		.await
		.map_err(|_| Error::Rpc(RpcError::ChannelClosed))?
}

/// The io loop owning the host transport.
///
/// Outbound raw messages and lifecycle calls are written in queue order;
/// inbound reply envelopes matching a transient lifecycle id settle the
/// pending call, everything else is relayed verbatim to the client callback.
async fn run_host_io(
	reader: Box<dyn AsyncRead + Send + Unpin>,
	mut writer: Box<dyn AsyncWrite + Send + Unpin>,
	mut outbound_rx: mpsc::UnboundedReceiver<HostOutbound>,
	client: SharedClient,
	state: Arc<Mutex<HostState>>,
) {
	let mut pending: HashMap<u64, oneshot::Sender<Result<JsonValue>>> = HashMap::new();
	let mut next_transient = u64::MAX;

	let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
	let read_task = tokio::spawn(async move {
		let mut reader = BufReader::new(reader);
		loop {
			match read_envelope(&mut reader).await {
				Ok(Some(envelope)) => {
					if inbound_tx.send(envelope).is_err() {
						break;
					}
				}
				Ok(None) => {
					tracing::info!("plugin host closed its message pipe");
					break;
				}
				Err(e) => {
					tracing::warn!(error = %e, "error reading from plugin host");
					break;
				}
			}
		}
	});

	loop {
		tokio::select! {
			out = outbound_rx.recv() => match out {
				Some(HostOutbound::Raw(envelope)) => {
					if let Err(e) = write_envelope(&mut writer, &envelope).await {
						tracing::warn!(error = %e, "host write failed; terminating io loop");
						break;
					}
				}
				Some(HostOutbound::Call { method, args, reply }) => {
					let id = next_transient;
					next_transient -= 1;
					let envelope = Envelope::request(id, method, args);
					match write_envelope(&mut writer, &envelope).await {
						Ok(()) => {
							pending.insert(id, reply);
						}
						Err(e) => {
							tracing::warn!(error = %e, "host write failed; terminating io loop");
							let _ = reply.send(Err(Error::Rpc(RpcError::ChannelClosed)));
							break;
						}
					}
				}
				None => break,
			},

			inbound = inbound_rx.recv() => match inbound {
				Some(envelope) => {
					let is_transient_reply = envelope.method.is_none()
						&& envelope.id.is_some_and(|id| id >= TRANSIENT_ID_FLOOR);
					if is_transient_reply {
						settle_transient(envelope, &mut pending);
					} else {
						let target = client.read().clone();
						match target {
							Some(client) => client.post_message(envelope),
							None => tracing::debug!("dropping host message; no client registered"),
						}
					}
				}
				// Reader finished: EOF, read failure, or child exit.
				None => break,
			},
		}
	}

	read_task.abort();
	for (_, reply) in pending.drain() {
		let _ = reply.send(Err(Error::Rpc(RpcError::ChannelClosed)));
	}
	outbound_rx.close();
	while let Ok(out) = outbound_rx.try_recv() {
		if let HostOutbound::Call { reply, .. } = out {
			let _ = reply.send(Err(Error::Rpc(RpcError::ChannelClosed)));
		}
	}
	*state.lock() = HostState::Idle;
}

fn settle_transient(
	envelope: Envelope,
	pending: &mut HashMap<u64, oneshot::Sender<Result<JsonValue>>>,
) {
	let Some(id) = envelope.id else { return };
	let Some(reply) = pending.remove(&id) else {
		tracing::debug!(id, "ignoring reply without pending lifecycle call");
		return;
	};
	let outcome = match (envelope.result, envelope.error) {
		(_, Some(error)) => Err(Error::Rpc(RpcError::Remote(error))),
		(result, None) => Ok(result.unwrap_or(JsonValue::Null)),
	};
	let _ = reply.send(outcome);
}
