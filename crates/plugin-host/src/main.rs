//! Plugin host bootstrap binary.
//!
//! Spawned by the main process with stdin/stdout as the message pipe. Runs
//! the channel to EOF: when the main process closes the pipe (or dies), the
//! host exits.

use std::sync::Arc;

use atelier_plugin_host::{PluginHostRuntime, PluginRegistry, init_tracing};
use atelier_rpc::RpcChannel;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	init_tracing();

	// Built-in entry points would be registered here; deployments ship their
	// plugin set by linking a registrar into this binary.
	let registry = Arc::new(PluginRegistry::new());
	let runtime = PluginHostRuntime::new(registry);

	let (channel, proxy) = RpcChannel::new(runtime.method_table());
	runtime.connect(proxy);

	tracing::info!("plugin host up");
	if let Err(e) = channel.run(tokio::io::stdin(), tokio::io::stdout()).await {
		tracing::error!(error = %e, "plugin host channel failed");
		std::process::exit(1);
	}
}
