//! Restricted plugin host runtime for the isolated child process.
//!
//! A plugin host talks to the main process exclusively through framed JSON
//! envelopes on stdio; it opens no sockets and holds no handle back into the
//! main process. Plugin code sees only the `commands` facade:
//! * [`PluginRegistry`] / [`PluginEntry`]: explicit table of activation entry
//!   points, populated at host startup
//! * [`PluginHostRuntime`]: the lifecycle method table (`initialize`,
//!   `loadPlugin`, `stopPlugins`, `executeCommand`)
//! * [`CommandRegistry`]: duplicate-checked command registration, announced
//!   to the main process over the channel

#![warn(missing_docs)]

// Used by the bootstrap binary target.
use tokio as _;

mod commands;
mod plugin;
mod runtime;

pub use commands::{CommandDescriptor, CommandError, CommandHandler, CommandRegistry};
pub use plugin::{PluginApi, PluginDescriptor, PluginEntry, PluginRegistry};
pub use runtime::PluginHostRuntime;

/// Installs the stderr tracing subscriber for the host process.
///
/// Stdout carries the message pipe, so diagnostics must never touch it.
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_writer(std::io::stderr)
		.init();
}
