//! Hosted plugin process lifecycle and the main-process plugin server.
//!
//! This crate owns the main-process half of plugin hosting:
//! * [`PluginHostTransport`]: seam over how a plugin host comes to life —
//!   [`ProcessTransport`] spawns the real child process with piped stdio,
//!   tests substitute an in-memory pair
//! * [`HostedPluginSupport`]: lifecycle manager for at most one live plugin
//!   host (`Idle → Starting → Running → Stopping → Idle`), relaying raw
//!   messages to the registered client and issuing lifecycle calls over a
//!   transient correlation layer
//! * [`PluginServer`] / [`PluginDeployer`]: the operations other subsystems
//!   drive plugin hosting through, wired up by [`plugin_server_module`]

#![warn(missing_docs)]

mod error;
mod manager;
mod server;
mod transport;

pub use error::{Error, Result};
pub use manager::{HostState, HostedPluginSupport};
pub use server::{
	DEPLOY_PARTICIPANTS, DeployParticipant, HOSTED_PLUGIN_SUPPORT, PLUGIN_DEPLOYER,
	PLUGIN_HOST_TRANSPORT, PLUGIN_SERVER, PluginDeployer, PluginServer, PluginServerClient,
	plugin_server_module,
};
pub use transport::{HostConnection, HostSpawnOptions, PluginHostTransport, ProcessTransport};
