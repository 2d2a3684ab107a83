//! Main-process plugin server and its container wiring.

use std::sync::{Arc, LazyLock};

use atelier_container::{ContributionId, Contributions, Module, Scope, ServiceId};
use atelier_rpc::Envelope;
use serde_json::json;

use crate::error::Result;
use crate::manager::HostedPluginSupport;
use crate::transport::PluginHostTransport;

/// Callback receiving raw messages relayed from the plugin host.
pub trait PluginServerClient: Send + Sync {
	/// Handles one raw host message. The relay never interprets contents.
	fn post_message(&self, message: Envelope);
}

/// Observer of plugin deployment, registered against [`DEPLOY_PARTICIPANTS`].
pub trait DeployParticipant: Send + Sync {
	/// Called once per deployment batch with the deployed plugin ids.
	fn on_plugins_deployed(&self, ids: &[String]);
}

/// The operations other subsystems drive plugin hosting through.
pub struct PluginServer {
	manager: Arc<HostedPluginSupport>,
}

impl PluginServer {
	/// Creates a server over the given lifecycle manager.
	#[must_use]
	pub fn new(manager: Arc<HostedPluginSupport>) -> Self {
		Self { manager }
	}

	/// The lifecycle manager backing this server.
	#[must_use]
	pub fn get_hosted_plugin(&self) -> Arc<HostedPluginSupport> {
		self.manager.clone()
	}

	/// Registers the callback receiving raw host messages.
	pub fn set_client(&self, client: Arc<dyn PluginServerClient>) {
		self.manager.set_client(client);
	}

	/// Forwards a raw message from the main-process consumer to the host.
	///
	/// # Errors
	///
	/// `ChannelClosed` when no host is live.
	pub fn on_message(&self, message: Envelope) -> Result<()> {
		self.manager.post_message(message)
	}

	/// Loads the given plugins into the host, starting it first when needed.
	///
	/// # Errors
	///
	/// Spawn or RPC failure; plugins loaded before the failure stay loaded.
	pub async fn deploy_plugins(&self, ids: &[String]) -> Result<()> {
		self.manager.ensure_running().await?;
		for id in ids {
			self.manager
				.call("loadPlugin", vec![json!(""), json!({ "id": id })])
				.await?;
			self.manager.note_plugins(std::slice::from_ref(id));
			tracing::info!(plugin = %id, "deployed plugin");
		}
		Ok(())
	}
}

/// Drives [`PluginServer::deploy_plugins`] and fans the deployed id set out to
/// every [`DEPLOY_PARTICIPANTS`] registrant.
pub struct PluginDeployer {
	server: Arc<PluginServer>,
	participants: Arc<Contributions<Arc<dyn DeployParticipant>>>,
}

impl PluginDeployer {
	/// Creates a deployer over the server and the participant collection.
	#[must_use]
	pub fn new(
		server: Arc<PluginServer>,
		participants: Arc<Contributions<Arc<dyn DeployParticipant>>>,
	) -> Self {
		Self {
			server,
			participants,
		}
	}

	/// Deploys `ids` and notifies every registered participant.
	///
	/// # Errors
	///
	/// As [`PluginServer::deploy_plugins`], plus container failure resolving
	/// the participant collection.
	pub async fn deploy(&self, ids: &[String]) -> Result<()> {
		self.server.deploy_plugins(ids).await?;
		for participant in self.participants.get()? {
			participant.on_plugins_deployed(ids);
		}
		Ok(())
	}
}

/// The transport the lifecycle manager spawns hosts through. Bound by the
/// embedding application, not by [`plugin_server_module`].
pub static PLUGIN_HOST_TRANSPORT: LazyLock<ServiceId<Arc<dyn PluginHostTransport>>> =
	LazyLock::new(|| ServiceId::new("PluginHostTransport"));

/// The singleton host lifecycle manager.
pub static HOSTED_PLUGIN_SUPPORT: LazyLock<ServiceId<Arc<HostedPluginSupport>>> =
	LazyLock::new(|| ServiceId::new("HostedPluginSupport"));

/// The singleton plugin server.
pub static PLUGIN_SERVER: LazyLock<ServiceId<Arc<PluginServer>>> =
	LazyLock::new(|| ServiceId::new("PluginServer"));

/// The singleton deployer.
pub static PLUGIN_DEPLOYER: LazyLock<ServiceId<Arc<PluginDeployer>>> =
	LazyLock::new(|| ServiceId::new("PluginDeployer"));

/// Contribution point for deployment observers.
pub static DEPLOY_PARTICIPANTS: LazyLock<ContributionId<Arc<dyn DeployParticipant>>> =
	LazyLock::new(|| ContributionId::new("DeployParticipants"));

/// Backend module binding the manager, server and deployer as singletons.
///
/// [`PLUGIN_HOST_TRANSPORT`] is a declared dependency the embedder must bind
/// before the first resolve (a [`crate::ProcessTransport`] in production, an
/// in-memory pair in tests).
#[must_use]
pub fn plugin_server_module() -> Module {
	Module::builder("plugin-server")
		.factory(&HOSTED_PLUGIN_SUPPORT, Scope::Singleton, |cx| {
			let transport = cx.resolve(&PLUGIN_HOST_TRANSPORT)?;
			Ok(Arc::new(HostedPluginSupport::new(transport)))
		})
		.factory(&PLUGIN_SERVER, Scope::Singleton, |cx| {
			let manager = cx.resolve(&HOSTED_PLUGIN_SUPPORT)?;
			Ok(Arc::new(PluginServer::new(manager)))
		})
		.factory(&PLUGIN_DEPLOYER, Scope::Singleton, |cx| {
			let server = cx.resolve(&PLUGIN_SERVER)?;
			let participants = Arc::new(cx.contributions(&DEPLOY_PARTICIPANTS));
			Ok(Arc::new(PluginDeployer::new(server, participants)))
		})
		.build()
}
