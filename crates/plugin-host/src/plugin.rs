//! Plugin entry points and the static activation registry.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::commands::CommandRegistry;

/// Identity of a deployable plugin, as sent by the main process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
	/// Unique plugin id.
	pub id: String,
}

/// The restricted API surface handed to plugin code.
///
/// Plugins see only this facade; there is no route from here to the
/// container, the process, or the raw channel.
#[derive(Clone)]
pub struct PluginApi {
	/// Command registration and execution.
	pub commands: Arc<CommandRegistry>,
}

/// A plugin's activation entry point.
///
/// Activation outcomes are not surfaced to the main process; a plugin becomes
/// observable only by calling back through the [`PluginApi`] facade.
pub trait PluginEntry: Send + Sync {
	/// Called once when the plugin is loaded into the host.
	///
	/// # Errors
	///
	/// Logged by the runtime; does not block other plugins from activating.
	fn activate(&self, api: &PluginApi) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

	/// Called once during host shutdown, in deployment order.
	///
	/// # Errors
	///
	/// Logged and swallowed; one failing plugin cannot block shutdown of
	/// others.
	fn deactivate(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		Ok(())
	}
}

/// Explicit table of plugin ids to activation entry points.
///
/// Entries are registered at host startup; `loadPlugin` only ever looks up
/// this table, there is no dynamic discovery of activation code.
#[derive(Default)]
pub struct PluginRegistry {
	entries: RwLock<FxHashMap<String, Arc<dyn PluginEntry>>>,
}

impl PluginRegistry {
	/// Creates an empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an entry point under `id`, replacing any previous one.
	pub fn register(&self, id: impl Into<String>, entry: Arc<dyn PluginEntry>) {
		self.entries.write().insert(id.into(), entry);
	}

	/// Looks up the entry point for `id`.
	#[must_use]
	pub fn get(&self, id: &str) -> Option<Arc<dyn PluginEntry>> {
		self.entries.read().get(id).cloned()
	}
}
