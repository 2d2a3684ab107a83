//! The command registry surfaced to plugin code.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use atelier_rpc::RpcProxy;

/// Command metadata registered by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
	/// Unique command id, e.g. `sample.hello`.
	pub id: String,
	/// Human-readable label for pickers and menus.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
}

impl CommandDescriptor {
	/// A descriptor with only an id.
	#[must_use]
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			label: None,
		}
	}
}

/// Possible command facade errors.
///
/// These stay local to the hosted runtime; over the wire they become error
/// replies, never a crash of the host process.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CommandError {
	/// The command id is already registered in this runtime.
	#[error("command already registered: {id}")]
	DuplicateCommand {
		/// The contested id.
		id: String,
	},
	/// No command with this id is registered.
	#[error("unknown command: {id}")]
	UnknownCommand {
		/// The missing id.
		id: String,
	},
	/// The command is registered but carries no handler.
	#[error("command has no handler: {id}")]
	NoHandler {
		/// The handlerless id.
		id: String,
	},
	/// The handler ran and failed.
	#[error("command failed: {0}")]
	Failed(String),
}

/// A command implementation, invoked with the raw call arguments.
pub type CommandHandler =
	Arc<dyn Fn(Vec<JsonValue>) -> Result<JsonValue, CommandError> + Send + Sync>;

#[derive(Default)]
struct State {
	descriptors: FxHashMap<String, CommandDescriptor>,
	handlers: FxHashMap<String, CommandHandler>,
}

/// Command registry backing the `commands` facade handed to plugins.
///
/// Registration is checked locally first; only a locally accepted command is
/// announced to the main process, so a duplicate id never touches the wire.
#[derive(Default)]
pub struct CommandRegistry {
	state: Mutex<State>,
	proxy: RwLock<Option<RpcProxy>>,
}

impl CommandRegistry {
	/// Creates an empty registry, not yet connected to the main process.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds the proxy used to announce registrations to the main process.
	pub(crate) fn connect(&self, proxy: RpcProxy) {
		*self.proxy.write() = Some(proxy);
	}

	/// Registers a command, optionally with its handler, and forwards a
	/// `registerCommand` notification to the main-process registry.
	///
	/// # Errors
	///
	/// [`CommandError::DuplicateCommand`] when the id is taken; the existing
	/// registration is untouched and nothing is sent.
	pub fn register_command(
		&self,
		descriptor: CommandDescriptor,
		handler: Option<CommandHandler>,
	) -> Result<(), CommandError> {
		{
			let mut state = self.state.lock();
			if state.descriptors.contains_key(&descriptor.id) {
				return Err(CommandError::DuplicateCommand {
					id: descriptor.id.clone(),
				});
			}
			if let Some(handler) = handler {
				state.handlers.insert(descriptor.id.clone(), handler);
			}
			state
				.descriptors
				.insert(descriptor.id.clone(), descriptor.clone());
		}

		let payload =
			serde_json::to_value(&descriptor).map_err(|e| CommandError::Failed(e.to_string()))?;
		let proxy = self.proxy.read().clone();
		match proxy {
			// Sent as a notification: the main-process registry only records
			// the descriptor, and the duplicate check already ran locally, so
			// there is no reply worth waiting on.
			Some(proxy) => {
				if let Err(e) = proxy.notify("registerCommand", vec![payload]) {
					tracing::warn!(command = %descriptor.id, error = %e, "failed to announce command");
				}
			}
			None => tracing::debug!(command = %descriptor.id, "registered before channel connect"),
		}
		Ok(())
	}

	/// Attaches a handler to an already registered command.
	///
	/// # Errors
	///
	/// [`CommandError::UnknownCommand`] when no such command is registered.
	pub fn register_handler(&self, id: &str, handler: CommandHandler) -> Result<(), CommandError> {
		let mut state = self.state.lock();
		if !state.descriptors.contains_key(id) {
			return Err(CommandError::UnknownCommand { id: id.into() });
		}
		state.handlers.insert(id.to_string(), handler);
		Ok(())
	}

	/// Runs a registered command.
	///
	/// # Errors
	///
	/// [`CommandError::UnknownCommand`], [`CommandError::NoHandler`], or the
	/// handler's own failure.
	pub fn execute_command(&self, id: &str, args: Vec<JsonValue>) -> Result<JsonValue, CommandError> {
		// The handler runs outside the lock; it may re-enter the registry.
		let handler = {
			let state = self.state.lock();
			if !state.descriptors.contains_key(id) {
				return Err(CommandError::UnknownCommand { id: id.into() });
			}
			state
				.handlers
				.get(id)
				.cloned()
				.ok_or_else(|| CommandError::NoHandler { id: id.into() })?
		};
		handler(args)
	}

	/// Descriptors of every registered command, in no particular order.
	#[must_use]
	pub fn registered(&self) -> Vec<CommandDescriptor> {
		self.state.lock().descriptors.values().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn echo_handler() -> CommandHandler {
		Arc::new(|mut args| Ok(args.pop().unwrap_or(JsonValue::Null)))
	}

	#[test]
	fn duplicate_registration_keeps_the_first_command() {
		let registry = CommandRegistry::new();
		registry
			.register_command(CommandDescriptor::new("hello"), Some(echo_handler()))
			.unwrap();

		let second = registry.register_command(CommandDescriptor::new("hello"), None);
		assert!(matches!(
			second,
			Err(CommandError::DuplicateCommand { id }) if id == "hello"
		));

		let out = registry.execute_command("hello", vec![json!("world")]).unwrap();
		assert_eq!(out, json!("world"));
	}

	#[test]
	fn executing_an_unknown_command_fails() {
		let registry = CommandRegistry::new();
		assert!(matches!(
			registry.execute_command("missing", vec![]),
			Err(CommandError::UnknownCommand { .. })
		));
	}

	#[test]
	fn handler_can_be_attached_after_registration() {
		let registry = CommandRegistry::new();
		registry
			.register_command(CommandDescriptor::new("later"), None)
			.unwrap();
		assert!(matches!(
			registry.execute_command("later", vec![]),
			Err(CommandError::NoHandler { .. })
		));

		registry.register_handler("later", echo_handler()).unwrap();
		assert_eq!(
			registry.execute_command("later", vec![json!(1)]).unwrap(),
			json!(1)
		);
	}

	#[test]
	fn attaching_a_handler_to_an_unknown_command_fails() {
		let registry = CommandRegistry::new();
		assert!(matches!(
			registry.register_handler("ghost", echo_handler()),
			Err(CommandError::UnknownCommand { .. })
		));
	}
}
