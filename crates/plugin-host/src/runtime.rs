//! The runtime driving a plugin host process.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use atelier_rpc::{MethodTable, RpcProxy, WireError};

use crate::commands::CommandRegistry;
use crate::plugin::{PluginApi, PluginDescriptor, PluginEntry, PluginRegistry};

/// The hosted-process counterpart of the main-process plugin server.
///
/// Exposes the lifecycle method table (`initialize`, `loadPlugin`,
/// `stopPlugins`, `executeCommand`) and owns the restricted facade handed to
/// plugin code.
pub struct PluginHostRuntime {
	registry: Arc<PluginRegistry>,
	commands: Arc<CommandRegistry>,
	active: Mutex<Vec<(String, Arc<dyn PluginEntry>)>>,
}

impl PluginHostRuntime {
	/// Creates a runtime loading plugins from the given registry.
	#[must_use]
	pub fn new(registry: Arc<PluginRegistry>) -> Arc<Self> {
		Arc::new(Self {
			registry,
			commands: Arc::new(CommandRegistry::new()),
			active: Mutex::new(Vec::new()),
		})
	}

	/// The command registry backing the facade.
	#[must_use]
	pub fn commands(&self) -> Arc<CommandRegistry> {
		self.commands.clone()
	}

	/// Binds the channel proxy so command registrations reach the main
	/// process. Commands registered earlier stay local.
	pub fn connect(&self, proxy: RpcProxy) {
		self.commands.connect(proxy);
	}

	/// Builds the method table exposed to the main process.
	#[must_use]
	pub fn method_table(self: &Arc<Self>) -> MethodTable {
		let init = self.clone();
		let load = self.clone();
		let stop = self.clone();
		let exec = self.clone();
		MethodTable::new()
			.method("initialize", move |args| {
				let rt = init.clone();
				async move { rt.initialize(&args) }
			})
			.method("loadPlugin", move |args| {
				let rt = load.clone();
				async move { rt.load_plugin(args) }
			})
			.method("stopPlugins", move |args| {
				let rt = stop.clone();
				async move { rt.stop_plugins(&args) }
			})
			.method("executeCommand", move |args| {
				let rt = exec.clone();
				async move { rt.execute_command(args) }
			})
	}

	fn initialize(&self, args: &[JsonValue]) -> Result<JsonValue, WireError> {
		let metadata = args.get(1).cloned().unwrap_or(JsonValue::Null);
		tracing::info!(%metadata, "plugin host initialized");
		Ok(JsonValue::Null)
	}

	fn load_plugin(&self, args: Vec<JsonValue>) -> Result<JsonValue, WireError> {
		let raw = args
			.into_iter()
			.nth(1)
			.ok_or_else(|| WireError::new("loadPlugin: missing descriptor"))?;
		let descriptor: PluginDescriptor = serde_json::from_value(raw)
			.map_err(|e| WireError::new(format!("loadPlugin: bad descriptor: {e}")))?;

		let Some(entry) = self.registry.get(&descriptor.id) else {
			return Err(WireError::new(format!("unknown plugin `{}`", descriptor.id)));
		};

		// Activation outcomes are not surfaced to the main process; a failing
		// plugin is logged and must not block others.
		let api = PluginApi {
			commands: self.commands.clone(),
		};
		match entry.activate(&api) {
			Ok(()) => {
				tracing::info!(plugin = %descriptor.id, "plugin activated");
				self.active.lock().push((descriptor.id, entry));
			}
			Err(e) => {
				tracing::error!(plugin = %descriptor.id, error = %e, "plugin activation failed");
			}
		}
		Ok(JsonValue::Null)
	}

	fn stop_plugins(&self, args: &[JsonValue]) -> Result<JsonValue, WireError> {
		let ids: Vec<String> = match args.get(1) {
			Some(raw) => serde_json::from_value(raw.clone())
				.map_err(|e| WireError::new(format!("stopPlugins: bad id list: {e}")))?,
			None => Vec::new(),
		};

		// An empty id list stops every plugin still active.
		let stopping: Vec<(String, Arc<dyn PluginEntry>)> = {
			let mut active = self.active.lock();
			if ids.is_empty() {
				active.drain(..).collect()
			} else {
				let (stopping, keep) = std::mem::take(&mut *active)
					.into_iter()
					.partition(|(id, _)| ids.contains(id));
				*active = keep;
				stopping
			}
		};

		for (id, entry) in stopping {
			if let Err(e) = entry.deactivate() {
				// Swallowed: one failing plugin cannot block shutdown of others.
				tracing::warn!(plugin = %id, error = %e, "plugin deactivation failed");
			} else {
				tracing::info!(plugin = %id, "plugin deactivated");
			}
		}
		Ok(JsonValue::Null)
	}

	fn execute_command(&self, mut args: Vec<JsonValue>) -> Result<JsonValue, WireError> {
		if args.is_empty() {
			return Err(WireError::new("executeCommand: missing command id"));
		}
		let id_value = args.remove(0);
		let id = id_value
			.as_str()
			.ok_or_else(|| WireError::new("executeCommand: command id must be a string"))?;
		self.commands
			.execute_command(id, args)
			.map_err(|e| WireError::new(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, Ordering};

	use serde_json::json;

	use super::*;
	use crate::commands::CommandDescriptor;

	struct FlagPlugin {
		command: &'static str,
		fail_activation: bool,
		fail_deactivation: bool,
		deactivated: Arc<AtomicBool>,
	}

	impl FlagPlugin {
		fn new(command: &'static str) -> Self {
			Self {
				command,
				fail_activation: false,
				fail_deactivation: false,
				deactivated: Arc::new(AtomicBool::new(false)),
			}
		}
	}

	impl PluginEntry for FlagPlugin {
		fn activate(
			&self,
			api: &PluginApi,
		) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
			if self.fail_activation {
				return Err("activation exploded".into());
			}
			api.commands.register_command(
				CommandDescriptor::new(self.command),
				Some(Arc::new(|_| Ok(json!("ok")))),
			)?;
			Ok(())
		}

		fn deactivate(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
			self.deactivated.store(true, Ordering::SeqCst);
			if self.fail_deactivation {
				return Err("deactivation exploded".into());
			}
			Ok(())
		}
	}

	fn load(rt: &PluginHostRuntime, id: &str) -> Result<JsonValue, WireError> {
		rt.load_plugin(vec![json!(""), json!({ "id": id })])
	}

	#[test]
	fn activation_failure_does_not_block_other_plugins() {
		let registry = Arc::new(PluginRegistry::new());
		registry.register(
			"broken",
			Arc::new(FlagPlugin {
				fail_activation: true,
				..FlagPlugin::new("broken.cmd")
			}),
		);
		registry.register("fine", Arc::new(FlagPlugin::new("fine.cmd")));
		let rt = PluginHostRuntime::new(registry);

		assert!(load(&rt, "broken").is_ok(), "failure is logged, not surfaced");
		assert!(load(&rt, "fine").is_ok());

		assert_eq!(
			rt.commands.execute_command("fine.cmd", vec![]).unwrap(),
			json!("ok")
		);
		assert!(rt.commands.execute_command("broken.cmd", vec![]).is_err());
	}

	#[test]
	fn loading_an_unknown_plugin_is_an_error_reply() {
		let rt = PluginHostRuntime::new(Arc::new(PluginRegistry::new()));
		let err = load(&rt, "ghost").unwrap_err();
		assert!(err.message.contains("ghost"));
	}

	#[test]
	fn stop_swallows_deactivation_errors() {
		let registry = Arc::new(PluginRegistry::new());
		let grumpy = Arc::new(FlagPlugin {
			fail_deactivation: true,
			..FlagPlugin::new("grumpy.cmd")
		});
		let calm = Arc::new(FlagPlugin::new("calm.cmd"));
		let grumpy_flag = grumpy.deactivated.clone();
		let calm_flag = calm.deactivated.clone();
		registry.register("grumpy", grumpy);
		registry.register("calm", calm);
		let rt = PluginHostRuntime::new(registry);
		load(&rt, "grumpy").unwrap();
		load(&rt, "calm").unwrap();

		rt.stop_plugins(&[json!(""), json!(["grumpy", "calm"])])
			.unwrap();
		assert!(grumpy_flag.load(Ordering::SeqCst));
		assert!(calm_flag.load(Ordering::SeqCst));
	}

	#[test]
	fn stop_with_an_empty_list_stops_everything() {
		let registry = Arc::new(PluginRegistry::new());
		let plugin = Arc::new(FlagPlugin::new("solo.cmd"));
		let flag = plugin.deactivated.clone();
		registry.register("solo", plugin);
		let rt = PluginHostRuntime::new(registry);
		load(&rt, "solo").unwrap();

		rt.stop_plugins(&[json!("")]).unwrap();
		assert!(flag.load(Ordering::SeqCst));
		assert!(rt.active.lock().is_empty());
	}

	#[test]
	fn execute_command_routes_through_the_registry() {
		let registry = Arc::new(PluginRegistry::new());
		registry.register("echoer", Arc::new(FlagPlugin::new("echoer.cmd")));
		let rt = PluginHostRuntime::new(registry);
		load(&rt, "echoer").unwrap();

		let out = rt
			.execute_command(vec![json!("echoer.cmd"), json!(42)])
			.unwrap();
		assert_eq!(out, json!("ok"));
		assert!(rt.execute_command(vec![json!("nope")]).is_err());
	}
}
