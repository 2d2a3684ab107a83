//! Explicit method dispatch tables for remotely callable targets.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value as JsonValue;

use crate::envelope::WireError;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<JsonValue, WireError>> + Send>>;
type Handler = Box<dyn Fn(Vec<JsonValue>) -> HandlerFuture + Send + Sync>;

/// Name-to-handler table for inbound request dispatch.
///
/// The table is assembled explicitly at construction; there is no runtime
/// enumeration of target methods. Unknown request methods yield an error
/// reply, unknown notification methods are dropped silently by the channel.
#[derive(Default)]
pub struct MethodTable {
	handlers: HashMap<&'static str, Handler>,
}

impl MethodTable {
	/// Creates an empty table. A channel with an empty table replies
	/// "unknown method" to every inbound request.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an async handler under `name`, replacing any previous one.
	#[must_use]
	pub fn method<F, Fut>(mut self, name: &'static str, handler: F) -> Self
	where
		F: Fn(Vec<JsonValue>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<JsonValue, WireError>> + Send + 'static,
	{
		self.handlers.insert(name, Box::new(move |args| Box::pin(handler(args))));
		self
	}

	/// Whether `name` has a registered handler.
	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.handlers.contains_key(name)
	}

	/// Invokes the handler for `method`; `None` when no handler is registered.
	pub(crate) fn dispatch(
		&self,
		method: &str,
		args: Vec<JsonValue>,
	) -> Option<HandlerFuture> {
		self.handlers.get(method).map(|handler| handler(args))
	}
}

impl fmt::Debug for MethodTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<_> = self.handlers.keys().collect();
		names.sort_unstable();
		f.debug_tuple("MethodTable").field(&names).finish()
	}
}
