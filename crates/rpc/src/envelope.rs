//! Wire envelope and inbound message classification.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Error payload carried in an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
	/// Human-readable failure description.
	pub message: String,
	/// Optional remote stack trace or backtrace text.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl WireError {
	/// Builds an error payload from a message, without a stack.
	#[must_use]
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			stack: None,
		}
	}
}

impl fmt::Display for WireError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.message)
	}
}

impl std::error::Error for WireError {}

/// The raw wire message.
///
/// A message with `method` is a request (when `id` is present) or a
/// notification (when absent); a message with `id` and no `method` is a
/// reply. Anything else is malformed and dropped by the channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
	/// Correlation id; present on requests and replies.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<u64>,
	/// Method name; present on requests and notifications.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	/// Positional call arguments.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub args: Option<Vec<JsonValue>>,
	/// Successful reply payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<JsonValue>,
	/// Error reply payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<WireError>,
}

/// An inbound request awaiting a reply.
#[derive(Debug, Clone)]
pub struct Request {
	/// Correlation id to echo in the reply.
	pub id: u64,
	/// Method name, dispatched against a [`MethodTable`](crate::MethodTable).
	pub method: String,
	/// Positional arguments.
	pub args: Vec<JsonValue>,
}

/// A fire-and-forget message; produces no reply.
#[derive(Debug, Clone)]
pub struct Notification {
	/// Method name.
	pub method: String,
	/// Positional arguments.
	pub args: Vec<JsonValue>,
}

/// A reply correlated to an earlier request.
#[derive(Debug, Clone)]
pub struct Reply {
	/// Correlation id of the completed request.
	pub id: u64,
	/// Outcome carried back to the caller.
	pub outcome: Result<JsonValue, WireError>,
}

/// Classified inbound message.
#[derive(Debug, Clone)]
pub enum Message {
	/// An incoming request.
	Request(Request),
	/// An incoming notification.
	Notification(Notification),
	/// An incoming reply.
	Reply(Reply),
}

impl Envelope {
	/// Builds a request envelope.
	#[must_use]
	pub fn request(id: u64, method: impl Into<String>, args: Vec<JsonValue>) -> Self {
		Self {
			id: Some(id),
			method: Some(method.into()),
			args: Some(args),
			..Self::default()
		}
	}

	/// Builds a notification envelope.
	#[must_use]
	pub fn notification(method: impl Into<String>, args: Vec<JsonValue>) -> Self {
		Self {
			method: Some(method.into()),
			args: Some(args),
			..Self::default()
		}
	}

	/// Builds a reply envelope from an outcome.
	#[must_use]
	pub fn reply(id: u64, outcome: Result<JsonValue, WireError>) -> Self {
		match outcome {
			Ok(result) => Self {
				id: Some(id),
				result: Some(result),
				..Self::default()
			},
			Err(error) => Self {
				id: Some(id),
				error: Some(error),
				..Self::default()
			},
		}
	}

	/// Classifies the envelope; `None` for malformed shapes.
	#[must_use]
	pub fn classify(self) -> Option<Message> {
		match (self.id, self.method) {
			(Some(id), Some(method)) => Some(Message::Request(Request {
				id,
				method,
				args: self.args.unwrap_or_default(),
			})),
			(None, Some(method)) => Some(Message::Notification(Notification {
				method,
				args: self.args.unwrap_or_default(),
			})),
			(Some(id), None) => {
				// `{"result": null}` deserializes to `None`, same as an absent
				// field; a success reply carrying JSON null must still settle
				// the call, so a missing result reads as null.
				let outcome = match (self.result, self.error) {
					(_, Some(error)) => Err(error),
					(result, None) => Ok(result.unwrap_or(JsonValue::Null)),
				};
				Some(Message::Reply(Reply { id, outcome }))
			}
			(None, None) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_round_trips_through_json() {
		let envelope = Envelope::request(7, "echo", vec!["ping".into()]);
		let json = serde_json::to_string(&envelope).unwrap();
		assert!(!json.contains("result"), "empty fields are omitted: {json}");
		let back: Envelope = serde_json::from_str(&json).unwrap();
		match back.classify() {
			Some(Message::Request(req)) => {
				assert_eq!(req.id, 7);
				assert_eq!(req.method, "echo");
				assert_eq!(req.args, vec![serde_json::json!("ping")]);
			}
			other => panic!("expected request, got {other:?}"),
		}
	}

	#[test]
	fn missing_id_classifies_as_notification() {
		let envelope = Envelope::notification("log", vec![]);
		assert!(matches!(
			envelope.classify(),
			Some(Message::Notification(n)) if n.method == "log"
		));
	}

	#[test]
	fn error_wins_over_result_in_replies() {
		let envelope = Envelope {
			id: Some(3),
			result: Some(serde_json::json!(1)),
			error: Some(WireError::new("boom")),
			..Envelope::default()
		};
		match envelope.classify() {
			Some(Message::Reply(reply)) => {
				assert_eq!(reply.outcome.unwrap_err().message, "boom");
			}
			other => panic!("expected reply, got {other:?}"),
		}
	}

	#[test]
	fn null_result_reply_round_trips_as_success() {
		let envelope = Envelope::reply(5, Ok(JsonValue::Null));
		let json = serde_json::to_string(&envelope).unwrap();
		let back: Envelope = serde_json::from_str(&json).unwrap();
		match back.classify() {
			Some(Message::Reply(reply)) => {
				assert_eq!(reply.id, 5);
				assert_eq!(reply.outcome.unwrap(), JsonValue::Null);
			}
			other => panic!("expected reply, got {other:?}"),
		}
	}

	#[test]
	fn empty_envelope_is_malformed() {
		assert!(Envelope::default().classify().is_none());
	}
}
