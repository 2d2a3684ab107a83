//! Correlation-based async RPC channel over length-delimited JSON envelopes.
//!
//! This crate provides protocol primitives for talking to a hosted plugin
//! process (or any peer reachable through an `AsyncRead`/`AsyncWrite` pair):
//! * [`Envelope`]: the wire message, classified into requests, replies and
//!   notifications
//! * [`codec`]: `Content-Length`-framed JSON reading and writing
//! * [`MethodTable`]: explicit name-to-handler dispatch table for inbound
//!   requests — built at construction, no runtime reflection
//! * [`RpcChannel`]: the tokio-driven message pump pairing a transport with a
//!   pending-call map
//! * [`RpcProxy`]: cloneable handle issuing calls and notifications; every
//!   call suspends on a future until the correlated reply arrives or the
//!   channel closes

#![warn(missing_docs)]

pub mod codec;
mod channel;
mod envelope;
mod error;
mod proxy;
mod target;

pub use channel::RpcChannel;
pub use envelope::{Envelope, Message, Notification, Reply, Request, WireError};
pub use error::{Error, Result};
pub use proxy::RpcProxy;
pub use target::MethodTable;
