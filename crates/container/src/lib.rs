//! Hierarchical service container with scoped bindings and contribution points.
//!
//! This crate provides the dependency-wiring substrate for the platform:
//! * [`ServiceId`] / [`ContributionId`]: opaque typed tokens naming services and
//!   extension points
//! * [`Container`]: hierarchical registry resolving identifiers to instances with
//!   [`Scope`] semantics (singleton, transient, per-request)
//! * [`Module`]: declarative, load-once grouping of bindings and contribution
//!   registrations
//! * [`Contributions`]: lazy handle onto a contribution point, allowing two
//!   services to depend on each other through the point without a direct cycle
//!
//! Binding registration is expected to complete before the first `resolve` call
//! (build-then-freeze); the container is `Send + Sync` and resolution is safe to
//! issue from multiple call sites afterwards.

#![warn(missing_docs)]

mod binding;
mod container;
mod contribution;
mod error;
mod id;
mod module;

pub use binding::Scope;
pub use container::{Container, Resolver};
pub use contribution::Contributions;
pub use error::{Error, Result};
pub use id::{ContributionId, ServiceId, ServiceKey};
pub use module::{Module, ModuleBuilder};
