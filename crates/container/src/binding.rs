//! Binding records and provider erasure.

use std::any::Any;
use std::sync::Arc;

use crate::container::Resolver;
use crate::error::{Error, Result};
use crate::id::ServiceKey;

/// Lifetime policy for container-produced instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
	/// Exactly one instance per container owning the binding (a child container
	/// that shadows the binding gets its own instance).
	Singleton,
	/// A fresh instance per resolution.
	Transient,
	/// One instance per top-level resolution call, shared across that call's
	/// dependency subgraph.
	Request,
}

/// A container-managed value with its concrete type erased.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

/// Erased provider closure; receives the active resolver so it can pull in its
/// own dependencies.
pub(crate) type ErasedFactory =
	Arc<dyn Fn(&mut Resolver<'_>) -> Result<Instance> + Send + Sync>;

/// Erased disposer hook; downcasts internally and is a no-op on mismatch.
pub(crate) type ErasedDisposer = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Provider {
	Constant(Instance),
	Factory(ErasedFactory),
}

impl Provider {
	pub(crate) fn produce(&self, resolver: &mut Resolver<'_>) -> Result<Instance> {
		match self {
			Self::Constant(value) => Ok(value.clone()),
			Self::Factory(factory) => factory(resolver),
		}
	}
}

/// One registered binding: provider plus scope plus optional disposer.
#[derive(Clone)]
pub(crate) struct BindingRecord {
	pub(crate) symbol: &'static str,
	pub(crate) scope: Scope,
	pub(crate) provider: Provider,
	pub(crate) disposer: Option<ErasedDisposer>,
}

/// One registration against a contribution point.
///
/// `service` is set when the contribution refers to a service binding by
/// identifier, so a value both singleton-bound and contributed is observed
/// exactly once per point and shares the singleton instance.
#[derive(Clone)]
pub(crate) struct ContributionRecord {
	pub(crate) point_symbol: &'static str,
	pub(crate) service: Option<ServiceKey>,
	pub(crate) produce: ErasedFactory,
}

pub(crate) fn erase_value<T: Clone + Send + Sync + 'static>(value: T) -> Instance {
	Arc::new(value)
}

pub(crate) fn erase_factory<T, F>(factory: F) -> ErasedFactory
where
	T: Clone + Send + Sync + 'static,
	F: Fn(&mut Resolver<'_>) -> Result<T> + Send + Sync + 'static,
{
	Arc::new(move |resolver| Ok(Arc::new(factory(resolver)?) as Instance))
}

pub(crate) fn erase_disposer<T, F>(disposer: F) -> ErasedDisposer
where
	T: Send + Sync + 'static,
	F: Fn(&T) + Send + Sync + 'static,
{
	Arc::new(move |instance| {
		if let Some(value) = instance.downcast_ref::<T>() {
			disposer(value);
		}
	})
}

pub(crate) fn downcast<T: Clone + Send + Sync + 'static>(
	instance: &Instance,
	symbol: &'static str,
) -> Result<T> {
	instance
		.downcast_ref::<T>()
		.cloned()
		.ok_or(Error::ContractMismatch { symbol })
}
