//! Declarative module definitions.
//!
//! A [`Module`] is an ordered set of binding and contribution declarations,
//! built once at process start and loaded into a [`Container`](crate::Container)
//! via `Container::load`. Modules are never mutated after load; duplicate
//! identifiers inside one module are rejected at load time.

use std::sync::Arc;

use crate::binding::{
	BindingRecord, ContributionRecord, Provider, Scope, erase_factory, erase_value,
};
use crate::container::Resolver;
use crate::error::Result;
use crate::id::{ContributionId, ServiceId, ServiceKey};

/// Declarative grouping of bindings and contribution registrations.
pub struct Module {
	name: &'static str,
	bindings: Vec<(ServiceKey, BindingRecord)>,
	contributions: Vec<(ServiceKey, ContributionRecord)>,
}

impl Module {
	/// Starts building a module with the given name (used in logs only).
	#[must_use]
	pub fn builder(name: &'static str) -> ModuleBuilder {
		ModuleBuilder {
			module: Module {
				name,
				bindings: Vec::new(),
				contributions: Vec::new(),
			},
		}
	}

	/// The module's declared name.
	#[must_use]
	pub fn name(&self) -> &'static str {
		self.name
	}

	pub(crate) fn into_parts(
		self,
	) -> (
		&'static str,
		Vec<(ServiceKey, BindingRecord)>,
		Vec<(ServiceKey, ContributionRecord)>,
	) {
		(self.name, self.bindings, self.contributions)
	}
}

/// Builder collecting a module's ordered declarations.
pub struct ModuleBuilder {
	module: Module,
}

impl ModuleBuilder {
	/// Declares a constant-value binding (singleton by construction).
	#[must_use]
	pub fn value<T>(mut self, id: &ServiceId<T>, value: T) -> Self
	where
		T: Clone + Send + Sync + 'static,
	{
		self.module.bindings.push((
			id.key(),
			BindingRecord {
				symbol: id.symbol(),
				scope: Scope::Singleton,
				provider: Provider::Constant(erase_value(value)),
				disposer: None,
			},
		));
		self
	}

	/// Declares a factory binding with the given scope.
	#[must_use]
	pub fn factory<T, F>(mut self, id: &ServiceId<T>, scope: Scope, factory: F) -> Self
	where
		T: Clone + Send + Sync + 'static,
		F: Fn(&mut Resolver<'_>) -> Result<T> + Send + Sync + 'static,
	{
		self.module.bindings.push((
			id.key(),
			BindingRecord {
				symbol: id.symbol(),
				scope,
				provider: Provider::Factory(erase_factory(factory)),
				disposer: None,
			},
		));
		self
	}

	/// Declares a singleton factory binding with a disposer hook.
	#[must_use]
	pub fn singleton_with_disposer<T, F, D>(
		mut self,
		id: &ServiceId<T>,
		factory: F,
		disposer: D,
	) -> Self
	where
		T: Clone + Send + Sync + 'static,
		F: Fn(&mut Resolver<'_>) -> Result<T> + Send + Sync + 'static,
		D: Fn(&T) + Send + Sync + 'static,
	{
		self.module.bindings.push((
			id.key(),
			BindingRecord {
				symbol: id.symbol(),
				scope: Scope::Singleton,
				provider: Provider::Factory(erase_factory(factory)),
				disposer: Some(crate::binding::erase_disposer(disposer)),
			},
		));
		self
	}

	/// Declares a standalone value contribution against `point`.
	#[must_use]
	pub fn contribute_value<T>(mut self, point: &ContributionId<T>, value: T) -> Self
	where
		T: Clone + Send + Sync + 'static,
	{
		let instance = erase_value(value);
		self.module.contributions.push((
			point.key(),
			ContributionRecord {
				point_symbol: point.symbol(),
				service: None,
				produce: Arc::new(move |_| Ok(instance.clone())),
			},
		));
		self
	}

	/// Declares a factory contribution against `point`.
	#[must_use]
	pub fn contribute_factory<T, F>(mut self, point: &ContributionId<T>, factory: F) -> Self
	where
		T: Clone + Send + Sync + 'static,
		F: Fn(&mut Resolver<'_>) -> Result<T> + Send + Sync + 'static,
	{
		self.module.contributions.push((
			point.key(),
			ContributionRecord {
				point_symbol: point.symbol(),
				service: None,
				produce: erase_factory(factory),
			},
		));
		self
	}

	/// Contributes a service binding (declared here or elsewhere) to `point`.
	///
	/// The collection entry resolves through the service identifier, so a
	/// singleton-bound service is shared with the point, never duplicated.
	#[must_use]
	pub fn contribute_service<T>(mut self, point: &ContributionId<T>, id: &ServiceId<T>) -> Self
	where
		T: Clone + Send + Sync + 'static,
	{
		let service = *id;
		self.module.contributions.push((
			point.key(),
			ContributionRecord {
				point_symbol: point.symbol(),
				service: Some(id.key()),
				produce: erase_factory(move |resolver| resolver.resolve(&service)),
			},
		));
		self
	}

	/// Finishes the declaration.
	#[must_use]
	pub fn build(self) -> Module {
		self.module
	}
}
