//! The hierarchical service container and its resolver.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::binding::{
	BindingRecord, ContributionRecord, ErasedDisposer, Instance, Provider, Scope, downcast,
	erase_disposer, erase_factory, erase_value,
};
use crate::contribution::Contributions;
use crate::error::{Error, Result};
use crate::id::{ContributionId, ServiceId, ServiceKey};
use crate::module::{Module, ModuleBuilder};


#[derive(Default)]
struct State {
	bindings: FxHashMap<ServiceKey, BindingRecord>,
	contributions: FxHashMap<ServiceKey, Vec<ContributionRecord>>,
	singletons: FxHashMap<ServiceKey, Instance>,
	/// Singleton creation order, for reverse-order disposal.
	created: Vec<ServiceKey>,
}

/// Hierarchical registry resolving identifiers to instances.
///
/// Bindings registered on a child shadow the parent's; everything else is
/// inherited. Registration is expected to finish before the first resolution
/// (build-then-freeze); resolution itself is safe from multiple call sites.
pub struct Container {
	parent: Option<Arc<Container>>,
	state: RwLock<State>,
}

impl Container {
	/// Creates an empty root container.
	#[must_use]
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			parent: None,
			state: RwLock::new(State::default()),
		})
	}

	/// Creates a child container inheriting all bindings of `self`.
	///
	/// Bindings added to the child are invisible to the parent and shadow the
	/// parent's bindings for the same identifier.
	#[must_use]
	pub fn create_child(self: &Arc<Self>) -> Arc<Self> {
		Arc::new(Self {
			parent: Some(self.clone()),
			state: RwLock::new(State::default()),
		})
	}

	/// Binds `identifier` to a constant value (singleton by construction).
	///
	/// # Errors
	///
	/// [`Error::DuplicateBinding`] if the identifier is already bound here.
	pub fn bind_value<T>(&self, id: &ServiceId<T>, value: T) -> Result<()>
	where
		T: Clone + Send + Sync + 'static,
	{
		self.bind_record(
			id.key(),
			BindingRecord {
				symbol: id.symbol(),
				scope: Scope::Singleton,
				provider: Provider::Constant(erase_value(value)),
				disposer: None,
			},
		)
	}

	/// Binds `identifier` to a factory with the given scope.
	///
	/// The factory receives a [`Resolver`] to pull in its own dependencies.
	///
	/// # Errors
	///
	/// [`Error::DuplicateBinding`] if the identifier is already bound here.
	pub fn bind_factory<T, F>(&self, id: &ServiceId<T>, scope: Scope, factory: F) -> Result<()>
	where
		T: Clone + Send + Sync + 'static,
		F: Fn(&mut Resolver<'_>) -> Result<T> + Send + Sync + 'static,
	{
		self.bind_record(
			id.key(),
			BindingRecord {
				symbol: id.symbol(),
				scope,
				provider: Provider::Factory(erase_factory(factory)),
				disposer: None,
			},
		)
	}

	/// Attaches a disposer hook to an existing binding in this container.
	///
	/// [`Container::dispose`] invokes the hook for singleton instances this
	/// container created.
	///
	/// # Errors
	///
	/// [`Error::UnresolvedDependency`] if the identifier is not bound here.
	pub fn set_disposer<T, F>(&self, id: &ServiceId<T>, disposer: F) -> Result<()>
	where
		T: Send + Sync + 'static,
		F: Fn(&T) + Send + Sync + 'static,
	{
		let mut state = self.state.write();
		let record = state
			.bindings
			.get_mut(&id.key())
			.ok_or(Error::UnresolvedDependency { symbol: id.symbol() })?;
		record.disposer = Some(erase_disposer(disposer));
		Ok(())
	}

	/// Registers a standalone value contribution against `point`.
	pub fn contribute_value<T>(&self, point: &ContributionId<T>, value: T)
	where
		T: Clone + Send + Sync + 'static,
	{
		let instance = erase_value(value);
		self.push_contribution(
			point.key(),
			ContributionRecord {
				point_symbol: point.symbol(),
				service: None,
				produce: Arc::new(move |_| Ok(instance.clone())),
			},
		);
	}

	/// Registers a factory contribution against `point`.
	pub fn contribute_factory<T, F>(&self, point: &ContributionId<T>, factory: F)
	where
		T: Clone + Send + Sync + 'static,
		F: Fn(&mut Resolver<'_>) -> Result<T> + Send + Sync + 'static,
	{
		self.push_contribution(
			point.key(),
			ContributionRecord {
				point_symbol: point.symbol(),
				service: None,
				produce: erase_factory(factory),
			},
		);
	}

	/// Contributes an already-bound service to `point` by identifier.
	///
	/// Resolution goes through the service binding, so a singleton-bound
	/// service shares its one instance with the collection and is observed
	/// exactly once per point.
	///
	/// # Errors
	///
	/// [`Error::DuplicateBinding`] if the same service was already contributed
	/// to this point in this container.
	pub fn contribute_service<T>(&self, point: &ContributionId<T>, id: &ServiceId<T>) -> Result<()>
	where
		T: Clone + Send + Sync + 'static,
	{
		{
			let state = self.state.read();
			if let Some(records) = state.contributions.get(&point.key())
				&& records.iter().any(|r| r.service == Some(id.key()))
			{
				return Err(Error::DuplicateBinding { symbol: id.symbol() });
			}
		}
		let service = *id;
		self.push_contribution(
			point.key(),
			ContributionRecord {
				point_symbol: point.symbol(),
				service: Some(id.key()),
				produce: erase_factory(move |resolver| resolver.resolve(&service)),
			},
		);
		Ok(())
	}

	/// Loads a module's declarations into this container.
	///
	/// Bindings are validated first (no duplicate identifiers within the
	/// module, no conflict with existing bindings) and applied atomically;
	/// a failed load leaves the container untouched.
	///
	/// # Errors
	///
	/// [`Error::DuplicateBinding`] on an identifier bound twice within the
	/// module or already bound in this container.
	pub fn load(&self, module: Module) -> Result<()> {
		let (name, bindings, contributions) = module.into_parts();
		let mut state = self.state.write();
		let mut seen: FxHashMap<ServiceKey, ()> = FxHashMap::default();
		for (key, record) in &bindings {
			if seen.insert(*key, ()).is_some() || state.bindings.contains_key(key) {
				return Err(Error::DuplicateBinding { symbol: record.symbol });
			}
		}
		let mut seen_contributions: Vec<(ServiceKey, ServiceKey)> = Vec::new();
		for (key, record) in &contributions {
			if let Some(service) = record.service {
				if seen_contributions.contains(&(*key, service))
					|| state
						.contributions
						.get(key)
						.is_some_and(|records| records.iter().any(|r| r.service == Some(service)))
				{
					return Err(Error::DuplicateBinding { symbol: record.point_symbol });
				}
				seen_contributions.push((*key, service));
			}
		}
		tracing::debug!(
			module = name,
			bindings = bindings.len(),
			contributions = contributions.len(),
			"loading module"
		);
		for (key, record) in bindings {
			state.bindings.insert(key, record);
		}
		for (key, record) in contributions {
			state.contributions.entry(key).or_default().push(record);
		}
		Ok(())
	}

	/// Resolves `identifier` to an instance, constructing dependencies
	/// recursively.
	///
	/// # Errors
	///
	/// [`Error::UnresolvedDependency`] when no binding exists,
	/// [`Error::CyclicDependency`] when two services require each other
	/// directly.
	pub fn resolve<T>(self: &Arc<Self>, id: &ServiceId<T>) -> Result<T>
	where
		T: Clone + Send + Sync + 'static,
	{
		Resolver::top_level(self).resolve(id)
	}

	/// Resolves `identifier` if bound, `None` otherwise.
	///
	/// # Errors
	///
	/// Same as [`Container::resolve`], except that a missing binding is not an
	/// error.
	pub fn resolve_optional<T>(self: &Arc<Self>, id: &ServiceId<T>) -> Result<Option<T>>
	where
		T: Clone + Send + Sync + 'static,
	{
		Resolver::top_level(self).resolve_optional(id)
	}

	/// Resolves the ordered collection registered against a contribution point.
	///
	/// Registration order is preserved, parent containers first. A point with
	/// zero registrations yields an empty collection.
	///
	/// # Errors
	///
	/// Errors produced while constructing an individual contribution.
	pub fn resolve_all<T>(self: &Arc<Self>, point: &ContributionId<T>) -> Result<Vec<T>>
	where
		T: Clone + Send + Sync + 'static,
	{
		Resolver::top_level(self).resolve_all(point)
	}

	/// Returns a lazy handle onto a contribution point.
	///
	/// The collection is resolved on first access, not at handle creation, so
	/// a service may hold the handle for a point that (indirectly) contains
	/// itself without forming a direct dependency cycle.
	#[must_use]
	pub fn contributions<T>(self: &Arc<Self>, point: &ContributionId<T>) -> Contributions<T>
	where
		T: Clone + Send + Sync + 'static,
	{
		Contributions::new(self.clone(), *point)
	}

	/// Builds a [`ModuleBuilder`]; convenience re-export for bootstrap code.
	#[must_use]
	pub fn module(name: &'static str) -> ModuleBuilder {
		Module::builder(name)
	}

	/// Disposes singleton instances created by this container, newest first.
	///
	/// Only bindings that registered a disposer hook participate. The binding
	/// table itself is left intact; subsequent resolutions would create fresh
	/// singletons.
	pub fn dispose(&self) {
		let disposals: Vec<(Instance, ErasedDisposer)> = {
			let mut state = self.state.write();
			let created = std::mem::take(&mut state.created);
			created
				.into_iter()
				.rev()
				.filter_map(|key| {
					let instance = state.singletons.remove(&key)?;
					let disposer = state.bindings.get(&key)?.disposer.clone()?;
					Some((instance, disposer))
				})
				.collect()
		};
		for (instance, disposer) in disposals {
			disposer(instance.as_ref());
		}
	}

	fn bind_record(&self, key: ServiceKey, record: BindingRecord) -> Result<()> {
		let mut state = self.state.write();
		if state.bindings.contains_key(&key) {
			return Err(Error::DuplicateBinding { symbol: record.symbol });
		}
		state.bindings.insert(key, record);
		Ok(())
	}

	fn push_contribution(&self, key: ServiceKey, record: ContributionRecord) {
		self.state.write().contributions.entry(key).or_default().push(record);
	}

	/// Finds the binding for `key`, walking up the parent chain. Returns the
	/// owning container, which holds the singleton cache for the binding.
	fn find_binding(self: &Arc<Self>, key: ServiceKey) -> Option<(Arc<Self>, BindingRecord)> {
		let mut current = self.clone();
		loop {
			let record = current.state.read().bindings.get(&key).cloned();
			if let Some(record) = record {
				return Some((current, record));
			}
			let parent = current.parent.clone()?;
			current = parent;
		}
	}

	/// Contribution records for `key` across the chain, parent first.
	fn gather_contributions(self: &Arc<Self>, key: ServiceKey) -> Vec<ContributionRecord> {
		let mut chain = Vec::new();
		let mut current = Some(self.clone());
		while let Some(container) = current {
			chain.push(container.clone());
			current = container.parent.clone();
		}
		let mut records = Vec::new();
		for container in chain.into_iter().rev() {
			let state = container.state.read();
			if let Some(found) = state.contributions.get(&key) {
				records.extend(found.iter().cloned());
			}
		}
		records
	}
}

/// Resolution context handed to binding factories.
///
/// Tracks the in-flight resolution stack for cycle detection and the
/// per-request instance cache shared across one top-level `resolve` call.
pub struct Resolver<'a> {
	origin: &'a Arc<Container>,
	stack: Vec<(ServiceKey, &'static str)>,
	request: FxHashMap<ServiceKey, Instance>,
}

impl<'a> Resolver<'a> {
	fn top_level(origin: &'a Arc<Container>) -> Self {
		Self {
			origin,
			stack: Vec::new(),
			request: FxHashMap::default(),
		}
	}

	/// Resolves a required dependency.
	///
	/// # Errors
	///
	/// See [`Container::resolve`].
	pub fn resolve<T>(&mut self, id: &ServiceId<T>) -> Result<T>
	where
		T: Clone + Send + Sync + 'static,
	{
		match self.resolve_instance(id.key(), id.symbol())? {
			Some(instance) => downcast(&instance, id.symbol()),
			None => Err(Error::UnresolvedDependency { symbol: id.symbol() }),
		}
	}

	/// Resolves an optional dependency; a missing binding yields `None`.
	///
	/// # Errors
	///
	/// Construction errors of a present binding still propagate.
	pub fn resolve_optional<T>(&mut self, id: &ServiceId<T>) -> Result<Option<T>>
	where
		T: Clone + Send + Sync + 'static,
	{
		match self.resolve_instance(id.key(), id.symbol())? {
			Some(instance) => Ok(Some(downcast(&instance, id.symbol())?)),
			None => Ok(None),
		}
	}

	/// Resolves the ordered contribution collection for `point`.
	///
	/// # Errors
	///
	/// Errors produced while constructing an individual contribution.
	pub fn resolve_all<T>(&mut self, point: &ContributionId<T>) -> Result<Vec<T>>
	where
		T: Clone + Send + Sync + 'static,
	{
		let records = self.origin.gather_contributions(point.key());
		let mut seen_services: Vec<ServiceKey> = Vec::new();
		let mut values = Vec::with_capacity(records.len());
		for record in records {
			if let Some(service) = record.service {
				if seen_services.contains(&service) {
					continue;
				}
				seen_services.push(service);
			}
			let instance = (record.produce)(self)?;
			values.push(downcast(&instance, point.symbol())?);
		}
		Ok(values)
	}

	/// Returns a lazy handle onto a contribution point, without resolving it.
	#[must_use]
	pub fn contributions<T>(&self, point: &ContributionId<T>) -> Contributions<T>
	where
		T: Clone + Send + Sync + 'static,
	{
		self.origin.contributions(point)
	}

	fn resolve_instance(
		&mut self,
		key: ServiceKey,
		symbol: &'static str,
	) -> Result<Option<Instance>> {
		let Some((owner, record)) = self.origin.find_binding(key) else {
			return Ok(None);
		};
		if self.stack.iter().any(|(k, _)| *k == key) {
			let mut path: Vec<&str> = self.stack.iter().map(|(_, s)| *s).collect();
			path.push(symbol);
			return Err(Error::CyclicDependency { path: path.join(" -> ") });
		}
		match record.scope {
			Scope::Singleton => {
				if let Some(instance) = owner.state.read().singletons.get(&key) {
					return Ok(Some(instance.clone()));
				}
				let produced = self.construct(key, symbol, &record)?;
				let mut state = owner.state.write();
				// Another resolution may have won the race; keep the first.
				let instance = state.singletons.entry(key).or_insert(produced).clone();
				if !state.created.contains(&key) {
					state.created.push(key);
				}
				Ok(Some(instance))
			}
			Scope::Transient => Ok(Some(self.construct(key, symbol, &record)?)),
			Scope::Request => {
				if let Some(instance) = self.request.get(&key) {
					return Ok(Some(instance.clone()));
				}
				let produced = self.construct(key, symbol, &record)?;
				self.request.insert(key, produced.clone());
				Ok(Some(produced))
			}
		}
	}

	fn construct(
		&mut self,
		key: ServiceKey,
		symbol: &'static str,
		record: &BindingRecord,
	) -> Result<Instance> {
		self.stack.push((key, symbol));
		let produced = record.provider.produce(self);
		self.stack.pop();
		produced
	}
}
