//! Opaque identifier tokens for container lookup.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique numeric key backing an identifier.
///
/// Keys are allocated from a global counter, so two identifiers never collide
/// even when their symbolic names do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(u64);

impl ServiceKey {
	fn next() -> Self {
		Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
	}

	/// Returns the underlying u64 value.
	#[inline]
	#[must_use]
	pub fn as_u64(self) -> u64 {
		self.0
	}
}

/// Opaque token naming a service contract for container lookup.
///
/// The type parameter pins the contract: every binding registered under this
/// identifier produces values of type `T`, and `resolve` hands `T` back without
/// any caller-side casting. Identity is the numeric [`ServiceKey`]; the symbol
/// only serves diagnostics and cross-process naming.
///
/// Identifiers are usually held in `LazyLock` statics:
///
/// ```
/// use std::sync::LazyLock;
/// use atelier_container::ServiceId;
///
/// static GREETER: LazyLock<ServiceId<String>> = LazyLock::new(|| ServiceId::new("greeter"));
/// ```
pub struct ServiceId<T: ?Sized> {
	key: ServiceKey,
	symbol: &'static str,
	_contract: PhantomData<fn() -> T>,
}

impl<T: ?Sized> ServiceId<T> {
	/// Allocates a fresh identifier with the given symbolic name.
	#[must_use]
	pub fn new(symbol: &'static str) -> Self {
		Self {
			key: ServiceKey::next(),
			symbol,
			_contract: PhantomData,
		}
	}

	/// The process-unique key of this identifier.
	#[inline]
	#[must_use]
	pub fn key(&self) -> ServiceKey {
		self.key
	}

	/// The symbolic name, for diagnostics and cross-process references.
	#[inline]
	#[must_use]
	pub fn symbol(&self) -> &'static str {
		self.symbol
	}
}

impl<T: ?Sized> Clone for ServiceId<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T: ?Sized> Copy for ServiceId<T> {}

impl<T: ?Sized> PartialEq for ServiceId<T> {
	fn eq(&self, other: &Self) -> bool {
		self.key == other.key
	}
}

impl<T: ?Sized> Eq for ServiceId<T> {}

impl<T: ?Sized> std::hash::Hash for ServiceId<T> {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.key.hash(state);
	}
}

impl<T: ?Sized> fmt::Debug for ServiceId<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ServiceId({}#{})", self.symbol, self.key.as_u64())
	}
}

impl<T: ?Sized> fmt::Display for ServiceId<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.symbol)
	}
}

/// Opaque token naming a contribution point.
///
/// Resolution of a contribution point yields the ordered collection of values
/// registered against it by any number of independent modules; `T` is the
/// element contract, not the collection.
pub struct ContributionId<T: ?Sized> {
	key: ServiceKey,
	symbol: &'static str,
	_contract: PhantomData<fn() -> T>,
}

impl<T: ?Sized> ContributionId<T> {
	/// Allocates a fresh contribution-point identifier.
	#[must_use]
	pub fn new(symbol: &'static str) -> Self {
		Self {
			key: ServiceKey::next(),
			symbol,
			_contract: PhantomData,
		}
	}

	/// The process-unique key of this identifier.
	#[inline]
	#[must_use]
	pub fn key(&self) -> ServiceKey {
		self.key
	}

	/// The symbolic name of the extension point.
	#[inline]
	#[must_use]
	pub fn symbol(&self) -> &'static str {
		self.symbol
	}
}

impl<T: ?Sized> Clone for ContributionId<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T: ?Sized> Copy for ContributionId<T> {}

impl<T: ?Sized> fmt::Debug for ContributionId<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ContributionId({}#{})", self.symbol, self.key.as_u64())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identifiers_with_equal_symbols_do_not_collide() {
		let a: ServiceId<u32> = ServiceId::new("svc");
		let b: ServiceId<u32> = ServiceId::new("svc");
		assert_ne!(a.key(), b.key());
		assert_ne!(a, b);
	}

	#[test]
	fn copies_compare_equal() {
		let a: ServiceId<String> = ServiceId::new("svc");
		let b = a;
		assert_eq!(a, b);
		assert_eq!(a.symbol(), "svc");
	}
}
