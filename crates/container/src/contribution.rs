//! Lazy contribution-point handles.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::container::Container;
use crate::error::Result;
use crate::id::ContributionId;

/// Lazy handle onto a contribution point.
///
/// Obtained via [`Container::contributions`]. The collection is gathered on
/// first [`Contributions::get`] call and cached; holding the handle creates no
/// dependency edge, which is what makes cycles through a contribution point
/// legal where direct cycles are not.
pub struct Contributions<T> {
	container: Arc<Container>,
	point: ContributionId<T>,
	cache: Mutex<Option<Vec<T>>>,
}

impl<T> Contributions<T>
where
	T: Clone + Send + Sync + 'static,
{
	pub(crate) fn new(container: Arc<Container>, point: ContributionId<T>) -> Self {
		Self {
			container,
			point,
			cache: Mutex::new(None),
		}
	}

	/// Resolves (on first call) and returns the ordered collection.
	///
	/// # Errors
	///
	/// Errors produced while constructing an individual contribution; the
	/// collection is not cached in that case and a later call retries.
	pub fn get(&self) -> Result<Vec<T>> {
		let mut cache = self.cache.lock();
		if let Some(values) = cache.as_ref() {
			return Ok(values.clone());
		}
		let values = self.container.resolve_all(&self.point)?;
		*cache = Some(values.clone());
		Ok(values)
	}

	/// The extension point this handle resolves.
	#[must_use]
	pub fn point(&self) -> ContributionId<T> {
		self.point
	}
}

impl<T> fmt::Debug for Contributions<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Contributions({})", self.point.symbol())
	}
}
