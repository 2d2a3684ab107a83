//! Container error taxonomy.

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible container errors.
///
/// All variants are synchronous and fatal only to the specific `bind`/`resolve`
/// call that produced them; the container's other bindings stay usable.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The identifier is already bound in this container (or twice in one module).
	#[error("duplicate binding for `{symbol}`")]
	DuplicateBinding {
		/// Symbolic name of the conflicting identifier.
		symbol: &'static str,
	},
	/// No binding exists and the dependency was not declared optional.
	#[error("no binding for `{symbol}`")]
	UnresolvedDependency {
		/// Symbolic name of the missing identifier.
		symbol: &'static str,
	},
	/// Two services require each other directly, without a contribution point
	/// in between.
	#[error("cyclic dependency: {path}")]
	CyclicDependency {
		/// Resolution path that closed the cycle, `a -> b -> a`.
		path: String,
	},
	/// A provider produced a value that does not match the identifier's
	/// contract type. Indicates a broken erased provider, not caller misuse.
	#[error("binding for `{symbol}` produced a value of an unexpected type")]
	ContractMismatch {
		/// Symbolic name of the offending identifier.
		symbol: &'static str,
	},
}
