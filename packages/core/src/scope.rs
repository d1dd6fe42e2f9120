//! Access-token scopes.
//!
//! A scope is a capability tag attached to a credential. Well-known tags are
//! exposed as associated constants; unknown tags round-trip verbatim so that
//! tokens minted by newer deployments are not silently narrowed.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single capability tag, e.g. `api` or `read_api`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(Cow<'static, str>);

impl Scope {
    /// Full read/write access to the API.
    pub const API: Scope = Scope(Cow::Borrowed("api"));
    /// Read-only access to the API (GET/HEAD).
    pub const READ_API: Scope = Scope(Cow::Borrowed("read_api"));
    pub const READ_USER: Scope = Scope(Cow::Borrowed("read_user"));
    pub const READ_REPOSITORY: Scope = Scope(Cow::Borrowed("read_repository"));
    pub const WRITE_REPOSITORY: Scope = Scope(Cow::Borrowed("write_repository"));
    pub const READ_REGISTRY: Scope = Scope(Cow::Borrowed("read_registry"));
    pub const WRITE_REGISTRY: Scope = Scope(Cow::Borrowed("write_registry"));
    pub const READ_PACKAGE_REGISTRY: Scope = Scope(Cow::Borrowed("read_package_registry"));
    pub const WRITE_PACKAGE_REGISTRY: Scope = Scope(Cow::Borrowed("write_package_registry"));
    pub const SUDO: Scope = Scope(Cow::Borrowed("sudo"));

    /// Creates a scope from an arbitrary tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this scope grants mutating access.
    #[must_use]
    pub fn grants_write(&self) -> bool {
        *self == Self::API || self.0.starts_with("write_")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Ordered set of scopes held by a credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    #[must_use]
    pub fn contains(&self, scope: &Scope) -> bool {
        self.0.contains(scope)
    }

    /// Whether any scope in `candidates` is held.
    #[must_use]
    pub fn contains_any(&self, candidates: &[Scope]) -> bool {
        candidates.iter().any(|scope| self.0.contains(scope))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, scope: Scope) -> bool {
        self.0.insert(scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.0.iter()
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Scope; N]> for ScopeSet {
    fn from(scopes: [Scope; N]) -> Self {
        scopes.into_iter().collect()
    }
}
