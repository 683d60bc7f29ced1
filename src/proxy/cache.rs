//! Memoization of synthesized proxy types.

use dashmap::{mapref::entry::Entry, DashMap};
use strum::Display;

use crate::{
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics},
        token::Token,
        typesystem::CilTypeRc,
    },
    Result,
};

/// The synthesis strategy a cached type was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ProxyKind {
    /// Delegates to a backing instance
    Forwarding,
    /// Routes every call through a `DynamicProxy` handler
    Interception,
}

/// `(kind, interface, implementation or handler)`
pub type CacheKey = (ProxyKind, Token, Token);

/// Synthesized types by identity key.
///
/// A key is synthesized at most once: concurrent callers for the same key wait on
/// the map shard while the first one synthesizes. A failed synthesis leaves no entry.
#[derive(Default)]
pub struct ProxyCache {
    entries: DashMap<CacheKey, CilTypeRc>,
}

impl ProxyCache {
    /// An empty cache
    #[must_use]
    pub fn new() -> Self {
        ProxyCache {
            entries: DashMap::new(),
        }
    }

    /// Cached type for `key`, if any
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CilTypeRc> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Number of cached types
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the type cached for `key`, running `create` on a miss.
    ///
    /// # Errors
    /// Propagates the error of `create`; nothing is cached in that case.
    pub fn get_or_create(
        &self,
        key: CacheKey,
        diagnostics: &Diagnostics,
        create: impl FnOnce() -> Result<CilTypeRc>,
    ) -> Result<CilTypeRc> {
        let (kind, interface, target) = key;
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                let ty = entry.get().clone();
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticSeverity::Info,
                        DiagnosticCategory::Cache,
                        format!("{kind} hit for ({interface}, {target})"),
                    )
                    .with_token(ty.token)
                    .with_type(ty.fullname()),
                );
                Ok(ty)
            }
            Entry::Vacant(entry) => {
                let ty = create()?;
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticSeverity::Info,
                        DiagnosticCategory::Cache,
                        format!("{kind} miss for ({interface}, {target})"),
                    )
                    .with_token(ty.token)
                    .with_type(ty.fullname()),
                );
                entry.insert(ty.clone());
                Ok(ty)
            }
        }
    }
}

impl std::fmt::Debug for ProxyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
