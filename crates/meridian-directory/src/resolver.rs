//! Identity resolver backed by a fixed table.
//!
//! Used by the node, whose identity table comes from configuration, and by
//! tests.

use crate::traits::IdentityResolver;
use crate::types::ResolvedIdentity;
use async_trait::async_trait;
use meridian_core::{Context, MeridianError, Result};
use std::collections::HashMap;

/// Resolves identities from an in-memory map of identity to signer address.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    signers: HashMap<String, String>,
}

impl StaticResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping (builder form)
    pub fn with_identity(mut self, identity: impl Into<String>, on_chain: impl Into<String>) -> Self {
        self.insert(identity, on_chain);
        self
    }

    /// Add or replace a mapping
    pub fn insert(&mut self, identity: impl Into<String>, on_chain: impl Into<String>) {
        self.signers.insert(identity.into(), on_chain.into());
    }

    /// Number of known identities
    pub fn len(&self) -> usize {
        self.signers.len()
    }

    /// Whether no identities are known
    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

impl<I, A> FromIterator<(I, A)> for StaticResolver
where
    I: Into<String>,
    A: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (I, A)>>(iter: T) -> Self {
        let mut resolver = Self::new();
        for (identity, on_chain) in iter {
            resolver.insert(identity, on_chain);
        }
        resolver
    }
}

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve(&self, ctx: &Context, identity: &str) -> Result<ResolvedIdentity> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        if identity.is_empty() {
            return Err(MeridianError::resolution("empty identity reference"));
        }

        self.signers
            .get(identity)
            .map(|on_chain| ResolvedIdentity {
                identity: identity.to_owned(),
                on_chain: on_chain.clone(),
            })
            .ok_or_else(|| MeridianError::resolution(format!("identity '{identity}' is not registered")))
    }
}
