//! Cache key derivation
//!
//! A key is the SHA-256 digest of a canonical JSON document holding the
//! collection identifier and the parameters sorted by name. Serialization
//! is stable across runs, so equal inputs always produce equal keys.

use query_core::{CollectionIdentity, ParamValue, QueryError, QueryParams, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed-length digest identifying a (collection, parameters) pair
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive the key for a collection identifier and its parameters
    pub fn derive(collection_id: &str, params: &QueryParams) -> Result<Self> {
        derive_key(collection_id, params)
    }

    /// Derive the key for any collection that can name itself
    pub fn for_collection<C>(collection: &C, params: &QueryParams) -> Result<Self>
    where
        C: CollectionIdentity + ?Sized,
    {
        derive_key(&collection.collection_id(), params)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", &self.to_hex()[..12])
    }
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    collection: &'a str,
    params: BTreeMap<&'a str, &'a ParamValue>,
}

/// Derive a cache key. Fails with `QueryError::KeyDerivation` when a
/// parameter value has no canonical serialized form.
pub fn derive_key(collection_id: &str, params: &QueryParams) -> Result<CacheKey> {
    let material = KeyMaterial {
        collection: collection_id,
        params: params.sorted(),
    };
    for (name, value) in &material.params {
        value.validate().map_err(|e| match e {
            QueryError::KeyDerivation(reason) => {
                QueryError::KeyDerivation(format!("parameter '{}': {}", name, reason))
            }
            other => other,
        })?;
    }
    let canonical =
        serde_json::to_vec(&material).map_err(|e| QueryError::KeyDerivation(e.to_string()))?;

    let digest = Sha256::digest(&canonical);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Ok(CacheKey(bytes))
}
