//! Cache key derivation.

use sha2::{Digest, Sha256};

use crate::http::{HttpMethod, Parameters};

/// Identifies a cached response.
///
/// The key is the hex SHA-256 of the method, the absolute URL and the
/// canonical parameters, so it is also a safe file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    const LEN: usize = 64;

    /// Derive the key for a request.
    ///
    /// Returns `None` for methods whose responses are never cached (PUT and
    /// DELETE).
    pub fn derive(method: HttpMethod, url: &str, params: &Parameters) -> Option<Self> {
        if !method.is_cacheable() {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(url.as_bytes());
        hasher.update([0]);
        hasher.update(params.canonical().as_bytes());
        Some(Self(hex::encode(hasher.finalize())))
    }

    /// Recognize a cache file name.
    pub(crate) fn from_file_name(name: &str) -> Option<Self> {
        let valid = name.len() == Self::LEN
            && name
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(name.to_string()))
    }

    /// The key as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
