//! Canonical fingerprints for deduplicating fetch requests.
//!
//! A [`Fingerprint`] is the canonical JSON serialization of a value together
//! with a 64-bit FNV-1a digest of that serialization. Two fingerprints are
//! equal iff their canonical strings are identical; the digest exists for
//! compact log output.
//!
//! Canonical means stable key ordering: struct fields serialize in
//! declaration order and maps are `BTreeMap`s, so the same logical value
//! always produces the same bytes. Callers are responsible for putting any
//! set-like sequences into a canonical order before fingerprinting.

use std::fmt;

use serde::Serialize;

/// FNV-1a offset basis (64-bit).
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a prime (64-bit).
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Computes a 64-bit FNV-1a hash over raw bytes.
///
/// # Examples
///
/// ```
/// use smarttable_core::hash::fnv1a_64;
///
/// assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
/// assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
/// ```
#[must_use]
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Identity of a value by its canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    canonical: String,
    digest: u64,
}

impl Fingerprint {
    /// Fingerprints any serializable value.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON
    /// (for example a map with non-string keys).
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let canonical = serde_json::to_string(value)?;
        let digest = fnv1a_64(canonical.as_bytes());
        Ok(Self { canonical, digest })
    }

    /// The canonical serialization this fingerprint compares by.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// 64-bit digest of the canonical serialization.
    #[must_use]
    pub fn digest(&self) -> u64 {
        self.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.digest)
    }
}
