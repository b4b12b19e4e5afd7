//! Content hashes recorded in execution reports.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// blake3 digest of a plan or pipeline document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

/// Digest of the JSON encoding of `v`. Field order follows the type, so
/// equal values always hash the same.
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, Error> {
    let bytes = serde_json::to_vec(v).map_err(|e| Error::Hash(e.to_string()))?;
    Ok(Hash256(blake3::hash(&bytes).into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Plan;

    #[test]
    fn plan_hash_follows_step_order() {
        let ab = Plan::new(["a", "b"]).unwrap();
        let ba = Plan::new(["b", "a"]).unwrap();

        assert_eq!(
            hash_serde(&ab).unwrap(),
            hash_serde(&Plan::new(["a", "b"]).unwrap()).unwrap()
        );
        assert_ne!(hash_serde(&ab).unwrap(), hash_serde(&ba).unwrap());
    }

    #[test]
    fn displays_as_lowercase_hex() {
        let shown = Hash256([0xab; 32]).to_string();
        assert_eq!(shown.len(), 64);
        assert!(shown.chars().all(|c| c == 'a' || c == 'b'));
    }
}
