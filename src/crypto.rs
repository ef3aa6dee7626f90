use sha2::{Digest, Sha256};

/// Hashes a raw API key for storage/lookup. The raw key is supplied by the
/// caller on every request and never persisted; only this hash is compared
/// against `api_keys.key_hash`.
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_hashes_identically() {
        assert_eq!(hash_api_key("sk-live-abc"), hash_api_key("sk-live-abc"));
    }

    #[test]
    fn different_input_hashes_differently() {
        assert_ne!(hash_api_key("sk-live-abc"), hash_api_key("sk-live-xyz"));
    }
}
