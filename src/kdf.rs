// Key Derivation Module
// =======================================================
// Turns a password plus the per-file salt stored in a container into a
// 32-byte AES-256 key. The function is pure: the same (password, salt) pair
// always yields the same key, so every file task derives its own key from
// the salt of the container it is processing.

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::container::SALT_SIZE;

/// Number of SHA-256 rounds applied to password and salt
pub const ITERATIONS: usize = 10_000;

/// AES-256 needs a 32-byte key
pub const KEY_SIZE: usize = 32;

/// A derived key, wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive an encryption key from a password and salt
///
/// The function works by:
/// 1. Hashing the password followed by the salt
/// 2. Re-hashing the previous digest until ITERATIONS rounds have run
/// 3. Returning the final digest as the key
///
/// Parameters:
/// - password: The user-provided password
/// - salt: The salt read from (or about to be written to) the container
pub fn derive_key(password: &str, salt: &[u8; SALT_SIZE]) -> DerivedKey {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    let mut digest = hasher.finalize();

    for _ in 1..ITERATIONS {
        digest = Sha256::digest(digest);
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    digest.as_mut_slice().zeroize();
    DerivedKey(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn different_salt_different_key() {
        let a = derive_key("password", &[1u8; SALT_SIZE]);
        let b = derive_key("password", &[2u8; SALT_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn different_password_different_key() {
        let salt = [7u8; SALT_SIZE];
        assert_ne!(derive_key("alpha", &salt), derive_key("beta", &salt));
    }

    #[test]
    fn debug_does_not_leak() {
        let key = derive_key("secret", &[0u8; SALT_SIZE]);
        assert_eq!(format!("{key:?}"), "DerivedKey([REDACTED])");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn derivation_is_deterministic(
            password in ".{0,32}",
            salt in proptest::array::uniform15(any::<u8>()),
        ) {
            let first = derive_key(&password, &salt);
            let second = derive_key(&password, &salt);
            prop_assert_eq!(first.as_bytes().len(), KEY_SIZE);
            prop_assert_eq!(first, second);
        }
    }
}
