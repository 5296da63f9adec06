//! Sealing of the store payload under a passphrase-derived key.

use sodiumoxide::crypto::pwhash::argon2id13;
use sodiumoxide::crypto::secretbox;
use zeroize::Zeroizing;

use crate::error::ClientError;

/// Initializes libsodium. Must run before any other function in this module.
pub fn init() -> Result<(), ClientError> {
    sodiumoxide::init().map_err(|_| ClientError::Crypto("failed to initialize libsodium".to_string()))
}

/// Ciphertext and the nonce it was sealed with.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub nonce: secretbox::Nonce,
    pub ciphertext: Vec<u8>,
}

/// Key of one store. It is derived once per unlock and keeps the salt it came
/// from, so re-sealing on every save needs neither the passphrase nor the file.
pub struct StoreKey {
    key: secretbox::Key,
    salt: argon2id13::Salt,
}

impl StoreKey {
    /// Derives a key for a new store under a fresh salt.
    pub fn generate(passphrase: &str) -> Result<Self, ClientError> {
        Self::derive(passphrase, argon2id13::gen_salt())
    }

    pub fn derive(passphrase: &str, salt: argon2id13::Salt) -> Result<Self, ClientError> {
        if passphrase.is_empty() {
            return Err(ClientError::InvalidValue("passphrase cannot be empty".to_string()));
        }

        // secretbox::Key wipes itself on drop.
        let mut key = secretbox::Key([0; secretbox::KEYBYTES]);
        argon2id13::derive_key(
            &mut key.0,
            passphrase.as_bytes(),
            &salt,
            argon2id13::OPSLIMIT_INTERACTIVE,
            argon2id13::MEMLIMIT_INTERACTIVE,
        )
        .map_err(|_| ClientError::Crypto("failed to derive key from passphrase".to_string()))?;

        Ok(Self { key, salt })
    }

    pub fn salt(&self) -> argon2id13::Salt {
        self.salt
    }

    pub fn seal(&self, plaintext: &[u8]) -> Sealed {
        let nonce = secretbox::gen_nonce();
        Sealed {
            ciphertext: secretbox::seal(plaintext, &nonce, &self.key),
            nonce,
        }
    }

    pub fn open(&self, sealed: &Sealed) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        secretbox::open(&sealed.ciphertext, &sealed.nonce, &self.key)
            .map(Zeroizing::new)
            .map_err(|_| ClientError::Crypto("cannot decrypt store, wrong passphrase or corrupted file".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_salt_derives_same_key() {
        init().unwrap();
        let key = StoreKey::generate("correct horse").unwrap();
        let sealed = key.seal(b"payload");
        assert_ne!(sealed.ciphertext, b"payload".to_vec());

        let again = StoreKey::derive("correct horse", key.salt()).unwrap();
        assert_eq!(again.open(&sealed).unwrap().as_slice(), b"payload");

        let wrong = StoreKey::derive("battery staple", key.salt()).unwrap();
        assert!(matches!(wrong.open(&sealed), Err(ClientError::Crypto(_))));
    }

    #[test]
    fn empty_passphrase_is_rejected() {
        init().unwrap();
        assert!(matches!(StoreKey::generate(""), Err(ClientError::InvalidValue(_))));
    }
}
