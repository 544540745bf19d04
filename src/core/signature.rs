//! Encrypted biometric signatures.
//!
//! A signature is a feature vector sealed with AES-256-GCM under a key
//! derived from the passphrase with HKDF-SHA256. Every signature carries
//! its own random salt and nonce:
//!
//! ```text
//! base64url( salt[16] || nonce[12] || ciphertext[48] || tag[16] )
//! ```

use crate::core::features::FeatureVector;
use crate::error::CryptoError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;

/// HKDF salt length.
pub const SALT_LEN: usize = 16;
/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;
/// AES-256 key length.
pub const KEY_LEN: usize = 32;
/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

const HKDF_INFO: &[u8] = b"cortexkey-signature-v1";

/// User secret the signing key is derived from.
///
/// Never printed: `Debug` is redacted and there is no `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// UTF-8 bytes fed to HKDF.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Derive a 256-bit key from `passphrase`.
///
/// A fresh random salt is generated when `salt` is `None`. The salt used is
/// returned alongside the key.
pub fn derive_key(
    passphrase: &Passphrase,
    salt: Option<[u8; SALT_LEN]>,
) -> Result<([u8; KEY_LEN], [u8; SALT_LEN]), CryptoError> {
    let salt = salt.unwrap_or_else(|| {
        let mut fresh = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut fresh);
        fresh
    });

    let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), passphrase.as_bytes());
    let mut key = [0u8; KEY_LEN];
    hkdf.expand(HKDF_INFO, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;

    Ok((key, salt))
}

/// Sealed feature vector.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    /// HKDF salt this signature was sealed under
    pub salt: [u8; SALT_LEN],
    /// AES-GCM nonce
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the authentication tag appended
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

impl Signature {
    /// `salt || nonce || ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a framed signature. Only the length is checked here.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let min = SALT_LEN + NONCE_LEN + TAG_LEN;
        if bytes.len() < min {
            return Err(CryptoError::Malformed(format!(
                "{} bytes, expected at least {min}",
                bytes.len()
            )));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[SALT_LEN..SALT_LEN + NONCE_LEN]);
        Ok(Self {
            salt,
            nonce,
            ciphertext: bytes[SALT_LEN + NONCE_LEN..].to_vec(),
        })
    }

    /// URL-safe base64 text form used in output records.
    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.to_bytes())
    }

    /// Parse the text form; surrounding whitespace is ignored.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE
            .decode(text.trim())
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

/// Seal `features` under a freshly salted key and a fresh nonce.
pub fn encrypt(features: &FeatureVector, passphrase: &Passphrase) -> Result<Signature, CryptoError> {
    let (key, salt) = derive_key(passphrase, None)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::KeyDerivation)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), features.to_bytes().as_slice())
        .map_err(|_| CryptoError::Encryption)?;

    Ok(Signature {
        salt,
        nonce,
        ciphertext,
    })
}

/// Open a signature. Fails on a wrong passphrase or any tampering.
pub fn verify(signature: &Signature, passphrase: &Passphrase) -> Result<FeatureVector, CryptoError> {
    let (key, _) = derive_key(passphrase, Some(signature.salt))?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::KeyDerivation)?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(&signature.nonce), signature.ciphertext.as_slice())
        .map_err(|_| CryptoError::Authentication)?;

    FeatureVector::from_bytes(&plaintext).ok_or_else(|| {
        CryptoError::Malformed(format!("{} byte payload", plaintext.len()))
    })
}

/// Holds the session passphrase and seals feature vectors with it.
#[derive(Debug, Clone)]
pub struct SignatureCipher {
    passphrase: Passphrase,
}

impl SignatureCipher {
    pub fn new(passphrase: Passphrase) -> Self {
        Self { passphrase }
    }

    /// See [`encrypt`].
    pub fn seal(&self, features: &FeatureVector) -> Result<Signature, CryptoError> {
        encrypt(features, &self.passphrase)
    }

    /// See [`verify`].
    pub fn open(&self, signature: &Signature) -> Result<FeatureVector, CryptoError> {
        verify(signature, &self.passphrase)
    }

    /// Decode and open a base64 signature.
    pub fn open_base64(&self, text: &str) -> Result<FeatureVector, CryptoError> {
        self.open(&Signature::from_base64(text)?)
    }
}
