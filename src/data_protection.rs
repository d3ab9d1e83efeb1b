// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Protection
//!
//! Authenticated encryption for values that leave the service and come back,
//! such as the email address embedded in an unsubscribe link.
//!
//! ## Format
//!
//! `base64url( window ‖ nonce ‖ ciphertext+tag )`
//!
//! - `window`: 8-byte big-endian index of the key lifetime window
//! - `nonce`: 12 random bytes
//! - ciphertext: AES-256-GCM, purpose as associated data
//!
//! Each window has its own key, derived with HKDF-SHA256 from the master
//! key, the purpose and the window index. Payloads from older windows
//! remain readable.

use std::path::Path;
use std::time::Duration;

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use chrono::Utc;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::hkdf::{Salt, HKDF_SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::info;

/// Master key length in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Default lifetime of a derived key (30 days).
pub const DEFAULT_KEY_LIFETIME: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const WINDOW_LEN: usize = 8;
const HKDF_SALT: &[u8] = b"communications.data-protection.v1";

#[derive(Debug, thiserror::Error)]
pub enum DataProtectionError {
    #[error("invalid master key: {0}")]
    InvalidKey(String),

    #[error("the payload is invalid or was not protected for this purpose")]
    InvalidPayload,

    #[error("encryption failed")]
    Crypto,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a protected value is for. Payloads only open for the same purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataProtectionPurpose {
    RouteValues,
}

impl DataProtectionPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            DataProtectionPurpose::RouteValues => "RouteValues",
        }
    }
}

pub struct DataProtector {
    master_key: Vec<u8>,
    purpose: DataProtectionPurpose,
    key_lifetime_secs: u64,
    rng: SystemRandom,
}

impl DataProtector {
    pub fn new(
        master_key: &[u8],
        purpose: DataProtectionPurpose,
        key_lifetime: Duration,
    ) -> Result<Self, DataProtectionError> {
        if master_key.len() != MASTER_KEY_LEN {
            return Err(DataProtectionError::InvalidKey(format!(
                "expected {MASTER_KEY_LEN} bytes, got {}",
                master_key.len()
            )));
        }
        if key_lifetime.as_secs() == 0 {
            return Err(DataProtectionError::InvalidKey(
                "key lifetime must be at least one second".to_string(),
            ));
        }
        Ok(Self {
            master_key: master_key.to_vec(),
            purpose,
            key_lifetime_secs: key_lifetime.as_secs(),
            rng: SystemRandom::new(),
        })
    }

    pub fn purpose(&self) -> DataProtectionPurpose {
        self.purpose
    }

    /// Encrypt a value with the current window's key.
    pub fn protect(&self, plaintext: &str) -> Result<String, DataProtectionError> {
        self.protect_in_window(plaintext, self.current_window())
    }

    /// Decrypt a value produced by [`DataProtector::protect`].
    pub fn unprotect(&self, payload: &str) -> Result<String, DataProtectionError> {
        let bytes = Base64UrlUnpadded::decode_vec(payload)
            .map_err(|_| DataProtectionError::InvalidPayload)?;
        if bytes.len() < WINDOW_LEN + NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(DataProtectionError::InvalidPayload);
        }

        let (window, rest) = bytes.split_at(WINDOW_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let window = u64::from_be_bytes(
            window
                .try_into()
                .map_err(|_| DataProtectionError::InvalidPayload)?,
        );
        let nonce = Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| DataProtectionError::InvalidPayload)?;

        let key = self.window_key(window)?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, self.aad(), &mut in_out)
            .map_err(|_| DataProtectionError::InvalidPayload)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| DataProtectionError::InvalidPayload)
    }

    fn protect_in_window(&self, plaintext: &str, window: u64) -> Result<String, DataProtectionError> {
        let key = self.window_key(window)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| DataProtectionError::Crypto)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            self.aad(),
            &mut in_out,
        )
        .map_err(|_| DataProtectionError::Crypto)?;

        let mut payload = Vec::with_capacity(WINDOW_LEN + NONCE_LEN + in_out.len());
        payload.extend_from_slice(&window.to_be_bytes());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&in_out);
        Ok(Base64UrlUnpadded::encode_string(&payload))
    }

    fn current_window(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64 / self.key_lifetime_secs
    }

    fn window_key(&self, window: u64) -> Result<LessSafeKey, DataProtectionError> {
        let window_bytes = window.to_be_bytes();
        let info = [self.purpose.as_str().as_bytes(), &window_bytes[..]];
        let prk = Salt::new(HKDF_SHA256, HKDF_SALT).extract(&self.master_key);
        let okm = prk
            .expand(&info, &AES_256_GCM)
            .map_err(|_| DataProtectionError::Crypto)?;
        Ok(LessSafeKey::new(UnboundKey::from(okm)))
    }

    fn aad(&self) -> Aad<&'static [u8]> {
        Aad::from(self.purpose.as_str().as_bytes())
    }
}

/// Decode a base64 master key from configuration.
pub fn decode_master_key(encoded: &str) -> Result<Vec<u8>, DataProtectionError> {
    let key = Base64::decode_vec(encoded.trim())
        .map_err(|e| DataProtectionError::InvalidKey(e.to_string()))?;
    if key.len() != MASTER_KEY_LEN {
        return Err(DataProtectionError::InvalidKey(format!(
            "expected {MASTER_KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    Ok(key)
}

/// Read the master key at `path`, generating and persisting one if absent.
pub fn load_or_create_master_key(path: &Path) -> Result<Vec<u8>, DataProtectionError> {
    if path.exists() {
        let key = std::fs::read(path)?;
        if key.len() != MASTER_KEY_LEN {
            return Err(DataProtectionError::InvalidKey(format!(
                "{} holds {} bytes, expected {MASTER_KEY_LEN}",
                path.display(),
                key.len()
            )));
        }
        return Ok(key);
    }

    let mut key = vec![0u8; MASTER_KEY_LEN];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| DataProtectionError::Crypto)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &key)?;
    info!(path = %path.display(), "Generated data protection master key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    fn protector() -> DataProtector {
        DataProtector::new(&KEY, DataProtectionPurpose::RouteValues, DEFAULT_KEY_LIFETIME).unwrap()
    }

    #[test]
    fn protect_then_unprotect() {
        let protector = protector();
        let payload = protector.protect("reader@example.com").unwrap();
        assert!(!payload.contains("reader"));
        assert!(!payload.contains('/') && !payload.contains('+') && !payload.contains('='));
        assert_eq!(protector.unprotect(&payload).unwrap(), "reader@example.com");
    }

    #[test]
    fn payloads_are_randomised() {
        let protector = protector();
        assert_ne!(
            protector.protect("same").unwrap(),
            protector.protect("same").unwrap()
        );
    }

    #[test]
    fn payload_from_older_window_is_accepted() {
        let protector = protector();
        let old = protector
            .protect_in_window("reader@example.com", protector.current_window() - 3)
            .unwrap();
        assert_eq!(protector.unprotect(&old).unwrap(), "reader@example.com");
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let protector = protector();
        let payload = protector.protect("reader@example.com").unwrap();
        let mut bytes = Base64UrlUnpadded::decode_vec(&payload).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = Base64UrlUnpadded::encode_string(&bytes);

        assert!(matches!(
            protector.unprotect(&tampered),
            Err(DataProtectionError::InvalidPayload)
        ));
        assert!(matches!(
            protector.unprotect("not base64!"),
            Err(DataProtectionError::InvalidPayload)
        ));
        assert!(matches!(
            protector.unprotect("AAAA"),
            Err(DataProtectionError::InvalidPayload)
        ));
    }

    #[test]
    fn other_master_key_cannot_unprotect() {
        let payload = protector().protect("reader@example.com").unwrap();
        let other =
            DataProtector::new(&[9u8; 32], DataProtectionPurpose::RouteValues, DEFAULT_KEY_LIFETIME)
                .unwrap();
        assert!(matches!(
            other.unprotect(&payload),
            Err(DataProtectionError::InvalidPayload)
        ));
    }

    #[test]
    fn master_key_length_is_checked() {
        assert!(matches!(
            DataProtector::new(&[1u8; 16], DataProtectionPurpose::RouteValues, DEFAULT_KEY_LIFETIME),
            Err(DataProtectionError::InvalidKey(_))
        ));
        assert!(decode_master_key(&Base64::encode_string(&KEY)).is_ok());
        assert!(decode_master_key("c2hvcnQ=").is_err());
    }

    #[test]
    fn master_key_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("master.key");

        let created = load_or_create_master_key(&path).unwrap();
        assert_eq!(created.len(), MASTER_KEY_LEN);
        let loaded = load_or_create_master_key(&path).unwrap();
        assert_eq!(created, loaded);
    }
}
