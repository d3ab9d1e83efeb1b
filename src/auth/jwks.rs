// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing key selection from a JSON Web Key Set.
//!
//! The key set itself is fetched and cached by the discovery service; this
//! module only turns a JWK into a verification key for a given token header.

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Header};

use super::error::AuthError;

/// Pick the verification key for a token header.
///
/// With a `kid` the matching key is required; without one the first usable
/// key is taken.
pub fn select_key(keys: &JwkSet, header: &Header) -> Result<(DecodingKey, Algorithm), AuthError> {
    match &header.kid {
        Some(kid) => {
            let jwk = keys
                .keys
                .iter()
                .find(|k| k.common.key_id.as_deref() == Some(kid.as_str()))
                .ok_or(AuthError::NoMatchingKey)?;
            jwk_to_decoding_key(jwk, header.alg)
        }
        None => keys
            .keys
            .iter()
            .find_map(|jwk| jwk_to_decoding_key(jwk, header.alg).ok())
            .ok_or(AuthError::NoMatchingKey),
    }
}

/// Convert a JWK to a DecodingKey.
///
/// The key's declared algorithm takes precedence; keys without one accept
/// the token's algorithm if it belongs to the key's family.
pub fn jwk_to_decoding_key(
    jwk: &Jwk,
    token_alg: Algorithm,
) -> Result<(DecodingKey, Algorithm), AuthError> {
    let algorithm = match jwk.common.key_algorithm.and_then(signing_algorithm) {
        Some(declared) => declared,
        None => token_alg,
    };

    if !family_matches(&jwk.algorithm, algorithm) {
        return Err(AuthError::NoMatchingKey);
    }

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| AuthError::InternalError(format!("Failed to create key from JWK: {e}")))?;
    Ok((key, algorithm))
}

/// Map a JWK `alg` to a JWS signing algorithm. Encryption algorithms map to `None`.
fn signing_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

fn family_matches(params: &AlgorithmParameters, algorithm: Algorithm) -> bool {
    match params {
        AlgorithmParameters::RSA(_) => matches!(
            algorithm,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        AlgorithmParameters::EllipticCurve(_) => {
            matches!(algorithm, Algorithm::ES256 | Algorithm::ES384)
        }
        AlgorithmParameters::OctetKey(_) => matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ),
        AlgorithmParameters::OctetKeyPair(_) => algorithm == Algorithm::EdDSA,
    }
}

/// Whether an algorithm is a shared-secret (HMAC) algorithm.
pub fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_set() -> JwkSet {
        serde_json::from_str(
            r#"{"keys":[
                {"kty":"oct","kid":"hmac-1","alg":"HS256","k":"c2VjcmV0LW9uZQ"},
                {"kty":"oct","kid":"hmac-2","k":"c2VjcmV0LXR3bw"}
            ]}"#,
        )
        .unwrap()
    }

    fn header(alg: Algorithm, kid: Option<&str>) -> Header {
        let mut header = Header::new(alg);
        header.kid = kid.map(str::to_string);
        header
    }

    #[test]
    fn selects_key_by_kid() {
        let (_, alg) = select_key(&key_set(), &header(Algorithm::HS256, Some("hmac-1"))).unwrap();
        assert_eq!(alg, Algorithm::HS256);
    }

    #[test]
    fn unknown_kid_is_no_matching_key() {
        let result = select_key(&key_set(), &header(Algorithm::HS256, Some("missing")));
        assert!(matches!(result, Err(AuthError::NoMatchingKey)));
    }

    #[test]
    fn key_without_alg_accepts_token_alg_of_same_family() {
        let (_, alg) = select_key(&key_set(), &header(Algorithm::HS512, Some("hmac-2"))).unwrap();
        assert_eq!(alg, Algorithm::HS512);

        let result = select_key(&key_set(), &header(Algorithm::RS256, Some("hmac-2")));
        assert!(matches!(result, Err(AuthError::NoMatchingKey)));
    }

    #[test]
    fn no_kid_takes_first_usable_key() {
        let (_, alg) = select_key(&key_set(), &header(Algorithm::HS384, None)).unwrap();
        // hmac-1 declares HS256 and wins as the first convertible key
        assert_eq!(alg, Algorithm::HS256);
    }

    #[test]
    fn hmac_detection() {
        assert!(is_hmac(Algorithm::HS256));
        assert!(!is_hmac(Algorithm::RS256));
    }
}
