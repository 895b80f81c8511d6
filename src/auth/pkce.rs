//! PKCE (RFC 7636) verifier and S256 challenge.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;
use sha2::{Digest, Sha256};

/// 56 random bytes encode to a 75 character verifier, inside the 43..=128 range.
const VERIFIER_BYTES: usize = 56;

pub const CHALLENGE_METHOD: &str = "s256";

pub struct PkcePair {
    pub verifier: SecretString,
    pub challenge: String,
}

#[must_use]
pub fn generate() -> PkcePair {
    let mut bytes = [0u8; VERIFIER_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let verifier = Base64UrlUnpadded::encode_string(&bytes);
    let challenge = challenge(&verifier);
    PkcePair {
        verifier: SecretString::from(verifier),
        challenge,
    }
}

#[must_use]
pub fn challenge(verifier: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(verifier.as_bytes()))
}
