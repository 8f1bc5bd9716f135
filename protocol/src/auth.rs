use serde::{Deserialize, Serialize};

use crate::bytes::{sha1, sha256, xor};
use crate::SCRAMBLE_LENGTH;

/// Auth method a user row can be created with (§3 User model: "auth method ∈
/// {md5, password, trust}"). The exact password-hashing primitive is named
/// but left unspecified by the design (§1); this implements a scramble
/// scheme symmetric to the teacher's client-side `encrypt_password`
/// (`connection/src/bytes.rs`) so the server can verify what a
/// teacher-compatible client would send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    Md5,
    Password,
    Trust,
}

impl AuthMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "md5" => Some(AuthMethod::Md5),
            "password" => Some(AuthMethod::Password),
            "trust" => Some(AuthMethod::Trust),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Md5 => "md5",
            AuthMethod::Password => "password",
            AuthMethod::Trust => "trust",
        }
    }
}

/// Hashes a cleartext password into the form stored in the meta database's
/// `user.password` column (§4.2 schema), given the auth method that will
/// later verify it.
pub fn hash_password(password: &str, method: AuthMethod) -> String {
    match method {
        AuthMethod::Md5 => hex_encode(&sha1(password.as_bytes())),
        AuthMethod::Password => hex_encode(&sha256(password.as_bytes())),
        AuthMethod::Trust => String::new(),
    }
}

/// Verifies the client's 20-byte login signature (§6 login reply) against
/// the stored password hash and the handshake challenge seed (§4.4).
pub fn verify_signature(stored_hash_hex: &str, seed: &[u8], signature: &[u8], method: AuthMethod) -> bool {
    match method {
        AuthMethod::Trust => true,
        AuthMethod::Md5 => {
            let Some(stored) = hex_decode(stored_hash_hex) else { return false };
            if signature.len() != SCRAMBLE_LENGTH {
                return false;
            }
            let double_hash = sha1(&stored);
            let mixed = [seed, &double_hash].concat();
            let candidate = xor(signature, &sha1(&mixed));
            candidate == stored
        }
        AuthMethod::Password => {
            let Some(stored) = hex_decode(stored_hash_hex) else { return false };
            if signature.len() != SCRAMBLE_LENGTH {
                return false;
            }
            let double_hash = sha256(&stored);
            let mixed = [seed, &double_hash].concat();
            let candidate = xor(signature, &sha256(&mixed));
            candidate == stored
        }
    }
}

/// Produces the signature a teacher-compatible client would send; used by
/// integration tests to drive the handshake end to end without a real
/// client implementation.
pub fn sign_challenge(password: &str, seed: &[u8], method: AuthMethod) -> Vec<u8> {
    match method {
        AuthMethod::Trust => vec![0u8; SCRAMBLE_LENGTH],
        AuthMethod::Md5 => {
            let stored = sha1(password.as_bytes());
            let double_hash = sha1(&stored);
            let mixed = [seed, &double_hash[..]].concat();
            xor(&stored, &sha1(&mixed))
        }
        AuthMethod::Password => {
            let stored = sha256(password.as_bytes());
            let double_hash = sha256(&stored);
            let mixed = [seed, &double_hash[..]].concat();
            xor(&stored, &sha256(&mixed))
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
