use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Byte-level crypto helpers used by the login-signature check (§4.4).
/// Grounded in the teacher's `connection/src/bytes.rs`, trimmed to the
/// primitives `auth::verify_signature` actually needs.
pub fn xor(slice1: &[u8], slice2: &[u8]) -> Vec<u8> {
    let mut result = vec![0u8; slice1.len()];
    for i in 0..result.len() {
        result[i] = slice1[i] ^ slice2[i % slice2.len().max(1)];
    }
    result
}

pub fn sha1(value: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(value);
    hasher.finalize().as_slice().to_vec()
}

pub fn sha256(value: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(value);
    hasher.finalize().as_slice().to_vec()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn xor_is_its_own_inverse() {
        let a = sha1(b"hello");
        let b = sha1(b"world");
        let x = xor(&a, &b);
        assert_eq!(xor(&x, &b), a);
    }
}
