use sodiumoxide::crypto::pwhash::argon2id13;

use crate::error::ShareError;

#[cfg(not(test))]
const LIMITS: (argon2id13::OpsLimit, argon2id13::MemLimit) = (
    argon2id13::OPSLIMIT_INTERACTIVE,
    argon2id13::MEMLIMIT_INTERACTIVE,
);

// smallest costs libsodium accepts, keeps the property tests fast
#[cfg(test)]
const LIMITS: (argon2id13::OpsLimit, argon2id13::MemLimit) =
    (argon2id13::OpsLimit(1), argon2id13::MemLimit(8192));

/// Hashes a clear text password before it is stored. Salt and cost
/// parameters are part of the returned string.
pub fn hash(password: &str) -> Result<String, ShareError> {
    let (ops_limit, mem_limit) = LIMITS;
    let hashed = argon2id13::pwhash(password.as_bytes(), ops_limit, mem_limit)
        .map_err(|_| ShareError::PasswordHash)?;

    // libsodium returns a NUL padded C string
    let encoded = std::str::from_utf8(&hashed.0).map_err(|_| ShareError::PasswordHash)?;
    Ok(encoded.trim_end_matches('\0').to_string())
}

pub fn verify(password: &str, hash: &str) -> bool {
    let bytes = hash.as_bytes();
    if bytes.is_empty() || bytes.len() >= argon2id13::HASHEDPASSWORDBYTES {
        return false;
    }

    let mut padded = [0u8; argon2id13::HASHEDPASSWORDBYTES];
    padded[..bytes.len()].copy_from_slice(bytes);

    match argon2id13::HashedPassword::from_slice(&padded) {
        Some(hashed) => argon2id13::pwhash_verify(&hashed, password.as_bytes()),
        None => false,
    }
}
