use crate::error::AppError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hashes a one-time passcode with Argon2.
/// A slow hash keeps a leaked database column useless within the OTP's
/// 3-minute lifetime.
pub fn hash_otp(otp: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = Argon2::default();

    let otp_hash = argon2
        .hash_password(otp.as_bytes(), &salt)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .to_string();

    Ok(otp_hash)
}

pub fn verify_otp(otp: &str, otp_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(otp_hash)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let result = Argon2::default().verify_password(otp.as_bytes(), &parsed_hash);

    match result {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let hash = hash_otp("48213").unwrap();
        assert!(verify_otp("48213", &hash).unwrap());
        assert!(!verify_otp("48214", &hash).unwrap());
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(verify_otp("48213", "not-a-phc-string").is_err());
    }
}
