//! Password verification with timing-attack mitigation.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

/// Precomputed Argon2id hash that can never match a real password.
///
/// Verified whenever no stored hash is available so the "no such account"
/// path pays the same memory-hard cost as "account exists, wrong password".
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$MDEyMzQ1Njc4OWFiY2RlZg$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[derive(Clone, Copy, Debug, Default)]
pub struct CredentialVerifier;

impl CredentialVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Verify `password` against a stored PHC-format Argon2 hash.
    pub fn verify(&self, password: &SecretString, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            // An unparseable hash still burns a full verification so the
            // response latency does not reveal the corrupt record.
            warn!("Stored password hash is not a valid PHC string");
            self.burn_dummy(password);
            return false;
        };
        Argon2::default()
            .verify_password(password.expose_secret().as_bytes(), &parsed)
            .is_ok()
    }

    /// Verify against `stored_hash` when present; otherwise run a dummy
    /// verification and fail.
    ///
    /// Callers that looked up a non-existent account must use this so the
    /// total latency is statistically indistinguishable from a wrong
    /// password against an existing account.
    pub fn verify_or_dummy(&self, password: &SecretString, stored_hash: Option<&str>) -> bool {
        match stored_hash {
            Some(hash) => self.verify(password, hash),
            None => {
                self.burn_dummy(password);
                false
            }
        }
    }

    fn burn_dummy(&self, password: &SecretString) {
        if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
            let _ = Argon2::default().verify_password(password.expose_secret().as_bytes(), &parsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("hash password")
            .to_string()
    }

    #[test]
    fn correct_password_verifies() {
        let verifier = CredentialVerifier::new();
        let stored = hash("hunter2hunter2");
        let password = SecretString::from("hunter2hunter2".to_string());
        assert!(verifier.verify(&password, &stored));
    }

    #[test]
    fn wrong_password_fails() {
        let verifier = CredentialVerifier::new();
        let stored = hash("hunter2hunter2");
        let password = SecretString::from("wrong".to_string());
        assert!(!verifier.verify(&password, &stored));
    }

    #[test]
    fn missing_hash_fails_after_dummy_verification() {
        let verifier = CredentialVerifier::new();
        let password = SecretString::from("anything".to_string());
        assert!(!verifier.verify_or_dummy(&password, None));
    }

    #[test]
    fn corrupt_hash_fails() {
        let verifier = CredentialVerifier::new();
        let password = SecretString::from("anything".to_string());
        assert!(!verifier.verify(&password, "not-a-phc-string"));
    }

    #[test]
    fn dummy_hash_is_a_valid_phc_string() {
        assert!(PasswordHash::new(DUMMY_HASH).is_ok());
    }

    #[test]
    fn dummy_hash_uses_the_default_verification_parameters() {
        let parsed = PasswordHash::new(DUMMY_HASH).expect("parse dummy hash");
        assert_eq!(parsed.algorithm.as_str(), "argon2id");

        // Same cost as a real verification, otherwise the missing-account
        // path would be measurably cheaper.
        let params = argon2::Params::try_from(&parsed).expect("params");
        let defaults = argon2::Params::default();
        assert_eq!(params.m_cost(), defaults.m_cost());
        assert_eq!(params.t_cost(), defaults.t_cost());
        assert_eq!(params.p_cost(), defaults.p_cost());
    }

    #[test]
    fn missing_account_costs_a_full_verification() {
        let verifier = CredentialVerifier::new();
        let stored = hash("correct horse");
        let password = SecretString::from("wrong guess".to_string());

        let median = |check: &dyn Fn()| {
            let mut samples: Vec<std::time::Duration> = (0..5)
                .map(|_| {
                    let start = std::time::Instant::now();
                    check();
                    start.elapsed()
                })
                .collect();
            samples.sort_unstable();
            samples[2]
        };

        let wrong_password = median(&|| {
            assert!(!verifier.verify(&password, &stored));
        });
        let no_account = median(&|| {
            assert!(!verifier.verify_or_dummy(&password, None));
        });

        // Both paths run exactly one memory-hard verification; a generous
        // bound catches a regression that skips the dummy work without
        // making the test sensitive to scheduler noise.
        assert!(
            no_account * 4 > wrong_password,
            "missing-account path ({no_account:?}) is much cheaper than wrong-password ({wrong_password:?})"
        );
        assert!(
            wrong_password * 4 > no_account,
            "wrong-password path ({wrong_password:?}) is much cheaper than missing-account ({no_account:?})"
        );
    }
}
