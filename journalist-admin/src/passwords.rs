//! Diceware passphrases: policy, generation and hashing.
//!
//! Hashing uses Argon2id; generation draws words uniformly from an embedded
//! wordlist.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const WORDLIST: &str = include_str!("../assets/wordlist.txt");

/// Why a password was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    #[error("password must be between {min} and {max} characters long")]
    InvalidLength { min: usize, max: usize },

    #[error("password must contain at least {0} words")]
    TooFewWords(usize),
}

/// Passphrase policy and generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PasswordPolicy {
    /// Words in a generated passphrase
    #[serde(default = "default_word_count")]
    pub word_count: usize,

    /// Minimum accepted length in characters
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Maximum accepted length in characters
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Minimum number of whitespace-separated words
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

fn default_word_count() -> usize {
    7
}

fn default_min_length() -> usize {
    14
}

fn default_max_length() -> usize {
    128
}

fn default_min_words() -> usize {
    7
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            word_count: default_word_count(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            min_words: default_min_words(),
        }
    }
}

impl PasswordPolicy {
    /// Check a candidate password against the policy.
    pub fn check(&self, password: &str) -> Result<(), PasswordError> {
        let len = password.chars().count();
        if len < self.min_length || len > self.max_length {
            return Err(PasswordError::InvalidLength {
                min: self.min_length,
                max: self.max_length,
            });
        }
        if password.split_whitespace().count() < self.min_words {
            return Err(PasswordError::TooFewWords(self.min_words));
        }
        Ok(())
    }

    /// Generate a fresh diceware passphrase.
    pub fn generate(&self) -> String {
        let words: Vec<&str> = WORDLIST.lines().filter(|w| !w.is_empty()).collect();
        let mut rng = rand::rng();
        (0..self.word_count)
            .filter_map(|_| words.choose(&mut rng).copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let password = "correct horse battery staple";
        let hash = hash_password(password).unwrap();

        assert_ne!(hash, password);
        assert!(verify_password(password, &hash));
        assert!(!verify_password("wrong password", &hash));
        assert!(!verify_password(password, "not-a-phc-string"));
    }

    #[test]
    fn test_generated_passphrase_satisfies_policy() {
        let policy = PasswordPolicy::default();
        for _ in 0..20 {
            let passphrase = policy.generate();
            assert_eq!(passphrase.split(' ').count(), 7);
            policy.check(&passphrase).unwrap();
        }
    }

    #[test]
    fn test_policy_rejects_short_and_long() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            policy.check("short"),
            Err(PasswordError::InvalidLength { min: 14, max: 128 })
        );
        let long = "word ".repeat(40);
        assert!(matches!(
            policy.check(&long),
            Err(PasswordError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_policy_requires_words() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            policy.check("averyveryverylongsinglewordpassword"),
            Err(PasswordError::TooFewWords(7))
        );
    }

    #[test]
    fn test_relaxed_policy() {
        let policy = PasswordPolicy {
            min_length: 1,
            min_words: 1,
            ..PasswordPolicy::default()
        };
        policy.check("x").unwrap();
        assert!(policy.check("").is_err());
    }
}
