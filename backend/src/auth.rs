//! User accounts and credential checks. Login only verifies credentials;
//! there is no session state.

use anyhow::anyhow;
use log::info;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::db::models::{NewUser, User};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::utils::now;

pub const DEFAULT_HASH_ROUNDS: u32 = 100_000;

/// One-way password hashing (PBKDF2-SHA256, PHC string format).
#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    rounds: u32,
}

impl Hasher {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| anyhow!("salt encoding: {e}"))?;

        let params = Params {
            rounds: self.rounds,
            output_length: 32,
        };
        let hash = Pbkdf2
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .map_err(|e| anyhow!("password hashing: {e}"))?;

        Ok(hash.to_string())
    }

    /// False for a wrong password and for an unreadable stored hash alike.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        PasswordHash::new(stored)
            .map(|parsed| Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_ROUNDS)
    }
}

#[derive(Clone)]
pub struct Credentials {
    db: Db,
    hasher: Hasher,
    // Verified against when the email is unknown, so both failure paths cost
    // the same.
    decoy: String,
}

impl Credentials {
    pub fn new(db: Db, hasher: Hasher) -> Result<Self> {
        let decoy = hasher.hash("decoy")?;
        Ok(Self { db, hasher, decoy })
    }

    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(Error::Validation("All fields required".to_owned()));
        }

        if self.db.user_by_email(email)?.is_some() {
            return Err(Error::Conflict("Email already registered".to_owned()));
        }

        let password_hash = self.hasher.hash(password)?;
        let user = self.db.insert_user(&NewUser {
            name,
            email,
            password_hash: &password_hash,
            created_at: now(),
        })?;

        info!("registered user {} ({})", user.id, user.email);
        Ok(user)
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let Some(user) = self.db.user_by_email(email.trim())? else {
            self.hasher.verify(password, &self.decoy);
            return Err(Error::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash) {
            return Err(Error::InvalidCredentials);
        }

        info!("user {} logged in", user.email);
        Ok(user)
    }

    /// Most recently registered first.
    pub fn list(&self) -> Result<Vec<User>> {
        self.db.users()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_db;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn credentials() -> (TempDir, Credentials) {
        let (dir, db) = temp_db();
        (dir, Credentials::new(db, Hasher::new(1_000)).unwrap())
    }

    #[test]
    fn hash_is_salted_and_verifiable() {
        let hasher = Hasher::new(1_000);
        let a = hasher.hash("hunter2").unwrap();
        let b = hasher.hash("hunter2").unwrap();

        assert_ne!(a, b);
        assert!(!a.contains("hunter2"));
        assert!(hasher.verify("hunter2", &a));
        assert!(!hasher.verify("hunter3", &a));
        assert!(!hasher.verify("hunter2", "not a phc string"));
    }

    #[test]
    fn register_stores_only_the_hash() {
        let (_dir, credentials) = credentials();
        let user = credentials
            .register("Ada", "ada@example.com", "s3cret")
            .unwrap();

        assert_eq!(user.email, "ada@example.com");
        assert_ne!(user.password_hash, "s3cret");
        assert!(user.password_hash.starts_with("$pbkdf2-sha256$"));
    }

    #[test]
    fn duplicate_email_conflicts() {
        let (_dir, credentials) = credentials();
        credentials
            .register("Ada", "ada@example.com", "s3cret")
            .unwrap();

        let err = credentials
            .register("Other", "ada@example.com", "pw")
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "{err:?}");
        assert_eq!(credentials.list().unwrap().len(), 1);
    }

    #[test]
    fn missing_fields_are_rejected() {
        let (_dir, credentials) = credentials();
        let err = credentials.register("", "a@b.c", "pw").unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err:?}");
    }

    #[test]
    fn authenticate_success() {
        let (_dir, credentials) = credentials();
        let user = credentials
            .register("Ada", "ada@example.com", "s3cret")
            .unwrap();

        assert_eq!(
            credentials.authenticate("ada@example.com", "s3cret").unwrap(),
            user
        );
    }

    #[test]
    fn wrong_password_and_unknown_email_fail_alike() {
        let (_dir, credentials) = credentials();
        credentials
            .register("Ada", "ada@example.com", "s3cret")
            .unwrap();

        let wrong_password = credentials
            .authenticate("ada@example.com", "nope")
            .unwrap_err();
        let unknown_email = credentials
            .authenticate("bob@example.com", "s3cret")
            .unwrap_err();

        assert!(matches!(wrong_password, Error::InvalidCredentials));
        assert!(matches!(unknown_email, Error::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }
}
