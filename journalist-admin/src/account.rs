//! Journalist accounts: creation, lookup, credential and two-factor lifecycle.
//!
//! `AccountStore` is the only code that writes the `journalists` table. It
//! enforces username and password policy before anything is persisted and
//! maps the database UNIQUE constraint onto `AccountError::DuplicateUsername`.

use chrono::{DateTime, Utc};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{DbPool, DbRow};
use crate::otp::{self, OtpMode, OtpSecretError};
use crate::passwords::{self, PasswordError, PasswordPolicy};
use crate::sql;

/// Minimum username length in characters.
pub const MIN_USERNAME_LEN: usize = 3;

/// Errors raised by the account service.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Username rejected by policy; carries the user-facing reason.
    #[error("{0}")]
    InvalidUsername(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    OtpSecret(#[from] OtpSecretError),

    #[error("username \"{0}\" is already in use")]
    DuplicateUsername(String),

    #[error("account {0} not found")]
    NotFound(i64),

    #[error("failed to hash password: {0}")]
    Hash(#[from] argon2::password_hash::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Enrollment state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    /// Created or reset; waiting for the first verified token.
    PendingTwoFactor,
    Active,
}

/// Journalist account record
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub otp_mode: OtpMode,
    pub otp_secret: String,
    pub hotp_counter: i64,
    pub last_token: Option<String>,
    pub otp_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub last_access: Option<DateTime<Utc>>,
}

impl Account {
    pub fn state(&self) -> AccountState {
        if self.otp_confirmed {
            AccountState::Active
        } else {
            AccountState::PendingTwoFactor
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == AccountState::Active
    }
}

/// Input for account creation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub is_admin: bool,
    /// Hex secret of an HOTP hardware token; TOTP with a random secret otherwise.
    pub hotp_secret: Option<String>,
}

/// Check a username against policy.
pub fn check_username_acceptable(username: &str) -> Result<(), AccountError> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(AccountError::InvalidUsername(format!(
            "Username \"{username}\" must be at least {MIN_USERNAME_LEN} characters long."
        )));
    }
    Ok(())
}

fn map_unique_violation(err: sqlx::Error, username: &str) -> AccountError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AccountError::DuplicateUsername(username.to_string())
        }
        _ => AccountError::Database(err),
    }
}

/// Database-backed account service.
pub struct AccountStore {
    pool: DbPool,
    policy: PasswordPolicy,
}

impl AccountStore {
    pub fn new(pool: DbPool, policy: PasswordPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Create an account after validating username, password and OTP secret.
    ///
    /// New accounts start in `PendingTwoFactor`.
    pub async fn create(&self, new: NewAccount) -> Result<Account, AccountError> {
        check_username_acceptable(&new.username)?;
        self.policy.check(&new.password)?;

        let (otp_mode, otp_secret) = match new.hotp_secret.as_deref() {
            Some(hex_secret) => (OtpMode::Hotp, otp::hotp_secret_from_hex(hex_secret)?),
            None => (OtpMode::Totp, otp::random_base32_secret()),
        };
        let password_hash = passwords::hash_password(&new.password)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(sql::INSERT_ACCOUNT)
            .bind(&new.username)
            .bind(&password_hash)
            .bind(new.is_admin)
            .bind(otp_mode == OtpMode::Totp)
            .bind(&otp_secret)
            .bind(false)
            .bind(now.to_rfc3339())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, &new.username))?;
        let id: i64 = row.try_get("id")?;
        tx.commit().await?;

        info!(account_id = id, username = %new.username, is_admin = new.is_admin, "Account created");

        Ok(Account {
            id,
            username: new.username,
            password_hash,
            is_admin: new.is_admin,
            otp_mode,
            otp_secret,
            hotp_counter: 0,
            last_token: None,
            otp_confirmed: false,
            created_at: now,
            last_access: None,
        })
    }

    /// Get an account by id.
    pub async fn get(&self, id: i64) -> Result<Option<Account>, AccountError> {
        let row = sqlx::query(sql::SELECT_ACCOUNT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_account).transpose()
    }

    /// Get an account by id, treating absence as an error.
    pub async fn require(&self, id: i64) -> Result<Account, AccountError> {
        self.get(id).await?.ok_or(AccountError::NotFound(id))
    }

    /// Get an account by username.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AccountError> {
        let row = sqlx::query(sql::SELECT_ACCOUNT_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_account).transpose()
    }

    /// List all accounts ordered by id.
    pub async fn list(&self) -> Result<Vec<Account>, AccountError> {
        let rows = sqlx::query(sql::SELECT_ALL_ACCOUNTS)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_account).collect()
    }

    /// Persist a username and admin flag.
    ///
    /// Callers validate the username first; a concurrent rename to the same
    /// name still surfaces as `DuplicateUsername`.
    pub async fn update_profile(
        &self,
        id: i64,
        username: &str,
        is_admin: bool,
    ) -> Result<(), AccountError> {
        let result = sqlx::query(sql::UPDATE_ACCOUNT_PROFILE)
            .bind(username)
            .bind(is_admin)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, username))?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound(id));
        }
        Ok(())
    }

    /// Replace an account's password after checking it against policy.
    pub async fn set_password(&self, id: i64, password: &str) -> Result<(), AccountError> {
        self.policy.check(password)?;
        let password_hash = passwords::hash_password(password)?;

        let result = sqlx::query(sql::UPDATE_ACCOUNT_PASSWORD)
            .bind(&password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound(id));
        }
        Ok(())
    }

    /// Switch to TOTP with a freshly generated secret.
    pub async fn reset_totp(&self, id: i64) -> Result<(), AccountError> {
        let secret = otp::random_base32_secret();
        self.store_otp(id, OtpMode::Totp, &secret).await
    }

    /// Switch to HOTP with an admin-supplied hex secret.
    ///
    /// The secret is validated before anything is written, so a malformed
    /// secret leaves the existing configuration in place.
    pub async fn set_hotp_secret(&self, id: i64, hex_secret: &str) -> Result<(), AccountError> {
        let secret = otp::hotp_secret_from_hex(hex_secret)?;
        self.store_otp(id, OtpMode::Hotp, &secret).await
    }

    async fn store_otp(&self, id: i64, mode: OtpMode, secret: &str) -> Result<(), AccountError> {
        let result = sqlx::query(sql::UPDATE_ACCOUNT_OTP)
            .bind(mode == OtpMode::Totp)
            .bind(secret)
            .bind(false)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound(id));
        }
        info!(account_id = id, mode = mode.as_str(), "Two-factor secret reset");
        Ok(())
    }

    /// Verify a token against the account's OTP configuration.
    ///
    /// Every attempt is recorded as the account's last token and the same
    /// token is never accepted twice in a row. A successful verification
    /// advances the HOTP counter and activates the account.
    ///
    /// The token is claimed with a conditional update, so concurrent
    /// submissions of one token race on a single row write and at most one
    /// of them proceeds to verification.
    pub async fn verify_token(&self, id: i64, token: &str) -> Result<bool, AccountError> {
        let account = self.require(id).await?;

        let Some(token) = otp::normalize_token(token) else {
            return Ok(false);
        };

        let claimed = sqlx::query(sql::CLAIM_ACCOUNT_TOKEN)
            .bind(&token)
            .bind(id)
            .bind(&token)
            .execute(&self.pool)
            .await?;
        if claimed.rows_affected() == 0 {
            debug!(account_id = id, "Rejected reused two-factor token");
            return Ok(false);
        }

        // (counter the token matched, counter to store afterwards)
        let matched = match account.otp_mode {
            OtpMode::Totp => otp::verify_totp(&account.otp_secret, &token, Utc::now())
                .then_some((account.hotp_counter, account.hotp_counter)),
            OtpMode::Hotp => {
                otp::verify_hotp(&account.otp_secret, &token, account.hotp_counter.max(0) as u64)
                    .map(|c| (c as i64, c as i64 + 1))
            }
        };
        let Some((matched, next_counter)) = matched else {
            return Ok(false);
        };

        // A concurrent success may already have moved the counter past ours
        let result = sqlx::query(sql::UPDATE_ACCOUNT_OTP_VERIFIED)
            .bind(next_counter)
            .bind(true)
            .bind(id)
            .bind(matched)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            debug!(account_id = id, "Rejected token for an already consumed HOTP counter");
            return Ok(false);
        }
        Ok(true)
    }

    /// Check username, password and token for a login attempt.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        token: &str,
    ) -> Result<Option<Account>, AccountError> {
        let Some(account) = self.find_by_username(username).await? else {
            return Ok(None);
        };
        if !passwords::verify_password(password, &account.password_hash) {
            return Ok(None);
        }
        if !self.verify_token(account.id, token).await? {
            return Ok(None);
        }

        sqlx::query(sql::UPDATE_ACCOUNT_LAST_ACCESS)
            .bind(Utc::now().to_rfc3339())
            .bind(account.id)
            .execute(&self.pool)
            .await
            .ok();

        self.get(account.id).await
    }

    /// Delete an account together with its sessions.
    ///
    /// Returns false if no such account exists.
    pub async fn delete(&self, id: i64) -> Result<bool, AccountError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(sql::DELETE_ADMIN_SESSIONS_BY_ACCOUNT)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(sql::DELETE_ACCOUNT)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        info!(account_id = id, "Account deleted");
        Ok(true)
    }
}

fn row_to_account(row: DbRow) -> Result<Account, AccountError> {
    let created_at: String = row.try_get("created_at")?;
    let is_totp: bool = row.try_get("is_totp")?;

    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        is_admin: row.try_get("is_admin")?,
        otp_mode: if is_totp { OtpMode::Totp } else { OtpMode::Hotp },
        otp_secret: row.try_get("otp_secret")?,
        hotp_counter: row.try_get("hotp_counter")?,
        last_token: row.try_get("last_token")?,
        otp_confirmed: row.try_get("otp_confirmed")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_access: row
            .try_get::<Option<String>, _>("last_access")?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::Database;
    use tempfile::TempDir;

    const PASSPHRASE: &str = "amber bison cedar delta ember flint grain";
    const RFC_HEX_SECRET: &str = "3132333435363738393031323334353637383930";

    async fn store() -> (TempDir, AccountStore) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&DatabaseConfig::default(), temp.path())
            .await
            .unwrap();
        (temp, AccountStore::new(db.pool(), PasswordPolicy::default()))
    }

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            password: PASSPHRASE.to_string(),
            is_admin: false,
            hotp_secret: None,
        }
    }

    #[test]
    fn test_username_policy() {
        assert!(check_username_acceptable("bob").is_ok());
        let err = check_username_acceptable("ab").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Username \"ab\" must be at least 3 characters long."
        );
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();

        assert_eq!(account.state(), AccountState::PendingTwoFactor);
        assert_eq!(account.otp_mode, OtpMode::Totp);

        let loaded = store.get(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.username, "alice");
        assert!(passwords::verify_password(PASSPHRASE, &loaded.password_hash));
        assert!(store.get(account.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_not_persisted() {
        let (_temp, store) = store().await;
        store.create(new_account("alice")).await.unwrap();

        let err = store.create(new_account("alice")).await.unwrap_err();
        assert!(matches!(err, AccountError::DuplicateUsername(ref name) if name == "alice"));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_password() {
        let (_temp, store) = store().await;
        let mut account = new_account("alice");
        account.password = "x".to_string();

        let err = store.create(account).await.unwrap_err();
        assert!(matches!(err, AccountError::Password(_)));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_hotp_secret() {
        let (_temp, store) = store().await;
        let mut account = new_account("alice");
        account.hotp_secret = Some(RFC_HEX_SECRET.to_string());

        let account = store.create(account).await.unwrap();
        assert_eq!(account.otp_mode, OtpMode::Hotp);

        assert!(store.verify_token(account.id, "755224").await.unwrap());
        let account = store.require(account.id).await.unwrap();
        assert_eq!(account.hotp_counter, 1);
        assert!(account.is_active());
    }

    #[tokio::test]
    async fn test_hotp_counter_skips_ahead() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();
        store.set_hotp_secret(account.id, RFC_HEX_SECRET).await.unwrap();

        // Counter 5 is within the look-ahead window
        assert!(store.verify_token(account.id, "254676").await.unwrap());
        assert_eq!(store.require(account.id).await.unwrap().hotp_counter, 6);
        // Earlier counters are no longer accepted
        assert!(!store.verify_token(account.id, "338314").await.unwrap());
    }

    #[tokio::test]
    async fn test_totp_token_cannot_be_replayed() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();
        let token = otp::current_totp(&account.otp_secret, Utc::now()).unwrap();

        assert!(store.verify_token(account.id, &token).await.unwrap());
        assert!(!store.verify_token(account.id, &token).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_accept_token_once() {
        let (_temp, store) = store().await;
        let store = std::sync::Arc::new(store);

        for round in 0..10 {
            let account = store.create(new_account(&format!("user{round}"))).await.unwrap();
            let token = otp::current_totp(&account.otp_secret, Utc::now()).unwrap();
            let id = account.id;

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    let token = token.clone();
                    tokio::spawn(async move { store.verify_token(id, &token).await })
                })
                .collect();

            let mut accepted = 0;
            for handle in handles {
                if handle.await.unwrap().unwrap() {
                    accepted += 1;
                }
            }
            assert_eq!(accepted, 1, "round {round}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hotp_tokens_advance_counter_once() {
        let (_temp, store) = store().await;
        let store = std::sync::Arc::new(store);
        let mut account = new_account("alice");
        account.hotp_secret = Some(RFC_HEX_SECRET.to_string());
        let id = store.create(account).await.unwrap().id;

        // Counters 3 and 2; whichever lands second must not rewind the counter
        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.verify_token(id, "969429").await })
        };
        let second = {
            let store = store.clone();
            tokio::spawn(async move { store.verify_token(id, "359152").await })
        };
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert!(first);
        let reloaded = store.require(id).await.unwrap();
        assert_eq!(reloaded.hotp_counter, 4);
        if second {
            // Only possible when counter 2 was consumed before counter 3
            assert!(reloaded.is_active());
        }
    }

    #[tokio::test]
    async fn test_failed_verification_keeps_pending_state() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();

        assert!(!store.verify_token(account.id, "").await.unwrap());
        assert!(!store.verify_token(account.id, "not a token").await.unwrap());
        let reloaded = store.require(account.id).await.unwrap();
        assert!(!reloaded.is_active());
        assert_eq!(reloaded.otp_secret, account.otp_secret);
    }

    #[tokio::test]
    async fn test_malformed_hotp_secret_leaves_configuration() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();

        let err = store.set_hotp_secret(account.id, "123").await.unwrap_err();
        assert!(matches!(err, AccountError::OtpSecret(OtpSecretError::OddLength)));
        let err = store.set_hotp_secret(account.id, "zz").await.unwrap_err();
        assert!(matches!(err, AccountError::OtpSecret(OtpSecretError::NonHexDigit)));

        let reloaded = store.require(account.id).await.unwrap();
        assert_eq!(reloaded.otp_mode, OtpMode::Totp);
        assert_eq!(reloaded.otp_secret, account.otp_secret);
    }

    #[tokio::test]
    async fn test_reset_totp_returns_to_pending() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();
        let token = otp::current_totp(&account.otp_secret, Utc::now()).unwrap();
        assert!(store.verify_token(account.id, &token).await.unwrap());

        store.reset_totp(account.id).await.unwrap();
        let reloaded = store.require(account.id).await.unwrap();
        assert_ne!(reloaded.otp_secret, account.otp_secret);
        assert_eq!(reloaded.state(), AccountState::PendingTwoFactor);
        assert!(reloaded.last_token.is_none());

        assert!(matches!(
            store.reset_totp(9999).await,
            Err(AccountError::NotFound(9999))
        ));
    }

    #[tokio::test]
    async fn test_update_profile_conflict() {
        let (_temp, store) = store().await;
        let alice = store.create(new_account("alice")).await.unwrap();
        store.create(new_account("bobby")).await.unwrap();

        let err = store.update_profile(alice.id, "bobby", true).await.unwrap_err();
        assert!(matches!(err, AccountError::DuplicateUsername(_)));

        store.update_profile(alice.id, "alice", true).await.unwrap();
        assert!(store.require(alice.id).await.unwrap().is_admin);
    }

    #[tokio::test]
    async fn test_set_password() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();
        let new_password = "fossil grape hazel igloo jelly kayak lemon";

        assert!(matches!(
            store.set_password(account.id, "short").await,
            Err(AccountError::Password(_))
        ));
        store.set_password(account.id, new_password).await.unwrap();
        let reloaded = store.require(account.id).await.unwrap();
        assert!(passwords::verify_password(new_password, &reloaded.password_hash));

        assert!(matches!(
            store.set_password(4242, new_password).await,
            Err(AccountError::NotFound(4242))
        ));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();
        let token = otp::current_totp(&account.otp_secret, Utc::now()).unwrap();

        assert!(store.authenticate("alice", "wrong", &token).await.unwrap().is_none());
        assert!(store.authenticate("nobody", PASSPHRASE, &token).await.unwrap().is_none());

        let logged_in = store.authenticate("alice", PASSPHRASE, &token).await.unwrap().unwrap();
        assert!(logged_in.last_access.is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_temp, store) = store().await;
        let account = store.create(new_account("alice")).await.unwrap();

        assert!(store.delete(account.id).await.unwrap());
        assert!(!store.delete(account.id).await.unwrap());
        assert!(store.get(account.id).await.unwrap().is_none());
    }
}
