//! SQL query constants with database-specific placeholders.
//!
//! SQLite uses `?` placeholders, PostgreSQL uses `$1, $2, ...` numbered placeholders.

// =============================================================================
// Accounts
// =============================================================================

#[cfg(feature = "sqlite")]
pub const INSERT_ACCOUNT: &str = r#"
    INSERT INTO journalists
        (username, password_hash, is_admin, is_totp, otp_secret, hotp_counter, otp_confirmed, created_at)
    VALUES (?, ?, ?, ?, ?, 0, ?, ?)
    RETURNING id
"#;

#[cfg(feature = "postgres")]
pub const INSERT_ACCOUNT: &str = r#"
    INSERT INTO journalists
        (username, password_hash, is_admin, is_totp, otp_secret, hotp_counter, otp_confirmed, created_at)
    VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
    RETURNING id
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_ACCOUNT: &str = r#"
    SELECT id, username, password_hash, is_admin, is_totp, otp_secret, hotp_counter,
           last_token, otp_confirmed, created_at, last_access
    FROM journalists WHERE id = ?
"#;

#[cfg(feature = "postgres")]
pub const SELECT_ACCOUNT: &str = r#"
    SELECT id, username, password_hash, is_admin, is_totp, otp_secret, hotp_counter,
           last_token, otp_confirmed, created_at, last_access
    FROM journalists WHERE id = $1
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_ACCOUNT_BY_USERNAME: &str = r#"
    SELECT id, username, password_hash, is_admin, is_totp, otp_secret, hotp_counter,
           last_token, otp_confirmed, created_at, last_access
    FROM journalists WHERE username = ?
"#;

#[cfg(feature = "postgres")]
pub const SELECT_ACCOUNT_BY_USERNAME: &str = r#"
    SELECT id, username, password_hash, is_admin, is_totp, otp_secret, hotp_counter,
           last_token, otp_confirmed, created_at, last_access
    FROM journalists WHERE username = $1
"#;

pub const SELECT_ALL_ACCOUNTS: &str = r#"
    SELECT id, username, password_hash, is_admin, is_totp, otp_secret, hotp_counter,
           last_token, otp_confirmed, created_at, last_access
    FROM journalists ORDER BY id
"#;

#[cfg(feature = "sqlite")]
pub const UPDATE_ACCOUNT_PROFILE: &str =
    "UPDATE journalists SET username = ?, is_admin = ? WHERE id = ?";

#[cfg(feature = "postgres")]
pub const UPDATE_ACCOUNT_PROFILE: &str =
    "UPDATE journalists SET username = $1, is_admin = $2 WHERE id = $3";

#[cfg(feature = "sqlite")]
pub const UPDATE_ACCOUNT_PASSWORD: &str =
    "UPDATE journalists SET password_hash = ? WHERE id = ?";

#[cfg(feature = "postgres")]
pub const UPDATE_ACCOUNT_PASSWORD: &str =
    "UPDATE journalists SET password_hash = $1 WHERE id = $2";

#[cfg(feature = "sqlite")]
pub const UPDATE_ACCOUNT_OTP: &str = r#"
    UPDATE journalists
    SET is_totp = ?, otp_secret = ?, hotp_counter = 0, last_token = NULL, otp_confirmed = ?
    WHERE id = ?
"#;

#[cfg(feature = "postgres")]
pub const UPDATE_ACCOUNT_OTP: &str = r#"
    UPDATE journalists
    SET is_totp = $1, otp_secret = $2, hotp_counter = 0, last_token = NULL, otp_confirmed = $3
    WHERE id = $4
"#;

// Matches no row when the token equals the stored last token
#[cfg(feature = "sqlite")]
pub const CLAIM_ACCOUNT_TOKEN: &str = r#"
    UPDATE journalists SET last_token = ?
    WHERE id = ? AND (last_token IS NULL OR last_token <> ?)
"#;

#[cfg(feature = "postgres")]
pub const CLAIM_ACCOUNT_TOKEN: &str = r#"
    UPDATE journalists SET last_token = $1
    WHERE id = $2 AND (last_token IS NULL OR last_token <> $3)
"#;

// Matches no row once the counter has moved past the matched value
#[cfg(feature = "sqlite")]
pub const UPDATE_ACCOUNT_OTP_VERIFIED: &str = r#"
    UPDATE journalists SET hotp_counter = ?, otp_confirmed = ?
    WHERE id = ? AND hotp_counter <= ?
"#;

#[cfg(feature = "postgres")]
pub const UPDATE_ACCOUNT_OTP_VERIFIED: &str = r#"
    UPDATE journalists SET hotp_counter = $1, otp_confirmed = $2
    WHERE id = $3 AND hotp_counter <= $4
"#;

#[cfg(feature = "sqlite")]
pub const UPDATE_ACCOUNT_LAST_ACCESS: &str =
    "UPDATE journalists SET last_access = ? WHERE id = ?";

#[cfg(feature = "postgres")]
pub const UPDATE_ACCOUNT_LAST_ACCESS: &str =
    "UPDATE journalists SET last_access = $1 WHERE id = $2";

#[cfg(feature = "sqlite")]
pub const DELETE_ACCOUNT: &str = "DELETE FROM journalists WHERE id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_ACCOUNT: &str = "DELETE FROM journalists WHERE id = $1";

// =============================================================================
// Admin sessions
// =============================================================================

#[cfg(feature = "sqlite")]
pub const INSERT_ADMIN_SESSION: &str = r#"
    INSERT INTO admin_sessions (session_id, account_id, created_at, expires_at, ip_address, user_agent)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

#[cfg(feature = "postgres")]
pub const INSERT_ADMIN_SESSION: &str = r#"
    INSERT INTO admin_sessions (session_id, account_id, created_at, expires_at, ip_address, user_agent)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_ADMIN_SESSION: &str = r#"
    SELECT session_id, account_id, created_at, expires_at, ip_address, user_agent
    FROM admin_sessions WHERE session_id = ?
"#;

#[cfg(feature = "postgres")]
pub const SELECT_ADMIN_SESSION: &str = r#"
    SELECT session_id, account_id, created_at, expires_at, ip_address, user_agent
    FROM admin_sessions WHERE session_id = $1
"#;

#[cfg(feature = "sqlite")]
pub const DELETE_ADMIN_SESSION: &str = "DELETE FROM admin_sessions WHERE session_id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_ADMIN_SESSION: &str = "DELETE FROM admin_sessions WHERE session_id = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_ADMIN_SESSIONS_BY_ACCOUNT: &str =
    "DELETE FROM admin_sessions WHERE account_id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_ADMIN_SESSIONS_BY_ACCOUNT: &str =
    "DELETE FROM admin_sessions WHERE account_id = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_EXPIRED_ADMIN_SESSIONS: &str =
    "DELETE FROM admin_sessions WHERE expires_at < ?";

#[cfg(feature = "postgres")]
pub const DELETE_EXPIRED_ADMIN_SESSIONS: &str =
    "DELETE FROM admin_sessions WHERE expires_at < $1";

// =============================================================================
// Flash messages
// =============================================================================

#[cfg(feature = "sqlite")]
pub const INSERT_FLASH: &str = r#"
    INSERT INTO admin_flashes (session_id, category, message, created_at)
    VALUES (?, ?, ?, ?)
"#;

#[cfg(feature = "postgres")]
pub const INSERT_FLASH: &str = r#"
    INSERT INTO admin_flashes (session_id, category, message, created_at)
    VALUES ($1, $2, $3, $4)
"#;

#[cfg(feature = "sqlite")]
pub const SELECT_FLASHES: &str =
    "SELECT category, message FROM admin_flashes WHERE session_id = ? ORDER BY id";

#[cfg(feature = "postgres")]
pub const SELECT_FLASHES: &str =
    "SELECT category, message FROM admin_flashes WHERE session_id = $1 ORDER BY id";

#[cfg(feature = "sqlite")]
pub const DELETE_FLASHES: &str = "DELETE FROM admin_flashes WHERE session_id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_FLASHES: &str = "DELETE FROM admin_flashes WHERE session_id = $1";
