//! One-time password secrets and token verification.
//!
//! Implements HOTP (RFC 4226) and TOTP (RFC 6238) with HMAC-SHA1 and six
//! digit codes, which is what hardware tokens and authenticator apps expect.
//! Secrets are stored base32 encoded.

use chrono::{DateTime, Utc};
use data_encoding::BASE32;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

/// Digits in a generated code.
pub const DIGITS: u32 = 6;

/// TOTP time step in seconds.
pub const TOTP_STEP_SECS: i64 = 30;

/// Number of HOTP counter values checked ahead of the stored counter.
pub const HOTP_LOOKAHEAD: u64 = 20;

/// Length in hex characters of the secrets programmed into HOTP tokens.
pub const HOTP_SECRET_HEX_LEN: usize = 40;

/// Bytes of entropy in a generated TOTP secret.
const TOTP_SECRET_BYTES: usize = 20;

type HmacSha1 = Hmac<Sha1>;

/// Which one-time password scheme an account uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpMode {
    Totp,
    Hotp,
}

impl OtpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpMode::Totp => "totp",
            OtpMode::Hotp => "hotp",
        }
    }
}

/// Why a submitted HOTP secret was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtpSecretError {
    #[error("Odd-length string")]
    OddLength,

    #[error("Non-hexadecimal digit found")]
    NonHexDigit,
}

/// Generate a random base32 TOTP secret.
pub fn random_base32_secret() -> String {
    let bytes: [u8; TOTP_SECRET_BYTES] = rand::random();
    BASE32.encode(&bytes)
}

/// Convert an admin-supplied hex HOTP secret into the stored base32 form.
///
/// Spaces are ignored. Odd length is reported before invalid digits.
pub fn hotp_secret_from_hex(secret: &str) -> Result<String, OtpSecretError> {
    let compact: String = secret.chars().filter(|c| *c != ' ').collect();
    let bytes = hex::decode(&compact).map_err(|e| match e {
        hex::FromHexError::OddLength => OtpSecretError::OddLength,
        _ => OtpSecretError::NonHexDigit,
    })?;
    Ok(BASE32.encode(&bytes))
}

/// Compute the HOTP value for `counter`.
pub fn hotp(key: &[u8], counter: u64) -> Option<u32> {
    let mut mac = HmacSha1::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    Some(binary % 10u32.pow(DIGITS))
}

/// Compute the TOTP value at `at`.
pub fn totp(key: &[u8], at: DateTime<Utc>) -> Option<u32> {
    hotp(key, totp_step(at))
}

fn totp_step(at: DateTime<Utc>) -> u64 {
    at.timestamp().max(0) as u64 / TOTP_STEP_SECS as u64
}

/// Zero-pad a code to the configured number of digits.
pub fn format_code(code: u32) -> String {
    format!("{:0width$}", code, width = DIGITS as usize)
}

/// Strip spaces from a submitted token and check it looks like a code.
pub fn normalize_token(token: &str) -> Option<String> {
    let token: String = token.chars().filter(|c| !c.is_whitespace()).collect();
    if token.len() == DIGITS as usize && token.bytes().all(|b| b.is_ascii_digit()) {
        Some(token)
    } else {
        None
    }
}

/// Decode a stored base32 secret. Lowercase and spaces are tolerated.
pub fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let cleaned: String = secret
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32.decode(cleaned.as_bytes()).ok()
}

/// Check a TOTP token, allowing one step of clock skew either way.
pub fn verify_totp(secret: &str, token: &str, now: DateTime<Utc>) -> bool {
    let Some(key) = decode_secret(secret) else {
        return false;
    };
    let step = totp_step(now);
    [step.saturating_sub(1), step, step + 1]
        .into_iter()
        .any(|s| hotp(&key, s).map(format_code).as_deref() == Some(token))
}

/// Check an HOTP token against the look-ahead window starting at `counter`.
///
/// Returns the counter value that matched.
pub fn verify_hotp(secret: &str, token: &str, counter: u64) -> Option<u64> {
    let key = decode_secret(secret)?;
    (counter..counter + HOTP_LOOKAHEAD).find(|c| hotp(&key, *c).map(format_code).as_deref() == Some(token))
}

/// Current TOTP code for a stored secret.
pub fn current_totp(secret: &str, now: DateTime<Utc>) -> Option<String> {
    decode_secret(secret).and_then(|key| totp(&key, now)).map(format_code)
}

/// HOTP code for a stored secret at `counter`.
pub fn hotp_code(secret: &str, counter: u64) -> Option<String> {
    decode_secret(secret).and_then(|key| hotp(&key, counter)).map(format_code)
}

/// Secret split into groups of four for display.
pub fn formatted_secret(secret: &str) -> String {
    secret
        .trim_end_matches('=')
        .as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `otpauth://` URI understood by authenticator apps.
pub fn provisioning_uri(mode: OtpMode, secret: &str, username: &str, issuer: &str) -> String {
    let secret = secret.trim_end_matches('=');
    let issuer = urlencoding::encode(issuer);
    let label = format!("{issuer}:{}", urlencoding::encode(username));
    match mode {
        OtpMode::Totp => format!("otpauth://totp/{label}?secret={secret}&issuer={issuer}"),
        OtpMode::Hotp => {
            format!("otpauth://hotp/{label}?secret={secret}&issuer={issuer}&counter=0")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RFC_KEY: &[u8] = b"12345678901234567890";

    fn rfc_secret() -> String {
        BASE32.encode(RFC_KEY)
    }

    #[test]
    fn test_hotp_rfc4226_vectors() {
        let expected = [
            755224, 287082, 359152, 969429, 338314, 254676, 287922, 162583, 399871, 520489,
        ];
        for (counter, code) in expected.iter().enumerate() {
            assert_eq!(hotp(RFC_KEY, counter as u64), Some(*code), "counter {counter}");
        }
    }

    #[test]
    fn test_hotp_code_from_stored_secret() {
        let secret = rfc_secret();
        assert_eq!(hotp_code(&secret, 0).as_deref(), Some("755224"));
        assert_eq!(hotp_code(&secret, 9).as_deref(), Some("520489"));
        assert_eq!(hotp_code("not base32!", 0), None);
    }

    #[test]
    fn test_totp_rfc6238_vectors() {
        // Six-digit truncations of the SHA1 vectors
        let cases = [
            (59, "287082"),
            (1111111109, "081804"),
            (1111111111, "050471"),
            (1234567890, "005924"),
            (2000000000, "279037"),
        ];
        for (ts, code) in cases {
            let at = Utc.timestamp_opt(ts, 0).unwrap();
            assert_eq!(totp(RFC_KEY, at).map(format_code).as_deref(), Some(code), "time {ts}");
        }
    }

    #[test]
    fn test_verify_totp_allows_one_step_of_skew() {
        let secret = rfc_secret();
        let at = Utc.timestamp_opt(1111111109, 0).unwrap();
        let code = current_totp(&secret, at).unwrap();

        assert!(verify_totp(&secret, &code, at));
        assert!(verify_totp(&secret, &code, at + chrono::Duration::seconds(30)));
        assert!(verify_totp(&secret, &code, at - chrono::Duration::seconds(30)));
        assert!(!verify_totp(&secret, &code, at + chrono::Duration::seconds(90)));
    }

    #[test]
    fn test_verify_hotp_lookahead() {
        let secret = rfc_secret();
        assert_eq!(verify_hotp(&secret, "755224", 0), Some(0));
        assert_eq!(verify_hotp(&secret, "520489", 0), Some(9));
        // Already consumed counters are outside the window
        assert_eq!(verify_hotp(&secret, "755224", 1), None);
        assert_eq!(verify_hotp(&secret, "000000", 0), None);
    }

    #[test]
    fn test_hotp_secret_from_hex() {
        let hex_secret = hex::encode(RFC_KEY);
        assert_eq!(hotp_secret_from_hex(&hex_secret).unwrap(), rfc_secret());

        let spaced = "3132 3334 3536 3738 3930 3132 3334 3536 3738 3930";
        assert_eq!(hotp_secret_from_hex(spaced).unwrap(), rfc_secret());
    }

    #[test]
    fn test_hotp_secret_errors() {
        assert_eq!(hotp_secret_from_hex("abc"), Err(OtpSecretError::OddLength));
        assert_eq!(hotp_secret_from_hex("zz"), Err(OtpSecretError::NonHexDigit));
        // Odd length wins over bad digits
        assert_eq!(hotp_secret_from_hex("zzz"), Err(OtpSecretError::OddLength));
    }

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("123 456"), Some("123456".to_string()));
        assert_eq!(normalize_token(""), None);
        assert_eq!(normalize_token("12345"), None);
        assert_eq!(normalize_token("12345a"), None);
    }

    #[test]
    fn test_random_secret_decodes() {
        let secret = random_base32_secret();
        assert_eq!(secret.len(), 32);
        assert_eq!(decode_secret(&secret).unwrap().len(), TOTP_SECRET_BYTES);
        assert_ne!(secret, random_base32_secret());
    }

    #[test]
    fn test_formatted_secret_and_uri() {
        assert_eq!(formatted_secret("ABCDEFGHIJ"), "ABCD EFGH IJ");
        let uri = provisioning_uri(OtpMode::Totp, "ABCD", "alice smith", "News Room");
        assert_eq!(
            uri,
            "otpauth://totp/News%20Room:alice%20smith?secret=ABCD&issuer=News%20Room"
        );
    }
}
