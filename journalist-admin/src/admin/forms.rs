//! Form payloads and their validation.
//!
//! Each form deserializes from `application/x-www-form-urlencoded` and
//! validates into a typed value or a list of field errors that the page
//! template renders inline.

use axum::extract::Multipart;
use serde::{Deserialize, Deserializer};

use crate::account::NewAccount;
use crate::otp::HOTP_SECRET_HEX_LEN;

const REQUIRED: &str = "This field is required.";

/// A validation failure attached to a form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Field errors collected while validating a form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub errors: Vec<FieldError>,
}

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// HTML checkboxes submit a value only when checked.
fn checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(matches!(
        value.as_deref().map(str::trim),
        Some(v) if !v.is_empty() && !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "off")
    ))
}

fn strip_spaces(value: &str) -> String {
    value.chars().filter(|c| *c != ' ').collect()
}

/// `POST /add`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUserForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_admin: bool,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_hotp: bool,
    #[serde(default)]
    pub otp_secret: String,
}

impl NewUserForm {
    pub fn validate(self) -> Result<NewAccount, FormErrors> {
        let mut errors = FormErrors::default();
        let username = self.username.trim().to_string();

        if username.is_empty() {
            errors.add("username", REQUIRED);
        }

        let hotp_secret = if self.is_hotp {
            let secret = strip_spaces(&self.otp_secret);
            if secret.len() != HOTP_SECRET_HEX_LEN {
                errors.add(
                    "otp_secret",
                    format!(
                        "HOTP secrets are {HOTP_SECRET_HEX_LEN} characters long - you have entered {}.",
                        secret.len()
                    ),
                );
            }
            Some(secret)
        } else {
            None
        };

        errors.into_result(NewAccount {
            username,
            password: self.password,
            is_admin: self.is_admin,
            hotp_secret,
        })
    }
}

/// `GET /2fa?uid=`
#[derive(Debug, Deserialize)]
pub struct UidQuery {
    pub uid: i64,
}

/// `POST /2fa` and `POST /login` token field.
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    #[serde(default)]
    pub token: String,
}

/// `POST /reset-2fa-totp`
#[derive(Debug, Deserialize)]
pub struct ResetTotpForm {
    pub uid: i64,
}

/// `POST /reset-2fa-hotp`
#[derive(Debug, Deserialize)]
pub struct ResetHotpForm {
    pub uid: i64,
    #[serde(default)]
    pub otp_secret: Option<String>,
}

impl ResetHotpForm {
    /// The submitted secret, if any was entered.
    pub fn secret(&self) -> Option<&str> {
        self.otp_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// `POST /edit/{id}`
#[derive(Debug, Deserialize)]
pub struct EditUserForm {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_admin: bool,
}

impl EditUserForm {
    /// Requested username, if a non-empty one was submitted.
    pub fn new_username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// `POST /edit/{id}/new-password`
#[derive(Debug, Deserialize)]
pub struct NewPasswordForm {
    #[serde(default)]
    pub password: String,
}

/// `POST /login`
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

/// Accepted logo file extensions.
const LOGO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A validated logo upload from `POST /config`.
#[derive(Debug)]
pub struct LogoUpload {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl LogoUpload {
    /// Read the `logo` field of a multipart body.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, FormErrors> {
        let mut upload = None;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    let mut errors = FormErrors::default();
                    errors.add("logo", format!("Could not read upload: {e}"));
                    return Err(errors);
                }
            };
            if field.name() != Some("logo") {
                continue;
            }
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = match field.bytes().await {
                Ok(data) => data.to_vec(),
                Err(e) => {
                    let mut errors = FormErrors::default();
                    errors.add("logo", format!("Could not read upload: {e}"));
                    return Err(errors);
                }
            };
            upload = Some((file_name, data));
        }

        Self::validate(upload)
    }

    fn validate(upload: Option<(String, Vec<u8>)>) -> Result<Self, FormErrors> {
        let mut errors = FormErrors::default();

        let Some((file_name, data)) = upload.filter(|(name, data)| !name.is_empty() && !data.is_empty())
        else {
            errors.add("logo", "File required.");
            return Err(errors);
        };

        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !LOGO_EXTENSIONS.contains(&extension.as_str()) {
            errors.add("logo", "Upload images only.");
        }

        errors.into_result(Self { file_name, data })
    }
}
