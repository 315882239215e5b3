//! Askama templates for the admin UI.

use crate::account::Account;
use crate::admin::flash::Flash;
use crate::otp;
use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

/// Base data available to all logged-in pages
pub struct BaseContext {
    pub username: String,
    pub flashes: Vec<Flash>,
}

/// Render a template into an HTML response.
pub fn render<T: Template>(template: &T) -> Response {
    Html(
        template
            .render()
            .unwrap_or_else(|e| format!("Template error: {e}")),
    )
    .into_response()
}

/// Render a standalone error page with the given status.
pub fn error_page(status: StatusCode, message: &str) -> Response {
    let template = ErrorTemplate {
        status: status.as_u16(),
        message: message.to_string(),
    };
    (status, render(&template)).into_response()
}

/// Login page template
#[derive(Template)]
#[template(path = "admin/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
}

/// Error page template
#[derive(Template)]
#[template(path = "admin/error.html")]
pub struct ErrorTemplate {
    pub status: u16,
    pub message: String,
}

/// Account row for listings and the edit page
pub struct AccountSummary {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub otp_mode: &'static str,
    pub active: bool,
    pub created_at: String,
    pub last_access: String,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            is_admin: account.is_admin,
            otp_mode: account.otp_mode.as_str(),
            active: account.is_active(),
            created_at: account.created_at.format("%Y-%m-%d %H:%M").to_string(),
            last_access: account
                .last_access
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string()),
        }
    }
}

/// Account listing
#[derive(Template)]
#[template(path = "admin/index.html")]
pub struct IndexTemplate {
    pub base: BaseContext,
    pub accounts: Vec<AccountSummary>,
}

/// Instance configuration (logo upload, test alert)
#[derive(Template)]
#[template(path = "admin/config.html")]
pub struct ConfigTemplate {
    pub base: BaseContext,
    pub errors: Vec<String>,
}

/// New account form
#[derive(Template)]
#[template(path = "admin/add_user.html")]
pub struct AddUserTemplate {
    pub base: BaseContext,
    pub password: String,
    pub username: String,
    pub is_admin: bool,
    pub is_hotp: bool,
    pub otp_secret: String,
    pub errors: Vec<String>,
}

/// Two-factor enrollment page
#[derive(Template)]
#[template(path = "admin/two_factor.html")]
pub struct TwoFactorTemplate {
    pub base: BaseContext,
    pub uid: i64,
    pub account_username: String,
    pub is_totp: bool,
    pub formatted_secret: String,
    pub provisioning_uri: String,
}

impl TwoFactorTemplate {
    pub fn new(base: BaseContext, account: &Account, issuer: &str) -> Self {
        Self {
            base,
            uid: account.id,
            account_username: account.username.clone(),
            is_totp: account.otp_mode == otp::OtpMode::Totp,
            formatted_secret: otp::formatted_secret(&account.otp_secret),
            provisioning_uri: otp::provisioning_uri(
                account.otp_mode,
                &account.otp_secret,
                &account.username,
                issuer,
            ),
        }
    }
}

/// HOTP secret entry form
#[derive(Template)]
#[template(path = "admin/edit_hotp_secret.html")]
pub struct EditHotpSecretTemplate {
    pub base: BaseContext,
    pub uid: i64,
    pub account_username: String,
}

/// Account edit page
#[derive(Template)]
#[template(path = "admin/edit_account.html")]
pub struct EditAccountTemplate {
    pub base: BaseContext,
    pub account: AccountSummary,
    pub password: String,
}
