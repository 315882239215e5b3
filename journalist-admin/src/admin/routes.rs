//! Admin route handlers.
//!
//! Provides HTTP handlers for the admin UI: login, logout, the account
//! listing, enrollment, two-factor setup, edits, deletion and instance
//! configuration.

use crate::account::{Account, AccountError, check_username_acceptable};
use crate::admin::flash::FlashCategory;
use crate::admin::forms::{
    EditUserForm, LoginForm, LogoUpload, NewPasswordForm, NewUserForm, ResetHotpForm,
    ResetTotpForm, TokenForm, UidQuery,
};
use crate::admin::middleware::{AdminContext, AdminState, SESSION_COOKIE};
use crate::admin::templates::{
    AccountSummary, AddUserTemplate, ConfigTemplate, EditAccountTemplate,
    EditHotpSecretTemplate, IndexTemplate, LoginTemplate, TwoFactorTemplate, error_page, render,
};
use crate::otp::OtpSecretError;
use axum::{
    Form, Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use std::sync::Arc;
use tracing::{error, info, warn};

const UNEXPECTED_ERROR: &str = "An unexpected error occurred! Please inform your administrator.";

/// Build the admin router.
pub fn admin_router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/", get(index).post(index))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", post(logout))
        .route("/config", get(config_page).post(config_submit))
        .route("/ossec-test", get(ossec_test))
        .route("/add", get(add_user_page).post(add_user_submit))
        .route("/2fa", get(two_factor_page).post(two_factor_submit))
        .route("/reset-2fa-totp", post(reset_two_factor_totp))
        .route("/reset-2fa-hotp", post(reset_two_factor_hotp))
        .route("/edit/{id}", get(edit_user_page).post(edit_user_submit))
        .route("/edit/{id}/new-password", post(new_password))
        .route("/delete/{id}", post(delete_user))
        .with_state(state)
}

fn not_found() -> Response {
    error_page(StatusCode::NOT_FOUND, "Not found.")
}

fn internal_error() -> Response {
    error_page(StatusCode::INTERNAL_SERVER_ERROR, UNEXPECTED_ERROR)
}

fn two_factor_url(uid: i64) -> String {
    format!("/2fa?uid={uid}")
}

/// User-facing message for a rejected HOTP secret.
fn otp_secret_message(err: &OtpSecretError) -> &'static str {
    match err {
        OtpSecretError::OddLength => {
            "Invalid secret format: odd-length secret. Did you mistype the secret?"
        }
        OtpSecretError::NonHexDigit => {
            "Invalid secret format: please only submit letters A-F and numbers 0-9."
        }
    }
}

/// Load an account that has completed two-factor enrollment.
///
/// Unknown accounts answer 404; pending ones are sent back to `/2fa`.
async fn load_active_account(
    state: &AdminState,
    ctx: &AdminContext,
    id: i64,
) -> Result<Account, Response> {
    let account = match state.accounts.get(id).await {
        Ok(Some(account)) => account,
        Ok(None) => return Err(not_found()),
        Err(e) => {
            error!("Failed to load account {}: {}", id, e);
            return Err(internal_error());
        }
    };

    if !account.is_active() {
        state
            .flash(
                ctx,
                FlashCategory::Error,
                format!(
                    "Two-factor authentication for {} has not been confirmed yet.",
                    account.username
                ),
            )
            .await;
        return Err(Redirect::to(&two_factor_url(id)).into_response());
    }

    Ok(account)
}

// =============================================================================
// Login / logout
// =============================================================================

/// Login page handler.
async fn login_page(State(state): State<Arc<AdminState>>, jar: CookieJar) -> Response {
    if AdminContext::from_cookies(&state, &jar).await.is_some() {
        return Redirect::to("/").into_response();
    }

    render(&LoginTemplate { error: None })
}

/// Login form submission handler.
async fn login_submit(
    State(state): State<Arc<AdminState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let login_failed = || {
        render(&LoginTemplate {
            error: Some("Login failed.".to_string()),
        })
    };

    let account = match state
        .accounts
        .authenticate(&form.username, &form.password, &form.token)
        .await
    {
        Ok(Some(account)) => account,
        Ok(None) => {
            warn!(username = %form.username, "Login failed");
            return login_failed();
        }
        Err(e) => {
            error!("Login error: {}", e);
            return login_failed();
        }
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    let session_id = match state
        .sessions
        .create_session(account.id, state.session_timeout_secs, ip_address, user_agent)
        .await
    {
        Ok(session_id) => session_id,
        Err(e) => {
            error!("Failed to create session: {:#}", e);
            return login_failed();
        }
    };

    info!(username = %account.username, "Admin logged in");

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict);

    (jar.add(cookie), Redirect::to("/")).into_response()
}

/// Logout handler.
async fn logout(State(state): State<Arc<AdminState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && let Err(e) = state.sessions.delete_session(cookie.value()).await
    {
        error!("Failed to delete session: {:#}", e);
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login")).into_response()
}

// =============================================================================
// Listing and instance configuration
// =============================================================================

/// Account listing handler.
async fn index(State(state): State<Arc<AdminState>>, ctx: AdminContext) -> Response {
    let accounts = match state.accounts.list().await {
        Ok(accounts) => accounts,
        Err(e) => {
            error!("Failed to list accounts: {}", e);
            return internal_error();
        }
    };

    let template = IndexTemplate {
        base: state.base(&ctx).await,
        accounts: accounts.iter().map(AccountSummary::from).collect(),
    };
    render(&template)
}

/// Instance configuration page.
async fn config_page(State(state): State<Arc<AdminState>>, ctx: AdminContext) -> Response {
    render(&ConfigTemplate {
        base: state.base(&ctx).await,
        errors: Vec::new(),
    })
}

/// Logo upload handler.
async fn config_submit(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    multipart: Multipart,
) -> Response {
    let upload = match LogoUpload::from_multipart(multipart).await {
        Ok(upload) => upload,
        Err(errors) => {
            return render(&ConfigTemplate {
                base: state.base(&ctx).await,
                errors: errors.messages(),
            });
        }
    };

    let logo_path = state.logo_path();
    let written = async {
        if let Some(parent) = logo_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&logo_path, &upload.data).await
    }
    .await;

    match written {
        Ok(()) => {
            info!(file = %upload.file_name, path = %logo_path.display(), "Logo updated");
            state
                .flash(&ctx, FlashCategory::LogoSuccess, "Image updated.")
                .await;
        }
        Err(e) => {
            error!("Failed to write logo to {}: {}", logo_path.display(), e);
            state
                .flash(&ctx, FlashCategory::LogoError, UNEXPECTED_ERROR)
                .await;
        }
    }

    Redirect::to("/config").into_response()
}

/// Emit a test alert through the error log.
async fn ossec_test(State(state): State<Arc<AdminState>>, ctx: AdminContext) -> Response {
    error!("This is a test OSSEC alert");
    state
        .flash(
            &ctx,
            FlashCategory::Notification,
            "Test alert sent. Check your email.",
        )
        .await;
    Redirect::to("/config").into_response()
}

// =============================================================================
// Enrollment
// =============================================================================

async fn render_add_user(
    state: &AdminState,
    ctx: &AdminContext,
    form: &NewUserForm,
    errors: Vec<String>,
) -> Response {
    render(&AddUserTemplate {
        base: state.base(ctx).await,
        password: state.accounts.policy().generate(),
        username: form.username.clone(),
        is_admin: form.is_admin,
        is_hotp: form.is_hotp,
        otp_secret: form.otp_secret.clone(),
        errors,
    })
}

/// New account form.
async fn add_user_page(State(state): State<Arc<AdminState>>, ctx: AdminContext) -> Response {
    render_add_user(&state, &ctx, &NewUserForm::default(), Vec::new()).await
}

/// New account submission.
async fn add_user_submit(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Form(form): Form<NewUserForm>,
) -> Response {
    let new_account = match form.clone().validate() {
        Ok(new_account) => new_account,
        Err(errors) => return render_add_user(&state, &ctx, &form, errors.messages()).await,
    };
    let requested_username = new_account.username.clone();

    let message = match state.accounts.create(new_account).await {
        Ok(account) => return Redirect::to(&two_factor_url(account.id)).into_response(),
        Err(AccountError::Password(_)) => "There was an error with the autogenerated password. \
             User not created. Please try again."
            .to_string(),
        Err(AccountError::InvalidUsername(reason)) => format!("Invalid username: {reason}"),
        Err(AccountError::OtpSecret(e)) => otp_secret_message(&e).to_string(),
        Err(AccountError::DuplicateUsername(_)) => "That username is already in use".to_string(),
        Err(e) => {
            error!(username = %requested_username, "Adding user failed: {}", e);
            "An error occurred saving this user to the database. \
             Please inform your administrator."
                .to_string()
        }
    };

    state.flash(&ctx, FlashCategory::Error, message).await;
    render_add_user(&state, &ctx, &form, Vec::new()).await
}

// =============================================================================
// Two-factor setup
// =============================================================================

/// Two-factor enrollment page.
async fn two_factor_page(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Query(query): Query<UidQuery>,
) -> Response {
    let account = match state.accounts.get(query.uid).await {
        Ok(Some(account)) => account,
        Ok(None) => return not_found(),
        Err(e) => {
            error!("Failed to load account {}: {}", query.uid, e);
            return internal_error();
        }
    };

    let base = state.base(&ctx).await;
    render(&TwoFactorTemplate::new(base, &account, &state.otp_issuer))
}

/// Two-factor token submission.
async fn two_factor_submit(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Query(query): Query<UidQuery>,
    Form(form): Form<TokenForm>,
) -> Response {
    match state.accounts.verify_token(query.uid, &form.token).await {
        Ok(true) => {
            let username = match state.accounts.get(query.uid).await {
                Ok(Some(account)) => account.username,
                Ok(None) => query.uid.to_string(),
                Err(e) => {
                    error!("Failed to reload account {} after verification: {}", query.uid, e);
                    query.uid.to_string()
                }
            };
            info!(account_id = query.uid, "Two-factor token accepted");
            state
                .flash(
                    &ctx,
                    FlashCategory::Notification,
                    format!(
                        "Token in two-factor authentication accepted for user {username}."
                    ),
                )
                .await;
            Redirect::to("/").into_response()
        }
        Ok(false) => {
            state
                .flash(
                    &ctx,
                    FlashCategory::Error,
                    "Could not verify token in two-factor authentication.",
                )
                .await;
            two_factor_page(State(state), ctx, Query(query)).await
        }
        Err(AccountError::NotFound(_)) => not_found(),
        Err(e) => {
            error!("Failed to verify token for account {}: {}", query.uid, e);
            internal_error()
        }
    }
}

/// Switch an account to TOTP with a fresh secret.
async fn reset_two_factor_totp(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Form(form): Form<ResetTotpForm>,
) -> Response {
    match state.accounts.reset_totp(form.uid).await {
        Ok(()) => Redirect::to(&two_factor_url(form.uid)).into_response(),
        Err(AccountError::NotFound(_)) => not_found(),
        Err(e) => {
            error!(admin = %ctx.account.username, "Failed to reset TOTP for account {}: {}", form.uid, e);
            internal_error()
        }
    }
}

/// Switch an account to HOTP with an admin-supplied secret.
async fn reset_two_factor_hotp(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Form(form): Form<ResetHotpForm>,
) -> Response {
    let account = match state.accounts.get(form.uid).await {
        Ok(Some(account)) => account,
        Ok(None) => return not_found(),
        Err(e) => {
            error!("Failed to load account {}: {}", form.uid, e);
            return internal_error();
        }
    };

    if let Some(secret) = form.secret() {
        let message = match state.accounts.set_hotp_secret(account.id, secret).await {
            Ok(()) => return Redirect::to(&two_factor_url(account.id)).into_response(),
            Err(AccountError::OtpSecret(e)) => {
                warn!(account_id = account.id, "Rejected HOTP secret: {}", e);
                otp_secret_message(&e)
            }
            Err(e) => {
                error!("Failed to set HOTP secret for account {}: {}", account.id, e);
                UNEXPECTED_ERROR
            }
        };
        state.flash(&ctx, FlashCategory::Error, message).await;
    }

    render(&EditHotpSecretTemplate {
        base: state.base(&ctx).await,
        uid: account.id,
        account_username: account.username,
    })
}

// =============================================================================
// Account edits
// =============================================================================

async fn render_edit_page(state: &AdminState, ctx: &AdminContext, account: &Account) -> Response {
    render(&EditAccountTemplate {
        base: state.base(ctx).await,
        account: AccountSummary::from(account),
        password: state.accounts.policy().generate(),
    })
}

/// Account edit page.
async fn edit_user_page(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Path(id): Path<i64>,
) -> Response {
    match load_active_account(&state, &ctx, id).await {
        Ok(account) => render_edit_page(&state, &ctx, &account).await,
        Err(response) => response,
    }
}

/// Username and admin flag changes.
async fn edit_user_submit(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Path(id): Path<i64>,
    Form(form): Form<EditUserForm>,
) -> Response {
    let account = match load_active_account(&state, &ctx, id).await {
        Ok(account) => account,
        Err(response) => return response,
    };
    let edit_url = format!("/edit/{id}");

    let mut username = account.username.clone();
    if let Some(requested) = form.new_username()
        && requested != account.username
    {
        if let Err(e) = check_username_acceptable(requested) {
            state
                .flash(&ctx, FlashCategory::Error, format!("Invalid username: {e}"))
                .await;
            return Redirect::to(&edit_url).into_response();
        }

        match state.accounts.find_by_username(requested).await {
            Ok(None) => username = requested.to_string(),
            Ok(Some(_)) => {
                state
                    .flash(
                        &ctx,
                        FlashCategory::Error,
                        format!("Username \"{requested}\" already taken."),
                    )
                    .await;
                return Redirect::to(&edit_url).into_response();
            }
            Err(e) => {
                error!("Failed to look up username {}: {}", requested, e);
                state
                    .flash(&ctx, FlashCategory::Error, UNEXPECTED_ERROR)
                    .await;
                return Redirect::to(&edit_url).into_response();
            }
        }
    }

    if username != account.username || form.is_admin != account.is_admin {
        match state
            .accounts
            .update_profile(id, &username, form.is_admin)
            .await
        {
            Ok(()) => {
                info!(admin = %ctx.account.username, account_id = id, "Account updated");
                state
                    .flash(&ctx, FlashCategory::Notification, "Account updated.")
                    .await;
            }
            Err(AccountError::DuplicateUsername(name)) => {
                state
                    .flash(
                        &ctx,
                        FlashCategory::Error,
                        format!("Username \"{name}\" already taken."),
                    )
                    .await;
                return Redirect::to(&edit_url).into_response();
            }
            Err(e) => {
                error!("Failed to update account {}: {}", id, e);
                state
                    .flash(&ctx, FlashCategory::Error, UNEXPECTED_ERROR)
                    .await;
            }
        }
    }

    let account = match state.accounts.get(id).await {
        Ok(Some(updated)) => updated,
        Ok(None) => return not_found(),
        Err(e) => {
            error!("Failed to reload account {}: {}", id, e);
            account
        }
    };
    render_edit_page(&state, &ctx, &account).await
}

/// Password reset for another account.
async fn new_password(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Path(id): Path<i64>,
    Form(form): Form<NewPasswordForm>,
) -> Response {
    let account = match load_active_account(&state, &ctx, id).await {
        Ok(account) => account,
        Err(response) => return response,
    };

    match state.accounts.set_password(account.id, &form.password).await {
        Ok(()) => {
            info!(admin = %ctx.account.username, account_id = id, "Password reset");
            state
                .flash(
                    &ctx,
                    FlashCategory::Success,
                    format!(
                        "Password updated. Don't forget to save it in your password manager. \
                         New password: {}",
                        form.password
                    ),
                )
                .await;
        }
        Err(AccountError::Password(_)) => {
            state
                .flash(
                    &ctx,
                    FlashCategory::Error,
                    "You submitted a bad password! Password not changed.",
                )
                .await;
        }
        Err(e) => {
            error!("Failed to update password for account {}: {}", id, e);
            state
                .flash(
                    &ctx,
                    FlashCategory::Error,
                    "There was an error, and the new password might not have been saved \
                     correctly. To prevent you from getting locked out of your account, you \
                     should reset your password again.",
                )
                .await;
        }
    }

    Redirect::to(&format!("/edit/{id}")).into_response()
}

/// Account deletion.
async fn delete_user(
    State(state): State<Arc<AdminState>>,
    ctx: AdminContext,
    Path(id): Path<i64>,
) -> Response {
    if id == ctx.account.id {
        error!("Admin {} tried to delete itself", ctx.account.username);
        return error_page(StatusCode::FORBIDDEN, "You cannot delete your own account.");
    }

    let account = match state.accounts.get(id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            error!(
                "Admin {} tried to delete nonexistent user with id {}",
                ctx.account.username, id
            );
            return not_found();
        }
        Err(e) => {
            error!("Failed to load account {}: {}", id, e);
            return internal_error();
        }
    };

    match state.accounts.delete(id).await {
        Ok(true) => {
            info!(admin = %ctx.account.username, username = %account.username, "Deleted user");
            state
                .flash(
                    &ctx,
                    FlashCategory::Notification,
                    format!("Deleted user '{}'", account.username),
                )
                .await;
            Redirect::to("/").into_response()
        }
        Ok(false) => not_found(),
        Err(e) => {
            error!("Failed to delete account {}: {}", id, e);
            internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_secret_messages() {
        assert_eq!(
            otp_secret_message(&OtpSecretError::OddLength),
            "Invalid secret format: odd-length secret. Did you mistype the secret?"
        );
        assert_eq!(
            otp_secret_message(&OtpSecretError::NonHexDigit),
            "Invalid secret format: please only submit letters A-F and numbers 0-9."
        );
    }

    #[test]
    fn test_two_factor_url() {
        assert_eq!(two_factor_url(7), "/2fa?uid=7");
    }
}
