//! Admin state and the authenticated-admin extractor.

use crate::account::{Account, AccountStore};
use crate::admin::auth::{AdminSession, SessionStore};
use crate::admin::flash::{FlashCategory, FlashStore};
use crate::admin::templates::{self, BaseContext};
use crate::config::Config;
use crate::db::DbPool;
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

/// Cookie name for the session ID
pub const SESSION_COOKIE: &str = "journalist_admin_session";

/// State shared by admin routes
pub struct AdminState {
    /// Journalist accounts
    pub accounts: AccountStore,
    /// Admin login sessions
    pub sessions: SessionStore,
    /// Per-session flash messages
    pub flashes: FlashStore,
    /// Session timeout in seconds
    pub session_timeout_secs: u64,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
    /// Issuer used in provisioning URIs
    pub otp_issuer: String,
}

impl AdminState {
    pub fn new(pool: DbPool, config: &Config, data_dir: &Path) -> Self {
        Self {
            accounts: AccountStore::new(pool.clone(), config.passwords.clone()),
            sessions: SessionStore::new(pool.clone()),
            flashes: FlashStore::new(pool),
            session_timeout_secs: config.admin.session_timeout_secs,
            static_dir: config.admin.static_dir(data_dir),
            otp_issuer: config.admin.otp_issuer.clone(),
        }
    }

    /// Path of the uploaded logo.
    pub fn logo_path(&self) -> PathBuf {
        self.static_dir.join("i").join("logo.png")
    }

    /// Queue a flash for the admin's next page.
    ///
    /// A failure to store the message is logged and otherwise ignored.
    pub async fn flash(
        &self,
        ctx: &AdminContext,
        category: FlashCategory,
        message: impl Into<String>,
    ) {
        if let Err(e) = self
            .flashes
            .push(&ctx.session.session_id, category, message)
            .await
        {
            warn!("Failed to queue flash message: {:#}", e);
        }
    }

    /// Page context for the admin, consuming any queued flashes.
    pub async fn base(&self, ctx: &AdminContext) -> BaseContext {
        let flashes = match self.flashes.take(&ctx.session.session_id).await {
            Ok(flashes) => flashes,
            Err(e) => {
                warn!("Failed to load flash messages: {:#}", e);
                Vec::new()
            }
        };
        BaseContext {
            username: ctx.account.username.clone(),
            flashes,
        }
    }
}

/// The logged-in administrator making the request.
///
/// Extracting this from a request redirects anonymous visitors to the login
/// page and answers 403 for accounts without the admin flag.
pub struct AdminContext {
    pub session: AdminSession,
    pub account: Account,
}

impl AdminContext {
    /// Resolve the session cookie to a session and its account, if any.
    pub async fn from_cookies(state: &AdminState, jar: &CookieJar) -> Option<Self> {
        let session_id = jar.get(SESSION_COOKIE)?.value().to_string();

        let session = match state.sessions.validate_session(&session_id).await {
            Ok(session) => session?,
            Err(e) => {
                error!("Failed to validate session: {:#}", e);
                return None;
            }
        };

        match state.accounts.get(session.account_id).await {
            Ok(account) => account.map(|account| Self { session, account }),
            Err(e) => {
                error!("Failed to load session account: {}", e);
                None
            }
        }
    }
}

impl FromRequestParts<Arc<AdminState>> for AdminContext {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AdminState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let Some(ctx) = Self::from_cookies(state, &jar).await else {
            return Err(Redirect::to("/login").into_response());
        };

        if !ctx.account.is_admin {
            warn!(username = %ctx.account.username, path = %parts.uri.path(), "Non-admin denied");
            return Err(templates::error_page(
                StatusCode::FORBIDDEN,
                "Only administrators can access this page.",
            ));
        }

        Ok(ctx)
    }
}
