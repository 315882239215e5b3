//! Web administration UI module.
//!
//! Provides:
//! - Admin login with passphrase and two-factor token
//! - Database-backed sessions and flash messages
//! - Routes for journalist account management and instance configuration

pub mod auth;
pub mod flash;
pub mod forms;
pub mod middleware;
pub mod routes;
pub mod templates;

pub use middleware::{AdminContext, AdminState};
pub use routes::admin_router;
