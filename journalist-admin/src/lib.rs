//! Journalist admin library
//!
//! Account management for the journalist interface: enrollment, two-factor
//! setup, credential resets and deletion, served as a small web UI.
//! The binary entry point is in main.rs.

pub mod account;
pub mod admin;
pub mod config;
pub mod db;
pub mod otp;
pub mod passwords;
pub mod server;
mod sql;
