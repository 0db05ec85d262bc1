//! Passage Session Core
//!
//! This crate orchestrates the authentication flows: login, refresh-token
//! rotation, logout, registration and expired-token cleanup. All session
//! truth lives in the database; nothing is cached in process.

pub mod error;
pub mod session;

pub use error::CoreError;
pub use session::{normalize_email, spawn_cleanup_task, SessionManager, SessionTokens};
