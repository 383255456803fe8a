//! # Permesi Hooks (Authentication Extensibility)
//!
//! `permesi_hooks` lets operators plug their own decision logic into fixed
//! points of the authentication lifecycle and applies the verdict safely.
//!
//! ## Hook Points
//!
//! - **`mfa_verification_attempt`:** decide whether an MFA challenge attempt
//!   may proceed (lockout after repeated failures).
//! - **`password_verification_attempt`:** same for password sign-in, with the
//!   option to log the user out of every session.
//! - **`custom_access_token`:** add or override access token claims before
//!   signing.
//!
//! Hooks are Postgres functions (`pg-functions://`) or signed webhooks
//! (`https://`). Verification hooks fail closed, the token hook fails safe,
//! and claims are always checked against the minimum token schema.
//!
//! ## Adjacent utilities
//!
//! - [`sms`]: OTP delivery providers.
//! - [`password`]: required password character groups.

pub mod cli;
pub mod hooks;
pub mod password;
pub mod sms;

/// User agent sent on outbound hook and provider requests.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
