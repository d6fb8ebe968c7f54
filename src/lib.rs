//! # Cadrisk (Cardiovascular Risk Assessment Service)
//!
//! `cadrisk` lets registered accounts (patients, doctors) submit clinical
//! parameters and receive a model-derived cardiovascular risk estimate.
//!
//! ## Accounts & Sessions
//!
//! Accounts carry a role (`patient` or `doctor`). Passwords are stored as
//! Argon2id PHC digests, never in plaintext. Login issues a signed,
//! 24-hour session token; route guards verify the signature and expiry on
//! every request and enforce role-gated access (doctor-only views return
//! `403 Forbidden` for patients, not a silent redirect).
//!
//! ## Assessments
//!
//! A prediction request validates the fixed 12-feature clinical vector,
//! invokes the model, maps the probability onto LOW/MEDIUM/HIGH tiers and
//! persists the immutable assessment record. Patients read their own
//! history; doctors read everyone's.
//!
//! ## Storage
//!
//! Persistence sits behind [`storage::StorageBackend`], implemented twice:
//! an embedded SQLite store and a MongoDB document store. The backend is
//! selected once at startup from the DSN; callers never branch on it.
//! Username uniqueness is enforced by unique indexes in both backends so
//! concurrent registrations cannot race past an application-level check.

pub mod api;
pub mod auth;
pub mod cli;
pub mod risk;
pub mod storage;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
