//! Authentication building blocks: password hashing, signed session tokens
//! and the request guards that enforce them on routes.

pub mod guard;
pub mod password;
pub mod token;

pub use guard::Doctor;
pub use token::{Role, SessionClaims, TokenError, TokenSigner, SESSION_TTL_SECONDS};
